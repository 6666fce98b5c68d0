use std::sync::MutexGuard;

use log::debug;
use memory::PAGE_SIZE;

use crate::kernel::{VmKernel, VmState};
use crate::page_table::Residency;

impl VmKernel {
    /// Free one physical frame with the clock sweep and return once it is
    /// back in the pool. Blocks on the condition variable while every frame
    /// is pinned; after a wake the pool may already be non-empty (another
    /// thread freed or claimed frames), so the caller must re-check.
    pub(crate) fn evict_one<'a>(
        &self,
        mut guard: MutexGuard<'a, VmState>,
    ) -> MutexGuard<'a, VmState> {
        loop {
            if !guard.frame_pool.is_empty() {
                // a frame was freed while we slept
                return guard;
            }
            if guard.pin_count == guard.frame_table.len() {
                guard = self.frames_available.wait(guard).unwrap();
                continue;
            }

            let state = &mut *guard;
            let num_frames = state.frame_table.len();

            // Circular scan in frame-number order. Pinned frames are
            // skipped; referenced frames lose their used bit and get a
            // second chance. Terminates because at least one frame is
            // unpinned and used bits only get cleared.
            let victim = loop {
                let hand = state.clock_hand;
                state.clock_hand = (hand + 1) % num_frames;
                let frame = *state.frame_table.get(hand);
                if frame.is_pinned() {
                    continue;
                }
                let owner = frame
                    .owner
                    .expect("unpinned frame outside the pool must have an owner");
                let entry = state
                    .procs
                    .get_mut(&owner.pid)
                    .expect("frame owner is a live process")
                    .page_table
                    .entry_mut(owner.vpn)
                    .expect("frame owner vpn is in range");
                if entry.used {
                    entry.used = false;
                    continue;
                }
                break hand;
            };

            let owner = state
                .frame_table
                .get(victim)
                .owner
                .expect("victim selected with an owner");
            let proc_state = state
                .procs
                .get_mut(&owner.pid)
                .expect("frame owner is a live process");
            let entry = proc_state
                .page_table
                .entry_mut(owner.vpn)
                .expect("frame owner vpn is in range");
            debug_assert_eq!(entry.frame(), Some(victim));

            if entry.dirty {
                // preserve the contents before the frame is reused; the
                // store write happens under the global lock by design
                let slot = state.swap.allocate();
                let page = self
                    .memory()
                    .read_page(victim)
                    .expect("victim frame in range");
                self.store()
                    .write_at((slot * PAGE_SIZE) as u64, &page[..])
                    .expect("swap area is assumed writable");
                entry.residency = Residency::SwappedOut { slot };
                debug!(
                    "evicted dirty frame {} (pid {} vpn {}) to swap slot {}",
                    victim, owner.pid, owner.vpn, slot
                );
            } else {
                // reproducible from the image or zero-fill; just drop it
                entry.residency = Residency::Unmapped;
                debug!(
                    "discarded clean frame {} (pid {} vpn {})",
                    victim, owner.pid, owner.vpn
                );
            }

            proc_state.resident.retain(|&vpn| vpn != owner.vpn);
            state.frame_table.get_mut(victim).owner = None;
            state.frame_pool.put(victim);
            state.evictions += 1;
            self.frames_available.notify_one();
            return guard;
        }
    }
}
