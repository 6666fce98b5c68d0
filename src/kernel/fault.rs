use std::sync::MutexGuard;

use log::debug;
use memory::PAGE_SIZE;

use crate::frame_table::FrameOwner;
use crate::kernel::{Pid, VmKernel, VmState};
use crate::page_table::Residency;

impl VmKernel {
    /// Make `vpn` resident for `pid`, or report false when the page is
    /// outside the process's address space. Runs entirely under the global
    /// VM lock; the guard is threaded through because frame acquisition may
    /// block on the all-frames-pinned condition.
    pub(crate) fn fault_in<'a>(
        &self,
        guard: MutexGuard<'a, VmState>,
        pid: Pid,
        vpn: usize,
    ) -> (MutexGuard<'a, VmState>, bool) {
        match guard.procs.get(&pid).and_then(|p| p.page_table.entry(vpn)) {
            None => return (guard, false),
            Some(entry) if entry.is_resident() => return (guard, true),
            Some(_) => {}
        }

        let (mut guard, frame) = self.acquire_frame(guard);
        let state = &mut *guard;

        let Some(proc_state) = state.procs.get_mut(&pid) else {
            // process unloaded while we slept on frame pressure
            state.frame_pool.put(frame);
            self.frames_available.notify_one();
            return (guard, false);
        };

        // a fault for the same page may have completed while acquire_frame
        // blocked in the evictor; the entry is simply valid again
        let entry = proc_state
            .page_table
            .entry(vpn)
            .expect("page index validated before acquiring a frame");
        if entry.is_resident() {
            state.frame_pool.put(frame);
            self.frames_available.notify_one();
            return (guard, true);
        }

        match entry.residency {
            Residency::SwappedOut { slot } => {
                // restore the evicted contents and give the slot back
                let mut page = vec![0; PAGE_SIZE];
                self.store()
                    .read_at((slot * PAGE_SIZE) as u64, &mut page)
                    .expect("swap slot readable for a swapped-out page");
                self.memory()
                    .write_page(frame, &page)
                    .expect("acquired frame in range");
                state.swap.release(slot);
                let entry = proc_state.page_table.entry_mut(vpn).unwrap();
                entry.residency = Residency::Resident { frame };
                entry.used = true;
                debug_assert!(entry.dirty, "swapped-out page must be dirty");
                debug!(
                    "fault pid {} vpn {}: swapped in from slot {} to frame {}",
                    pid, vpn, slot, frame
                );
            }
            Residency::Unmapped => match proc_state.image.locate(vpn) {
                Some((s, page_in_section)) => {
                    let read_only = proc_state.image.section(s).read_only;
                    proc_state
                        .image
                        .load_page(s, page_in_section, self.memory(), frame)
                        .expect("acquired frame in range");
                    let entry = proc_state.page_table.entry_mut(vpn).unwrap();
                    entry.residency = Residency::Resident { frame };
                    entry.read_only = read_only;
                    entry.used = true;
                    entry.dirty = false;
                    debug!(
                        "fault pid {} vpn {}: loaded section {} page {} into frame {}",
                        pid, vpn, s, page_in_section, frame
                    );
                }
                None => {
                    // stack or argument page touched for the first time
                    self.memory()
                        .zero_page(frame)
                        .expect("acquired frame in range");
                    let entry = proc_state.page_table.entry_mut(vpn).unwrap();
                    entry.residency = Residency::Resident { frame };
                    entry.read_only = false;
                    entry.used = true;
                    entry.dirty = false;
                    debug!("fault pid {} vpn {}: zero-filled frame {}", pid, vpn, frame);
                }
            },
            Residency::Resident { .. } => unreachable!("checked above under the same lock"),
        }

        proc_state.resident.push(vpn);
        state.frame_table.get_mut(frame).owner = Some(FrameOwner { pid, vpn });
        (guard, true)
    }

    /// Take a frame from the pool, evicting while it is empty. After a
    /// blocked eviction resumes, another thread may have claimed the freed
    /// frame first, so pool emptiness is re-checked every iteration.
    fn acquire_frame<'a>(
        &self,
        mut guard: MutexGuard<'a, VmState>,
    ) -> (MutexGuard<'a, VmState>, usize) {
        loop {
            if let Some(frame) = guard.frame_pool.take() {
                return (guard, frame);
            }
            guard = self.evict_one(guard);
        }
    }
}
