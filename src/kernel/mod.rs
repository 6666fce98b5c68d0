mod evict;
mod fault;

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

use backing_store::BackingStore;
use log::debug;
use memory::{PhysicalMemory, PAGE_SIZE};

use crate::frame_table::{FramePool, FrameTable};
use crate::image::Executable;
use crate::page_table::{PageTable, Residency};
use crate::swap_alloc::SwapAllocator;

pub type Pid = usize;

/// Per-process bookkeeping held inside the kernel, mutated only under the
/// global VM lock.
pub(crate) struct ProcState {
    pub page_table: PageTable,
    pub image: Arc<dyn Executable>,
    /// Virtual page numbers currently backed by a frame.
    pub resident: Vec<usize>,
}

pub(crate) struct VmState {
    pub frame_table: FrameTable,
    pub frame_pool: FramePool,
    /// Number of frames with at least one pin.
    pub pin_count: usize,
    /// Clock sweep cursor into the frame table.
    pub clock_hand: usize,
    pub swap: SwapAllocator,
    pub procs: HashMap<Pid, ProcState>,
    pub next_pid: Pid,
    pub evictions: u64,
}

/// The memory manager shared by every process: frame table, frame pool, swap
/// allocator, the global VM lock and the condition variable threads block on
/// when every frame is pinned.
pub struct VmKernel {
    memory: PhysicalMemory,
    store: BackingStore,
    pub(crate) state: Mutex<VmState>,
    pub(crate) frames_available: Condvar,
}

impl VmKernel {
    /// Build a machine with `num_frames` physical frames and a fresh swap
    /// area named `swap_name`. A stale swap file from an earlier run carries
    /// no recoverable state and is discarded.
    pub fn new(num_frames: usize, swap_name: &str) -> Result<Self, std::io::Error> {
        let _ = BackingStore::remove(swap_name);
        let store = BackingStore::open(swap_name, true)?;
        Ok(Self {
            memory: PhysicalMemory::new(num_frames),
            store,
            state: Mutex::new(VmState {
                frame_table: FrameTable::init(num_frames),
                frame_pool: FramePool::init(num_frames),
                pin_count: 0,
                clock_hand: 0,
                swap: SwapAllocator::init(),
                procs: HashMap::new(),
                next_pid: 0,
                evictions: 0,
            }),
            frames_available: Condvar::new(),
        })
    }

    pub fn memory(&self) -> &PhysicalMemory {
        &self.memory
    }

    pub(crate) fn store(&self) -> &BackingStore {
        &self.store
    }

    pub(crate) fn register_process(&self, image: Arc<dyn Executable>, num_pages: usize) -> Pid {
        let mut guard = self.state.lock().unwrap();
        let pid = guard.next_pid;
        guard.next_pid += 1;
        guard.procs.insert(
            pid,
            ProcState {
                page_table: PageTable::init(num_pages),
                image,
                resident: Vec::new(),
            },
        );
        debug!("registered process {} with {} pages", pid, num_pages);
        pid
    }

    /// Resolve a page fault at `vaddr`. Returns false when the address lies
    /// outside the process's address space; the caller must treat that as a
    /// fatal addressing error, not a retryable condition.
    pub fn handle_fault(&self, pid: Pid, vaddr: usize) -> bool {
        let vpn = vaddr / PAGE_SIZE;
        let guard = self.state.lock().unwrap();
        let (_guard, resolved) = self.fault_in(guard, pid, vpn);
        resolved
    }

    /// Make `vpn` resident, refuse writes to read-only pages, mark the entry
    /// referenced (and dirty when writing) and pin the backing frame so the
    /// evictor cannot take it mid-copy. Returns the frame number, or `None`
    /// on an addressing fault or a read-only violation.
    pub fn pin_for_io(&self, pid: Pid, vpn: usize, for_write: bool) -> Option<usize> {
        let guard = self.state.lock().unwrap();
        let (mut guard, resolved) = self.fault_in(guard, pid, vpn);
        if !resolved {
            return None;
        }
        let state = &mut *guard;
        let entry = state.procs.get_mut(&pid)?.page_table.entry_mut(vpn)?;
        if for_write && entry.read_only {
            return None;
        }
        let frame = entry
            .frame()
            .expect("fault_in left the page resident under the held lock");
        entry.used = true;
        if for_write {
            entry.dirty = true;
        }
        if state.frame_table.get_mut(frame).pin() {
            state.pin_count += 1;
        }
        Some(frame)
    }

    /// Release a transfer pin and wake a thread waiting for an evictable
    /// frame.
    pub fn unpin(&self, frame: usize) {
        let mut guard = self.state.lock().unwrap();
        if guard.frame_table.get_mut(frame).unpin() {
            guard.pin_count -= 1;
            self.frames_available.notify_one();
        }
    }

    /// Tear down a process: every resident frame goes back to the pool and
    /// every outstanding swap slot is released, so a process that exits with
    /// swapped-out dirty pages does not leak swap space.
    pub fn unload_process(&self, pid: Pid) {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let Some(proc_state) = state.procs.remove(&pid) else {
            return;
        };
        for entry in proc_state.page_table.iter() {
            match entry.residency {
                Residency::Resident { frame } => {
                    let f = state.frame_table.get_mut(frame);
                    assert!(!f.is_pinned(), "unloading process {} with frame {} pinned", pid, frame);
                    f.owner = None;
                    state.frame_pool.put(frame);
                    self.frames_available.notify_one();
                }
                Residency::SwappedOut { slot } => state.swap.release(slot),
                Residency::Unmapped => {}
            }
        }
        debug!("unloaded process {}", pid);
    }

    pub fn total_frames(&self) -> usize {
        self.memory.num_frames()
    }

    pub fn free_frames(&self) -> usize {
        self.state.lock().unwrap().frame_pool.len()
    }

    pub fn pinned_frames(&self) -> usize {
        self.state.lock().unwrap().pin_count
    }

    pub fn resident_frames(&self) -> usize {
        self.state.lock().unwrap().frame_table.occupied()
    }

    pub fn swap_slots_outstanding(&self) -> usize {
        self.state.lock().unwrap().swap.outstanding()
    }

    pub fn evictions(&self) -> u64 {
        self.state.lock().unwrap().evictions
    }

    pub fn is_resident(&self, pid: Pid, vpn: usize) -> bool {
        let guard = self.state.lock().unwrap();
        guard
            .procs
            .get(&pid)
            .and_then(|p| p.page_table.entry(vpn))
            .map(|e| e.is_resident())
            .unwrap_or(false)
    }

    /// Virtual page numbers of `pid` currently backed by a frame, in
    /// fault-in order.
    pub fn resident_pages(&self, pid: Pid) -> Vec<usize> {
        let guard = self.state.lock().unwrap();
        guard
            .procs
            .get(&pid)
            .map(|p| p.resident.clone())
            .unwrap_or_default()
    }

    pub fn frame_owner(&self, ppn: usize) -> Option<(Pid, usize)> {
        let guard = self.state.lock().unwrap();
        guard
            .frame_table
            .get(ppn)
            .owner
            .map(|owner| (owner.pid, owner.vpn))
    }
}

impl Drop for VmKernel {
    fn drop(&mut self) {
        // slot ownership lives only in memory, so the swap area is useless
        // after shutdown
        let _ = BackingStore::remove(self.store.name());
    }
}
