use std::sync::Arc;

use log::info;
use memory::PAGE_SIZE;

use crate::image::Executable;
use crate::kernel::{Pid, VmKernel};
use crate::STACK_PAGES;

/// How a process's pages reach physical memory: all at load time, or lazily
/// on first touch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PagingPolicy {
    Eager,
    Demand,
}

/// One user process's view of the VM core: its address space is the image
/// sections, then `STACK_PAGES` stack pages, then one argument page.
pub struct UserProcess {
    pid: Pid,
    kernel: Arc<VmKernel>,
    num_pages: usize,
    policy: PagingPolicy,
}

impl UserProcess {
    pub fn new(kernel: Arc<VmKernel>, image: Arc<dyn Executable>, policy: PagingPolicy) -> Self {
        let num_pages = image.page_count() + STACK_PAGES + 1;
        let pid = kernel.register_process(image, num_pages);
        Self {
            pid,
            kernel,
            num_pages,
            policy,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn num_pages(&self) -> usize {
        self.num_pages
    }

    /// Prepare the address space. A demand-paged process defers every page
    /// to its first fault and always succeeds; an eager process materializes
    /// all pages now and fails cleanly when its footprint exceeds physical
    /// memory.
    pub fn load_sections(&self) -> bool {
        match self.policy {
            PagingPolicy::Demand => true,
            PagingPolicy::Eager => {
                if self.num_pages > self.kernel.total_frames() {
                    info!(
                        "process {}: insufficient physical memory ({} pages, {} frames)",
                        self.pid,
                        self.num_pages,
                        self.kernel.total_frames()
                    );
                    return false;
                }
                for vpn in 0..self.num_pages {
                    let resolved = self.kernel.handle_fault(self.pid, vpn * PAGE_SIZE);
                    assert!(resolved, "eager load of an in-range page cannot fault");
                }
                true
            }
        }
    }

    /// Return all frames and swap slots held by this process.
    pub fn unload_sections(&self) {
        self.kernel.unload_process(self.pid);
    }

    /// Exception-handler entry point for a hardware page fault.
    pub fn handle_page_fault(&self, vaddr: usize) -> bool {
        self.kernel.handle_fault(self.pid, vaddr)
    }

    /// Copy up to `length` bytes from virtual memory starting at `vaddr`
    /// into `data[offset..]`, faulting pages in as needed. Returns the
    /// number of bytes transferred; an out-of-range address yields a short
    /// (possibly zero) count, never an error.
    pub fn read_virtual_memory(
        &self,
        vaddr: usize,
        data: &mut [u8],
        offset: usize,
        length: usize,
    ) -> usize {
        assert!(offset + length <= data.len());

        let mut transferred = 0;
        while transferred < length {
            let addr = vaddr + transferred;
            let vpn = addr / PAGE_SIZE;
            let page_offset = addr % PAGE_SIZE;
            if vpn >= self.num_pages {
                break;
            }
            let Some(frame) = self.kernel.pin_for_io(self.pid, vpn, false) else {
                break;
            };
            let amount = (length - transferred).min(PAGE_SIZE - page_offset);
            let dst = &mut data[offset + transferred..offset + transferred + amount];
            // the copy runs outside the VM lock; the pin keeps the evictor
            // away from this frame
            let copied = self.kernel.memory().read(frame, page_offset, dst);
            self.kernel.unpin(frame);
            if copied.is_err() {
                break;
            }
            transferred += amount;
        }
        transferred
    }

    /// Copy up to `length` bytes from `data[offset..]` into virtual memory
    /// starting at `vaddr`. Short counts are returned for out-of-range
    /// addresses and for read-only target pages; already-copied bytes are
    /// never lost.
    pub fn write_virtual_memory(
        &self,
        vaddr: usize,
        data: &[u8],
        offset: usize,
        length: usize,
    ) -> usize {
        assert!(offset + length <= data.len());

        let mut transferred = 0;
        while transferred < length {
            let addr = vaddr + transferred;
            let vpn = addr / PAGE_SIZE;
            let page_offset = addr % PAGE_SIZE;
            if vpn >= self.num_pages {
                break;
            }
            let Some(frame) = self.kernel.pin_for_io(self.pid, vpn, true) else {
                break;
            };
            let amount = (length - transferred).min(PAGE_SIZE - page_offset);
            let src = &data[offset + transferred..offset + transferred + amount];
            let copied = self.kernel.memory().write(frame, page_offset, src);
            self.kernel.unpin(frame);
            if copied.is_err() {
                break;
            }
            transferred += amount;
        }
        transferred
    }

    /// Read a NUL-terminated string of at most `max_length` characters from
    /// virtual memory. Returns `None` if no terminator is found.
    pub fn read_virtual_memory_string(&self, vaddr: usize, max_length: usize) -> Option<String> {
        let mut bytes = vec![0; max_length + 1];
        let bytes_read = self.read_virtual_memory(vaddr, &mut bytes, 0, max_length + 1);
        let len = bytes[..bytes_read].iter().position(|&b| b == 0)?;
        Some(String::from_utf8_lossy(&bytes[..len]).into_owned())
    }
}
