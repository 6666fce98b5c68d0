//! A demand-paged virtual memory core for a teaching kernel.
//!
//! Multiple user processes share a small pool of physical frames. Pages are
//! mapped lazily on first touch, evicted under pressure with a clock sweep,
//! and dirty pages are preserved in a swap area so they can be restored on
//! the next fault.

pub mod frame_table;
pub mod image;
pub mod kernel;
pub mod page_table;
pub mod process;
pub mod swap_alloc;

pub use image::{Executable, RawImage, Section};
pub use kernel::{Pid, VmKernel};
pub use memory::{PhysicalMemory, PAGE_SIZE};
pub use process::{PagingPolicy, UserProcess};

/// Number of stack pages mapped above a process's image sections.
pub const STACK_PAGES: usize = 8;
