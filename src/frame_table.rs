use crate::kernel::Pid;

/// Back-reference from a physical frame to the translation entry occupying
/// it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameOwner {
    pub pid: Pid,
    pub vpn: usize,
}

/// One slot of the global frame table. Never destroyed, only reassigned.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub owner: Option<FrameOwner>,
    /// Outstanding transfer pins. The frame is ineligible for eviction while
    /// this is nonzero.
    pins: u32,
}

impl Frame {
    fn empty() -> Self {
        Self {
            owner: None,
            pins: 0,
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.pins > 0
    }

    /// Returns true if the frame went from unpinned to pinned.
    pub fn pin(&mut self) -> bool {
        self.pins += 1;
        self.pins == 1
    }

    /// Returns true if the frame went from pinned to unpinned.
    pub fn unpin(&mut self) -> bool {
        if self.pins == 0 {
            panic!("Frame is not pinned");
        }
        self.pins -= 1;
        self.pins == 0
    }
}

/// Machine-wide frame ownership, indexed by physical frame number.
pub struct FrameTable {
    frames: Vec<Frame>,
}

impl FrameTable {
    pub fn init(num_frames: usize) -> Self {
        Self {
            frames: vec![Frame::empty(); num_frames],
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, ppn: usize) -> &Frame {
        &self.frames[ppn]
    }

    pub fn get_mut(&mut self, ppn: usize) -> &mut Frame {
        &mut self.frames[ppn]
    }

    pub fn occupied(&self) -> usize {
        self.frames.iter().filter(|f| f.owner.is_some()).count()
    }
}

/// Free-list of physical frame numbers. A frame number is in the pool iff no
/// frame table slot claims it; pinned frames are never here.
pub struct FramePool {
    free: Vec<usize>,
}

impl FramePool {
    pub fn init(num_frames: usize) -> Self {
        Self {
            free: (0..num_frames).rev().collect(),
        }
    }

    pub fn take(&mut self) -> Option<usize> {
        self.free.pop()
    }

    pub fn put(&mut self, ppn: usize) {
        debug_assert!(!self.free.contains(&ppn), "frame {} freed twice", ppn);
        self.free.push(ppn);
    }

    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }
}
