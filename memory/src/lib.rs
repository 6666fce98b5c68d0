use std::sync::{Arc, Mutex};

/// Size of one page/frame in bytes. Virtual pages and physical frames share
/// this granularity.
pub const PAGE_SIZE: usize = 1024;

#[derive(Debug, PartialEq)]
pub enum MemoryError {
    OverCapacity,
    IncorrectLength,
}

/// Simulated physical memory: a fixed pool of page frames backed by a plain
/// byte buffer. Frame `f` occupies bytes `[f * PAGE_SIZE, (f + 1) * PAGE_SIZE)`.
#[derive(Clone)]
pub struct PhysicalMemory {
    num_frames: usize,
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl PhysicalMemory {
    pub fn new(num_frames: usize) -> Self {
        Self {
            num_frames,
            buffer: Arc::new(Mutex::new(vec![0; num_frames * PAGE_SIZE])),
        }
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    fn check_range(&self, frame: usize, offset: usize, len: usize) -> Result<(), MemoryError> {
        if frame >= self.num_frames || offset + len > PAGE_SIZE {
            return Err(MemoryError::OverCapacity);
        }
        Ok(())
    }

    /// Copy bytes out of a frame, starting `offset` bytes into it. The range
    /// must not cross the frame boundary.
    pub fn read(&self, frame: usize, offset: usize, data: &mut [u8]) -> Result<(), MemoryError> {
        self.check_range(frame, offset, data.len())?;
        let buffer = self.buffer.lock().unwrap();
        let start = frame * PAGE_SIZE + offset;
        data.copy_from_slice(&buffer[start..start + data.len()]);
        Ok(())
    }

    /// Copy bytes into a frame, starting `offset` bytes into it. The range
    /// must not cross the frame boundary.
    pub fn write(&self, frame: usize, offset: usize, data: &[u8]) -> Result<(), MemoryError> {
        self.check_range(frame, offset, data.len())?;
        let mut buffer = self.buffer.lock().unwrap();
        let start = frame * PAGE_SIZE + offset;
        buffer[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn read_page(&self, frame: usize) -> Result<Box<[u8; PAGE_SIZE]>, MemoryError> {
        if frame >= self.num_frames {
            return Err(MemoryError::OverCapacity);
        }
        let buffer = self.buffer.lock().unwrap();
        let start = frame * PAGE_SIZE;
        let mut page = Box::new([0; PAGE_SIZE]);
        page.copy_from_slice(&buffer[start..start + PAGE_SIZE]);
        Ok(page)
    }

    pub fn write_page(&self, frame: usize, page: &[u8]) -> Result<(), MemoryError> {
        if page.len() != PAGE_SIZE {
            return Err(MemoryError::IncorrectLength);
        }
        self.write(frame, 0, page)
    }

    pub fn zero_page(&self, frame: usize) -> Result<(), MemoryError> {
        if frame >= self.num_frames {
            return Err(MemoryError::OverCapacity);
        }
        let mut buffer = self.buffer.lock().unwrap();
        let start = frame * PAGE_SIZE;
        buffer[start..start + PAGE_SIZE].fill(0);
        Ok(())
    }
}
