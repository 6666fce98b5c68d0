use std::{
    fs::{remove_file, File},
    io::{Read, Seek, SeekFrom, Write},
    sync::{Arc, Mutex},
};

use log::info;

#[derive(Debug, PartialEq)]
pub enum StoreError {
    OutOfBounds,
}

/// The swap area: a flat, growable file of page-sized slots with no header
/// and no metadata. Slot ownership lives entirely in the kernel's in-memory
/// translation entries, so the file is meaningless across a restart and is
/// deleted at shutdown.
#[derive(Debug, Clone)]
pub struct BackingStore {
    file_name: String,
    file: Arc<Mutex<File>>,
}

pub fn make_name(name: &str) -> String {
    let name = name.replace("-", "_");
    let mut store_name = String::from("SWAP_AREA_");
    store_name.push_str(&name);
    store_name
}

impl BackingStore {
    pub fn open(name: &str, create_if_absent: bool) -> Result<Self, std::io::Error> {
        let file = File::options()
            .write(true)
            .read(true)
            .create(create_if_absent)
            .open(make_name(name))?;
        Ok(Self {
            file_name: String::from(name),
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn name(&self) -> &str {
        &self.file_name
    }

    pub fn len(&self) -> Result<u64, std::io::Error> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::End(0))
    }

    pub fn is_empty(&self) -> Result<bool, std::io::Error> {
        Ok(self.len()? == 0)
    }

    /// Read bytes starting at `offset`. Reading a range the store has never
    /// been written to is an out-of-bounds error, never short data.
    pub fn read_at(&self, offset: u64, data: &mut [u8]) -> Result<(), StoreError> {
        let mut file = self.file.lock().unwrap();
        info!("Start reading {} bytes at offset {}", data.len(), offset);
        let end = file.seek(SeekFrom::End(0)).unwrap();
        if offset + data.len() as u64 > end {
            return Err(StoreError::OutOfBounds);
        }
        file.seek(SeekFrom::Start(offset)).unwrap();
        file.read_exact(data).unwrap();
        info!("Done reading {} bytes at offset {}", data.len(), offset);
        Ok(())
    }

    /// Write bytes starting at `offset`, growing the file when the range
    /// extends past the current end.
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<(), StoreError> {
        let mut file = self.file.lock().unwrap();
        info!("Start writing {} bytes at offset {}", data.len(), offset);
        file.seek(SeekFrom::Start(offset)).unwrap();
        file.write_all(data).unwrap();
        info!("Done writing {} bytes at offset {}", data.len(), offset);
        Ok(())
    }

    pub fn remove(name: &str) -> Result<(), std::io::Error> {
        remove_file(make_name(name))
    }
}
