//! Durable storage for the slot bitmap
//!
//! The bitmap is persisted as a flat resource with no header: its bytes are
//! the bitmap and its length determines capacity. Naming and placement of the
//! resource belong to the surrounding shard.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

/// Byte-addressable resource holding a persisted bitmap
pub trait BackingStore {
    /// Read every byte currently stored, from the start
    fn read_all(&mut self) -> io::Result<Vec<u8>>;

    /// Truncate the resource to zero length
    fn truncate(&mut self) -> io::Result<()>;

    /// Move the write position back to the start
    fn rewind(&mut self) -> io::Result<()>;

    /// Write the complete byte sequence at the current position
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Flush to durable storage
    fn sync(&mut self) -> io::Result<()>;
}

impl BackingStore for File {
    fn read_all(&mut self) -> io::Result<Vec<u8>> {
        self.seek(SeekFrom::Start(0))?;
        let mut buffer = Vec::new();
        self.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    fn truncate(&mut self) -> io::Result<()> {
        self.set_len(0)
    }

    fn rewind(&mut self) -> io::Result<()> {
        self.seek(SeekFrom::Start(0)).map(|_| ())
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        Write::write_all(self, bytes)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

impl<S: BackingStore + ?Sized> BackingStore for &mut S {
    fn read_all(&mut self) -> io::Result<Vec<u8>> {
        (**self).read_all()
    }

    fn truncate(&mut self) -> io::Result<()> {
        (**self).truncate()
    }

    fn rewind(&mut self) -> io::Result<()> {
        (**self).rewind()
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_all(bytes)
    }

    fn sync(&mut self) -> io::Result<()> {
        (**self).sync()
    }
}

/// Open (or create) a bitmap file for reading and writing
pub fn open_file<P: AsRef<Path>>(path: P) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

#[derive(Debug, Default)]
struct MemoryState {
    data: Vec<u8>,
    position: usize,
    syncs: usize,
}

/// In-memory backing store
///
/// Clones share the same buffer, so a test can hand one clone to an
/// allocator and inspect the persisted bytes through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `bytes`
    pub fn with_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let store = Self::new();
        store.state.lock().data = bytes.into();
        store
    }

    /// Snapshot of the stored bytes
    pub fn bytes(&self) -> Vec<u8> {
        self.state.lock().data.clone()
    }

    /// Number of durable flushes performed
    pub fn sync_count(&self) -> usize {
        self.state.lock().syncs
    }
}

impl BackingStore for MemoryStore {
    fn read_all(&mut self) -> io::Result<Vec<u8>> {
        Ok(self.state.lock().data.clone())
    }

    fn truncate(&mut self) -> io::Result<()> {
        self.state.lock().data.clear();
        Ok(())
    }

    fn rewind(&mut self) -> io::Result<()> {
        self.state.lock().position = 0;
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock();
        let start = state.position;
        let end = start + bytes.len();
        if state.data.len() < end {
            state.data.resize(end, 0);
        }
        state.data[start..end].copy_from_slice(bytes);
        state.position = end;
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.state.lock().syncs += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_memory_store_overwrite() {
        let mut store = MemoryStore::with_bytes(vec![1, 2, 3, 4]);
        let view = store.clone();

        store.truncate().unwrap();
        store.rewind().unwrap();
        store.write_all(&[9, 9]).unwrap();
        store.sync().unwrap();

        assert_eq!(view.bytes(), vec![9, 9]);
        assert_eq!(view.sync_count(), 1);
    }

    #[test]
    fn test_file_store_overwrite() {
        let temp = NamedTempFile::new().unwrap();
        let mut file = open_file(temp.path()).unwrap();

        BackingStore::write_all(&mut file, &[0xFF; 16]).unwrap();
        file.sync().unwrap();

        file.truncate().unwrap();
        BackingStore::rewind(&mut file).unwrap();
        BackingStore::write_all(&mut file, &[0x0F, 0xF0]).unwrap();
        file.sync().unwrap();

        assert_eq!(file.read_all().unwrap(), vec![0x0F, 0xF0]);
        assert_eq!(std::fs::read(temp.path()).unwrap(), vec![0x0F, 0xF0]);
    }

    fn read_through<S: BackingStore>(mut store: S) -> Vec<u8> {
        store.read_all().unwrap()
    }

    #[test]
    fn test_borrowed_store() {
        let mut inner = MemoryStore::with_bytes(vec![0xAA]);
        assert_eq!(read_through(&mut inner), vec![0xAA]);
        assert_eq!(inner.bytes(), vec![0xAA]);
    }
}
