use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::page::{Page, PageId, PAGE_SIZE};

#[derive(Debug)]
pub enum DiskManagerError {
    Io(std::io::Error),
}

impl std::fmt::Display for DiskManagerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiskManagerError::Io(e) => write!(f, "[DM] io error: {}", e),
        }
    }
}

impl std::error::Error for DiskManagerError {}

impl From<std::io::Error> for DiskManagerError {
    fn from(e: std::io::Error) -> Self {
        DiskManagerError::Io(e)
    }
}

/// Block storage addressed by page id. The pool is the only caller; it holds
/// its own latch across these calls, so implementations just need internal
/// mutability for their file or map handle.
pub trait DiskManager: Send + Sync {
    /// Fill `page` with the on-disk contents for `page_id`. A page that has
    /// never been written reads back as all zeroes.
    fn read_page(&self, page_id: PageId, page: &mut Page) -> Result<(), DiskManagerError>;

    /// Persist `page` under `page_id`.
    fn write_page(&self, page_id: PageId, page: &Page) -> Result<(), DiskManagerError>;
}

/// Single-file disk manager. Page `i` lives at byte offset `i * PAGE_SIZE`;
/// the file grows on first write of the highest page.
pub struct FileDiskManager {
    file: Mutex<File>,
}

impl FileDiskManager {
    pub fn new<P: AsRef<std::path::Path>>(path: P) -> Result<Self, DiskManagerError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Ok(FileDiskManager {
            file: Mutex::new(file),
        })
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(&self, page_id: PageId, page: &mut Page) -> Result<(), DiskManagerError> {
        let mut file = self.file.lock().unwrap();
        let offset = page_id as u64 * PAGE_SIZE as u64;
        page.reset();
        // Reads past the current end of file yield a zeroed page; the page
        // exists logically as soon as its id was allocated.
        let len = file.metadata()?.len();
        if offset >= len {
            return Ok(());
        }
        file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < PAGE_SIZE {
            let n = file.read(&mut page[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(())
    }

    fn write_page(&self, page_id: PageId, page: &Page) -> Result<(), DiskManagerError> {
        let mut file = self.file.lock().unwrap();
        let offset = page_id as u64 * PAGE_SIZE as u64;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(page)?;
        Ok(())
    }
}

/// In-memory disk manager. Backs the pool with a hash map and counts every
/// read and write so tests can assert exactly which pages hit "disk".
pub struct InMemoryDiskManager {
    pages: Mutex<HashMap<PageId, Page>>,
    write_counts: Mutex<HashMap<PageId, usize>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl InMemoryDiskManager {
    pub fn new() -> Self {
        InMemoryDiskManager {
            pages: Mutex::new(HashMap::new()),
            write_counts: Mutex::new(HashMap::new()),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// Number of `write_page` calls received for a specific page.
    pub fn writes_for(&self, page_id: PageId) -> usize {
        self.write_counts
            .lock()
            .unwrap()
            .get(&page_id)
            .copied()
            .unwrap_or(0)
    }
}

impl Default for InMemoryDiskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskManager for InMemoryDiskManager {
    fn read_page(&self, page_id: PageId, page: &mut Page) -> Result<(), DiskManagerError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let pages = self.pages.lock().unwrap();
        match pages.get(&page_id) {
            Some(stored) => page.copy_from(stored),
            None => page.reset(),
        }
        Ok(())
    }

    fn write_page(&self, page_id: PageId, page: &Page) -> Result<(), DiskManagerError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        *self.write_counts.lock().unwrap().entry(page_id).or_insert(0) += 1;
        self.pages.lock().unwrap().insert(page_id, page.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let dm = FileDiskManager::new(temp_dir.path().join("test.db")).unwrap();

        let mut page = Page::new();
        page[0] = 1;
        page[PAGE_SIZE - 1] = 2;
        dm.write_page(3, &page).unwrap();

        let mut out = Page::new();
        dm.read_page(3, &mut out).unwrap();
        assert_eq!(out[0], 1);
        assert_eq!(out[PAGE_SIZE - 1], 2);
    }

    #[test]
    fn test_file_read_past_eof_is_zeroed() {
        let temp_dir = TempDir::new().unwrap();
        let dm = FileDiskManager::new(temp_dir.path().join("test.db")).unwrap();

        let mut out = Page::new();
        out[7] = 99;
        dm.read_page(100, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_file_partial_tail_page() {
        let temp_dir = TempDir::new().unwrap();
        let dm = FileDiskManager::new(temp_dir.path().join("test.db")).unwrap();

        let mut page = Page::new();
        page[0] = 5;
        dm.write_page(0, &page).unwrap();

        // Page 1 was never written; a read straddling EOF must still zero it.
        let mut out = Page::new();
        out[1] = 77;
        dm.read_page(1, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_in_memory_counters() {
        let dm = InMemoryDiskManager::new();
        let mut page = Page::new();
        page[0] = 9;
        dm.write_page(4, &page).unwrap();
        dm.write_page(4, &page).unwrap();

        let mut out = Page::new();
        dm.read_page(4, &mut out).unwrap();
        assert_eq!(out[0], 9);
        assert_eq!(dm.writes(), 2);
        assert_eq!(dm.writes_for(4), 2);
        assert_eq!(dm.writes_for(5), 0);
        assert_eq!(dm.reads(), 1);
    }

    #[test]
    fn test_in_memory_unknown_page_is_zeroed() {
        let dm = InMemoryDiskManager::new();
        let mut out = Page::new();
        out[0] = 1;
        dm.read_page(12, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0));
    }
}
