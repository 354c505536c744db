use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::{PageId, Result, PAGE_SIZE};

use super::DiskManager;

/// In-memory disk manager, mainly for tests.
///
/// Pages live in a map; a page that was never written reads as zeroes and
/// deallocation drops the entry. The read/write counters let tests assert
/// on I/O traffic, e.g. that evicting a clean page writes nothing.
#[derive(Default)]
pub struct MemoryDiskManager {
    pages: Mutex<HashMap<PageId, Box<[u8; PAGE_SIZE]>>>,
    num_reads: AtomicU32,
    num_writes: AtomicU32,
}

impl MemoryDiskManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    /// Number of pages that have been written and not deallocated.
    pub fn num_pages(&self) -> usize {
        self.pages.lock().len()
    }
}

impl DiskManager for MemoryDiskManager {
    fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "read buffer must be PAGE_SIZE bytes");

        match self.pages.lock().get(&page_id) {
            Some(page) => data.copy_from_slice(&page[..]),
            None => data.fill(0),
        }
        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "write buffer must be PAGE_SIZE bytes");

        let mut page = Box::new([0u8; PAGE_SIZE]);
        page.copy_from_slice(data);
        self.pages.lock().insert(page_id, page);
        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        self.pages.lock().remove(&page_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_page_reads_as_zeroes() {
        let dm = MemoryDiskManager::new();
        let mut data = [7u8; PAGE_SIZE];
        dm.read_page(PageId::new(0), &mut data).unwrap();
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn write_read_and_deallocate() {
        let dm = MemoryDiskManager::new();
        dm.write_page(PageId::new(5), &[9u8; PAGE_SIZE]).unwrap();
        assert_eq!(dm.num_pages(), 1);

        let mut out = [0u8; PAGE_SIZE];
        dm.read_page(PageId::new(5), &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 9));

        dm.deallocate_page(PageId::new(5)).unwrap();
        assert_eq!(dm.num_pages(), 0);

        dm.read_page(PageId::new(5), &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn counters_track_traffic() {
        let dm = MemoryDiskManager::new();
        let mut buf = [0u8; PAGE_SIZE];
        dm.write_page(PageId::new(0), &buf).unwrap();
        dm.write_page(PageId::new(1), &buf).unwrap();
        dm.read_page(PageId::new(0), &mut buf).unwrap();

        assert_eq!(dm.num_writes(), 2);
        assert_eq!(dm.num_reads(), 1);
    }
}
