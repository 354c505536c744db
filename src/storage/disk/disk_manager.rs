use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use log::debug;
use parking_lot::Mutex;

use crate::common::{PageId, Result, PAGE_SIZE};

/// The disk contract consumed by the buffer pool.
///
/// Page ids are allocated by the buffer pool itself, so the disk side only
/// moves bytes: it never hands out ids. `deallocate_page` is a
/// notification; an implementation may recycle the storage or ignore it.
/// I/O errors are terminal for the core.
pub trait DiskManager: Send + Sync {
    /// Fills `data` (exactly `PAGE_SIZE` bytes) with the page's contents.
    /// A page that was never written reads as zeroes.
    fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()>;

    /// Persists `data` (exactly `PAGE_SIZE` bytes) as the page's contents.
    fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()>;

    /// Notification that the buffer pool has deleted the page.
    fn deallocate_page(&self, _page_id: PageId) -> Result<()> {
        Ok(())
    }
}

/// File-backed disk manager: one file, pages addressed by
/// `page_id * PAGE_SIZE`.
pub struct FileDiskManager {
    file: Mutex<File>,
    path: PathBuf,
    num_reads: AtomicU32,
    num_writes: AtomicU32,
}

impl FileDiskManager {
    /// Opens (or creates) the database file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let pages = file.metadata()?.len() / PAGE_SIZE as u64;
        debug!("opened database file {} ({pages} pages)", path.display());

        Ok(Self {
            file: Mutex::new(file),
            path,
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of whole pages currently backed by the file.
    pub fn num_pages(&self) -> Result<u64> {
        let file = self.file.lock();
        Ok(file.metadata()?.len() / PAGE_SIZE as u64)
    }

    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "read buffer must be PAGE_SIZE bytes");

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_id.as_u64() * PAGE_SIZE as u64))?;

        // Reading past the end of the file yields zeroes: the pool may
        // fetch a page it allocated but never flushed.
        let mut filled = 0;
        while filled < PAGE_SIZE {
            let n = file.read(&mut data[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        data[filled..].fill(0);

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "write buffer must be PAGE_SIZE bytes");

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_id.as_u64() * PAGE_SIZE as u64))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl Drop for FileDiskManager {
    fn drop(&mut self) {
        let _ = self.file.get_mut().sync_all();
    }
}
