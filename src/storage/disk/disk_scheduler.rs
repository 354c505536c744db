use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::common::{PagePoolError, PageId, Result, PAGE_SIZE};

use super::DiskManager;

/// A queued disk operation. Requests own their buffers; completions travel
/// back over the per-request channel.
enum DiskRequest {
    Read {
        page_id: PageId,
        done: Sender<Result<Box<[u8; PAGE_SIZE]>>>,
    },
    Write {
        page_id: PageId,
        data: Box<[u8; PAGE_SIZE]>,
        done: Sender<Result<()>>,
    },
    /// Deallocation is a notification; nobody waits for it.
    Deallocate { page_id: PageId },
}

/// Feeds disk operations to a background worker over a bounded queue.
///
/// The buffer pool performs its I/O through the synchronous helpers, which
/// block until the worker reports completion. Dropping the scheduler closes
/// the queue; the worker drains what is left and the drop joins it.
pub struct DiskScheduler {
    disk: Arc<dyn DiskManager>,
    sender: Option<Sender<DiskRequest>>,
    worker: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    pub fn new(disk: Arc<dyn DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(64);

        let worker_disk = Arc::clone(&disk);
        let worker = thread::spawn(move || Self::run_worker(worker_disk, receiver));

        Self {
            disk,
            sender: Some(sender),
            worker: Some(worker),
        }
    }

    /// Reads a page and returns its bytes, blocking until the worker is
    /// done.
    pub fn read_sync(&self, page_id: PageId) -> Result<Box<[u8; PAGE_SIZE]>> {
        let (done, completion) = bounded(1);
        self.submit(DiskRequest::Read { page_id, done })?;
        Self::await_completion(completion)?
    }

    /// Writes a page, blocking until the worker is done.
    pub fn write_sync(&self, page_id: PageId, data: Box<[u8; PAGE_SIZE]>) -> Result<()> {
        let (done, completion) = bounded(1);
        self.submit(DiskRequest::Write {
            page_id,
            data,
            done,
        })?;
        Self::await_completion(completion)?
    }

    /// Queues a deallocation notification without waiting for it.
    pub fn deallocate(&self, page_id: PageId) -> Result<()> {
        self.submit(DiskRequest::Deallocate { page_id })
    }

    pub fn disk_manager(&self) -> &Arc<dyn DiskManager> {
        &self.disk
    }

    fn submit(&self, request: DiskRequest) -> Result<()> {
        self.sender
            .as_ref()
            .expect("scheduler queue closed before drop")
            .send(request)
            .map_err(|_| PagePoolError::DiskScheduler("worker queue disconnected".into()))
    }

    fn await_completion<T>(completion: Receiver<T>) -> Result<T> {
        completion
            .recv()
            .map_err(|_| PagePoolError::DiskScheduler("worker dropped completion".into()))
    }

    fn run_worker(disk: Arc<dyn DiskManager>, receiver: Receiver<DiskRequest>) {
        // Ends when every sender is gone and the queue is drained.
        for request in receiver {
            match request {
                DiskRequest::Read { page_id, done } => {
                    let mut data = Box::new([0u8; PAGE_SIZE]);
                    let result = disk.read_page(page_id, &mut data[..]).map(|()| data);
                    let _ = done.send(result);
                }
                DiskRequest::Write {
                    page_id,
                    data,
                    done,
                } => {
                    let _ = done.send(disk.write_page(page_id, &data[..]));
                }
                DiskRequest::Deallocate { page_id } => {
                    let _ = disk.deallocate_page(page_id);
                }
            }
        }
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::disk::MemoryDiskManager;

    #[test]
    fn write_then_read_through_worker() {
        let dm = Arc::new(MemoryDiskManager::new());
        let scheduler = DiskScheduler::new(Arc::clone(&dm) as Arc<dyn DiskManager>);

        let mut page = Box::new([0u8; PAGE_SIZE]);
        page[0] = 42;
        page[100] = 255;
        scheduler.write_sync(PageId::new(0), page).unwrap();

        let read = scheduler.read_sync(PageId::new(0)).unwrap();
        assert_eq!(read[0], 42);
        assert_eq!(read[100], 255);
    }

    #[test]
    fn deallocate_reaches_disk_manager() {
        let dm = Arc::new(MemoryDiskManager::new());
        let scheduler = DiskScheduler::new(Arc::clone(&dm) as Arc<dyn DiskManager>);

        scheduler
            .write_sync(PageId::new(7), Box::new([1u8; PAGE_SIZE]))
            .unwrap();
        scheduler.deallocate(PageId::new(7)).unwrap();

        // Drop drains the queue and joins the worker.
        drop(scheduler);
        assert_eq!(dm.num_pages(), 0);
    }

    #[test]
    fn interleaved_requests_keep_pages_apart() {
        let dm = Arc::new(MemoryDiskManager::new());
        let scheduler = DiskScheduler::new(dm as Arc<dyn DiskManager>);

        for i in 0..8u8 {
            scheduler
                .write_sync(PageId::new(i as u32), Box::new([i; PAGE_SIZE]))
                .unwrap();
        }
        for i in 0..8u8 {
            let read = scheduler.read_sync(PageId::new(i as u32)).unwrap();
            assert!(read.iter().all(|&b| b == i));
        }
    }
}
