use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::Mutex;

use crate::common::{
    FrameId, PagePoolError, PageId, Result, DEFAULT_BUCKET_SIZE, INVALID_PAGE_ID, PAGE_SIZE,
};
use crate::container::ExtendibleHashTable;
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{FrameHeader, LruKReplacer, ReadPageGuard, WritePageGuard};

/// Free list and page-id counter; both only ever change under the pool
/// latch.
struct PoolInner {
    free_list: VecDeque<FrameId>,
    next_page_id: u32,
}

/// Everything the release path needs, shared with the page guards through
/// an `Arc` so a guard can outlive the borrow it was created from.
struct PoolState {
    /// Pool-wide latch. Every metadata operation serializes on it, disk
    /// I/O included.
    latch: Mutex<PoolInner>,
    frames: Vec<Arc<FrameHeader>>,
    page_table: ExtendibleHashTable<PageId, FrameId>,
    replacer: LruKReplacer,
}

/// The buffer pool manager: bounded-memory access to fixed-size disk
/// pages.
///
/// Owns a fixed array of frames, an extendible-hash page table mapping
/// page ids to frames, an LRU-K replacer deciding evictions and a disk
/// scheduler for the actual I/O. Callers either drive the raw protocol
/// (`fetch_page` / `unpin_page`) or take RAII leases
/// (`checked_read_page` / `checked_write_page`) that unpin on drop.
///
/// Page ids are allocated here, monotonically from 0, and never reused
/// within a pool instance.
pub struct BufferPoolManager {
    pool_size: usize,
    state: Arc<PoolState>,
    disk: DiskScheduler,
}

impl BufferPoolManager {
    /// Creates a pool of `pool_size` frames with LRU-`replacer_k`
    /// replacement and the default page-table bucket size.
    pub fn new(pool_size: usize, replacer_k: usize, disk: Arc<dyn DiskManager>) -> Self {
        Self::with_bucket_size(pool_size, replacer_k, DEFAULT_BUCKET_SIZE, disk)
    }

    pub fn with_bucket_size(
        pool_size: usize,
        replacer_k: usize,
        bucket_size: usize,
        disk: Arc<dyn DiskManager>,
    ) -> Self {
        assert!(pool_size >= 1, "pool must have at least one frame");

        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            state: Arc::new(PoolState {
                latch: Mutex::new(PoolInner {
                    free_list,
                    next_page_id: 0,
                }),
                frames,
                page_table: ExtendibleHashTable::new(bucket_size),
                replacer: LruKReplacer::new(replacer_k, pool_size),
            }),
            disk: DiskScheduler::new(disk),
        }
    }

    /// Allocates a fresh page resident in a zeroed frame, pinned at 1.
    /// The caller owns the pin and must release it through `unpin_page`.
    ///
    /// Fails with `PoolExhausted` when the free list is empty and every
    /// frame is pinned.
    pub fn new_page(&self) -> Result<(PageId, Arc<FrameHeader>)> {
        let mut inner = self.state.latch.lock();
        let frame_id = self.obtain_frame(&mut inner)?;
        let page_id = PageId::new(inner.next_page_id);
        inner.next_page_id += 1;

        // obtain_frame hands the frame back reset: zeroed, clean, pin 0.
        let frame = &self.state.frames[frame_id.as_usize()];
        frame.set_page_id(page_id);
        frame.pin();
        self.state.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, false);

        Ok((page_id, Arc::clone(frame)))
    }

    /// Pins the page, loading it from disk if it is not resident, and
    /// returns its frame. Exactly one access is recorded per call.
    ///
    /// Fails with `PoolExhausted` when the page is not resident and no
    /// frame can be reclaimed.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Arc<FrameHeader>> {
        if page_id == INVALID_PAGE_ID {
            return Err(PagePoolError::InvalidPageId(page_id));
        }
        let mut inner = self.state.latch.lock();

        if let Some(frame_id) = self.state.page_table.find(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            if frame.pin_count() == 0 {
                self.state.replacer.set_evictable(frame_id, false);
            }
            self.state.replacer.record_access(frame_id);
            frame.pin();
            return Ok(Arc::clone(frame));
        }

        let frame_id = self.obtain_frame(&mut inner)?;
        let frame = &self.state.frames[frame_id.as_usize()];
        let data = match self.disk.read_sync(page_id) {
            Ok(data) => data,
            Err(err) => {
                // Keep the reclaimed frame reachable.
                inner.free_list.push_back(frame_id);
                return Err(err);
            }
        };
        frame.fill_from(&data[..]);
        frame.set_page_id(page_id);
        frame.pin();
        self.state.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, false);

        Ok(Arc::clone(frame))
    }

    /// Releases one pin on the page. When the count reaches zero the frame
    /// becomes evictable. The dirty flag is sticky: unpinning clean after
    /// unpinning dirty leaves the page dirty until it is written back.
    ///
    /// Returns false when the page is not resident or its pin count is
    /// already zero.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        Self::release_page(&self.state, page_id, is_dirty)
    }

    /// Writes a resident page back to disk, pinned or not, and clears its
    /// dirty flag. Returns `Ok(false)` when the page is not resident.
    ///
    /// Must not be called while holding a write lease on the same page.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let _latch = self.state.latch.lock();
        self.flush_resident(page_id)
    }

    /// Flushes every resident page.
    pub fn flush_all_pages(&self) -> Result<()> {
        let _latch = self.state.latch.lock();
        debug!("flushing all resident pages");
        for frame in &self.state.frames {
            let page_id = frame.page_id();
            if page_id != INVALID_PAGE_ID {
                self.flush_resident(page_id)?;
            }
        }
        Ok(())
    }

    /// Drops a page from the pool and notifies the disk manager. Dirty
    /// bytes of a deleted page are discarded, not written back.
    ///
    /// Returns `Ok(true)` when the page is not resident (the caller's
    /// post-condition already holds) and `Ok(false)` when the page is
    /// pinned; the caller retries after the pins are released.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.state.latch.lock();
        let Some(frame_id) = self.state.page_table.find(&page_id) else {
            return Ok(true);
        };
        let frame = &self.state.frames[frame_id.as_usize()];
        if frame.pin_count() > 0 {
            return Ok(false);
        }

        trace!("deleting page {page_id} from frame {frame_id}");
        self.state.page_table.remove(&page_id);
        self.state.replacer.remove(frame_id);
        frame.reset();
        inner.free_list.push_back(frame_id);
        self.disk.deallocate(page_id)?;
        Ok(true)
    }

    /// Fetches the page and wraps the pin in a shared lease that unpins
    /// (clean) on drop.
    pub fn checked_read_page(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame = self.fetch_page(page_id)?;
        let state = Arc::clone(&self.state);
        // Safety: the guard holds the frame's Arc for its whole lifetime.
        Ok(unsafe {
            ReadPageGuard::new(
                page_id,
                frame,
                Box::new(move |pid, dirty| {
                    Self::release_page(&state, pid, dirty);
                }),
            )
        })
    }

    /// Fetches the page and wraps the pin in an exclusive lease; mutating
    /// through the lease marks the page dirty at release.
    pub fn checked_write_page(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame = self.fetch_page(page_id)?;
        let state = Arc::clone(&self.state);
        // Safety: as for checked_read_page.
        Ok(unsafe {
            WritePageGuard::new(
                page_id,
                frame,
                Box::new(move |pid, dirty| {
                    Self::release_page(&state, pid, dirty);
                }),
            )
        })
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Frames currently on the free list.
    pub fn free_frame_count(&self) -> usize {
        self.state.latch.lock().free_list.len()
    }

    /// Resident frames currently eligible for eviction.
    pub fn evictable_frame_count(&self) -> usize {
        self.state.replacer.size()
    }

    /// Pin count of a resident page, or `None` when not resident.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let _latch = self.state.latch.lock();
        let frame_id = self.state.page_table.find(&page_id)?;
        Some(self.state.frames[frame_id.as_usize()].pin_count())
    }

    /// The unpin path proper; also the guards' release callback.
    fn release_page(state: &PoolState, page_id: PageId, is_dirty: bool) -> bool {
        let _latch = state.latch.lock();
        let Some(frame_id) = state.page_table.find(&page_id) else {
            return false;
        };
        let frame = &state.frames[frame_id.as_usize()];
        if frame.pin_count() == 0 {
            return false;
        }
        if is_dirty {
            frame.set_dirty(true);
        }
        if frame.unpin() == 0 {
            state.replacer.set_evictable(frame_id, true);
        }
        true
    }

    /// Hands out a frame for a new resident page: the free list first,
    /// then the replacer. A displaced dirty page is written back and its
    /// mapping removed before the frame is reused.
    fn obtain_frame(&self, inner: &mut PoolInner) -> Result<FrameId> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self
            .state
            .replacer
            .evict()
            .ok_or(PagePoolError::PoolExhausted)?;
        let frame = &self.state.frames[frame_id.as_usize()];
        let displaced = frame.page_id();
        if frame.is_dirty() {
            trace!("writing back dirty page {displaced} displaced from frame {frame_id}");
            let mut data = Box::new([0u8; PAGE_SIZE]);
            frame.copy_into(&mut data[..]);
            self.disk.write_sync(displaced, data)?;
        }
        self.state.page_table.remove(&displaced);
        frame.reset();
        Ok(frame_id)
    }

    fn flush_resident(&self, page_id: PageId) -> Result<bool> {
        let Some(frame_id) = self.state.page_table.find(&page_id) else {
            return Ok(false);
        };
        let frame = &self.state.frames[frame_id.as_usize()];
        let mut data = Box::new([0u8; PAGE_SIZE]);
        frame.copy_into(&mut data[..]);
        self.disk.write_sync(page_id, data)?;
        frame.set_dirty(false);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::disk::MemoryDiskManager;

    fn pool(pool_size: usize) -> (BufferPoolManager, Arc<MemoryDiskManager>) {
        let dm = Arc::new(MemoryDiskManager::new());
        let bpm = BufferPoolManager::new(pool_size, 2, Arc::clone(&dm) as Arc<dyn DiskManager>);
        (bpm, dm)
    }

    #[test]
    fn fresh_pool_is_all_free() {
        let (bpm, _dm) = pool(8);
        assert_eq!(bpm.pool_size(), 8);
        assert_eq!(bpm.free_frame_count(), 8);
        assert_eq!(bpm.evictable_frame_count(), 0);
    }

    #[test]
    fn new_page_ids_are_monotonic_from_zero() {
        let (bpm, _dm) = pool(4);
        for expected in 0..3u32 {
            let (page_id, frame) = bpm.new_page().unwrap();
            assert_eq!(page_id, PageId::new(expected));
            assert_eq!(frame.pin_count(), 1);
            assert!(!frame.is_dirty());
        }
        assert_eq!(bpm.free_frame_count(), 1);
    }

    #[test]
    fn fetch_hit_increments_pin() {
        let (bpm, _dm) = pool(4);
        let (page_id, _frame) = bpm.new_page().unwrap();

        let again = bpm.fetch_page(page_id).unwrap();
        assert_eq!(again.pin_count(), 2);

        assert!(bpm.unpin_page(page_id, false));
        assert!(bpm.unpin_page(page_id, false));
        assert_eq!(bpm.pin_count(page_id), Some(0));
        assert_eq!(bpm.evictable_frame_count(), 1);
    }

    #[test]
    fn unpin_of_unknown_page_fails() {
        let (bpm, _dm) = pool(2);
        assert!(!bpm.unpin_page(PageId::new(42), false));
    }

    #[test]
    fn unpin_below_zero_fails() {
        let (bpm, _dm) = pool(2);
        let (page_id, _frame) = bpm.new_page().unwrap();
        assert!(bpm.unpin_page(page_id, false));
        assert!(!bpm.unpin_page(page_id, false));
    }

    #[test]
    fn dirty_flag_is_sticky_across_unpins() {
        let (bpm, _dm) = pool(2);
        let (page_id, frame) = bpm.new_page().unwrap();

        assert!(bpm.unpin_page(page_id, true));
        let _ = bpm.fetch_page(page_id).unwrap();
        assert!(bpm.unpin_page(page_id, false));

        assert!(frame.is_dirty());
    }

    #[test]
    fn flush_clears_dirty_and_persists() {
        let (bpm, dm) = pool(2);
        let (page_id, frame) = bpm.new_page().unwrap();
        frame.write_data()[0] = 0x5A;
        bpm.unpin_page(page_id, true);

        assert!(bpm.flush_page(page_id).unwrap());
        assert!(!frame.is_dirty());
        assert_eq!(dm.num_writes(), 1);

        // Flushing a page that is not resident reports false.
        assert!(!bpm.flush_page(PageId::new(77)).unwrap());
    }

    #[test]
    fn flush_ignores_pin_count() {
        let (bpm, dm) = pool(2);
        let (page_id, _frame) = bpm.new_page().unwrap();
        assert_eq!(bpm.pin_count(page_id), Some(1));
        assert!(bpm.flush_page(page_id).unwrap());
        assert_eq!(dm.num_writes(), 1);
    }

    #[test]
    fn delete_of_non_resident_page_succeeds() {
        let (bpm, _dm) = pool(2);
        assert!(bpm.delete_page(PageId::new(9)).unwrap());
    }

    #[test]
    fn delete_of_pinned_page_fails() {
        let (bpm, _dm) = pool(2);
        let (page_id, _frame) = bpm.new_page().unwrap();
        assert!(!bpm.delete_page(page_id).unwrap());
        assert_eq!(bpm.pin_count(page_id), Some(1));
    }

    #[test]
    fn delete_discards_dirty_bytes() {
        let (bpm, dm) = pool(2);
        let (page_id, frame) = bpm.new_page().unwrap();
        frame.write_data()[0] = 1;
        bpm.unpin_page(page_id, true);

        assert!(bpm.delete_page(page_id).unwrap());
        assert_eq!(bpm.pin_count(page_id), None);
        assert_eq!(bpm.free_frame_count(), 2);
        // The dirty page was dropped, never written.
        assert_eq!(dm.num_writes(), 0);
    }

    #[test]
    fn pool_exhausts_when_all_pages_pinned() {
        let (bpm, _dm) = pool(2);
        let _a = bpm.new_page().unwrap();
        let _b = bpm.new_page().unwrap();

        assert!(matches!(bpm.new_page(), Err(PagePoolError::PoolExhausted)));
        // A resident page can still be fetched while the pool is full.
        assert!(bpm.fetch_page(PageId::new(0)).is_ok());
    }

    #[test]
    fn guards_round_trip_data() {
        let (bpm, _dm) = pool(4);
        let (page_id, _frame) = bpm.new_page().unwrap();
        bpm.unpin_page(page_id, false);

        {
            let mut guard = bpm.checked_write_page(page_id).unwrap();
            guard.data_mut()[..4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        }
        assert_eq!(bpm.pin_count(page_id), Some(0));

        let guard = bpm.checked_read_page(page_id).unwrap();
        assert_eq!(&guard.data()[..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn pin_accounting_stays_balanced() {
        let (bpm, _dm) = pool(3);
        let (a, _fa) = bpm.new_page().unwrap();
        let (b, _fb) = bpm.new_page().unwrap();
        bpm.unpin_page(a, false);

        // One pinned page, one evictable page, one free frame.
        let pinned: u32 = [a, b]
            .iter()
            .filter_map(|&p| bpm.pin_count(p))
            .sum();
        assert_eq!(
            pinned as usize + bpm.free_frame_count() + bpm.evictable_frame_count(),
            bpm.pool_size()
        );
    }
}
