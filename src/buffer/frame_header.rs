use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::RwLock;

use crate::common::{FrameId, PageId, INVALID_PAGE_ID, PAGE_SIZE};

/// One slot of the buffer pool: the resident page's bytes plus the
/// metadata the pinning protocol works on.
///
/// A frame cycles between three states: free (on the free list, page id
/// invalid, clean, pin 0), resident-pinned (pin > 0) and resident-evictable
/// (pin 0). Pin counts and the dirty flag are only ever changed under the
/// pool latch; the data buffer has its own read/write latch so that page
/// contents can be accessed without holding up pool metadata.
pub struct FrameHeader {
    frame_id: FrameId,
    page_id: RwLock<PageId>,
    pin_count: AtomicU32,
    dirty: AtomicBool,
    /// Page bytes; pub(crate) so the page guards can hold the latch.
    pub(crate) data: RwLock<Box<[u8; PAGE_SIZE]>>,
}

impl FrameHeader {
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: RwLock::new(INVALID_PAGE_ID),
            pin_count: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Id of the page resident in this frame, or `INVALID_PAGE_ID`.
    pub fn page_id(&self) -> PageId {
        *self.page_id.read()
    }

    pub(crate) fn set_page_id(&self, page_id: PageId) {
        *self.page_id.write() = page_id;
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Takes a reference on the frame; returns the new pin count.
    pub(crate) fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Releases one reference; returns the new pin count. The caller must
    /// have checked the count is non-zero under the pool latch.
    pub(crate) fn unpin(&self) -> u32 {
        let prev = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "unpin of frame {} with pin count 0", self.frame_id);
        prev - 1
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub(crate) fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Release);
    }

    /// Copies `PAGE_SIZE` bytes into the frame buffer.
    pub(crate) fn fill_from(&self, src: &[u8]) {
        assert_eq!(src.len(), PAGE_SIZE);
        self.data.write().copy_from_slice(src);
    }

    /// Copies the frame buffer out into `dst`.
    pub(crate) fn copy_into(&self, dst: &mut [u8]) {
        assert_eq!(dst.len(), PAGE_SIZE);
        dst.copy_from_slice(&**self.data.read());
    }

    /// Shared access to the page bytes. Validity of the contents is only
    /// guaranteed while the caller holds a pin.
    pub fn read_data(&self) -> parking_lot::RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.read()
    }

    /// Exclusive access to the page bytes. The caller is responsible for
    /// reporting the mutation through `unpin_page(.., true)` or a write
    /// guard.
    pub fn write_data(&self) -> parking_lot::RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.write()
    }

    /// Returns the frame to its free-list state: no page, unpinned, clean,
    /// zeroed bytes.
    pub(crate) fn reset(&self) {
        *self.page_id.write() = INVALID_PAGE_ID;
        self.pin_count.store(0, Ordering::Release);
        self.dirty.store(false, Ordering::Release);
        self.data.write().fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_frame_is_free() {
        let frame = FrameHeader::new(FrameId::new(3));
        assert_eq!(frame.frame_id(), FrameId::new(3));
        assert_eq!(frame.page_id(), INVALID_PAGE_ID);
        assert_eq!(frame.pin_count(), 0);
        assert!(!frame.is_dirty());
    }

    #[test]
    fn pin_and_unpin_count() {
        let frame = FrameHeader::new(FrameId::new(0));
        assert_eq!(frame.pin(), 1);
        assert_eq!(frame.pin(), 2);
        assert_eq!(frame.unpin(), 1);
        assert_eq!(frame.unpin(), 0);
    }

    #[test]
    fn copy_round_trip() {
        let frame = FrameHeader::new(FrameId::new(0));
        let mut page = [0u8; PAGE_SIZE];
        page[0] = 0xAB;
        page[PAGE_SIZE - 1] = 0xCD;
        frame.fill_from(&page);

        let mut out = [0u8; PAGE_SIZE];
        frame.copy_into(&mut out);
        assert_eq!(out[0], 0xAB);
        assert_eq!(out[PAGE_SIZE - 1], 0xCD);
    }

    #[test]
    fn reset_clears_everything() {
        let frame = FrameHeader::new(FrameId::new(0));
        frame.set_page_id(PageId::new(9));
        frame.pin();
        frame.set_dirty(true);
        frame.fill_from(&[1u8; PAGE_SIZE]);

        frame.reset();

        assert_eq!(frame.page_id(), INVALID_PAGE_ID);
        assert_eq!(frame.pin_count(), 0);
        assert!(!frame.is_dirty());
        assert!(frame.read_data().iter().all(|&b| b == 0));
    }
}
