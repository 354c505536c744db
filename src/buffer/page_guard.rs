use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::FrameHeader;

/// Invoked exactly once when a guard releases its lease; receives the page
/// id and whether the holder dirtied the page.
type ReleaseFn = Box<dyn FnOnce(PageId, bool) + Send + Sync>;

/// Pieces shared by both guard flavors: the pinned frame, the page id and
/// the pending release notification.
struct LeaseCore {
    page_id: PageId,
    /// Keeps the frame alive for as long as the borrowed latch guard below
    /// pretends to be 'static.
    _frame: Arc<FrameHeader>,
    release: Option<ReleaseFn>,
    dirtied: bool,
}

impl LeaseCore {
    fn new(page_id: PageId, frame: Arc<FrameHeader>, release: ReleaseFn) -> Self {
        Self {
            page_id,
            _frame: frame,
            release: Some(release),
            dirtied: false,
        }
    }

    fn finish(&mut self) {
        if let Some(release) = self.release.take() {
            release(self.page_id, self.dirtied);
        }
    }
}

/// Shared lease on a page's contents.
///
/// Holds a pin and the frame's read latch for its lifetime; dropping the
/// guard releases the latch and then unpins the page through the pool's
/// normal protocol, so a forgotten unpin is impossible by construction.
pub struct ReadPageGuard {
    core: LeaseCore,
    data: Option<RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl ReadPageGuard {
    /// # Safety
    ///
    /// The latch guard is transmuted to 'static; the `Arc` held in
    /// `LeaseCore` must keep the frame (and thus the lock) alive until the
    /// guard drops, which the struct layout guarantees.
    pub(crate) unsafe fn new(page_id: PageId, frame: Arc<FrameHeader>, release: ReleaseFn) -> Self {
        let data = frame.data.read();
        let data: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> = std::mem::transmute(data);

        Self {
            core: LeaseCore::new(page_id, frame, release),
            data: Some(data),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.core.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data.as_ref().unwrap()[..]
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // Release the content latch before re-entering the pool, so the
        // unpin path can never wait on a latch we still hold.
        self.data.take();
        self.core.finish();
    }
}

/// Exclusive lease on a page's contents.
///
/// The first call to `data_mut` marks the lease dirty; the flag travels
/// with the release notification so the pool records the mutation when the
/// guard drops.
pub struct WritePageGuard {
    core: LeaseCore,
    data: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl WritePageGuard {
    /// # Safety
    ///
    /// Same contract as [`ReadPageGuard::new`].
    pub(crate) unsafe fn new(page_id: PageId, frame: Arc<FrameHeader>, release: ReleaseFn) -> Self {
        let data = frame.data.write();
        let data: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> = std::mem::transmute(data);

        Self {
            core: LeaseCore::new(page_id, frame, release),
            data: Some(data),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.core.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data.as_ref().unwrap()[..]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.core.dirtied = true;
        &mut self.data.as_mut().unwrap()[..]
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.data.take();
        self.core.finish();
    }
}
