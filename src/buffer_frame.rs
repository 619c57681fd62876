use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::buffer_pool::BufferPoolManager;
use crate::page::{Page, PageId, INVALID_PAGE_ID};
use crate::replacer::FrameId;

/// One slot of the pool: page bytes behind a read/write latch, plus metadata
/// the pool maintains under its own lock. Pin count and dirty flag are
/// atomics so a guard can be dropped (and the page flushed) while other
/// readers still hold the data latch.
pub struct FrameHeader {
    frame_id: FrameId,
    data: RwLock<Page>,
    pin_count: AtomicU32,
    is_dirty: AtomicBool,
    page_id: AtomicU32,
}

impl FrameHeader {
    pub(crate) fn new(frame_id: FrameId) -> Self {
        FrameHeader {
            frame_id,
            data: RwLock::new(Page::new()),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            page_id: AtomicU32::new(INVALID_PAGE_ID),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub(crate) fn data(&self) -> &RwLock<Page> {
        &self.data
    }

    pub fn page_id(&self) -> PageId {
        self.page_id.load(Ordering::Acquire)
    }

    // Only called under the pool lock while the frame is unpinned.
    pub(crate) fn set_page_id(&self, page_id: PageId) {
        self.page_id.store(page_id, Ordering::Release);
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    pub(crate) fn increment_pin_count(&self) {
        self.pin_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn decrement_pin_count(&self) -> u32 {
        self.pin_count.fetch_sub(1, Ordering::AcqRel) - 1
    }

    pub(crate) fn set_pin_count(&self, count: u32) {
        self.pin_count.store(count, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    pub(crate) fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    pub(crate) fn mark_dirty(&self) {
        self.is_dirty.fetch_or(true, Ordering::AcqRel);
    }

    /// Detach the frame from its page, e.g. after a delete. Contents are
    /// left as-is; they are zeroed or overwritten when the frame is reused.
    pub(crate) fn clear(&self) {
        self.page_id.store(INVALID_PAGE_ID, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
        self.pin_count.store(0, Ordering::Release);
    }
}

/// A pinned page with no latch held. The caller locks the data on demand via
/// `read`/`write`; dropping the guard unpins, carrying the dirty bit if
/// `write` was ever called.
///
/// A thread must not acquire a second guard on a page while it holds a write
/// latch on it; the data latch is not reentrant.
pub struct PageGuard<'a> {
    pool: &'a BufferPoolManager,
    frame: &'a FrameHeader,
    page_id: PageId,
    dirty: bool,
}

impl<'a> PageGuard<'a> {
    pub(crate) fn new(pool: &'a BufferPoolManager, frame: &'a FrameHeader) -> Self {
        PageGuard {
            pool,
            frame,
            page_id: frame.page_id(),
            dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Page> {
        self.frame.data().read().unwrap()
    }

    pub fn write(&mut self) -> RwLockWriteGuard<'_, Page> {
        self.dirty = true;
        self.frame.data().write().unwrap()
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        self.pool.unpin_page(self.page_id, self.dirty);
    }
}

/// A pinned page holding the shared data latch for its whole lifetime.
pub struct ReadPageGuard<'a> {
    pool: &'a BufferPoolManager,
    page_id: PageId,
    data: Option<RwLockReadGuard<'a, Page>>,
}

impl<'a> ReadPageGuard<'a> {
    pub(crate) fn new(pool: &'a BufferPoolManager, frame: &'a FrameHeader) -> Self {
        ReadPageGuard {
            pool,
            page_id: frame.page_id(),
            data: Some(frame.data().read().unwrap()),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }
}

impl Deref for ReadPageGuard<'_> {
    type Target = Page;

    fn deref(&self) -> &Self::Target {
        self.data.as_ref().unwrap()
    }
}

impl Drop for ReadPageGuard<'_> {
    fn drop(&mut self) {
        // Release the latch before re-entering the pool, so a thread blocked
        // on this frame inside the pool lock can make progress.
        self.data.take();
        self.pool.unpin_page(self.page_id, false);
    }
}

/// A pinned page holding the exclusive data latch. Mutating through the
/// guard marks the frame dirty; the unpin on drop reports it.
pub struct WritePageGuard<'a> {
    pool: &'a BufferPoolManager,
    page_id: PageId,
    data: Option<RwLockWriteGuard<'a, Page>>,
    dirty: bool,
}

impl<'a> WritePageGuard<'a> {
    pub(crate) fn new(pool: &'a BufferPoolManager, frame: &'a FrameHeader) -> Self {
        WritePageGuard {
            pool,
            page_id: frame.page_id(),
            data: Some(frame.data().write().unwrap()),
            dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }
}

impl Deref for WritePageGuard<'_> {
    type Target = Page;

    fn deref(&self) -> &Self::Target {
        self.data.as_ref().unwrap()
    }
}

impl DerefMut for WritePageGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.dirty = true;
        self.data.as_mut().unwrap()
    }
}

impl Drop for WritePageGuard<'_> {
    fn drop(&mut self) {
        self.data.take();
        self.pool.unpin_page(self.page_id, self.dirty);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_new_frame_is_free() {
        let frame = FrameHeader::new(0);
        assert_eq!(frame.frame_id(), 0);
        assert_eq!(frame.page_id(), INVALID_PAGE_ID);
        assert_eq!(frame.pin_count(), 0);
        assert!(!frame.is_dirty());
    }

    #[test]
    fn test_pin_count_round_trip() {
        let frame = FrameHeader::new(1);
        frame.increment_pin_count();
        frame.increment_pin_count();
        assert_eq!(frame.pin_count(), 2);
        assert_eq!(frame.decrement_pin_count(), 1);
        assert_eq!(frame.decrement_pin_count(), 0);
    }

    #[test]
    fn test_clear_resets_metadata() {
        let frame = FrameHeader::new(2);
        frame.set_page_id(9);
        frame.mark_dirty();
        frame.set_pin_count(1);
        frame.clear();
        assert_eq!(frame.page_id(), INVALID_PAGE_ID);
        assert!(!frame.is_dirty());
        assert_eq!(frame.pin_count(), 0);
    }

    #[test]
    fn test_concurrent_latched_writes() {
        let frame = FrameHeader::new(0);
        thread::scope(|s| {
            for _ in 0..3 {
                s.spawn(|| {
                    for _ in 0..80 {
                        let mut page = frame.data().write().unwrap();
                        page[0] += 1;
                    }
                });
            }
        });
        let page = frame.data().read().unwrap();
        assert_eq!(page[0], 240);
    }
}
