use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::buffer_frame::{FrameHeader, PageGuard, ReadPageGuard, WritePageGuard};
use crate::disk_manager::{DiskManager, DiskManagerError};
use crate::log_debug;
use crate::page::{PageId, INVALID_PAGE_ID};
use crate::replacer::{FrameId, LruKReplacer};

#[cfg(feature = "stat")]
mod stat {
    use lazy_static::lazy_static;

    use std::{cell::UnsafeCell, sync::Mutex};

    /// Per-thread counters for pool traffic, merged into a global on thread
    /// exit and drained by `stats_string`.
    pub struct PoolStats {
        counts: UnsafeCell<[usize; 6]>, // [hit, miss, new_page, free_victim, clean_victim, dirty_victim]
    }

    const LABELS: [&str; 6] = [
        "Hit",
        "Miss",
        "New Page",
        "Free Victim",
        "Clean Victim",
        "Dirty Victim",
    ];

    impl PoolStats {
        pub fn new() -> Self {
            PoolStats {
                counts: UnsafeCell::new([0; 6]),
            }
        }

        pub fn to_string(&self) -> String {
            let counts = unsafe { &*self.counts.get() };
            let mut result = String::new();
            result.push_str("Buffer Pool Statistics\n");
            let total = counts.iter().sum::<usize>().max(1);
            for i in 0..6 {
                result.push_str(&format!(
                    "{:14}: {:8} ({:6.2}%)\n",
                    LABELS[i],
                    counts[i],
                    (counts[i] as f64 / total as f64) * 100.0
                ));
            }
            result
        }

        pub fn merge(&self, other: &PoolStats) {
            let counts = unsafe { &mut *self.counts.get() };
            let other_counts = unsafe { &*other.counts.get() };
            for i in 0..6 {
                counts[i] += other_counts[i];
            }
        }

        pub fn clear(&self) {
            let counts = unsafe { &mut *self.counts.get() };
            for c in counts.iter_mut() {
                *c = 0;
            }
        }
    }

    pub struct LocalPoolStat {
        pub stat: PoolStats,
    }

    impl Drop for LocalPoolStat {
        fn drop(&mut self) {
            GLOBAL_POOL_STAT.lock().unwrap().merge(&self.stat);
        }
    }

    lazy_static! {
        pub static ref GLOBAL_POOL_STAT: Mutex<PoolStats> = Mutex::new(PoolStats::new());
    }

    thread_local! {
        pub static LOCAL_POOL_STAT: LocalPoolStat = LocalPoolStat {
            stat: PoolStats::new(),
        };
    }

    fn inc(idx: usize) {
        LOCAL_POOL_STAT.with(|local| {
            let counts = unsafe { &mut *local.stat.counts.get() };
            counts[idx] += 1;
        });
    }

    pub fn inc_local_hit() {
        inc(0);
    }

    pub fn inc_local_miss() {
        inc(1);
    }

    pub fn inc_local_new_page() {
        inc(2);
    }

    pub fn inc_local_free_victim() {
        inc(3);
    }

    pub fn inc_local_clean_victim() {
        inc(4);
    }

    pub fn inc_local_dirty_victim() {
        inc(5);
    }
}

#[cfg(feature = "stat")]
use stat::*;

#[derive(Debug)]
pub enum BufferPoolError {
    /// No free frame and nothing evictable.
    OutOfFrames,
    Disk(DiskManagerError),
}

impl std::fmt::Display for BufferPoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferPoolError::OutOfFrames => {
                write!(f, "[BP] every frame is pinned and nothing can be evicted")
            }
            BufferPoolError::Disk(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for BufferPoolError {}

impl From<DiskManagerError> for BufferPoolError {
    fn from(e: DiskManagerError) -> Self {
        BufferPoolError::Disk(e)
    }
}

struct PoolState {
    /// page id -> frame id, resident pages only.
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
    next_page_id: PageId,
}

impl PoolState {
    fn allocate_page(&mut self) -> PageId {
        let page_id = self.next_page_id;
        self.next_page_id += 1;
        page_id
    }

    fn deallocate_page(&mut self, _page_id: PageId) {
        // Ids are not recycled; the hook exists for the delete path.
    }
}

/// Fixed-capacity cache of pages in frames, backed by a disk manager.
///
/// One mutex serializes every public operation, including the disk I/O it
/// performs; the LRU-K replacer keeps its own leaf-level lock. Frame data
/// latches are only contended by guard holders, which always pin first, so
/// a frame being evicted (pin count 0) has no latch holders.
///
/// The data latch is not reentrant: a thread must drop its `WritePageGuard`
/// on a page before fetching or flushing that page again.
pub struct BufferPoolManager {
    frames: Vec<FrameHeader>,
    state: Mutex<PoolState>,
    replacer: LruKReplacer,
    disk: Arc<dyn DiskManager>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, replacer_k: usize, disk: Arc<dyn DiskManager>) -> Self {
        log_debug!("buffer pool created: {} frames, k={}", pool_size, replacer_k);
        BufferPoolManager {
            frames: (0..pool_size).map(FrameHeader::new).collect(),
            state: Mutex::new(PoolState {
                page_table: HashMap::new(),
                free_list: (0..pool_size).collect(),
                next_page_id: 0,
            }),
            replacer: LruKReplacer::new(pool_size, replacer_k),
            disk,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    /// Tell the replacer the frame is in use: off the candidate list, and
    /// one more access on its history. Recording on every pin, not just the
    /// first, is what lets LRU-K see use intensity.
    fn pin_frame(&self, frame_id: FrameId) {
        // Frame ids handed out by the pool are always in range.
        self.replacer.set_evictable(frame_id, false).unwrap();
        self.replacer.record_access(frame_id).unwrap();
    }

    /// Pop a free frame, or evict. An evicted frame's dirty contents are
    /// written back before its page leaves the page table; if that write
    /// fails the page stays resident and the frame goes back to the
    /// replacer's custody.
    fn find_available_frame(&self, state: &mut PoolState) -> Result<FrameId, BufferPoolError> {
        if let Some(frame_id) = state.free_list.pop_front() {
            #[cfg(feature = "stat")]
            inc_local_free_victim();
            return Ok(frame_id);
        }

        let frame_id = self.replacer.evict().ok_or(BufferPoolError::OutOfFrames)?;
        let frame = &self.frames[frame_id];
        let old_page_id = frame.page_id();
        if frame.is_dirty() {
            let data = frame.data().read().unwrap();
            if let Err(e) = self.disk.write_page(old_page_id, &data) {
                drop(data);
                self.replacer.record_access(frame_id).unwrap();
                self.replacer.set_evictable(frame_id, true).unwrap();
                return Err(BufferPoolError::Disk(e));
            }
            frame.set_dirty(false);
            #[cfg(feature = "stat")]
            inc_local_dirty_victim();
        } else {
            #[cfg(feature = "stat")]
            inc_local_clean_victim();
        }
        state.page_table.remove(&old_page_id);
        log_debug!("page {} evicted from frame({})", old_page_id, frame_id);
        Ok(frame_id)
    }

    fn new_page_frame(&self) -> Result<(PageId, FrameId), BufferPoolError> {
        let mut state = self.state.lock().unwrap();
        let frame_id = self.find_available_frame(&mut state)?;
        let page_id = state.allocate_page();
        let frame = &self.frames[frame_id];
        frame.data().write().unwrap().reset();
        frame.set_page_id(page_id);
        frame.set_pin_count(1);
        frame.set_dirty(false);
        state.page_table.insert(page_id, frame_id);
        self.pin_frame(frame_id);
        #[cfg(feature = "stat")]
        inc_local_new_page();
        log_debug!("page {} created in frame({})", page_id, frame_id);
        Ok((page_id, frame_id))
    }

    /// Allocate a fresh zeroed page, pinned once. The caller is responsible
    /// for the matching `unpin_page`; `new_page_guarded` wraps this in a
    /// guard that unpins itself.
    pub fn new_page(&self) -> Result<PageId, BufferPoolError> {
        self.new_page_frame().map(|(page_id, _)| page_id)
    }

    fn fetch_page_frame(&self, page_id: PageId) -> Result<FrameId, BufferPoolError> {
        let mut state = self.state.lock().unwrap();
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            self.frames[frame_id].increment_pin_count();
            self.pin_frame(frame_id);
            #[cfg(feature = "stat")]
            inc_local_hit();
            log_debug!("page {} hit in frame({})", page_id, frame_id);
            return Ok(frame_id);
        }

        #[cfg(feature = "stat")]
        inc_local_miss();
        let frame_id = self.find_available_frame(&mut state)?;
        let frame = &self.frames[frame_id];
        {
            let mut data = frame.data().write().unwrap();
            if let Err(e) = self.disk.read_page(page_id, &mut data) {
                drop(data);
                frame.clear();
                state.free_list.push_front(frame_id);
                return Err(BufferPoolError::Disk(e));
            }
        }
        // Freshly loaded contents match the disk, so the frame starts clean.
        frame.set_page_id(page_id);
        frame.set_pin_count(1);
        frame.set_dirty(false);
        state.page_table.insert(page_id, frame_id);
        self.pin_frame(frame_id);
        log_debug!("page {} loaded into frame({})", page_id, frame_id);
        Ok(frame_id)
    }

    /// Pin a page without latching its data; lock through the guard's
    /// `read`/`write` as needed.
    pub fn fetch_page_basic(&self, page_id: PageId) -> Result<PageGuard<'_>, BufferPoolError> {
        let frame_id = self.fetch_page_frame(page_id)?;
        Ok(PageGuard::new(self, &self.frames[frame_id]))
    }

    /// Pin a page and take its shared data latch for the guard's lifetime.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard<'_>, BufferPoolError> {
        let frame_id = self.fetch_page_frame(page_id)?;
        Ok(ReadPageGuard::new(self, &self.frames[frame_id]))
    }

    /// Pin a page and take its exclusive data latch for the guard's
    /// lifetime. Mutating through the guard marks the page dirty.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard<'_>, BufferPoolError> {
        let frame_id = self.fetch_page_frame(page_id)?;
        Ok(WritePageGuard::new(self, &self.frames[frame_id]))
    }

    /// Allocate a fresh page and return it as a basic guard.
    pub fn new_page_guarded(&self) -> Result<PageGuard<'_>, BufferPoolError> {
        let (_, frame_id) = self.new_page_frame()?;
        Ok(PageGuard::new(self, &self.frames[frame_id]))
    }

    /// Drop one pin. Returns false if the page is not resident or was not
    /// pinned. `is_dirty` is OR-ed in; unpinning never cleans a page.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.state.lock().unwrap();
        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return false,
        };
        let frame = &self.frames[frame_id];
        if frame.pin_count() == 0 {
            return false;
        }
        if is_dirty {
            frame.mark_dirty();
        }
        if frame.decrement_pin_count() == 0 {
            self.replacer.set_evictable(frame_id, true).unwrap();
        }
        true
    }

    /// Write a resident page to disk and clear its dirty bit, pinned or not.
    /// Returns Ok(false) for the invalid id or a page that is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool, BufferPoolError> {
        if page_id == INVALID_PAGE_ID {
            return Ok(false);
        }
        let state = self.state.lock().unwrap();
        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(false),
        };
        let frame = &self.frames[frame_id];
        {
            let data = frame.data().read().unwrap();
            self.disk.write_page(page_id, &data)?;
        }
        frame.set_dirty(false);
        Ok(true)
    }

    /// Flush every resident page.
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let state = self.state.lock().unwrap();
        for (&page_id, &frame_id) in state.page_table.iter() {
            let frame = &self.frames[frame_id];
            {
                let data = frame.data().read().unwrap();
                self.disk.write_page(page_id, &data)?;
            }
            frame.set_dirty(false);
        }
        Ok(())
    }

    /// Drop a page from the pool. True if the page was not resident to begin
    /// with; false if it is still pinned. Dirty contents are discarded.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut state = self.state.lock().unwrap();
        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return true,
        };
        let frame = &self.frames[frame_id];
        if frame.pin_count() > 0 {
            return false;
        }
        state.page_table.remove(&page_id);
        // A resident page with zero pins was made evictable by its last
        // unpin, so the forced removal cannot fail.
        self.replacer.remove(frame_id).unwrap();
        frame.clear();
        state.free_list.push_front(frame_id);
        state.deallocate_page(page_id);
        log_debug!("page {} deleted, frame({}) freed", page_id, frame_id);
        true
    }

    pub fn is_resident(&self, page_id: PageId) -> bool {
        self.state.lock().unwrap().page_table.contains_key(&page_id)
    }

    /// Current pin count of a resident page.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock().unwrap();
        state
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.frames[frame_id].pin_count())
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.lock().unwrap().free_list.len()
    }

    pub fn resident_page_count(&self) -> usize {
        self.state.lock().unwrap().page_table.len()
    }

    pub fn replacer_size(&self) -> usize {
        self.replacer.size()
    }

    pub fn stats_string(&self) -> String {
        #[cfg(feature = "stat")]
        {
            let global = GLOBAL_POOL_STAT.lock().unwrap();
            LOCAL_POOL_STAT.with(|local| {
                global.merge(&local.stat);
                local.stat.clear();
            });
            global.to_string()
        }
        #[cfg(not(feature = "stat"))]
        {
            "stat feature is disabled".to_string()
        }
    }
}

#[cfg(test)]
impl BufferPoolManager {
    pub fn run_checks(&self) {
        let state = self.state.lock().unwrap();
        assert_eq!(
            state.free_list.len() + state.page_table.len(),
            self.frames.len()
        );

        let mut unpinned_resident = 0;
        for (&page_id, &frame_id) in state.page_table.iter() {
            let frame = &self.frames[frame_id];
            assert_eq!(frame.page_id(), page_id);
            if frame.pin_count() == 0 {
                unpinned_resident += 1;
                assert!(self.replacer.is_evictable(frame_id));
            } else {
                assert!(!self.replacer.is_evictable(frame_id));
            }
        }
        assert_eq!(self.replacer.size(), unpinned_resident);

        for &frame_id in state.free_list.iter() {
            assert_eq!(self.frames[frame_id].page_id(), INVALID_PAGE_ID);
            assert_eq!(self.frames[frame_id].pin_count(), 0);
        }
    }
}
