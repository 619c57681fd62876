pub mod buffer_frame;
pub mod buffer_pool;
pub mod disk_manager;
pub mod logger;
pub mod page;
pub mod random;
pub mod replacer;
pub mod trie;

use std::ops::Deref;
use std::sync::Arc;

use tempfile::TempDir;

use crate::buffer_pool::BufferPoolManager;
use crate::disk_manager::FileDiskManager;

/// Debug-build logging that compiles away in release builds.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        #[cfg(debug_assertions)]
        ::log::debug!($($arg)*);
    }};
}

#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {{
        #[cfg(debug_assertions)]
        ::log::trace!($($arg)*);
    }};
}

/// A file-backed pool whose database file lives in a temp directory that is
/// cleaned up when the pool is dropped.
pub struct PoolForTest {
    _temp_dir: TempDir,
    pool: BufferPoolManager,
}

impl Deref for PoolForTest {
    type Target = BufferPoolManager;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

pub fn get_test_pool(pool_size: usize, replacer_k: usize) -> PoolForTest {
    let temp_dir = TempDir::new().unwrap();
    let disk = Arc::new(FileDiskManager::new(temp_dir.path().join("pool.db")).unwrap());
    PoolForTest {
        _temp_dir: temp_dir,
        pool: BufferPoolManager::new(pool_size, replacer_k, disk),
    }
}

pub mod prelude {
    pub use super::buffer_frame::{FrameHeader, PageGuard, ReadPageGuard, WritePageGuard};
    pub use super::buffer_pool::{BufferPoolError, BufferPoolManager};
    pub use super::disk_manager::{
        DiskManager, DiskManagerError, FileDiskManager, InMemoryDiskManager,
    };
    pub use super::page::{Page, PageId, INVALID_PAGE_ID, PAGE_SIZE};
    pub use super::replacer::{FrameId, LruKReplacer, ReplacerError};
    pub use super::trie::Trie;
    pub use super::{get_test_pool, PoolForTest};
}
