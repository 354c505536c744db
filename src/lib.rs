//! Pagepool - the in-memory page-caching core of a disk-backed storage
//! engine.
//!
//! The crate provides bounded-memory access to fixed-size disk pages: it
//! brings pages from durable storage into a pool of frames, keeps recently
//! and frequently used pages resident, writes dirty pages back on
//! eviction and serializes concurrent access so higher layers (indexes,
//! table heaps, query operators) can hold stable references to page
//! contents.
//!
//! # Architecture
//!
//! - **Buffer pool** (`buffer`): memory management for database pages
//!   - `BufferPoolManager`: maps page ids to frames; fetch, pin/unpin,
//!     flush, allocate, delete
//!   - `LruKReplacer`: LRU-K replacement policy (backward K-distance)
//!   - `FrameHeader`: per-frame metadata and page bytes
//!   - `ReadPageGuard`/`WritePageGuard`: RAII leases that unpin on drop
//!
//! - **Container** (`container`): `ExtendibleHashTable`, the concurrent
//!   directory-doubling map used as the page table
//!
//! - **Storage** (`storage`): the disk seam
//!   - `DiskManager`: the consumed read/write/deallocate contract
//!   - `FileDiskManager` / `MemoryDiskManager`: file-backed and in-memory
//!     implementations
//!   - `DiskScheduler`: background I/O worker fed over a channel
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pagepool::buffer::BufferPoolManager;
//! use pagepool::storage::disk::{DiskManager, FileDiskManager};
//!
//! # fn main() -> pagepool::Result<()> {
//! let disk = Arc::new(FileDiskManager::open("test.db")?);
//! let bpm = BufferPoolManager::new(64, 2, disk as Arc<dyn DiskManager>);
//!
//! // Allocate a page and write into it through a lease.
//! let (page_id, _frame) = bpm.new_page()?;
//! bpm.unpin_page(page_id, false);
//! {
//!     let mut page = bpm.checked_write_page(page_id)?;
//!     page.data_mut()[..5].copy_from_slice(b"hello");
//! } // lease drops: page unpinned, marked dirty
//!
//! bpm.flush_page(page_id)?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod common;
pub mod container;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{FrameId, PageId, PagePoolError, Result};
