use thiserror::Error;

use super::types::PageId;

/// Errors surfaced by the page-caching core.
///
/// Only conditions the caller cannot locally recover from become errors;
/// "page not resident", "pin count already zero" and "page still pinned"
/// are reported as `bool` results on the operations concerned.
#[derive(Error, Debug)]
pub enum PagePoolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("buffer pool exhausted: every frame is pinned")]
    PoolExhausted,

    #[error("invalid page id: {0}")]
    InvalidPageId(PageId),

    #[error("disk scheduler error: {0}")]
    DiskScheduler(String),
}

pub type Result<T> = std::result::Result<T, PagePoolError>;
