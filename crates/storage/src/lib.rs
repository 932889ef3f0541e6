//! Storage Layer
//!
//! Bounded in-memory activity logs, one per monitoring session.

mod repository;

pub use repository::{ActivityRecord, ActivityRepository, ActivitySummary, StorageConfig};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Lock error: {0}")]
    Lock(String),
}
