//! Results storage module
//!
//! Persists run snapshots and exports flat result tables.

mod storage;

pub use storage::{ExportFormat, ResultsStorage, StoredRun};
