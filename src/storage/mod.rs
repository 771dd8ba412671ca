//! Whole-document store layer.
//!
//! Every store (global playbook, workspace playbook, per-workspace
//! processed log) is a single YAML file whose entire contents are read,
//! mutated in memory, and atomically rewritten. The lock granularity
//! (whole file) deliberately matches the mutation granularity (whole
//! document), and no store contents are cached across invocations: each
//! process re-reads from disk under its lock, trading performance for
//! correctness.

mod document;
mod lock;
mod playbook_file;
mod processed_log;
mod store_set;

pub use document::{load_document, save_document};
pub use lock::with_lock;
pub use playbook_file::PlaybookStore;
pub use processed_log::{ProcessedEntry, ProcessedLog, ProcessedLogStore};
pub use store_set::{StoreGuard, StoreSet};
