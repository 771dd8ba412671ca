//! # Tacit
//!
//! A self-curating playbook of behavioral rules for AI coding assistants.
//!
//! Tacit distills noisy, LLM-generated observations about past task sessions
//! into a playbook of behavioral rules. Rules decay in confidence over time,
//! move through a maturity lattice as feedback accumulates, and are inverted
//! into anti-patterns or pruned when they prove harmful. Concurrent CLI
//! invocations mutate the whole-file stores safely through advisory file
//! locks with a fixed acquisition order.
//!
//! ## Features
//!
//! - Time-decayed feedback scoring with a candidate → established → proven
//!   maturity lattice
//! - Delta curation with deduplication, blocked-content filtering, and
//!   anti-pattern inversion
//! - Two independently-lockable stores (global and workspace) merged for
//!   reads, curated independently for writes
//! - Reflection orchestrator that turns session transcripts into validated
//!   playbook deltas via pluggable LLM providers
//!
//! ## Example
//!
//! ```rust,ignore
//! use tacit::{CurationService, TacitConfig};
//!
//! let config = TacitConfig::load_default();
//! let service = CurationService::new(config.curation.clone());
//! let result = service.curate(&mut playbook, deltas, &blocklists);
//! println!("applied {} deltas", result.applied);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod llm;
pub mod models;
pub mod scoring;
pub mod services;
pub mod sessions;
pub mod similarity;
pub mod storage;

// Re-exports for convenience
pub use config::TacitConfig;
pub use models::{
    BlockedEntry, Bullet, BulletId, BulletKind, CurationResult, Delta, FeedbackEvent, FeedbackKind,
    Maturity, Playbook, Scope,
};
pub use scoring::ScoringConfig;
pub use services::{BlockedContentFilter, CurationConfig, CurationService, ReflectionService};
pub use storage::{PlaybookStore, StoreSet, with_lock};

/// Error type for tacit operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Missing required parameters, malformed delta payloads, unknown scope names |
/// | `OperationFailed` | Store I/O errors, LLM requests fail, session export fails |
/// | `ContentBlocked` | A proposed rule matches the blocked-content log |
/// | `Lock` | An advisory file lock cannot be acquired or released |
///
/// Delta conflicts (a delta referencing a bullet id that no longer exists)
/// are deliberately *not* errors; they are recorded in
/// [`models::CurationResult::conflicts`] so a batch reports partial success.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - Required parameters are missing (e.g., empty content in an add)
    /// - JSON deserialization of an LLM delta payload fails
    /// - An unknown scope or maturity string is provided
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - Playbook or blocklist files cannot be read or written
    /// - The external session exporter fails
    /// - An LLM provider request fails
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Content was blocked by the blocked-content log.
    ///
    /// Raised when a caller explicitly asks for a blocked add to be treated
    /// as an error. The curation pipeline itself never raises this; it marks
    /// the bullet deprecated and counts it as skipped.
    #[error("content blocked: {reason}")]
    ContentBlocked {
        /// The reason the content was blocked.
        reason: String,
    },

    /// An advisory file lock could not be acquired or released.
    ///
    /// Lock failures are fatal for the whole invocation; they are never
    /// swallowed into per-session error lists.
    #[error("lock on '{path}' failed: {cause}")]
    Lock {
        /// The lock file path.
        path: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Result type alias for tacit operations.
pub type Result<T> = std::result::Result<T, Error>;
