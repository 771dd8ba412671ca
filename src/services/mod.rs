//! Business logic services.
//!
//! Services orchestrate the stores and collaborators: the blocked-content
//! filter, the delta curation pipeline, and the reflection orchestrator.

mod blocklist;
mod curation;
mod reflection;

pub use blocklist::{BLOCKED_CONTENT_REASON, BlockedContentFilter};
pub use curation::{ANTI_PATTERN_PREFIX, CurationConfig, CurationService};
pub use reflection::{
    MergeOutcome, ReflectionConfig, ReflectionOptions, ReflectionOutcome, ReflectionService,
    SessionError,
};
