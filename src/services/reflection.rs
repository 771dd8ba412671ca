//! Reflection orchestration.
//!
//! Coordinates the multi-step, partially-external reflection run: discover
//! unprocessed sessions, have the reflector propose deltas, screen adds
//! through the validator, then route and persist the accepted deltas into
//! the global and workspace stores.
//!
//! Concurrency discipline: the whole run holds the workspace
//! processed-log lock, which serializes reflection per workspace. The
//! merge phase then takes the store locks through
//! [`StoreSet::with_stores`], which always acquires global before
//! workspace — the fixed order every concurrent invocation must honor.
//! Sessions are processed strictly sequentially; each session's outcome
//! can influence context for the next.

use crate::llm::{DeltaValidator, Reflector};
use crate::models::{Bullet, CurationResult, Delta};
use crate::services::blocklist::BlockedContentFilter;
use crate::services::curation::CurationService;
use crate::sessions::{DiscoveryOptions, SessionSource};
use crate::storage::{ProcessedLogStore, StoreSet, with_lock};
use crate::Result;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Reflection configuration, the `[reflection]` section of `tacit.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReflectionConfig {
    /// Sessions shorter than this many characters are marked processed
    /// and skipped without reflecting.
    pub min_session_chars: usize,
    /// Default cap on sessions per run.
    pub max_sessions: usize,
    /// Default discovery window in days; `None` means unbounded.
    pub days: Option<u32>,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            min_session_chars: 200,
            max_sessions: 10,
            days: Some(7),
        }
    }
}

/// Per-invocation options for a reflection run.
#[derive(Debug, Clone, Default)]
pub struct ReflectionOptions {
    /// Reflect on exactly this session, even if already processed.
    pub session: Option<String>,
    /// Override the discovery window.
    pub days: Option<u32>,
    /// Override the session cap.
    pub max_sessions: Option<usize>,
    /// Only discover sessions for this agent.
    pub agent: Option<String>,
    /// Collect deltas but persist nothing beyond the processed log.
    pub dry_run: bool,
}

/// A non-fatal failure while processing one session.
#[derive(Debug, Clone)]
pub struct SessionError {
    /// The failing session.
    pub session: String,
    /// What went wrong.
    pub message: String,
}

/// Aggregated outcome of a reflection run.
#[derive(Debug, Default)]
pub struct ReflectionOutcome {
    /// Sessions reflected on successfully.
    pub sessions_processed: usize,
    /// Sessions marked processed without reflection (missing or too
    /// short).
    pub sessions_skipped: usize,
    /// Deltas accepted across all sessions.
    pub deltas_generated: usize,
    /// Add deltas dropped by the validator.
    pub deltas_rejected: usize,
    /// The accumulated deltas; populated only on a dry run.
    pub deltas: Vec<Delta>,
    /// Curation result for the global store, when it received deltas.
    pub global_result: Option<CurationResult>,
    /// Curation result for the workspace store, when it received deltas.
    pub workspace_result: Option<CurationResult>,
    /// Per-session failures; the batch continues past them.
    pub errors: Vec<SessionError>,
}

impl ReflectionOutcome {
    /// Whether the run failed outright: nothing succeeded and there were
    /// errors. The CLI wrapper treats this as a hard failure.
    #[must_use]
    pub fn is_total_failure(&self) -> bool {
        self.sessions_processed == 0 && self.sessions_skipped == 0 && !self.errors.is_empty()
    }
}

/// Per-store curation results from a merge phase.
#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Result for the global store, when it received deltas.
    pub global: Option<CurationResult>,
    /// Result for the workspace store, when it received deltas.
    pub workspace: Option<CurationResult>,
}

/// What became of a single session unit.
enum SessionDisposition {
    /// Marked processed without reflection.
    Skipped(String),
    /// Reflected into deltas; `rejected` counts validator drops.
    Reflected { deltas: Vec<Delta>, rejected: usize },
}

/// Orchestrates reflection runs.
pub struct ReflectionService {
    stores: StoreSet,
    processed: ProcessedLogStore,
    curation: CurationService,
    config: ReflectionConfig,
}

impl ReflectionService {
    /// Creates the orchestrator.
    #[must_use]
    pub const fn new(
        stores: StoreSet,
        processed: ProcessedLogStore,
        curation: CurationService,
        config: ReflectionConfig,
    ) -> Self {
        Self {
            stores,
            processed,
            curation,
            config,
        }
    }

    /// Runs a full reflection pass.
    ///
    /// The entire run executes under the workspace processed-log lock.
    /// Per-session failures are collected into the outcome's error list;
    /// lock and store I/O failures propagate and abort the invocation.
    ///
    /// # Errors
    ///
    /// Returns an error on lock acquisition or store persistence failure.
    #[instrument(name = "playbook.reflect", skip_all, fields(dry_run = options.dry_run))]
    pub fn run(
        &self,
        source: &dyn SessionSource,
        reflector: &dyn Reflector,
        validator: &dyn DeltaValidator,
        options: &ReflectionOptions,
    ) -> Result<ReflectionOutcome> {
        let start = Instant::now();
        let result = with_lock(&self.processed.lock_path(), || {
            self.run_locked(source, reflector, validator, options)
        });

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::counter!("playbook_reflection_runs_total", "status" => status).increment(1);
        metrics::histogram!("playbook_reflection_duration_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);
        result
    }

    fn run_locked(
        &self,
        source: &dyn SessionSource,
        reflector: &dyn Reflector,
        validator: &dyn DeltaValidator,
        options: &ReflectionOptions,
    ) -> Result<ReflectionOutcome> {
        let mut log = self.processed.load()?;

        // Read-only context snapshot; staleness is fine because the merge
        // phase reloads fresh state under the store locks.
        let snapshot = self.stores.load_merged_snapshot()?;
        let summary = summarize_bullets(&snapshot);
        let history = summarize_history(&log);

        let sessions = match &options.session {
            Some(session) => vec![session.clone()],
            None => {
                let exclude: HashSet<String> = log.processed_sessions().into_iter().collect();
                let discovery = DiscoveryOptions {
                    days: options.days.or(self.config.days),
                    max_count: options.max_sessions.unwrap_or(self.config.max_sessions),
                    agent: options.agent.clone(),
                };
                source.discover(&exclude, &discovery)?
            },
        };
        info!(candidates = sessions.len(), "discovered unprocessed sessions");

        let mut outcome = ReflectionOutcome::default();
        let mut accumulated: Vec<Delta> = Vec::new();

        for session in sessions {
            match self.process_session(source, reflector, validator, &session, &summary, &history)
            {
                Ok(SessionDisposition::Skipped(note)) => {
                    log.record(&session, 0, Some(note));
                    // Persist incrementally so a crash mid-batch loses at
                    // most the unpersisted in-memory deltas.
                    self.processed.save(&log)?;
                    outcome.sessions_skipped += 1;
                },
                Ok(SessionDisposition::Reflected { deltas, rejected }) => {
                    log.record(&session, deltas.len(), None);
                    self.processed.save(&log)?;
                    outcome.sessions_processed += 1;
                    outcome.deltas_rejected += rejected;
                    accumulated.extend(deltas);
                },
                Err(e) => {
                    // The session stays unrecorded so a later run retries it.
                    warn!(session = %session, error = %e, "session reflection failed");
                    outcome.errors.push(SessionError {
                        session,
                        message: e.to_string(),
                    });
                },
            }
        }

        outcome.deltas_generated = accumulated.len();

        if options.dry_run {
            outcome.deltas = accumulated;
            return Ok(outcome);
        }

        if !accumulated.is_empty() {
            let merge = self.merge_deltas(accumulated)?;
            outcome.global_result = merge.global;
            outcome.workspace_result = merge.workspace;
        }

        self.processed.save(&log)?;
        Ok(outcome)
    }

    /// The merge phase: nested store locks, fresh reload, routing, and
    /// per-store curation.
    ///
    /// Also the entry point for manual deltas (`tacit add`,
    /// `tacit feedback`), so every mutation path shares the same routing
    /// and lock discipline.
    ///
    /// # Errors
    ///
    /// Returns an error on lock or store I/O failure.
    pub fn merge_deltas(&self, deltas: Vec<Delta>) -> Result<MergeOutcome> {
        let curation = &self.curation;
        let stores = &self.stores;
        stores.with_stores(|guard| {
            // Blocked logs are read inside the locks so the filter sees
            // any entry appended by a concurrent forget.
            let blocklists = stores.load_blocklists()?;
            let filter = BlockedContentFilter::from_logs(blocklists.iter());

            let mut global_deltas = Vec::new();
            let mut workspace_deltas = Vec::new();
            for delta in deltas {
                match guard.route(&delta) {
                    crate::models::Scope::Workspace => workspace_deltas.push(delta),
                    crate::models::Scope::Global => global_deltas.push(delta),
                }
            }

            let mut merge = MergeOutcome::default();
            // A store is curated and persisted only when it has routed
            // deltas; the other store's document is left untouched.
            if !global_deltas.is_empty() {
                let result = curation.curate(&mut guard.global, &global_deltas, &filter);
                info!(store = "global", summary = %result.summary(), "curated");
                guard.mark_global_dirty();
                merge.global = Some(result);
            }
            if !workspace_deltas.is_empty() {
                if let Some(workspace) = guard.workspace.as_mut() {
                    let result = curation.curate(workspace, &workspace_deltas, &filter);
                    info!(store = "workspace", summary = %result.summary(), "curated");
                    guard.mark_workspace_dirty();
                    merge.workspace = Some(result);
                }
            }
            Ok(merge)
        })
    }

    /// Exports, reflects, and validates one session unit.
    fn process_session(
        &self,
        source: &dyn SessionSource,
        reflector: &dyn Reflector,
        validator: &dyn DeltaValidator,
        session: &str,
        summary: &str,
        history: &str,
    ) -> Result<SessionDisposition> {
        let Some(content) = source.export(session)? else {
            return Ok(SessionDisposition::Skipped("no exportable content".to_string()));
        };
        if content.len() < self.config.min_session_chars {
            return Ok(SessionDisposition::Skipped(format!(
                "below minimum length ({} < {})",
                content.len(),
                self.config.min_session_chars
            )));
        }

        let proposed = reflector.reflect(&content, summary, history)?;

        // Only add deltas are validated; feedback on existing bullets
        // bypasses validation unconditionally.
        let mut deltas = Vec::with_capacity(proposed.len());
        let mut rejected = 0;
        for delta in proposed {
            if let Delta::Add { draft, .. } = &delta {
                let validation = validator.validate(draft)?;
                if !validation.valid {
                    info!(
                        session,
                        reason = validation.reason.as_deref().unwrap_or("unspecified"),
                        "validator rejected proposed rule"
                    );
                    rejected += 1;
                    continue;
                }
            }
            deltas.push(delta);
        }

        Ok(SessionDisposition::Reflected { deltas, rejected })
    }
}

/// Renders active bullets as reflector context, capped to keep prompts
/// bounded.
fn summarize_bullets(bullets: &[Bullet]) -> String {
    const MAX_LINES: usize = 100;
    let mut lines: Vec<String> = bullets
        .iter()
        .filter(|b| b.is_active())
        .take(MAX_LINES)
        .map(|b| format!("- [{}] ({}) {}", b.id, b.maturity, b.content))
        .collect();
    if lines.is_empty() {
        lines.push("(playbook is empty)".to_string());
    }
    lines.join("\n")
}

/// Renders the tail of the processed log as history context.
fn summarize_history(log: &crate::storage::ProcessedLog) -> String {
    const MAX_ENTRIES: usize = 5;
    let entries: Vec<String> = log
        .entries
        .iter()
        .rev()
        .take(MAX_ENTRIES)
        .map(|e| format!("- {} ({} deltas)", e.session, e.deltas))
        .collect();
    if entries.is_empty() {
        "(no prior runs)".to_string()
    } else {
        entries.join("\n")
    }
}
