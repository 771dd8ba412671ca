//! Reflection orchestration with stubbed collaborators, including the
//! cross-invocation lock-ordering stress test.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use chrono::Utc;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use tacit::Result;
use tacit::llm::{DeltaValidator, Reflector, Validation};
use tacit::models::{Bullet, BulletId, Delta, DraftBullet};
use tacit::scoring::ScoringConfig;
use tacit::services::{
    CurationConfig, CurationService, ReflectionOptions, ReflectionService,
};
use tacit::sessions::{DiscoveryOptions, SessionSource};
use tacit::storage::{PlaybookStore, ProcessedLogStore, StoreSet};

/// Session source backed by an in-memory map.
struct StubSource {
    sessions: Vec<(String, Option<String>)>,
}

impl SessionSource for StubSource {
    fn discover(
        &self,
        exclude: &HashSet<String>,
        options: &DiscoveryOptions,
    ) -> Result<Vec<String>> {
        let mut found: Vec<String> = self
            .sessions
            .iter()
            .map(|(name, _)| name.clone())
            .filter(|name| !exclude.contains(name))
            .collect();
        if options.max_count > 0 {
            found.truncate(options.max_count);
        }
        Ok(found)
    }

    fn export(&self, session: &str) -> Result<Option<String>> {
        Ok(self
            .sessions
            .iter()
            .find(|(name, _)| name == session)
            .and_then(|(_, content)| content.clone()))
    }
}

/// Reflector that returns canned deltas per session.
struct StubReflector {
    deltas: Vec<Delta>,
    calls: AtomicUsize,
}

impl StubReflector {
    fn returning(deltas: Vec<Delta>) -> Self {
        Self {
            deltas,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Reflector for StubReflector {
    fn reflect(&self, _session: &str, _summary: &str, _history: &str) -> Result<Vec<Delta>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.deltas.clone())
    }
}

/// Reflector that always fails.
struct FailingReflector;

impl Reflector for FailingReflector {
    fn reflect(&self, _session: &str, _summary: &str, _history: &str) -> Result<Vec<Delta>> {
        Err(tacit::Error::OperationFailed {
            operation: "reflect".to_string(),
            cause: "llm unavailable".to_string(),
        })
    }
}

/// Validator that accepts everything, recording what it saw.
struct AcceptAll {
    seen: Mutex<Vec<String>>,
}

impl AcceptAll {
    fn new() -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl DeltaValidator for AcceptAll {
    fn validate(&self, draft: &DraftBullet) -> Result<Validation> {
        self.seen.lock().unwrap().push(draft.content.clone());
        Ok(Validation {
            valid: true,
            reason: None,
        })
    }
}

/// Validator that rejects everything.
struct RejectAll;

impl DeltaValidator for RejectAll {
    fn validate(&self, _draft: &DraftBullet) -> Result<Validation> {
        Ok(Validation {
            valid: false,
            reason: Some("not a behavioral rule".to_string()),
        })
    }
}

fn build_service(root: &Path) -> ReflectionService {
    let stores = StoreSet::new(
        PlaybookStore::new(root.join("global")),
        Some(PlaybookStore::new(root.join("workspace"))),
    );
    let processed = ProcessedLogStore::for_workspace(&root.join("data"), &root.join("repo"));
    ReflectionService::new(
        stores,
        processed,
        CurationService::new(ScoringConfig::default(), CurationConfig::default()),
        tacit::services::ReflectionConfig {
            min_session_chars: 10,
            max_sessions: 10,
            days: None,
        },
    )
}

fn long_transcript() -> Option<String> {
    Some("user: please fix the flaky test\nassistant: done, root cause was a race".to_string())
}

#[test]
fn reflection_curates_adds_into_global_store() {
    let dir = tempfile::tempdir().unwrap();
    let service = build_service(dir.path());

    let source = StubSource {
        sessions: vec![("sessions/a.jsonl".to_string(), long_transcript())],
    };
    let reflector = StubReflector::returning(vec![Delta::Add {
        draft: DraftBullet::new("reproduce a flaky test before fixing it"),
        source_session: Some("sessions/a.jsonl".to_string()),
    }]);
    let validator = AcceptAll::new();

    let outcome = service
        .run(&source, &reflector, &validator, &ReflectionOptions::default())
        .unwrap();

    assert_eq!(outcome.sessions_processed, 1);
    assert_eq!(outcome.deltas_generated, 1);
    assert!(outcome.errors.is_empty());

    let global = outcome.global_result.expect("global store curated");
    assert_eq!(global.applied, 1);
    assert!(outcome.workspace_result.is_none());

    // The add was validated.
    assert_eq!(
        validator.seen.lock().unwrap().as_slice(),
        ["reproduce a flaky test before fixing it"]
    );

    // Persisted to disk.
    let playbook = PlaybookStore::new(dir.path().join("global")).load().unwrap();
    assert_eq!(playbook.bullets.len(), 1);
}

#[test]
fn feedback_routes_to_workspace_store_first() {
    let dir = tempfile::tempdir().unwrap();
    let service = build_service(dir.path());
    let now = Utc::now();

    // The referenced bullet lives in the workspace store.
    PlaybookStore::new(dir.path().join("workspace"))
        .update(|playbook| {
            playbook
                .bullets
                .push(Bullet::new(BulletId::new("w-1"), "workspace rule", now));
            Ok(())
        })
        .unwrap();

    let source = StubSource {
        sessions: vec![("sessions/a.jsonl".to_string(), long_transcript())],
    };
    let reflector = StubReflector::returning(vec![Delta::Helpful {
        bullet_id: BulletId::new("w-1"),
        source_session: Some("sessions/a.jsonl".to_string()),
    }]);

    let outcome = service
        .run(
            &source,
            &reflector,
            &AcceptAll::new(),
            &ReflectionOptions::default(),
        )
        .unwrap();

    assert!(outcome.global_result.is_none());
    let workspace = outcome.workspace_result.expect("workspace curated");
    assert_eq!(workspace.applied, 1);

    let playbook = PlaybookStore::new(dir.path().join("workspace")).load().unwrap();
    assert_eq!(playbook.bullets[0].helpful_count, 1);
}

#[test]
fn dry_run_persists_nothing_but_the_log() {
    let dir = tempfile::tempdir().unwrap();
    let service = build_service(dir.path());

    let source = StubSource {
        sessions: vec![("sessions/a.jsonl".to_string(), long_transcript())],
    };
    let reflector = StubReflector::returning(vec![Delta::Add {
        draft: DraftBullet::new("some new rule"),
        source_session: None,
    }]);

    let outcome = service
        .run(
            &source,
            &reflector,
            &AcceptAll::new(),
            &ReflectionOptions {
                dry_run: true,
                ..ReflectionOptions::default()
            },
        )
        .unwrap();

    assert_eq!(outcome.deltas.len(), 1);
    assert!(outcome.global_result.is_none());
    let playbook = PlaybookStore::new(dir.path().join("global")).load().unwrap();
    assert!(playbook.bullets.is_empty());
}

#[test]
fn short_sessions_are_marked_processed_without_reflection() {
    let dir = tempfile::tempdir().unwrap();
    let service = build_service(dir.path());

    let source = StubSource {
        sessions: vec![
            ("sessions/short.jsonl".to_string(), Some("hi".to_string())),
            ("sessions/gone.jsonl".to_string(), None),
        ],
    };
    let reflector = StubReflector::returning(vec![]);

    let outcome = service
        .run(
            &source,
            &reflector,
            &AcceptAll::new(),
            &ReflectionOptions::default(),
        )
        .unwrap();

    assert_eq!(outcome.sessions_processed, 0);
    assert_eq!(outcome.sessions_skipped, 2);
    assert_eq!(reflector.calls.load(Ordering::SeqCst), 0);

    // Both sessions are in the log, so a second run discovers nothing.
    let outcome = service
        .run(
            &source,
            &reflector,
            &AcceptAll::new(),
            &ReflectionOptions::default(),
        )
        .unwrap();
    assert_eq!(outcome.sessions_skipped, 0);
}

#[test]
fn validator_rejections_drop_adds_but_not_feedback() {
    let dir = tempfile::tempdir().unwrap();
    let service = build_service(dir.path());
    let now = Utc::now();

    PlaybookStore::new(dir.path().join("global"))
        .update(|playbook| {
            playbook
                .bullets
                .push(Bullet::new(BulletId::new("g-1"), "existing rule", now));
            Ok(())
        })
        .unwrap();

    let source = StubSource {
        sessions: vec![("sessions/a.jsonl".to_string(), long_transcript())],
    };
    let reflector = StubReflector::returning(vec![
        Delta::Add {
            draft: DraftBullet::new("low quality observation"),
            source_session: None,
        },
        Delta::Helpful {
            bullet_id: BulletId::new("g-1"),
            source_session: None,
        },
    ]);

    let outcome = service
        .run(&source, &reflector, &RejectAll, &ReflectionOptions::default())
        .unwrap();

    assert_eq!(outcome.deltas_rejected, 1);
    assert_eq!(outcome.deltas_generated, 1);
    let global = outcome.global_result.expect("feedback still curated");
    assert_eq!(global.applied, 1);
}

#[test]
fn failing_sessions_do_not_abort_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let service = build_service(dir.path());

    let source = StubSource {
        sessions: vec![
            ("sessions/a.jsonl".to_string(), long_transcript()),
            ("sessions/b.jsonl".to_string(), long_transcript()),
        ],
    };

    let outcome = service
        .run(
            &source,
            &FailingReflector,
            &AcceptAll::new(),
            &ReflectionOptions::default(),
        )
        .unwrap();

    assert_eq!(outcome.sessions_processed, 0);
    assert_eq!(outcome.errors.len(), 2);
    assert!(outcome.is_total_failure());

    // Failed sessions were not marked processed; they are retried later.
    let retry = service
        .run(
            &source,
            &StubReflector::returning(vec![]),
            &AcceptAll::new(),
            &ReflectionOptions::default(),
        )
        .unwrap();
    assert_eq!(retry.sessions_processed, 2);
}

#[test]
fn concurrent_merges_do_not_deadlock() {
    // Scenario: several invocations hammer the same global + workspace
    // store pair. Every path takes the global lock before the workspace
    // lock, so the interleaving must always make progress.
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();

    let now = Utc::now();
    PlaybookStore::new(root.join("workspace"))
        .update(|playbook| {
            playbook
                .bullets
                .push(Bullet::new(BulletId::new("w-1"), "workspace rule", now));
            Ok(())
        })
        .unwrap();

    let threads: Vec<_> = (0..6)
        .map(|i| {
            let root = root.clone();
            thread::spawn(move || {
                let stores = StoreSet::new(
                    PlaybookStore::new(root.join("global")),
                    Some(PlaybookStore::new(root.join("workspace"))),
                );
                let curation =
                    CurationService::new(ScoringConfig::default(), CurationConfig::default());
                let processed =
                    ProcessedLogStore::for_workspace(&root.join("data"), &root.join("repo"));
                let service = ReflectionService::new(
                    stores,
                    processed,
                    curation,
                    tacit::services::ReflectionConfig::default(),
                );

                // Alternate between a global add and workspace feedback so
                // both stores are contended.
                let deltas = if i % 2 == 0 {
                    vec![Delta::Add {
                        draft: DraftBullet::new(format!("rule from invocation {i}")),
                        source_session: None,
                    }]
                } else {
                    vec![Delta::Helpful {
                        bullet_id: BulletId::new("w-1"),
                        source_session: None,
                    }]
                };
                service.merge_deltas(deltas).unwrap();
            })
        })
        .collect();

    for handle in threads {
        handle.join().unwrap();
    }

    // All updates landed: no lost updates, no deadlock.
    let workspace = PlaybookStore::new(root.join("workspace")).load().unwrap();
    assert_eq!(workspace.bullets[0].helpful_count, 3);
    let global = PlaybookStore::new(root.join("global")).load().unwrap();
    assert_eq!(global.bullets.len(), 3);
}

#[test]
fn explicit_session_override_reflects_processed_sessions_again() {
    let dir = tempfile::tempdir().unwrap();
    let service = build_service(dir.path());

    let source = StubSource {
        sessions: vec![("sessions/a.jsonl".to_string(), long_transcript())],
    };
    let reflector = StubReflector::returning(vec![]);

    // First run processes the session.
    service
        .run(
            &source,
            &reflector,
            &AcceptAll::new(),
            &ReflectionOptions::default(),
        )
        .unwrap();
    assert_eq!(reflector.calls.load(Ordering::SeqCst), 1);

    // The override forces it through again.
    service
        .run(
            &source,
            &reflector,
            &AcceptAll::new(),
            &ReflectionOptions {
                session: Some("sessions/a.jsonl".to_string()),
                ..ReflectionOptions::default()
            },
        )
        .unwrap();
    assert_eq!(reflector.calls.load(Ordering::SeqCst), 2);
}
