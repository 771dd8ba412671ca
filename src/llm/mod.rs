//! LLM client abstraction and the reflection/validation collaborators.
//!
//! Provides a unified interface for LLM providers plus the two thin
//! collaborators the orchestrator consumes: a [`Reflector`] that proposes
//! playbook deltas from a session transcript, and a [`DeltaValidator`]
//! that screens proposed adds. Both are traits so tests can substitute
//! deterministic stubs for the network clients.

mod anthropic;
mod ollama;

pub use anthropic::AnthropicClient;
pub use ollama::OllamaClient;

use crate::models::{Delta, DraftBullet};
use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

/// Trait for LLM providers.
pub trait LlmProvider: Send + Sync {
    /// The provider name.
    fn name(&self) -> &'static str;

    /// Generates a completion for the given prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the completion fails.
    fn complete(&self, prompt: &str) -> Result<String>;

    /// Generates a completion with a system prompt.
    ///
    /// Default implementation concatenates system and user prompts.
    /// Providers should override this to use native system prompt support.
    ///
    /// # Errors
    ///
    /// Returns an error if the completion fails.
    fn complete_with_system(&self, system: &str, user: &str) -> Result<String> {
        let combined = format!("{system}\n\n---\n\nUser message:\n{user}");
        self.complete(&combined)
    }
}

/// HTTP client configuration for LLM providers.
#[derive(Debug, Clone, Copy)]
pub struct LlmHttpConfig {
    /// Request timeout in milliseconds (0 to disable).
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds (0 to disable).
    pub connect_timeout_ms: u64,
}

impl Default for LlmHttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            connect_timeout_ms: 5_000,
        }
    }
}

impl LlmHttpConfig {
    /// Reads timeouts from `TACIT_LLM_TIMEOUT_MS` and
    /// `TACIT_LLM_CONNECT_TIMEOUT_MS`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ms) = std::env::var("TACIT_LLM_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.timeout_ms = ms;
        }
        if let Some(ms) = std::env::var("TACIT_LLM_CONNECT_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.connect_timeout_ms = ms;
        }
        config
    }
}

/// Builds a blocking HTTP client with the configured timeouts.
#[must_use]
pub fn build_http_client(config: LlmHttpConfig) -> reqwest::blocking::Client {
    let mut builder = reqwest::blocking::Client::builder();
    if config.timeout_ms > 0 {
        builder = builder.timeout(Duration::from_millis(config.timeout_ms));
    }
    if config.connect_timeout_ms > 0 {
        builder = builder.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
    }
    builder.build().unwrap_or_default()
}

/// Proposes playbook deltas from a session transcript.
pub trait Reflector {
    /// Distills a session into candidate deltas.
    ///
    /// `playbook_summary` lists the existing active bullets (so the
    /// reflector can propose feedback rather than duplicate adds) and
    /// `history` carries recent processed-session context.
    ///
    /// # Errors
    ///
    /// Returns an error if the reflection fails.
    fn reflect(&self, session: &str, playbook_summary: &str, history: &str) -> Result<Vec<Delta>>;
}

/// Screens a proposed add delta.
pub trait DeltaValidator {
    /// Judges whether a draft bullet is a usable behavioral rule.
    ///
    /// Only add deltas are validated; every other delta kind bypasses
    /// validation unconditionally.
    ///
    /// # Errors
    ///
    /// Returns an error if the validation call fails.
    fn validate(&self, draft: &DraftBullet) -> Result<Validation>;
}

/// Outcome of validating an add delta.
#[derive(Debug, Clone, Deserialize)]
pub struct Validation {
    /// Whether the draft should be kept.
    pub valid: bool,
    /// Why the draft was rejected, when it was.
    #[serde(default)]
    pub reason: Option<String>,
}

/// System prompt for reflection.
const REFLECTION_SYSTEM_PROMPT: &str = "\
You distill AI coding sessions into playbook deltas. Respond with a JSON \
array only. Each element is one of:
  {\"type\":\"add\",\"draft\":{\"content\":\"...\",\"category\":\"...\"}}
  {\"type\":\"helpful\",\"bullet_id\":\"...\"}
  {\"type\":\"harmful\",\"bullet_id\":\"...\",\"reason\":\"...\"}
  {\"type\":\"replace\",\"bullet_id\":\"...\",\"new_content\":\"...\"}
  {\"type\":\"merge\",\"bullet_ids\":[\"...\",\"...\"]}
Propose feedback on existing bullets over new adds. Content must be a \
single imperative sentence.";

/// System prompt for add validation.
const VALIDATION_SYSTEM_PROMPT: &str = "\
You screen proposed playbook rules. A usable rule is actionable, general \
beyond one task, and not a restatement of tool output. Respond with JSON \
only: {\"valid\":true} or {\"valid\":false,\"reason\":\"...\"}.";

/// Matches a fenced JSON block in an LLM response.
#[allow(clippy::unwrap_used)] // pattern is a compile-time constant
static JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)```").unwrap());

/// Extracts the JSON payload from an LLM response, stripping markdown
/// fences and surrounding prose.
#[must_use]
fn extract_json(response: &str) -> &str {
    if let Some(captures) = JSON_FENCE.captures(response) {
        if let Some(inner) = captures.get(1) {
            return inner.as_str().trim();
        }
    }
    let trimmed = response.trim();
    // Fall back to the outermost bracketed region.
    let start = trimmed.find(['[', '{']);
    let end = trimmed.rfind([']', '}']);
    match (start, end) {
        (Some(s), Some(e)) if e >= s => &trimmed[s..=e],
        _ => trimmed,
    }
}

/// Reflector backed by an LLM provider.
pub struct LlmReflector<P: LlmProvider> {
    provider: P,
}

impl<P: LlmProvider> LlmReflector<P> {
    /// Wraps a provider.
    #[must_use]
    pub const fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl<P: LlmProvider> Reflector for LlmReflector<P> {
    fn reflect(&self, session: &str, playbook_summary: &str, history: &str) -> Result<Vec<Delta>> {
        let user = format!(
            "Existing bullets:\n{playbook_summary}\n\nRecent history:\n{history}\n\nSession transcript:\n{session}"
        );
        let response = self
            .provider
            .complete_with_system(REFLECTION_SYSTEM_PROMPT, &user)?;
        parse_deltas(&response)
    }
}

/// Parses an LLM response into deltas, dropping elements that do not
/// deserialize rather than failing the whole batch.
///
/// # Errors
///
/// Returns an error only when the response contains no JSON array at all.
pub fn parse_deltas(response: &str) -> Result<Vec<Delta>> {
    let payload = extract_json(response);
    let values: Vec<serde_json::Value> =
        serde_json::from_str(payload).map_err(|e| Error::OperationFailed {
            operation: "parse_reflection".to_string(),
            cause: e.to_string(),
        })?;

    let mut deltas = Vec::with_capacity(values.len());
    for value in values {
        match serde_json::from_value::<Delta>(value) {
            Ok(delta) => deltas.push(delta),
            Err(e) => warn!(error = %e, "dropping malformed delta from reflection"),
        }
    }
    Ok(deltas)
}

/// Validator backed by an LLM provider.
pub struct LlmDeltaValidator<P: LlmProvider> {
    provider: P,
}

impl<P: LlmProvider> LlmDeltaValidator<P> {
    /// Wraps a provider.
    #[must_use]
    pub const fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl<P: LlmProvider> DeltaValidator for LlmDeltaValidator<P> {
    fn validate(&self, draft: &DraftBullet) -> Result<Validation> {
        let user = format!("Proposed rule:\n{}", draft.content);
        let response = self
            .provider
            .complete_with_system(VALIDATION_SYSTEM_PROMPT, &user)?;
        serde_json::from_str(extract_json(&response)).map_err(|e| Error::OperationFailed {
            operation: "parse_validation".to_string(),
            cause: e.to_string(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_fence() {
        let response = "Here you go:\n```json\n[{\"type\":\"helpful\",\"bullet_id\":\"b\"}]\n```\nDone.";
        assert_eq!(
            extract_json(response),
            "[{\"type\":\"helpful\",\"bullet_id\":\"b\"}]"
        );
    }

    #[test]
    fn test_extract_json_from_prose() {
        let response = "Sure! [1, 2] is the answer.";
        assert_eq!(extract_json(response), "[1, 2]");
    }

    #[test]
    fn test_parse_deltas_drops_malformed_elements() {
        let response = r#"[
            {"type":"helpful","bullet_id":"b-1"},
            {"type":"unknown_kind","x":1},
            {"type":"add","draft":{"content":"keep PRs small"}}
        ]"#;
        let deltas = parse_deltas(response).unwrap();
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].kind(), "helpful");
        assert_eq!(deltas[1].kind(), "add");
    }

    #[test]
    fn test_parse_deltas_rejects_non_array() {
        assert!(parse_deltas("no json here at all").is_err());
    }

    #[test]
    fn test_validation_parses() {
        let validation: Validation =
            serde_json::from_str(r#"{"valid":false,"reason":"too task-specific"}"#).unwrap();
        assert!(!validation.valid);
        assert_eq!(validation.reason.as_deref(), Some("too task-specific"));
    }
}
