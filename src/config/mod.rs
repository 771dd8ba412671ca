//! Configuration management.
//!
//! Configuration layers, lowest precedence first: built-in defaults, the
//! `tacit.toml` config file, then `TACIT_*` environment variables. The
//! workspace store location is not configured; it is discovered from the
//! enclosing git repository.

use crate::scoring::ScoringConfig;
use crate::services::{CurationConfig, ReflectionConfig};
use crate::storage::{PlaybookStore, ProcessedLogStore, StoreSet};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Directory name of the workspace store at the repository root.
pub const WORKSPACE_STORE_DIR: &str = ".tacit";

/// Main configuration for tacit.
#[derive(Debug, Clone)]
pub struct TacitConfig {
    /// Root of the global store and auxiliary data.
    pub data_dir: PathBuf,
    /// Resolved workspace (repository) root, when inside one.
    pub workspace_root: Option<PathBuf>,
    /// Directory scanned for session transcripts.
    pub sessions_dir: PathBuf,
    /// External session exporter command, if any.
    pub export_command: Option<String>,
    /// Scoring model configuration.
    pub scoring: ScoringConfig,
    /// Curation pipeline configuration.
    pub curation: CurationConfig,
    /// Reflection orchestration configuration.
    pub reflection: ReflectionConfig,
    /// LLM provider configuration.
    pub llm: LlmConfig,
}

/// LLM provider configuration.
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    /// Provider name: "anthropic" or "ollama".
    pub provider: LlmProviderKind,
    /// Model name override.
    pub model: Option<String>,
    /// API key (falls back to the provider's environment variable).
    pub api_key: Option<String>,
    /// Base URL for self-hosted endpoints.
    pub base_url: Option<String>,
}

/// Available LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProviderKind {
    /// Anthropic Claude.
    #[default]
    Anthropic,
    /// Ollama (local).
    Ollama,
}

impl LlmProviderKind {
    /// Parses a provider string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "ollama" => Self::Ollama,
            _ => Self::Anthropic,
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Sessions directory.
    pub sessions_dir: Option<String>,
    /// External exporter command.
    pub export_command: Option<String>,
    /// Legacy top-level prune threshold; folded into `[scoring]`.
    pub prune_harmful_threshold: Option<f64>,
    /// Legacy top-level dedup threshold; folded into `[curation]`.
    pub dedup_similarity_threshold: Option<f64>,
    /// Scoring section.
    pub scoring: Option<ConfigFileScoring>,
    /// Curation section.
    pub curation: Option<CurationConfig>,
    /// Reflection section.
    pub reflection: Option<ReflectionConfig>,
    /// LLM section.
    pub llm: Option<ConfigFileLlm>,
}

/// Scoring section in the config file.
///
/// `half_life_days` is the legacy spelling of `decay_half_life_days` and
/// is honored when the current key is absent.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileScoring {
    /// Decay half-life in days.
    pub decay_half_life_days: Option<f64>,
    /// Legacy half-life key.
    pub half_life_days: Option<f64>,
    /// Harmful multiplier.
    pub harmful_multiplier: Option<f64>,
    /// Feedback floor to leave `candidate`.
    pub min_feedback_for_active: Option<f64>,
    /// Helpful floor for `proven`.
    pub min_helpful_for_proven: Option<f64>,
    /// Harmful ratio ceiling for `proven`.
    pub max_harmful_ratio_for_proven: Option<f64>,
    /// Auto-deprecate threshold.
    pub prune_harmful_threshold: Option<f64>,
    /// Staleness horizon in days.
    pub stale_days: Option<i64>,
}

/// LLM section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLlm {
    /// Provider name.
    pub provider: Option<String>,
    /// Model name.
    pub model: Option<String>,
    /// API key.
    pub api_key: Option<String>,
    /// Base URL.
    pub base_url: Option<String>,
}

impl Default for TacitConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            sessions_dir: data_dir.join("sessions"),
            data_dir,
            workspace_root: discover_workspace(Path::new(".")),
            export_command: None,
            scoring: ScoringConfig::default(),
            curation: CurationConfig::default(),
            reflection: ReflectionConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl TacitConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: format!("{}: {e}", path.display()),
            })?;

        let file: ConfigFile =
            toml::from_str(&contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location, falling back to
    /// defaults when no config file exists.
    #[must_use]
    pub fn load_default() -> Self {
        let path = std::env::var("TACIT_CONFIG_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map_or_else(default_config_path, PathBuf::from);

        let mut config = if path.exists() {
            Self::load_from_file(&path).unwrap_or_default()
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config
    }

    /// Builds a configuration from a parsed config file.
    #[must_use]
    pub fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(dir) = file.data_dir {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = file.sessions_dir {
            config.sessions_dir = PathBuf::from(dir);
        }
        config.export_command = file.export_command;

        if let Some(scoring) = file.scoring {
            let s = &mut config.scoring;
            // Legacy `half_life_days` is honored when the current key is
            // absent.
            if let Some(days) = scoring.decay_half_life_days.or(scoring.half_life_days) {
                s.decay_half_life_days = days;
            }
            if let Some(v) = scoring.harmful_multiplier {
                s.harmful_multiplier = v;
            }
            if let Some(v) = scoring.min_feedback_for_active {
                s.min_feedback_for_active = v;
            }
            if let Some(v) = scoring.min_helpful_for_proven {
                s.min_helpful_for_proven = v;
            }
            if let Some(v) = scoring.max_harmful_ratio_for_proven {
                s.max_harmful_ratio_for_proven = v;
            }
            if let Some(v) = scoring.prune_harmful_threshold {
                s.prune_harmful_threshold = v;
            }
            if let Some(v) = scoring.stale_days {
                s.stale_days = v;
            }
        }
        if let Some(threshold) = file.prune_harmful_threshold {
            config.scoring.prune_harmful_threshold = threshold;
        }

        if let Some(curation) = file.curation {
            config.curation = curation;
        }
        if let Some(threshold) = file.dedup_similarity_threshold {
            config.curation.dedup_similarity_threshold = threshold;
        }
        if let Some(reflection) = file.reflection {
            config.reflection = reflection;
        }

        if let Some(llm) = file.llm {
            config.llm = LlmConfig {
                provider: llm
                    .provider
                    .as_deref()
                    .map(LlmProviderKind::parse)
                    .unwrap_or_default(),
                model: llm.model,
                api_key: llm.api_key,
                base_url: llm.base_url,
            };
        }

        config
    }

    /// Applies `TACIT_*` environment overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("TACIT_DATA_DIR") {
            if !dir.trim().is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(dir) = std::env::var("TACIT_SESSIONS_DIR") {
            if !dir.trim().is_empty() {
                self.sessions_dir = PathBuf::from(dir);
            }
        }
    }

    /// Re-resolves the workspace root from the given directory.
    #[must_use]
    pub fn with_workspace_from(mut self, cwd: &Path) -> Self {
        self.workspace_root = discover_workspace(cwd);
        self
    }

    /// Directory of the global store.
    #[must_use]
    pub fn global_store_dir(&self) -> PathBuf {
        self.data_dir.join("global")
    }

    /// Directory of the workspace store, when inside a workspace.
    #[must_use]
    pub fn workspace_store_dir(&self) -> Option<PathBuf> {
        self.workspace_root
            .as_ref()
            .map(|root| root.join(WORKSPACE_STORE_DIR))
    }

    /// Builds the store set for this configuration.
    #[must_use]
    pub fn store_set(&self) -> StoreSet {
        StoreSet::new(
            PlaybookStore::new(self.global_store_dir()),
            self.workspace_store_dir().map(PlaybookStore::new),
        )
    }

    /// Builds the processed-log store for the current workspace.
    ///
    /// Outside a workspace the log is keyed to the global store
    /// directory, so standalone runs still serialize.
    #[must_use]
    pub fn processed_log(&self) -> ProcessedLogStore {
        let key_path = self
            .workspace_root
            .clone()
            .unwrap_or_else(|| self.global_store_dir());
        ProcessedLogStore::for_workspace(&self.data_dir, &key_path)
    }
}

/// Resolves the default data directory.
fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".tacit-data"),
        |base| base.data_local_dir().join("tacit"),
    )
}

/// Resolves the default config file path.
fn default_config_path() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("tacit.toml"),
        |base| base.config_dir().join("tacit").join("tacit.toml"),
    )
}

/// Finds the enclosing git repository's working directory.
fn discover_workspace(cwd: &Path) -> Option<PathBuf> {
    let repo = git2::Repository::discover(cwd).ok()?;
    repo.workdir().map(Path::to_path_buf)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TacitConfig::from_config_file(ConfigFile::default());
        assert!(
            (config.scoring.decay_half_life_days
                - crate::scoring::DEFAULT_DECAY_HALF_LIFE_DAYS)
                .abs()
                < f64::EPSILON
        );
        assert_eq!(config.llm.provider, LlmProviderKind::Anthropic);
    }

    #[test]
    fn test_parse_full_config() {
        let file: ConfigFile = toml::from_str(
            r#"
            data_dir = "/tmp/tacit-data"
            export_command = "claude-sessions"

            [scoring]
            decay_half_life_days = 30
            harmful_multiplier = 2.0

            [curation]
            dedup_similarity_threshold = 0.9

            [reflection]
            max_sessions = 3

            [llm]
            provider = "ollama"
            model = "qwen2.5"
            "#,
        )
        .unwrap();
        let config = TacitConfig::from_config_file(file);

        assert_eq!(config.data_dir, PathBuf::from("/tmp/tacit-data"));
        assert_eq!(config.export_command.as_deref(), Some("claude-sessions"));
        assert!((config.scoring.decay_half_life_days - 30.0).abs() < f64::EPSILON);
        assert!((config.scoring.harmful_multiplier - 2.0).abs() < f64::EPSILON);
        assert!((config.curation.dedup_similarity_threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.reflection.max_sessions, 3);
        assert_eq!(config.llm.provider, LlmProviderKind::Ollama);
        assert_eq!(config.llm.model.as_deref(), Some("qwen2.5"));
    }

    #[test]
    fn test_legacy_half_life_key() {
        let file: ConfigFile = toml::from_str(
            r"
            [scoring]
            half_life_days = 45
            ",
        )
        .unwrap();
        let config = TacitConfig::from_config_file(file);
        assert!((config.scoring.decay_half_life_days - 45.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_legacy_top_level_thresholds() {
        let file: ConfigFile = toml::from_str(
            r"
            prune_harmful_threshold = 5.0
            dedup_similarity_threshold = 0.8
            ",
        )
        .unwrap();
        let config = TacitConfig::from_config_file(file);
        assert!((config.scoring.prune_harmful_threshold - 5.0).abs() < f64::EPSILON);
        assert!((config.curation.dedup_similarity_threshold - 0.8).abs() < f64::EPSILON);
    }
}
