//! Binary entry point for tacit.
//!
//! This binary provides the CLI interface for the tacit playbook system.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow unnecessary_wraps for consistent command function signatures
#![allow(clippy::unnecessary_wraps)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::bail;
use chrono::Utc;
use clap::{CommandFactory, Parser, Subcommand};
use std::process::ExitCode;
use tacit::config::{LlmProviderKind, TacitConfig};
use tacit::llm::{
    AnthropicClient, DeltaValidator, LlmDeltaValidator, LlmReflector, OllamaClient, Reflector,
};
use tacit::models::{BlockedEntry, Bullet, BulletId, Delta, DraftBullet, Maturity, Scope};
use tacit::scoring;
use tacit::services::{
    CurationService, ReflectionOptions, ReflectionOutcome, ReflectionService,
};
use tacit::sessions::FileSessionSource;

/// Tacit - a self-curating playbook of behavioral rules for AI coding
/// assistants.
#[derive(Parser)]
#[command(name = "tacit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Reflect on recent sessions and curate the playbook.
    Reflect {
        /// Reflect on a single session path, even if already processed.
        #[arg(long)]
        session: Option<String>,

        /// Only consider sessions from the last N days.
        #[arg(long)]
        days: Option<u32>,

        /// Maximum number of sessions to process.
        #[arg(long)]
        max: Option<usize>,

        /// Only consider sessions for this agent.
        #[arg(long)]
        agent: Option<String>,

        /// Collect deltas without persisting them.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show playbook status and score distribution.
    Status,

    /// Show active playbook bullets.
    Show {
        /// Filter by scope: global or workspace.
        #[arg(short, long)]
        scope: Option<String>,

        /// Include deprecated bullets.
        #[arg(long)]
        all: bool,

        /// Output format: table, json, or yaml.
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Add a rule manually.
    Add {
        /// The rule content.
        content: String,

        /// Category for the rule.
        #[arg(long)]
        category: Option<String>,

        /// Target scope: global or workspace.
        #[arg(long, default_value = "global")]
        scope: String,
    },

    /// Record manual feedback on a bullet.
    Feedback {
        /// The bullet id.
        bullet_id: String,

        /// The rule helped.
        #[arg(long, conflicts_with = "harmful")]
        helpful: bool,

        /// The rule hurt.
        #[arg(long)]
        harmful: bool,

        /// Why the rule hurt.
        #[arg(long)]
        reason: Option<String>,
    },

    /// Reject a rule and block its content from recurring.
    Forget {
        /// The bullet id.
        bullet_id: String,

        /// Why the rule is rejected.
        #[arg(long)]
        reason: Option<String>,
    },

    /// Hard-remove retired bullets that proved harmful.
    Prune {
        /// Show what would be removed without removing it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Manage configuration.
    Config {
        /// Show current configuration.
        #[arg(long)]
        show: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Shell: bash, zsh, fish, elvish, or powershell.
        shell: clap_complete::Shell,
    },
}

/// Main entry point.
fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    match run_command(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Initializes tracing to stderr with env-filter control.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_filter = if verbose { "tacit=debug" } else { "tacit=warn" };
    let filter = EnvFilter::try_from_env("TACIT_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads configuration.
fn load_config(path: Option<&str>) -> anyhow::Result<TacitConfig> {
    let cwd = std::env::current_dir()?;
    let config = match path {
        Some(config_path) => TacitConfig::load_from_file(std::path::Path::new(config_path))?,
        None => TacitConfig::load_default(),
    };
    Ok(config.with_workspace_from(&cwd))
}

/// Runs the selected command.
fn run_command(cli: Cli, config: TacitConfig) -> anyhow::Result<()> {
    match cli.command {
        Commands::Reflect {
            session,
            days,
            max,
            agent,
            dry_run,
        } => cmd_reflect(&config, session, days, max, agent, dry_run),

        Commands::Status => cmd_status(&config),

        Commands::Show { scope, all, format } => cmd_show(&config, scope, all, format),

        Commands::Add {
            content,
            category,
            scope,
        } => cmd_add(&config, content, category, scope),

        Commands::Feedback {
            bullet_id,
            helpful,
            harmful,
            reason,
        } => cmd_feedback(&config, bullet_id, helpful, harmful, reason),

        Commands::Forget { bullet_id, reason } => cmd_forget(&config, bullet_id, reason),

        Commands::Prune { dry_run } => cmd_prune(&config, dry_run),

        Commands::Config { show } => cmd_config(&config, show),

        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "tacit", &mut std::io::stdout());
            Ok(())
        },
    }
}

/// Builds the reflection service from configuration.
fn build_reflection_service(config: &TacitConfig) -> ReflectionService {
    ReflectionService::new(
        config.store_set(),
        config.processed_log(),
        CurationService::new(config.scoring.clone(), config.curation.clone()),
        config.reflection.clone(),
    )
}

/// Builds the reflector and validator for the configured LLM provider.
fn build_llm(config: &TacitConfig) -> (Box<dyn Reflector>, Box<dyn DeltaValidator>) {
    match config.llm.provider {
        LlmProviderKind::Ollama => {
            let build = || {
                let mut client = OllamaClient::new();
                if let Some(model) = &config.llm.model {
                    client = client.with_model(model);
                }
                if let Some(base_url) = &config.llm.base_url {
                    client = client.with_endpoint(base_url);
                }
                client
            };
            (
                Box::new(LlmReflector::new(build())) as Box<dyn Reflector>,
                Box::new(LlmDeltaValidator::new(build())) as Box<dyn DeltaValidator>,
            )
        },
        LlmProviderKind::Anthropic => {
            let build = || {
                let mut client = AnthropicClient::new();
                if let Some(key) = &config.llm.api_key {
                    client = client.with_api_key(key);
                }
                if let Some(model) = &config.llm.model {
                    client = client.with_model(model);
                }
                if let Some(base_url) = &config.llm.base_url {
                    client = client.with_endpoint(base_url);
                }
                client
            };
            (
                Box::new(LlmReflector::new(build())) as Box<dyn Reflector>,
                Box::new(LlmDeltaValidator::new(build())) as Box<dyn DeltaValidator>,
            )
        },
    }
}

/// Reflect command.
fn cmd_reflect(
    config: &TacitConfig,
    session: Option<String>,
    days: Option<u32>,
    max: Option<usize>,
    agent: Option<String>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let service = build_reflection_service(config);
    let mut source = FileSessionSource::new(&config.sessions_dir);
    if let Some(command) = &config.export_command {
        source = source.with_export_command(command);
    }
    let (reflector, validator) = build_llm(config);

    let options = ReflectionOptions {
        session,
        days,
        max_sessions: max,
        agent,
        dry_run,
    };
    let outcome = service.run(&source, reflector.as_ref(), validator.as_ref(), &options)?;
    report_reflection(&outcome, dry_run);

    if outcome.is_total_failure() {
        bail!("all {} session(s) failed", outcome.errors.len());
    }
    Ok(())
}

/// Prints a reflection outcome.
fn report_reflection(outcome: &ReflectionOutcome, dry_run: bool) {
    println!("Reflection complete:");
    println!("  Sessions processed: {}", outcome.sessions_processed);
    println!("  Sessions skipped: {}", outcome.sessions_skipped);
    println!("  Deltas accepted: {}", outcome.deltas_generated);
    println!("  Deltas rejected: {}", outcome.deltas_rejected);

    if dry_run {
        println!();
        println!("Dry run - proposed deltas:");
        for delta in &outcome.deltas {
            match delta {
                Delta::Add { draft, .. } => println!("  add: {}", draft.content),
                Delta::Helpful { bullet_id, .. } => println!("  helpful: {bullet_id}"),
                Delta::Harmful { bullet_id, reason, .. } => println!(
                    "  harmful: {bullet_id} ({})",
                    reason.as_deref().unwrap_or("no reason")
                ),
                Delta::Replace { bullet_id, .. } => println!("  replace: {bullet_id}"),
                Delta::Merge { bullet_ids, .. } => println!("  merge: {} bullets", bullet_ids.len()),
            }
        }
    }

    for (store, result) in [
        ("global", outcome.global_result.as_ref()),
        ("workspace", outcome.workspace_result.as_ref()),
    ] {
        if let Some(result) = result {
            println!("  {store}: {}", result.summary());
        }
    }

    if !outcome.errors.is_empty() {
        println!();
        println!("Session errors ({}):", outcome.errors.len());
        for error in &outcome.errors {
            println!("  {}: {}", error.session, error.message);
        }
    }
}

/// Status command.
fn cmd_status(config: &TacitConfig) -> anyhow::Result<()> {
    let stores = config.store_set();
    let bullets = stores.load_merged_snapshot()?;
    let now = Utc::now();

    println!("Tacit Status");
    println!("============");
    println!();
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Global store: {}", stores.global().dir().display());
    match stores.workspace() {
        Some(workspace) => println!("Workspace store: {}", workspace.dir().display()),
        None => println!("Workspace store: (not in a workspace)"),
    }
    println!();

    let mut by_maturity = [0_usize; 4];
    for bullet in bullets.iter().filter(|b| b.is_active()) {
        let index = match bullet.maturity {
            Maturity::Candidate => 0,
            Maturity::Established => 1,
            Maturity::Proven => 2,
            Maturity::Deprecated => 3,
        };
        by_maturity[index] += 1;
    }
    let deprecated = bullets.iter().filter(|b| !b.is_active()).count();
    println!("Bullets: {} active, {} deprecated", bullets.len() - deprecated, deprecated);
    println!("  Candidate: {}", by_maturity[0]);
    println!("  Established: {}", by_maturity[1]);
    println!("  Proven: {}", by_maturity[2]);
    println!();

    let active: Vec<Bullet> = bullets.iter().filter(|b| b.is_active()).cloned().collect();
    let dist = scoring::analyze_score_distribution(&active, now, &config.scoring);
    println!("Score distribution:");
    println!("  Excellent (>=10): {}", dist.excellent);
    println!("  Good (>=5): {}", dist.good);
    println!("  Neutral (>=0): {}", dist.neutral);
    println!("  At risk (<0): {}", dist.at_risk);

    let stale = active
        .iter()
        .filter(|b| scoring::is_stale(b, now, config.scoring.stale_days))
        .count();
    println!();
    println!("Stale bullets (no recent feedback): {stale}");

    Ok(())
}

/// Show command.
fn cmd_show(
    config: &TacitConfig,
    scope: Option<String>,
    all: bool,
    format: String,
) -> anyhow::Result<()> {
    let stores = config.store_set();
    let bullets = stores.load_merged_snapshot()?;
    let scope_filter = scope.as_deref().map(Scope::parse);
    if matches!(scope_filter, Some(None)) {
        bail!("unknown scope: {}", scope.unwrap_or_default());
    }
    let scope_filter = scope_filter.flatten();

    let selected: Vec<&Bullet> = bullets
        .iter()
        .filter(|b| all || b.is_active())
        .filter(|b| scope_filter.is_none_or(|s| b.scope == s))
        .collect();

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&selected)?),
        "yaml" => print!("{}", serde_yaml_ng::to_string(&selected)?),
        _ => {
            if selected.is_empty() {
                println!("No bullets.");
            }
            for bullet in selected {
                let marker = if bullet.deprecated { "x" } else { "-" };
                println!(
                    "{marker} [{}] ({}, {}) {}",
                    bullet.id, bullet.maturity, bullet.scope, bullet.content
                );
            }
        },
    }
    Ok(())
}

/// Add command.
fn cmd_add(
    config: &TacitConfig,
    content: String,
    category: Option<String>,
    scope: String,
) -> anyhow::Result<()> {
    let Some(scope) = Scope::parse(&scope) else {
        bail!("unknown scope: {scope}");
    };
    if content.trim().is_empty() {
        bail!("rule content must not be empty");
    }

    let draft = DraftBullet {
        content,
        category,
        scope: Some(scope),
        ..DraftBullet::default()
    };
    let service = build_reflection_service(config);
    let merge = service.merge_deltas(vec![Delta::Add {
        draft,
        source_session: None,
    }])?;

    for (store, result) in [("global", merge.global), ("workspace", merge.workspace)] {
        if let Some(result) = result {
            if result.applied > 0 {
                println!("Rule added to the {store} store.");
            } else {
                println!("Rule skipped ({store} store): duplicate or blocked content.");
            }
        }
    }
    Ok(())
}

/// Feedback command.
fn cmd_feedback(
    config: &TacitConfig,
    bullet_id: String,
    helpful: bool,
    harmful: bool,
    reason: Option<String>,
) -> anyhow::Result<()> {
    if helpful == harmful {
        bail!("pass exactly one of --helpful or --harmful");
    }

    let bullet_id = BulletId::new(bullet_id);
    let delta = if helpful {
        Delta::Helpful {
            bullet_id: bullet_id.clone(),
            source_session: None,
        }
    } else {
        Delta::Harmful {
            bullet_id: bullet_id.clone(),
            reason,
            source_session: None,
        }
    };

    let service = build_reflection_service(config);
    let merge = service.merge_deltas(vec![delta])?;

    let conflicted = merge
        .global
        .iter()
        .chain(merge.workspace.iter())
        .any(|r| !r.conflicts.is_empty());
    if conflicted {
        bail!("bullet not found: {bullet_id}");
    }
    println!("Feedback recorded for {bullet_id}.");
    Ok(())
}

/// Forget command.
fn cmd_forget(
    config: &TacitConfig,
    bullet_id: String,
    reason: Option<String>,
) -> anyhow::Result<()> {
    let bullet_id = BulletId::new(bullet_id);
    let reason = reason.unwrap_or_else(|| "rejected by user".to_string());
    let stores = config.store_set();

    let forgotten = stores.with_stores(|guard| {
        // Workspace first, mirroring delta routing precedence.
        if let Some(workspace) = guard.workspace.as_mut() {
            if let Some(bullet) = workspace.find_mut(&bullet_id) {
                let entry = block_entry(bullet, &reason);
                bullet.deprecate(&reason, Utc::now());
                guard.mark_workspace_dirty();
                return Ok(Some((Scope::Workspace, entry)));
            }
        }
        if let Some(bullet) = guard.global.find_mut(&bullet_id) {
            let entry = block_entry(bullet, &reason);
            bullet.deprecate(&reason, Utc::now());
            guard.mark_global_dirty();
            return Ok(Some((Scope::Global, entry)));
        }
        Ok(None)
    })?;

    let Some((scope, entry)) = forgotten else {
        bail!("bullet not found: {bullet_id}");
    };

    // Appending to the blocked log happens outside the store transaction;
    // the log is only ever appended to, so last-writer-wins is safe here.
    let store = match scope {
        Scope::Workspace => stores
            .workspace()
            .map_or_else(|| stores.global(), |workspace| workspace),
        Scope::Global => stores.global(),
    };
    let mut log = store.load_blocklist()?;
    log.push(entry);
    store.save_blocklist(&log)?;

    println!("Rule {bullet_id} forgotten; its content is now blocked.");
    Ok(())
}

/// Builds the blocked entry for a forgotten bullet.
fn block_entry(bullet: &Bullet, reason: &str) -> BlockedEntry {
    BlockedEntry {
        id: format!("blocked-{}", bullet.id),
        content: bullet.content.clone(),
        reason: reason.to_string(),
        forgotten_at: Utc::now(),
    }
}

/// Prune command.
fn cmd_prune(config: &TacitConfig, dry_run: bool) -> anyhow::Result<()> {
    let curation = CurationService::new(config.scoring.clone(), config.curation.clone());
    let stores = config.store_set();

    let mut handles = vec![("global", stores.global().clone())];
    if let Some(workspace) = stores.workspace() {
        handles.push(("workspace", workspace.clone()));
    }

    for (name, store) in handles {
        let pruned = if dry_run {
            let mut playbook = store.load()?;
            curation.prune(&mut playbook).pruned
        } else {
            store.update(|playbook| Ok(curation.prune(playbook).pruned))?
        };
        let verb = if dry_run { "would remove" } else { "removed" };
        println!("{name}: {verb} {pruned} bullet(s)");
    }
    Ok(())
}

/// Config command.
fn cmd_config(config: &TacitConfig, show: bool) -> anyhow::Result<()> {
    if show {
        println!("Current Configuration");
        println!("=====================");
        println!();
        println!("Data Directory: {}", config.data_dir.display());
        println!(
            "Workspace Root: {}",
            config
                .workspace_root
                .as_ref()
                .map_or_else(|| "(none)".to_string(), |p| p.display().to_string())
        );
        println!("Sessions Directory: {}", config.sessions_dir.display());
        println!(
            "Export Command: {}",
            config.export_command.as_deref().unwrap_or("(builtin file reader)")
        );
        println!();
        println!("Scoring:");
        println!("  Decay Half-Life Days: {}", config.scoring.decay_half_life_days);
        println!("  Harmful Multiplier: {}", config.scoring.harmful_multiplier);
        println!(
            "  Min Feedback For Active: {}",
            config.scoring.min_feedback_for_active
        );
        println!(
            "  Min Helpful For Proven: {}",
            config.scoring.min_helpful_for_proven
        );
        println!(
            "  Max Harmful Ratio For Proven: {}",
            config.scoring.max_harmful_ratio_for_proven
        );
        println!(
            "  Prune Harmful Threshold: {}",
            config.scoring.prune_harmful_threshold
        );
        println!();
        println!("Curation:");
        println!(
            "  Dedup Similarity Threshold: {}",
            config.curation.dedup_similarity_threshold
        );
        println!();
        println!("LLM Provider: {:?}", config.llm.provider);
        println!(
            "  Model: {}",
            config.llm.model.as_deref().unwrap_or("(default)")
        );
    } else {
        println!("Use --show to display configuration");
    }
    Ok(())
}
