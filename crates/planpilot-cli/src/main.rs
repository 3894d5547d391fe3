//! planpilot CLI: sync hierarchical project plans into work trackers.
//!
//! Every failure category maps to a distinct exit code so wrappers can
//! react without parsing output:
//!
//! | code | category                         |
//! |------|----------------------------------|
//! | 0    | success                          |
//! | 2    | plan load failure                |
//! | 3    | plan validation failure          |
//! | 4    | capability failure               |
//! | 5    | authentication failure           |
//! | 6    | partial item creation            |
//! | 7    | other provider/sync failure      |
//! | 1    | anything else                    |

mod config;
mod map_file;
mod plan_cmds;
mod plan_input;
mod sync_cmd;
#[cfg(test)]
mod test_util;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use planpilot_core::engine::SyncError;
use planpilot_core::plan::{PlanLoadError, ValidateMode, ValidationError};
use planpilot_core::provider::ProviderError;

use config::{CliOverrides, ConfigFile, ResolvedConfig};
use plan_input::PlanInputArgs;

#[derive(Parser)]
#[command(name = "planpilot", about = "Sync hierarchical project plans into work trackers")]
struct Cli {
    /// Tracker target (overrides PLANPILOT_TARGET env var and config)
    #[arg(long, global = true)]
    target: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a planpilot config file scaffold
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Load a plan and report every validation issue
    Validate {
        #[command(flatten)]
        input: PlanInputArgs,
        /// Tolerate references into not-currently-loaded plan slices
        #[arg(long)]
        partial: bool,
    },
    /// Print the deterministic plan identifier
    Hash {
        #[command(flatten)]
        input: PlanInputArgs,
    },
    /// Sync a plan into the configured tracker target
    Sync {
        #[command(flatten)]
        input: PlanInputArgs,
        /// Tolerate references into not-currently-loaded plan slices
        #[arg(long)]
        partial: bool,
        /// Maximum provider calls in flight (overrides config)
        #[arg(long)]
        concurrency: Option<usize>,
        /// Discovery label (overrides config)
        #[arg(long)]
        label: Option<String>,
        /// Directory for persisted sync maps (overrides config)
        #[arg(long)]
        map_dir: Option<PathBuf>,
    },
    /// Sync-map management
    Map {
        #[command(subcommand)]
        command: MapCommands,
    },
}

#[derive(Subcommand)]
enum MapCommands {
    /// Print a persisted sync map
    Show {
        /// Plan identifier the map was persisted under
        plan_id: String,
        /// Directory holding the persisted maps (overrides config)
        #[arg(long)]
        map_dir: Option<PathBuf>,
    },
}

/// Execute `planpilot init`: write the config file scaffold.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = ConfigFile::default();
    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  sync.target          = {}", cfg.sync.target);
    println!("  sync.discovery_label = {}", cfg.sync.discovery_label);
    println!("  sync.concurrency     = {}", cfg.sync.concurrency);
    println!("  map.dir              = {}", cfg.map.dir.display());
    println!();
    println!("Next: run `planpilot sync --plan <plan.toml>` to sync a plan.");

    Ok(())
}

/// Execute `planpilot map show`: print one persisted sync map.
fn cmd_map_show(resolved: &ResolvedConfig, plan_id: &str) -> anyhow::Result<()> {
    let path = map_file::map_path(&resolved.map_dir, plan_id, &resolved.target);
    let map = map_file::load_map(&path)?;

    println!("Plan:   {}", map.plan_id);
    println!("Target: {} ({})", map.target, map.board_url);
    println!();
    for (plan_item_id, entry) in &map.entries {
        println!(
            "  {:<12} {:<8} {:<6} {}",
            plan_item_id, entry.key, entry.item_type, entry.url
        );
    }
    println!();
    println!("{} item(s)", map.len());

    Ok(())
}

/// Map a failure to its stable exit code.
fn exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<PlanLoadError>().is_some() {
        return 2;
    }
    if err.downcast_ref::<ValidationError>().is_some() {
        return 3;
    }
    if let Some(sync_err) = err.downcast_ref::<SyncError>() {
        return match sync_err {
            SyncError::Capability(_) => 4,
            SyncError::Phase { source, .. } => provider_exit_code(source),
            _ => 7,
        };
    }
    if let Some(provider_err) = err.downcast_ref::<ProviderError>() {
        return provider_exit_code(provider_err);
    }
    1
}

fn provider_exit_code(err: &ProviderError) -> i32 {
    match err {
        ProviderError::Capability(_) => 4,
        ProviderError::Auth(_) => 5,
        ProviderError::PartialCreation(_) => 6,
        _ => 7,
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Init { force } => cmd_init(force),
        Commands::Validate { input, partial } => plan_cmds::run_validate(&input, partial),
        Commands::Hash { input } => plan_cmds::run_hash(&input).map(|_| ()),
        Commands::Sync {
            input,
            partial,
            concurrency,
            label,
            map_dir,
        } => {
            let resolved = ResolvedConfig::resolve(&CliOverrides {
                target: cli.target.as_deref(),
                discovery_label: label.as_deref(),
                concurrency,
                map_dir: map_dir.as_deref(),
            })?;
            let params = sync_cmd::SyncParams {
                source: input.to_source()?,
                mode: if partial {
                    ValidateMode::Partial
                } else {
                    ValidateMode::Strict
                },
                target: resolved.target,
                discovery_label: resolved.discovery_label,
                concurrency: resolved.concurrency,
                map_dir: resolved.map_dir,
            };
            sync_cmd::run_sync(&params).await.map(|_| ())
        }
        Commands::Map { command } => match command {
            MapCommands::Show { plan_id, map_dir } => {
                let resolved = ResolvedConfig::resolve(&CliOverrides {
                    target: cli.target.as_deref(),
                    map_dir: map_dir.as_deref(),
                    ..CliOverrides::default()
                })?;
                cmd_map_show(&resolved, &plan_id)
            }
        },
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("{err:#}");
        std::process::exit(exit_code(&err));
    }
}
