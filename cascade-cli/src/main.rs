mod commands;
mod render;
mod sink;
mod sources;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use cascade_core::model::SelectionMode;

#[derive(Parser)]
#[command(name = "cascade")]
#[command(about = "Resolve and inspect dependent selection chains", long_about = None)]
struct Cli {
    /// Log fetches and cache activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a chain config and print its level tree
    Check {
        #[arg(short, long, env = "CASCADE_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Resolve a chain against an inventory file
    Resolve {
        #[arg(short, long, env = "CASCADE_CONFIG")]
        config: Option<PathBuf>,
        #[arg(short, long)]
        inventory: PathBuf,
        /// Defaults to the mode in the config
        #[arg(short, long, value_enum)]
        mode: Option<ModeArg>,
        /// User selection applied after the chain settles, in order
        #[arg(long = "set", value_name = "LEVEL=VALUE", value_parser = parse_assignment)]
        sets: Vec<(String, String)>,
        #[arg(long, env = "CASCADE_CACHE", default_value = ".cascade-cache.json")]
        cache_file: PathBuf,
        /// Ignore and do not update remembered selections
        #[arg(long)]
        no_cache: bool,
        /// Print chain events to stderr as they happen
        #[arg(short, long)]
        watch: bool,
        /// Print the submit payload once the chain is complete
        #[arg(long)]
        submit: bool,
    },
    /// Inspect remembered selections
    Cache {
        #[arg(long, env = "CASCADE_CACHE", default_value = ".cascade-cache.json")]
        cache_file: PathBuf,
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Walk through a built-in CLB (platform) or polaris (business) form
    Demo {
        #[arg(short, long, value_enum, default_value_t = ModeArg::Platform)]
        mode: ModeArg,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    Show,
    Clear,
    /// Drop one remembered selection
    Forget { key: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Platform,
    Business,
}

impl From<ModeArg> for SelectionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Platform => SelectionMode::Platform,
            ModeArg::Business => SelectionMode::Business,
        }
    }
}

fn parse_assignment(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((level, value)) if !level.is_empty() && !value.is_empty() => {
            Ok((level.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected LEVEL=VALUE, got '{}'", s)),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Check { config } => commands::run_check(config.as_deref()),
        Commands::Resolve {
            config,
            inventory,
            mode,
            sets,
            cache_file,
            no_cache,
            watch,
            submit,
        } => {
            commands::run_resolve(commands::ResolveArgs {
                config,
                inventory,
                mode: mode.map(SelectionMode::from),
                sets,
                cache_file,
                no_cache,
                watch,
                submit,
            })
            .await
        }
        Commands::Cache { cache_file, action } => match action {
            CacheAction::Show => commands::run_cache_show(&cache_file),
            CacheAction::Clear => commands::run_cache_clear(&cache_file),
            CacheAction::Forget { key } => commands::run_cache_forget(&cache_file, &key),
        },
        Commands::Demo { mode } => {
            let outcome = commands::run_demo(mode.into()).await?;
            tracing::info!(
                stale_discarded = outcome.stale_discarded,
                receipt = %outcome.receipt.id,
                "demo finished"
            );
            Ok(())
        }
    }
}
