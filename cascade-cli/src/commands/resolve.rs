use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;

use cascade_core::cache::{CacheStore, FileCacheStore, MemoryCacheStore};
use cascade_core::chain::Chain;
use cascade_core::driver::{self, ChainDriver};
use cascade_core::model::{LevelId, SelectionMode};
use cascade_core::source::DataSource;

use super::{build_chain, load_config};
use crate::render;
use crate::sink::StdoutSink;
use crate::sources::{Inventory, InventorySource};

pub struct ResolveArgs {
    pub config: Option<PathBuf>,
    pub inventory: PathBuf,
    pub mode: Option<SelectionMode>,
    pub sets: Vec<(LevelId, String)>,
    pub cache_file: PathBuf,
    pub no_cache: bool,
    pub watch: bool,
    pub submit: bool,
}

pub async fn run_resolve(args: ResolveArgs) -> anyhow::Result<()> {
    let (config_path, config) = load_config(args.config.as_deref())?;
    tracing::info!(config = %config_path.display(), "loaded chain config");

    let inventory = Inventory::load(&args.inventory)?;
    let mode = args.mode.unwrap_or(config.mode);
    let store: Arc<dyn CacheStore> = if args.no_cache {
        Arc::new(MemoryCacheStore::new())
    } else {
        Arc::new(FileCacheStore::open(&args.cache_file))
    };
    let source: Arc<dyn DataSource> = Arc::new(InventorySource::new(inventory));
    let chain = build_chain(&config, source, mode, store)?;

    let watcher = args.watch.then(|| {
        let mut events = chain.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(env) => eprintln!("{}", render::event_line(&env)),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event watcher fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    let Driven { chain, applied } = drive(chain, &args.sets).await?;
    let result = match applied {
        Ok(()) => {
            let name = config.name.as_deref().unwrap_or("chain");
            report(name, &chain, mode, args.submit).await
        }
        Err(e) => Err(e),
    };

    // the watcher ends once the last event sender is gone
    drop(chain);
    if let Some(watcher) = watcher {
        let _ = watcher.await;
    }
    result
}

/// Chain handed back by [`drive`], with the outcome of the selections
struct Driven {
    chain: Chain,
    applied: anyhow::Result<()>,
}

/// Seed `chain` on a driver task and apply `sets` in order. The driver is
/// stopped and the chain returned even when a selection is refused.
async fn drive(chain: Chain, sets: &[(LevelId, String)]) -> anyhow::Result<Driven> {
    let (handle, task) = driver::spawn(ChainDriver::new(chain));

    let applied = async {
        handle.seed(BTreeMap::new()).await?;
        handle.settle().await?;
        for (level, value) in sets {
            handle
                .select(level, Some(value))
                .await
                .with_context(|| format!("cannot set {}={}", level, value))?;
            handle.settle().await?;
        }
        anyhow::Ok(())
    }
    .await;

    if let Err(e) = handle.shutdown().await {
        tracing::debug!(error = %e, "chain driver already stopped");
    }
    drop(handle);
    let chain = task.await.context("chain driver failed")?;
    Ok(Driven { chain, applied })
}

async fn report(
    name: &str,
    chain: &Chain,
    mode: SelectionMode,
    submit: bool,
) -> anyhow::Result<()> {
    println!("{} ({} form)", name, chain.mode());
    print!("{}", render::state_table(chain.definition(), chain.state()));
    print!("{}", render::gate_summary(&chain.gate()));

    if submit {
        let sink = StdoutSink::new(mode);
        let receipt = chain.submit(&sink).await?;
        tracing::info!(request_id = %receipt.id, "submitted");
    }
    Ok(())
}
