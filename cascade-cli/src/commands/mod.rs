mod cache;
mod check;
mod demo;
mod resolve;

pub use cache::{run_cache_clear, run_cache_forget, run_cache_show};
pub use check::run_check;
pub use demo::run_demo;
pub use resolve::{ResolveArgs, run_resolve};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use cascade_core::cache::CacheStore;
use cascade_core::chain::{Chain, define_chain};
use cascade_core::config::ChainConfig;
use cascade_core::model::SelectionMode;
use cascade_core::source::DataSource;

/// Load the chain config at `path`, or discover one from the working directory
pub fn load_config(path: Option<&Path>) -> anyhow::Result<(PathBuf, ChainConfig)> {
    match path {
        Some(path) => {
            let config = ChainConfig::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            Ok((path.to_path_buf(), config))
        }
        None => {
            let cwd = std::env::current_dir()?;
            Ok(ChainConfig::discover(&cwd)?)
        }
    }
}

/// Chain with every level answered by `source`
pub fn build_chain(
    config: &ChainConfig,
    source: Arc<dyn DataSource>,
    mode: SelectionMode,
    store: Arc<dyn CacheStore>,
) -> anyhow::Result<Chain> {
    let levels = config.to_levels(|_| source.clone());
    let definition = define_chain(levels)?;
    Ok(definition.instantiate(mode, store))
}
