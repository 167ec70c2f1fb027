use std::path::Path;

use cascade_core::cache::{CacheStore, FileCacheStore};

pub fn run_cache_show(path: &Path) -> anyhow::Result<()> {
    let store = FileCacheStore::open(path);
    let entries = store.entries();
    if entries.is_empty() {
        println!("cache is empty ({})", path.display());
        return Ok(());
    }

    println!("Remembered selections ({}):", path.display());
    let width = entries.keys().map(String::len).max().unwrap_or(0);
    for (key, value) in &entries {
        println!("  {:<width$}  {}", key, value, width = width);
    }
    Ok(())
}

pub fn run_cache_clear(path: &Path) -> anyhow::Result<()> {
    let store = FileCacheStore::open(path);
    let count = store.entries().len();
    store.clear();
    tracing::info!(path = %path.display(), count, "cache cleared");
    println!("removed {} entr{}", count, if count == 1 { "y" } else { "ies" });
    Ok(())
}

pub fn run_cache_forget(path: &Path, key: &str) -> anyhow::Result<()> {
    let store = FileCacheStore::open(path);
    if store.get(key).is_none() {
        anyhow::bail!("no remembered selection under '{}'", key);
    }
    store.remove(key);
    println!("forgot {}", key);
    Ok(())
}
