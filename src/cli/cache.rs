use anyhow::{bail, Result};
use clap::Subcommand;

use crate::cache::{CacheStats, CacheStore};
use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum CacheAction {
    /// Show entry counts, size and per-category breakdown
    Stats,
    /// Remove expired entries
    Cleanup,
    /// Remove every entry
    Clear,
}

pub fn run(action: CacheAction, config_path: Option<String>) -> Result<()> {
    let config = Config::load_with_path(config_path)?;
    if !config.cache.enabled {
        bail!("Cache is disabled in config ([cache] enabled = false)");
    }
    let store = CacheStore::from_config(&config.cache);
    execute(action, &store);
    Ok(())
}

fn execute(action: CacheAction, store: &CacheStore) -> usize {
    match action {
        CacheAction::Stats => {
            let stats = store.stats();
            print_stats(store, &stats);
            stats.entries
        }
        CacheAction::Cleanup => {
            let removed = store.cleanup_expired();
            println!("Removed {} expired entries from {}", removed, store.dir().display());
            removed
        }
        CacheAction::Clear => {
            let removed = store.clear();
            println!("Removed {} entries from {}", removed, store.dir().display());
            removed
        }
    }
}

fn print_stats(store: &CacheStore, stats: &CacheStats) {
    println!("Cache directory: {}", store.dir().display());
    println!("Default TTL: {}h", store.default_ttl().as_secs() / 3600);
    println!("Entries: {} ({} bytes)", stats.entries, stats.size_bytes);
    for (category, count) in &stats.categories {
        println!("  {}: {}", category, count);
    }
}
