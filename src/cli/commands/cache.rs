//! Cache command - inspect and clean the content cache

use crate::cache::{format_bytes, ContentCache};
use crate::cli::args::{CacheAction, CacheArgs};
use crate::config::{Config, ConfigManager};
use crate::error::DepotResult;
use crate::ui::{self, UiContext};
use console::style;
use std::time::Duration;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> DepotResult<()> {
    let base = config
        .cache
        .base_dir
        .clone()
        .unwrap_or_else(ConfigManager::cache_dir);
    let cache = ContentCache::new(base);

    match args.action {
        CacheAction::List => list_entries(&cache),
        CacheAction::Clean { stale_only } => clean(&cache, config, stale_only),
    }
}

/// List cached entries with sizes
fn list_entries(cache: &ContentCache) -> DepotResult<()> {
    let entries = cache.entries()?;

    if entries.is_empty() {
        println!("Cache is empty.");
        return Ok(());
    }

    println!("{:<16} {:>10}  {:<20}", "KEY", "SIZE", "LAST USED");
    println!("{}", "-".repeat(50));
    for entry in &entries {
        println!(
            "{:<16} {:>10}  {:<20}",
            entry.key,
            format_bytes(entry.size_bytes),
            entry.modified.format("%Y-%m-%d %H:%M")
        );
    }

    let total: u64 = entries.iter().map(|e| e.size_bytes).sum();
    println!();
    println!(
        "Total: {} entr{} ({})",
        entries.len(),
        if entries.len() == 1 { "y" } else { "ies" },
        format_bytes(total)
    );
    Ok(())
}

/// Evict beyond the configured bound and sweep abandoned partials
fn clean(cache: &ContentCache, config: &Config, stale_only: bool) -> DepotResult<()> {
    let ctx = UiContext::detect();

    let stale_age = Duration::from_secs(config.cache.stale_partial_hours * 3600);
    let swept = cache.clean_stale_partials(stale_age)?;
    ui::step_ok(
        &ctx,
        &format!("Swept {swept} abandoned partial download(s)"),
    );

    if !stale_only {
        let evicted = cache.evict(config.cache.max_entries)?;
        ui::step_ok(
            &ctx,
            &format!(
                "Evicted {evicted} entr{} (bound: {})",
                if evicted == 1 { "y" } else { "ies" },
                config.cache.max_entries
            ),
        );
    }

    println!("{} Cache clean finished", style("✓").green());
    Ok(())
}
