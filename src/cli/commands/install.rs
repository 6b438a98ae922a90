//! Install command - download archives into the cache and unpack them

use crate::cache::{key_for_url, ContentCache};
use crate::cli::args::InstallArgs;
use crate::config::{Config, ConfigManager};
use crate::error::{DepotError, DepotResult};
use crate::extract::Extractor;
use crate::install::{InstallFile, Installer};
use crate::transfer::TransferOptions;
use crate::ui::{self, InstallProgress, UiContext};
use std::time::Duration;
use tracing::debug;

/// Execute the install command
pub async fn execute(args: InstallArgs, config: &Config) -> DepotResult<()> {
    let ctx = UiContext::detect();

    if !args.sizes.is_empty() && args.sizes.len() != args.urls.len() {
        return Err(DepotError::User(format!(
            "--size given {} time(s) for {} url(s); declare every size or none",
            args.sizes.len(),
            args.urls.len()
        )));
    }

    let files: Vec<InstallFile> = args
        .urls
        .iter()
        .enumerate()
        .map(|(i, url)| InstallFile {
            url: url.clone(),
            expected_size: args.sizes.get(i).copied(),
        })
        .collect();

    let cache_key = args
        .cache_key
        .clone()
        .unwrap_or_else(|| key_for_url(&args.urls[0]));
    debug!("Using cache key {cache_key}");

    let base = config
        .cache
        .base_dir
        .clone()
        .unwrap_or_else(ConfigManager::cache_dir);
    let cache = ContentCache::new(base);
    let extractor = Extractor::new(&config.extract.backend);
    let transfer = TransferOptions::from_config(&config.transfer);

    // Ctrl-C turns into a cooperative cancel so partials stay resumable.
    let cancel = transfer.cancel.clone();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let installer = Installer::new(&cache, &extractor, transfer, config.cache.max_entries);

    ui::intro(&ctx, "Depot Install");
    let progress = InstallProgress::new(&ctx);

    let result = installer
        .install_multi(&files, &args.dest, &cache_key, &progress)
        .await;
    progress.finish();

    match result {
        Ok(()) => {
            // Opportunistic sweep for downloads nobody came back for.
            let stale_age = Duration::from_secs(config.cache.stale_partial_hours * 3600);
            let _ = cache.clean_stale_partials(stale_age);

            ui::outro_success(
                &ctx,
                &format!("Installed into {}", args.dest.display()),
            );
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            ui::note(
                &ctx,
                "Cancelled",
                "Partial downloads were kept; re-run the same command to resume.",
            );
            Err(e)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_size_count_is_user_error() {
        let args = InstallArgs {
            urls: vec!["https://e.com/a".into(), "https://e.com/b".into()],
            dest: "/tmp/out".into(),
            cache_key: None,
            sizes: vec![100],
        };
        let config = Config::default();
        let err = tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(execute(args, &config))
            .unwrap_err();
        assert!(matches!(err, DepotError::User(_)));
    }

    #[test]
    fn cancellation_token_is_shared() {
        let opts = TransferOptions::default();
        let clone = opts.cancel.clone();
        opts.cancel.cancel();
        assert!(clone.is_cancelled());
    }
}
