//! Init command - write a default config.toml

use crate::cli::args::InitArgs;
use crate::config::ConfigManager;
use crate::error::{DepotError, DepotResult};
use crate::ui::{self, UiContext};
use tokio::fs;

/// Template for the global config
const INIT_TEMPLATE: &str = r#"# Depot configuration
# Docs: https://github.com/dean0x/depot

[general]
# verbose = false
# log_format = "text"          # text, json

[transfer]
# connect_timeout_secs = 30
# progress_interval_ms = 250

[cache]
# base_dir = "/path/to/cache"  # defaults to the platform state dir
# max_entries = 4
# stale_partial_hours = 72

[extract]
# backend = "7z"

[launch]
# host = "127.0.0.1"
# port_range_start = 41100
# port_range_end = 41199
# poll_interval_ms = 500
# ready_timeout_secs = 60
"#;

/// Execute the init command
pub async fn execute(args: InitArgs) -> DepotResult<()> {
    let ctx = UiContext::detect();

    let config_path = ConfigManager::default_config_path();
    if config_path.exists() && !args.force {
        return Err(DepotError::User(format!(
            "{} already exists. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| DepotError::ConfigDirCreate {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }

    fs::write(&config_path, INIT_TEMPLATE)
        .await
        .map_err(|e| DepotError::io(format!("writing {}", config_path.display()), e))?;

    ui::step_ok_detail(&ctx, "Wrote config", &config_path.display().to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_parses_as_config() {
        // Every commented default must stay in sync with the schema.
        let parsed: crate::config::Config = toml::from_str(INIT_TEMPLATE).unwrap();
        assert_eq!(parsed.cache.max_entries, 4);
    }
}
