//! Status command - show recorded ports and their owners

use crate::config::{Config, ConfigManager};
use crate::error::DepotResult;
use crate::launch::{create_platform_ops, Launcher};
use crate::ui::{self, UiContext};

/// Execute the status command
pub async fn execute(config: &Config) -> DepotResult<()> {
    let ctx = UiContext::detect();
    let ops = create_platform_ops()?;
    let launcher = Launcher::new(&*ops, ConfigManager::locks_dir(), config.launch.clone());

    ui::intro(&ctx, "Depot Status");

    let rows = launcher.status()?;
    if rows.is_empty() {
        ui::note(&ctx, "Ports", "No recorded ports");
        return Ok(());
    }

    for row in &rows {
        match &row.lock {
            Some(lock) => ui::key_value_status(
                &ctx,
                &format!("port {}", row.port),
                &format!(
                    "{} (pid {}, since {})",
                    lock.label,
                    lock.pid,
                    lock.timestamp.format("%Y-%m-%d %H:%M")
                ),
                true,
            ),
            None => ui::key_value_status(
                &ctx,
                &format!("port {}", row.port),
                "stale lock cleared",
                false,
            ),
        }
    }

    ui::outro_success(&ctx, &format!("{} port(s) recorded", rows.len()));
    Ok(())
}
