//! Stop command - stop the process owning a port

use crate::cli::args::StopArgs;
use crate::config::{Config, ConfigManager};
use crate::error::{DepotError, DepotResult};
use crate::launch::{create_platform_ops, LaunchPhase, Launcher};
use crate::ui::{self, UiContext};
use console::style;

/// Execute the stop command
pub async fn execute(args: StopArgs, config: &Config) -> DepotResult<()> {
    let ctx = UiContext::detect().with_auto_yes(args.yes);
    let ops = create_platform_ops()?;
    let launcher = Launcher::new(&*ops, ConfigManager::locks_dir(), config.launch.clone());

    match launcher.stop(args.port, args.force).await {
        Ok(LaunchPhase::Stopped) => {
            println!(
                "{} Port {} stopped",
                style("✓").green(),
                style(args.port).cyan()
            );
            Ok(())
        }
        Ok(_) => {
            println!(
                "{} Nothing running on port {}",
                style("!").yellow(),
                style(args.port).cyan()
            );
            Ok(())
        }
        Err(DepotError::PortConflict { port, pids, owned }) if !owned => {
            // A listener without a valid ownership record: killing it
            // needs an explicit go-ahead.
            ui::step_warn_hint(
                &ctx,
                &format!("Port {port} is held by unrecorded pid(s) {pids:?}"),
                "not started by depot, or its lock is gone",
            );
            if ui::confirm(&ctx, "Kill the listener(s) anyway?", false).await? {
                launcher.stop(port, true).await?;
                println!("{} Port {} stopped", style("✓").green(), style(port).cyan());
                Ok(())
            } else {
                Err(DepotError::PortConflict { port, pids, owned })
            }
        }
        Err(e) => Err(e),
    }
}
