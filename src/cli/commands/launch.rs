//! Launch command - start a bundle process on a coordinated port

use crate::cli::args::LaunchArgs;
use crate::config::{Config, ConfigManager};
use crate::error::DepotResult;
use crate::launch::{create_platform_ops, LaunchSpec, Launcher};
use crate::ui::{self, TaskSpinner, UiContext};
use std::cell::RefCell;
use tokio_util::sync::CancellationToken;

/// Execute the launch command
pub async fn execute(args: LaunchArgs, config: &Config) -> DepotResult<()> {
    let ctx = UiContext::detect();
    let ops = create_platform_ops()?;
    let launcher = Launcher::new(&*ops, ConfigManager::locks_dir(), config.launch.clone());

    let label = args.label.clone().unwrap_or_else(|| {
        args.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bundle".to_string())
    });

    let mut spec = LaunchSpec::new(&args.program, args.args.clone());
    spec.cwd = args.cwd.clone();

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    ui::intro(&ctx, "Depot Launch");
    let spinner = RefCell::new(TaskSpinner::new(&ctx));
    spinner.borrow_mut().start(&format!("Starting {label}..."));

    let outcome = launcher
        .launch(
            spec,
            &label,
            args.port,
            &cancel,
            |phase| {
                spinner
                    .borrow_mut()
                    .message(&format!("Starting {label} ({phase})..."));
            },
            |attempt, elapsed_ms| {
                spinner.borrow_mut().message(&format!(
                    "Waiting for {label} (attempt {attempt}, {:.1}s)...",
                    elapsed_ms as f64 / 1000.0
                ));
            },
        )
        .await;

    let mut spinner = spinner.into_inner();
    match outcome {
        Ok(outcome) => {
            spinner.stop(&format!(
                "{label} running on port {} (pid {})",
                outcome.port, outcome.pid
            ));
            ui::outro_success(&ctx, &format!("Ready on port {}", outcome.port));
            Ok(())
        }
        Err(e) => {
            spinner.stop_error(&format!("Launch failed: {e}"));
            Err(e)
        }
    }
}
