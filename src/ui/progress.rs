//! Progress rendering with CI fallback
//!
//! `InstallProgress` is the terminal consumer of the core's
//! `ProgressSink`: an indicatif bar in interactive mode, throttled plain
//! lines in CI.

use super::context::UiContext;
use crate::progress::{Phase, ProgressSink, ProgressUpdate};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A task spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
}

impl TaskSpinner {
    /// Create a new spinner (shows immediately in interactive mode)
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            println!("{} {}", style("...").dim(), message);
        }
    }

    /// Update the spinner message
    pub fn message(&mut self, message: &str) {
        if let Some(ref spinner) = self.spinner {
            spinner.start(message);
        }
        // No output in plain mode for message updates
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else if self.interactive {
            println!("{} {}", style("✓").green(), message);
        } else {
            println!("{} {}", style("[OK]").green(), message);
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.error(message);
        } else if self.interactive {
            println!("{} {}", style("✗").red(), message);
        } else {
            println!("{} {}", style("[FAIL]").red(), message);
        }
    }
}

/// How often the plain-mode fallback prints a line
const PLAIN_INTERVAL: Duration = Duration::from_secs(2);

/// Terminal renderer for install progress reports
///
/// One bar carries both phases; the prefix flips from `download` to
/// `extract` when the phase changes.
pub struct InstallProgress {
    bar: Option<ProgressBar>,
    state: Mutex<RenderState>,
}

struct RenderState {
    phase: Option<Phase>,
    last_plain: Option<Instant>,
}

impl InstallProgress {
    /// Create a progress renderer.
    ///
    /// Shows an indicatif bar in interactive mode, plain text in CI.
    pub fn new(ctx: &UiContext) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new(100);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("  {spinner:.cyan} {prefix}  {bar:24.cyan/dim} {msg:.dim}  {elapsed:.dim}")
                    .unwrap()
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                    .progress_chars("━╸─"),
            );
            bar.enable_steady_tick(Duration::from_millis(120));
            Some(bar)
        } else {
            None
        };
        Self {
            bar,
            state: Mutex::new(RenderState {
                phase: None,
                last_plain: None,
            }),
        }
    }

    /// Finish and clear the bar
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }

    fn describe(update: &ProgressUpdate) -> String {
        match update.eta_secs {
            Some(eta) if eta > 0 => format!("{} (ETA {}s)", update.status, eta),
            _ => update.status.clone(),
        }
    }
}

impl ProgressSink for InstallProgress {
    fn report(&self, update: ProgressUpdate) {
        let mut state = self.state.lock().unwrap();
        let phase_changed = state.phase != Some(update.phase);
        state.phase = Some(update.phase);

        if let Some(ref bar) = self.bar {
            if phase_changed {
                bar.set_prefix(update.phase.label());
                bar.set_position(0);
            }
            if let Some(percent) = update.percent {
                bar.set_position(percent.round() as u64);
            }
            bar.set_message(Self::describe(&update));
            return;
        }

        // Plain mode: one line per phase change, then throttled updates.
        let due = phase_changed
            || state
                .last_plain
                .is_none_or(|at| at.elapsed() >= PLAIN_INTERVAL);
        if due {
            state.last_plain = Some(Instant::now());
            match update.percent {
                Some(percent) => println!(
                    "  {} {:3.0}% {}",
                    update.phase.label(),
                    percent,
                    Self::describe(&update)
                ),
                None => println!("  {} {}", update.phase.label(), Self::describe(&update)),
            }
        }
    }
}
