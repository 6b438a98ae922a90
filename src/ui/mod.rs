//! UI module for consistent CLI output
//!
//! Uses `cliclack` for interactive output with automatic fallback to
//! plain lines in CI/non-interactive environments. The progress types
//! here are the terminal-side consumers of the core's `ProgressSink`.

mod context;
mod output;
mod progress;
mod prompts;
mod theme;

pub use context::UiContext;
pub use output::{
    intro, key_value_status, note, outro_success, step_ok, step_ok_detail, step_warn_hint,
};
pub use progress::{InstallProgress, TaskSpinner};
pub use prompts::confirm;
pub use theme::init_theme;
