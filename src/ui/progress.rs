//! Progress indicators with CI fallback
//!
//! Everything here writes to stderr; stdout belongs to the script.

use super::context::UiContext;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// A task spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
}

impl TaskSpinner {
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
            eprintln!("{} {}", style("...").dim(), message);
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else if self.interactive {
            eprintln!("{} {}", style("✓").green(), message);
        } else {
            eprintln!("{} {}", style("[OK]").green(), message);
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.error(message);
        } else if self.interactive {
            eprintln!("{} {}", style("✗").red(), message);
        } else {
            eprintln!("{} {}", style("[FAIL]").red(), message);
        }
    }
}

/// Progress for an environment build.
///
/// Follows pip's `Collecting <name>` lines and shows an indicatif spinner
/// in interactive mode, or plain lines in CI.
pub struct BuildProgress {
    bar: Option<ProgressBar>,
}

impl BuildProgress {
    pub fn new(ctx: &UiContext, label: &str) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new_spinner();
            if let Ok(template) = ProgressStyle::with_template(
                "  {spinner:.cyan} {prefix}  {pos:.bold} collected  {msg:.dim}  {elapsed:.dim}",
            ) {
                bar.set_style(template.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
            }
            bar.set_prefix(label.to_string());
            bar.enable_steady_tick(std::time::Duration::from_millis(120));
            Some(bar)
        } else {
            eprintln!("{}...", label);
            None
        };
        Self { bar }
    }

    /// Process one line of installer output
    pub fn on_line(&self, line: String) {
        let trimmed = line.trim();
        if trimmed.is_empty() || is_install_noise(trimmed) {
            return;
        }

        let collected = parse_collecting(trimmed);
        match self.bar {
            Some(ref bar) => {
                if collected.is_some() {
                    bar.inc(1);
                }
                bar.set_message(truncate(trimmed, 60));
            }
            None => {
                if let Some(name) = collected {
                    eprintln!("  Collecting {}", name);
                }
            }
        }
    }

    /// Finish and clear the progress bar.
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

fn truncate(line: &str, max: usize) -> String {
    if line.chars().count() <= max {
        return line.to_string();
    }
    let head: String = line.chars().take(max - 3).collect();
    format!("{}...", head)
}

/// pip chatter that isn't useful to display
fn is_install_noise(line: &str) -> bool {
    line.starts_with("[notice]")
        || line.starts_with("Requirement already satisfied")
        || line.starts_with("Using cached")
        || line.starts_with("━")
}

/// Requirement named by a pip `Collecting <requirement>` line
fn parse_collecting(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("Collecting ")?.trim();
    let name = rest.split_whitespace().next()?;
    Some(name)
}
