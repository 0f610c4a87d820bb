//! Terminal progress indicators for the CLI.
//!
//! Wraps `indicatif` with the updater's styling. Setting
//! `BUNDLE_UPDATER_NO_PROGRESS` (or passing `--quiet`) hides every bar.

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle};
use std::time::Duration;

use crate::updater::ProgressSample;

fn is_progress_disabled() -> bool {
    std::env::var_os("BUNDLE_UPDATER_NO_PROGRESS").is_some()
}

fn bytes_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({binary_bytes_per_sec}, {eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸━")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{prefix:.bold} {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
}

/// Download progress fed from [`ProgressSample`]s.
///
/// Starts as a spinner and switches to a byte bar once a sample reports the
/// total size. Cloning shares the underlying bar, so a clone can be moved
/// into a progress callback.
#[derive(Clone)]
pub struct DownloadProgress {
    inner: IndicatifBar,
}

impl DownloadProgress {
    /// A new indicator labelled `prefix`.
    #[must_use]
    pub fn new(prefix: &str, hidden: bool) -> Self {
        let inner = if hidden || is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new_spinner();
            bar.set_style(spinner_style());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        };
        inner.set_prefix(prefix.to_string());
        Self {
            inner,
        }
    }

    /// Reflect a progress sample.
    pub fn update(&self, sample: &ProgressSample) {
        match sample.bytes_total {
            Some(total) if self.inner.length() != Some(total) => {
                self.inner.set_style(bytes_style());
                self.inner.set_length(total);
            }
            Some(_) => {}
            None => self.inner.set_message(format!("{} bytes", sample.bytes_transferred)),
        }
        self.inner.set_position(sample.bytes_transferred);
    }

    /// Show a status message.
    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    /// Finish and leave `msg` on screen.
    pub fn finish_with_message(&self, msg: impl Into<String>) {
        self.inner.finish_with_message(msg.into());
    }

    /// Finish and clear the line.
    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}
