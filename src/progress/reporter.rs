//! Row progress for telemetry conversion
//!
//! An indicatif spinner showing rows read so far, their rate, and a final
//! status line.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner counting rows while a telemetry file is read
pub struct RowProgress {
    bar: ProgressBar,
}

impl RowProgress {
    /// Create a visible spinner on stderr
    pub fn new(label: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {prefix:.bold.dim} {pos} rows ({per_sec}) {msg}")
                .expect("Invalid template"),
        );
        bar.set_prefix(label.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    /// Create a hidden spinner (quiet mode, tests)
    pub fn disabled() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Count one more row
    pub fn inc(&self) {
        self.bar.inc(1);
    }

    /// Rows counted so far
    pub fn rows(&self) -> u64 {
        self.bar.position()
    }

    /// Finish with success message
    pub fn finish_success(&self, message: &str) {
        self.bar.finish_with_message(format!("✓ {}", message));
    }

    /// Finish with error message
    pub fn finish_error(&self, message: &str) {
        self.bar.abandon_with_message(format!("✗ {}", message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_counting() {
        let progress = RowProgress::disabled();
        for _ in 0..5 {
            progress.inc();
        }
        assert_eq!(progress.rows(), 5);
        progress.finish_success("done");
    }
}
