//! Progress reporting for apply runs.

use indicatif::{ProgressBar, ProgressStyle};
use reconcile::{OpKind, OpOutcome, ProgressCallback};

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.cyan} {msg:<32} [{bar:28.cyan/blue}] {pos}/{len}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ")
}

/// Progress bar over the plan's changing operations.
pub struct ApplyProgress {
    bar: ProgressBar,
}

impl ApplyProgress {
    pub fn new(changes: usize) -> Self {
        let bar = ProgressBar::new(changes as u64);
        bar.set_style(bar_style());
        Self { bar }
    }

    /// Hidden bar for quiet mode.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl ProgressCallback for ApplyProgress {
    fn on_op_start(&mut self, name: &str, kind: OpKind) {
        self.bar.set_message(format!("{} {name}", kind.label()));
    }

    fn on_op_complete(&mut self, name: &str, kind: OpKind, outcome: &OpOutcome) {
        if kind.is_change() {
            let symbol = match outcome {
                OpOutcome::Done => "✓",
                OpOutcome::Failed(_) => "✗",
                OpOutcome::Skipped(_) => "⊘",
            };
            self.bar.set_message(format!("{symbol} {name}"));
            self.bar.inc(1);
        }
    }

    fn on_run_complete(&mut self) {
        self.bar.finish_and_clear();
    }
}
