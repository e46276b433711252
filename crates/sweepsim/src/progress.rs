//! Terminal progress for running sweeps

use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use sweepsim_core::BatchObserver;

const TEMPLATE: &str =
    "{msg} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})";

/// Draws one progress bar per batch
pub struct ProgressBarObserver {
    current: Mutex<Option<ProgressBar>>,
    draw_target: fn() -> ProgressDrawTarget,
}

impl Default for ProgressBarObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBarObserver {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            draw_target: ProgressDrawTarget::stderr,
        }
    }

    /// Observer that tracks progress without drawing
    pub fn hidden() -> Self {
        Self {
            current: Mutex::new(None),
            draw_target: ProgressDrawTarget::hidden,
        }
    }

    /// Position of the active bar, if a batch is running
    pub fn position(&self) -> Option<u64> {
        self.with_bar(|bar| bar.position())
    }

    fn with_bar<T>(&self, f: impl FnOnce(&ProgressBar) -> T) -> Option<T> {
        let guard = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.as_ref().map(f)
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(TEMPLATE)
        .map(|style| style.progress_chars("█▓░"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

impl BatchObserver for ProgressBarObserver {
    fn batch_started(&self, index: usize, total_batches: usize, len: usize) {
        let bar = ProgressBar::with_draw_target(Some(len as u64), (self.draw_target)());
        bar.set_style(bar_style());
        bar.set_message(format!("Batch {}/{}", index + 1, total_batches));

        let mut guard = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(bar);
    }

    fn item_completed(&self, _batch_index: usize) {
        self.with_bar(|bar| bar.inc(1));
    }

    fn batch_finished(&self, _index: usize) {
        self.with_bar(|bar| bar.finish());
    }
}
