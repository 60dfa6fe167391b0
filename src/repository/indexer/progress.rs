//! Progress reporting abstraction
//!
//! Keeps indexing logic free of terminal concerns (indicatif).

use indicatif::{ProgressBar, ProgressStyle};

/// A handle to an active progress bar
pub trait ProgressHandle: Send + Sync {
    fn inc(&self, n: u64);
    fn finish(&self);
}

/// Factory for progress handles, one per indexed branch
pub trait ProgressReporter: Send + Sync {
    fn start(&self, label: &str, total: u64) -> Box<dyn ProgressHandle>;
}

/// Terminal progress bars for the `refresh` command
pub struct IndicatifProgress;

impl ProgressReporter for IndicatifProgress {
    fn start(&self, label: &str, total: u64) -> Box<dyn ProgressHandle> {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len} revisions ({per_sec})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(label.to_string());
        Box::new(IndicatifHandle(pb))
    }
}

struct IndicatifHandle(ProgressBar);

impl ProgressHandle for IndicatifHandle {
    fn inc(&self, n: u64) {
        self.0.inc(n);
    }

    fn finish(&self) {
        self.0.finish_and_clear();
    }
}

/// Silent reporter used by the server and tests
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn start(&self, _label: &str, _total: u64) -> Box<dyn ProgressHandle> {
        Box::new(NoopHandle)
    }
}

struct NoopHandle;

impl ProgressHandle for NoopHandle {
    fn inc(&self, _n: u64) {}
    fn finish(&self) {}
}

/// Shows bars only for branches with enough work to be worth watching
pub struct ThresholdProgress {
    min_total: u64,
}

impl ThresholdProgress {
    pub fn new(min_total: u64) -> Self {
        Self { min_total }
    }
}

impl ProgressReporter for ThresholdProgress {
    fn start(&self, label: &str, total: u64) -> Box<dyn ProgressHandle> {
        if total >= self.min_total {
            IndicatifProgress.start(label, total)
        } else {
            NoopProgress.start(label, total)
        }
    }
}
