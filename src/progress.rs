//! Progress reporting for the asset phase.
//!
//! Interactive runs get an indicatif bar. Under cron/CI (`--log-only`) the
//! bar is hidden and periodic `[phase] n/total (pct%)` lines go to stderr
//! instead, which stay readable in a captured log.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Set once from the command line
static LOG_ONLY: AtomicBool = AtomicBool::new(false);

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// "4.2s" under a minute, "3.5m" above.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}

/// Bar plus periodic log lines for one phase of work.
pub struct PhaseProgress {
    bar: ProgressBar,
    phase: &'static str,
    total: u64,
    interval: u64,
}

impl PhaseProgress {
    /// `interval` is how many items pass between log lines in log-only mode.
    pub fn new(phase: &'static str, total: u64, interval: u64) -> Self {
        let bar = ProgressBar::new(total);
        if is_log_only() {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        } else if let Ok(style) = ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} (ETA: {eta})")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message(phase);
        Self {
            bar,
            phase,
            total,
            interval: interval.max(1),
        }
    }

    /// Advance by one item, showing `detail` (e.g. the record title).
    pub fn step(&self, detail: &str) {
        self.bar.inc(1);
        if !detail.is_empty() {
            self.bar.set_message(format!("{} {}", self.phase, detail));
        }
        let current = self.bar.position();
        if is_log_only() && (current % self.interval == 0 || current == self.total) {
            eprintln!("{}", progress_line(self.phase, current, self.total));
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

fn progress_line(phase: &str, current: u64, total: u64) -> String {
    let pct = if total == 0 {
        100.0
    } else {
        100.0 * current as f64 / total as f64
    };
    format!("[{}] {}/{} ({:.1}%)", phase, current, total, pct)
}
