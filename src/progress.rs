use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const BAR_TEMPLATE: &str = "[{bar:40}] {percent}% ({pos}/{len}) {msg}";

/// How often the renderer polls the counter.
pub const RENDER_INTERVAL: Duration = Duration::from_millis(100);

/// Shared completion counter for one scan session.
///
/// `completed` is the only mutable field and is only touched through one
/// atomic; `total` and the start instant are fixed at construction.
#[derive(Debug)]
pub struct ProgressTracker {
    completed: AtomicU64,
    total: u64,
    started: Instant,
}

/// Point-in-time copy of the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub completed: u64,
    pub total: u64,
    pub elapsed: Duration,
}

impl ProgressTracker {
    pub fn new(total: u64) -> Self {
        Self {
            completed: AtomicU64::new(0),
            total,
            started: Instant::now(),
        }
    }

    /// Record one finished item. Saturates at `total`.
    pub fn increment(&self) {
        let total = self.total;
        let _ = self
            .completed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                (c < total).then_some(c + 1)
            });
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: self.completed.load(Ordering::Acquire),
            total: self.total,
            elapsed: self.started.elapsed(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.completed.load(Ordering::Acquire) >= self.total
    }

    /// Drive a terminal progress bar on stderr until the counter reaches
    /// `total` or `stop` fires.
    ///
    /// Read-only with respect to the tracker; workers never wait on it.
    pub async fn render_loop(self: Arc<Self>, stop: CancellationToken) {
        let bar = progress_bar(self.total);
        self.drive(&bar, stop).await;
    }

    /// Poll the counter into `bar` every [`RENDER_INTERVAL`]. A finished run
    /// leaves the bar at 100% with the elapsed time and average rate; a
    /// stopped one is abandoned where it stood.
    pub async fn drive(&self, bar: &ProgressBar, stop: CancellationToken) {
        let mut ticker = time::interval(RENDER_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let snap = self.snapshot();
            if snap.completed >= snap.total {
                break;
            }
            bar.set_position(snap.completed);
            bar.set_message(eta_message(&snap));
        }
        let snap = self.snapshot();
        if snap.completed >= snap.total {
            bar.set_position(snap.total);
            bar.finish_with_message(summary_message(&snap));
        } else {
            bar.abandon();
        }
    }
}

/// Bar on stderr; indicatif hides it when stderr is not a terminal.
pub fn progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    bar
}

impl ProgressSnapshot {
    /// Items per second since the session started.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.completed as f64 / secs
        } else {
            0.0
        }
    }

    /// Estimated time left; zero when nothing has completed yet.
    pub fn eta(&self) -> Duration {
        let rate = self.throughput();
        if rate <= 0.0 {
            return Duration::ZERO;
        }
        let remaining = self.total.saturating_sub(self.completed) as f64;
        Duration::from_secs_f64(remaining / rate)
    }
}

/// `ETA: 7s`
pub fn eta_message(snap: &ProgressSnapshot) -> String {
    format!("ETA: {:.0}s", snap.eta().as_secs_f64())
}

/// `Completed in 2.0s (4 ports/s)`
pub fn summary_message(snap: &ProgressSnapshot) -> String {
    format!(
        "Completed in {:.1}s ({:.0} ports/s)",
        snap.elapsed.as_secs_f64(),
        snap.throughput()
    )
}
