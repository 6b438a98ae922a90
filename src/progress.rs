//! Progress reporting seam between the core and its caller
//!
//! Every long-running operation takes a `&dyn ProgressSink` and pushes
//! `ProgressUpdate`s into it. The core never renders anything itself;
//! the CLI owns presentation (see `ui::progress`).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Which stage of a composed operation is reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Download,
    Extract,
}

impl Phase {
    /// Display label for the phase
    pub fn label(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Extract => "extract",
        }
    }
}

/// One progress report
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// The reporting phase
    pub phase: Phase,

    /// Completion in [0.0, 100.0]; `None` when no total is known
    pub percent: Option<f64>,

    /// Human-readable status line
    pub status: String,

    /// Current throughput in bytes/sec, when measurable
    pub bytes_per_sec: Option<u64>,

    /// Estimated seconds remaining, when derivable
    pub eta_secs: Option<u64>,

    /// Raw bytes completed so far, for callers that re-aggregate
    pub bytes_done: Option<u64>,
}

impl ProgressUpdate {
    /// A report with only a phase and status text
    pub fn status(phase: Phase, status: impl Into<String>) -> Self {
        Self {
            phase,
            percent: None,
            status: status.into(),
            bytes_per_sec: None,
            eta_secs: None,
            bytes_done: None,
        }
    }

    /// A report with a known completion percentage
    pub fn percent(phase: Phase, percent: f64, status: impl Into<String>) -> Self {
        Self {
            phase,
            percent: Some(percent.clamp(0.0, 100.0)),
            status: status.into(),
            bytes_per_sec: None,
            eta_secs: None,
            bytes_done: None,
        }
    }
}

/// Consumer of progress reports
pub trait ProgressSink: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

/// Sink that discards everything
pub struct NullSink;

impl ProgressSink for NullSink {
    fn report(&self, _update: ProgressUpdate) {}
}

/// How far back the rolling window looks when measuring throughput
const WINDOW: Duration = Duration::from_secs(5);

/// Rolling bytes/time window for throughput and ETA estimates
///
/// Feed it cumulative byte counts; it keeps samples from the last few
/// seconds and derives a current rate from the span of the window, so
/// short stalls show up instead of being averaged away by the whole
/// transfer's history.
pub struct ThroughputWindow {
    samples: VecDeque<(Instant, u64)>,
}

impl ThroughputWindow {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::new(),
        }
    }

    /// Record the cumulative byte count as of now
    pub fn record(&mut self, total_bytes: u64) {
        self.record_at(Instant::now(), total_bytes);
    }

    /// Record the cumulative byte count at an explicit instant
    pub fn record_at(&mut self, at: Instant, total_bytes: u64) {
        self.samples.push_back((at, total_bytes));
        while let Some(&(oldest, _)) = self.samples.front() {
            if at.duration_since(oldest) > WINDOW && self.samples.len() > 2 {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Current throughput in bytes/sec over the window, if measurable
    pub fn bytes_per_sec(&self) -> Option<u64> {
        let (first_at, first_bytes) = *self.samples.front()?;
        let (last_at, last_bytes) = *self.samples.back()?;

        let elapsed = last_at.duration_since(first_at).as_secs_f64();
        if elapsed <= 0.0 || last_bytes <= first_bytes {
            return None;
        }
        Some(((last_bytes - first_bytes) as f64 / elapsed) as u64)
    }

    /// Estimated seconds until `total` bytes, given the current rate
    pub fn eta_secs(&self, total: u64) -> Option<u64> {
        let (_, current) = *self.samples.back()?;
        if current >= total {
            return Some(0);
        }
        let rate = self.bytes_per_sec()?;
        if rate == 0 {
            return None;
        }
        Some((total - current).div_ceil(rate))
    }
}

impl Default for ThroughputWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_clamped() {
        let update = ProgressUpdate::percent(Phase::Download, 150.0, "done");
        assert_eq!(update.percent, Some(100.0));

        let update = ProgressUpdate::percent(Phase::Download, -5.0, "start");
        assert_eq!(update.percent, Some(0.0));
    }

    #[test]
    fn throughput_from_two_samples() {
        let mut window = ThroughputWindow::new();
        let start = Instant::now();
        window.record_at(start, 0);
        window.record_at(start + Duration::from_secs(2), 2_000_000);

        let rate = window.bytes_per_sec().unwrap();
        assert!((900_000..=1_100_000).contains(&rate), "rate was {rate}");
    }

    #[test]
    fn no_rate_from_single_sample() {
        let mut window = ThroughputWindow::new();
        window.record_at(Instant::now(), 1024);
        assert!(window.bytes_per_sec().is_none());
    }

    #[test]
    fn stalled_transfer_has_no_rate() {
        let mut window = ThroughputWindow::new();
        let start = Instant::now();
        window.record_at(start, 5000);
        window.record_at(start + Duration::from_secs(3), 5000);
        assert!(window.bytes_per_sec().is_none());
    }

    #[test]
    fn eta_counts_down() {
        let mut window = ThroughputWindow::new();
        let start = Instant::now();
        window.record_at(start, 0);
        window.record_at(start + Duration::from_secs(1), 1000);

        // ~1000 B/s, 9000 bytes left
        let eta = window.eta_secs(10_000).unwrap();
        assert!((8..=10).contains(&eta), "eta was {eta}");
    }

    #[test]
    fn eta_zero_when_complete() {
        let mut window = ThroughputWindow::new();
        let start = Instant::now();
        window.record_at(start, 0);
        window.record_at(start + Duration::from_secs(1), 10_000);
        assert_eq!(window.eta_secs(10_000), Some(0));
    }

    #[test]
    fn old_samples_roll_off() {
        let mut window = ThroughputWindow::new();
        let start = Instant::now();
        // A fast burst long ago, then a slow trickle recently.
        window.record_at(start, 0);
        window.record_at(start + Duration::from_secs(1), 100_000_000);
        window.record_at(start + Duration::from_secs(20), 100_000_100);
        window.record_at(start + Duration::from_secs(21), 100_000_200);

        // The burst should have rolled out of the window; the rate reflects
        // the trickle, not the transfer-lifetime average.
        let rate = window.bytes_per_sec().unwrap();
        assert!(rate < 10_000, "rate was {rate}");
    }
}
