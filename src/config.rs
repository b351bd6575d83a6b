use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_THREADS: usize = 50;
pub const DEFAULT_TIMEOUT_SECS: f64 = 1.0;
pub const DEFAULT_DELAY_MS: u64 = 0;

/// Scanner settings as supplied by the environment or command line.
///
/// Out-of-range values are never rejected; [`ScanConfig::sanitized`] swaps
/// them for the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    pub threads: usize,
    pub timeout_secs: f64,
    pub delay_ms: u64,
    pub verbose: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            delay_ms: DEFAULT_DELAY_MS,
            verbose: true,
        }
    }
}

impl ScanConfig {
    /// Read `SCANNER_THREADS`, `SCANNER_TIMEOUT`, `SCANNER_DELAY` and
    /// `SCANNER_VERBOSE`. Unparsable values keep the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`ScanConfig::from_env`] but with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(v) = lookup("SCANNER_THREADS").and_then(|s| s.trim().parse().ok()) {
            cfg.threads = v;
        }
        if let Some(v) = lookup("SCANNER_TIMEOUT").and_then(|s| s.trim().parse().ok()) {
            cfg.timeout_secs = v;
        }
        if let Some(v) = lookup("SCANNER_DELAY").and_then(|s| s.trim().parse().ok()) {
            cfg.delay_ms = v;
        }
        if let Some(v) = lookup("SCANNER_VERBOSE") {
            cfg.verbose = v.trim().eq_ignore_ascii_case("true");
        }
        cfg.sanitized()
    }

    pub fn sanitized(mut self) -> Self {
        if !(1..=100).contains(&self.threads) {
            self.threads = DEFAULT_THREADS;
        }
        if !self.timeout_secs.is_finite() || !(0.1..=10.0).contains(&self.timeout_secs) {
            self.timeout_secs = DEFAULT_TIMEOUT_SECS;
        }
        if self.delay_ms > 1000 {
            self.delay_ms = DEFAULT_DELAY_MS;
        }
        self
    }

    /// Options for one scan with every phase enabled. The progress bar is
    /// drawn only in verbose mode.
    pub fn options(&self) -> ScanOptions {
        let cfg = self.clone().sanitized();
        ScanOptions {
            threads: cfg.threads,
            timeout: Duration::from_secs_f64(cfg.timeout_secs),
            delay: Duration::from_millis(cfg.delay_ms),
            show_progress: cfg.verbose,
            fingerprint: true,
            analyze_vulns: true,
        }
    }
}

/// Per-scan knobs consumed by the coordinator.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub threads: usize,
    pub timeout: Duration,
    /// Pause between spawning phase-1 probes.
    pub delay: Duration,
    pub show_progress: bool,
    pub fingerprint: bool,
    pub analyze_vulns: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanConfig::default().options()
    }
}

impl ScanOptions {
    /// Worker count clamped into 1..=100.
    pub fn worker_count(&self) -> usize {
        self.threads.clamp(1, 100)
    }

    /// Timeout clamped into 0.1s..=10s.
    pub fn probe_timeout(&self) -> Duration {
        self.timeout
            .clamp(Duration::from_millis(100), Duration::from_secs(10))
    }
}
