//! Perf counters and logging setup.
//!
//! Counters stay off unless `BEACH_CELLS_PERF` is truthy. The session records
//! two of them: time spent applying each inbound frame and inbound byte
//! volume. Each label prints a summary line to stderr every
//! [`REPORT_EVERY`] samples.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

pub mod logging;

pub use logging::hexdump;

pub const REPORT_EVERY: u64 = 200;

fn env_truthy(var: &str) -> Option<bool> {
    std::env::var(var).map(|v| v != "0" && !v.is_empty()).ok()
}

static PERF_ENABLED: Lazy<bool> = Lazy::new(|| env_truthy("BEACH_CELLS_PERF").unwrap_or(false));

static REGISTRY: Lazy<Mutex<PerfRegistry>> = Lazy::new(|| Mutex::new(PerfRegistry::default()));

pub fn enabled() -> bool {
    *PERF_ENABLED
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PerfStat {
    pub count: u64,
    pub total: Duration,
    pub max: Duration,
    pub bytes: u64,
}

impl PerfStat {
    fn summary(&self, label: &str) -> String {
        let avg = match self.count {
            0 => Duration::ZERO,
            count => self.total / count as u32,
        };
        format!(
            "[perf] {label}: count={} avg={:.2}µs max={:.2}µs bytes={:.1}KiB",
            self.count,
            avg.as_secs_f64() * 1e6,
            self.max.as_secs_f64() * 1e6,
            self.bytes as f64 / 1024.0
        )
    }
}

/// Per-label accumulators. A sample returns a summary line when the label
/// reaches a multiple of [`REPORT_EVERY`].
#[derive(Debug, Default)]
pub struct PerfRegistry {
    stats: HashMap<&'static str, PerfStat>,
}

impl PerfRegistry {
    pub fn sample(
        &mut self,
        label: &'static str,
        elapsed: Option<Duration>,
        bytes: usize,
    ) -> Option<String> {
        let stat = self.stats.entry(label).or_default();
        stat.count += 1;
        stat.bytes = stat.bytes.saturating_add(bytes as u64);
        if let Some(elapsed) = elapsed {
            stat.total += elapsed;
            stat.max = stat.max.max(elapsed);
        }
        (stat.count % REPORT_EVERY == 0).then(|| stat.summary(label))
    }

    pub fn get(&self, label: &str) -> Option<PerfStat> {
        self.stats.get(label).copied()
    }
}

fn sample(label: &'static str, elapsed: Option<Duration>, bytes: usize) {
    if !enabled() {
        return;
    }
    if let Some(line) = REGISTRY.lock().sample(label, elapsed, bytes) {
        eprintln!("{line}");
    }
}

pub fn record_duration(label: &'static str, duration: Duration) {
    sample(label, Some(duration), 0);
}

pub fn record_bytes(label: &'static str, bytes: usize) {
    sample(label, None, bytes);
}

/// Records the elapsed time of a scope under `label` when dropped.
pub struct PerfGuard {
    label: &'static str,
    start: Instant,
}

impl PerfGuard {
    pub fn new(label: &'static str) -> Option<Self> {
        enabled().then(|| Self {
            label,
            start: Instant::now(),
        })
    }
}

impl Drop for PerfGuard {
    fn drop(&mut self) {
        record_duration(self.label, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_reports_on_cadence() {
        let mut registry = PerfRegistry::default();
        let mut reports = Vec::new();
        for i in 0..(REPORT_EVERY * 2) {
            let elapsed = Duration::from_micros(if i == 7 { 90 } else { 10 });
            if let Some(line) = registry.sample("apply", Some(elapsed), 4) {
                reports.push(line);
            }
        }
        assert_eq!(reports.len(), 2);
        assert!(reports[0].starts_with("[perf] apply: count=200 "));
        let stat = registry.get("apply").unwrap();
        assert_eq!(stat.max, Duration::from_micros(90));
        assert_eq!(stat.bytes, 4 * REPORT_EVERY * 2);
    }

    #[test]
    fn byte_samples_keep_labels_apart() {
        let mut registry = PerfRegistry::default();
        assert!(registry.sample("inbound", None, 10).is_none());
        registry.sample("inbound", None, 22);
        registry.sample("other", None, 1);
        let inbound = registry.get("inbound").unwrap();
        assert_eq!((inbound.count, inbound.bytes), (2, 32));
        assert_eq!(inbound.total, Duration::ZERO);
        assert!(registry.get("missing").is_none());
    }
}
