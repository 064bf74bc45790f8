//! Clock and Metrics Probe
//!
//! Time and resource awareness for the runtime:
//!
//! - [`Clock`]: wall-clock plus a monotonic origin, so components can reason
//!   about elapsed time without being fooled by wall-clock jumps.
//! - [`MetricsProbe`]: sampled CPU%, memory%, load average and process uptime.
//!   On Linux the probe reads `/proc`; elsewhere it degrades to zeroed samples
//!   rather than failing the stepper.
//! - [`jittered`]: randomized interval helper so periodic work does not phase-lock.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

// ============================================================================
// CLOCK
// ============================================================================

/// Wall + monotonic clock captured at process birth.
#[derive(Debug, Clone)]
pub struct Clock {
    origin: Instant,
    started_at: DateTime<Utc>,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    /// Capture the clock origin now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Current wall-clock time.
    pub fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    /// Milliseconds since the clock was created (monotonic).
    pub fn monotonic_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    /// Process uptime as seen by this clock.
    pub fn uptime(&self) -> Duration {
        self.origin.elapsed()
    }

    /// Wall-clock time at which the clock was created.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Apply up to `frac` (e.g. 0.1 for ±10%) of random jitter to a period.
///
/// Jitter is symmetric around the nominal period and never produces a
/// zero-length interval.
pub fn jittered(period: Duration, frac: f64) -> Duration {
    let frac = frac.clamp(0.0, 0.9);
    if frac == 0.0 {
        return period;
    }
    let nominal = period.as_secs_f64();
    let offset = rand::thread_rng().gen_range(-frac..=frac);
    Duration::from_secs_f64((nominal * (1.0 + offset)).max(0.001))
}

// ============================================================================
// RESOURCE SAMPLE
// ============================================================================

/// A point-in-time resource sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSample {
    /// System CPU utilization in percent (0-100)
    pub cpu_pct: f64,
    /// System memory utilization in percent (0-100)
    pub memory_pct: f64,
    /// 1-minute load average
    pub load_average: f64,
    /// Logical CPU count
    pub cpu_count: usize,
    /// Process uptime in seconds
    pub process_uptime_secs: u64,
    /// When the sample was taken
    pub sampled_at: DateTime<Utc>,
}

impl ResourceSample {
    /// A zeroed sample used when the platform exposes no counters.
    pub fn empty(uptime_secs: u64) -> Self {
        Self {
            cpu_pct: 0.0,
            memory_pct: 0.0,
            load_average: 0.0,
            cpu_count: num_cpus::get(),
            process_uptime_secs: uptime_secs,
            sampled_at: Utc::now(),
        }
    }
}

// ============================================================================
// METRICS PROBE
// ============================================================================

/// Samples CPU, memory and load on demand.
///
/// CPU% is computed as the delta between two `/proc/stat` readings, so the
/// first sample after construction reports 0.0.
#[derive(Debug)]
pub struct MetricsProbe {
    clock: Clock,
    prev_cpu: Option<CpuCounters>,
    last_sample: Option<ResourceSample>,
}

#[derive(Debug, Clone, Copy)]
struct CpuCounters {
    busy: u64,
    total: u64,
}

impl MetricsProbe {
    /// Create a probe sharing the runtime clock.
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            prev_cpu: None,
            last_sample: None,
        }
    }

    /// Take a fresh sample. Never fails; platforms without `/proc` report zeros.
    pub fn sample(&mut self) -> ResourceSample {
        let uptime = self.clock.uptime().as_secs();
        let mut sample = ResourceSample::empty(uptime);

        if let Some(counters) = read_cpu_counters() {
            if let Some(prev) = self.prev_cpu {
                let busy = counters.busy.saturating_sub(prev.busy);
                let total = counters.total.saturating_sub(prev.total);
                if total > 0 {
                    sample.cpu_pct = (busy as f64 / total as f64 * 100.0).clamp(0.0, 100.0);
                }
            }
            self.prev_cpu = Some(counters);
        }

        if let Some(mem_pct) = read_memory_pct() {
            sample.memory_pct = mem_pct;
        }
        if let Some(load) = read_load_average() {
            sample.load_average = load;
        }

        self.last_sample = Some(sample.clone());
        sample
    }

    /// Most recent sample, if any has been taken.
    pub fn last(&self) -> Option<&ResourceSample> {
        self.last_sample.as_ref()
    }
}

#[cfg(target_os = "linux")]
fn read_cpu_counters() -> Option<CpuCounters> {
    let stat = std::fs::read_to_string("/proc/stat").ok()?;
    let line = stat.lines().next()?;
    // "cpu  user nice system idle iowait irq softirq steal ..."
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|f| f.parse().ok())
        .collect();
    if fields.len() < 4 {
        return None;
    }
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    let total: u64 = fields.iter().sum();
    Some(CpuCounters {
        busy: total.saturating_sub(idle),
        total,
    })
}

#[cfg(not(target_os = "linux"))]
fn read_cpu_counters() -> Option<CpuCounters> {
    None
}

#[cfg(target_os = "linux")]
fn read_memory_pct() -> Option<f64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    let mut total_kb = 0u64;
    let mut available_kb = 0u64;
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total_kb = rest.trim().split_whitespace().next()?.parse().ok()?;
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available_kb = rest.trim().split_whitespace().next()?.parse().ok()?;
        }
    }
    if total_kb == 0 {
        return None;
    }
    let used = total_kb.saturating_sub(available_kb);
    Some((used as f64 / total_kb as f64 * 100.0).clamp(0.0, 100.0))
}

#[cfg(not(target_os = "linux"))]
fn read_memory_pct() -> Option<f64> {
    None
}

#[cfg(target_os = "linux")]
fn read_load_average() -> Option<f64> {
    let loadavg = std::fs::read_to_string("/proc/loadavg").ok()?;
    loadavg.split_whitespace().next()?.parse().ok()
}

#[cfg(not(target_os = "linux"))]
fn read_load_average() -> Option<f64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_is_monotonic() {
        let clock = Clock::new();
        let a = clock.monotonic_ms();
        std::thread::sleep(Duration::from_millis(5));
        let b = clock.monotonic_ms();
        assert!(b >= a);
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let period = Duration::from_millis(1000);
        for _ in 0..100 {
            let j = jittered(period, 0.1);
            assert!(j >= Duration::from_millis(899), "jitter below band: {j:?}");
            assert!(j <= Duration::from_millis(1101), "jitter above band: {j:?}");
        }
    }

    #[test]
    fn test_zero_jitter_is_identity() {
        let period = Duration::from_millis(250);
        assert_eq!(jittered(period, 0.0), period);
    }

    #[test]
    fn test_probe_never_fails() {
        let mut probe = MetricsProbe::new(Clock::new());
        let first = probe.sample();
        assert!(first.cpu_pct >= 0.0 && first.cpu_pct <= 100.0);
        assert!(first.memory_pct >= 0.0 && first.memory_pct <= 100.0);
        let second = probe.sample();
        assert!(second.sampled_at >= first.sampled_at);
        assert!(probe.last().is_some());
    }
}
