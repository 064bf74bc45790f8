//! Body Schema
//!
//! A snapshot of what the process physically *is*: identity captured at
//! birth, current resource usage, environment summary, and the tools the
//! capability registry currently exposes. The assembler renders this into
//! the identity section of every prompt; the safety envelope compares the
//! birth identity against later recomputations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, ResourceSample};

// ============================================================================
// PROCESS IDENTITY
// ============================================================================

/// Process identity captured once at birth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessIdentity {
    /// Process id
    pub pid: u32,
    /// Parent process id (0 when unavailable)
    pub ppid: u32,
    /// Executable path as reported by the OS
    pub executable: String,
    /// Working directory at birth
    pub working_dir: String,
    /// Host name
    pub hostname: String,
    /// Target platform triple-ish summary (os/arch)
    pub platform: String,
    /// Runtime version string (crate version)
    pub runtime_version: String,
    /// Wall-clock birth time
    pub born_at: DateTime<Utc>,
}

impl ProcessIdentity {
    /// Capture the current process identity.
    pub fn capture() -> Self {
        Self {
            pid: std::process::id(),
            ppid: read_ppid().unwrap_or(0),
            executable: std::env::current_exe()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            working_dir: std::env::current_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            hostname: hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            platform: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
            runtime_version: env!("CARGO_PKG_VERSION").to_string(),
            born_at: Utc::now(),
        }
    }
}

#[cfg(target_os = "linux")]
fn read_ppid() -> Option<u32> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("PPid:") {
            return rest.trim().parse().ok();
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn read_ppid() -> Option<u32> {
    None
}

// ============================================================================
// BODY SCHEMA
// ============================================================================

/// Environment summary rendered into prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentInfo {
    /// Logical CPU count
    pub cpu_count: usize,
    /// Operating system
    pub os: String,
    /// Architecture
    pub arch: String,
}

impl EnvironmentInfo {
    fn capture() -> Self {
        Self {
            cpu_count: num_cpus::get(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

/// The body schema: identity + resources + environment + tool availability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodySchema {
    /// Identity captured at birth; immutable
    pub identity: ProcessIdentity,
    /// Environment summary
    pub environment: EnvironmentInfo,
    /// Latest resource sample, if one has been taken
    pub resources: Option<ResourceSample>,
    /// Names of currently available tools
    pub available_tools: Vec<String>,
    /// When the mutable parts were last refreshed
    pub refreshed_at: DateTime<Utc>,
}

impl BodySchema {
    /// Capture a fresh body schema at process birth.
    pub fn capture() -> Self {
        Self {
            identity: ProcessIdentity::capture(),
            environment: EnvironmentInfo::capture(),
            resources: None,
            available_tools: vec![],
            refreshed_at: Utc::now(),
        }
    }

    /// Update the resource view from a fresh sample.
    pub fn refresh_resources(&mut self, sample: ResourceSample) {
        self.resources = Some(sample);
        self.refreshed_at = Utc::now();
    }

    /// Replace the tool availability list (sorted for stable rendering).
    pub fn set_available_tools(&mut self, mut tools: Vec<String>) {
        tools.sort();
        self.available_tools = tools;
        self.refreshed_at = Utc::now();
    }

    /// Uptime relative to the supplied clock.
    pub fn uptime_secs(&self, clock: &Clock) -> u64 {
        clock.uptime().as_secs()
    }

    /// Compact description used by the assembler identity section.
    pub fn describe(&self) -> String {
        let resources = match &self.resources {
            Some(r) => format!(
                "cpu {:.0}%, mem {:.0}%, load {:.2}",
                r.cpu_pct, r.memory_pct, r.load_average
            ),
            None => "resources unsampled".to_string(),
        };
        format!(
            "pid {} on {} ({}); {} tools available; {}",
            self.identity.pid,
            self.identity.hostname,
            self.identity.platform,
            self.available_tools.len(),
            resources
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_fills_identity() {
        let body = BodySchema::capture();
        assert!(body.identity.pid > 0);
        assert!(!body.identity.platform.is_empty());
        assert!(!body.identity.runtime_version.is_empty());
        assert!(body.environment.cpu_count >= 1);
    }

    #[test]
    fn test_tools_are_sorted() {
        let mut body = BodySchema::capture();
        body.set_available_tools(vec!["zeta".into(), "alpha".into(), "mid".into()]);
        assert_eq!(body.available_tools, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_describe_mentions_pid_and_tools() {
        let mut body = BodySchema::capture();
        body.set_available_tools(vec!["echo".into()]);
        let text = body.describe();
        assert!(text.contains(&body.identity.pid.to_string()));
        assert!(text.contains("1 tools available"));
    }
}
