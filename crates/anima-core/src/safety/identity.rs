//! Identity Anchor (Layer 1)
//!
//! Captures a process identity at birth and derives a "soul signature":
//! a SHA-256 over a declared entropy vector. Verification recomputes the
//! deterministic fields and compares them component-wise; the genesis
//! signature itself is immutable for the life of the process.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{LayerReport, Violation};

/// Fields whose drift means the process itself changed.
const CRITICAL_FIELDS: [&str; 3] = ["pid", "ppid", "uid"];

// ============================================================================
// ENTROPY VECTOR
// ============================================================================

/// The declared entropy vector hashed into the soul signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntropyVector {
    /// Process id
    pub pid: u32,
    /// Parent process id
    pub ppid: u32,
    /// Real user id (0 when unavailable)
    pub uid: u32,
    /// Host name
    pub hostname: String,
    /// System uptime at capture, seconds (0 when unavailable)
    pub uptime_secs: u64,
    /// Working directory
    pub cwd: String,
    /// Platform (os/arch)
    pub platform: String,
    /// Runtime version string
    pub runtime_version: String,
    /// Random bytes, hex-encoded (genesis entropy, never recomputed)
    pub random: String,
    /// Capture time, epoch milliseconds
    pub epoch_ms: i64,
}

impl EntropyVector {
    /// Capture the current process identity plus fresh entropy.
    pub fn capture() -> Self {
        let mut random_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut random_bytes);

        Self {
            pid: std::process::id(),
            ppid: read_ppid().unwrap_or(0),
            uid: read_uid().unwrap_or(0),
            hostname: hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            uptime_secs: read_system_uptime().unwrap_or(0),
            cwd: std::env::current_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            platform: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
            runtime_version: env!("CARGO_PKG_VERSION").to_string(),
            random: hex::encode(random_bytes),
            epoch_ms: Utc::now().timestamp_millis(),
        }
    }

    /// Canonical serialization hashed into the signature.
    fn canonical(&self) -> String {
        format!(
            "pid={};ppid={};uid={};host={};uptime={};cwd={};platform={};runtime={};random={};epoch={}",
            self.pid,
            self.ppid,
            self.uid,
            self.hostname,
            self.uptime_secs,
            self.cwd,
            self.platform,
            self.runtime_version,
            self.random,
            self.epoch_ms
        )
    }

    /// SHA-256 over the canonical form.
    pub fn signature(&self) -> String {
        hex::encode(Sha256::digest(self.canonical().as_bytes()))
    }

    /// Component-wise comparison of the deterministic fields.
    /// Returns (field, genesis value, current value) per mismatch.
    fn diff(&self, current: &EntropyVector) -> Vec<(String, String, String)> {
        let mut mismatches = Vec::new();
        let pairs = [
            ("pid", self.pid.to_string(), current.pid.to_string()),
            ("ppid", self.ppid.to_string(), current.ppid.to_string()),
            ("uid", self.uid.to_string(), current.uid.to_string()),
            ("hostname", self.hostname.clone(), current.hostname.clone()),
            ("cwd", self.cwd.clone(), current.cwd.clone()),
            ("platform", self.platform.clone(), current.platform.clone()),
            (
                "runtime_version",
                self.runtime_version.clone(),
                current.runtime_version.clone(),
            ),
        ];
        for (field, genesis, now) in pairs {
            if genesis != now {
                mismatches.push((field.to_string(), genesis, now));
            }
        }
        mismatches
    }
}

#[cfg(target_os = "linux")]
fn read_ppid() -> Option<u32> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find_map(|l| l.strip_prefix("PPid:"))
        .and_then(|v| v.trim().parse().ok())
}

#[cfg(not(target_os = "linux"))]
fn read_ppid() -> Option<u32> {
    None
}

#[cfg(target_os = "linux")]
fn read_uid() -> Option<u32> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find_map(|l| l.strip_prefix("Uid:"))
        .and_then(|v| v.split_whitespace().next()?.parse().ok())
}

#[cfg(not(target_os = "linux"))]
fn read_uid() -> Option<u32> {
    None
}

#[cfg(target_os = "linux")]
fn read_system_uptime() -> Option<u64> {
    let uptime = std::fs::read_to_string("/proc/uptime").ok()?;
    uptime
        .split_whitespace()
        .next()?
        .parse::<f64>()
        .ok()
        .map(|secs| secs as u64)
}

#[cfg(not(target_os = "linux"))]
fn read_system_uptime() -> Option<u64> {
    None
}

// ============================================================================
// ANCHOR
// ============================================================================

/// The identity anchor.
#[derive(Debug, Clone)]
pub struct IdentityAnchor {
    genesis: EntropyVector,
    genesis_signature: String,
    strict: bool,
    last_rotation: Option<DateTime<Utc>>,
    rotations: Vec<String>,
}

impl IdentityAnchor {
    /// Capture genesis at birth.
    pub fn capture(strict: bool) -> Self {
        let genesis = EntropyVector::capture();
        let genesis_signature = genesis.signature();
        tracing::info!(signature = %genesis_signature, "identity anchor captured");
        Self {
            genesis,
            genesis_signature,
            strict,
            last_rotation: None,
            rotations: vec![],
        }
    }

    /// The immutable genesis signature.
    pub fn soul_signature(&self) -> &str {
        &self.genesis_signature
    }

    /// The genesis entropy vector.
    pub fn genesis(&self) -> &EntropyVector {
        &self.genesis
    }

    /// Recompute a signature from the current process state. The genesis
    /// random bytes and epoch are carried forward (they are entropy, not
    /// state to re-observe).
    pub fn current_signature(&self) -> String {
        let mut current = EntropyVector::capture();
        current.random = self.genesis.random.clone();
        current.epoch_ms = self.genesis.epoch_ms;
        current.uptime_secs = self.genesis.uptime_secs;
        current.signature()
    }

    /// Verify the captured identity against the current process.
    ///
    /// Differences in pid, ppid or uid are critical (the process is not the
    /// one that was born); other differences are minor. Strict mode treats
    /// any mismatch as critical.
    pub fn verify(&self) -> LayerReport {
        let current = EntropyVector::capture();
        let mismatches = self.genesis.diff(&current);

        let mut report = LayerReport::passing("identity");
        for (field, genesis, now) in mismatches {
            let critical = self.strict || CRITICAL_FIELDS.contains(&field.as_str());
            report.violations.push(Violation {
                code: format!("identity-drift:{field}"),
                message: format!("{field} changed: genesis '{genesis}' vs current '{now}'"),
                severity: if critical { 1.0 } else { 0.4 },
                critical,
            });
        }

        if !report.violations.is_empty() {
            report.passed = !report.violations.iter().any(|v| v.critical);
            report
                .recommendations
                .push("re-anchor only through a trusted restart".to_string());
        }
        report
    }

    /// Emit a rotated signature. Genesis stays immutable; rotations are
    /// derived from it plus fresh entropy.
    pub fn rotate(&mut self) -> String {
        let mut entropy = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut entropy);
        let rotated = hex::encode(Sha256::digest(
            format!(
                "{}:{}:{}",
                self.genesis_signature,
                Utc::now().timestamp_millis(),
                hex::encode(entropy)
            )
            .as_bytes(),
        ));
        self.last_rotation = Some(Utc::now());
        self.rotations.push(rotated.clone());
        rotated
    }

    /// Signatures emitted by rotation, oldest first.
    pub fn rotations(&self) -> &[String] {
        &self.rotations
    }

    /// When the last rotation happened.
    pub fn last_rotation(&self) -> Option<DateTime<Utc>> {
        self.last_rotation
    }
}
