//! Test Runtime Manager
//!
//! Provides isolated runtime instances for testing:
//! - Ephemeral runtimes with in-memory snapshot stores
//! - File-backed runtimes over a temp dir for persistence journeys
//! - Fast stepper cadence so journeys settle in milliseconds

use std::path::PathBuf;
use tempfile::TempDir;

use anima_core::config::SnapshotConfig;
use anima_core::{CognitiveRuntime, CoreConfig};

/// Manager for test runtimes.
///
/// Creates isolated runtime instances so tests cannot interfere through a
/// shared snapshot store. Temp directories are cleaned up on drop.
pub struct RuntimeManager {
    /// The runtime under test
    pub runtime: CognitiveRuntime,
    _tempdir: Option<TempDir>,
}

impl RuntimeManager {
    /// Fast test configuration: 10 ms stepper, in-memory snapshots.
    pub fn fast_config() -> CoreConfig {
        let mut config = CoreConfig {
            snapshot: SnapshotConfig {
                in_memory: true,
                ..Default::default()
            },
            ..Default::default()
        };
        config.scheduler.loop_interval_ms = 10;
        config.hormones.decay_tick_ms = 50;
        config
    }

    /// Ephemeral runtime, not started.
    pub fn new_ephemeral() -> Self {
        Self {
            runtime: CognitiveRuntime::new(Self::fast_config()).expect("runtime builds"),
            _tempdir: None,
        }
    }

    /// Ephemeral runtime with the stepper already running.
    pub fn new_running() -> Self {
        let mut manager = Self::new_ephemeral();
        manager.runtime.start();
        manager
    }

    /// File-backed runtime over a fresh temp dir. Returns the manager and
    /// the snapshot path; keep the manager alive while reopening, the temp
    /// dir is deleted when it drops.
    pub fn new_file_backed() -> (Self, PathBuf) {
        let tempdir = TempDir::new().expect("tempdir");
        let path = tempdir.path().join("anima-e2e.db");
        let mut config = Self::fast_config();
        config.snapshot = SnapshotConfig {
            path: Some(path.clone()),
            in_memory: false,
            ..Default::default()
        };
        (
            Self {
                runtime: CognitiveRuntime::new(config).expect("runtime builds"),
                _tempdir: Some(tempdir),
            },
            path,
        )
    }

    /// Reopen a runtime over an existing snapshot path.
    pub fn reopen(path: PathBuf) -> CognitiveRuntime {
        let mut config = Self::fast_config();
        config.snapshot = SnapshotConfig {
            path: Some(path),
            in_memory: false,
            ..Default::default()
        };
        CognitiveRuntime::new(config).expect("runtime reopens")
    }
}
