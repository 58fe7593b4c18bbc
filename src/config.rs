use std::path::PathBuf;
use std::time::Duration;

use crate::coordinator::ScanTuning;

/// Settings the HTTP surface needs at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Credential callers must present; injected here rather than compiled in.
    pub access_key: String,
    /// Directory holding the optional `index.html` web UI.
    pub ui_dir: PathBuf,
    pub tuning: ScanTuning,
}

impl ServerConfig {
    pub fn new(access_key: impl Into<String>) -> Self {
        Self {
            bind: "0.0.0.0:9090".to_string(),
            access_key: access_key.into(),
            ui_dir: PathBuf::from("ui"),
            tuning: ScanTuning::default(),
        }
    }

    pub fn ui_index(&self) -> PathBuf {
        self.ui_dir.join("index.html")
    }

    pub fn has_ui(&self) -> bool {
        self.ui_index().is_file()
    }
}

/// Build tuning from the CLI's millisecond knobs.
pub fn tuning_from_millis(progress_step: u64, sample_interval_ms: u64, grace_ms: u64) -> ScanTuning {
    ScanTuning {
        progress_step: progress_step.max(1),
        sample_interval: Duration::from_millis(sample_interval_ms.max(1)),
        grace_period: Duration::from_millis(grace_ms),
    }
}
