// src/config.rs - Startup configuration: dataset roots and decode tuning
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const PROCESSED_ROOT_ENV: &str = "IMU_VIEWER_PROCESSED_ROOT";
pub const READY_ROOT_ENV: &str = "IMU_VIEWER_READY_ROOT";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Root of the processed dataset holding the segment videos.
    pub processed_root: PathBuf,
    /// Root of the ready-to-analyse dataset holding the IMU CSV files.
    pub ready_root: PathBuf,
    /// Frames wider than this are downscaled while decoding.
    pub decode_max_width: u32,
    /// Frames decoded per UI update before yielding back to the event loop.
    pub frames_per_update: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        let data_dir = directories::UserDirs::new()
            .and_then(|dirs| dirs.document_dir().map(|p| p.join("MyTurn_Project").join("Data")))
            .unwrap_or_else(|| PathBuf::from("./Data"));

        Self {
            processed_root: data_dir.join("Processed"),
            ready_root: data_dir.join("ReadyToAnalyse"),
            decode_max_width: 960,
            frames_per_update: 8,
        }
    }
}

impl ViewerConfig {
    /// Defaults, then the optional config file, then environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match config_file_path() {
            Some(path) if path.is_file() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var_os(key).map(PathBuf::from));
        Ok(config.sanitized())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<PathBuf>) {
        if let Some(root) = lookup(PROCESSED_ROOT_ENV) {
            self.processed_root = root;
        }
        if let Some(root) = lookup(READY_ROOT_ENV) {
            self.ready_root = root;
        }
    }

    fn sanitized(mut self) -> Self {
        self.decode_max_width = self.decode_max_width.max(16);
        self.frames_per_update = self.frames_per_update.max(1);
        self
    }
}

fn config_file_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "imu-viewer")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}
