//! Input configuration.
//!
//! `InputConfig::load()` reads the optional JSON file named by `MULTIVIEW_CONFIG`,
//! fills the gaps with defaults, applies `MULTIVIEW_*` environment overrides and
//! validates the result. Engine flag translation lives in `engine`.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::bundler::{BundleMode, BundlerOptions};
use crate::ingest::CameraSpec;
use crate::{validate_camera_ids, CameraId};

pub mod engine;

pub use engine::{
    parse_point, Detector, DisplayMode, EngineConfig, EngineFlags, ExtraConfig, FaceConfig,
    GuiConfig, HandConfig, HeatMapScaleMode, HeatMapType, OutputConfig, Point, PoseConfig,
    PoseMode, PoseModel, RenderMode, ScaleMode,
};

pub const DEFAULT_CAMERA_IDS: [u32; 4] = [0, 2, 4, 6];
pub const DEFAULT_CALIBRATION_DIR: &str = "models/cameraParameters/flir/";

#[derive(Debug, Deserialize, Default)]
struct InputConfigFile {
    cameras: Option<Vec<CameraFileEntry>>,
    use_3d: Option<bool>,
    calibration_dir: Option<PathBuf>,
    bundle_mode: Option<BundleMode>,
}

#[derive(Debug, Deserialize)]
struct CameraFileEntry {
    id: u32,
    uri: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InputConfig {
    /// Camera order defines each camera's sub-index.
    pub cameras: Vec<CameraSpec>,
    pub use_3d: bool,
    pub calibration_dir: PathBuf,
    pub bundle_mode: BundleMode,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self::from_file(InputConfigFile::default())
    }
}

impl InputConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("MULTIVIEW_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: InputConfigFile) -> Self {
        let cameras = match file.cameras {
            Some(entries) => entries
                .into_iter()
                .map(|entry| {
                    let id = CameraId(entry.id);
                    match entry.uri {
                        Some(uri) => CameraSpec::new(id, uri),
                        None => CameraSpec::device(id),
                    }
                })
                .collect(),
            None => DEFAULT_CAMERA_IDS
                .iter()
                .map(|&id| CameraSpec::device(CameraId(id)))
                .collect(),
        };
        Self {
            cameras,
            use_3d: file.use_3d.unwrap_or(false),
            calibration_dir: file
                .calibration_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CALIBRATION_DIR)),
            bundle_mode: file.bundle_mode.unwrap_or_default(),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(ids) = std::env::var("MULTIVIEW_CAMERAS") {
            let parsed = split_csv(&ids)
                .iter()
                .map(|id| {
                    id.parse::<u32>()
                        .map(CameraId)
                        .map_err(|_| anyhow!("MULTIVIEW_CAMERAS entry '{}' is not a camera id", id))
                })
                .collect::<Result<Vec<_>>>()?;
            if !parsed.is_empty() {
                self.set_camera_ids(parsed);
            }
        }
        if let Ok(uris) = std::env::var("MULTIVIEW_CAMERA_URIS") {
            let parsed = split_csv(&uris);
            if !parsed.is_empty() {
                self.set_camera_uris(parsed)?;
            }
        }
        if let Ok(flag) = std::env::var("MULTIVIEW_3D") {
            self.use_3d = parse_bool(&flag)
                .ok_or_else(|| anyhow!("MULTIVIEW_3D must be one of 1/0/true/false"))?;
        }
        if let Ok(dir) = std::env::var("MULTIVIEW_CALIBRATION_DIR") {
            if !dir.trim().is_empty() {
                self.calibration_dir = PathBuf::from(dir);
            }
        }
        if let Ok(mode) = std::env::var("MULTIVIEW_BUNDLE_MODE") {
            if !mode.trim().is_empty() {
                self.bundle_mode = mode.parse()?;
            }
        }
        Ok(())
    }

    /// Replaces camera uris positionally.
    pub fn set_camera_uris(&mut self, uris: Vec<String>) -> Result<()> {
        if uris.len() != self.cameras.len() {
            return Err(anyhow!(
                "{} camera uris given for {} cameras",
                uris.len(),
                self.cameras.len()
            ));
        }
        for (camera, uri) in self.cameras.iter_mut().zip(uris) {
            camera.uri = uri;
        }
        Ok(())
    }

    /// Replaces the camera list. Ids already configured keep their uri; new
    /// ids get `/dev/video<id>`.
    pub fn set_camera_ids(&mut self, ids: Vec<CameraId>) {
        let previous = std::mem::take(&mut self.cameras);
        self.cameras = ids
            .into_iter()
            .map(|id| {
                previous
                    .iter()
                    .find(|spec| spec.id == id)
                    .cloned()
                    .unwrap_or_else(|| CameraSpec::device(id))
            })
            .collect();
        let dropped: Vec<String> = previous
            .iter()
            .filter(|spec| !self.cameras.iter().any(|c| c.id == spec.id))
            .map(|spec| format!("{} ({})", spec.id, spec.uri))
            .collect();
        if !dropped.is_empty() {
            log::warn!("camera list override drops {}", dropped.join(", "));
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_camera_ids(&self.camera_ids())?;
        if let Some(camera) = self.cameras.iter().find(|c| c.uri.trim().is_empty()) {
            return Err(anyhow!("{} has an empty source uri", camera.id));
        }
        if self.use_3d && self.calibration_dir.as_os_str().is_empty() {
            return Err(anyhow!("3-D mode needs a calibration directory"));
        }
        Ok(())
    }

    pub fn camera_ids(&self) -> Vec<CameraId> {
        self.cameras.iter().map(|c| c.id).collect()
    }

    pub fn bundler_options(&self) -> BundlerOptions {
        BundlerOptions {
            use_3d: self.use_3d,
            calibration_dir: self.calibration_dir.clone(),
            mode: self.bundle_mode,
        }
    }
}

fn read_config_file(path: &Path) -> Result<InputConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
