//! Multi-view input kernel
//!
//! This crate feeds a multi-view pose engine with synchronized bundles of
//! camera frames.
//!
//! # Architecture
//!
//! - Each configured camera is opened as one `CameraSource`.
//! - `FrameBundler` pulls one frame from every source per round and hands out
//!   one `FrameBundle` per pull, attaching calibration when 3-D mode is on.
//! - The first invalid frame or acquisition error stops the bundler for good.
//! - `Pipeline` registers the bundler as the engine's input stage and drives
//!   it to completion.
//!
//! # Module Structure
//!
//! - `frame`: Frame, Datum, FrameBundle and the holding queue
//! - `ingest`: Camera sources (stub, V4L2, image directories)
//! - `calibration`: Per-camera intrinsic/extrinsic parameters
//! - `bundler`: The round-robin frame bundler
//! - `pipeline`: Producer registration and the synchronous driver
//! - `config`: Input configuration and engine flag translation
//! - `logging`, `ui`: Logger setup and stage reporting for the binaries

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub mod bundler;
pub mod calibration;
pub mod config;
pub mod frame;
pub mod ingest;
pub mod logging;
pub mod pipeline;
pub mod ui;

pub use bundler::{
    BundleMode, BundlerOptions, BundlerState, BundlerStats, FrameBundler, Pull, StopHandle,
    StopReason,
};
pub use calibration::{CalibrationSet, CalibrationStore, CameraCalibration, Mat3, Mat3x4};
pub use frame::{Datum, Frame, FrameBundle, HoldingQueue};
pub use ingest::{open_camera, CameraSource, CameraSpec, SourceStats, StubConfig, StubSource};
#[cfg(feature = "ingest-image-dir")]
pub use ingest::{ImageDirConfig, ImageDirSource};
#[cfg(feature = "ingest-v4l2")]
pub use ingest::{V4l2Config, V4l2Source};
pub use pipeline::{
    BundleProducer, Pipeline, PoseEngine, ProcessedBundle, RunSummary, StubEngine,
};

// -------------------- Camera Ids --------------------

/// Identifier of a physical camera (webcam index, device number).
///
/// The configured list of ids is fixed at construction; its order defines the
/// sub-index each camera gets inside a bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraId(pub u32);

impl CameraId {
    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cam{}", self.0)
    }
}

impl From<u32> for CameraId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Rejects empty and duplicated camera lists.
pub fn validate_camera_ids(ids: &[CameraId]) -> anyhow::Result<()> {
    if ids.is_empty() {
        return Err(anyhow::anyhow!("at least one camera id must be configured"));
    }
    for (i, id) in ids.iter().enumerate() {
        if ids[..i].contains(id) {
            return Err(anyhow::anyhow!("camera id {} configured more than once", id.0));
        }
    }
    Ok(())
}

// -------------------- Bundler Errors --------------------

/// Classified failures of the input stage.
///
/// These travel inside `anyhow::Error`; recover the kind with
/// `err.downcast_ref::<BundlerError>()`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BundlerError {
    /// A camera produced an empty frame: the stream is over.
    DeviceExhausted { camera: CameraId },
    /// Calibration was requested but could not be loaded.
    CalibrationLoad { path: PathBuf, message: String },
    /// Any other failure while acquiring a frame. Never retried.
    TransientAcquisition { camera: CameraId, message: String },
}

impl BundlerError {
    pub fn code(&self) -> &'static str {
        match self {
            BundlerError::DeviceExhausted { .. } => "DEVICE_EXHAUSTED",
            BundlerError::CalibrationLoad { .. } => "CALIBRATION_LOAD",
            BundlerError::TransientAcquisition { .. } => "TRANSIENT_ACQUISITION",
        }
    }
}

impl fmt::Display for BundlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundlerError::DeviceExhausted { camera } => {
                write!(f, "{}: {} returned an empty frame", self.code(), camera)
            }
            BundlerError::CalibrationLoad { path, message } => write!(
                f,
                "{}: cannot load calibration from {}: {}",
                self.code(),
                path.display(),
                message
            ),
            BundlerError::TransientAcquisition { camera, message } => {
                write!(f, "{}: {}: {}", self.code(), camera, message)
            }
        }
    }
}

impl std::error::Error for BundlerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_ids_must_be_unique_and_non_empty() {
        assert!(validate_camera_ids(&[]).is_err());
        assert!(validate_camera_ids(&[CameraId(0), CameraId(2), CameraId(0)]).is_err());
        assert!(validate_camera_ids(&[CameraId(0), CameraId(2), CameraId(4), CameraId(6)]).is_ok());
    }

    #[test]
    fn bundler_error_survives_anyhow_round_trip() {
        let err: anyhow::Error = BundlerError::DeviceExhausted {
            camera: CameraId(4),
        }
        .into();
        let kind = err.downcast_ref::<BundlerError>().expect("bundler error");
        assert_eq!(kind.code(), "DEVICE_EXHAUSTED");
        assert!(err.to_string().contains("cam4"));
    }
}
