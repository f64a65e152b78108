//! Camera sources.
//!
//! This module provides the sources a `FrameBundler` reads from:
//! - Stub source (`stub://`, synthetic frames for tests and dry runs)
//! - USB/V4L2 devices (`/dev/videoN` or a bare index, feature: ingest-v4l2)
//! - Image directories (`dir://<path>`, feature: ingest-image-dir)
//!
//! Every source follows the same contract:
//! - `get_frame()` returns an empty `Frame` at end-of-stream or when the device is gone
//! - `get_frame()` returns `Err` for any other acquisition failure
//! - Sources never retry internally; retry policy belongs to the caller

use anyhow::{anyhow, Result};

use crate::frame::Frame;
use crate::CameraId;

#[cfg(feature = "ingest-image-dir")]
pub mod image_dir;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod stub;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

#[cfg(feature = "ingest-image-dir")]
pub use image_dir::{ImageDirConfig, ImageDirSource};
pub use stub::{StubConfig, StubSource};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::{V4l2Config, V4l2Source};

/// One camera device, exclusively owned by whoever reads from it.
pub trait CameraSource: Send {
    /// Open the underlying device. Called once before the first frame.
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Capture the next frame. An empty frame means the stream is over.
    fn get_frame(&mut self) -> Result<Frame>;

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool {
        true
    }

    /// Get frame statistics.
    fn stats(&self) -> SourceStats;

    /// Device label for logs.
    fn describe(&self) -> String {
        self.stats().device
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub device: String,
}

/// A configured camera: its id and where its frames come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraSpec {
    pub id: CameraId,
    pub uri: String,
}

impl CameraSpec {
    pub fn new(id: CameraId, uri: impl Into<String>) -> Self {
        Self {
            id,
            uri: uri.into(),
        }
    }

    /// The webcam device matching the id (`/dev/video<id>`).
    pub fn device(id: CameraId) -> Self {
        Self::new(id, format!("/dev/video{}", id.0))
    }
}

/// Open and connect the source named by `spec.uri`.
pub fn open_camera(spec: &CameraSpec) -> Result<Box<dyn CameraSource>> {
    let uri = spec.uri.trim();
    if uri.is_empty() {
        return Err(anyhow!("{}: empty source uri", spec.id));
    }

    let mut source: Box<dyn CameraSource> = if uri.starts_with("stub://") {
        Box::new(StubSource::new(StubConfig::from_uri(uri)?))
    } else if let Some(path) = uri.strip_prefix("dir://") {
        open_image_dir(path)?
    } else if is_device_uri(uri) {
        open_v4l2(uri)?
    } else {
        return Err(anyhow!("{}: unsupported source uri '{}'", spec.id, uri));
    };

    source.connect()?;
    log::info!("{}: opened {}", spec.id, source.describe());
    Ok(source)
}

fn is_device_uri(uri: &str) -> bool {
    uri.starts_with("/dev/") || (!uri.is_empty() && uri.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(feature = "ingest-image-dir")]
fn open_image_dir(path: &str) -> Result<Box<dyn CameraSource>> {
    Ok(Box::new(ImageDirSource::new(ImageDirConfig {
        path: path.into(),
    })?))
}

#[cfg(not(feature = "ingest-image-dir"))]
fn open_image_dir(_path: &str) -> Result<Box<dyn CameraSource>> {
    Err(anyhow!(
        "image directory sources require the ingest-image-dir feature"
    ))
}

#[cfg(feature = "ingest-v4l2")]
fn open_v4l2(uri: &str) -> Result<Box<dyn CameraSource>> {
    let device = if uri.starts_with("/dev/") {
        uri.to_string()
    } else {
        format!("/dev/video{}", uri)
    };
    Ok(Box::new(V4l2Source::new(V4l2Config {
        device,
        ..V4l2Config::default()
    })?))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_v4l2(uri: &str) -> Result<Box<dyn CameraSource>> {
    Err(anyhow!(
        "camera device {} requires the ingest-v4l2 feature",
        uri
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_stub_sources() -> Result<()> {
        let spec = CameraSpec::new(CameraId(2), "stub://left?width=8&height=4");
        let mut source = open_camera(&spec)?;
        let frame = source.get_frame()?;
        assert_eq!(frame.dimensions(), (8, 4));
        assert_eq!(source.stats().frames_captured, 1);
        Ok(())
    }

    #[test]
    fn rejects_unknown_schemes() {
        let spec = CameraSpec::new(CameraId(0), "rtsp://camera-1/stream");
        assert!(open_camera(&spec).is_err());
        let spec = CameraSpec::new(CameraId(0), "  ");
        assert!(open_camera(&spec).is_err());
    }

    #[test]
    fn device_spec_follows_camera_id() {
        assert_eq!(CameraSpec::device(CameraId(6)).uri, "/dev/video6");
        assert!(is_device_uri("/dev/video6"));
        assert!(is_device_uri("4"));
        assert!(!is_device_uri("stub://x"));
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn device_sources_need_the_v4l2_feature() {
        let err = open_camera(&CameraSpec::device(CameraId(0))).err().expect("error");
        assert!(err.to_string().contains("ingest-v4l2"));
    }
}
