//! Synthetic camera source.
//!
//! `stub://<name>[?frames=N&width=W&height=H&fail_at=K]`
//!
//! - `frames`: number of valid frames before the source returns an empty frame
//!   (unbounded when absent)
//! - `width`/`height`: frame size, 640x480 by default
//! - `fail_at`: capture number that fails with an acquisition error
//!
//! Frames are deterministic RGB patterns, so tests and dry runs can tell cameras
//! and rounds apart.

use anyhow::{anyhow, Result};

use super::{CameraSource, SourceStats};
use crate::frame::Frame;

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
/// Largest synthetic frame, in bytes (an 8K RGB frame fits).
const MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;

/// Byte length of a `width x height` RGB frame, bounded by `MAX_FRAME_BYTES`.
fn rgb_frame_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(3))
        .filter(|&n| n <= MAX_FRAME_BYTES)
        .ok_or_else(|| anyhow!("stub source size {}x{} is too large", width, height))
}

/// Configuration for a synthetic source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StubConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Valid frames before end-of-stream. `None` never ends.
    pub frame_limit: Option<u64>,
    /// Capture number (1-based) that returns an error instead of a frame.
    pub fail_at: Option<u64>,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            name: "stub".to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            frame_limit: None,
            fail_at: None,
        }
    }
}

impl StubConfig {
    pub fn from_uri(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("stub source uri must start with stub://"))?;
        let (name, query) = match rest.split_once('?') {
            Some((name, query)) => (name, Some(query)),
            None => (rest, None),
        };

        let mut config = StubConfig {
            name: if name.is_empty() { "stub" } else { name }.to_string(),
            ..StubConfig::default()
        };

        for pair in query.into_iter().flat_map(|q| q.split('&')) {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("stub source parameter '{}' needs a value", pair))?;
            let parsed: u64 = value
                .parse()
                .map_err(|_| anyhow!("stub source parameter {} must be an integer", key))?;
            match key {
                "frames" => config.frame_limit = Some(parsed),
                "width" => config.width = parsed.try_into()?,
                "height" => config.height = parsed.try_into()?,
                "fail_at" => config.fail_at = Some(parsed),
                other => return Err(anyhow!("unknown stub source parameter '{}'", other)),
            }
        }

        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("stub source size must be non-zero"));
        }
        rgb_frame_len(config.width, config.height)?;
        Ok(config)
    }
}

/// Synthetic camera source.
pub struct StubSource {
    config: StubConfig,
    frame_count: u64,
    attempts: u64,
    /// Simulated "scene" state, bumped every 50 frames.
    scene_state: u8,
}

impl StubSource {
    pub fn new(config: StubConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            attempts: 0,
            scene_state: 0,
        }
    }

    fn generate_synthetic_pixels(&mut self) -> Result<Vec<u8>> {
        let pixel_count = rgb_frame_len(self.config.width, self.config.height)?;

        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        Ok(pixels)
    }
}

impl CameraSource for StubSource {
    fn connect(&mut self) -> Result<()> {
        log::info!("StubSource: connected to stub://{} (synthetic)", self.config.name);
        Ok(())
    }

    fn get_frame(&mut self) -> Result<Frame> {
        self.attempts += 1;
        if self.config.fail_at == Some(self.attempts) {
            return Err(anyhow!(
                "stub://{}: simulated capture failure",
                self.config.name
            ));
        }
        if let Some(limit) = self.config.frame_limit {
            if self.frame_count >= limit {
                return Ok(Frame::empty());
            }
        }

        self.frame_count += 1;
        let pixels = self.generate_synthetic_pixels()?;
        Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            3,
            self.frame_count,
        )
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            device: format!("stub://{}", self.config.name),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
