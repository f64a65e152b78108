//! Image directory source.
//!
//! Plays back a directory of still images (jpg, jpeg, png) as a camera stream,
//! one file per frame in file-name order. When the files run out the source
//! returns an empty frame, which ends the stream.

use anyhow::{anyhow, Context, Result};
use image::GenericImageView;
use std::path::PathBuf;

use super::{CameraSource, SourceStats};
use crate::frame::Frame;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Configuration for an image directory source.
#[derive(Clone, Debug)]
pub struct ImageDirConfig {
    /// Local directory (e.g., "media/cam0/").
    pub path: PathBuf,
}

/// Image directory source.
pub struct ImageDirSource {
    config: ImageDirConfig,
    files: Vec<PathBuf>,
    next: usize,
    frame_count: u64,
}

impl ImageDirSource {
    pub fn new(config: ImageDirConfig) -> Result<Self> {
        if config.path.as_os_str().is_empty() {
            return Err(anyhow!("image directory path is empty"));
        }
        Ok(Self {
            config,
            files: Vec::new(),
            next: 0,
            frame_count: 0,
        })
    }

    fn is_image(path: &std::path::Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }
}

impl CameraSource for ImageDirSource {
    fn connect(&mut self) -> Result<()> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.config.path)
            .with_context(|| format!("list image directory {}", self.config.path.display()))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()
            .with_context(|| format!("read image directory {}", self.config.path.display()))?;
        files.retain(|path| path.is_file() && Self::is_image(path));
        files.sort();
        log::info!(
            "ImageDirSource: {} images in {}",
            files.len(),
            self.config.path.display()
        );
        self.files = files;
        self.next = 0;
        Ok(())
    }

    fn get_frame(&mut self) -> Result<Frame> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(Frame::empty());
        };
        self.next += 1;

        let image = image::open(path).with_context(|| format!("decode {}", path.display()))?;
        let (width, height) = image.dimensions();
        let rgb = image.into_rgb8();

        self.frame_count += 1;
        Frame::new(rgb.into_raw(), width, height, 3, self.frame_count)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            device: format!("dir://{}", self.config.path.display()),
        }
    }
}
