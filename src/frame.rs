//! Frame data model.
//!
//! - `Frame`: One image captured from one camera. Owned, never cloned.
//! - `Datum`: One camera's contribution to a bundle (frame + sub-index + calibration).
//! - `FrameBundle`: The datums of one acquisition round, in camera order.
//! - `HoldingQueue`: FIFO of bundles waiting for delivery. Only the bundler touches it.
//!
//! Frames move from a `CameraSource` into a `Datum`, from the datum into a bundle,
//! and from the bundle into the consumer. Nothing in this module hands out a second
//! owner of the pixel data.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::calibration::CameraCalibration;
use crate::CameraId;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// Image matrix captured from one camera at one acquisition instant.
///
/// There is deliberately no `Clone` impl: a frame has exactly one owner.
/// An empty frame (no pixels or a zero dimension) means end-of-stream.
#[derive(Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    /// Per-source capture counter, starting at 1.
    pub sequence: u64,
}

impl Frame {
    /// Wraps row-major interleaved pixel data.
    ///
    /// Fails when the buffer length does not match `width * height * channels`.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        channels: u8,
        sequence: u64,
    ) -> anyhow::Result<Self> {
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(anyhow::anyhow!(
                "frame buffer holds {} bytes, {}x{}x{} needs {}",
                data.len(),
                width,
                height,
                channels,
                expected
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            channels,
            sequence,
        })
    }

    /// The invalid frame sources return at end-of-stream.
    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            width: 0,
            height: 0,
            channels: 0,
            sequence: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty() || self.width == 0 || self.height == 0
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.data
    }
}

// ----------------------------------------------------------------------------
// Datum
// ----------------------------------------------------------------------------

/// One camera's contribution to a bundle.
#[derive(Debug)]
pub struct Datum {
    pub camera: CameraId,
    /// Position of the camera in the configured list (0-based).
    pub sub_index: usize,
    /// Camera count minus one.
    pub sub_index_max: usize,
    pub frame: Frame,
    /// Present exactly when 3-D mode is on.
    pub calibration: Option<Arc<CameraCalibration>>,
    output: Option<Frame>,
}

impl Datum {
    pub fn new(camera: CameraId, sub_index: usize, sub_index_max: usize, frame: Frame) -> Self {
        debug_assert!(sub_index <= sub_index_max);
        Self {
            camera,
            sub_index,
            sub_index_max,
            frame,
            calibration: None,
            output: None,
        }
    }

    pub fn with_calibration(mut self, calibration: Arc<CameraCalibration>) -> Self {
        self.calibration = Some(calibration);
        self
    }

    /// The frame the engine renders onto. Starts out as the input frame.
    pub fn output_frame(&self) -> &Frame {
        self.output.as_ref().unwrap_or(&self.frame)
    }

    /// Replaces the output frame (e.g. with a rendered overlay).
    pub fn set_output_frame(&mut self, frame: Frame) {
        self.output = Some(frame);
    }
}

// ----------------------------------------------------------------------------
// FrameBundle
// ----------------------------------------------------------------------------

/// Datums acquired in the same round, ordered by camera position.
#[derive(Debug)]
pub struct FrameBundle {
    sequence: u64,
    datums: Vec<Datum>,
}

impl FrameBundle {
    pub fn new(sequence: u64, datums: Vec<Datum>) -> Self {
        Self { sequence, datums }
    }

    /// Delivery order assigned by the bundler, starting at 1.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn datums(&self) -> &[Datum] {
        &self.datums
    }

    pub fn datums_mut(&mut self) -> &mut [Datum] {
        &mut self.datums
    }

    pub fn into_datums(self) -> Vec<Datum> {
        self.datums
    }

    pub fn len(&self) -> usize {
        self.datums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datums.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Datum> {
        self.datums.iter()
    }

    /// Total pixel bytes carried by the bundle.
    pub fn memory_bytes(&self) -> usize {
        self.datums.iter().map(|d| d.frame.byte_len()).sum()
    }
}

// ----------------------------------------------------------------------------
// HoldingQueue
// ----------------------------------------------------------------------------

/// FIFO of bundles awaiting delivery.
///
/// A round is pushed as a whole or not at all; a failed round never leaves a
/// partial set of bundles behind.
#[derive(Debug, Default)]
pub struct HoldingQueue {
    bundles: VecDeque<FrameBundle>,
}

impl HoldingQueue {
    pub fn new() -> Self {
        Self {
            bundles: VecDeque::new(),
        }
    }

    /// Appends every bundle of a completed round, preserving order.
    pub fn push_round(&mut self, round: Vec<FrameBundle>) {
        self.bundles.extend(round);
    }

    pub fn pop_front(&mut self) -> Option<FrameBundle> {
        self.bundles.pop_front()
    }

    pub fn clear(&mut self) {
        self.bundles.clear();
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
