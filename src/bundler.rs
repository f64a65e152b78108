//! Round-robin frame bundler.
//!
//! `FrameBundler` owns one `CameraSource` per configured camera and a holding
//! queue of bundles. Each `pull()`:
//!
//! 1. Locks the bundler state (sources + queue + stop state) for the whole call
//! 2. Returns `EndOfStream` right away once stopped, without touching any source
//! 3. When the queue is empty, reads one frame from every source in camera order
//!    and enqueues the round; an empty frame or an acquisition error stops the
//!    bundler and the partial round is dropped
//! 4. Hands out the front bundle
//!
//! Stopped is terminal. Errors never cross `pull()`: they are logged with their
//! source location and surface as the `StopReason` of `EndOfStream`.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::calibration::{CalibrationSet, CalibrationStore};
use crate::frame::{Datum, FrameBundle, HoldingQueue};
use crate::ingest::{open_camera, CameraSource, CameraSpec, SourceStats};
use crate::{validate_camera_ids, BundlerError, CameraId};

macro_rules! error_at {
    ($($arg:tt)*) => {
        log::error!(
            "{} [{}:{} {}]",
            format_args!($($arg)*),
            file!(),
            line!(),
            module_path!()
        )
    };
}

// ----------------------------------------------------------------------------
// Options
// ----------------------------------------------------------------------------

/// How one acquisition round is split into bundles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundleMode {
    /// One bundle per round holding every camera's datum.
    #[default]
    PerRound,
    /// One single-datum bundle per camera, in camera order.
    PerCamera,
}

impl FromStr for BundleMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "per-round" | "round" => Ok(BundleMode::PerRound),
            "per-camera" | "camera" => Ok(BundleMode::PerCamera),
            other => Err(anyhow!(
                "unknown bundle mode '{}' (expected per-round or per-camera)",
                other
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BundlerOptions {
    /// Attach calibration to every datum.
    pub use_3d: bool,
    /// Read only when `use_3d` is set.
    pub calibration_dir: PathBuf,
    pub mode: BundleMode,
}

impl Default for BundlerOptions {
    fn default() -> Self {
        Self {
            use_3d: false,
            calibration_dir: PathBuf::from(crate::config::DEFAULT_CALIBRATION_DIR),
            mode: BundleMode::PerRound,
        }
    }
}

// ----------------------------------------------------------------------------
// Pull results
// ----------------------------------------------------------------------------

/// Why the bundler stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// A camera ran out of frames. Normal end of the stream.
    Exhausted(BundlerError),
    /// Acquisition failed.
    Failed(BundlerError),
    /// `StopHandle::request_stop` was called.
    Requested,
    /// A source panicked while the bundler was locked.
    Panicked,
}

impl StopReason {
    /// True for anything other than a clean end of stream or a requested stop.
    pub fn is_failure(&self) -> bool {
        matches!(self, StopReason::Failed(_) | StopReason::Panicked)
    }

    pub fn error(&self) -> Option<&BundlerError> {
        match self {
            StopReason::Exhausted(err) | StopReason::Failed(err) => Some(err),
            StopReason::Requested | StopReason::Panicked => None,
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Exhausted(err) => write!(f, "end of stream ({})", err),
            StopReason::Failed(err) => write!(f, "failed ({})", err),
            StopReason::Requested => write!(f, "stop requested"),
            StopReason::Panicked => write!(f, "camera source panicked"),
        }
    }
}

/// Result of one `pull()`.
#[derive(Debug)]
pub enum Pull {
    Bundle(FrameBundle),
    EndOfStream(StopReason),
}

impl Pull {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Pull::EndOfStream(_))
    }

    pub fn into_bundle(self) -> Option<FrameBundle> {
        match self {
            Pull::Bundle(bundle) => Some(bundle),
            Pull::EndOfStream(_) => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Stop handle
// ----------------------------------------------------------------------------

/// Requests a deliberate stop from any thread (e.g. a Ctrl-C handler).
///
/// The bundler observes the request on its next `pull()`.
#[derive(Clone, Debug, Default)]
pub struct StopHandle {
    requested: Arc<AtomicBool>,
}

impl StopHandle {
    /// Flags the stop. Returns true when a stop had already been requested.
    pub fn request_stop(&self) -> bool {
        self.requested.swap(true, Ordering::SeqCst)
    }

    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

// ----------------------------------------------------------------------------
// Stats
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BundlerState {
    Running,
    Stopped,
}

#[derive(Clone, Debug)]
pub struct BundlerStats {
    pub state: BundlerState,
    /// Completed acquisition rounds.
    pub rounds: u64,
    pub bundles_delivered: u64,
    pub queued: usize,
}

// ----------------------------------------------------------------------------
// FrameBundler
// ----------------------------------------------------------------------------

struct BundlerInner {
    sources: Vec<Box<dyn CameraSource>>,
    queue: HoldingQueue,
    stopped: Option<StopReason>,
    rounds: u64,
    next_sequence: u64,
    delivered: u64,
}

/// Synchronized multi-camera frame producer.
pub struct FrameBundler {
    cameras: Vec<CameraId>,
    calibration: Option<CalibrationSet>,
    mode: BundleMode,
    stop: StopHandle,
    inner: Mutex<BundlerInner>,
}

impl FrameBundler {
    /// Opens every camera in `cameras`, in order.
    ///
    /// With `use_3d`, calibration is loaded and checked against the camera count
    /// before any device is opened; failures surface as `BundlerError::CalibrationLoad`.
    pub fn new(cameras: Vec<CameraSpec>, options: BundlerOptions) -> Result<Self> {
        let ids: Vec<CameraId> = cameras.iter().map(|spec| spec.id).collect();
        validate_camera_ids(&ids)?;

        let calibration = if options.use_3d {
            let set = CalibrationStore::read_parameters(&options.calibration_dir)?;
            set.ensure_camera_count(ids.len())?;
            Some(set)
        } else {
            None
        };

        let sources = cameras
            .iter()
            .map(|spec| {
                open_camera(spec).with_context(|| format!("failed to open {}", spec.id))
            })
            .collect::<Result<Vec<_>>>()?;

        Self::with_sources(ids, sources, calibration, options.mode)
    }

    /// Builds a bundler over already-connected sources.
    ///
    /// `sources[i]` belongs to `cameras[i]`.
    pub fn with_sources(
        cameras: Vec<CameraId>,
        sources: Vec<Box<dyn CameraSource>>,
        calibration: Option<CalibrationSet>,
        mode: BundleMode,
    ) -> Result<Self> {
        validate_camera_ids(&cameras)?;
        if sources.len() != cameras.len() {
            return Err(anyhow!(
                "{} sources supplied for {} cameras",
                sources.len(),
                cameras.len()
            ));
        }
        if let Some(set) = &calibration {
            set.ensure_camera_count(cameras.len())?;
        }

        log::info!(
            "FrameBundler: {} cameras [{}], 3d={}, mode={:?}",
            cameras.len(),
            cameras
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            calibration.is_some(),
            mode
        );

        Ok(Self {
            cameras,
            calibration,
            mode,
            stop: StopHandle::default(),
            inner: Mutex::new(BundlerInner {
                sources,
                queue: HoldingQueue::new(),
                stopped: None,
                rounds: 0,
                next_sequence: 1,
                delivered: 0,
            }),
        })
    }

    /// Hand out the next bundle, refilling from every camera when the queue is empty.
    pub fn pull(&self) -> Pull {
        let mut inner = self.lock();

        if let Some(reason) = &inner.stopped {
            return Pull::EndOfStream(reason.clone());
        }

        if self.stop.is_stop_requested() {
            log::info!("FrameBundler: stop requested");
            return Pull::EndOfStream(Self::halt(&mut inner, StopReason::Requested));
        }

        if inner.queue.is_empty() {
            if let Err(reason) = self.refill(&mut inner) {
                return Pull::EndOfStream(Self::halt(&mut inner, reason));
            }
        }

        match inner.queue.pop_front() {
            Some(bundle) => {
                inner.delivered += 1;
                Pull::Bundle(bundle)
            }
            None => {
                error_at!("FrameBundler: refill produced no bundle");
                Pull::EndOfStream(Self::halt(&mut inner, StopReason::Panicked))
            }
        }
    }

    /// Read one frame from every source and enqueue the round.
    fn refill(&self, inner: &mut BundlerInner) -> std::result::Result<(), StopReason> {
        let sub_index_max = self.cameras.len() - 1;
        let mut datums = Vec::with_capacity(self.cameras.len());

        for (position, (camera, source)) in self
            .cameras
            .iter()
            .zip(inner.sources.iter_mut())
            .enumerate()
        {
            if !source.is_healthy() {
                log::warn!("FrameBundler: {} ({}) reports unhealthy", camera, source.describe());
            }
            let frame = match source.get_frame() {
                Ok(frame) => frame,
                Err(err) => {
                    error_at!("FrameBundler: {} capture failed: {:#}", camera, err);
                    return Err(StopReason::Failed(BundlerError::TransientAcquisition {
                        camera: *camera,
                        message: format!("{:#}", err),
                    }));
                }
            };
            if frame.is_empty() {
                log::info!("FrameBundler: {} returned an empty frame, stopping", camera);
                return Err(StopReason::Exhausted(BundlerError::DeviceExhausted {
                    camera: *camera,
                }));
            }

            let mut datum = Datum::new(*camera, position, sub_index_max, frame);
            let calibration = self
                .calibration
                .as_ref()
                .and_then(|set| set.for_position(position));
            if let Some(calibration) = calibration {
                datum = datum.with_calibration(Arc::clone(calibration));
            }
            datums.push(datum);
        }

        let round = match self.mode {
            BundleMode::PerRound => {
                let sequence = inner.next_sequence;
                inner.next_sequence += 1;
                vec![FrameBundle::new(sequence, datums)]
            }
            BundleMode::PerCamera => datums
                .into_iter()
                .map(|datum| {
                    let sequence = inner.next_sequence;
                    inner.next_sequence += 1;
                    FrameBundle::new(sequence, vec![datum])
                })
                .collect(),
        };
        inner.queue.push_round(round);
        inner.rounds += 1;
        log::debug!("FrameBundler: round {} queued", inner.rounds);
        Ok(())
    }

    fn halt(inner: &mut BundlerInner, reason: StopReason) -> StopReason {
        inner.queue.clear();
        inner.stopped = Some(reason.clone());
        reason
    }

    fn lock(&self) -> MutexGuard<'_, BundlerInner> {
        self.inner.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
            let mut inner = poisoned.into_inner();
            if inner.stopped.is_none() {
                error_at!("FrameBundler: state lock poisoned by a panicking source");
                Self::halt(&mut inner, StopReason::Panicked);
            }
            inner
        })
    }

    /// Handle for requesting a stop from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Equivalent to `stop_handle().request_stop()`.
    pub fn stop(&self) {
        self.stop.request_stop();
    }

    pub fn is_running(&self) -> bool {
        !self.stop.is_stop_requested() && self.lock().stopped.is_none()
    }

    /// Reason recorded when the bundler stopped.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.lock().stopped.clone()
    }

    pub fn cameras(&self) -> &[CameraId] {
        &self.cameras
    }

    pub fn camera_count(&self) -> usize {
        self.cameras.len()
    }

    pub fn mode(&self) -> BundleMode {
        self.mode
    }

    pub fn calibration(&self) -> Option<&CalibrationSet> {
        self.calibration.as_ref()
    }

    pub fn stats(&self) -> BundlerStats {
        let inner = self.lock();
        BundlerStats {
            state: if inner.stopped.is_some() {
                BundlerState::Stopped
            } else {
                BundlerState::Running
            },
            rounds: inner.rounds,
            bundles_delivered: inner.delivered,
            queued: inner.queue.len(),
        }
    }

    /// Per-source statistics, in camera order.
    pub fn source_stats(&self) -> Vec<SourceStats> {
        self.lock().sources.iter().map(|s| s.stats()).collect()
    }
}

impl crate::pipeline::BundleProducer for FrameBundler {
    fn name(&self) -> &str {
        "frame_bundler"
    }

    fn produce(&self) -> Pull {
        self.pull()
    }

    fn stop(&self) {
        FrameBundler::stop(self);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{CameraCalibration, Mat3, Mat3x4};
    use crate::frame::Frame;
    use crate::ingest::{StubConfig, StubSource};
    use std::sync::atomic::AtomicUsize;

    enum Step {
        Frame,
        Empty,
        Fail,
        Panic,
    }

    /// Source that plays a fixed script, then valid frames forever.
    struct ScriptedSource {
        script: Vec<Step>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn boxed(script: Vec<Step>) -> (Box<dyn CameraSource>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let source = ScriptedSource {
                script,
                calls: Arc::clone(&calls),
            };
            (Box::new(source), calls)
        }
    }

    impl CameraSource for ScriptedSource {
        fn get_frame(&mut self) -> Result<Frame> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script.get(n).unwrap_or(&Step::Frame) {
                Step::Frame => Frame::new(vec![n as u8; 12], 2, 2, 3, n as u64 + 1),
                Step::Empty => Ok(Frame::empty()),
                Step::Fail => Err(anyhow!("usb bus reset")),
                Step::Panic => panic!("driver crashed"),
            }
        }

        fn stats(&self) -> SourceStats {
            SourceStats {
                frames_captured: self.calls.load(Ordering::SeqCst) as u64,
                device: "scripted".to_string(),
            }
        }
    }

    fn stub(width: u32) -> Box<dyn CameraSource> {
        Box::new(StubSource::new(StubConfig {
            width,
            height: 2,
            ..StubConfig::default()
        }))
    }

    fn ids(values: &[u32]) -> Vec<CameraId> {
        values.iter().copied().map(CameraId).collect()
    }

    fn calibration_for(n: usize) -> CalibrationSet {
        let cameras = (0..n)
            .map(|i| {
                CameraCalibration::new(
                    &format!("serial{}", i),
                    Mat3::identity(),
                    vec![],
                    Mat3x4([1.0, 0.0, 0.0, i as f64, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
                )
            })
            .collect();
        CalibrationSet::from_cameras("mem", cameras)
    }

    #[test]
    fn bundle_mode_parses() -> Result<()> {
        assert_eq!("per-camera".parse::<BundleMode>()?, BundleMode::PerCamera);
        assert_eq!("Per-Round".parse::<BundleMode>()?, BundleMode::PerRound);
        assert!("both".parse::<BundleMode>().is_err());
        Ok(())
    }

    #[test]
    fn per_round_bundles_hold_every_camera_in_order() -> Result<()> {
        let bundler = FrameBundler::with_sources(
            ids(&[0, 2, 4, 6]),
            vec![stub(2), stub(4), stub(6), stub(8)],
            None,
            BundleMode::PerRound,
        )?;

        for expected_seq in 1..=5u64 {
            let bundle = bundler.pull().into_bundle().expect("bundle");
            assert_eq!(bundle.sequence(), expected_seq);
            assert_eq!(bundle.len(), 4);
            for (i, datum) in bundle.iter().enumerate() {
                assert_eq!(datum.sub_index, i);
                assert_eq!(datum.sub_index_max, 3);
                assert_eq!(datum.camera, CameraId(2 * i as u32));
                assert_eq!(datum.frame.width, 2 * (i as u32 + 1));
                assert!(datum.calibration.is_none());
            }
        }
        assert_eq!(bundler.stats().rounds, 5);
        Ok(())
    }

    #[test]
    fn per_camera_mode_queues_one_bundle_per_camera() -> Result<()> {
        let bundler = FrameBundler::with_sources(
            ids(&[0, 2, 4]),
            vec![stub(2), stub(2), stub(2)],
            None,
            BundleMode::PerCamera,
        )?;

        let first = bundler.pull().into_bundle().expect("bundle");
        assert_eq!(first.len(), 1);
        assert_eq!(first.datums()[0].sub_index, 0);
        assert_eq!(bundler.stats().queued, 2);

        let rest: Vec<usize> = (0..2)
            .map(|_| bundler.pull().into_bundle().expect("bundle").datums()[0].sub_index)
            .collect();
        assert_eq!(rest, vec![1, 2]);
        assert_eq!(bundler.stats().rounds, 1);
        Ok(())
    }

    #[test]
    fn failing_camera_discards_partial_round() -> Result<()> {
        let (cam0, calls0) = ScriptedSource::boxed(vec![Step::Frame, Step::Frame]);
        let (cam1, calls1) = ScriptedSource::boxed(vec![Step::Frame, Step::Empty]);
        let bundler = FrameBundler::with_sources(
            ids(&[0, 1]),
            vec![cam0, cam1],
            None,
            BundleMode::PerCamera,
        )?;

        assert!(bundler.pull().into_bundle().is_some());
        assert!(bundler.pull().into_bundle().is_some());
        // Second round: cam0 succeeds, cam1 is exhausted; cam0's datum must not leak out.
        match bundler.pull() {
            Pull::EndOfStream(StopReason::Exhausted(BundlerError::DeviceExhausted { camera })) => {
                assert_eq!(camera, CameraId(1))
            }
            other => panic!("unexpected pull: {:?}", other),
        }
        assert!(bundler.pull().is_end_of_stream());
        assert_eq!(bundler.stats().queued, 0);
        assert_eq!(calls0.load(Ordering::SeqCst), 2);
        assert_eq!(calls1.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[test]
    fn acquisition_error_stops_without_retry() -> Result<()> {
        let (cam0, calls0) = ScriptedSource::boxed(vec![Step::Fail]);
        let (cam1, calls1) = ScriptedSource::boxed(vec![]);
        let bundler =
            FrameBundler::with_sources(ids(&[3, 5]), vec![cam0, cam1], None, BundleMode::PerRound)?;

        let reason = match bundler.pull() {
            Pull::EndOfStream(reason) => reason,
            Pull::Bundle(_) => panic!("expected end of stream"),
        };
        assert!(reason.is_failure());
        assert_eq!(reason.error().map(|e| e.code()), Some("TRANSIENT_ACQUISITION"));
        assert!(reason.to_string().contains("usb bus reset"));

        for _ in 0..3 {
            match bundler.pull() {
                Pull::EndOfStream(again) => assert_eq!(again, reason),
                Pull::Bundle(_) => panic!("bundler restarted after failure"),
            }
        }
        assert_eq!(calls0.load(Ordering::SeqCst), 1);
        assert_eq!(calls1.load(Ordering::SeqCst), 0);
        assert!(!bundler.is_running());
        assert_eq!(bundler.stats().state, BundlerState::Stopped);
        Ok(())
    }

    #[test]
    fn calibration_follows_camera_position() -> Result<()> {
        let bundler = FrameBundler::with_sources(
            ids(&[6, 4]),
            vec![stub(2), stub(2)],
            Some(calibration_for(2)),
            BundleMode::PerRound,
        )?;
        let bundle = bundler.pull().into_bundle().expect("bundle");
        for datum in bundle.iter() {
            let cal = datum.calibration.as_ref().expect("calibration");
            assert_eq!(cal.serial, format!("serial{}", datum.sub_index));
            assert_eq!(cal.extrinsics.translation()[0], datum.sub_index as f64);
        }
        Ok(())
    }

    #[test]
    fn calibration_count_must_match_cameras() {
        let result = FrameBundler::with_sources(
            ids(&[0, 1]),
            vec![stub(2), stub(2)],
            Some(calibration_for(3)),
            BundleMode::PerRound,
        );
        let err = result.err().expect("count mismatch");
        assert_eq!(
            err.downcast_ref::<BundlerError>().map(|e| e.code()),
            Some("CALIBRATION_LOAD")
        );
    }

    #[test]
    fn rejects_bad_camera_lists() {
        assert!(FrameBundler::with_sources(vec![], vec![], None, BundleMode::PerRound).is_err());
        let mode = BundleMode::PerRound;
        let duplicated = vec![stub(2), stub(2)];
        assert!(FrameBundler::with_sources(ids(&[1, 1]), duplicated, None, mode).is_err());
        assert!(FrameBundler::with_sources(ids(&[1, 2]), vec![stub(2)], None, mode).is_err());
    }

    #[test]
    fn stop_handle_ends_stream_and_drops_queue() -> Result<()> {
        let (cam0, calls0) = ScriptedSource::boxed(vec![]);
        let (cam1, _) = ScriptedSource::boxed(vec![]);
        let bundler = FrameBundler::with_sources(
            ids(&[0, 1]),
            vec![cam0, cam1],
            None,
            BundleMode::PerCamera,
        )?;

        assert!(bundler.pull().into_bundle().is_some());
        assert!(!bundler.stop_handle().request_stop());
        assert!(!bundler.is_running());
        assert!(bundler.stop_handle().request_stop());

        match bundler.pull() {
            Pull::EndOfStream(StopReason::Requested) => {}
            other => panic!("unexpected pull: {:?}", other),
        }
        assert_eq!(bundler.stats().queued, 0);
        assert_eq!(bundler.stop_reason(), Some(StopReason::Requested));
        assert_eq!(calls0.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn panicking_source_poisons_into_stopped() -> Result<()> {
        let (cam0, _) = ScriptedSource::boxed(vec![Step::Panic]);
        let bundler = Arc::new(FrameBundler::with_sources(
            ids(&[0]),
            vec![cam0],
            None,
            BundleMode::PerRound,
        )?);

        let worker = Arc::clone(&bundler);
        let joined = std::thread::spawn(move || {
            let _ = worker.pull();
        })
        .join();
        assert!(joined.is_err());

        match bundler.pull() {
            Pull::EndOfStream(StopReason::Panicked) => {}
            other => panic!("unexpected pull: {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn bundler_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FrameBundler>();
    }
}
