use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;

use multiview_input::{
    BundleMode, BundlerError, BundlerOptions, CalibrationStore, CameraCalibration, CameraId,
    CameraSource, CameraSpec, Frame, FrameBundler, Mat3, Mat3x4, Pull, SourceStats, StopReason,
    StubConfig, StubSource,
};

fn stub_rig(uris: &[&str]) -> Vec<CameraSpec> {
    uris.iter()
        .enumerate()
        .map(|(i, uri)| CameraSpec::new(CameraId(2 * i as u32), *uri))
        .collect()
}

fn options(mode: BundleMode) -> BundlerOptions {
    BundlerOptions {
        mode,
        ..BundlerOptions::default()
    }
}

/// Endless source that ends once `end_at` captures have been made.
struct CountedSource {
    calls: Arc<AtomicUsize>,
    end_at: Option<usize>,
}

impl CameraSource for CountedSource {
    fn get_frame(&mut self) -> Result<Frame> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.end_at.is_some_and(|end| n >= end) {
            return Ok(Frame::empty());
        }
        Frame::new(vec![7; 2 * 2 * 3], 2, 2, 3, n as u64)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.calls.load(Ordering::SeqCst) as u64,
            device: "counted".to_string(),
        }
    }
}

#[test]
fn two_cameras_three_frames_then_end_of_stream() -> Result<()> {
    let bundler = FrameBundler::new(
        stub_rig(&["stub://left?frames=3&width=8&height=6", "stub://right?width=8&height=6"]),
        options(BundleMode::PerRound),
    )?;

    for _ in 0..3 {
        let bundle = bundler.pull().into_bundle().expect("bundle");
        assert_eq!(bundle.len(), 2);
        assert!(bundle.iter().all(|d| d.calibration.is_none()));
    }
    match bundler.pull() {
        Pull::EndOfStream(StopReason::Exhausted(BundlerError::DeviceExhausted { camera })) => {
            assert_eq!(camera, CameraId(0));
        }
        other => panic!("expected end of stream, got {:?}", other),
    }
    assert!(bundler.pull().is_end_of_stream());
    assert_eq!(bundler.stats().bundles_delivered, 3);
    Ok(())
}

#[test]
fn endless_cameras_keep_producing_complete_bundles() -> Result<()> {
    let bundler = FrameBundler::new(
        stub_rig(&[
            "stub://a?width=4&height=2",
            "stub://b?width=4&height=2",
            "stub://c?width=4&height=2",
        ]),
        options(BundleMode::PerRound),
    )?;
    for _ in 0..300 {
        let bundle = bundler.pull().into_bundle().expect("bundle");
        let sub_indices: Vec<usize> = bundle.iter().map(|d| d.sub_index).collect();
        assert_eq!(sub_indices, vec![0, 1, 2]);
        assert!(bundle.iter().all(|d| d.sub_index_max == 2));
    }
    assert!(bundler.is_running());
    Ok(())
}

#[test]
fn missing_calibration_fails_before_any_camera_opens() {
    let dir = tempfile::tempdir().expect("tempdir");
    let result = FrameBundler::new(
        vec![CameraSpec::new(CameraId(0), "rtsp://never-opened")],
        BundlerOptions {
            use_3d: true,
            calibration_dir: dir.path().join("missing"),
            mode: BundleMode::PerRound,
        },
    );
    let err = result.err().expect("calibration error");
    match err.downcast_ref::<BundlerError>() {
        Some(BundlerError::CalibrationLoad { path, .. }) => {
            assert_eq!(path, &dir.path().join("missing"))
        }
        other => panic!("expected CalibrationLoad, got {:?}", other),
    }
}

#[test]
fn calibration_is_attached_by_camera_position() -> Result<()> {
    let dir = tempfile::tempdir()?;
    for (serial, tx) in [("17012332", 0.0), ("17012335", -0.5)] {
        let extrinsics = Mat3x4([1.0, 0.0, 0.0, tx, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        let intrinsics = Mat3([800.0, 0.0, 320.0, 0.0, 800.0, 240.0, 0.0, 0.0, 1.0]);
        CalibrationStore::write_camera(
            dir.path(),
            &CameraCalibration::new(serial, intrinsics, vec![0.0; 5], extrinsics),
        )?;
    }

    let bundler = FrameBundler::new(
        stub_rig(&["stub://a?width=4&height=2", "stub://b?width=4&height=2"]),
        BundlerOptions {
            use_3d: true,
            calibration_dir: PathBuf::from(dir.path()),
            mode: BundleMode::PerCamera,
        },
    )?;

    let first = bundler.pull().into_bundle().expect("bundle");
    let second = bundler.pull().into_bundle().expect("bundle");
    let first_cal = first.datums()[0].calibration.as_ref().expect("calibration");
    let second_cal = second.datums()[0].calibration.as_ref().expect("calibration");
    assert_eq!(first_cal.serial, "17012332");
    assert_eq!(second_cal.serial, "17012335");
    assert!((second_cal.camera_matrix.at(0, 3) - (-400.0)).abs() < 1e-9);
    Ok(())
}

#[test]
fn calibration_count_mismatch_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    CalibrationStore::write_camera(
        dir.path(),
        &CameraCalibration::new("solo", Mat3::identity(), vec![], Mat3x4::identity()),
    )?;
    let err = FrameBundler::new(
        stub_rig(&["stub://a", "stub://b"]),
        BundlerOptions {
            use_3d: true,
            calibration_dir: dir.path().to_path_buf(),
            mode: BundleMode::PerRound,
        },
    )
    .err()
    .expect("count mismatch");
    assert!(matches!(
        err.downcast_ref::<BundlerError>(),
        Some(BundlerError::CalibrationLoad { .. })
    ));
    Ok(())
}

#[test]
fn concurrent_pulls_deliver_each_bundle_once() -> Result<()> {
    for (mode, expected) in [(BundleMode::PerRound, 120), (BundleMode::PerCamera, 480)] {
        let bundler = Arc::new(FrameBundler::new(
            stub_rig(&[
                "stub://a?frames=120&width=4&height=2",
                "stub://b?width=4&height=2",
                "stub://c?width=4&height=2",
                "stub://d?width=4&height=2",
            ]),
            options(mode),
        )?);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let bundler = Arc::clone(&bundler);
                let seen = Arc::clone(&seen);
                std::thread::spawn(move || loop {
                    match bundler.pull() {
                        Pull::Bundle(bundle) => {
                            if mode == BundleMode::PerRound {
                                let subs: Vec<usize> = bundle.iter().map(|d| d.sub_index).collect();
                                assert_eq!(subs, vec![0, 1, 2, 3]);
                            } else {
                                assert_eq!(bundle.len(), 1);
                            }
                            seen.lock().unwrap().push(bundle.sequence());
                        }
                        Pull::EndOfStream(_) => break,
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker panicked");
        }

        let seen = seen.lock().unwrap();
        let unique: HashSet<u64> = seen.iter().copied().collect();
        assert_eq!(seen.len(), expected);
        assert_eq!(unique.len(), expected);
    }
    Ok(())
}

#[test]
fn no_source_is_called_after_stop() -> Result<()> {
    let calls: Vec<Arc<AtomicUsize>> = (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    let sources: Vec<Box<dyn CameraSource>> = calls
        .iter()
        .enumerate()
        .map(|(i, calls)| {
            Box::new(CountedSource {
                calls: Arc::clone(calls),
                end_at: (i == 1).then_some(5),
            }) as Box<dyn CameraSource>
        })
        .collect();
    let bundler = Arc::new(FrameBundler::with_sources(
        vec![CameraId(0), CameraId(1), CameraId(2)],
        sources,
        None,
        BundleMode::PerRound,
    )?);

    let mut delivered = 0;
    while bundler.pull().into_bundle().is_some() {
        delivered += 1;
    }
    assert_eq!(delivered, 4);
    let snapshot: Vec<usize> = calls.iter().map(|c| c.load(Ordering::SeqCst)).collect();
    assert_eq!(snapshot, vec![5, 5, 4]);

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let bundler = Arc::clone(&bundler);
            std::thread::spawn(move || (0..50).all(|_| bundler.pull().is_end_of_stream()))
        })
        .collect();
    for worker in workers {
        assert!(worker.join().expect("worker panicked"));
    }
    let after: Vec<usize> = calls.iter().map(|c| c.load(Ordering::SeqCst)).collect();
    assert_eq!(after, snapshot);
    Ok(())
}

#[test]
fn stop_handle_ends_the_stream() -> Result<()> {
    let bundler = FrameBundler::new(
        stub_rig(&["stub://a?width=2&height=2"]),
        options(BundleMode::PerRound),
    )?;
    assert!(bundler.pull().into_bundle().is_some());

    let handle = bundler.stop_handle();
    std::thread::spawn(move || handle.request_stop())
        .join()
        .expect("stop thread");

    assert!(matches!(bundler.pull(), Pull::EndOfStream(StopReason::Requested)));
    assert!(!bundler.is_running());
    Ok(())
}

#[test]
fn acquisition_errors_end_the_stream_as_failures() -> Result<()> {
    let bundler = FrameBundler::new(
        stub_rig(&["stub://a?width=2&height=2", "stub://b?width=2&height=2&fail_at=2"]),
        options(BundleMode::PerRound),
    )?;
    assert!(bundler.pull().into_bundle().is_some());
    match bundler.pull() {
        Pull::EndOfStream(reason) => {
            assert!(reason.is_failure());
            assert!(matches!(
                reason.error(),
                Some(BundlerError::TransientAcquisition { camera, .. }) if *camera == CameraId(2)
            ));
        }
        Pull::Bundle(_) => panic!("expected failure"),
    }
    Ok(())
}

#[test]
fn oversized_stub_frames_fail_without_panicking() -> Result<()> {
    let huge: Box<dyn CameraSource> = Box::new(StubSource::new(StubConfig {
        width: u32::MAX,
        height: u32::MAX,
        ..StubConfig::default()
    }));
    let bundler = FrameBundler::with_sources(
        vec![CameraId(0)],
        vec![huge],
        None,
        BundleMode::PerRound,
    )?;
    match bundler.pull() {
        Pull::EndOfStream(reason) => {
            assert_ne!(reason, StopReason::Panicked);
            assert!(matches!(
                reason,
                StopReason::Failed(BundlerError::TransientAcquisition { .. })
            ));
        }
        Pull::Bundle(_) => panic!("expected failure"),
    }
    Ok(())
}
