//! sync_input - drive a multi-camera rig through the frame bundler
//!
//! Opens every configured camera, registers the bundler as the engine's input
//! stage and runs until a camera runs dry, acquisition fails, or Ctrl-C.
//!
//! Configuration comes from `MULTIVIEW_CONFIG` / `MULTIVIEW_*` and is then
//! overridden by the flags below.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use multiview_input::config::{EngineFlags, InputConfig};
use multiview_input::ui::{format_duration, Ui};
use multiview_input::{logging, BundleMode, CameraId, FrameBundler, Pipeline, StubEngine};

#[derive(Parser, Debug)]
#[command(
    name = "sync_input",
    version,
    about = "Synchronized multi-camera input for a pose engine"
)]
struct Args {
    /// Camera ids in bundle order (e.g. 0,2,4,6)
    #[arg(long, value_delimiter = ',', value_name = "IDS")]
    cameras: Option<Vec<u32>>,

    /// Source uri per camera, aligned with the camera ids (stub://, dir://, /dev/videoN)
    #[arg(long, value_delimiter = ',', value_name = "URIS")]
    camera_uris: Option<Vec<String>>,

    /// Attach calibration to every frame and reconstruct in 3-D
    #[arg(long = "3d")]
    use_3d: bool,

    /// Directory with one calibration file per camera
    #[arg(long, value_name = "PATH")]
    calibration_dir: Option<PathBuf>,

    /// per-round or per-camera
    #[arg(long, value_name = "MODE")]
    bundle_mode: Option<String>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,

    #[command(flatten)]
    engine: EngineFlags,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let logging_level = args.engine.checked_logging_level()?;
    logging::init(logging_level)?;

    log::info!("Starting multi-view input...");
    let timer = Instant::now();
    let ui = Ui::from_flag(Some(&args.ui));

    let (config, engine_config, bundler) = {
        let _stage = ui.stage("Configure input");
        let config = load_config(&args)?;
        let engine_config = args
            .engine
            .to_engine_config(config.use_3d, config.cameras.len())?;
        let bundler = Arc::new(FrameBundler::new(
            config.cameras.clone(),
            config.bundler_options(),
        )?);
        (config, engine_config, bundler)
    };

    let stop = bundler.stop_handle();
    ctrlc::set_handler(move || {
        if stop.request_stop() {
            log::error!("second interrupt, exiting");
            std::process::exit(130);
        }
        log::warn!("interrupt received, stopping input (press Ctrl-C again to exit)");
    })
    .context("error setting Ctrl-C handler")?;

    let mut pipeline = Pipeline::new();
    pipeline.set_input(bundler.clone(), true);
    pipeline.configure(engine_config);
    if args.engine.disable_multi_thread {
        pipeline.disable_multi_thread();
    }

    let mut engine = StubEngine::new().with_views(config.cameras.len());
    let summary = {
        let _stage = ui.stage("Run pipeline");
        pipeline.exec(&mut engine)?
    };

    for (camera, stats) in config.cameras.iter().zip(bundler.source_stats()) {
        log::info!(
            "{}: {} frames from {}",
            camera.id,
            stats.frames_captured,
            stats.device
        );
    }
    println!(
        "{} bundles ({} frames) delivered, input {}",
        summary.bundles, summary.datums, summary.stop_reason
    );
    println!(
        "Multi-view input finished. Total time: {}",
        format_duration(timer.elapsed())
    );

    if !summary.is_clean() {
        return Err(anyhow!("input stopped: {}", summary.stop_reason));
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<InputConfig> {
    let mut config = InputConfig::load()?;
    if let Some(ids) = &args.cameras {
        config.set_camera_ids(ids.iter().map(|&id| CameraId(id)).collect());
    }
    if let Some(uris) = &args.camera_uris {
        config.set_camera_uris(uris.clone())?;
    }
    if args.use_3d {
        config.use_3d = true;
    }
    if let Some(dir) = &args.calibration_dir {
        config.calibration_dir = dir.clone();
    }
    if let Some(mode) = &args.bundle_mode {
        config.bundle_mode = mode.parse::<BundleMode>()?;
    }
    config.validate()?;
    Ok(config)
}
