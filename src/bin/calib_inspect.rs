//! calib_inspect - summarize a camera calibration directory
//!
//! Prints every camera's serial, intrinsics, translation and distortion in
//! camera-position order, and optionally checks the count against a rig size.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use multiview_input::calibration::{CalibrationStore, CameraCalibration, Mat3, Mat3x4};
use multiview_input::config::DEFAULT_CALIBRATION_DIR;
use multiview_input::ui::Ui;

#[derive(Parser, Debug)]
#[command(name = "calib_inspect", version, about = "Summarize a camera calibration directory")]
struct Args {
    /// Calibration directory
    #[arg(default_value = DEFAULT_CALIBRATION_DIR)]
    dir: PathBuf,

    /// Fail unless the directory holds exactly this many cameras
    #[arg(long, value_name = "N")]
    cameras: Option<usize>,

    /// Write N identity calibrations (cam00.json ...) into the directory first
    #[arg(long, value_name = "N")]
    init: Option<usize>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let ui = Ui::from_flag(Some(&args.ui));

    if let Some(count) = args.init {
        let _stage = ui.stage("Write identity calibrations");
        if count == 0 {
            return Err(anyhow!("--init needs at least one camera"));
        }
        std::fs::create_dir_all(&args.dir)?;
        for i in 0..count {
            let camera = CameraCalibration::new(
                &format!("cam{:02}", i),
                Mat3::identity(),
                vec![0.0; 5],
                Mat3x4::identity(),
            );
            let path = CalibrationStore::write_camera(&args.dir, &camera)?;
            log::info!("wrote {}", path.display());
        }
    }

    let set = {
        let _stage = ui.stage("Read calibration");
        CalibrationStore::read_parameters(&args.dir)?
    };
    if let Some(expected) = args.cameras {
        set.ensure_camera_count(expected)?;
    }

    println!("{} ({} cameras)", set.source().display(), set.len());
    for (position, camera) in set.iter().enumerate() {
        let k = &camera.intrinsics;
        let t = camera.extrinsics.translation();
        println!(
            "  [{}] {}  f=({:.2}, {:.2}) c=({:.2}, {:.2})  t=({:.4}, {:.4}, {:.4})  distortion={}",
            position,
            camera.serial,
            k.at(0, 0),
            k.at(1, 1),
            k.at(0, 2),
            k.at(1, 2),
            t[0],
            t[1],
            t[2],
            camera.distortion.len()
        );
    }
    Ok(())
}
