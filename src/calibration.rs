//! Per-camera calibration parameters.
//!
//! A calibration directory holds one JSON file per camera. Files are read in
//! file-name order and that order is the camera position: the first file
//! belongs to the first configured camera, and so on. The file stem is kept as
//! the camera serial.
//!
//! ```json
//! {
//!   "intrinsics": [fx, 0, cx, 0, fy, cy, 0, 0, 1],
//!   "distortion": [k1, k2, p1, p2, k3],
//!   "extrinsics": [r11, r12, r13, t1, r21, r22, r23, t2, r31, r32, r33, t3],
//!   "camera_matrix": [ ... 12 values, optional ... ]
//! }
//! ```
//!
//! `camera_matrix` is `intrinsics * extrinsics`. It is computed when missing
//! and checked when present.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::BundlerError;

const CALIBRATION_EXTENSION: &str = "json";
const CAMERA_MATRIX_TOLERANCE: f64 = 1e-6;

// --- Matrices ---

/// Row-major 3x3 matrix.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mat3(pub [f64; 9]);

/// Row-major 3x4 matrix.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mat3x4(pub [f64; 12]);

impl Mat3 {
    pub fn identity() -> Self {
        Self([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0])
    }

    pub fn at(&self, row: usize, col: usize) -> f64 {
        self.0[row * 3 + col]
    }

    /// `self * rhs`, giving a 3x4 projection.
    pub fn mul_3x4(&self, rhs: &Mat3x4) -> Mat3x4 {
        let mut out = [0.0f64; 12];
        for r in 0..3 {
            for c in 0..4 {
                out[r * 4 + c] = (0..3).map(|k| self.at(r, k) * rhs.at(k, c)).sum();
            }
        }
        Mat3x4(out)
    }
}

impl Mat3x4 {
    /// `[I | 0]`
    pub fn identity() -> Self {
        Self([1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0])
    }

    pub fn at(&self, row: usize, col: usize) -> f64 {
        self.0[row * 4 + col]
    }

    /// Translation column of an `[R | t]` matrix.
    pub fn translation(&self) -> [f64; 3] {
        [self.at(0, 3), self.at(1, 3), self.at(2, 3)]
    }

    fn approx_eq(&self, other: &Mat3x4) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| {
            (a - b).abs() <= CAMERA_MATRIX_TOLERANCE * a.abs().max(b.abs()).max(1.0)
        })
    }
}

// --- Calibration data ---

/// Calibration of one camera.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraCalibration {
    pub serial: String,
    /// K (3x3).
    pub intrinsics: Mat3,
    pub distortion: Vec<f64>,
    /// [R | t] (3x4), camera pose relative to the reference camera.
    pub extrinsics: Mat3x4,
    /// K * [R | t] (3x4).
    pub camera_matrix: Mat3x4,
}

impl CameraCalibration {
    /// Builds a calibration, deriving the camera matrix.
    pub fn new(serial: &str, intrinsics: Mat3, distortion: Vec<f64>, extrinsics: Mat3x4) -> Self {
        Self {
            serial: serial.to_string(),
            camera_matrix: intrinsics.mul_3x4(&extrinsics),
            intrinsics,
            distortion,
            extrinsics,
        }
    }
}

/// Calibration of every camera, indexed by camera position.
///
/// Immutable after load. Entries are `Arc`s so datums can carry them without copying.
#[derive(Clone, Debug)]
pub struct CalibrationSet {
    source: PathBuf,
    cameras: Vec<Arc<CameraCalibration>>,
}

impl CalibrationSet {
    pub fn from_cameras(source: impl Into<PathBuf>, cameras: Vec<CameraCalibration>) -> Self {
        Self {
            source: source.into(),
            cameras: cameras.into_iter().map(Arc::new).collect(),
        }
    }

    /// Directory the set was read from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    /// Calibration for the camera at `position` in the configured list.
    pub fn for_position(&self, position: usize) -> Option<&Arc<CameraCalibration>> {
        self.cameras.get(position)
    }

    pub fn intrinsics(&self) -> Vec<Mat3> {
        self.cameras.iter().map(|c| c.intrinsics).collect()
    }

    pub fn extrinsics(&self) -> Vec<Mat3x4> {
        self.cameras.iter().map(|c| c.extrinsics).collect()
    }

    pub fn camera_matrices(&self) -> Vec<Mat3x4> {
        self.cameras.iter().map(|c| c.camera_matrix).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CameraCalibration>> {
        self.cameras.iter()
    }

    /// Fails with `CalibrationLoad` unless there is one entry per camera.
    pub fn ensure_camera_count(&self, cameras: usize) -> Result<()> {
        if self.cameras.len() != cameras {
            return Err(BundlerError::CalibrationLoad {
                path: self.source.clone(),
                message: format!(
                    "found {} calibrated cameras, {} configured",
                    self.cameras.len(),
                    cameras
                ),
            }
            .into());
        }
        Ok(())
    }
}

// --- On-disk format ---

#[derive(Debug, Serialize, Deserialize)]
struct CameraCalibrationFile {
    intrinsics: Vec<f64>,
    #[serde(default)]
    distortion: Vec<f64>,
    extrinsics: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    camera_matrix: Option<Vec<f64>>,
}

fn to_array<const N: usize>(values: Vec<f64>, field: &str) -> Result<[f64; N]> {
    let len = values.len();
    values
        .try_into()
        .map_err(|_| anyhow!("`{}` needs {} values, found {}", field, N, len))
}

// --- Store ---

/// Calibration files among `entries`, sorted by name. Fails on the first
/// entry that cannot be read.
fn calibration_files(
    entries: impl Iterator<Item = std::io::Result<PathBuf>>,
) -> std::io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for path in entries {
        let path = path?;
        if path.is_file()
            && path.extension().and_then(|e| e.to_str()) == Some(CALIBRATION_EXTENSION)
        {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Reads and writes calibration directories.
pub struct CalibrationStore;

impl CalibrationStore {
    /// Loads every camera calibration found in `dir`.
    ///
    /// Any failure is reported as `BundlerError::CalibrationLoad`.
    pub fn read_parameters(dir: impl AsRef<Path>) -> Result<CalibrationSet> {
        let dir = dir.as_ref();
        Self::read_dir(dir).map_err(|err| {
            anyhow::Error::from(BundlerError::CalibrationLoad {
                path: dir.to_path_buf(),
                message: format!("{:#}", err),
            })
        })
    }

    /// Writes one camera's calibration as `<serial>.json` inside `dir`.
    pub fn write_camera(dir: impl AsRef<Path>, calibration: &CameraCalibration) -> Result<PathBuf> {
        let path = dir
            .as_ref()
            .join(format!("{}.{}", calibration.serial, CALIBRATION_EXTENSION));
        let file = CameraCalibrationFile {
            intrinsics: calibration.intrinsics.0.to_vec(),
            distortion: calibration.distortion.clone(),
            extrinsics: calibration.extrinsics.0.to_vec(),
            camera_matrix: Some(calibration.camera_matrix.0.to_vec()),
        };
        let json = serde_json::to_string_pretty(&file)?;
        fs::write(&path, json)
            .with_context(|| format!("failed to write calibration file {}", path.display()))?;
        Ok(path)
    }

    fn read_dir(dir: &Path) -> Result<CalibrationSet> {
        if !dir.is_dir() {
            return Err(anyhow!("not a directory"));
        }
        let entries = fs::read_dir(dir)
            .context("failed to list calibration directory")?
            .map(|entry| entry.map(|e| e.path()));
        let paths = calibration_files(entries).context("failed to read calibration directory")?;

        if paths.is_empty() {
            return Err(anyhow!("no *.{} calibration files", CALIBRATION_EXTENSION));
        }

        let cameras = paths
            .iter()
            .map(|path| Self::read_camera(path))
            .collect::<Result<Vec<_>>>()?;
        log::info!(
            "calibration: loaded {} cameras from {}",
            cameras.len(),
            dir.display()
        );
        Ok(CalibrationSet::from_cameras(dir, cameras))
    }

    fn read_camera(path: &Path) -> Result<CameraCalibration> {
        let serial = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow!("invalid calibration file name {}", path.display()))?;
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file: CameraCalibrationFile = serde_json::from_str(&raw)
            .with_context(|| format!("invalid calibration file {}", path.display()))?;

        let intrinsics = Mat3(to_array(file.intrinsics, "intrinsics")?);
        let extrinsics = Mat3x4(to_array(file.extrinsics, "extrinsics")?);
        let calibration = CameraCalibration::new(serial, intrinsics, file.distortion, extrinsics);

        if let Some(stored) = file.camera_matrix {
            let stored = Mat3x4(to_array(stored, "camera_matrix")?);
            if !stored.approx_eq(&calibration.camera_matrix) {
                return Err(anyhow!(
                    "{}: camera_matrix does not equal intrinsics * extrinsics",
                    path.display()
                ));
            }
        }
        Ok(calibration)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
