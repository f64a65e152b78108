//! Pose engine flags.
//!
//! `EngineFlags` carries the command-line surface of the pose engine with its
//! usual defaults. `EngineFlags::to_engine_config` validates the flags and
//! translates them into the typed `EngineConfig` handed to `Pipeline::configure`.

use anyhow::{anyhow, Result};
use clap::{Args, Parser};
use regex::Regex;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;

// ----------------------------------------------------------------------------
// Value types
// ----------------------------------------------------------------------------

/// Width x height pair; `-1` leaves a dimension free.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// Parses resolution flags such as `-1x368` or `656x368`.
pub fn parse_point(value: &str) -> Result<Point> {
    static POINT_RE: OnceLock<Regex> = OnceLock::new();
    let re = POINT_RE.get_or_init(|| Regex::new(r"^\s*(-?\d+)\s*x\s*(-?\d+)\s*$").unwrap());
    let caps = re
        .captures(value)
        .ok_or_else(|| anyhow!("invalid resolution '{}' (expected WxH, e.g. -1x368)", value))?;
    let x = caps[1]
        .parse()
        .map_err(|_| anyhow!("resolution width out of range in '{}'", value))?;
    let y = caps[2]
        .parse()
        .map_err(|_| anyhow!("resolution height out of range in '{}'", value))?;
    Ok(Point { x, y })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoseMode {
    Disabled,
    Enabled,
    /// Keypoints are provided externally; the body network is not run.
    NoNetwork,
}

impl PoseMode {
    pub fn from_flag(body: i32) -> Result<Self> {
        match body {
            0 => Ok(PoseMode::Disabled),
            1 => Ok(PoseMode::Enabled),
            2 => Ok(PoseMode::NoNetwork),
            other => Err(anyhow!("body flag must be 0, 1 or 2, got {}", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoseModel {
    Body25,
    Coco,
    Mpi,
    Mpi4Layers,
    Body25B,
    Body135,
    Car12,
    Car22,
}

impl FromStr for PoseModel {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "BODY_25" => Ok(PoseModel::Body25),
            "COCO" => Ok(PoseModel::Coco),
            "MPI" => Ok(PoseModel::Mpi),
            "MPI_4_layers" => Ok(PoseModel::Mpi4Layers),
            "BODY_25B" => Ok(PoseModel::Body25B),
            "BODY_135" => Ok(PoseModel::Body135),
            "CAR_12" => Ok(PoseModel::Car12),
            "CAR_22" => Ok(PoseModel::Car22),
            other => Err(anyhow!("unknown pose model '{}'", other)),
        }
    }
}

/// Coordinate space of the output keypoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScaleMode {
    InputResolution,
    NetOutputResolution,
    OutputResolution,
    ZeroToOne,
    PlusMinusOne,
}

impl ScaleMode {
    pub fn from_flag(keypoint_scale: i32) -> Result<Self> {
        match keypoint_scale {
            0 => Ok(ScaleMode::InputResolution),
            1 => Ok(ScaleMode::NetOutputResolution),
            2 => Ok(ScaleMode::OutputResolution),
            3 => Ok(ScaleMode::ZeroToOne),
            4 => Ok(ScaleMode::PlusMinusOne),
            other => Err(anyhow!("keypoint_scale must be in 0..=4, got {}", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeatMapType {
    Parts,
    Background,
    Pafs,
}

impl HeatMapType {
    pub fn from_flags(parts: bool, background: bool, pafs: bool) -> Vec<Self> {
        [
            (parts, HeatMapType::Parts),
            (background, HeatMapType::Background),
            (pafs, HeatMapType::Pafs),
        ]
        .into_iter()
        .filter_map(|(on, kind)| on.then_some(kind))
        .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeatMapScaleMode {
    PlusMinusOne,
    ZeroToOne,
    UnsignedChar,
    NoScale,
}

impl HeatMapScaleMode {
    pub fn from_flag(heatmaps_scale: i32) -> Result<Self> {
        match heatmaps_scale {
            0 => Ok(HeatMapScaleMode::PlusMinusOne),
            1 => Ok(HeatMapScaleMode::ZeroToOne),
            2 => Ok(HeatMapScaleMode::UnsignedChar),
            3 => Ok(HeatMapScaleMode::NoScale),
            other => Err(anyhow!("heatmaps_scale must be in 0..=3, got {}", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderMode {
    None,
    Cpu,
    Gpu,
}

/// Marks a render flag with no parent to inherit from.
const NO_PARENT_RENDER: i32 = -2;

impl RenderMode {
    /// `-1` is auto: face and hand follow `render_pose`; body renders on the
    /// CPU for multi-view runs and on the GPU otherwise.
    pub fn from_flag(flag: i32, multi_view: bool, parent: i32) -> Result<Self> {
        match flag {
            -1 if parent == NO_PARENT_RENDER => Ok(if multi_view {
                RenderMode::Cpu
            } else {
                RenderMode::Gpu
            }),
            -1 => Self::from_flag(parent, multi_view, NO_PARENT_RENDER),
            0 => Ok(RenderMode::None),
            1 => Ok(RenderMode::Cpu),
            2 => Ok(RenderMode::Gpu),
            other => Err(anyhow!("render flag must be in -1..=2, got {}", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayMode {
    NoDisplay,
    All,
    Display2D,
    Display3D,
}

impl DisplayMode {
    pub fn from_flag(display: i32, use_3d: bool) -> Result<Self> {
        match display {
            -1 if use_3d => Ok(DisplayMode::All),
            -1 => Ok(DisplayMode::Display2D),
            0 => Ok(DisplayMode::NoDisplay),
            1 => Ok(DisplayMode::All),
            2 => Ok(DisplayMode::Display2D),
            3 => Ok(DisplayMode::Display3D),
            other => Err(anyhow!("display must be in -1..=3, got {}", other)),
        }
    }
}

/// Face/hand region source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Detector {
    Body,
    OpenCv,
    Provided,
    BodyWithTracking,
}

impl Detector {
    pub fn from_flag(flag: i32) -> Result<Self> {
        match flag {
            0 => Ok(Detector::Body),
            1 => Ok(Detector::OpenCv),
            2 => Ok(Detector::Provided),
            3 => Ok(Detector::BodyWithTracking),
            other => Err(anyhow!("detector flag must be in 0..=3, got {}", other)),
        }
    }
}

// ----------------------------------------------------------------------------
// Engine configuration
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct PoseConfig {
    pub mode: PoseMode,
    pub net_input_size: Point,
    pub output_size: Point,
    pub keypoint_scale: ScaleMode,
    pub num_gpu: i32,
    pub num_gpu_start: i32,
    pub scale_number: i32,
    pub scale_gap: f32,
    pub render_mode: RenderMode,
    pub model: PoseModel,
    pub blend_original_frame: bool,
    pub alpha_keypoint: f32,
    pub alpha_heatmap: f32,
    pub part_to_show: i32,
    pub model_folder: PathBuf,
    pub heatmap_types: Vec<HeatMapType>,
    pub heatmap_scale: HeatMapScaleMode,
    pub part_candidates: bool,
    pub render_threshold: f32,
    pub number_people_max: i32,
    pub maximize_positives: bool,
    pub fps_max: f64,
    pub upsampling_ratio: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FaceConfig {
    pub enable: bool,
    pub detector: Detector,
    pub net_input_size: Point,
    pub render_mode: RenderMode,
    pub alpha_keypoint: f32,
    pub alpha_heatmap: f32,
    pub render_threshold: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HandConfig {
    pub enable: bool,
    pub detector: Detector,
    pub net_input_size: Point,
    pub scale_number: i32,
    pub scale_range: f32,
    pub render_mode: RenderMode,
    pub alpha_keypoint: f32,
    pub alpha_heatmap: f32,
    pub render_threshold: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExtraConfig {
    pub reconstruct_3d: bool,
    pub min_views_3d: i32,
    pub identification: bool,
    pub tracking: i32,
    pub ik_threads: i32,
}

/// Writer destinations. Empty strings leave a writer off.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputConfig {
    pub verbose: f64,
    pub write_keypoint: String,
    pub write_keypoint_format: String,
    pub write_json: String,
    pub write_images: String,
    pub write_images_format: String,
    pub write_video: String,
    pub write_video_fps: f64,
    pub write_bvh: String,
    pub udp_host: String,
    pub udp_port: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GuiConfig {
    pub display_mode: DisplayMode,
    pub gui_verbose: bool,
    pub fullscreen: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    pub pose: PoseConfig,
    pub face: FaceConfig,
    pub hand: HandConfig,
    pub extra: ExtraConfig,
    pub output: OutputConfig,
    pub gui: GuiConfig,
    pub multi_thread: bool,
    /// Frames between profiler reports.
    pub profile_speed: u32,
}

// ----------------------------------------------------------------------------
// Flags
// ----------------------------------------------------------------------------

/// Pose engine command-line flags.
#[derive(Args, Clone, Debug)]
pub struct EngineFlags {
    /// Log priority threshold: 0 logs everything, 255 silences the engine.
    #[arg(long, default_value_t = 3, allow_negative_numbers = true)]
    pub logging_level: i32,

    /// Frames between runtime statistics reports of a profiling build.
    #[arg(long, default_value_t = 1000, allow_negative_numbers = true)]
    pub profile_speed: i32,

    /// Output resolution, WxH (-1 keeps the input size).
    #[arg(long, default_value = "-1x-1", allow_hyphen_values = true)]
    pub output_resolution: String,
    /// Body network input resolution, WxH (multiples of 16; -1 keeps aspect ratio).
    #[arg(long, default_value = "-1x368", allow_hyphen_values = true)]
    pub net_resolution: String,
    /// 0 disables body keypoints, 1 runs the body network, 2 uses provided keypoints.
    #[arg(long, default_value_t = 1)]
    pub body: i32,
    #[arg(long, default_value = "BODY_25")]
    pub model_pose: String,
    #[arg(long, default_value = "models/")]
    pub model_folder: PathBuf,
    #[arg(long, default_value_t = 0)]
    pub keypoint_scale: i32,
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub num_gpu: i32,
    #[arg(long, default_value_t = 0)]
    pub num_gpu_start: i32,
    #[arg(long, default_value_t = 1)]
    pub scale_number: i32,
    #[arg(long, default_value_t = 0.25)]
    pub scale_gap: f64,
    /// -1 auto, 0 none, 1 CPU, 2 GPU.
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub render_pose: i32,
    #[arg(long)]
    pub disable_blending: bool,
    #[arg(long, default_value_t = 0.6)]
    pub alpha_pose: f64,
    #[arg(long, default_value_t = 0.7)]
    pub alpha_heatmap: f64,
    #[arg(long, default_value_t = 0)]
    pub part_to_show: i32,
    #[arg(long)]
    pub heatmaps_add_parts: bool,
    #[arg(long)]
    pub heatmaps_add_bkg: bool,
    #[arg(long)]
    pub heatmaps_add_pafs: bool,
    #[arg(long, default_value_t = 2)]
    pub heatmaps_scale: i32,
    #[arg(long)]
    pub part_candidates: bool,
    #[arg(long, default_value_t = 0.05)]
    pub render_threshold: f64,
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub number_people_max: i32,
    #[arg(long)]
    pub maximize_positives: bool,
    #[arg(long, default_value_t = -1.0, allow_negative_numbers = true)]
    pub fps_max: f64,
    #[arg(long, default_value_t = 0.0)]
    pub upsampling_ratio: f64,

    #[arg(long)]
    pub face: bool,
    #[arg(long, default_value_t = 0)]
    pub face_detector: i32,
    #[arg(long, default_value = "368x368")]
    pub face_net_resolution: String,
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub face_render: i32,
    #[arg(long, default_value_t = 0.6)]
    pub face_alpha_pose: f64,
    #[arg(long, default_value_t = 0.7)]
    pub face_alpha_heatmap: f64,
    #[arg(long, default_value_t = 0.4)]
    pub face_render_threshold: f64,

    #[arg(long)]
    pub hand: bool,
    #[arg(long, default_value_t = 0)]
    pub hand_detector: i32,
    #[arg(long, default_value = "368x368")]
    pub hand_net_resolution: String,
    #[arg(long, default_value_t = 1)]
    pub hand_scale_number: i32,
    #[arg(long, default_value_t = 0.4)]
    pub hand_scale_range: f64,
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub hand_render: i32,
    #[arg(long, default_value_t = 0.6)]
    pub hand_alpha_pose: f64,
    #[arg(long, default_value_t = 0.7)]
    pub hand_alpha_heatmap: f64,
    #[arg(long, default_value_t = 0.2)]
    pub hand_render_threshold: f64,

    /// Minimum views needed to triangulate a keypoint (-1 uses all but one, at least 2).
    #[arg(long = "3d-min-views", default_value_t = -1, allow_negative_numbers = true)]
    pub min_views_3d: i32,
    #[arg(long)]
    pub identification: bool,
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub tracking: i32,
    #[arg(long, default_value_t = 0)]
    pub ik_threads: i32,

    #[arg(long, default_value_t = -1.0, allow_negative_numbers = true)]
    pub cli_verbose: f64,
    /// Deprecated, use --write-json.
    #[arg(long, default_value = "")]
    pub write_keypoint: String,
    #[arg(long, default_value = "yml")]
    pub write_keypoint_format: String,
    #[arg(long, default_value = "")]
    pub write_json: String,
    #[arg(long, default_value = "")]
    pub write_images: String,
    #[arg(long, default_value = "png")]
    pub write_images_format: String,
    #[arg(long, default_value = "")]
    pub write_video: String,
    #[arg(long, default_value_t = -1.0, allow_negative_numbers = true)]
    pub write_video_fps: f64,
    #[arg(long, default_value = "")]
    pub write_bvh: String,
    #[arg(long, default_value = "")]
    pub udp_host: String,
    #[arg(long, default_value = "8051")]
    pub udp_port: String,

    /// -1 auto, 0 none, 1 all, 2 2-D only, 3 3-D only.
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub display: i32,
    #[arg(long)]
    pub no_gui_verbose: bool,
    #[arg(long)]
    pub fullscreen: bool,

    /// Run every stage on the calling thread.
    #[arg(long)]
    pub disable_multi_thread: bool,
}

#[derive(Parser)]
struct DefaultFlags {
    #[command(flatten)]
    flags: EngineFlags,
}

impl Default for EngineFlags {
    fn default() -> Self {
        DefaultFlags::parse_from(["multiview"]).flags
    }
}

impl EngineFlags {
    /// Checks `logging_level` against the 0..=255 priority range.
    pub fn checked_logging_level(&self) -> Result<u8> {
        u8::try_from(self.logging_level).map_err(|_| {
            anyhow!(
                "wrong logging_level value {} (expected 0..=255)",
                self.logging_level
            )
        })
    }

    /// Translates the flags for a run over `views` cameras.
    pub fn to_engine_config(&self, use_3d: bool, views: usize) -> Result<EngineConfig> {
        self.checked_logging_level()?;
        let profile_speed = u32::try_from(self.profile_speed)
            .ok()
            .filter(|&frames| frames > 0)
            .ok_or_else(|| anyhow!("profile_speed must be positive, got {}", self.profile_speed))?;
        let multi_view = use_3d || views > 1;

        if !self.write_keypoint.is_empty() {
            log::warn!(
                "flag `write_keypoint` is deprecated and will eventually be removed, \
                 use `write_json` instead"
            );
        }

        let render_pose = RenderMode::from_flag(self.render_pose, multi_view, NO_PARENT_RENDER)?;

        let pose = PoseConfig {
            mode: PoseMode::from_flag(self.body)?,
            net_input_size: parse_point(&self.net_resolution)?,
            output_size: parse_point(&self.output_resolution)?,
            keypoint_scale: ScaleMode::from_flag(self.keypoint_scale)?,
            num_gpu: self.num_gpu,
            num_gpu_start: self.num_gpu_start,
            scale_number: self.scale_number,
            scale_gap: self.scale_gap as f32,
            render_mode: render_pose,
            model: self.model_pose.parse()?,
            blend_original_frame: !self.disable_blending,
            alpha_keypoint: self.alpha_pose as f32,
            alpha_heatmap: self.alpha_heatmap as f32,
            part_to_show: self.part_to_show,
            model_folder: self.model_folder.clone(),
            heatmap_types: HeatMapType::from_flags(
                self.heatmaps_add_parts,
                self.heatmaps_add_bkg,
                self.heatmaps_add_pafs,
            ),
            heatmap_scale: HeatMapScaleMode::from_flag(self.heatmaps_scale)?,
            part_candidates: self.part_candidates,
            render_threshold: self.render_threshold as f32,
            number_people_max: self.number_people_max,
            maximize_positives: self.maximize_positives,
            fps_max: self.fps_max,
            upsampling_ratio: self.upsampling_ratio as f32,
        };

        let face = FaceConfig {
            enable: self.face,
            detector: Detector::from_flag(self.face_detector)?,
            net_input_size: parse_point(&self.face_net_resolution)?,
            render_mode: RenderMode::from_flag(self.face_render, multi_view, self.render_pose)?,
            alpha_keypoint: self.face_alpha_pose as f32,
            alpha_heatmap: self.face_alpha_heatmap as f32,
            render_threshold: self.face_render_threshold as f32,
        };

        let hand = HandConfig {
            enable: self.hand,
            detector: Detector::from_flag(self.hand_detector)?,
            net_input_size: parse_point(&self.hand_net_resolution)?,
            scale_number: self.hand_scale_number,
            scale_range: self.hand_scale_range as f32,
            render_mode: RenderMode::from_flag(self.hand_render, multi_view, self.render_pose)?,
            alpha_keypoint: self.hand_alpha_pose as f32,
            alpha_heatmap: self.hand_alpha_heatmap as f32,
            render_threshold: self.hand_render_threshold as f32,
        };

        let extra = ExtraConfig {
            reconstruct_3d: use_3d,
            min_views_3d: self.min_views_3d,
            identification: self.identification,
            tracking: self.tracking,
            ik_threads: self.ik_threads,
        };

        let output = OutputConfig {
            verbose: self.cli_verbose,
            write_keypoint: self.write_keypoint.clone(),
            write_keypoint_format: self.write_keypoint_format.clone(),
            write_json: self.write_json.clone(),
            write_images: self.write_images.clone(),
            write_images_format: self.write_images_format.clone(),
            write_video: self.write_video.clone(),
            write_video_fps: self.write_video_fps,
            write_bvh: self.write_bvh.clone(),
            udp_host: self.udp_host.clone(),
            udp_port: self.udp_port.clone(),
        };

        let gui = GuiConfig {
            display_mode: DisplayMode::from_flag(self.display, use_3d)?,
            gui_verbose: !self.no_gui_verbose,
            fullscreen: self.fullscreen,
        };

        Ok(EngineConfig {
            pose,
            face,
            hand,
            extra,
            output,
            gui,
            multi_thread: !self.disable_multi_thread,
            profile_speed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_points() -> Result<()> {
        assert_eq!(parse_point("-1x368")?, Point { x: -1, y: 368 });
        assert_eq!(parse_point(" 656 x 368 ")?, Point { x: 656, y: 368 });
        assert!(parse_point("368").is_err());
        assert!(parse_point("axb").is_err());
        assert!(parse_point("99999999999x1").is_err());
        Ok(())
    }

    #[test]
    fn render_auto_follows_view_count_and_parent() -> Result<()> {
        assert_eq!(RenderMode::from_flag(-1, true, NO_PARENT_RENDER)?, RenderMode::Cpu);
        assert_eq!(RenderMode::from_flag(-1, false, NO_PARENT_RENDER)?, RenderMode::Gpu);
        assert_eq!(RenderMode::from_flag(-1, false, 0)?, RenderMode::None);
        assert_eq!(RenderMode::from_flag(-1, true, -1)?, RenderMode::Cpu);
        assert_eq!(RenderMode::from_flag(2, true, 0)?, RenderMode::Gpu);
        assert!(RenderMode::from_flag(3, false, NO_PARENT_RENDER).is_err());
        Ok(())
    }

    #[test]
    fn display_auto_depends_on_3d() -> Result<()> {
        assert_eq!(DisplayMode::from_flag(-1, true)?, DisplayMode::All);
        assert_eq!(DisplayMode::from_flag(-1, false)?, DisplayMode::Display2D);
        assert_eq!(DisplayMode::from_flag(3, false)?, DisplayMode::Display3D);
        assert!(DisplayMode::from_flag(4, false).is_err());
        Ok(())
    }

    #[test]
    fn default_flags_translate() -> Result<()> {
        let flags = EngineFlags::default();
        assert_eq!(flags.net_resolution, "-1x368");
        assert_eq!(flags.logging_level, 3);
        assert_eq!(flags.profile_speed, 1000);

        let single = flags.to_engine_config(false, 1)?;
        assert_eq!(single.pose.render_mode, RenderMode::Gpu);
        assert_eq!(single.pose.net_input_size, Point { x: -1, y: 368 });
        assert_eq!(single.pose.model, PoseModel::Body25);
        assert_eq!(single.pose.mode, PoseMode::Enabled);
        assert_eq!(single.pose.heatmap_scale, HeatMapScaleMode::UnsignedChar);
        assert!(single.pose.heatmap_types.is_empty());
        assert_eq!(single.face.render_mode, RenderMode::Gpu);
        assert_eq!(single.gui.display_mode, DisplayMode::Display2D);
        assert!(single.multi_thread);
        assert_eq!(single.profile_speed, 1000);

        let rig = flags.to_engine_config(false, 4)?;
        assert_eq!(rig.pose.render_mode, RenderMode::Cpu);
        assert_eq!(rig.hand.render_mode, RenderMode::Cpu);

        let rig_3d = flags.to_engine_config(true, 4)?;
        assert!(rig_3d.extra.reconstruct_3d);
        assert_eq!(rig_3d.gui.display_mode, DisplayMode::All);
        Ok(())
    }

    #[test]
    fn rejects_bad_flags() {
        let mut flags = EngineFlags::default();
        flags.logging_level = 256;
        assert!(flags.to_engine_config(false, 1).is_err());

        let mut flags = EngineFlags::default();
        flags.model_pose = "BODY_99".into();
        assert!(flags.to_engine_config(false, 1).is_err());

        let mut flags = EngineFlags::default();
        flags.keypoint_scale = 5;
        assert!(flags.to_engine_config(false, 1).is_err());

        let mut flags = EngineFlags::default();
        flags.profile_speed = 0;
        assert!(flags.to_engine_config(false, 1).is_err());
    }

    #[test]
    fn profile_speed_flag_is_forwarded() -> Result<()> {
        let parsed = DefaultFlags::try_parse_from(["multiview", "--profile-speed", "250"])?;
        assert_eq!(parsed.flags.to_engine_config(false, 1)?.profile_speed, 250);
        Ok(())
    }

    #[test]
    fn heatmap_flags_collect_in_order() {
        assert_eq!(
            HeatMapType::from_flags(true, false, true),
            vec![HeatMapType::Parts, HeatMapType::Pafs]
        );
    }
}
