//! 主流程: 参数 → 模型准备 → (仅转换时结束) → 加载模型 → 摄像头检测循环

use std::path::PathBuf;

use anyhow::Result;

use crate::export::{prepare_model, Exporter};
use crate::input::{CameraBackend, FrameSource};
use crate::models::ModelConfig;
use crate::pipeline::{self, Detector, StopReason};
use crate::renderer::{Canvas, Display};
use crate::Args;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// `--export-only`: 只完成了转换
    Exported(PathBuf),
    /// 检测循环已结束
    Stopped(StopReason),
}

pub fn run<E, C, F, D, W, L>(
    args: &Args,
    exporter: &E,
    camera: &mut C,
    load: L,
    display: &mut W,
) -> Result<Outcome>
where
    E: Exporter + ?Sized,
    C: CameraBackend,
    C::Source: FrameSource<Frame = F>,
    F: Canvas,
    D: Detector<F>,
    W: Display<F>,
    L: FnOnce(ModelConfig) -> Result<D>,
{
    let export_path = prepare_model(&args.model, exporter)?;

    if args.export_only {
        println!("✅ Model exported to {}", export_path.display());
        return Ok(Outcome::Exported(export_path));
    }

    println!("📦 Loading OpenVINO model from {}...", export_path.display());
    let mut detector = load(ModelConfig::from_args(export_path, args))?;

    println!("📹 Opening webcam (ID: {})...", args.cam_id);
    let reason = pipeline::run(camera, args.cam_id, &mut detector, display)?;
    Ok(Outcome::Stopped(reason))
}
