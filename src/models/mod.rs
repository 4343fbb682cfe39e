/// 模型统一接口与实现
///
/// # 架构说明
///
/// - **YOLOv8**: 完整检测实现 (加载 / 预处理 / 推理 / 后处理), 文件 `yolov8.rs`
/// - **YOLOv11**: 输出头与 YOLOv8 相同, 内部委托给 YOLOv8, 文件 `yolov11.rs`
///
/// ## 使用示例
/// ```ignore
/// use yolo11_openvino_rs::models::{self, ModelConfig};
///
/// let mut model = models::load(config)?;
/// let results = model.forward(&images)?;
/// ```
use std::path::PathBuf;

use anyhow::Result;
use image::DynamicImage;
use ndarray::{Array, IxDyn};

use crate::DetectionResult;

/// 模型类型枚举（用于自动识别模型）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// YOLOv8 标准模型
    YOLOv8,
    /// YOLOv11 改进模型 (C3k2 + SPPF)
    YOLOv11,
}

impl ModelType {
    /// 从模型路径推断模型类型
    pub fn from_path(path: &str) -> Self {
        let path = path.to_ascii_lowercase();
        if path.contains("yolo11") || path.contains("yolov11") {
            ModelType::YOLOv11
        } else {
            ModelType::YOLOv8
        }
    }
}

/// 模型加载参数
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// 转换后的模型 (目录或 .onnx 文件)
    pub model: PathBuf,
    /// 推理设备, 见 `OrtEP::from_device`
    pub device: String,
    pub conf: f32,
    pub iou: f32,
    pub imgsz: u32,
}

impl ModelConfig {
    pub fn from_args(model: PathBuf, args: &crate::Args) -> Self {
        Self {
            model,
            device: args.device.clone(),
            conf: args.conf,
            iou: args.iou,
            imgsz: args.imgsz,
        }
    }
}

/// 统一的深度学习模型接口
///
/// ## 核心流程
/// ```text
/// 原始图片 → preprocess → ndarray张量
///          ↓
///     推理引擎 run
///          ↓
///     原始输出 → postprocess → 检测结果
/// ```
pub trait Model {
    /// 预处理: 图片 → NCHW 张量
    fn preprocess(&mut self, images: &[DynamicImage]) -> Result<Vec<Array<f32, IxDyn>>>;

    /// 推理: 执行模型前向传播, 返回原始输出
    fn run(&mut self, xs: Vec<Array<f32, IxDyn>>) -> Result<Vec<Array<f32, IxDyn>>>;

    /// 后处理: 原始输出 → 检测结果 (坐标还原到原图)
    fn postprocess(
        &self,
        xs: Vec<Array<f32, IxDyn>>,
        xs0: &[DynamicImage],
    ) -> Result<Vec<DetectionResult>>;

    /// 完整的推理流程: preprocess → run → postprocess
    fn forward(&mut self, images: &[DynamicImage]) -> Result<Vec<DetectionResult>> {
        let xs = self.preprocess(images)?;
        let ys = self.run(xs)?;
        self.postprocess(ys, images)
    }

    /// 类别名称
    fn names(&self) -> &[String];

    /// 打印模型信息
    fn summary(&self);
}

/// 按模型类型创建对应实例
pub fn load(config: ModelConfig) -> Result<Box<dyn Model>> {
    let model_type = ModelType::from_path(&config.model.to_string_lossy());
    let model: Box<dyn Model> = match model_type {
        ModelType::YOLOv11 => Box::new(YOLOv11::new(config)?),
        ModelType::YOLOv8 => Box::new(YOLOv8::new(config)?),
    };
    Ok(model)
}

// 各模型的具体实现
pub mod yolov11; // YOLOv11 改进模型
pub mod yolov8; // YOLOv8 完整模型 + 实现 Model trait

// Re-exports
pub use yolov11::YOLOv11;
pub use yolov8::{letterbox, YOLOv8, YOLOv8Config, YOLOv8Postprocessor};
