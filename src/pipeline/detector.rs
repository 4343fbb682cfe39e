/// 检测器 (Detector)
/// 职责: 摄像头帧 → YOLO检测 → 在帧上绘制结果
use anyhow::{anyhow, Result};
use image::{DynamicImage, RgbImage};
use opencv::core::Mat;
use opencv::imgproc;
use opencv::prelude::*;

use crate::models::{self, Model, ModelConfig};
use crate::{renderer, DetectionResult};

/// 单帧检测 + 模型自带的可视化
pub trait Detector<F> {
    /// 对一帧做推理 (同步阻塞)
    fn detect(&mut self, frame: &F) -> Result<DetectionResult>;

    /// 返回绘制了检测结果的新帧
    fn plot(&self, frame: &F, result: &DetectionResult) -> Result<F>;
}

pub struct YoloDetector {
    model: Box<dyn Model>,
}

impl YoloDetector {
    pub fn new(model: Box<dyn Model>) -> Self {
        Self { model }
    }

    /// 加载转换后的模型
    pub fn load(config: ModelConfig) -> Result<Self> {
        let model = models::load(config)?;
        println!("✅ 检测模型加载成功");
        model.summary();
        Ok(Self::new(model))
    }
}

impl Detector<Mat> for YoloDetector {
    fn detect(&mut self, frame: &Mat) -> Result<DetectionResult> {
        let image = mat_to_image(frame)?;
        let mut ys = self.model.forward(std::slice::from_ref(&image))?;
        Ok(ys.pop().unwrap_or_default())
    }

    fn plot(&self, frame: &Mat, result: &DetectionResult) -> Result<Mat> {
        renderer::plot(frame, result, self.model.names())
    }
}

/// OpenCV BGR 帧 → RGB 图像
pub fn mat_to_image(frame: &Mat) -> Result<DynamicImage> {
    let mut rgb = Mat::default();
    imgproc::cvt_color(frame, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

    let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
    let data = rgb.data_bytes()?.to_vec();
    let image = RgbImage::from_raw(width, height, data)
        .ok_or_else(|| anyhow!("Frame buffer does not match {}x{} RGB", width, height))?;
    Ok(DynamicImage::ImageRgb8(image))
}
