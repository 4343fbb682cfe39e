// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv11 模型实现 (改进的C3k2和SPPF模块)
//
// 注: YOLOv11与YOLOv8的ONNX输出头完全兼容,
// 差异仅在网络结构内部, 因此直接复用YOLOv8的实现

use anyhow::Result;
use image::DynamicImage;
use ndarray::{Array, IxDyn};

use super::{Model, ModelConfig, YOLOv8};
use crate::DetectionResult;

/// YOLOv11 模型结构 (内部委托给YOLOv8)
pub struct YOLOv11 {
    inner: YOLOv8,
}

impl YOLOv11 {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let inner = YOLOv8::new(config)?;
        Ok(Self { inner })
    }
}

impl Model for YOLOv11 {
    fn preprocess(&mut self, xs: &[DynamicImage]) -> Result<Vec<Array<f32, IxDyn>>> {
        self.inner.preprocess(xs)
    }

    fn run(&mut self, xs: Vec<Array<f32, IxDyn>>) -> Result<Vec<Array<f32, IxDyn>>> {
        self.inner.run(xs)
    }

    fn postprocess(
        &self,
        xs: Vec<Array<f32, IxDyn>>,
        xs0: &[DynamicImage],
    ) -> Result<Vec<DetectionResult>> {
        self.inner.postprocess(xs, xs0)
    }

    fn names(&self) -> &[String] {
        self.inner.names()
    }

    fn summary(&self) {
        println!("\n模型摘要:");
        println!("┌─────────────────────────────────────────┐");
        println!("│ Model: YOLOv11 (Improved Architecture)  │");
        println!("│ Backend: YOLOv8 (ONNX Compatible)       │");
        println!("└─────────────────────────────────────────┘");
        self.inner.summary();
    }
}
