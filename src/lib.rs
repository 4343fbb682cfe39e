// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod app; // 主流程编排: 模型准备 → 摄像头检测
pub mod config; // 命令行参数
pub mod export; // .pt → 推理优化格式 转换
pub mod input; // 摄像头输入
pub mod models; // 模型接口与具体实现
pub mod ort_backend; // ONNX Runtime 推理后端
pub mod pipeline; // 采集 → 推理 → 显示 主循环
pub mod renderer; // 检测框绘制与预览窗口

pub use crate::app::Outcome;
pub use crate::config::Args;
pub use crate::export::{prepare_model, Exporter, UltralyticsExporter};
pub use crate::models::{Model, ModelType, YOLOv11, YOLOv8};
pub use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};
pub use crate::pipeline::{InferenceStats, StopReason};

pub fn non_max_suppression(xs: &mut Vec<Bbox>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| b2.confidence().total_cmp(&b1.confidence()));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            let iou = xs[prev_index].iou(&xs[index]);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectionResult {
    // 单帧检测结果
    pub bboxes: Option<Vec<Bbox>>,
}

impl DetectionResult {
    pub fn new(bboxes: Option<Vec<Bbox>>) -> Self {
        Self { bboxes }
    }

    pub fn bboxes(&self) -> Option<&Vec<Bbox>> {
        self.bboxes.as_ref()
    }

    pub fn len(&self) -> usize {
        self.bboxes.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bbox {
    // a bounding box around an object
    xmin: f32,
    ymin: f32,
    width: f32,
    height: f32,
    id: usize,
    confidence: f32,
}

impl Bbox {
    pub fn new(xmin: f32, ymin: f32, width: f32, height: f32, id: usize, confidence: f32) -> Self {
        Self {
            xmin,
            ymin,
            width,
            height,
            id,
            confidence,
        }
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn xmin(&self) -> f32 {
        self.xmin
    }

    pub fn ymin(&self) -> f32 {
        self.ymin
    }

    pub fn xmax(&self) -> f32 {
        self.xmin + self.width
    }

    pub fn ymax(&self) -> f32 {
        self.ymin + self.height
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn intersection_area(&self, another: &Bbox) -> f32 {
        let l = self.xmin.max(another.xmin);
        let r = self.xmax().min(another.xmax());
        let t = self.ymin.max(another.ymin);
        let b = self.ymax().min(another.ymax());
        (r - l).max(0.) * (b - t).max(0.)
    }

    pub fn union(&self, another: &Bbox) -> f32 {
        self.area() + another.area() - self.intersection_area(another)
    }

    pub fn iou(&self, another: &Bbox) -> f32 {
        let union = self.union(another);
        if union <= 0. {
            return 0.;
        }
        self.intersection_area(another) / union
    }
}
