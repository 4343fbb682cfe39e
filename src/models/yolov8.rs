// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 检测模型实现
// 包含: 模型加载、预处理、推理、后处理

use anyhow::{anyhow, bail, Result};
use image::{DynamicImage, GenericImageView};
use ndarray::{s, Array, Axis, IxDyn};

use super::ModelConfig;
use crate::export::resolve_model_file;
use crate::{non_max_suppression, Bbox, DetectionResult, OrtBackend, OrtConfig, OrtEP};

const CXYWH_OFFSET: usize = 4;

/// 填充色 (灰)
const PAD_VALUE: f32 = 144.0 / 255.0;

fn scale_wh(w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
    let r = (w1 / w0).min(h1 / h0);
    (r, (w0 * r).round(), (h0 * r).round())
}

/// Letterbox 预处理: 等比缩放到左上角, 其余填充, RGB / NCHW / 归一化
pub fn letterbox(xs: &[DynamicImage], width: u32, height: u32) -> Array<f32, IxDyn> {
    let mut ys = Array::ones((xs.len(), 3, height as usize, width as usize)).into_dyn();
    ys.fill(PAD_VALUE);
    for (idx, x) in xs.iter().enumerate() {
        let (w0, h0) = x.dimensions();
        let (_, w_new, h_new) = scale_wh(w0 as f32, h0 as f32, width as f32, height as f32);
        let img = x.resize_exact(
            (w_new as u32).min(width),
            (h_new as u32).min(height),
            image::imageops::FilterType::Triangle,
        );

        for (x, y, rgb) in img.pixels() {
            let x = x as usize;
            let y = y as usize;
            let [r, g, b, _] = rgb.0;
            ys[[idx, 0, y, x]] = (r as f32) / 255.0;
            ys[[idx, 1, y, x]] = (g as f32) / 255.0;
            ys[[idx, 2, y, x]] = (b as f32) / 255.0;
        }
    }
    ys
}

/// YOLOv8 检测模型
pub struct YOLOv8 {
    engine: OrtBackend,
    postprocessor: YOLOv8Postprocessor,
    names: Vec<String>,
}

impl YOLOv8 {
    /// 从配置创建 YOLOv8 模型
    pub fn new(config: ModelConfig) -> Result<Self> {
        let ep = OrtEP::from_device(&config.device)?;
        let f = resolve_model_file(&config.model)?;

        let ort_args = OrtConfig {
            f,
            ep,
            image_size: (config.imgsz, config.imgsz),
        };
        let engine = OrtBackend::build(ort_args)?;

        let names = engine.names().unwrap_or_default();
        let postprocessor = YOLOv8Postprocessor::new(YOLOv8Config::new(
            engine.width() as usize,
            engine.height() as usize,
            config.conf,
            config.iou,
        ));

        Ok(Self {
            engine,
            postprocessor,
            names,
        })
    }

    pub fn conf(&self) -> f32 {
        self.postprocessor.config.conf
    }

    pub fn iou(&self) -> f32 {
        self.postprocessor.config.iou
    }

    pub fn width(&self) -> u32 {
        self.engine.width()
    }

    pub fn height(&self) -> u32 {
        self.engine.height()
    }
}

impl super::Model for YOLOv8 {
    fn preprocess(&mut self, images: &[DynamicImage]) -> Result<Vec<Array<f32, IxDyn>>> {
        Ok(vec![letterbox(images, self.width(), self.height())])
    }

    fn run(&mut self, xs: Vec<Array<f32, IxDyn>>) -> Result<Vec<Array<f32, IxDyn>>> {
        let x = xs
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No input tensor"))?;
        self.engine.run(x)
    }

    fn postprocess(
        &self,
        xs: Vec<Array<f32, IxDyn>>,
        xs0: &[DynamicImage],
    ) -> Result<Vec<DetectionResult>> {
        self.postprocessor.postprocess(xs, xs0)
    }

    fn names(&self) -> &[String] {
        &self.names
    }

    fn summary(&self) {
        println!(
            "\nSummary:\n\
            > Model: {}\n\
            > EP: {:?} {}\n\
            > Height: {}, Width: {}\n\
            > nc: {}, conf: {}, iou: {}\n\
            ",
            match self.engine.author().zip(self.engine.version()) {
                Some((author, ver)) => format!("{} {}", author, ver),
                None => String::from("Unknown"),
            },
            self.engine.ep(),
            if let OrtEP::CPU = self.engine.ep() {
                ""
            } else {
                "(May still fall back to CPU)"
            },
            self.height(),
            self.width(),
            self.names.len(),
            self.conf(),
            self.iou(),
        );
    }
}

/// YOLOv8 后处理参数
#[derive(Debug, Clone)]
pub struct YOLOv8Config {
    pub conf: f32,
    pub iou: f32,
    /// 推理输入尺寸
    pub width: usize,
    pub height: usize,
}

impl YOLOv8Config {
    pub fn new(width: usize, height: usize, conf: f32, iou: f32) -> Self {
        Self {
            conf,
            iou,
            width,
            height,
        }
    }
}

/// YOLOv8 检测头后处理
///
/// 输出形状 `[batch, 4 + nc, anchors]`, 每个 anchor 为 `cx, cy, w, h, cls...`
pub struct YOLOv8Postprocessor {
    config: YOLOv8Config,
}

impl YOLOv8Postprocessor {
    pub fn new(config: YOLOv8Config) -> Self {
        Self { config }
    }

    pub fn postprocess(
        &self,
        xs: Vec<Array<f32, IxDyn>>,
        xs0: &[DynamicImage],
    ) -> Result<Vec<DetectionResult>> {
        let preds = xs.first().ok_or_else(|| anyhow!("Empty model output"))?;
        if preds.ndim() != 3 || preds.shape()[1] <= CXYWH_OFFSET {
            bail!("Unexpected detection output shape {:?}", preds.shape());
        }
        let nc = preds.shape()[1] - CXYWH_OFFSET;

        let mut ys = Vec::new();
        for (idx, anchor) in preds.axis_iter(Axis(0)).enumerate() {
            let image = xs0
                .get(idx)
                .ok_or_else(|| anyhow!("Missing source image for batch {}", idx))?;
            let width_original = image.width() as f32;
            let height_original = image.height() as f32;
            let ratio = (self.config.width as f32 / width_original)
                .min(self.config.height as f32 / height_original);

            let mut data: Vec<Bbox> = Vec::new();
            for pred in anchor.axis_iter(Axis(1)) {
                let bbox = pred.slice(s![0..CXYWH_OFFSET]);
                let clss = pred.slice(s![CXYWH_OFFSET..CXYWH_OFFSET + nc]);

                let Some((id, &confidence)) = clss
                    .iter()
                    .enumerate()
                    .reduce(|max, x| if x.1 > max.1 { x } else { max })
                else {
                    continue;
                };

                if confidence < self.config.conf {
                    continue;
                }

                let cx = bbox[0] / ratio;
                let cy = bbox[1] / ratio;
                let w = bbox[2] / ratio;
                let h = bbox[3] / ratio;
                let x1 = (cx - w / 2.).clamp(0., width_original);
                let y1 = (cy - h / 2.).clamp(0., height_original);
                let x2 = (cx + w / 2.).clamp(0., width_original);
                let y2 = (cy + h / 2.).clamp(0., height_original);

                data.push(Bbox::new(x1, y1, x2 - x1, y2 - y1, id, confidence));
            }

            non_max_suppression(&mut data, self.config.iou);

            ys.push(DetectionResult::new(if data.is_empty() {
                None
            } else {
                Some(data)
            }));
        }

        Ok(ys)
    }
}
