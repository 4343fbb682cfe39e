//! 渲染: 检测框绘制 + 性能叠加文字 + 预览窗口 (OpenCV highgui)

use anyhow::Result;
use opencv::core::{Mat, Point, Rect, Scalar};
use opencv::prelude::*;
use opencv::{highgui, imgproc};

use crate::{Bbox, DetectionResult};

/// 预览窗口标题
pub const WINDOW_TITLE: &str = "YOLOv11 OpenVINO Detection";

/// 性能信息位置 / 字号 / 颜色(BGR) / 线宽
pub const OVERLAY_ORIGIN: (i32, i32) = (10, 30);
const OVERLAY_SCALE: f64 = 0.7;
const OVERLAY_COLOR: (f64, f64, f64) = (0., 255., 0.);
const OVERLAY_THICKNESS: i32 = 2;

/// 类别配色 (RGB)
const BRIGHT_COLORS: [(u8, u8, u8); 12] = [
    (255, 0, 0),     // 红色
    (0, 255, 0),     // 绿色
    (0, 0, 255),     // 蓝色
    (255, 255, 0),   // 黄色
    (255, 0, 255),   // 品红
    (0, 255, 255),   // 青色
    (255, 128, 0),   // 橙色
    (255, 0, 128),   // 粉红
    (128, 255, 0),   // 黄绿
    (0, 128, 255),   // 天蓝
    (255, 255, 255), // 白色
    (128, 0, 255),   // 紫色
];

/// 可叠加文字的画面
pub trait Canvas {
    fn put_text(&mut self, text: &str, org: (i32, i32)) -> Result<()>;
}

impl Canvas for Mat {
    fn put_text(&mut self, text: &str, org: (i32, i32)) -> Result<()> {
        let (b, g, r) = OVERLAY_COLOR;
        imgproc::put_text(
            self,
            text,
            Point::new(org.0, org.1),
            imgproc::FONT_HERSHEY_SIMPLEX,
            OVERLAY_SCALE,
            Scalar::new(b, g, r, 0.),
            OVERLAY_THICKNESS,
            imgproc::LINE_8,
            false,
        )?;
        Ok(())
    }
}

/// 预览窗口
pub trait Display<F> {
    fn show(&mut self, frame: &F) -> Result<()>;

    /// 等待按键 (毫秒), 无按键返回 -1
    fn wait_key(&mut self, delay_ms: i32) -> Result<i32>;

    fn close(&mut self) -> Result<()>;
}

/// OpenCV highgui 窗口
pub struct HighGuiWindow {
    title: String,
}

impl HighGuiWindow {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }
}

impl Default for HighGuiWindow {
    fn default() -> Self {
        Self::new(WINDOW_TITLE)
    }
}

impl Display<Mat> for HighGuiWindow {
    fn show(&mut self, frame: &Mat) -> Result<()> {
        highgui::imshow(&self.title, frame)?;
        Ok(())
    }

    fn wait_key(&mut self, delay_ms: i32) -> Result<i32> {
        Ok(highgui::wait_key(delay_ms)?)
    }

    fn close(&mut self) -> Result<()> {
        highgui::destroy_all_windows()?;
        Ok(())
    }
}

/// 类别颜色 (RGB), 按 id 循环取色
pub fn color_for(id: usize) -> (u8, u8, u8) {
    BRIGHT_COLORS[id % BRIGHT_COLORS.len()]
}

/// 标签: `<类别名> <置信度>`, 无类别名时用 `class<id>`
pub fn label_for(bbox: &Bbox, names: &[String]) -> String {
    let name = names
        .get(bbox.id())
        .cloned()
        .unwrap_or_else(|| format!("class{}", bbox.id()));
    format!("{} {:.2}", name, bbox.confidence())
}

/// 在帧副本上绘制检测结果, 原帧不变
pub fn plot(frame: &Mat, result: &DetectionResult, names: &[String]) -> Result<Mat> {
    let mut annotated = frame.try_clone()?;
    let Some(bboxes) = result.bboxes() else {
        return Ok(annotated);
    };

    let line_width = (((frame.cols() + frame.rows()) as f32) * 0.5 * 0.003)
        .round()
        .max(2.) as i32;
    let font_scale = (line_width as f64 / 3.).max(0.5);
    let font_thickness = (line_width - 1).max(1);

    for bbox in bboxes {
        let (r, g, b) = color_for(bbox.id());
        let color = Scalar::new(b as f64, g as f64, r as f64, 0.);
        let (x, y) = (bbox.xmin().round() as i32, bbox.ymin().round() as i32);
        let (w, h) = (bbox.width().round() as i32, bbox.height().round() as i32);

        // 绘制边框
        imgproc::rectangle(
            &mut annotated,
            Rect::new(x, y, w, h),
            color,
            line_width,
            imgproc::LINE_8,
            0,
        )?;

        // 绘制标签 (实心底色 + 文字)
        let label = label_for(bbox, names);
        let mut baseline = 0;
        let size = imgproc::get_text_size(
            &label,
            imgproc::FONT_HERSHEY_SIMPLEX,
            font_scale,
            font_thickness,
            &mut baseline,
        )?;
        let outside = y - size.height - 3 >= 0;
        let label_y = if outside { y - size.height - 3 } else { y };
        imgproc::rectangle(
            &mut annotated,
            Rect::new(x, label_y, size.width, size.height + 3),
            color,
            imgproc::FILLED,
            imgproc::LINE_AA,
            0,
        )?;
        let text_color = if (r as u32 + g as u32 + b as u32) > 382 {
            Scalar::new(0., 0., 0., 0.)
        } else {
            Scalar::new(255., 255., 255., 0.)
        };
        imgproc::put_text(
            &mut annotated,
            &label,
            Point::new(x, label_y + size.height + 1),
            imgproc::FONT_HERSHEY_SIMPLEX,
            font_scale,
            text_color,
            font_thickness,
            imgproc::LINE_AA,
            false,
        )?;
    }

    Ok(annotated)
}
