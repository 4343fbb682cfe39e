//! 摄像头输入模块
//!
//! 基于 OpenCV VideoCapture, 平台后端 (DirectShow / AVFoundation / V4L2) 由 CAP_ANY 自动选择

use anyhow::Result;
use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture};

/// 已打开的采集句柄
pub trait FrameSource {
    type Frame;

    /// 读取一帧; `None` 表示读取失败 (断开 / 流结束)
    fn read(&mut self) -> Result<Option<Self::Frame>>;

    /// 释放设备
    fn release(&mut self) -> Result<()>;

    /// 采集分辨率 (宽, 高)
    fn resolution(&self) -> Option<(u32, u32)> {
        None
    }
}

/// 摄像头打开入口
pub trait CameraBackend {
    type Source: FrameSource;

    /// 按索引打开; `None` 表示无法打开 (不存在 / 被占用 / 无权限 统一处理)
    fn open(&mut self, index: i32) -> Result<Option<Self::Source>>;
}

/// OpenCV 摄像头
#[derive(Debug, Default)]
pub struct OpenCvCamera;

impl CameraBackend for OpenCvCamera {
    type Source = OpenCvCapture;

    fn open(&mut self, index: i32) -> Result<Option<OpenCvCapture>> {
        // OpenCV 把 -1 当作"任意摄像头", 这里负数一律视为打开失败
        if index < 0 {
            return Ok(None);
        }

        let cap = match VideoCapture::new(index, videoio::CAP_ANY) {
            Ok(cap) => cap,
            Err(e) => {
                eprintln!("⚠️ VideoCapture 创建失败: {}", e);
                return Ok(None);
            }
        };
        if !cap.is_opened().unwrap_or(false) {
            return Ok(None);
        }

        Ok(Some(OpenCvCapture { cap }))
    }
}

/// OpenCV 采集句柄
pub struct OpenCvCapture {
    cap: VideoCapture,
}

impl FrameSource for OpenCvCapture {
    type Frame = Mat;

    fn read(&mut self) -> Result<Option<Mat>> {
        let mut frame = Mat::default();
        match self.cap.read(&mut frame) {
            Ok(true) if frame.rows() > 0 && frame.cols() > 0 => Ok(Some(frame)),
            Ok(_) => Ok(None),
            Err(e) => {
                eprintln!("⚠️ 摄像头读取错误: {}", e);
                Ok(None)
            }
        }
    }

    fn release(&mut self) -> Result<()> {
        self.cap.release()?;
        Ok(())
    }

    fn resolution(&self) -> Option<(u32, u32)> {
        let width = self.cap.get(videoio::CAP_PROP_FRAME_WIDTH).ok()?;
        let height = self.cap.get(videoio::CAP_PROP_FRAME_HEIGHT).ok()?;
        Some((width as u32, height as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_index_never_opens() {
        let mut camera = OpenCvCamera;
        assert!(camera.open(-1).unwrap().is_none());
        assert!(camera.open(-7).unwrap().is_none());
    }
}
