//! 测试替身: 摄像头 / 检测器 / 窗口

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use anyhow::{anyhow, Result};

use super::Detector;
use crate::input::{CameraBackend, FrameSource};
use crate::renderer::{Canvas, Display};
use crate::DetectionResult;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FakeFrame {
    pub id: usize,
    pub plotted: bool,
    pub texts: Vec<(String, (i32, i32))>,
}

impl Canvas for FakeFrame {
    fn put_text(&mut self, text: &str, org: (i32, i32)) -> Result<()> {
        self.texts.push((text.to_string(), org));
        Ok(())
    }
}

/// `frames` 帧之后读取失败; `None` 表示打不开
pub struct FakeCamera {
    frames: Option<usize>,
    opens: usize,
    releases: Rc<Cell<usize>>,
}

impl FakeCamera {
    pub fn with_frames(frames: usize) -> Self {
        Self {
            frames: Some(frames),
            opens: 0,
            releases: Rc::new(Cell::new(0)),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            frames: None,
            opens: 0,
            releases: Rc::new(Cell::new(0)),
        }
    }

    pub fn opens(&self) -> usize {
        self.opens
    }

    pub fn releases(&self) -> usize {
        self.releases.get()
    }
}

impl CameraBackend for FakeCamera {
    type Source = FakeSource;

    fn open(&mut self, _index: i32) -> Result<Option<FakeSource>> {
        self.opens += 1;
        Ok(self.frames.map(|remaining| FakeSource {
            remaining,
            next_id: 0,
            releases: Rc::clone(&self.releases),
        }))
    }
}

pub struct FakeSource {
    remaining: usize,
    next_id: usize,
    releases: Rc<Cell<usize>>,
}

impl FrameSource for FakeSource {
    type Frame = FakeFrame;

    fn read(&mut self) -> Result<Option<FakeFrame>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        self.next_id += 1;
        Ok(Some(FakeFrame {
            id: self.next_id,
            ..Default::default()
        }))
    }

    fn release(&mut self) -> Result<()> {
        self.releases.set(self.releases.get() + 1);
        Ok(())
    }

    fn resolution(&self) -> Option<(u32, u32)> {
        Some((640, 480))
    }
}

#[derive(Debug, Default)]
pub struct FakeDetector {
    pub calls: usize,
    fail_at: Option<usize>,
}

impl FakeDetector {
    /// 第 `call` 次推理返回错误
    pub fn failing_at(call: usize) -> Self {
        Self {
            calls: 0,
            fail_at: Some(call),
        }
    }
}

impl Detector<FakeFrame> for FakeDetector {
    fn detect(&mut self, _frame: &FakeFrame) -> Result<DetectionResult> {
        self.calls += 1;
        if self.fail_at == Some(self.calls) {
            return Err(anyhow!("inference failed"));
        }
        Ok(DetectionResult::default())
    }

    fn plot(&self, frame: &FakeFrame, _result: &DetectionResult) -> Result<FakeFrame> {
        Ok(FakeFrame {
            plotted: true,
            ..frame.clone()
        })
    }
}

#[derive(Debug, Default)]
pub struct FakeDisplay {
    pub shown: Vec<FakeFrame>,
    pub key_polls: usize,
    pub closed: usize,
    keys: VecDeque<i32>,
}

impl FakeDisplay {
    pub fn with_keys(keys: impl IntoIterator<Item = i32>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
            ..Default::default()
        }
    }
}

impl Display<FakeFrame> for FakeDisplay {
    fn show(&mut self, frame: &FakeFrame) -> Result<()> {
        self.shown.push(frame.clone());
        Ok(())
    }

    fn wait_key(&mut self, _delay_ms: i32) -> Result<i32> {
        self.key_polls += 1;
        Ok(self.keys.pop_front().unwrap_or(-1))
    }

    fn close(&mut self) -> Result<()> {
        self.closed += 1;
        Ok(())
    }
}
