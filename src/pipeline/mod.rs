/// 摄像头检测主循环 (Capture Loop)
///
/// 单线程、同步阻塞, 每采集一帧推理一次:
/// - INIT:      按索引打开摄像头, 失败直接结束 (不重试)
/// - CAPTURING: 读帧 → 推理计时 → 绘制 → 叠加耗时/FPS → 显示 → 轮询按键
/// - STOPPED:   释放摄像头 (恰好一次) 并关闭窗口
pub mod detector;

#[cfg(test)]
pub(crate) mod fakes;

pub use detector::{Detector, YoloDetector};

use std::time::{Duration, Instant};

use anyhow::Result;

use crate::input::{CameraBackend, FrameSource};
use crate::renderer::{Canvas, Display, OVERLAY_ORIGIN};

/// 退出键
pub const QUIT_KEY: char = 'q';

/// 按键轮询间隔 (毫秒)
pub const KEY_POLL_MS: i32 = 1;

/// 循环结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// 摄像头无法打开, 未进入采集循环
    OpenFailed,
    /// 读帧失败
    CaptureFailed,
    /// 用户按下退出键
    QuitRequested,
}

/// 单次推理耗时
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceStats {
    elapsed: Duration,
}

impl InferenceStats {
    pub fn from_elapsed(elapsed: Duration) -> Self {
        Self { elapsed }
    }

    pub fn ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }

    /// 瞬时 FPS = 1 / 推理秒数; 耗时为 0 时为无穷大
    pub fn fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            1.0 / secs
        } else {
            f64::INFINITY
        }
    }

    pub fn overlay_text(&self) -> String {
        format!("Inference: {:.1}ms ({:.1} FPS)", self.ms(), self.fps())
    }
}

/// 只看低 8 位 (部分平台 wait_key 带修饰位)
pub fn is_quit_key(key: i32) -> bool {
    key >= 0 && (key & 0xFF) == QUIT_KEY as i32
}

/// 打开摄像头并运行检测循环, 直到读帧失败或按下退出键
pub fn run<C, F, D, W>(
    camera: &mut C,
    cam_id: i32,
    detector: &mut D,
    display: &mut W,
) -> Result<StopReason>
where
    C: CameraBackend,
    C::Source: FrameSource<Frame = F>,
    F: Canvas,
    D: Detector<F>,
    W: Display<F>,
{
    let Some(mut source) = camera.open(cam_id)? else {
        println!("Error: Could not open webcam with ID {}", cam_id);
        return Ok(StopReason::OpenFailed);
    };

    if let Some((width, height)) = source.resolution() {
        println!("📷 Webcam resolution: {}x{}", width, height);
    }
    println!("Press '{}' to quit", QUIT_KEY);

    let outcome = capture_loop(&mut source, detector, display);

    // 任何退出路径都先释放摄像头
    let released = source.release();
    let closed = display.close();
    println!("🛑 Webcam detection stopped");

    let reason = outcome?;
    released?;
    closed?;
    Ok(reason)
}

fn capture_loop<S, F, D, W>(source: &mut S, detector: &mut D, display: &mut W) -> Result<StopReason>
where
    S: FrameSource<Frame = F>,
    F: Canvas,
    D: Detector<F>,
    W: Display<F>,
{
    loop {
        let Some(frame) = source.read()? else {
            println!("Error: Failed to capture frame from webcam");
            return Ok(StopReason::CaptureFailed);
        };

        let t_infer = Instant::now();
        let result = detector.detect(&frame)?;
        let stats = InferenceStats::from_elapsed(t_infer.elapsed());

        let mut annotated = detector.plot(&frame, &result)?;
        annotated.put_text(&stats.overlay_text(), OVERLAY_ORIGIN)?;
        display.show(&annotated)?;

        if is_quit_key(display.wait_key(KEY_POLL_MS)?) {
            return Ok(StopReason::QuitRequested);
        }
    }
}
