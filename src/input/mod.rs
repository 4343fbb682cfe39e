/// 视频输入系统 (Video Input System)
///
/// - CameraBackend: 按索引打开本地摄像头
/// - FrameSource:   已打开的采集句柄, 逐帧读取, 退出时释放
pub mod camera;

pub use camera::{CameraBackend, FrameSource, OpenCvCamera, OpenCvCapture};
