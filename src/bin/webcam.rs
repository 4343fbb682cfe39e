/// YOLOv11 摄像头实时检测 (OpenVINO)
///
/// 流程:
/// 1. .pt 权重先转换为 `<name>_openvino_model/`
/// 2. 打开摄像头, 逐帧推理并显示检测框与推理耗时
/// 3. 按 'q' 退出
use clap::Parser;
use yolo11_openvino_rs::input::OpenCvCamera;
use yolo11_openvino_rs::pipeline::YoloDetector;
use yolo11_openvino_rs::renderer::HighGuiWindow;
use yolo11_openvino_rs::{app, Args, UltralyticsExporter};

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let exporter = UltralyticsExporter::new(args.yolo_bin.clone(), args.imgsz);
    let mut camera = OpenCvCamera;
    let mut window = HighGuiWindow::default();

    app::run(&args, &exporter, &mut camera, YoloDetector::load, &mut window)?;
    Ok(())
}
