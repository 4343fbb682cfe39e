use clap::Parser;

/// YOLOv11 摄像头实时检测 (OpenVINO)
#[derive(Parser, Clone, Debug)]
#[command(author, version, about = "YOLOv11 webcam detection with OpenVINO", long_about = None)]
pub struct Args {
    /// 模型路径或名称 (.pt 会先转换)
    #[arg(long, default_value = "yolo11s.pt")]
    pub model: String,

    /// 推理设备: 'intel:cpu', 'intel:gpu', 'intel:npu'
    #[arg(long, default_value = "intel:cpu")]
    pub device: String,

    /// 置信度阈值
    #[arg(long, default_value_t = 0.25)]
    pub conf: f32,

    /// 摄像头设备ID
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub cam_id: i32,

    /// 只转换模型, 不运行推理
    #[arg(long)]
    pub export_only: bool,

    /// NMS IoU 阈值
    #[arg(long, default_value_t = 0.7)]
    pub iou: f32,

    /// 转换尺寸 (模型元数据缺少 imgsz 时也作为推理尺寸)
    #[arg(long, default_value_t = 640)]
    pub imgsz: u32,

    /// Ultralytics 命令行工具
    #[arg(long, default_value = "yolo")]
    pub yolo_bin: String,
}
