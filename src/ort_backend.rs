// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// ONNX Runtime 推理后端
// intel:* 设备走 OpenVINO Execution Provider

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use ndarray::{Array, IxDyn};
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch,
    OpenVINOExecutionProvider,
};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use regex::Regex;

/// 默认推理尺寸 (模型元数据缺失时)
pub const DEFAULT_IMGSZ: u32 = 640;

/// 推理设备 (Execution Provider)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrtEP {
    CPU,
    CUDA(i32),
    /// OpenVINO device_type: CPU / GPU / NPU
    OpenVINO(String),
}

impl OrtEP {
    /// 解析 `--device`: intel:cpu / intel:gpu / intel:npu / cpu / cuda[:N]
    pub fn from_device(device: &str) -> Result<Self> {
        let device = device.trim().to_ascii_lowercase();
        match device.as_str() {
            "cpu" => Ok(OrtEP::CPU),
            "cuda" => Ok(OrtEP::CUDA(0)),
            _ => {
                if let Some(target) = device.strip_prefix("intel:") {
                    match target {
                        "cpu" | "gpu" | "npu" => Ok(OrtEP::OpenVINO(target.to_ascii_uppercase())),
                        _ => bail!("Unsupported OpenVINO device: {}", device),
                    }
                } else if let Some(id) = device.strip_prefix("cuda:") {
                    let id = id
                        .parse::<i32>()
                        .with_context(|| format!("Invalid CUDA device id: {}", id))?;
                    Ok(OrtEP::CUDA(id))
                } else {
                    bail!(
                        "Unsupported device: {} (expected intel:cpu, intel:gpu, intel:npu)",
                        device
                    )
                }
            }
        }
    }

    fn dispatch(&self) -> ExecutionProviderDispatch {
        match self {
            OrtEP::CPU => CPUExecutionProvider::default().build(),
            OrtEP::CUDA(id) => CUDAExecutionProvider::default().with_device_id(*id).build(),
            OrtEP::OpenVINO(device_type) => OpenVINOExecutionProvider::default()
                .with_device_type(device_type.clone())
                .build(),
        }
    }
}

#[derive(Debug)]
pub struct OrtConfig {
    pub f: PathBuf,
    pub ep: OrtEP,
    /// 元数据中没有 imgsz 时使用
    pub image_size: (u32, u32),
}

pub struct OrtBackend {
    session: Session,
    ep: OrtEP,
    input_name: String,
    output_name: String,
    height: u32,
    width: u32,
    names: Option<Vec<String>>,
    author: Option<String>,
    version: Option<String>,
}

impl OrtBackend {
    pub fn build(args: OrtConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_execution_providers([args.ep.dispatch()])?
            .commit_from_file(&args.f)
            .with_context(|| format!("Failed to load model {}", args.f.display()))?;

        let input_name = match session.inputs.first() {
            Some(input) => input.name.clone(),
            None => bail!("Model {} has no inputs", args.f.display()),
        };
        let output_name = match session.outputs.first() {
            Some(output) => output.name.clone(),
            None => bail!("Model {} has no outputs", args.f.display()),
        };

        // Ultralytics 导出的元数据
        let metadata = session.metadata()?;
        let names = metadata.custom("names")?.map(|s| parse_names(&s));
        let (height, width) = metadata
            .custom("imgsz")?
            .and_then(|s| parse_imgsz(&s))
            .unwrap_or(args.image_size);
        let author = metadata.custom("author")?;
        let version = metadata.custom("version")?;

        Ok(Self {
            session,
            ep: args.ep,
            input_name,
            output_name,
            height,
            width,
            names,
            author,
            version,
        })
    }

    pub fn run(&mut self, xs: Array<f32, IxDyn>) -> Result<Vec<Array<f32, IxDyn>>> {
        let ys = self
            .session
            .run(ort::inputs![self.input_name.as_str() => xs.view()]?)?;
        let y = ys[self.output_name.as_str()]
            .try_extract_tensor::<f32>()?
            .into_owned();
        Ok(vec![y])
    }

    pub fn ep(&self) -> &OrtEP {
        &self.ep
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn names(&self) -> Option<Vec<String>> {
        self.names.clone()
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

/// 解析 `{0: 'person', 1: 'bicycle', ...}`
pub fn parse_names(s: &str) -> Vec<String> {
    let re = Regex::new(r#"(\d+):\s*['"]([^'"]*)['"]"#).expect("valid regex");
    let mut pairs = re
        .captures_iter(s)
        .filter_map(|c| Some((c[1].parse::<usize>().ok()?, c[2].to_string())))
        .collect::<Vec<_>>();
    pairs.sort_by_key(|(id, _)| *id);
    pairs.into_iter().map(|(_, name)| name).collect()
}

/// 解析 `[640, 640]` → (height, width)
pub fn parse_imgsz(s: &str) -> Option<(u32, u32)> {
    let dims: Vec<u32> = serde_json::from_str(s).ok()?;
    match dims.as_slice() {
        [h, w] => Some((*h, *w)),
        [s] => Some((*s, *s)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intel_devices_map_to_openvino() {
        assert_eq!(
            OrtEP::from_device("intel:cpu").unwrap(),
            OrtEP::OpenVINO("CPU".into())
        );
        assert_eq!(
            OrtEP::from_device("intel:gpu").unwrap(),
            OrtEP::OpenVINO("GPU".into())
        );
        assert_eq!(
            OrtEP::from_device("INTEL:NPU").unwrap(),
            OrtEP::OpenVINO("NPU".into())
        );
    }

    #[test]
    fn plain_cpu_and_cuda_devices() {
        assert_eq!(OrtEP::from_device("cpu").unwrap(), OrtEP::CPU);
        assert_eq!(OrtEP::from_device("cuda").unwrap(), OrtEP::CUDA(0));
        assert_eq!(OrtEP::from_device("cuda:1").unwrap(), OrtEP::CUDA(1));
    }

    #[test]
    fn unknown_device_is_rejected() {
        assert!(OrtEP::from_device("intel:tpu").is_err());
        assert!(OrtEP::from_device("mps").is_err());
        assert!(OrtEP::from_device("cuda:x").is_err());
    }

    #[test]
    fn names_are_ordered_by_class_id() {
        let names = parse_names("{1: 'bicycle', 0: 'person', 2: \"traffic light\"}");
        assert_eq!(names, vec!["person", "bicycle", "traffic light"]);
    }

    #[test]
    fn imgsz_metadata() {
        assert_eq!(parse_imgsz("[640, 640]"), Some((640, 640)));
        assert_eq!(parse_imgsz("[480, 640]"), Some((480, 640)));
        assert_eq!(parse_imgsz("[320]"), Some((320, 320)));
        assert_eq!(parse_imgsz("oops"), None);
    }
}
