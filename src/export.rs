//! 模型准备: .pt 权重 → 推理优化格式
//!
//! 转换本身由 Ultralytics 命令行完成 (`yolo export`), 这里只负责
//! 决定是否转换、转换结果放在哪里, 以及加载时找到真正的模型文件。

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;

/// 可训练权重文件扩展名
pub const WEIGHTS_EXTENSION: &str = "pt";

/// 转换目录后缀: `<stem>_openvino_model`
pub const EXPORT_DIR_SUFFIX: &str = "_openvino_model";

/// 外部模型转换器
#[cfg_attr(test, mockall::automock)]
pub trait Exporter {
    /// 把 `weights` 转换后写入 `target` 目录
    fn export(&self, weights: &Path, target: &Path) -> Result<()>;
}

/// 是否为可训练权重文件 (需要转换)
pub fn is_weights_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == WEIGHTS_EXTENSION)
}

/// 转换目录名只取决于权重文件名 (不含扩展名), 落在当前工作目录
pub fn export_dir_for(weights: &Path) -> PathBuf {
    let stem = weights
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    PathBuf::from(format!("{}{}", stem, EXPORT_DIR_SUFFIX))
}

/// 需要时转换模型, 返回可直接加载的模型路径
///
/// 非 .pt 路径原样返回, 不检查其内容 (加载时才会失败)。
pub fn prepare_model<E: Exporter + ?Sized>(model: &str, exporter: &E) -> Result<PathBuf> {
    let path = Path::new(model);
    if !is_weights_file(path) {
        return Ok(path.to_path_buf());
    }

    let export_path = export_dir_for(path);
    exporter.export(path, &export_path)?;
    Ok(export_path)
}

/// 找到转换目录中的 ONNX 文件; 普通文件直接返回
pub fn resolve_model_file(path: &Path) -> Result<PathBuf> {
    if !path.is_dir() {
        return Ok(path.to_path_buf());
    }

    let dir_name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = dir_name.strip_suffix(EXPORT_DIR_SUFFIX).unwrap_or(&dir_name);
    let preferred = path.join(format!("{}.onnx", stem));
    if preferred.is_file() {
        return Ok(preferred);
    }

    let mut candidates = fs::read_dir(path)
        .with_context(|| format!("Failed to read model directory {}", path.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "onnx"))
        .collect::<Vec<_>>();
    candidates.sort();
    if let Some(first) = candidates.into_iter().next() {
        return Ok(first);
    }

    if has_extension_in(path, "xml") {
        bail!(
            "No .onnx model found in {}: it looks like an OpenVINO IR export (.xml/.bin), \
             only ONNX models are supported; re-export with `yolo export format=onnx`",
            path.display()
        );
    }
    bail!("No .onnx model found in {}", path.display())
}

fn has_extension_in(dir: &Path, ext: &str) -> bool {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .any(|p| p.extension().is_some_and(|e| e == ext))
        })
        .unwrap_or(false)
}

/// 从 `yolo export` 的输出中找到 ONNX 文件位置
///
/// 权重不在当前目录时 Ultralytics 会从 `weights_dir` 加载, ONNX 写在那里;
/// 日志里的 `saved as '<path>'` 优先, 找不到时退回权重文件旁边。
pub fn exported_onnx_path(log: &str, weights: &Path) -> Option<PathBuf> {
    let re = Regex::new(r"saved as '([^']+\.onnx)'").ok()?;
    let from_log = re
        .captures_iter(log)
        .filter_map(|caps| caps.get(1).map(|m| PathBuf::from(m.as_str())))
        .filter(|p| p.is_file())
        .last();
    from_log.or_else(|| Some(weights.with_extension("onnx")).filter(|p| p.is_file()))
}

/// 调用 Ultralytics CLI 完成转换
pub struct UltralyticsExporter {
    bin: String,
    imgsz: u32,
}

impl UltralyticsExporter {
    pub fn new(bin: impl Into<String>, imgsz: u32) -> Self {
        Self {
            bin: bin.into(),
            imgsz,
        }
    }
}

impl Exporter for UltralyticsExporter {
    fn export(&self, weights: &Path, target: &Path) -> Result<()> {
        println!("📦 Loading YOLOv11 model from {}...", weights.display());
        println!(
            "🔄 Exporting model to OpenVINO format at {}/...",
            target.display()
        );

        let output = Command::new(&self.bin)
            .arg("export")
            .arg(format!("model={}", weights.display()))
            .arg("format=onnx")
            .arg(format!("imgsz={}", self.imgsz))
            .output()
            .with_context(|| format!("Failed to launch `{}`", self.bin))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        print!("{}", stdout);
        eprint!("{}", stderr);
        if !output.status.success() {
            bail!("`{} export` failed: {}", self.bin, output.status);
        }

        let stem = weights
            .file_stem()
            .ok_or_else(|| anyhow!("Invalid weights path {}", weights.display()))?;
        let produced = exported_onnx_path(&format!("{}\n{}", stdout, stderr), weights)
            .ok_or_else(|| {
                anyhow!(
                    "`{} export` succeeded but no {} was found",
                    self.bin,
                    Path::new(stem).with_extension("onnx").display()
                )
            })?;
        fs::create_dir_all(target)
            .with_context(|| format!("Failed to create {}", target.display()))?;
        let dest = target.join(Path::new(stem).with_extension("onnx"));
        move_file(&produced, &dest)?;

        println!("✅ 转换完成: {}", dest.display());
        Ok(())
    }
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    // 跨文件系统时 rename 会失败
    fs::copy(from, to)
        .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
    fs::remove_file(from).with_context(|| format!("Failed to remove {}", from.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pt_extension_is_weights() {
        assert!(is_weights_file(Path::new("yolo11s.pt")));
        assert!(is_weights_file(Path::new("models/foo.pt")));
        assert!(!is_weights_file(Path::new("yolo11s_openvino_model")));
        assert!(!is_weights_file(Path::new("yolo11s.onnx")));
        assert!(!is_weights_file(Path::new("yolo11s.pth")));
    }

    #[test]
    fn export_dir_uses_file_stem_only() {
        assert_eq!(
            export_dir_for(Path::new("weights/run1/yolo11s.pt")),
            PathBuf::from("yolo11s_openvino_model")
        );
    }

    #[test]
    fn weights_file_is_exported_once() {
        let mut exporter = MockExporter::new();
        exporter
            .expect_export()
            .withf(|weights, target| {
                weights == Path::new("foo.pt") && target == Path::new("foo_openvino_model")
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let path = prepare_model("foo.pt", &exporter).unwrap();
        assert_eq!(path, PathBuf::from("foo_openvino_model"));
    }

    #[test]
    fn converted_model_skips_export() {
        let mut exporter = MockExporter::new();
        exporter.expect_export().times(0);

        let path = prepare_model("foo_openvino_model", &exporter).unwrap();
        assert_eq!(path, PathBuf::from("foo_openvino_model"));
    }

    #[test]
    fn export_failure_propagates() {
        let mut exporter = MockExporter::new();
        exporter
            .expect_export()
            .times(1)
            .returning(|_, _| Err(anyhow!("yolo not installed")));

        let err = prepare_model("foo.pt", &exporter).unwrap_err();
        assert!(err.to_string().contains("yolo not installed"));
    }

    #[test]
    fn resolves_onnx_named_after_export_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("yolo11s_openvino_model");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("a.onnx"), b"").unwrap();
        fs::write(dir.join("yolo11s.onnx"), b"").unwrap();

        assert_eq!(resolve_model_file(&dir).unwrap(), dir.join("yolo11s.onnx"));
    }

    #[test]
    fn falls_back_to_first_onnx_in_dir() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("b.onnx"), b"").unwrap();
        fs::write(tmp.path().join("a.onnx"), b"").unwrap();
        fs::write(tmp.path().join("metadata.yaml"), b"").unwrap();

        assert_eq!(
            resolve_model_file(tmp.path()).unwrap(),
            tmp.path().join("a.onnx")
        );
    }

    #[test]
    fn dir_without_onnx_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(resolve_model_file(tmp.path()).is_err());
    }

    #[test]
    fn plain_file_path_is_used_as_is() {
        let path = Path::new("models/yolo11n.onnx");
        assert_eq!(resolve_model_file(path).unwrap(), path.to_path_buf());
    }

    #[test]
    fn openvino_ir_dir_is_reported_as_unsupported() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("yolo11s.xml"), b"").unwrap();
        fs::write(tmp.path().join("yolo11s.bin"), b"").unwrap();

        let err = resolve_model_file(tmp.path()).unwrap_err().to_string();
        assert!(err.contains("OpenVINO IR"), "{}", err);
        assert!(err.contains("only ONNX"), "{}", err);
    }

    #[test]
    fn export_log_path_wins_over_weights_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let saved = tmp.path().join("weights").join("foo.onnx");
        fs::create_dir_all(saved.parent().unwrap()).unwrap();
        fs::write(&saved, b"onnx").unwrap();
        let log = format!(
            "ONNX: export success ✅ 1.2s, saved as '{}' (36.2 MB)\n",
            saved.display()
        );

        let weights = tmp.path().join("foo.pt");
        assert_eq!(exported_onnx_path(&log, &weights), Some(saved));
        assert_eq!(exported_onnx_path("", &weights), None);
    }

    #[cfg(unix)]
    mod cli {
        use std::os::unix::fs::PermissionsExt;
        use std::sync::Mutex;

        use super::*;

        // 写脚本与执行脚本串行, 避免并发 fork 导致 ETXTBSY
        static SPAWN: Mutex<()> = Mutex::new(());

        fn export_with_script(dir: &Path, body: &str, weights: &Path, target: &Path) -> Result<()> {
            let _guard = SPAWN.lock().unwrap_or_else(|e| e.into_inner());
            let script = dir.join("yolo");
            fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

            UltralyticsExporter::new(script.to_string_lossy(), 320).export(weights, target)
        }

        #[test]
        fn onnx_beside_weights_is_moved_into_export_dir() {
            let tmp = tempfile::tempdir().unwrap();
            let weights = tmp.path().join("foo.pt");
            fs::write(&weights, b"pt").unwrap();
            let target = tmp.path().join("foo_openvino_model");

            // $2 = model=<weights>
            export_with_script(
                tmp.path(),
                r#"w="${2#model=}"; printf onnx > "${w%.pt}.onnx""#,
                &weights,
                &target,
            )
            .unwrap();

            assert_eq!(fs::read(target.join("foo.onnx")).unwrap(), b"onnx");
            assert!(!tmp.path().join("foo.onnx").exists());
            assert!(weights.exists());
        }

        #[test]
        fn onnx_reported_in_log_is_moved() {
            let tmp = tempfile::tempdir().unwrap();
            let weights = tmp.path().join("foo.pt");
            let elsewhere = tmp.path().join("weights_dir");
            fs::create_dir(&elsewhere).unwrap();
            let target = tmp.path().join("foo_openvino_model");

            let body = format!(
                "printf onnx > '{0}/foo.onnx'; echo \"ONNX: export success, saved as '{0}/foo.onnx' (1.0 MB)\"",
                elsewhere.display()
            );
            export_with_script(tmp.path(), &body, &weights, &target).unwrap();

            assert!(target.join("foo.onnx").is_file());
            assert!(!elsewhere.join("foo.onnx").exists());
        }

        #[test]
        fn non_zero_exit_carries_status() {
            let tmp = tempfile::tempdir().unwrap();
            let target = tmp.path().join("foo_openvino_model");

            let err = export_with_script(tmp.path(), "exit 3", &tmp.path().join("foo.pt"), &target)
                .unwrap_err()
                .to_string();

            assert!(err.contains("exit status: 3"), "{}", err);
            assert!(!target.exists());
        }

        #[test]
        fn missing_onnx_after_success_is_an_error() {
            let tmp = tempfile::tempdir().unwrap();
            let target = tmp.path().join("foo_openvino_model");

            let err = export_with_script(tmp.path(), "exit 0", &tmp.path().join("foo.pt"), &target)
                .unwrap_err()
                .to_string();

            assert!(err.contains("foo.onnx"), "{}", err);
            assert!(!target.join("foo.onnx").exists());
        }
    }

    #[test]
    fn move_file_relocates_and_fails_on_missing_source() {
        let tmp = tempfile::tempdir().unwrap();
        let from = tmp.path().join("foo.onnx");
        fs::write(&from, b"onnx").unwrap();
        let to = tmp.path().join("out").join("foo.onnx");
        fs::create_dir(to.parent().unwrap()).unwrap();

        move_file(&from, &to).unwrap();
        assert_eq!(fs::read(&to).unwrap(), b"onnx");
        assert!(!from.exists());

        // 源文件不存在: rename 与 copy 都失败
        assert!(move_file(&from, &tmp.path().join("again.onnx")).is_err());
    }
}
