//! FFmpeg capability and GPU detection.
//!
//! Probes the configured FFmpeg binary for its version, hardware
//! acceleration methods, and encoder list, and pairs that with a GPU
//! vendor check (nvidia-smi / lspci / wmic) to decide which encode
//! modes this machine can actually use.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use super::error::EngineError;
use super::types::EncodeMode;

/// Detected GPU vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuVendor {
    #[default]
    Unknown,
    Nvidia,
    Amd,
}

/// What the configured FFmpeg build and the local GPU support.
#[derive(Debug, Clone)]
pub struct CapabilityReport {
    pub ffmpeg_version: String,
    /// An h264/hevc/av1 NVENC encoder is compiled in.
    pub nvenc: bool,
    /// An h264/hevc/av1 AMF encoder is compiled in.
    pub amf: bool,
    pub hwaccel_cuda: bool,
    pub hwaccel_opencl: bool,
    pub hwaccel_d3d11va: bool,
    pub vendor: GpuVendor,
    pub gpu_model: Option<String>,
}

impl CapabilityReport {
    /// Whether a job in `mode` has the encoder it needs. GPU presence is
    /// deliberately not required here; a missing or broken device surfaces
    /// at encode time and triggers the CPU fallback.
    pub fn supports(&self, mode: EncodeMode) -> bool {
        match mode {
            EncodeMode::Cpu => true,
            EncodeMode::NvencCuda => self.nvenc,
            EncodeMode::AmdAmf => self.amf,
        }
    }

    /// Best mode for this machine: NVIDIA with NVENC and CUDA decode,
    /// then AMD with AMF, then CPU.
    pub fn recommended_mode(&self) -> EncodeMode {
        match self.vendor {
            GpuVendor::Nvidia if self.nvenc && self.hwaccel_cuda => EncodeMode::NvencCuda,
            GpuVendor::Amd if self.amf => EncodeMode::AmdAmf,
            _ => EncodeMode::Cpu,
        }
    }

    pub fn supported_modes(&self) -> Vec<EncodeMode> {
        [EncodeMode::Cpu, EncodeMode::NvencCuda, EncodeMode::AmdAmf]
            .into_iter()
            .filter(|m| self.supports(*m))
            .collect()
    }
}

/// Probe the FFmpeg binary at `ffmpeg` and the local GPU.
pub fn probe(ffmpeg: &Path) -> Result<CapabilityReport, EngineError> {
    let version_out = run_capture(ffmpeg, &["-version"])?;
    let ffmpeg_version = parse_version(&version_out)
        .ok_or_else(|| EngineError::Probe("unrecognized `ffmpeg -version` output".to_string()))?;

    let hwaccels_out = run_capture(ffmpeg, &["-hide_banner", "-hwaccels"])?;
    let encoders_out = run_capture(ffmpeg, &["-hide_banner", "-encoders"])?;

    let (vendor, gpu_model) = detect_gpu();
    let report = build_report(
        ffmpeg_version,
        &hwaccels_out,
        &encoders_out,
        vendor,
        gpu_model,
    );
    debug!(
        version = %report.ffmpeg_version,
        nvenc = report.nvenc,
        amf = report.amf,
        vendor = ?report.vendor,
        "capability probe complete"
    );
    Ok(report)
}

/// Assemble a report from already-captured probe output.
pub fn build_report(
    ffmpeg_version: String,
    hwaccels_out: &str,
    encoders_out: &str,
    vendor: GpuVendor,
    gpu_model: Option<String>,
) -> CapabilityReport {
    CapabilityReport {
        ffmpeg_version,
        nvenc: has_any_encoder(encoders_out, &["h264_nvenc", "hevc_nvenc", "av1_nvenc"]),
        amf: has_any_encoder(encoders_out, &["h264_amf", "hevc_amf", "av1_amf"]),
        hwaccel_cuda: has_hwaccel(hwaccels_out, "cuda"),
        hwaccel_opencl: has_hwaccel(hwaccels_out, "opencl"),
        hwaccel_d3d11va: has_hwaccel(hwaccels_out, "d3d11va"),
        vendor,
        gpu_model,
    }
}

fn run_capture(program: &Path, args: &[&str]) -> Result<String, EngineError> {
    let output = Command::new(program).args(args).output().map_err(|e| {
        if matches!(
            e.kind(),
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
        ) {
            EngineError::ToolNotFound {
                path: program.to_path_buf(),
                source: e,
            }
        } else {
            EngineError::Spawn {
                program: program.to_path_buf(),
                source: e,
            }
        }
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(EngineError::Probe(format!(
            "'{}' {} exited with {}: {}",
            program.display(),
            args.join(" "),
            output.status,
            stderr.lines().next().unwrap_or("").trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// First version token from `ffmpeg -version`, e.g. "6.1.1".
pub fn parse_version(output: &str) -> Option<String> {
    let first = output.lines().next()?;
    let rest = first.strip_prefix("ffmpeg version ")?;
    let token = rest.split_whitespace().next()?;
    Some(token.to_string())
}

fn has_any_encoder(encoders_out: &str, names: &[&str]) -> bool {
    names.iter().any(|n| encoders_out.contains(n))
}

/// `-hwaccels` prints one method name per line after a header.
fn has_hwaccel(hwaccels_out: &str, name: &str) -> bool {
    hwaccels_out.lines().any(|l| l.trim() == name)
}

/// Detect NVIDIA GPU using nvidia-smi
pub fn detect_nvidia_gpu() -> Option<String> {
    let output = Command::new("nvidia-smi")
        .args(["--query-gpu=name", "--format=csv,noheader"])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let name = stdout.lines().next()?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Detect the primary GPU vendor and model.
pub fn detect_gpu() -> (GpuVendor, Option<String>) {
    // nvidia-smi is the most specific signal, try it first
    if let Some(model) = detect_nvidia_gpu() {
        return (GpuVendor::Nvidia, Some(model));
    }

    if cfg!(target_os = "windows") {
        if let Some(listing) = wmic_gpu_listing() {
            return vendor_from_listing(&listing);
        }
    } else if let Some(listing) = lspci_listing() {
        return vendor_from_listing(&listing);
    }

    (GpuVendor::Unknown, None)
}

fn lspci_listing() -> Option<String> {
    let output = Command::new("lspci").output().ok()?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout
        .lines()
        .filter(|l| l.contains("VGA") || l.contains("3D controller") || l.contains("Display"))
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn wmic_gpu_listing() -> Option<String> {
    let output = Command::new("wmic")
        .args(["path", "win32_VideoController", "get", "name"])
        .output()
        .ok()?;
    Some(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Classify a GPU listing (lspci or wmic output) by vendor keywords.
pub fn vendor_from_listing(listing: &str) -> (GpuVendor, Option<String>) {
    for line in listing.lines() {
        let lower = line.to_lowercase();
        if lower.contains("nvidia") || lower.contains("geforce") || lower.contains("quadro") {
            return (GpuVendor::Nvidia, model_from_line(line));
        }
        if lower.contains("amd") || lower.contains("radeon") || lower.contains("ati ") {
            return (GpuVendor::Amd, model_from_line(line));
        }
    }
    (GpuVendor::Unknown, None)
}

/// lspci lines read `01:00.0 VGA compatible controller: <model>`; keep
/// the part after the last colon. wmic lines are already bare names.
fn model_from_line(line: &str) -> Option<String> {
    let model = line.rsplit(':').next()?.trim();
    if model.is_empty() {
        None
    } else {
        Some(model.to_string())
    }
}

/// Default ffmpeg program name when no path is configured.
pub fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENCODERS_AMF_ONLY: &str = "\
Encoders:
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC (codec h264)
 V....D h264_amf             AMD AMF H.264 Encoder (codec h264)
 V....D hevc_amf             AMD AMF HEVC encoder (codec hevc)
";

    const ENCODERS_NVENC: &str = "\
Encoders:
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC (codec h264)
 V....D h264_nvenc           NVIDIA NVENC H.264 encoder (codec h264)
 V....D av1_nvenc            NVIDIA NVENC av1 encoder (codec av1)
";

    const HWACCELS: &str = "\
Hardware acceleration methods:
cuda
vaapi
opencl
";

    #[test]
    fn amf_only_build_reports_amd_supported_and_cuda_not() {
        let report = build_report(
            "6.1.1".to_string(),
            HWACCELS,
            ENCODERS_AMF_ONLY,
            GpuVendor::Amd,
            Some("Radeon RX 7800 XT".to_string()),
        );
        assert!(report.supports(EncodeMode::AmdAmf));
        assert!(!report.supports(EncodeMode::NvencCuda));
        assert!(report.supports(EncodeMode::Cpu));
        assert_eq!(report.recommended_mode(), EncodeMode::AmdAmf);
    }

    #[test]
    fn nvenc_build_with_nvidia_gpu_recommends_cuda() {
        let report = build_report(
            "7.0".to_string(),
            HWACCELS,
            ENCODERS_NVENC,
            GpuVendor::Nvidia,
            Some("NVIDIA GeForce RTX 4070".to_string()),
        );
        assert!(report.nvenc);
        assert!(report.hwaccel_cuda);
        assert_eq!(report.recommended_mode(), EncodeMode::NvencCuda);
    }

    #[test]
    fn nvenc_build_without_gpu_recommends_cpu() {
        let report = build_report(
            "7.0".to_string(),
            HWACCELS,
            ENCODERS_NVENC,
            GpuVendor::Unknown,
            None,
        );
        assert!(report.nvenc);
        assert_eq!(report.recommended_mode(), EncodeMode::Cpu);
    }

    #[test]
    fn hwaccel_match_is_exact_per_line() {
        assert!(has_hwaccel(HWACCELS, "cuda"));
        assert!(!has_hwaccel(HWACCELS, "cud"));
        assert!(!has_hwaccel(HWACCELS, "d3d11va"));
    }

    #[test]
    fn version_line_parses() {
        let out = "ffmpeg version 6.1.1-3ubuntu5 Copyright (c) 2000-2023 the FFmpeg developers\n";
        assert_eq!(parse_version(out).as_deref(), Some("6.1.1-3ubuntu5"));
        assert_eq!(parse_version("garbage"), None);
    }

    #[test]
    fn vendor_classification_from_lspci_lines() {
        let (vendor, model) = vendor_from_listing(
            "01:00.0 VGA compatible controller: NVIDIA Corporation AD104 [GeForce RTX 4070]",
        );
        assert_eq!(vendor, GpuVendor::Nvidia);
        assert!(model.unwrap().contains("GeForce"));

        let (vendor, _) = vendor_from_listing(
            "03:00.0 VGA compatible controller: Advanced Micro Devices, Inc. [AMD/ATI] Navi 32",
        );
        assert_eq!(vendor, GpuVendor::Amd);

        let (vendor, model) = vendor_from_listing("00:02.0 VGA compatible controller: Intel UHD");
        assert_eq!(vendor, GpuVendor::Unknown);
        assert_eq!(model, None);
    }
}
