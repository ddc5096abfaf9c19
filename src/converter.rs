use crate::config::{FFMPEG_COMMAND, FFMPEG_TIMEOUT};
use crate::error::ConversionError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// `ffmpeg -version` 的超時
const VERSION_TIMEOUT: Duration = Duration::from_secs(5);

/// 錯誤訊息只保留 stderr 最後幾行
const STDERR_TAIL_LINES: usize = 5;

/// 圖片轉檔器 trait（測試可替換成假的）
#[async_trait::async_trait]
pub trait ImageConverter: Send + Sync {
    /// 轉檔工具是否可用（第一次檢查後快取）
    fn is_available(&self) -> bool;

    /// 轉成指定格式，成功回傳新的 bytes
    async fn convert(&self, input: &[u8], format: &str, quality: u8) -> Result<Vec<u8>, ConversionError>;
}

/// 支援的輸出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    Webp,
    Png,
    Jpg,
    Jpeg,
}

impl TargetFormat {
    /// 不分大小寫，前後空白會被忽略
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "webp" => Some(Self::Webp),
            "png" => Some(Self::Png),
            "jpg" => Some(Self::Jpg),
            "jpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webp => "webp",
            Self::Png => "png",
            Self::Jpg => "jpg",
            Self::Jpeg => "jpeg",
        }
    }

    /// 儲存用副檔名（jpeg 統一成 .jpg）
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Webp => ".webp",
            Self::Png => ".png",
            Self::Jpg | Self::Jpeg => ".jpg",
        }
    }
}

/// 格式名稱對應的副檔名，不認得的一律 `.jpg`
pub fn format_extension(name: &str) -> &'static str {
    TargetFormat::parse(name).map_or(".jpg", |f| f.extension())
}

/// 各格式的品質參數（quality 為 0-100，越高越好）
pub fn encoder_args(format: TargetFormat, quality: u8) -> Vec<String> {
    let quality = quality.min(100);

    match format {
        TargetFormat::Webp => {
            let mut args = vec!["-quality".to_string(), quality.to_string()];
            if quality >= 100 {
                args.extend(["-lossless".to_string(), "1".to_string()]);
            }
            args
        }
        TargetFormat::Jpg | TargetFormat::Jpeg => {
            // ffmpeg 的 -q:v 是 1 (最好) 到 31 (最差)
            let scale = (f64::from(100 - quality) / 3.0).round().clamp(1.0, 31.0) as u8;
            vec!["-q:v".to_string(), scale.to_string()]
        }
        TargetFormat::Png => {
            // PNG 無損，品質改拿來當壓縮等級 0-9
            let level = (quality / 11).min(9);
            vec!["-compression_level".to_string(), level.to_string()]
        }
    }
}

/// 呼叫外部 ffmpeg 的轉檔器
pub struct FfmpegConverter {
    command: String,
    timeout: Duration,
    temp_root: Option<PathBuf>,
    resolved: OnceLock<Option<PathBuf>>,
}

impl Default for FfmpegConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegConverter {
    pub fn new() -> Self {
        Self::with_command(FFMPEG_COMMAND)
    }

    /// 指定執行檔名稱或路徑
    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: FFMPEG_TIMEOUT,
            temp_root: None,
            resolved: OnceLock::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 暫存目錄建立的位置（預設為系統 temp）
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    /// 找到的 ffmpeg 路徑；只在第一次呼叫時搜尋 PATH
    ///
    /// 之後才安裝的 ffmpeg 要重開程式才會被發現。
    pub fn path(&self) -> Option<&Path> {
        self.resolved
            .get_or_init(|| {
                let found = which::which(&self.command).ok();
                debug!(command = %self.command, found = ?found, "檢查 ffmpeg");
                found
            })
            .as_deref()
    }

    /// `ffmpeg -version` 的第一行
    pub async fn version(&self) -> Option<String> {
        let ffmpeg = self.path()?;

        let mut command = Command::new(ffmpeg);
        command.arg("-version").stdin(Stdio::null()).kill_on_drop(true);

        match tokio::time::timeout(VERSION_TIMEOUT, command.output()).await {
            Ok(Ok(output)) if output.status.success() => String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|line| line.trim().to_string()),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                warn!(error = %e, "無法取得 ffmpeg 版本");
                None
            }
            Err(_) => {
                warn!("取得 ffmpeg 版本逾時");
                None
            }
        }
    }

    /// 回傳 (是否可用, 說明文字)
    pub async fn check(&self) -> (bool, String) {
        if !self.is_available() {
            return (false, "系統 PATH 中找不到 FFmpeg".to_string());
        }

        match self.version().await {
            Some(version) => (true, format!("找到 FFmpeg: {}", version)),
            None => (true, "FFmpeg 可用".to_string()),
        }
    }

    async fn run_encoder(
        &self,
        ffmpeg: &Path,
        dir: &Path,
        input: &[u8],
        format: TargetFormat,
        quality: u8,
    ) -> Result<Vec<u8>, ConversionError> {
        let input_path = dir.join("input");
        tokio::fs::write(&input_path, input).await?;

        let output_path = dir.join(format!("output.{}", format.as_str()));

        let child = Command::new(ffmpeg)
            .arg("-i")
            .arg(&input_path)
            .arg("-y")
            .args(encoder_args(format, quality))
            .arg(&output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // 逾時時 future 被丟掉，kill_on_drop 會把子行程砍掉
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => return Err(ConversionError::TimedOut(self.timeout)),
        };

        if !output.status.success() {
            return Err(ConversionError::ProcessFailed {
                code: output.status.code(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        match tokio::fs::read(&output_path).await {
            Ok(bytes) if !bytes.is_empty() => Ok(bytes),
            Ok(_) => Err(ConversionError::NoOutput),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ConversionError::NoOutput),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait::async_trait]
impl ImageConverter for FfmpegConverter {
    fn is_available(&self) -> bool {
        self.path().is_some()
    }

    async fn convert(&self, input: &[u8], format: &str, quality: u8) -> Result<Vec<u8>, ConversionError> {
        let ffmpeg = self.path().ok_or(ConversionError::Unavailable)?;
        let target = TargetFormat::parse(format)
            .ok_or_else(|| ConversionError::UnsupportedFormat(format.to_string()))?;

        let mut builder = tempfile::Builder::new();
        builder.prefix("image_search_");
        let temp_dir = match &self.temp_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };

        let result = self
            .run_encoder(ffmpeg, temp_dir.path(), input, target, quality)
            .await;

        // 不管成功失敗都清掉暫存目錄，清不掉只記 log
        let temp_path = temp_dir.path().to_path_buf();
        if let Err(e) = temp_dir.close() {
            warn!(path = %temp_path.display(), error = %e, "無法刪除暫存目錄");
        }

        match &result {
            Ok(bytes) => debug!(format = target.as_str(), quality, size = bytes.len(), "轉檔完成"),
            Err(e) => debug!(format = target.as_str(), error = %e, "轉檔失敗"),
        }

        result
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();

    if lines.is_empty() {
        return "FFmpeg conversion failed".to_string();
    }

    lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n")
}
