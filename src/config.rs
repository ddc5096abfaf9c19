use serde::{Deserialize, Serialize};
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// 搜尋頁面的固定 endpoint
pub const GOOGLE_IMAGE_SEARCH_URL: &str = "https://www.google.com/search";
/// 簡化過的 UA，Google udm=2 比較吃這個
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
/// HTTP 請求超時
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// 單張圖片大小上限 (5MB)
pub const MAX_IMAGE_SIZE: u64 = 5 * 1024 * 1024;
/// ffmpeg 轉檔超時
pub const FFMPEG_TIMEOUT: Duration = Duration::from_secs(30);
pub const FFMPEG_COMMAND: &str = "ffmpeg";
/// 從 URL 認得的副檔名
pub const SUPPORTED_IMAGE_FORMATS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp"];

pub const DEFAULT_SEARCH_FIELD: &str = "Word";
pub const DEFAULT_TARGET_FIELD: &str = "Picture";
pub const DEFAULT_MAX_RESULTS: usize = 20;
pub const DEFAULT_FFMPEG_QUALITY: i64 = 80;
pub const CONFIG_FILE_NAME: &str = "config.json";

/// 預覽縮圖品質
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageQuality {
    Low,
    #[default]
    Medium,
    High,
}

/// 輸出格式（original 代表不轉檔）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Original,
    Webp,
    Png,
    Jpg,
    Jpeg,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Original => "original",
            OutputFormat::Webp => "webp",
            OutputFormat::Png => "png",
            OutputFormat::Jpg => "jpg",
            OutputFormat::Jpeg => "jpeg",
        }
    }
}

/// 單一筆記類型的欄位設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteTypeTemplate {
    pub note_type_name: String,
    pub search_field: String,
    pub target_field: String,
    pub enabled: bool,
}

impl Default for NoteTypeTemplate {
    fn default() -> Self {
        Self {
            note_type_name: String::new(),
            search_field: DEFAULT_SEARCH_FIELD.to_string(),
            target_field: DEFAULT_TARGET_FIELD.to_string(),
            enabled: true,
        }
    }
}

/// 外掛設定（對應 config.json）
///
/// 缺少的 key 一律用預設值補上。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub enabled: bool,
    /// 介面語言，核心不使用，只是原樣保留
    pub language: String,
    /// 預設搜尋欄位
    pub search_field: String,
    /// 預設插入欄位
    pub target_field: String,
    pub note_type_templates: Vec<NoteTypeTemplate>,
    pub use_note_type_templates: bool,
    /// 最多顯示幾張結果
    pub max_results: usize,
    pub auto_download: bool,
    pub image_quality: ImageQuality,
    /// 是否用 ffmpeg 轉檔
    pub convert_format: bool,
    pub output_format: OutputFormat,
    /// 0-100，越高越好
    pub ffmpeg_quality: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            language: "auto".to_string(),
            search_field: DEFAULT_SEARCH_FIELD.to_string(),
            target_field: DEFAULT_TARGET_FIELD.to_string(),
            note_type_templates: Vec::new(),
            use_note_type_templates: true,
            max_results: DEFAULT_MAX_RESULTS,
            auto_download: true,
            image_quality: ImageQuality::default(),
            convert_format: false,
            output_format: OutputFormat::default(),
            ffmpeg_quality: DEFAULT_FFMPEG_QUALITY,
        }
    }
}

impl AppConfig {
    /// 是否需要轉檔（開關打開且格式不是 original）
    pub fn wants_conversion(&self) -> bool {
        self.convert_format && self.output_format != OutputFormat::Original
    }

    /// 限制在 0-100 的轉檔品質
    pub fn quality(&self) -> u8 {
        self.ffmpeg_quality.clamp(0, 100) as u8
    }

    /// 取得某個筆記類型的 (搜尋欄位, 插入欄位)
    pub fn fields_for_note_type(&self, note_type_name: &str) -> (&str, &str) {
        if self.use_note_type_templates {
            let template = self
                .note_type_templates
                .iter()
                .find(|t| t.enabled && t.note_type_name == note_type_name);

            if let Some(t) = template {
                return (t.search_field.as_str(), t.target_field.as_str());
            }
        }

        (self.search_field.as_str(), self.target_field.as_str())
    }
}

/// config.json 讀寫
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(CONFIG_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 讀取設定
    ///
    /// 檔案不存在時寫出預設值；檔案壞掉時回傳預設值（不覆蓋原檔）。
    pub fn load(&self) -> Result<AppConfig> {
        if !self.path.exists() {
            let config = AppConfig::default();
            self.save(&config)?;
            info!(path = %self.path.display(), "建立預設設定檔");
            return Ok(config);
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("無法讀取 {}", self.path.display()))?;

        match serde_json::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "設定檔解析失敗，使用預設值");
                Ok(AppConfig::default())
            }
        }
    }

    /// 儲存設定（原子性寫入）
    pub fn save(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("無法建立設定目錄")?;
        }

        let temp_path = self.path.with_extension("json.tmp");

        let file = File::create(&temp_path)
            .context("無法建立暫存檔")?;

        serde_json::to_writer_pretty(file, config)
            .context("無法寫入 config.json")?;

        fs::rename(&temp_path, &self.path)
            .context("無法更新 config.json")?;

        Ok(())
    }
}
