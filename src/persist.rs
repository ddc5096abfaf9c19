use crate::config::{AppConfig, OutputFormat, SUPPORTED_IMAGE_FORMATS};
use crate::converter::{format_extension, ImageConverter};
use crate::error::PersistError;
use crate::media::MediaStore;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// 檔名前綴
pub const FILENAME_PREFIX: &str = "image_search_";
/// 找不到任何線索時的副檔名
const FALLBACK_EXTENSION: &str = ".jpg";
/// URL 雜湊保留的長度
const HASH_LEN: usize = 12;

/// 儲存結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedImage {
    /// 媒體資料夾內的檔名
    pub filename: String,
    /// 實際寫入的 bytes 數
    pub size_bytes: usize,
    /// 是否使用了轉檔後的資料
    pub converted: bool,
}

/// 負責轉檔、命名與寫入媒體資料夾
#[derive(Clone)]
pub struct ImagePersister {
    converter: Arc<dyn ImageConverter>,
    store: Arc<dyn MediaStore>,
}

impl ImagePersister {
    pub fn new(converter: Arc<dyn ImageConverter>, store: Arc<dyn MediaStore>) -> Self {
        Self { converter, store }
    }

    /// 儲存圖片並回傳檔名
    ///
    /// 順序固定：轉檔 → 決定副檔名 → 產生檔名 → 寫入。
    /// 轉檔失敗不算錯誤，會用原始資料繼續；只有寫入失敗才回傳 `Err`。
    pub async fn save_image(
        &self,
        bytes: Vec<u8>,
        origin_url: &str,
        config: &AppConfig,
    ) -> Result<PersistedImage, PersistError> {
        let mut data = bytes;
        let mut converted = false;

        if config.wants_conversion() {
            let format = config.output_format;

            if self.converter.is_available() {
                match self.converter.convert(&data, format.as_str(), config.quality()).await {
                    Ok(output) => {
                        info!(format = format.as_str(), "已用 ffmpeg 轉檔");
                        data = output;
                        converted = true;
                    }
                    Err(e) => warn!(error = %e, "轉檔失敗，使用原始圖片"),
                }
            } else {
                info!("找不到 ffmpeg，使用原始圖片格式");
            }
        }

        let configured = config.wants_conversion().then_some(config.output_format);
        let extension = choose_extension(configured, origin_url, &data);
        let filename = filename_for(origin_url, &extension);

        self.store
            .write(&filename, &data)
            .map_err(|source| PersistError::WriteFailed {
                filename: filename.clone(),
                source,
            })?;

        info!(filename = %filename, size = data.len(), "圖片已寫入媒體資料夾");

        Ok(PersistedImage {
            filename,
            size_bytes: data.len(),
            converted,
        })
    }
}

/// `image_search_` + URL 雜湊前 12 碼 + 副檔名
///
/// 同一個 URL 永遠得到同一個檔名，所以同 URL 不同內容會覆蓋舊檔。
pub fn filename_for(origin_url: &str, extension: &str) -> String {
    format!("{}{}{}", FILENAME_PREFIX, url_hash(origin_url), extension)
}

fn url_hash(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    hash[..HASH_LEN].to_string()
}

/// 副檔名優先順序：設定的輸出格式 > URL 副檔名 > 內容偵測 > `.jpg`
///
/// 只要開啟轉檔就用設定的格式，即使這次轉檔失敗或沒有 ffmpeg。
pub fn choose_extension(configured: Option<OutputFormat>, origin_url: &str, data: &[u8]) -> String {
    if let Some(format) = configured {
        return format_extension(format.as_str()).to_string();
    }

    if let Some(ext) = extension_from_url(origin_url) {
        return ext;
    }

    sniff_extension(data).unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

fn extension_from_url(origin_url: &str) -> Option<String> {
    let path = match Url::parse(origin_url) {
        Ok(url) => url.path().to_string(),
        // 不是絕對 URL 時自己切掉 query 與 fragment
        Err(_) => origin_url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    let ext = Path::new(&path).extension()?.to_str()?.to_ascii_lowercase();
    let ext = format!(".{}", ext);

    SUPPORTED_IMAGE_FORMATS.contains(&ext.as_str()).then_some(ext)
}

fn sniff_extension(data: &[u8]) -> Option<String> {
    let format = image::guess_format(data).ok()?;
    format.extensions_str().first().map(|ext| format!(".{}", ext))
}
