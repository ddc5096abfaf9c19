use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// 沒有 alt 文字時的預設標題
pub const DEFAULT_TITLE: &str = "Image";

/// 搜尋結果中的單張候選圖片
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    /// 最佳的原圖 URL（一定不是空字串，也不是 data URI）
    pub url: String,
    /// 縮圖 URL，給預覽用
    pub thumbnail_url: String,
    /// 圖片標題
    pub title: String,
    /// 圖片所在頁面，不知道時為空字串
    pub source_url: String,
}

/// 下載回來的原始圖片
#[derive(Debug, Clone)]
pub struct RawImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub origin_url: String,
}

/// 已儲存圖片的紀錄（寫入 history JSONL）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedImage {
    /// 媒體資料夾內的檔名
    pub filename: String,
    /// 原始 URL
    pub origin_url: String,
    pub content_type: String,
    pub size_bytes: usize,
    /// 是否經過 ffmpeg 轉檔
    pub converted: bool,
    /// 儲存時間
    pub saved_at: DateTime<Utc>,
}

impl SavedImage {
    pub fn new(filename: &str, image: &RawImage, size_bytes: usize, converted: bool) -> Self {
        Self {
            filename: filename.to_string(),
            origin_url: image.origin_url.clone(),
            content_type: image.content_type.clone(),
            size_bytes,
            converted,
            saved_at: Utc::now(),
        }
    }
}
