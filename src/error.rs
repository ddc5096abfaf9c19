use std::time::Duration;

/// 搜尋結果頁面的網路錯誤（跟「找不到圖片」分開）
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("搜尋請求失敗: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("搜尋回應 HTTP 錯誤: {0}")]
    Status(reqwest::StatusCode),
}

/// 單張圖片下載錯誤
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("下載請求失敗: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("下載回應 HTTP 錯誤: {0}")]
    Status(reqwest::StatusCode),
    #[error("無效的 Content-Type: {0:?}")]
    InvalidContentType(String),
    #[error("圖片太大: {size} bytes (上限 {limit} bytes)")]
    TooLarge { size: u64, limit: u64 },
}

/// ffmpeg 轉檔錯誤
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("找不到 ffmpeg，請確認已安裝並在 PATH 中")]
    Unavailable,
    #[error("不支援的輸出格式: {0}")]
    UnsupportedFormat(String),
    #[error("轉檔逾時（{}s）", .0.as_secs_f64())]
    TimedOut(Duration),
    #[error("ffmpeg 回傳非零狀態 {code:?}: {stderr}")]
    ProcessFailed { code: Option<i32>, stderr: String },
    #[error("ffmpeg 回報成功但沒有產生輸出檔")]
    NoOutput,
    #[error("轉檔 I/O 錯誤: {0}")]
    Io(#[from] std::io::Error),
}

/// 寫入媒體資料夾失敗
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("無法寫入媒體檔案 {filename}: {source}")]
    WriteFailed {
        filename: String,
        #[source]
        source: std::io::Error,
    },
}

/// 給前端顯示的錯誤，各種情況的訊息都不同
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("找不到圖片")]
    NoImagesFound,
    #[error("沒有第 {index} 張圖片（共 {count} 張）")]
    NoSuchResult { index: usize, count: usize },
    #[error("搜尋失敗: {0}")]
    Search(#[from] SearchError),
    #[error("下載圖片失敗: {0}")]
    Download(#[from] FetchError),
    #[error("儲存圖片失敗: {0}")]
    Save(#[from] PersistError),
}
