use crate::config::GOOGLE_IMAGE_SEARCH_URL;
use crate::error::SearchError;
use crate::fetcher::Fetcher;
use crate::search::extractor::{ResultExtractor, ResultParser};
use crate::types::ImageDescriptor;
use std::sync::Arc;
use tracing::info;

/// Google Images 搜尋 (udm=2)
pub struct GoogleImageSearch {
    fetcher: Arc<dyn Fetcher>,
    parser: Arc<dyn ResultParser>,
    endpoint: String,
}

impl GoogleImageSearch {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> anyhow::Result<Self> {
        Ok(Self {
            fetcher,
            parser: Arc::new(ResultExtractor::google()?),
            endpoint: GOOGLE_IMAGE_SEARCH_URL.to_string(),
        })
    }

    /// 換掉 endpoint（測試用 mock server）
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// 搜尋圖片
    ///
    /// 網路錯誤回傳 `Err`；頁面拿到了但沒有結果則是 `Ok(vec![])`。
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<ImageDescriptor>, SearchError> {
        let html = self
            .fetcher
            .fetch_page(&self.endpoint, &[("q", query), ("udm", "2")])
            .await?;

        let results = self.parser.parse_results(&html, max_results);
        info!(query, count = results.len(), "搜尋完成");

        Ok(results)
    }
}
