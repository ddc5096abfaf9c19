use crate::types::{ImageDescriptor, DEFAULT_TITLE};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

/// Google udm=2 結果頁的縮圖 marker
///
/// Google 隨時可能改 class 名稱，改了之後只會變成找不到圖片，要更新只改這裡。
pub const GOOGLE_RESULT_MARKER: &str = "img.DS1iW";

/// 攜帶原圖網址的 query 參數
const ORIGINAL_IMAGE_PARAM: &str = "imgurl";

/// 裝飾用圖片（logo 等）的路徑前綴
const DECORATIVE_PREFIXES: &[&str] = &["/images/branding"];

/// 解析相對 href 用的 base
const RESULT_PAGE_BASE: &str = "https://www.google.com/";

/// Parser Trait - 不同搜尋引擎實作不同的結果解析
pub trait ResultParser: Send + Sync {
    /// 解析結果頁，最多回傳 `max_results` 筆，保持文件順序
    fn parse_results(&self, html: &str, max_results: usize) -> Vec<ImageDescriptor>;
}

/// 單一元素解析失敗（只略過該元素）
#[derive(Debug, thiserror::Error)]
enum CandidateError {
    #[error("無法解析連結 {href:?}: {source}")]
    BadHref {
        href: String,
        #[source]
        source: url::ParseError,
    },
}

/// 用 CSS marker 找出結果縮圖的解析器
pub struct ResultExtractor {
    image_selector: Selector,
    base: Url,
}

impl ResultExtractor {
    /// 使用自訂 marker
    pub fn new(marker: &str) -> anyhow::Result<Self> {
        Ok(Self {
            image_selector: Selector::parse(marker)
                .map_err(|e| anyhow::anyhow!("選擇器解析失敗: {:?}", e))?,
            base: Url::parse(RESULT_PAGE_BASE)?,
        })
    }

    /// Google Images 的預設設定
    pub fn google() -> anyhow::Result<Self> {
        Self::new(GOOGLE_RESULT_MARKER)
    }

    /// 解析單一 `<img>`，被過濾時回傳 `Ok(None)`
    fn parse_candidate(&self, img: ElementRef<'_>) -> Result<Option<ImageDescriptor>, CandidateError> {
        let src = match img.value().attr("src") {
            Some(src) if !src.is_empty() => src,
            _ => return Ok(None),
        };

        if is_rejected_src(src) {
            return Ok(None);
        }

        let title = img
            .value()
            .attr("alt")
            .filter(|alt| !alt.is_empty())
            .unwrap_or(DEFAULT_TITLE)
            .to_string();

        let source_url = match enclosing_link(img).and_then(|a| a.value().attr("href")) {
            Some(href) if href.contains(&format!("{}=", ORIGINAL_IMAGE_PARAM)) => {
                self.original_image_url(href)?
            }
            Some(href) => href.to_string(),
            None => String::new(),
        };

        // 有 http(s) 的原圖就用原圖，否則退回縮圖
        let url = if is_http(&source_url) {
            source_url.clone()
        } else {
            src.to_string()
        };

        Ok(Some(ImageDescriptor {
            url,
            thumbnail_url: src.to_string(),
            title,
            source_url,
        }))
    }

    /// 從 Google 轉址連結裡取出 imgurl 參數（已解碼）
    fn original_image_url(&self, href: &str) -> Result<String, CandidateError> {
        let link = self.base.join(href).map_err(|source| CandidateError::BadHref {
            href: href.to_string(),
            source,
        })?;

        Ok(link
            .query_pairs()
            .find(|(key, _)| key == ORIGINAL_IMAGE_PARAM)
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default())
    }
}

impl ResultParser for ResultExtractor {
    fn parse_results(&self, html: &str, max_results: usize) -> Vec<ImageDescriptor> {
        if max_results == 0 {
            return Vec::new();
        }

        let document = Html::parse_document(html);
        let mut results = Vec::new();
        let mut matched = 0;

        for img in document.select(&self.image_selector) {
            if results.len() >= max_results {
                break;
            }
            matched += 1;

            match self.parse_candidate(img) {
                Ok(Some(descriptor)) => results.push(descriptor),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "略過無法解析的圖片元素"),
            }
        }

        if matched == 0 {
            // marker 可能已經失效，跟網路錯誤分開記錄
            warn!("結果頁中沒有任何符合 marker 的圖片");
        }
        debug!(matched, accepted = results.len(), "結果頁解析完成");

        results
    }
}

fn is_rejected_src(src: &str) -> bool {
    src.starts_with("data:") || DECORATIVE_PREFIXES.iter().any(|prefix| src.starts_with(prefix))
}

fn is_http(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// 最近的 `<a>` 祖先
fn enclosing_link(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| ancestor.value().name() == "a")
}
