use crate::config::{MAX_IMAGE_SIZE, REQUEST_TIMEOUT, USER_AGENT};
use crate::error::{FetchError, SearchError};
use crate::types::RawImage;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP Fetcher trait - 搜尋頁面與圖片下載的抽象介面（測試可替換）
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// 取得 HTML 頁面
    async fn fetch_page(&self, url: &str, query: &[(&str, &str)]) -> Result<String, SearchError>;

    /// 下載單張圖片（檢查 Content-Type 與大小）
    async fn fetch_image(&self, url: &str) -> Result<RawImage, FetchError>;
}

/// Fetcher 設定
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// 請求超時
    pub timeout: Duration,
    /// 搜尋頁面的最大重試次數（圖片下載不重試）
    pub max_retries: u32,
    /// 圖片大小上限 (bytes)
    pub max_image_bytes: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: REQUEST_TIMEOUT,
            max_retries: 2,
            max_image_bytes: MAX_IMAGE_SIZE,
        }
    }
}

impl FetcherConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_max_image_bytes(mut self, max_image_bytes: u64) -> Self {
        self.max_image_bytes = max_image_bytes;
        self
    }
}

/// HTTP 實作
pub struct HttpFetcher {
    client: Client,
    config: FetcherConfig,
}

impl HttpFetcher {
    /// 建立新的 HTTP Fetcher
    pub fn new(config: FetcherConfig) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(
            "text/html,application/xhtml+xml,image/avif,image/webp,image/*,*/*;q=0.8"
        ));

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .cookie_store(true)
            .build()?;

        Ok(Self { client, config })
    }

    /// 帶重試的頁面請求
    async fn fetch_with_retry(&self, url: &str, query: &[(&str, &str)]) -> Result<String, SearchError> {
        let mut attempt = 0;

        loop {
            let result = self.try_fetch_page(url, query).await;

            match result {
                Ok(body) => return Ok(body),
                Err(e) if attempt < self.config.max_retries => {
                    attempt += 1;
                    // 重試前等待（指數退避）
                    let wait_time = Duration::from_secs(2u64.pow(attempt - 1));
                    warn!(url, attempt, error = %e, "搜尋頁面請求失敗，稍後重試");
                    tokio::time::sleep(wait_time).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_fetch_page(&self, url: &str, query: &[(&str, &str)]) -> Result<String, SearchError> {
        let response = self.client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(SearchError::Transport)?;

        if !response.status().is_success() {
            return Err(SearchError::Status(response.status()));
        }

        response.text().await.map_err(SearchError::Transport)
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_page(&self, url: &str, query: &[(&str, &str)]) -> Result<String, SearchError> {
        self.fetch_with_retry(url, query).await
    }

    async fn fetch_image(&self, url: &str) -> Result<RawImage, FetchError> {
        let limit = self.config.max_image_bytes;
        debug!(url, "開始下載圖片");

        let mut response = self.client
            .get(url)
            .send()
            .await
            .map_err(FetchError::Transport)?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .trim()
            .to_string();

        if !content_type.to_ascii_lowercase().starts_with("image/") {
            return Err(FetchError::InvalidContentType(content_type));
        }

        // 先看宣告的長度
        let declared = response.content_length();
        if let Some(size) = declared {
            if size > limit {
                return Err(FetchError::TooLarge { size, limit });
            }
        }

        let mut bytes = Vec::with_capacity(declared.unwrap_or(0) as usize);

        // 再逐塊累計，伺服器可能謊報長度
        while let Some(chunk) = response.chunk().await.map_err(FetchError::Transport)? {
            let size = (bytes.len() + chunk.len()) as u64;
            if size > limit {
                return Err(FetchError::TooLarge { size, limit });
            }
            bytes.extend_from_slice(&chunk);
        }

        debug!(url, size = bytes.len(), content_type = %content_type, "圖片下載完成");

        Ok(RawImage {
            bytes,
            content_type,
            origin_url: url.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(max_image_bytes: u64) -> HttpFetcher {
        HttpFetcher::new(
            FetcherConfig::default()
                .with_max_retries(0)
                .with_max_image_bytes(max_image_bytes),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_image() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cat.png"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(vec![0x89, b'P', b'N', b'G'], "image/png"),
            )
            .mount(&server)
            .await;

        let url = format!("{}/cat.png", server.uri());
        let image = fetcher(1024).fetch_image(&url).await.unwrap();

        assert_eq!(image.bytes, vec![0x89, b'P', b'N', b'G']);
        assert_eq!(image.content_type, "image/png");
        assert_eq!(image.origin_url, url);
    }

    #[tokio::test]
    async fn test_html_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"))
            .mount(&server)
            .await;

        let err = fetcher(1024).fetch_image(&server.uri()).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidContentType(ct) if ct == "text/html"));
    }

    #[tokio::test]
    async fn test_oversized_image_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; 8 * 1024], "image/jpeg"))
            .mount(&server)
            .await;

        let err = fetcher(5 * 1024).fetch_image(&server.uri()).await.unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { limit: 5120, .. }));
    }

    /// 不帶 Content-Length、以 chunked 傳送圖片的一次性 server
    async fn serve_chunked(body_len: usize) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 2048];
            let _ = socket.read(&mut request).await;

            let mut response =
                b"HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
            for chunk in vec![0u8; body_len].chunks(1024) {
                response.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
                response.extend_from_slice(chunk);
                response.extend_from_slice(b"\r\n");
            }
            response.extend_from_slice(b"0\r\n\r\n");
            let _ = socket.write_all(&response).await;
        });

        format!("http://{}/big.jpg", addr)
    }

    #[tokio::test]
    async fn test_undeclared_oversized_body_is_rejected() {
        let url = serve_chunked(8 * 1024).await;

        let err = fetcher(5 * 1024).fetch_image(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { size, limit: 5120 } if size > 5120));
    }

    #[tokio::test]
    async fn test_undeclared_body_within_limit() {
        let url = serve_chunked(2 * 1024).await;

        let image = fetcher(5 * 1024).fetch_image(&url).await.unwrap();
        assert_eq!(image.bytes.len(), 2048);
        assert_eq!(image.content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = fetcher(1024).fetch_image(&server.uri()).await.unwrap_err();
        assert!(matches!(err, FetchError::Status(s) if s.as_u16() == 404));
    }

    #[tokio::test]
    async fn test_transport_error() {
        // 沒有人在聽的 port
        let err = fetcher(1024).fetch_image("http://127.0.0.1:9/x.jpg").await.unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }

    #[tokio::test]
    async fn test_fetch_page_sends_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "red panda"))
            .and(query_param("udm", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;

        let url = format!("{}/search", server.uri());
        let body = fetcher(1024)
            .fetch_page(&url, &[("q", "red panda"), ("udm", "2")])
            .await
            .unwrap();
        assert_eq!(body, "<html>ok</html>");
    }

    #[tokio::test]
    async fn test_fetch_page_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = fetcher(1024).fetch_page(&server.uri(), &[]).await.unwrap_err();
        assert!(matches!(err, SearchError::Status(s) if s.as_u16() == 503));
    }
}
