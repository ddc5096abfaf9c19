use crate::config::AppConfig;
use crate::converter::ImageConverter;
use crate::error::PipelineError;
use crate::fetcher::Fetcher;
use crate::media::MediaStore;
use crate::note;
use crate::persist::{ImagePersister, PersistedImage};
use crate::search::GoogleImageSearch;
use crate::types::{ImageDescriptor, RawImage};
use std::sync::Arc;
use tracing::info;

/// 搜尋 → 下載 → 轉檔 → 儲存 的共用核心
///
/// 各種前端（縮圖格狀選擇、內嵌瀏覽器選擇、CLI）都只透過這裡操作。
pub struct ImageSearchPipeline {
    search: GoogleImageSearch,
    fetcher: Arc<dyn Fetcher>,
    persister: ImagePersister,
    config: AppConfig,
}

/// 一次下載並儲存的結果
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub image: RawImage,
    pub persisted: PersistedImage,
}

impl SaveOutcome {
    pub fn filename(&self) -> &str {
        &self.persisted.filename
    }
}

impl ImageSearchPipeline {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        converter: Arc<dyn ImageConverter>,
        store: Arc<dyn MediaStore>,
        config: AppConfig,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            search: GoogleImageSearch::new(Arc::clone(&fetcher))?,
            fetcher,
            persister: ImagePersister::new(converter, store),
            config,
        })
    }

    /// 換掉搜尋實作（例如指向 mock server）
    pub fn with_search(mut self, search: GoogleImageSearch) -> Self {
        self.search = search;
        self
    }

    /// 搜尋圖片，筆數上限來自設定
    ///
    /// 沒有結果時回傳空的 Vec，由前端顯示「找不到圖片」。
    pub async fn search(&self, query: &str) -> Result<Vec<ImageDescriptor>, PipelineError> {
        let query = note::plain_query(query);
        Ok(self.search.search(&query, self.config.max_results).await?)
    }

    /// 下載並儲存指定的圖片 URL
    pub async fn download_and_save(&self, url: &str) -> Result<SaveOutcome, PipelineError> {
        let image = self.fetcher.fetch_image(url).await?;
        info!(url, size = image.bytes.len(), "下載完成");

        let persisted = self
            .persister
            .save_image(image.bytes.clone(), &image.origin_url, &self.config)
            .await?;

        Ok(SaveOutcome { image, persisted })
    }

    /// 搜尋後直接儲存第 `index` 張（從 0 開始）
    pub async fn pick_and_save(&self, query: &str, index: usize) -> Result<SaveOutcome, PipelineError> {
        let results = self.search(query).await?;

        if results.is_empty() {
            return Err(PipelineError::NoImagesFound);
        }

        let descriptor = results.get(index).ok_or(PipelineError::NoSuchResult {
            index,
            count: results.len(),
        })?;

        self.download_and_save(&descriptor.url).await
    }

    /// 回傳插入圖片後的欄位內容
    pub fn insert_into_field(&self, current_html: &str, filename: &str) -> String {
        note::insert_image(current_html, filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::FfmpegConverter;
    use crate::error::{FetchError, PersistError};
    use crate::fetcher::{FetcherConfig, HttpFetcher};
    use crate::media::FileMediaStore;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3, 4];

    struct Fixture {
        server: MockServer,
        media: tempfile::TempDir,
        pipeline: ImageSearchPipeline,
    }

    async fn fixture() -> Fixture {
        let server = MockServer::start().await;
        let media = tempfile::tempdir().unwrap();

        let fetcher: Arc<dyn Fetcher> =
            Arc::new(HttpFetcher::new(FetcherConfig::default().with_max_retries(0)).unwrap());
        let store = Arc::new(FileMediaStore::new(media.path()).unwrap());
        let converter = Arc::new(FfmpegConverter::with_command("image-search-no-such-encoder"));

        let config = AppConfig {
            convert_format: true,
            output_format: crate::config::OutputFormat::Webp,
            ..AppConfig::default()
        };

        let search = GoogleImageSearch::new(Arc::clone(&fetcher))
            .unwrap()
            .with_endpoint(format!("{}/search", server.uri()));

        let pipeline = ImageSearchPipeline::new(fetcher, converter, store, config)
            .unwrap()
            .with_search(search);

        Fixture { server, media, pipeline }
    }

    async fn mount_results(server: &MockServer) {
        let page = format!(
            r#"<a href="/imgres?imgurl={0}/full/cat.png"><img class="DS1iW" src="{0}/thumb/1" alt="cat"></a>
               <a href="/imgres?imgurl={0}/full/page.html"><img class="DS1iW" src="{0}/thumb/2"></a>"#,
            server.uri()
        );

        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/full/cat.png"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(PNG_MAGIC.to_vec(), "image/png"))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/full/page.html"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_pick_and_save() {
        let f = fixture().await;
        mount_results(&f.server).await;

        let results = f.pipeline.search("<b>cat</b>").await.unwrap();
        assert_eq!(results.len(), 2);

        let outcome = f.pipeline.pick_and_save("cat", 0).await.unwrap();

        // 沒有 ffmpeg，保留原始 PNG，副檔名仍照設定
        assert!(!outcome.persisted.converted);
        assert!(outcome.filename().starts_with("image_search_"));
        assert!(outcome.filename().ends_with(".webp"));
        let saved = std::fs::read(f.media.path().join(outcome.filename())).unwrap();
        assert_eq!(saved, PNG_MAGIC);

        let field = f.pipeline.insert_into_field("cat", outcome.filename());
        assert_eq!(field, format!("cat<br><img src=\"{}\">", outcome.filename()));
    }

    #[tokio::test]
    async fn test_download_failure_is_distinct() {
        let f = fixture().await;
        mount_results(&f.server).await;

        let err = f.pipeline.pick_and_save("cat", 1).await.unwrap_err();
        assert!(matches!(err, PipelineError::Download(FetchError::InvalidContentType(_))));

        let err = f.pipeline.pick_and_save("cat", 5).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoSuchResult { index: 5, count: 2 }));
    }

    #[tokio::test]
    async fn test_no_images_found() {
        let f = fixture().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&f.server)
            .await;

        assert!(f.pipeline.search("cat").await.unwrap().is_empty());
        let err = f.pipeline.pick_and_save("cat", 0).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoImagesFound));
    }

    #[tokio::test]
    async fn test_save_failure_is_distinct() {
        let f = fixture().await;
        mount_results(&f.server).await;
        std::fs::remove_dir_all(f.media.path()).unwrap();

        let err = f.pipeline.pick_and_save("cat", 0).await.unwrap_err();
        assert!(matches!(err, PipelineError::Save(PersistError::WriteFailed { .. })));
    }

    #[test]
    fn test_messages_are_distinct() {
        let messages = [
            PipelineError::NoImagesFound.to_string(),
            PipelineError::Download(FetchError::InvalidContentType("text/html".into())).to_string(),
            PipelineError::Save(PersistError::WriteFailed {
                filename: "a.jpg".into(),
                source: std::io::Error::other("disk full"),
            })
            .to_string(),
        ];

        assert!(messages[0].starts_with("找不到圖片"));
        assert!(messages[1].starts_with("下載圖片失敗"));
        assert!(messages[2].starts_with("儲存圖片失敗"));
    }
}
