pub mod config;
pub mod converter;
pub mod error;
pub mod fetcher;
pub mod media;
pub mod note;
pub mod persist;
pub mod pipeline;
pub mod search;
pub mod types;

pub use config::{AppConfig, ConfigStore, OutputFormat};
pub use converter::{FfmpegConverter, ImageConverter};
pub use error::{ConversionError, FetchError, PersistError, PipelineError, SearchError};
pub use fetcher::{Fetcher, FetcherConfig, HttpFetcher};
pub use media::{FileMediaStore, MediaStore};
pub use persist::{ImagePersister, PersistedImage};
pub use pipeline::{ImageSearchPipeline, SaveOutcome};
pub use search::{GoogleImageSearch, ResultExtractor, ResultParser};
pub use types::{ImageDescriptor, RawImage, SavedImage};
