// 子模組
pub mod extractor;
pub mod google;

// 重新導出
pub use extractor::{ResultExtractor, ResultParser, GOOGLE_RESULT_MARKER};
pub use google::GoogleImageSearch;
