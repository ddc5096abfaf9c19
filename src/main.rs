use image_search_core::{
    ConfigStore, FetcherConfig, FfmpegConverter, FileMediaStore, HttpFetcher, ImageSearchPipeline,
    SavedImage,
};
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::sync::Arc;
use std::time::Duration;

const DATA_DIR: &str = "./data";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("search") => run_search(&args[2..].join(" ")).await?,
        Some("save") => match args.get(2) {
            Some(url) => run_save(url).await?,
            None => print_help(),
        },
        Some("pick") => match (args.get(2), pick_index(args.get(3).map(|s| s.as_str()))) {
            (Some(query), Some(index)) => run_pick(query, index).await?,
            (Some(_), None) => println!("❌ 編號必須是從 1 開始的整數"),
            (None, _) => print_help(),
        },
        Some("ffmpeg") => run_ffmpeg_check().await,
        Some("history") => print_history()?,
        Some("config") => print_config()?,
        Some("--help") | Some("-h") | None => print_help(),
        Some(other) => {
            println!("未知命令: {}", other);
            print_help();
        }
    }

    Ok(())
}

fn build_pipeline() -> Result<(ImageSearchPipeline, Arc<FileMediaStore>)> {
    let config = ConfigStore::new(DATA_DIR).load()?;
    let fetcher = Arc::new(HttpFetcher::new(FetcherConfig::default())?);
    let store = Arc::new(FileMediaStore::new(format!("{}/media", DATA_DIR))?);
    let converter = Arc::new(FfmpegConverter::new());

    let pipeline = ImageSearchPipeline::new(fetcher, converter, store.clone(), config)?;
    Ok((pipeline, store))
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

async fn run_search(query: &str) -> Result<()> {
    if query.trim().is_empty() {
        println!("❌ 請輸入搜尋關鍵字");
        return Ok(());
    }

    let (pipeline, _) = build_pipeline()?;

    let pb = spinner(&format!("🔍 搜尋: {}", query));
    let result = pipeline.search(query).await;
    pb.finish_and_clear();

    let results = match result {
        Ok(results) => results,
        Err(e) => {
            println!("❌ {}", e);
            return Ok(());
        }
    };

    if results.is_empty() {
        println!("⚠️  找不到圖片");
        return Ok(());
    }

    println!("✅ 找到 {} 張圖片\n", results.len());
    for (i, image) in results.iter().enumerate() {
        println!("{}. {}", i + 1, image.title);
        println!("   URL:  {}", image.url);
        println!("   縮圖: {}", image.thumbnail_url);
        if !image.source_url.is_empty() {
            println!("   來源: {}", urlencoding::decode(&image.source_url).unwrap_or_default());
        }
    }

    println!("\n💡 執行 'image-search pick {} <編號>' 來儲存圖片", query);
    Ok(())
}

async fn run_save(url: &str) -> Result<()> {
    let (pipeline, store) = build_pipeline()?;

    let pb = spinner("📥 下載圖片...");
    let result = pipeline.download_and_save(url).await;
    pb.finish_and_clear();

    report_saved(&store, result)
}

/// 解析 1-based 編號，沒給時為 1
fn pick_index(arg: Option<&str>) -> Option<usize> {
    match arg {
        None => Some(1),
        Some(s) => s.parse::<usize>().ok().filter(|&n| n >= 1),
    }
}

async fn run_pick(query: &str, index: usize) -> Result<()> {
    let (pipeline, store) = build_pipeline()?;

    let pb = spinner(&format!("🔍 搜尋並下載第 {} 張: {}", index, query));
    let result = pipeline.pick_and_save(query, index - 1).await;
    pb.finish_and_clear();

    report_saved(&store, result)
}

fn report_saved(
    store: &FileMediaStore,
    result: Result<image_search_core::SaveOutcome, image_search_core::PipelineError>,
) -> Result<()> {
    match result {
        Ok(outcome) => {
            let record = SavedImage::new(
                outcome.filename(),
                &outcome.image,
                outcome.persisted.size_bytes,
                outcome.persisted.converted,
            );
            store.append_history(&record)?;

            println!("✅ 已儲存: {}", store.path_of(outcome.filename()).display());
            if outcome.persisted.converted {
                println!("   (已用 ffmpeg 轉檔)");
            }
            println!("   欄位 HTML: <img src=\"{}\">", outcome.filename());
        }
        Err(e) => println!("❌ {}", e),
    }

    Ok(())
}

async fn run_ffmpeg_check() {
    let converter = FfmpegConverter::new();
    let (available, message) = converter.check().await;

    if available {
        println!("✅ {}", message);
    } else {
        println!("⚠️  {}", message);
        println!("   轉檔功能會停用，圖片會以原始格式儲存");
    }
}

fn print_history() -> Result<()> {
    let store = FileMediaStore::new(format!("{}/media", DATA_DIR))?;
    let history = store.load_history()?;

    if history.is_empty() {
        println!("⚠️  尚無儲存紀錄");
        return Ok(());
    }

    println!("📋 共 {} 筆儲存紀錄:\n", history.len());
    for record in &history {
        println!(
            "{}  {}  {} bytes{}",
            record.saved_at.format("%Y-%m-%d %H:%M:%S"),
            record.filename,
            record.size_bytes,
            if record.converted { " (轉檔)" } else { "" }
        );
        println!("   {}", record.origin_url);
    }

    Ok(())
}

fn print_config() -> Result<()> {
    let store = ConfigStore::new(DATA_DIR);
    let config = store.load()?;

    println!("設定檔: {}\n", store.path().display());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn print_help() {
    println!("Image Search - 圖片搜尋工具\n");
    println!("用法:");
    println!("  image-search search <關鍵字>         # 搜尋圖片");
    println!("  image-search save <URL>              # 下載並儲存單張圖片");
    println!("  image-search pick <關鍵字> [編號]    # 搜尋並儲存第 N 張 (預設 1)");
    println!("  image-search ffmpeg                  # 檢查 ffmpeg");
    println!("  image-search history                 # 顯示儲存紀錄");
    println!("  image-search config                  # 顯示目前設定");
    println!("  image-search --help                  # 顯示此幫助\n");
    println!("資料檔案:");
    println!("  ./data/config.json                            # 設定");
    println!("  ./data/media/                                 # 圖片");
    println!("  ./data/media/image_search_history.jsonl       # 儲存紀錄");
    println!("\n設定 RUST_LOG=debug 可看到詳細 log");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_index() {
        assert_eq!(pick_index(None), Some(1));
        assert_eq!(pick_index(Some("3")), Some(3));
        assert_eq!(pick_index(Some("0")), None);
        assert_eq!(pick_index(Some("-1")), None);
        assert_eq!(pick_index(Some("abc")), None);
    }
}
