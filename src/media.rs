use crate::types::SavedImage;
use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const HISTORY_FILE: &str = "image_search_history.jsonl";

/// 媒體資料夾（由宿主程式提供，這裡只需要寫入）
pub trait MediaStore: Send + Sync {
    /// 以指定檔名寫入，檔名已經由呼叫端處理成安全的名字
    fn write(&self, filename: &str, data: &[u8]) -> io::Result<()>;
}

/// 以一般資料夾實作的媒體庫
pub struct FileMediaStore {
    /// 媒體資料夾
    media_dir: PathBuf,
}

impl FileMediaStore {
    /// 建立新的媒體庫
    pub fn new(media_dir: impl AsRef<Path>) -> Result<Self> {
        let media_dir = media_dir.as_ref().to_path_buf();
        fs::create_dir_all(&media_dir)
            .with_context(|| format!("無法建立媒體資料夾 {}", media_dir.display()))?;

        Ok(Self { media_dir })
    }

    /// 取得檔案路徑
    pub fn path_of(&self, filename: &str) -> PathBuf {
        self.media_dir.join(filename)
    }

    /// Append 儲存紀錄到 JSONL 檔案
    pub fn append_history(&self, record: &SavedImage) -> Result<()> {
        let path = self.media_dir.join(HISTORY_FILE);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context("無法開啟歷史紀錄檔")?;

        let mut writer = BufWriter::new(file);

        // 寫入一行 JSON + 換行
        serde_json::to_writer(&mut writer, record)
            .context("無法寫入歷史紀錄")?;
        writeln!(writer).context("無法寫入換行符號")?;

        writer.flush().context("無法 flush buffer")?;

        Ok(())
    }

    /// 讀取所有儲存紀錄
    pub fn load_history(&self) -> Result<Vec<SavedImage>> {
        let path = self.media_dir.join(HISTORY_FILE);

        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&path)
            .context("無法開啟歷史紀錄檔")?;
        let reader = BufReader::new(file);

        let mut records = Vec::new();

        for line in reader.lines() {
            let line = line.context("讀取行失敗")?;

            // 跳過空行
            if line.trim().is_empty() {
                continue;
            }

            let record: SavedImage = serde_json::from_str(&line)
                .context("解析歷史紀錄失敗")?;
            records.push(record);
        }

        Ok(records)
    }
}

impl MediaStore for FileMediaStore {
    /// 先寫暫存檔再 rename，避免留下寫一半的圖片
    fn write(&self, filename: &str, data: &[u8]) -> io::Result<()> {
        let path = self.path_of(filename);
        let temp_path = self.media_dir.join(format!(".{}.tmp", filename));

        fs::write(&temp_path, data)?;
        fs::rename(&temp_path, &path)
    }
}
