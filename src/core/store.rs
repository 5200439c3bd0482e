use crate::domain::model::{Identifier, QueryResult};
use crate::utils::error::Result;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// 跨行程持久化的查詢結果存放。每個序列號至多一筆，後到的成功結果整筆覆蓋舊值。
/// 文件是以序列號為 key 的 JSON，存檔採先寫暫存檔再 rename，讀取方不會看到半份文件。
#[derive(Debug)]
pub struct ResultStore {
    path: PathBuf,
    results: HashMap<Identifier, QueryResult>,
    saves: AtomicUsize,
}

impl ResultStore {
    /// 啟動時載入歷史結果；檔案不存在或整份壞掉都以空存放起跑，不視為錯誤
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let results = match fs::read_to_string(&path) {
            Ok(content) => Self::decode(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                tracing::warn!("Failed to read result store {}: {}", path.display(), e);
                HashMap::new()
            }
        };

        Self {
            path,
            results,
            saves: AtomicUsize::new(0),
        }
    }

    fn decode(content: &str) -> HashMap<Identifier, QueryResult> {
        let raw: HashMap<String, serde_json::Value> = match serde_json::from_str(content) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Result store document unreadable, starting empty: {}", e);
                return HashMap::new();
            }
        };

        let mut results = HashMap::new();
        for (serial, value) in raw {
            match serde_json::from_value::<QueryResult>(value) {
                Ok(result) => {
                    results.insert(result.identifier.clone(), result);
                }
                Err(e) => {
                    tracing::warn!("Skipping unreadable store entry {}: {}", serial, e);
                }
            }
        }
        results
    }

    pub fn upsert(&mut self, result: QueryResult) {
        self.results.insert(result.identifier.clone(), result);
    }

    pub fn get(&self, identifier: &Identifier) -> Option<&QueryResult> {
        self.results.get(identifier)
    }

    /// 給讀取方（呈現、匯出）的一致性快照，批次寫入不會影響已取出的副本
    pub fn snapshot(&self) -> HashMap<Identifier, QueryResult> {
        self.results.clone()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 目前為止完成的存檔次數
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }

    /// 整份重寫到磁碟：先寫 .tmp 再 rename 取代
    pub fn save(&self) -> Result<()> {
        let document = serde_json::to_string_pretty(&self.results)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, document)?;
        fs::rename(&tmp_path, &self.path)?;

        let nth = self.saves.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!("Saved {} results (save #{})", self.results.len(), nth);
        Ok(())
    }

    /// 清掉記憶體內容並刪除持久化檔案
    pub fn clear(&mut self) -> Result<()> {
        self.results.clear();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
