use crate::domain::model::{Identifier, QueryResult};
use std::collections::HashMap;

/// 行程生命週期內的查詢快取，只收成功結果；命中可完全略過網路查詢。
/// 不落地，重啟即清空，與持久化的 ResultStore 是兩回事。
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: HashMap<Identifier, QueryResult>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, identifier: &Identifier) -> Option<&QueryResult> {
        self.entries.get(identifier)
    }

    /// 只記錄成功結果，失敗結果直接忽略
    pub fn record(&mut self, result: &QueryResult) {
        if result.is_success() {
            self.entries
                .insert(result.identifier.clone(), result.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
