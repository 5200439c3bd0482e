use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 正規化後的機器序列號：8-20 位英數字，統一轉為大寫後不再變動
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub const MIN_LEN: usize = 8;
    pub const MAX_LEN: usize = 20;

    /// 驗證並正規化一個原始 token，格式不符時回傳 None
    pub fn parse(raw: &str) -> Option<Self> {
        let token = raw.trim();
        if token.len() < Self::MIN_LEN || token.len() > Self::MAX_LEN {
            return None;
        }
        if !token.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return None;
        }
        Some(Self(token.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 成功結果的服務統計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCounts {
    pub valid_services: u32,
    pub expired_services: u32,
    pub total_services: u32,
}

/// 單筆查詢的結局：成功帶回原始 payload 與統計，失敗帶回原因
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        payload: serde_json::Value,
        counts: ServiceCounts,
    },
    Failure {
        reason: String,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn counts(&self) -> Option<ServiceCounts> {
        match self {
            Outcome::Success { counts, .. } => Some(*counts),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            Outcome::Success { payload, .. } => Some(payload),
            Outcome::Failure { .. } => None,
        }
    }
}

/// 一筆序列號查詢的完整結果，建立後不可變；重查時整筆替換
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub identifier: Identifier,
    /// 在批次中的位置（1 起算），僅供進度顯示
    pub index: usize,
    pub total: usize,
    pub outcome: Outcome,
    pub retry_count: u32,
}

impl QueryResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// 遠端查詢回覆：decode 後的 payload 或最後一次失敗原因，以及消耗的重試次數
#[derive(Debug, Clone)]
pub struct LookupReply {
    pub outcome: std::result::Result<serde_json::Value, String>,
    pub retries: u32,
}

/// 送往呈現層的事件流
#[derive(Debug, Clone)]
pub enum BatchEvent {
    Result(QueryResult),
    Progress { completed: usize, total: usize },
}

/// 一個批次跑完後的彙總；部分失敗以資料呈現，不是錯誤
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed_identifiers: Vec<Identifier>,
    pub started_at: DateTime<Local>,
}

impl BatchSummary {
    pub fn empty() -> Self {
        Self {
            total: 0,
            succeeded: 0,
            failed_identifiers: Vec::new(),
            started_at: Local::now(),
        }
    }

    pub fn is_partial_failure(&self) -> bool {
        !self.failed_identifiers.is_empty()
    }
}
