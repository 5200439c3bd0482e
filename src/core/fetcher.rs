use crate::domain::model::{Identifier, LookupReply};
use crate::domain::ports::{QuerySettings, WarrantyLookup};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// 服務端回覆文件中代表查詢成功的狀態碼
pub const SUCCESS_STATUS: u64 = 200;

pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 100;

/// 對保固服務的單筆查詢客戶端，帶固定次數重試。
/// 無狀態、不碰快取與存放，可以任意併發呼叫。
pub struct WarrantyClient {
    client: Client,
    headers: HeaderMap,
    endpoint: String,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl WarrantyClient {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: Client::new(),
            headers: Self::static_headers(),
            endpoint,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }

    pub fn from_settings(settings: &dyn QuerySettings) -> Self {
        Self::new(settings.endpoint().to_string())
            .with_timeout(Duration::from_secs(settings.timeout_seconds()))
            .with_max_retries(settings.max_retries())
            .with_retry_delay(Duration::from_millis(settings.retry_delay_ms()))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// 每個請求都帶的固定識別標頭
    fn static_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
            ),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
        );
        headers
    }

    /// 單次查詢：傳輸成功且 decode 後 statusCode == 200 才算功能上成功，
    /// 其他 decode 得出的狀態碼視為可重試的應用層失敗
    async fn attempt(&self, identifier: &Identifier) -> std::result::Result<Value, String> {
        let url = format!("{}/{}", self.endpoint.trim_end_matches('/'), identifier);

        let response = self
            .client
            .get(&url)
            .headers(self.headers.clone())
            .timeout(self.timeout)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| e.to_string())?;

        let payload: Value = response.json().await.map_err(|e| e.to_string())?;

        let status = payload.get("statusCode").and_then(Value::as_u64);
        if status == Some(SUCCESS_STATUS) {
            Ok(payload)
        } else {
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("no message");
            Err(format!(
                "service returned status {}: {}",
                status.map_or_else(|| "unknown".to_string(), |s| s.to_string()),
                message
            ))
        }
    }
}

#[async_trait]
impl WarrantyLookup for WarrantyClient {
    async fn lookup(&self, identifier: &Identifier) -> LookupReply {
        let mut last_error = String::new();

        for attempt in 0..=self.max_retries {
            match self.attempt(identifier).await {
                Ok(payload) => {
                    if attempt > 0 {
                        tracing::debug!("{} succeeded after {} retries", identifier, attempt);
                    }
                    return LookupReply {
                        outcome: Ok(payload),
                        retries: attempt,
                    };
                }
                Err(reason) => {
                    tracing::debug!("{} attempt {} failed: {}", identifier, attempt + 1, reason);
                    last_error = reason;
                    if attempt < self.max_retries {
                        // 重試間隔不計入單次逾時
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        LookupReply {
            outcome: Err(last_error),
            retries: self.max_retries,
        }
    }
}
