use crate::core::fetcher::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_MS, DEFAULT_TIMEOUT_SECONDS};
use crate::core::orchestrator::{DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_CONCURRENT_REQUESTS};
use crate::domain::ports::QuerySettings;
use crate::utils::error::{QueryError, Result};
use crate::utils::validation::{validate_path, validate_positive_number, validate_range, validate_url};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub service: ServiceConfig,
    pub batch: Option<BatchConfig>,
    pub store: Option<StoreConfig>,
    pub export: Option<ExportConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub endpoint: String,
    pub timeout_seconds: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub concurrent_requests: Option<usize>,
    pub checkpoint_interval: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    pub output_path: Option<String>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(QueryError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| QueryError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${WARRANTY_ENDPOINT})
    fn substitute_env_vars(content: &str) -> String {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").unwrap();

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .to_string()
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validate_url("service.endpoint", &self.service.endpoint)?;

        if let Some(timeout) = self.service.timeout_seconds {
            validate_range("service.timeout_seconds", timeout, 1, 120)?;
        }

        if let Some(batch) = &self.batch {
            if let Some(concurrent) = batch.concurrent_requests {
                validate_positive_number("batch.concurrent_requests", concurrent, 1)?;
                validate_range("batch.concurrent_requests", concurrent, 1, 512)?;
            }
            if let Some(interval) = batch.checkpoint_interval {
                validate_positive_number("batch.checkpoint_interval", interval, 1)?;
            }
        }

        if let Some(store) = &self.store {
            if let Some(path) = &store.path {
                validate_path("store.path", path)?;
            }
        }

        if let Some(export) = &self.export {
            if let Some(path) = &export.output_path {
                validate_path("export.output_path", path)?;
            }
        }

        Ok(())
    }
}

impl QuerySettings for TomlConfig {
    fn endpoint(&self) -> &str {
        &self.service.endpoint
    }

    fn output_path(&self) -> &str {
        self.export
            .as_ref()
            .and_then(|e| e.output_path.as_deref())
            .unwrap_or("./output")
    }

    fn store_path(&self) -> &str {
        self.store
            .as_ref()
            .and_then(|s| s.path.as_deref())
            .unwrap_or("query_results.json")
    }

    fn concurrent_requests(&self) -> usize {
        self.batch
            .as_ref()
            .and_then(|b| b.concurrent_requests)
            .unwrap_or(DEFAULT_CONCURRENT_REQUESTS)
    }

    fn max_retries(&self) -> u32 {
        self.service.max_retries.unwrap_or(DEFAULT_MAX_RETRIES)
    }

    fn timeout_seconds(&self) -> u64 {
        self.service
            .timeout_seconds
            .unwrap_or(DEFAULT_TIMEOUT_SECONDS)
    }

    fn retry_delay_ms(&self) -> u64 {
        self.service
            .retry_delay_ms
            .unwrap_or(DEFAULT_RETRY_DELAY_MS)
    }

    fn checkpoint_interval(&self) -> usize {
        self.batch
            .as_ref()
            .and_then(|b| b.checkpoint_interval)
            .unwrap_or(DEFAULT_CHECKPOINT_INTERVAL)
    }
}
