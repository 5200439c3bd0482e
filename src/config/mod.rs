pub mod toml_config;

use crate::core::fetcher::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_MS, DEFAULT_TIMEOUT_SECONDS};
use crate::core::orchestrator::{DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_CONCURRENT_REQUESTS};
use crate::domain::ports::{QuerySettings, Storage};
use crate::utils::error::Result;
use crate::utils::validation::{
    validate_path, validate_positive_number, validate_range, validate_url, Validate,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "warranty-batch")]
#[command(about = "Batch warranty status lookup for hardware serial numbers")]
pub struct CliConfig {
    /// 序列號清單檔案，- 表示從 stdin 讀
    #[arg(default_value = "-")]
    pub input: String,

    #[arg(long, default_value = "https://warranty.example.com/api/device")]
    pub endpoint: String,

    #[arg(long, default_value = "./output")]
    pub output_path: String,

    #[arg(long, default_value = "query_results.json")]
    pub store_path: String,

    #[arg(long, default_value_t = DEFAULT_CONCURRENT_REQUESTS)]
    pub concurrent_requests: usize,

    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECONDS)]
    pub timeout_seconds: u64,

    #[arg(long, default_value_t = DEFAULT_RETRY_DELAY_MS)]
    pub retry_delay_ms: u64,

    #[arg(long, default_value_t = DEFAULT_CHECKPOINT_INTERVAL)]
    pub checkpoint_interval: usize,

    #[arg(long, help = "Load settings from a TOML config file instead of flags")]
    pub config: Option<String>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log resource usage per phase")]
    pub monitor: bool,

    #[arg(long, help = "Clear stored results and exit")]
    pub clear: bool,
}

impl QuerySettings for CliConfig {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn output_path(&self) -> &str {
        &self.output_path
    }

    fn store_path(&self) -> &str {
        &self.store_path
    }

    fn concurrent_requests(&self) -> usize {
        self.concurrent_requests
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }

    fn retry_delay_ms(&self) -> u64 {
        self.retry_delay_ms
    }

    fn checkpoint_interval(&self) -> usize {
        self.checkpoint_interval
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_url("endpoint", &self.endpoint)?;
        validate_path("output_path", &self.output_path)?;
        validate_path("store_path", &self.store_path)?;
        validate_positive_number("concurrent_requests", self.concurrent_requests, 1)?;
        validate_range("concurrent_requests", self.concurrent_requests, 1, 512)?;
        validate_range("timeout_seconds", self.timeout_seconds, 1, 120)?;
        validate_range("max_retries", self.max_retries, 0, 10)?;
        validate_range("retry_delay_ms", self.retry_delay_ms, 0, 10_000)?;
        validate_positive_number("checkpoint_interval", self.checkpoint_interval, 1)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: String,
}

impl LocalStorage {
    pub fn new(base_path: String) -> Self {
        Self { base_path }
    }
}

impl Storage for LocalStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = Path::new(&self.base_path).join(path);
        let data = fs::read(full_path)?;
        Ok(data)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = Path::new(&self.base_path).join(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(full_path, data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cli_defaults_match_query_defaults() {
        let config = CliConfig::parse_from(["warranty-batch"]);

        assert_eq!(config.concurrent_requests, 96);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.timeout_seconds, 3);
        assert_eq!(config.retry_delay_ms, 100);
        assert_eq!(config.checkpoint_interval, 100);
        assert_eq!(config.input, "-");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_validate_rejects_bad_values() {
        let mut config = CliConfig::parse_from(["warranty-batch"]);
        config.concurrent_requests = 0;
        assert!(config.validate().is_err());

        let mut config = CliConfig::parse_from(["warranty-batch"]);
        config.endpoint = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = CliConfig::parse_from(["warranty-batch"]);
        config.timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_local_storage_round_trip() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().to_str().unwrap().to_string());

        storage
            .write_file("nested/report.zip", b"archive bytes")
            .await
            .unwrap();
        let data = storage.read_file("nested/report.zip").await.unwrap();
        assert_eq!(data, b"archive bytes");
    }
}
