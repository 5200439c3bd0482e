use crate::domain::model::{Identifier, LookupReply};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// 對遠端保固服務的單筆查詢；實作必須是無狀態的，可並發呼叫
#[async_trait]
pub trait WarrantyLookup: Send + Sync {
    async fn lookup(&self, identifier: &Identifier) -> LookupReply;
}

pub trait QuerySettings: Send + Sync {
    fn endpoint(&self) -> &str;
    fn output_path(&self) -> &str;
    fn store_path(&self) -> &str;
    fn concurrent_requests(&self) -> usize;
    fn max_retries(&self) -> u32;
    fn timeout_seconds(&self) -> u64;
    fn retry_delay_ms(&self) -> u64;
    fn checkpoint_interval(&self) -> usize;
}
