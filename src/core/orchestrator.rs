use crate::core::aggregate;
use crate::core::cache::ResultCache;
use crate::core::store::ResultStore;
use crate::domain::model::{
    BatchEvent, BatchSummary, Identifier, LookupReply, Outcome, QueryResult,
};
use crate::domain::ports::WarrantyLookup;
use chrono::Local;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

pub const DEFAULT_CONCURRENT_REQUESTS: usize = 96;
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 100;

/// 批次協調器：把一份序列號清單變成一串完成事件。
/// 快取與存放只有這裡會寫，所有共享狀態的變動都發生在完成處理路徑上。
pub struct BatchOrchestrator<L: WarrantyLookup + 'static> {
    lookup: Arc<L>,
    cache: ResultCache,
    store: ResultStore,
    concurrency: usize,
    checkpoint_interval: usize,
    events: UnboundedSender<BatchEvent>,
}

/// 單一批次進行中的計數
struct Tally {
    completed: usize,
    succeeded: usize,
    failed: Vec<Identifier>,
}

impl<L: WarrantyLookup + 'static> BatchOrchestrator<L> {
    pub fn new(lookup: Arc<L>, store: ResultStore, events: UnboundedSender<BatchEvent>) -> Self {
        Self {
            lookup,
            cache: ResultCache::new(),
            store,
            concurrency: DEFAULT_CONCURRENT_REQUESTS,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            events,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_checkpoint_interval(mut self, interval: usize) -> Self {
        self.checkpoint_interval = interval.max(1);
        self
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// 跑完一整個批次。完成順序與提交順序無關；部分失敗以資料回報，不丟錯誤。
    pub async fn run_batch(&mut self, identifiers: &[Identifier]) -> BatchSummary {
        let started_at = Local::now();
        let total = identifiers.len();

        if total == 0 {
            tracing::warn!("Empty batch, nothing to query");
            return BatchSummary::empty();
        }

        tracing::info!(
            "Dispatching batch of {} serial numbers ({} concurrent)",
            total,
            self.concurrency
        );

        let mut tally = Tally {
            completed: 0,
            succeeded: 0,
            failed: Vec::new(),
        };

        // 依提交順序先查快取；命中直接走完成路徑，未命中才進工作池
        let mut hits = Vec::new();
        let mut dispatch = Vec::new();
        for (position, identifier) in identifiers.iter().enumerate() {
            let index = position + 1;
            match self.cache.lookup(identifier) {
                Some(cached) => hits.push(QueryResult {
                    identifier: identifier.clone(),
                    index,
                    total,
                    outcome: cached.outcome.clone(),
                    retry_count: 0,
                }),
                None => dispatch.push((index, identifier.clone())),
            }
        }

        if !hits.is_empty() {
            tracing::info!("{} serial numbers answered from cache", hits.len());
        }
        for result in hits {
            self.handle_completion(result, total, &mut tally);
        }

        let lookup = Arc::clone(&self.lookup);
        let mut completions = stream::iter(dispatch)
            .map(move |(index, identifier)| {
                let lookup = Arc::clone(&lookup);
                async move {
                    let reply = lookup.lookup(&identifier).await;
                    (index, identifier, reply)
                }
            })
            .buffer_unordered(self.concurrency);

        while let Some((index, identifier, reply)) = completions.next().await {
            let result = build_result(identifier, index, total, reply);
            self.handle_completion(result, total, &mut tally);
        }
        drop(completions);

        // 批次結束無條件存檔
        self.checkpoint();

        let summary = BatchSummary {
            total,
            succeeded: tally.succeeded,
            failed_identifiers: tally.failed,
            started_at,
        };

        if summary.is_partial_failure() {
            tracing::warn!(
                "Batch finished: {}/{} succeeded, {} failed",
                summary.succeeded,
                summary.total,
                summary.failed_identifiers.len()
            );
        } else {
            tracing::info!("Batch finished: all {} queries succeeded", summary.total);
        }

        summary
    }

    /// 每筆完成結果的唯一處理點：記事件、進快取與存放、數進度、定期存檔
    fn handle_completion(&mut self, result: QueryResult, total: usize, tally: &mut Tally) {
        tally.completed += 1;

        if result.is_success() {
            tally.succeeded += 1;
            self.cache.record(&result);
            self.store.upsert(result.clone());
        } else {
            tally.failed.push(result.identifier.clone());
        }

        // 呈現層掛掉不影響批次進行
        let _ = self.events.send(BatchEvent::Result(result));
        let _ = self.events.send(BatchEvent::Progress {
            completed: tally.completed,
            total,
        });

        if tally.completed % self.checkpoint_interval == 0 {
            self.checkpoint();
        }
    }

    /// 存檔失敗只通報操作者，不中斷記憶體內的聚合
    fn checkpoint(&self) {
        if let Err(e) = self.store.save() {
            tracing::error!(
                "Failed to persist result store {}: {}",
                self.store.path().display(),
                e
            );
        }
    }
}

fn build_result(
    identifier: Identifier,
    index: usize,
    total: usize,
    reply: LookupReply,
) -> QueryResult {
    let outcome = match reply.outcome {
        Ok(payload) => {
            let counts = aggregate::service_counts(&payload);
            Outcome::Success { payload, counts }
        }
        Err(reason) => Outcome::Failure { reason },
    };

    QueryResult {
        identifier,
        index,
        total,
        outcome,
        retry_count: reply.retries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    struct StubLookup {
        calls: AtomicUsize,
        failing: HashSet<String>,
    }

    impl StubLookup {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failing: HashSet::new(),
            }
        }

        fn failing_on(serials: &[&str]) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failing: serials.iter().map(|s| s.to_string()).collect(),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WarrantyLookup for StubLookup {
        async fn lookup(&self, identifier: &Identifier) -> LookupReply {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(identifier.as_str()) {
                LookupReply {
                    outcome: Err("connection reset".to_string()),
                    retries: 2,
                }
            } else {
                LookupReply {
                    outcome: Ok(serde_json::json!({
                        "statusCode": 200,
                        "data": {"detailinfo": {"warranty": [{"DateDifference": 30}]}}
                    })),
                    retries: 0,
                }
            }
        }
    }

    fn identifiers(serials: &[&str]) -> Vec<Identifier> {
        serials
            .iter()
            .map(|s| Identifier::parse(s).unwrap())
            .collect()
    }

    fn drain(
        rx: &mut mpsc::UnboundedReceiver<BatchEvent>,
    ) -> (Vec<QueryResult>, Vec<(usize, usize)>) {
        let mut results = Vec::new();
        let mut progress = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                BatchEvent::Result(result) => results.push(result),
                BatchEvent::Progress { completed, total } => progress.push((completed, total)),
            }
        }
        (results, progress)
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let store = ResultStore::load(dir.path().join("results.json"));
        let mut orchestrator = BatchOrchestrator::new(Arc::new(StubLookup::new()), store, tx);

        let summary = orchestrator.run_batch(&[]).await;

        assert_eq!(summary.total, 0);
        assert!(!summary.is_partial_failure());
        let (results, progress) = drain(&mut rx);
        assert!(results.is_empty());
        assert!(progress.is_empty());
    }

    #[tokio::test]
    async fn test_progress_increases_to_total_exactly_once() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let store = ResultStore::load(dir.path().join("results.json"));
        let mut orchestrator = BatchOrchestrator::new(Arc::new(StubLookup::new()), store, tx)
            .with_concurrency(4);

        let ids = identifiers(&["AAAA1111", "BBBB2222", "CCCC3333", "DDDD4444", "EEEE5555"]);
        let summary = orchestrator.run_batch(&ids).await;

        assert_eq!(summary.total, 5);
        assert_eq!(summary.succeeded, 5);

        let (results, progress) = drain(&mut rx);
        assert_eq!(results.len(), 5);
        let completed: Vec<usize> = progress.iter().map(|(c, _)| *c).collect();
        assert_eq!(completed, vec![1, 2, 3, 4, 5]);
        assert!(progress.iter().all(|(_, t)| *t == 5));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network_and_returns_identical_outcome() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let store = ResultStore::load(dir.path().join("results.json"));
        let lookup = Arc::new(StubLookup::new());
        let mut orchestrator = BatchOrchestrator::new(Arc::clone(&lookup), store, tx);

        let ids = identifiers(&["AAAA1111", "BBBB2222"]);
        orchestrator.run_batch(&ids).await;
        assert_eq!(lookup.calls(), 2);
        let (first_results, _) = drain(&mut rx);

        let summary = orchestrator.run_batch(&ids).await;
        // Second run makes zero network calls
        assert_eq!(lookup.calls(), 2);
        assert_eq!(summary.succeeded, 2);

        let (second_results, progress) = drain(&mut rx);
        assert_eq!(second_results.len(), 2);
        assert_eq!(progress.last(), Some(&(2, 2)));
        for second in &second_results {
            let first = first_results
                .iter()
                .find(|r| r.identifier == second.identifier)
                .unwrap();
            assert_eq!(first.outcome, second.outcome);
            assert_eq!(second.retry_count, 0);
        }
    }

    #[tokio::test]
    async fn test_failures_collected_not_cached() {
        let dir = TempDir::new().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let store = ResultStore::load(dir.path().join("results.json"));
        let lookup = Arc::new(StubLookup::failing_on(&["BBBB2222"]));
        let mut orchestrator = BatchOrchestrator::new(Arc::clone(&lookup), store, tx);

        let ids = identifiers(&["AAAA1111", "BBBB2222", "CCCC3333"]);
        let summary = orchestrator.run_batch(&ids).await;

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed_identifiers.len(), 1);
        assert_eq!(summary.failed_identifiers[0].as_str(), "BBBB2222");

        // Failures land in neither cache nor store
        assert!(orchestrator
            .cache()
            .lookup(&Identifier::parse("BBBB2222").unwrap())
            .is_none());
        assert!(orchestrator
            .store()
            .get(&Identifier::parse("BBBB2222").unwrap())
            .is_none());

        // Re-running hits the network again for the failed one
        orchestrator.run_batch(&ids).await;
        assert_eq!(lookup.calls(), 4);
    }

    #[tokio::test]
    async fn test_duplicate_in_same_batch_tolerated() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let store = ResultStore::load(dir.path().join("results.json"));
        let mut orchestrator = BatchOrchestrator::new(Arc::new(StubLookup::new()), store, tx);

        let ids = identifiers(&["AAAA1111", "AAAA1111"]);
        let summary = orchestrator.run_batch(&ids).await;

        // Both occurrences emit events, but the store keeps one entry
        assert_eq!(summary.total, 2);
        let (results, _) = drain(&mut rx);
        assert_eq!(results.len(), 2);
        assert_eq!(orchestrator.store().len(), 1);
    }

    #[tokio::test]
    async fn test_checkpoint_interval_drives_store_saves() {
        let dir = TempDir::new().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let store = ResultStore::load(dir.path().join("results.json"));
        let mut orchestrator = BatchOrchestrator::new(Arc::new(StubLookup::new()), store, tx)
            .with_concurrency(16)
            .with_checkpoint_interval(100);

        // 250 items, interval 100: saves at 100 and 200, plus the final save
        let ids: Vec<Identifier> = (0..250)
            .map(|i| Identifier::parse(&format!("SN{:07}", i)).unwrap())
            .collect();
        let summary = orchestrator.run_batch(&ids).await;

        assert_eq!(summary.succeeded, 250);
        assert_eq!(orchestrator.store().save_count(), 3);
        assert_eq!(orchestrator.store().len(), 250);
    }

    #[tokio::test]
    async fn test_store_keeps_single_entry_per_identifier() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        let (tx, _rx) = mpsc::unbounded_channel();
        let store = ResultStore::load(&path);
        let mut orchestrator = BatchOrchestrator::new(Arc::new(StubLookup::new()), store, tx);

        let ids = identifiers(&["AAAA1111", "BBBB2222"]);
        orchestrator.run_batch(&ids).await;
        orchestrator.run_batch(&ids).await;

        assert_eq!(orchestrator.store().len(), 2);

        // Persisted document matches in-memory state after the batch
        let reloaded = ResultStore::load(&path);
        assert_eq!(reloaded.snapshot(), orchestrator.store().snapshot());
    }
}
