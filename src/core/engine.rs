use crate::core::normalizer;
use crate::core::orchestrator::BatchOrchestrator;
use crate::core::report;
use crate::domain::model::BatchSummary;
use crate::domain::ports::{Storage, WarrantyLookup};
use crate::utils::error::Result;
use crate::utils::monitor::BatchMonitor;

/// 一次批次執行的最終產出
#[derive(Debug)]
pub struct BatchReport {
    pub summary: BatchSummary,
    pub export_path: Option<String>,
    pub invalid: Vec<String>,
    pub duplicates: Vec<String>,
}

/// 把原始輸入文字跑成完整批次：正規化 → 併發查詢 → 匯出報表
pub struct BatchEngine<L: WarrantyLookup + 'static, S: Storage> {
    orchestrator: BatchOrchestrator<L>,
    storage: S,
    output_path: String,
    monitor: BatchMonitor,
}

impl<L: WarrantyLookup + 'static, S: Storage> BatchEngine<L, S> {
    pub fn new(orchestrator: BatchOrchestrator<L>, storage: S, output_path: String) -> Self {
        Self {
            orchestrator,
            storage,
            output_path,
            monitor: BatchMonitor::default(),
        }
    }

    pub fn new_with_monitoring(
        orchestrator: BatchOrchestrator<L>,
        storage: S,
        output_path: String,
        monitor_enabled: bool,
    ) -> Self {
        Self {
            orchestrator,
            storage,
            output_path,
            monitor: BatchMonitor::new(monitor_enabled),
        }
    }

    pub async fn run(&mut self, raw_input: &str) -> Result<BatchReport> {
        println!("Parsing serial numbers...");
        let normalized = normalizer::parse_serial_input(raw_input);

        // 無效與重複的 token 在批次開始前就回報給呼叫端
        if !normalized.invalid.is_empty() {
            tracing::warn!(
                "⚠️ {} invalid serial numbers skipped: {}",
                normalized.invalid.len(),
                normalized.invalid.join(", ")
            );
        }
        if !normalized.duplicates.is_empty() {
            tracing::warn!(
                "⚠️ {} duplicate serial numbers removed: {}",
                normalized.duplicates.len(),
                normalized.duplicates.join(", ")
            );
        }

        if normalized.identifiers.is_empty() {
            tracing::warn!("No valid serial numbers in input, nothing to do");
            return Ok(BatchReport {
                summary: BatchSummary::empty(),
                export_path: None,
                invalid: normalized.invalid,
                duplicates: normalized.duplicates,
            });
        }
        self.monitor.log_phase("Normalize");

        println!("Querying {} serial numbers...", normalized.identifiers.len());
        let summary = self.orchestrator.run_batch(&normalized.identifiers).await;
        self.monitor.log_phase("Query");

        println!("Rendering report...");
        let snapshot = self.orchestrator.store().snapshot();
        let filename = report::export_report(
            &self.storage,
            &normalized.identifiers,
            &snapshot,
            summary.started_at,
        )
        .await?;
        let export_path = format!("{}/{}", self.output_path, filename);
        self.monitor.log_phase("Export");

        if summary.is_partial_failure() {
            // 失敗清單原樣另存，下一輪可直接餵回只重查失敗子集
            let failed_text = summary
                .failed_identifiers
                .iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            self.storage
                .write_file("failed_serials.txt", failed_text.as_bytes())
                .await?;
            tracing::info!(
                "Failed serial numbers written to {}/failed_serials.txt",
                self.output_path
            );
        }

        Ok(BatchReport {
            summary,
            export_path: Some(export_path),
            invalid: normalized.invalid,
            duplicates: normalized.duplicates,
        })
    }
}
