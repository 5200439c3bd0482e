use clap::Parser;
use std::io::Read;
use std::sync::Arc;
use tokio::sync::mpsc;
use warranty_batch::utils::{logger, validation::Validate};
use warranty_batch::{
    BatchEngine, BatchEvent, BatchOrchestrator, CliConfig, LocalStorage, Outcome, QuerySettings,
    ResultStore, TomlConfig, WarrantyClient,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliConfig::parse();

    logger::init_cli_logger(cli.verbose);

    tracing::info!("Starting warranty-batch CLI");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    // 配置來源：指定 TOML 檔時整份用它，否則用命令列參數
    let settings: Box<dyn QuerySettings> = match &cli.config {
        Some(path) => {
            let loaded = TomlConfig::from_file(path).and_then(|config| {
                config.validate_config()?;
                Ok(config)
            });
            match loaded {
                Ok(config) => Box::new(config),
                Err(e) => {
                    tracing::error!("❌ Failed to load config file {}: {}", path, e);
                    eprintln!("❌ {}", e);
                    std::process::exit(2);
                }
            }
        }
        None => {
            if let Err(e) = cli.validate() {
                tracing::error!("❌ Configuration validation failed: {}", e);
                eprintln!("❌ {}", e);
                std::process::exit(2);
            }
            Box::new(cli.clone())
        }
    };

    if cli.clear {
        let mut store = ResultStore::load(settings.store_path());
        store.clear()?;
        println!("🧹 Cleared stored results ({})", settings.store_path());
        return Ok(());
    }

    let raw_input = read_input(&cli.input)?;

    let store = ResultStore::load(settings.store_path());
    if !store.is_empty() {
        tracing::info!(
            "Loaded {} previous results from {}",
            store.len(),
            settings.store_path()
        );
    }

    let client = WarrantyClient::from_settings(settings.as_ref());
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    // 呈現層：單純消費事件流，不回饋到批次協調
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                BatchEvent::Result(result) => match &result.outcome {
                    Outcome::Success { counts, .. } => println!(
                        "[{}/{}] {} OK - {} valid / {} expired ({} retries)",
                        result.index,
                        result.total,
                        result.identifier,
                        counts.valid_services,
                        counts.expired_services,
                        result.retry_count
                    ),
                    Outcome::Failure { reason } => println!(
                        "[{}/{}] {} FAILED - {}",
                        result.index, result.total, result.identifier, reason
                    ),
                },
                BatchEvent::Progress { completed, total } => {
                    if completed % 20 == 0 || completed == total {
                        tracing::info!("Progress: {}/{}", completed, total);
                    }
                }
            }
        }
    });

    let orchestrator = BatchOrchestrator::new(Arc::new(client), store, events_tx)
        .with_concurrency(settings.concurrent_requests())
        .with_checkpoint_interval(settings.checkpoint_interval());
    let storage = LocalStorage::new(settings.output_path().to_string());
    let mut engine = BatchEngine::new_with_monitoring(
        orchestrator,
        storage,
        settings.output_path().to_string(),
        cli.monitor,
    );

    match engine.run(&raw_input).await {
        Ok(report) => {
            // 事件端已經沒人會再送，收掉呈現任務
            drop(engine);
            printer.await.ok();

            let summary = &report.summary;
            println!(
                "✅ Batch finished: {}/{} succeeded",
                summary.succeeded, summary.total
            );
            if let Some(path) = &report.export_path {
                println!("📁 Report saved to: {}", path);
            }
            if summary.is_partial_failure() {
                println!(
                    "⚠️ {} serial numbers failed, re-submit with the list below:",
                    summary.failed_identifiers.len()
                );
                for identifier in &summary.failed_identifiers {
                    println!("  {}", identifier);
                }
            }
        }
        Err(e) => {
            tracing::error!("❌ Batch run failed: {}", e);
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn read_input(input: &str) -> std::io::Result<String> {
    if input == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        std::fs::read_to_string(input)
    }
}
