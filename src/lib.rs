pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use config::{toml_config::TomlConfig, CliConfig, LocalStorage};
pub use core::engine::{BatchEngine, BatchReport};
pub use core::fetcher::WarrantyClient;
pub use core::orchestrator::BatchOrchestrator;
pub use core::store::ResultStore;
pub use domain::model::{
    BatchEvent, BatchSummary, Identifier, Outcome, QueryResult, ServiceCounts,
};
pub use domain::ports::{QuerySettings, Storage, WarrantyLookup};
pub use utils::error::{QueryError, Result};
