//! Pictor Core - image search-and-vetting pipeline library.
//!
//! Pictor takes a free-text query and produces vetted, ranked images:
//! it searches an image provider, downloads and validates the candidates
//! concurrently, scores them with vision models (with fallback and
//! consensus), selects winners by weighted criteria, and optionally
//! re-hosts the winners and persists their metadata.
//!
//! # Architecture
//!
//! ```text
//! Query → Search → Fetch/Validate → Vision Analysis → Selection → Host/Persist
//! ```
//!
//! Every outbound call goes through a shared request executor that owns
//! rate limiting, retry with backoff, and the run's cost ledger.
//!
//! # Usage
//!
//! ```rust,ignore
//! use pictor_core::{Agent, Config, SearchQuery};
//!
//! #[tokio::main]
//! async fn main() -> pictor_core::Result<()> {
//!     let config = Config::load()?;
//!     let agent = Agent::from_config(config)?;
//!
//!     let report = agent.run(&SearchQuery::new("mountain sunrise"), Some(3)).await;
//!     println!("selected {} images", report.summary.selected);
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod agent;
pub mod config;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod search;
pub mod select;
pub mod store;
pub mod types;
pub mod vision;

// Re-exports for convenient access
pub use agent::{Agent, RunReport};
pub use config::Config;
pub use error::{
    ApiError, ConfigError, ExecutorError, PictorError, Result, SearchError, SelectionError,
    StorageError,
};
pub use executor::{CostLedger, RequestExecutor};
pub use fetch::ImageFetcher;
pub use search::SearchClient;
pub use select::{Criterion, Direction, SelectionEngine, SelectionOutcome, SelectionResult};
pub use store::StorageAdapter;
pub use types::{
    AnalysisResult, Candidate, ConfidenceSource, ConsensusAnalysis, CostEntry, ProcessedImage,
    RejectionReason, RunSummary, SearchQuery,
};
pub use vision::VisionEngine;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
