//! Bluechip Ingestion Pipeline
//!
//! Discovers companies from the advanced search, validates them against
//! officer and filing rules, geocodes their registered office and stores the
//! new ones.
//!
//! # Architecture
//!
//! - **Rate limiting**: one sliding-window [`RateLimiter`] per provider, shared
//!   by every call against it
//! - **Retry**: [`RetryPolicy`] retries transient failures with doubling backoff
//!   and re-acquires the limiter before each attempt
//! - **Resumability**: [`ValidationCache`] persists acceptances after each one,
//!   so an interrupted run never repeats confirmed work
//! - **Collaborators**: every external call sits behind a trait in [`sources`],
//!   with HTTP implementations in [`clients`] and the SQLite store in [`store`]
//!
//! # Example
//!
//! ```ignore
//! use bluechip_ingest::{IngestPipeline, PipelineLimits, ValidationCache};
//!
//! let pipeline = IngestPipeline::new(sources, PipelineLimits::from_config(&config), cancel);
//! let mut cache = ValidationCache::load(&config.cache.path).await?;
//! let report = pipeline.run(&query_keys, &mut cache).await?;
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod cache;
pub mod clients;
pub mod detail;
pub mod enrichment;
pub mod error;
pub mod orchestrator;
pub mod pagination;
pub mod parser;
pub mod persistence;
pub mod postcodes;
pub mod rate_limiter;
pub mod retry;
pub mod sources;
pub mod store;
pub mod url_builder;
pub mod validation;

pub use cache::ValidationCache;
pub use detail::{DetailFetcher, DetailReport};
pub use enrichment::{EnrichmentReport, EnrichmentStage};
pub use error::{CacheError, IngestError, Result};
pub use orchestrator::{IngestPipeline, PipelineLimits, PipelineSources, RunReport};
pub use pagination::{PageScanner, PageState, PaginationCursor, Termination};
pub use persistence::{PersistReport, PersistenceStage};
pub use postcodes::discover_query_keys;
pub use rate_limiter::RateLimiter;
pub use retry::RetryPolicy;
pub use sources::{
    CompanyDetailSource, EntityStore, ExistenceOracle, FilingRecord, FilingSource, Geocoder,
    OfficerSource, PostcodeSource, SearchPageSource, StoreSession,
};
pub use validation::{RejectReason, ValidationOutcome, ValidationPipeline, ValidationReport};
