//! Collaborator traits consumed by the pipeline stages.
//!
//! Each external dependency (search pages, officer and filing endpoints,
//! company profiles, the geocoder, the store) sits behind one of these traits
//! so stages can be driven by in-memory fakes in tests. Implementations only
//! perform the call; rate limiting and retry are applied by the stage that
//! invokes them.

use crate::error::Result;
use async_trait::async_trait;
use bluechip_core::{CompanyNumber, Coordinates, Entity};
use serde::{Deserialize, Serialize};

/// One page of search results for a query key.
#[async_trait]
pub trait SearchPageSource: Send + Sync {
    /// Fetch result page `page` (1-based) for `query_key`.
    ///
    /// Returns identifiers in page order. An empty list means the result set
    /// is exhausted.
    async fn fetch_page(&self, query_key: &str, page: u32) -> Result<Vec<CompanyNumber>>;
}

/// Active officer counts.
#[async_trait]
pub trait OfficerSource: Send + Sync {
    async fn active_officer_count(&self, number: &CompanyNumber) -> Result<u32>;
}

/// A single entry of a company's filing history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingRecord {
    /// Free-text (or slug) description of the filing
    #[serde(default)]
    pub description: String,
    /// Filing date as reported upstream
    #[serde(default)]
    pub date: Option<String>,
    /// Filing category as reported upstream
    #[serde(default)]
    pub category: Option<String>,
}

impl FilingRecord {
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }
}

/// Filing history, most recent first.
#[async_trait]
pub trait FilingSource: Send + Sync {
    async fn filing_history(&self, number: &CompanyNumber) -> Result<Vec<FilingRecord>>;
}

/// Company profile lookups.
#[async_trait]
pub trait CompanyDetailSource: Send + Sync {
    /// Fetch the profile of `number` as an entity without coordinates.
    async fn fetch_company(&self, number: &CompanyNumber) -> Result<Entity>;
}

/// Free-text address geocoding.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve `query` to a coordinate pair. `Ok(None)` means no result.
    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>>;
}

/// "Is this company already recorded?"
#[async_trait]
pub trait ExistenceOracle: Send + Sync {
    async fn exists(&self, number: &CompanyNumber) -> Result<bool>;
}

/// A store that can hand out a write session.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Establish a session (one connection) against the store.
    ///
    /// # Errors
    /// Returns `IngestError::Store` if no connection can be established.
    async fn open_session(&self) -> Result<Box<dyn StoreSession>>;
}

/// A single connection to the store. Dropping the session releases it.
#[async_trait]
pub trait StoreSession: Send {
    async fn exists(&mut self, number: &CompanyNumber) -> Result<bool>;

    /// Insert `entities`, skipping any already present. Returns rows written.
    async fn insert_batch(&mut self, entities: &[Entity]) -> Result<u64>;
}

/// Postcode district discovery for a postcode area.
#[async_trait]
pub trait PostcodeSource: Send + Sync {
    /// District codes of `area` (e.g. `SN1`, `SN2` for `SN`), in first-seen order.
    async fn districts(&self, area: &str) -> Result<Vec<String>>;
}
