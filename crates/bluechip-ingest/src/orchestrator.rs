//! Pipeline orchestration.
//!
//! Runs the stages in strict sequence, scan, validate, fetch profiles,
//! geocode, persist, each processing one company at a time. Every stage
//! shares the cancellation token of the pipeline.

use crate::cache::ValidationCache;
use crate::detail::DetailFetcher;
use crate::enrichment::EnrichmentStage;
use crate::error::Result;
use crate::pagination::PageScanner;
use crate::persistence::PersistenceStage;
use crate::rate_limiter::RateLimiter;
use crate::retry::RetryPolicy;
use crate::sources::{
    CompanyDetailSource, EntityStore, ExistenceOracle, FilingSource, Geocoder, OfficerSource,
    SearchPageSource,
};
use crate::validation::ValidationPipeline;
use bluechip_core::{AppConfig, CompanyNumber};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// External collaborators of a pipeline run.
pub struct PipelineSources {
    pub search: Arc<dyn SearchPageSource>,
    pub officers: Arc<dyn OfficerSource>,
    pub filings: Arc<dyn FilingSource>,
    pub details: Arc<dyn CompanyDetailSource>,
    pub geocoder: Arc<dyn Geocoder>,
    pub oracle: Arc<dyn ExistenceOracle>,
    pub store: Arc<dyn EntityStore>,
}

/// The two provider limiters and the shared retry policy.
#[derive(Clone)]
pub struct PipelineLimits {
    /// Shared by search pages, officer, filing and profile requests
    pub api: Arc<RateLimiter>,
    /// Dedicated to the geocoder
    pub geocoding: Arc<RateLimiter>,
    pub retry: RetryPolicy,
    pub max_pages: Option<u32>,
}

impl PipelineLimits {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            api: Arc::new(RateLimiter::new(
                "companies-house",
                config.companies_house.rate_limit,
                Duration::from_secs(config.companies_house.window_secs),
            )),
            geocoding: Arc::new(RateLimiter::per_second_from_daily_quota(
                "geocoding",
                config.geocoding.daily_quota,
            )),
            retry: RetryPolicy::from_config(&config.retry),
            max_pages: config.search.max_pages,
        }
    }
}

/// Counters for one run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Query keys scanned
    pub query_keys: usize,
    /// New identifiers yielded by the scans
    pub scanned: usize,
    /// Companies accepted by validation
    pub accepted: usize,
    /// Acceptances answered by the cache
    pub cache_hits: usize,
    /// Companies rejected by validation
    pub rejected: usize,
    /// Profiles that could not be fetched or used
    pub profiles_skipped: usize,
    /// Entities that gained coordinates
    pub geocoded: usize,
    /// Entities left without coordinates
    pub geocode_misses: usize,
    /// Rows written to the store
    pub inserted: u64,
    /// Entities dropped at persistence because they were already stored
    pub already_stored: usize,
}

/// The full ingestion pipeline.
pub struct IngestPipeline {
    scanner: PageScanner,
    validation: ValidationPipeline,
    details: DetailFetcher,
    enrichment: EnrichmentStage,
    persistence: PersistenceStage,
    oracle: Arc<dyn ExistenceOracle>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl IngestPipeline {
    #[must_use]
    pub fn new(sources: PipelineSources, limits: PipelineLimits, cancel: CancellationToken) -> Self {
        Self {
            scanner: PageScanner::new(
                sources.search,
                sources.oracle.clone(),
                limits.api.clone(),
                limits.retry,
            )
            .with_max_pages(limits.max_pages),
            validation: ValidationPipeline::new(
                sources.officers,
                sources.filings,
                limits.api.clone(),
                limits.retry,
            ),
            details: DetailFetcher::new(sources.details, limits.api, limits.retry),
            enrichment: EnrichmentStage::new(sources.geocoder, limits.geocoding, limits.retry),
            persistence: PersistenceStage::new(sources.store),
            oracle: sources.oracle,
            retry: limits.retry,
            cancel,
        }
    }

    /// Scan `query_keys`, then validate, enrich and store the new companies.
    ///
    /// A run that finds nothing new returns normally with an empty report.
    ///
    /// # Errors
    /// Returns the first error not scoped to a single company. Acceptances
    /// already flushed to `cache` stay valid for the next run.
    pub async fn run(&self, query_keys: &[String], cache: &mut ValidationCache) -> Result<RunReport> {
        let mut report = RunReport {
            query_keys: query_keys.len(),
            ..RunReport::default()
        };

        let numbers = self.scan(query_keys).await?;
        report.scanned = numbers.len();
        if numbers.is_empty() {
            tracing::info!("No new companies found, nothing to do");
            return Ok(report);
        }

        let validation = self
            .validation
            .validate_all(&numbers, cache, &self.cancel)
            .await?;
        report.accepted = validation.accepted.len();
        report.cache_hits = validation.cache_hits;
        report.rejected = validation.rejected.len();

        self.process_accepted(&validation.accepted, &mut report)
            .await?;
        Ok(report)
    }

    /// Purge non-valid cache entries, then take every cached acceptance that
    /// is not yet stored through profile fetch, geocoding and persistence.
    ///
    /// No officer or filing requests are made.
    ///
    /// # Errors
    /// Returns cache write errors and the first error not scoped to a single company.
    pub async fn reprocess_cache(&self, cache: &mut ValidationCache) -> Result<RunReport> {
        cache.purge_non_valid().await?;

        let mut pending = Vec::new();
        let mut already_stored = 0;
        for number in cache.valid_numbers() {
            let oracle = &self.oracle;
            let exists = self
                .retry
                .execute(&format!("existence check for {number}"), &self.cancel, || {
                    oracle.exists(&number)
                })
                .await?;
            if exists {
                already_stored += 1;
            } else {
                pending.push(number);
            }
        }

        tracing::info!(
            "Reprocessing {} cached companies ({} already stored)",
            pending.len(),
            already_stored
        );

        let mut report = RunReport {
            accepted: pending.len(),
            cache_hits: pending.len(),
            already_stored,
            ..RunReport::default()
        };
        self.process_accepted(&pending, &mut report).await?;
        Ok(report)
    }

    async fn scan(&self, query_keys: &[String]) -> Result<Vec<CompanyNumber>> {
        let mut seen = HashSet::new();
        let mut numbers = Vec::new();

        for key in query_keys {
            tracing::info!("Scanning {}", key);
            let mut cursor = self.scanner.scan_all(key.as_str());
            while let Some(batch) = cursor.next_batch(&self.cancel).await? {
                numbers.extend(batch.into_iter().filter(|n| seen.insert(n.clone())));
            }
            tracing::info!(
                "Finished {} after {} pages ({:?})",
                key,
                cursor.state().page.saturating_sub(1),
                cursor.termination()
            );
        }

        Ok(numbers)
    }

    async fn process_accepted(
        &self,
        accepted: &[CompanyNumber],
        report: &mut RunReport,
    ) -> Result<()> {
        if accepted.is_empty() {
            tracing::info!("No accepted companies to process");
            return Ok(());
        }

        let details = self.details.fetch_all(accepted, &self.cancel).await?;
        report.profiles_skipped = details.skipped.len();

        let enriched = self.enrichment.enrich(details.entities, &self.cancel).await?;
        report.geocoded = enriched.geocoded;
        report.geocode_misses = enriched.misses + enriched.no_address;

        let persisted = self
            .persistence
            .persist(enriched.entities, &self.cancel)
            .await?;
        report.inserted = persisted.inserted;
        report.already_stored += persisted.already_stored.len();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_from_config() {
        let mut config = AppConfig::default();
        config.companies_house.rate_limit = 100;
        config.companies_house.window_secs = 60;
        config.geocoding.daily_quota = 172_800;
        config.search.max_pages = Some(5);

        let limits = PipelineLimits::from_config(&config);
        assert_eq!(limits.api.limit(), 100);
        assert_eq!(limits.api.interval(), Duration::from_secs(60));
        assert_eq!(limits.geocoding.limit(), 2);
        assert_eq!(limits.geocoding.interval(), Duration::from_secs(1));
        assert_eq!(limits.retry.max_retries(), 3);
        assert_eq!(limits.max_pages, Some(5));
        assert!(!Arc::ptr_eq(&limits.api, &limits.geocoding));
    }
}
