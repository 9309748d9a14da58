//! Page-by-page scan over a search result set.
//!
//! A scan starts at page 1 and stops at the first empty page, or at the first
//! page on which every identifier is already known. The second condition is a
//! heuristic: it assumes results are listed newest first, so a page of known
//! companies means the rest have been ingested before. When the upstream
//! ordering is not strictly chronological, new companies listed behind such a
//! page are missed until a scan reaches them some other way. This trades
//! completeness for not re-scraping whole result sets on every run.

use crate::error::Result;
use crate::rate_limiter::RateLimiter;
use crate::retry::RetryPolicy;
use crate::sources::{ExistenceOracle, SearchPageSource};
use bluechip_core::CompanyNumber;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Position of a scan for one query key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageState {
    /// Query key (postcode district) being scanned
    pub query_key: String,
    /// Next page to fetch, starting at 1
    pub page: u32,
    /// Set once the scan has stopped
    pub terminated: bool,
}

/// Why a scan stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// A page came back empty
    Exhausted,
    /// Every identifier on a page was already known
    AllKnown,
    /// The configured page limit was reached
    PageLimit,
}

/// Builds scans over a search source, deduplicating against an oracle.
pub struct PageScanner {
    source: Arc<dyn SearchPageSource>,
    oracle: Arc<dyn ExistenceOracle>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    max_pages: Option<u32>,
}

impl PageScanner {
    /// `limiter` is the limiter of the provider serving the search pages.
    #[must_use]
    pub fn new(
        source: Arc<dyn SearchPageSource>,
        oracle: Arc<dyn ExistenceOracle>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            oracle,
            limiter,
            retry,
            max_pages: None,
        }
    }

    /// Stop every scan after `max_pages` pages.
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: Option<u32>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Start a fresh scan of `query_key` from page 1.
    #[must_use]
    pub fn scan_all(&self, query_key: impl Into<String>) -> PaginationCursor<'_> {
        PaginationCursor {
            scanner: self,
            state: PageState {
                query_key: query_key.into(),
                page: 1,
                terminated: false,
            },
            termination: None,
            seen: HashSet::new(),
        }
    }
}

/// A lazy, finite sequence of batches of new identifiers.
///
/// Not restartable: once terminated it only returns `None`.
pub struct PaginationCursor<'a> {
    scanner: &'a PageScanner,
    state: PageState,
    termination: Option<Termination>,
    seen: HashSet<CompanyNumber>,
}

impl PaginationCursor<'_> {
    /// Fetch pages until one yields new identifiers, or the scan ends.
    ///
    /// # Errors
    /// Returns the page fetch or existence check error once retries are
    /// exhausted, or `IngestError::Cancelled`. The cursor is left where it was.
    pub async fn next_batch(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<CompanyNumber>>> {
        if self.state.terminated {
            return Ok(None);
        }

        if let Some(max_pages) = self.scanner.max_pages {
            if self.state.page > max_pages {
                return Ok(self.terminate(Termination::PageLimit));
            }
        }

        let page = self.state.page;
        let query_key = self.state.query_key.as_str();
        let label = format!("search page {page} for {query_key}");
        let source = &self.scanner.source;

        let ids = self
            .scanner
            .retry
            .execute_throttled(&self.scanner.limiter, &label, cancel, || {
                source.fetch_page(query_key, page)
            })
            .await?;

        self.state.page += 1;

        if ids.is_empty() {
            tracing::debug!("Page {} for {} is empty", page, self.state.query_key);
            return Ok(self.terminate(Termination::Exhausted));
        }

        let mut fresh = Vec::new();
        let mut known = 0;
        for id in ids {
            if self.seen.contains(&id) || fresh.contains(&id) {
                known += 1;
                continue;
            }

            let oracle = &self.scanner.oracle;
            let exists = self
                .scanner
                .retry
                .execute(&format!("existence check for {id}"), cancel, || {
                    oracle.exists(&id)
                })
                .await?;

            if exists {
                known += 1;
            } else {
                fresh.push(id);
            }
        }

        if fresh.is_empty() {
            tracing::info!(
                "All {} companies on page {} for {} are already known, stopping",
                known,
                page,
                self.state.query_key
            );
            return Ok(self.terminate(Termination::AllKnown));
        }

        tracing::debug!(
            "Page {} for {}: {} new, {} already known",
            page,
            self.state.query_key,
            fresh.len(),
            known
        );
        self.seen.extend(fresh.iter().cloned());
        Ok(Some(fresh))
    }

    /// Drain the scan into one list, in order of first appearance.
    pub async fn collect_all(&mut self, cancel: &CancellationToken) -> Result<Vec<CompanyNumber>> {
        let mut all = Vec::new();
        while let Some(batch) = self.next_batch(cancel).await? {
            all.extend(batch);
        }
        Ok(all)
    }

    #[must_use]
    pub fn state(&self) -> &PageState {
        &self.state
    }

    /// Why the scan stopped, once it has.
    #[must_use]
    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    fn terminate(&mut self, reason: Termination) -> Option<Vec<CompanyNumber>> {
        self.state.terminated = true;
        self.termination = Some(reason);
        None
    }
}
