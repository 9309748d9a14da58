//! Officer-count and filing-history validation.
//!
//! Per company: a cached `valid` verdict is accepted without any external
//! call. Otherwise the active officer count is fetched, then the filing
//! history. Companies with fewer than [`MIN_ACTIVE_OFFICERS`] officers or with
//! an excluded filing are rejected and left out of the cache, so a later run
//! evaluates them again. Only fresh acceptances are cached.

use crate::cache::ValidationCache;
use crate::error::Result;
use crate::rate_limiter::RateLimiter;
use crate::retry::RetryPolicy;
use crate::sources::{FilingRecord, FilingSource, OfficerSource};
use bluechip_core::{CompanyNumber, Verdict};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Fewest active officers an accepted company may have.
pub const MIN_ACTIVE_OFFICERS: u32 = 2;

/// Filing descriptions that disqualify a company.
///
/// Matched case-insensitively as substrings, with `-` and `_` treated as spaces
/// on both sides so that slugs and prose descriptions compare equal.
pub const EXCLUDED_FILINGS: [&str; 5] = [
    "accounts-with-accounts-type-dormant",
    "accounts-with-accounts-type-unaudited-abridged",
    "accounts-with-accounts-type-total-exemption-full",
    "accounts-with-accounts-type-micro-entity",
    "first gazette",
];

/// Why a company was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Fewer active officers than required
    TooFewOfficers(u32),
    /// A filing matched the exclusion list
    ExcludedFiling(String),
    /// The company could not be looked up (e.g. unknown to the API)
    Unavailable(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewOfficers(count) => write!(
                f,
                "{count} active officer(s), at least {MIN_ACTIVE_OFFICERS} required"
            ),
            Self::ExcludedFiling(description) => write!(f, "excluded filing '{description}'"),
            Self::Unavailable(message) => write!(f, "lookup failed: {message}"),
        }
    }
}

/// Terminal state of validating one company.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// Accepted; `from_cache` is true when no external call was made
    Accepted { from_cache: bool },
    /// Rejected and not cached
    Rejected(RejectReason),
}

impl ValidationOutcome {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Result of validating a list of companies.
#[derive(Debug, Default)]
pub struct ValidationReport {
    /// Accepted companies, in input order
    pub accepted: Vec<CompanyNumber>,
    /// Rejected companies with their reasons
    pub rejected: Vec<(CompanyNumber, RejectReason)>,
    /// How many acceptances came straight from the cache
    pub cache_hits: usize,
}

/// Applies the officer and filing rules through the shared API limiter.
pub struct ValidationPipeline {
    officers: Arc<dyn OfficerSource>,
    filings: Arc<dyn FilingSource>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl ValidationPipeline {
    #[must_use]
    pub fn new(
        officers: Arc<dyn OfficerSource>,
        filings: Arc<dyn FilingSource>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            officers,
            filings,
            limiter,
            retry,
        }
    }

    /// Validate one company, caching a fresh acceptance.
    ///
    /// Lookups that fail for this company only (unknown number, unparseable
    /// response) reject it without caching.
    ///
    /// # Errors
    /// Returns transient errors once retries are exhausted, cache write
    /// failures, and `IngestError::Cancelled`.
    pub async fn validate(
        &self,
        number: &CompanyNumber,
        cache: &mut ValidationCache,
        cancel: &CancellationToken,
    ) -> Result<ValidationOutcome> {
        if cache.is_valid(number) {
            tracing::debug!("Company {} found in cache as valid", number);
            return Ok(ValidationOutcome::Accepted { from_cache: true });
        }

        let outcome = match self.check_rules(number, cancel).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_item_scoped() => {
                ValidationOutcome::Rejected(RejectReason::Unavailable(e.to_string()))
            }
            Err(e) => return Err(e),
        };

        match &outcome {
            ValidationOutcome::Accepted { .. } => {
                cache.put(number, Verdict::valid()).await?;
                tracing::debug!("Company {} accepted and cached", number);
            }
            ValidationOutcome::Rejected(reason) => {
                tracing::info!("Company {} rejected: {}", number, reason);
            }
        }

        Ok(outcome)
    }

    /// Validate `numbers` one at a time, in order.
    ///
    /// # Errors
    /// Stops at the first error that is not scoped to a single company.
    pub async fn validate_all(
        &self,
        numbers: &[CompanyNumber],
        cache: &mut ValidationCache,
        cancel: &CancellationToken,
    ) -> Result<ValidationReport> {
        let mut report = ValidationReport::default();

        for number in numbers {
            match self.validate(number, cache, cancel).await? {
                ValidationOutcome::Accepted { from_cache } => {
                    if from_cache {
                        report.cache_hits += 1;
                    }
                    report.accepted.push(number.clone());
                }
                ValidationOutcome::Rejected(reason) => {
                    report.rejected.push((number.clone(), reason));
                }
            }
        }

        tracing::info!(
            "Validated {} companies: {} accepted ({} from cache), {} rejected",
            numbers.len(),
            report.accepted.len(),
            report.cache_hits,
            report.rejected.len()
        );
        Ok(report)
    }

    async fn check_rules(
        &self,
        number: &CompanyNumber,
        cancel: &CancellationToken,
    ) -> Result<ValidationOutcome> {
        let officers = &self.officers;
        let count = self
            .retry
            .execute_throttled(&self.limiter, &format!("officers of {number}"), cancel, || {
                officers.active_officer_count(number)
            })
            .await?;

        if count < MIN_ACTIVE_OFFICERS {
            return Ok(ValidationOutcome::Rejected(RejectReason::TooFewOfficers(
                count,
            )));
        }

        let filings = &self.filings;
        let history = self
            .retry
            .execute_throttled(
                &self.limiter,
                &format!("filing history of {number}"),
                cancel,
                || filings.filing_history(number),
            )
            .await?;

        if let Some(filing) = find_excluded_filing(&history) {
            return Ok(ValidationOutcome::Rejected(RejectReason::ExcludedFiling(
                filing.description.clone(),
            )));
        }

        Ok(ValidationOutcome::Accepted { from_cache: false })
    }
}

/// First filing whose description matches the exclusion list.
#[must_use]
pub fn find_excluded_filing(history: &[FilingRecord]) -> Option<&FilingRecord> {
    let excluded: Vec<String> = EXCLUDED_FILINGS.iter().map(|e| normalize(e)).collect();

    history.iter().find(|filing| {
        let description = normalize(&filing.description);
        excluded.iter().any(|e| description.contains(e.as_str()))
    })
}

fn normalize(text: &str) -> String {
    text.to_lowercase()
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
