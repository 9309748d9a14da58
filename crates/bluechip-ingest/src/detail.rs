//! Company profile fetch for accepted companies.

use crate::error::Result;
use crate::rate_limiter::RateLimiter;
use crate::retry::RetryPolicy;
use crate::sources::CompanyDetailSource;
use bluechip_core::{CompanyNumber, Entity};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Profiles fetched for a list of companies.
#[derive(Debug, Default)]
pub struct DetailReport {
    /// Fetched entities, in input order
    pub entities: Vec<Entity>,
    /// Companies whose profile could not be used, with the reason
    pub skipped: Vec<(CompanyNumber, String)>,
}

/// Fetches company profiles one at a time through the API limiter.
pub struct DetailFetcher {
    source: Arc<dyn CompanyDetailSource>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl DetailFetcher {
    #[must_use]
    pub fn new(
        source: Arc<dyn CompanyDetailSource>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            limiter,
            retry,
        }
    }

    /// Fetch every profile in `numbers`.
    ///
    /// Profiles that cannot be fetched for the company alone, or that carry no
    /// name, are skipped.
    ///
    /// # Errors
    /// Returns transient errors once retries are exhausted, and
    /// `IngestError::Cancelled`.
    pub async fn fetch_all(
        &self,
        numbers: &[CompanyNumber],
        cancel: &CancellationToken,
    ) -> Result<DetailReport> {
        let mut report = DetailReport::default();
        let source = &self.source;

        for number in numbers {
            let fetched = self
                .retry
                .execute_throttled(&self.limiter, &format!("profile of {number}"), cancel, || {
                    source.fetch_company(number)
                })
                .await;

            let entity = match fetched {
                Ok(entity) => entity,
                Err(e) if e.is_item_scoped() => {
                    tracing::warn!("Skipping company {}: {}", number, e);
                    report.skipped.push((number.clone(), e.to_string()));
                    continue;
                }
                Err(e) => return Err(e),
            };

            if !entity.is_complete() {
                tracing::warn!("Skipping company {}: profile has no name", number);
                report
                    .skipped
                    .push((number.clone(), "profile has no name".to_string()));
                continue;
            }
            if entity.address.line_1.is_none() {
                tracing::info!("Company {} is missing address line 1", number);
            }

            report.entities.push(entity);
        }

        tracing::info!(
            "Fetched {} company profiles, skipped {}",
            report.entities.len(),
            report.skipped.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestError;
    use async_trait::async_trait;
    use std::time::Duration;

    fn number(raw: &str) -> CompanyNumber {
        CompanyNumber::new(raw).expect("valid company number")
    }

    struct FakeProfiles;

    #[async_trait]
    impl CompanyDetailSource for FakeProfiles {
        async fn fetch_company(&self, number: &CompanyNumber) -> Result<Entity> {
            match number.as_str() {
                "00000001" => Ok(Entity::new(number.clone(), "Alpha Ltd")),
                "00000002" => Ok(Entity::new(number.clone(), " ")),
                _ => Err(IngestError::Api {
                    provider: "fake".to_string(),
                    status: 404,
                    message: "not found".to_string(),
                }),
            }
        }
    }

    #[tokio::test]
    async fn test_fetch_all_skips_unusable_profiles() {
        let fetcher = DetailFetcher::new(
            Arc::new(FakeProfiles),
            Arc::new(RateLimiter::new("api", 10, Duration::from_secs(1))),
            RetryPolicy::new(1, Duration::from_millis(1)),
        );

        let report = fetcher
            .fetch_all(
                &[number("00000001"), number("00000002"), number("00000003")],
                &CancellationToken::new(),
            )
            .await
            .expect("fetch");

        assert_eq!(report.entities.len(), 1);
        assert_eq!(report.entities[0].name, "Alpha Ltd");
        assert_eq!(
            report
                .skipped
                .iter()
                .map(|(n, _)| n.as_str())
                .collect::<Vec<_>>(),
            vec!["00000002", "00000003"]
        );
    }
}
