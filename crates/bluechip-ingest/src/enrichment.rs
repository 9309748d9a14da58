//! Geocoding of registered office addresses.
//!
//! Entities are geocoded one at a time under the geocoder's own limiter. A
//! geocoding failure of any kind leaves that entity without coordinates and
//! moves on; only cancellation stops the stage. Entities that already carry
//! coordinates are passed through without a call.

use crate::error::{IngestError, Result};
use crate::rate_limiter::RateLimiter;
use crate::retry::RetryPolicy;
use crate::sources::Geocoder;
use bluechip_core::Entity;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Outcome of an enrichment pass.
#[derive(Debug, Default)]
pub struct EnrichmentReport {
    /// Every input entity, in input order
    pub entities: Vec<Entity>,
    /// Entities that gained coordinates
    pub geocoded: usize,
    /// Entities the geocoder had no result for, or failed on
    pub misses: usize,
    /// Entities with no usable address
    pub no_address: usize,
}

/// Adds coordinates to entities via a [`Geocoder`].
pub struct EnrichmentStage {
    geocoder: Arc<dyn Geocoder>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl EnrichmentStage {
    /// `limiter` must be dedicated to the geocoding provider.
    #[must_use]
    pub fn new(geocoder: Arc<dyn Geocoder>, limiter: Arc<RateLimiter>, retry: RetryPolicy) -> Self {
        Self {
            geocoder,
            limiter,
            retry,
        }
    }

    /// Geocode every entity that has an address and no coordinates yet.
    ///
    /// # Errors
    /// Returns `IngestError::Cancelled` only.
    pub async fn enrich(
        &self,
        entities: Vec<Entity>,
        cancel: &CancellationToken,
    ) -> Result<EnrichmentReport> {
        let mut report = EnrichmentReport::default();
        let geocoder = &self.geocoder;

        for mut entity in entities {
            if entity.coordinates.is_some() {
                report.entities.push(entity);
                continue;
            }

            let Some(query) = entity.address.geocoding_query() else {
                tracing::warn!(
                    "Company {} has no address to geocode",
                    entity.company_number
                );
                report.no_address += 1;
                report.entities.push(entity);
                continue;
            };

            let label = format!("geocode {}", entity.company_number);
            let resolved = self
                .retry
                .execute_throttled(&self.limiter, &label, cancel, || geocoder.geocode(&query))
                .await;

            entity.coordinates = match resolved {
                Ok(Some(coordinates)) => {
                    report.geocoded += 1;
                    Some(coordinates)
                }
                Ok(None) => {
                    tracing::warn!(
                        "No geocoding result for company {} ({})",
                        entity.company_number,
                        query
                    );
                    report.misses += 1;
                    None
                }
                Err(IngestError::Cancelled) => return Err(IngestError::Cancelled),
                Err(e) => {
                    tracing::warn!(
                        "Geocoding failed for company {}: {}",
                        entity.company_number,
                        e
                    );
                    report.misses += 1;
                    None
                }
            };

            report.entities.push(entity);
        }

        tracing::info!(
            "Geocoded {} of {} companies ({} misses, {} without address)",
            report.geocoded,
            report.entities.len(),
            report.misses,
            report.no_address
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bluechip_core::{Address, CompanyNumber, Coordinates};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Resolves queries containing "SN1"; returns no result otherwise.
    /// Queries containing "FAIL" time out.
    #[derive(Default)]
    struct FakeGeocoder {
        calls: Mutex<Vec<(String, Instant)>>,
    }

    #[async_trait]
    impl Geocoder for FakeGeocoder {
        async fn geocode(&self, query: &str) -> Result<Option<Coordinates>> {
            self.calls
                .lock()
                .expect("lock")
                .push((query.to_string(), Instant::now()));
            if query.contains("FAIL") {
                return Err(IngestError::Timeout {
                    provider: "fake".to_string(),
                });
            }
            Ok(query.contains("SN1").then_some(Coordinates {
                latitude: 51.56,
                longitude: -1.78,
            }))
        }
    }

    fn entity(raw: &str, line_1: &str, postal_code: &str) -> Entity {
        let mut entity = Entity::new(
            CompanyNumber::new(raw).expect("valid company number"),
            format!("{raw} Ltd"),
        );
        entity.address = Address {
            line_1: Some(line_1.to_string()),
            locality: Some("Swindon".to_string()),
            postal_code: Some(postal_code.to_string()),
            ..Address::default()
        };
        entity
    }

    fn stage(geocoder: &Arc<FakeGeocoder>) -> EnrichmentStage {
        EnrichmentStage::new(
            geocoder.clone(),
            Arc::new(RateLimiter::per_second_from_daily_quota("geocoder", 2500)),
            RetryPolicy::new(2, Duration::from_millis(100)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_result_yields_null_coordinates_and_continues() {
        let geocoder = Arc::new(FakeGeocoder::default());
        let entities = vec![
            entity("00000001", "Nowhere Lane", "ZZ9 9ZZ"),
            entity("00000002", "1 High Street", "SN1 1AA"),
        ];

        let report = stage(&geocoder)
            .enrich(entities, &CancellationToken::new())
            .await
            .expect("enrich");

        assert_eq!(report.entities.len(), 2);
        assert!(report.entities[0].coordinates.is_none());
        assert!(report.entities[1].coordinates.is_some());
        assert_eq!(report.misses, 1);
        assert_eq!(report.geocoded, 1);
        assert_eq!(
            geocoder.calls.lock().expect("lock")[1].0,
            "1 High Street, Swindon, SN1 1AA"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_are_sequential_and_throttled() {
        let geocoder = Arc::new(FakeGeocoder::default());
        let entities = (1..=3)
            .map(|i| entity(&format!("0000000{i}"), "1 High Street", "SN1 1AA"))
            .collect();

        stage(&geocoder)
            .enrich(entities, &CancellationToken::new())
            .await
            .expect("enrich");

        let calls = geocoder.calls.lock().expect("lock");
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            assert!(pair[1].1.duration_since(pair[0].1) >= Duration::from_secs(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_and_missing_addresses_do_not_abort() {
        let geocoder = Arc::new(FakeGeocoder::default());
        let mut no_address = entity("00000002", "", "");
        no_address.address = Address::default();
        let mut already = entity("00000003", "1 High Street", "SN1 1AA");
        already.coordinates = Some(Coordinates {
            latitude: 1.0,
            longitude: 2.0,
        });

        let report = stage(&geocoder)
            .enrich(
                vec![entity("00000001", "FAIL Road", "SN1 1AA"), no_address, already],
                &CancellationToken::new(),
            )
            .await
            .expect("enrich");

        assert_eq!(report.entities.len(), 3);
        assert!(report.entities[0].coordinates.is_none());
        assert_eq!(report.misses, 1);
        assert_eq!(report.no_address, 1);
        assert_eq!(
            report.entities[2].coordinates,
            Some(Coordinates {
                latitude: 1.0,
                longitude: 2.0
            })
        );
        // Initial attempt plus two retries for the failing address only.
        assert_eq!(geocoder.calls.lock().expect("lock").len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_stage() {
        let geocoder = Arc::new(FakeGeocoder::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = stage(&geocoder)
            .enrich(vec![entity("00000001", "1 High Street", "SN1 1AA")], &cancel)
            .await;

        assert!(matches!(result, Err(IngestError::Cancelled)));
        assert!(geocoder.calls.lock().expect("lock").is_empty());
    }
}
