//! Deduplicating write of enriched entities to the store.

use crate::error::{IngestError, Result};
use crate::sources::EntityStore;
use bluechip_core::{CompanyNumber, Entity};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Outcome of a persistence pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PersistReport {
    /// Rows written
    pub inserted: u64,
    /// Entities dropped because the store already had them
    pub already_stored: Vec<CompanyNumber>,
    /// Entities dropped as incomplete or repeated within the batch
    pub dropped: Vec<CompanyNumber>,
}

/// Writes only new, complete entities, as one batch.
pub struct PersistenceStage {
    store: Arc<dyn EntityStore>,
}

impl PersistenceStage {
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Filter `entities` against the store and insert the remainder.
    ///
    /// The store session opened here is released when this returns, whether
    /// or not the insert succeeded. An empty remainder is logged, not an error.
    ///
    /// # Errors
    /// Returns `IngestError::Store` if the store cannot be reached or the
    /// insert fails, and `IngestError::Cancelled`.
    pub async fn persist(
        &self,
        entities: Vec<Entity>,
        cancel: &CancellationToken,
    ) -> Result<PersistReport> {
        let mut report = PersistReport::default();
        if entities.is_empty() {
            tracing::info!("No companies to persist");
            return Ok(report);
        }

        let mut session = self.store.open_session().await?;
        let mut seen = HashSet::new();
        let mut fresh = Vec::new();

        for entity in entities {
            if cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }
            if !entity.is_complete() || !seen.insert(entity.company_number.clone()) {
                tracing::warn!(
                    "Dropping company {}: incomplete or repeated in batch",
                    entity.company_number
                );
                report.dropped.push(entity.company_number);
                continue;
            }
            if session.exists(&entity.company_number).await? {
                tracing::debug!("Company {} already stored", entity.company_number);
                report.already_stored.push(entity.company_number);
                continue;
            }
            fresh.push(entity);
        }

        if fresh.is_empty() {
            tracing::info!("No new companies to insert");
            return Ok(report);
        }

        report.inserted = session.insert_batch(&fresh).await?;
        tracing::info!(
            "Inserted {} new companies ({} already stored)",
            report.inserted,
            report.already_stored.len()
        );
        Ok(report)
    }
}
