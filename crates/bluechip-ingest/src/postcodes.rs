//! Expansion of postcode areas into the query keys a scan runs over.

use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::sources::PostcodeSource;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

/// Districts of every area in `areas`, deduplicated, area by area.
///
/// An area with no districts is logged and contributes nothing.
///
/// # Errors
/// Returns the source error once retries are exhausted, an input-contract
/// error for a malformed area, or `IngestError::Cancelled`.
pub async fn discover_query_keys(
    source: &dyn PostcodeSource,
    areas: &[String],
    retry: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();

    for area in areas {
        let districts = retry
            .execute(&format!("postcode districts of {area}"), cancel, || {
                source.districts(area)
            })
            .await?;

        if districts.is_empty() {
            tracing::warn!("No postcodes found for postcode area {}", area);
            continue;
        }

        tracing::info!("Postcode area {}: {} districts", area, districts.len());
        keys.extend(districts.into_iter().filter(|d| seen.insert(d.clone())));
    }

    Ok(keys)
}
