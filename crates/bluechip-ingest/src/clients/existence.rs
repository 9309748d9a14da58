//! Existence checks against a companies REST endpoint.

use super::{build_http_client, check_status, decode_json, trim_base};
use crate::error::{IngestError, Result};
use crate::sources::ExistenceOracle;
use async_trait::async_trait;
use bluechip_core::CompanyNumber;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

const PROVIDER: &str = "companies-endpoint";

/// Asks `GET {base}/companies/{number}`.
///
/// A success body naming a company number means present; 404, or a success
/// body without one, means absent.
pub struct HttpExistenceOracle {
    client: Client,
    base_url: String,
}

impl HttpExistenceOracle {
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout_secs)?,
            base_url: trim_base(base_url),
        })
    }
}

#[async_trait]
impl ExistenceOracle for HttpExistenceOracle {
    async fn exists(&self, number: &CompanyNumber) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/companies/{}", self.base_url, number))
            .send()
            .await
            .map_err(|e| IngestError::from_reqwest(PROVIDER, &e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let response = check_status(PROVIDER, response).await?;
        let record: CompanyRecord = decode_json(PROVIDER, response).await?;

        Ok(record
            .company_number
            .is_some_and(|found| !found.trim().is_empty()))
    }
}

#[derive(Debug, Deserialize)]
struct CompanyRecord {
    #[serde(default)]
    company_number: Option<String>,
}
