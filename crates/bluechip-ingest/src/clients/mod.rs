//! HTTP and HTML collaborators.
//!
//! Clients only perform requests and decode responses; throttling and retry
//! are applied by the stages that call them.

pub mod companies_house;
pub mod existence;
pub mod geocoder;
pub mod postcodes;

pub use companies_house::{CompaniesHouseClient, CompaniesHouseSearch};
pub use existence::HttpExistenceOracle;
pub use geocoder::OpenCageGeocoder;
pub use postcodes::HttpPostcodeSource;

use crate::error::{IngestError, Result};
use bluechip_core::{BluechipError, ConfigError};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Build an HTTP client with the given request timeout.
///
/// # Errors
/// Returns error if the HTTP client cannot be created.
pub fn build_http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("bluechip/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| IngestError::from_reqwest("http-client", &e))
}

/// Turn a non-success response into an error.
///
/// 429 becomes `RateLimited`; any other failure status becomes `Api` with
/// the response body as the message.
pub(crate) async fn check_status(provider: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(IngestError::RateLimited {
            provider: provider.to_string(),
        });
    }

    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(IngestError::Api {
        provider: provider.to_string(),
        status: status.as_u16(),
        message,
    })
}

/// Decode a JSON body, reporting failures as `Parse`.
pub(crate) async fn decode_json<T: DeserializeOwned>(provider: &str, response: Response) -> Result<T> {
    response.json().await.map_err(|e| IngestError::Parse {
        provider: provider.to_string(),
        message: format!("Failed to parse response: {e}"),
    })
}

/// Read a text body.
pub(crate) async fn read_text(provider: &str, response: Response) -> Result<String> {
    response
        .text()
        .await
        .map_err(|e| IngestError::from_reqwest(provider, &e))
}

fn missing_key(field: &str) -> IngestError {
    IngestError::Invalid(BluechipError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        reason: "an API key is required".to_string(),
    }))
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
