//! `OpenCage` forward geocoding.

use super::{build_http_client, check_status, decode_json, missing_key};
use crate::error::{IngestError, Result};
use crate::sources::Geocoder;
use async_trait::async_trait;
use bluechip_core::{Coordinates, GeocodingConfig};
use reqwest::Client;
use serde::Deserialize;

const PROVIDER: &str = "opencage";

pub struct OpenCageGeocoder {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenCageGeocoder {
    /// # Errors
    /// Returns error if no API key is configured or the HTTP client cannot be created.
    pub fn new(config: &GeocodingConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| missing_key("geocoding.api_key"))?;

        Ok(Self {
            client: build_http_client(config.timeout_secs)?,
            base_url: config.base_url.clone(),
            api_key,
        })
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    lat: f64,
    lng: f64,
}

#[async_trait]
impl Geocoder for OpenCageGeocoder {
    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("q", query), ("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| IngestError::from_reqwest(PROVIDER, &e))?;

        let body: GeocodeResponse = decode_json(PROVIDER, check_status(PROVIDER, response).await?).await?;

        // Best match first.
        Ok(body.results.into_iter().next().map(|r| Coordinates {
            latitude: r.geometry.lat,
            longitude: r.geometry.lng,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn geocoder(server: &MockServer) -> OpenCageGeocoder {
        OpenCageGeocoder::new(&GeocodingConfig {
            base_url: format!("{}/geocode/v1/json", server.uri()),
            api_key: Some("geo-key".to_string()),
            ..GeocodingConfig::default()
        })
        .expect("geocoder")
    }

    #[tokio::test]
    async fn test_first_result_wins() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "1 High Street, Swindon, SN1 1AA"))
            .and(query_param("key", "geo-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {"geometry": {"lat": 51.5614, "lng": -1.7851}},
                    {"geometry": {"lat": 0.0, "lng": 0.0}}
                ]
            })))
            .mount(&server)
            .await;

        let coordinates = geocoder(&server)
            .geocode("1 High Street, Swindon, SN1 1AA")
            .await
            .expect("geocode")
            .expect("a result");

        assert!((coordinates.latitude - 51.5614).abs() < f64::EPSILON);
        assert!((coordinates.longitude + 1.7851).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_zero_results_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [],
                "total_results": 0
            })))
            .mount(&server)
            .await;

        let result = geocoder(&server).geocode("Nowhere").await.expect("geocode");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_quota_exhausted_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let result = geocoder(&server).geocode("Anywhere").await;
        assert!(matches!(result, Err(IngestError::RateLimited { .. })));
    }
}
