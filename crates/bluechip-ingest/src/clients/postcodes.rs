//! Postcode districts from a raw template page per postcode area.

use super::{build_http_client, check_status, read_text};
use crate::error::{IngestError, Result};
use crate::parser::extract_postcode_districts;
use crate::sources::PostcodeSource;
use async_trait::async_trait;
use bluechip_core::PostcodeConfig;
use reqwest::Client;

const PROVIDER: &str = "postcode-source";

pub struct HttpPostcodeSource {
    client: Client,
    url_template: String,
}

impl HttpPostcodeSource {
    /// `{area}` in the configured template is replaced by the area code.
    ///
    /// # Errors
    /// Returns `IngestError::InputContract` if the template has no `{area}`
    /// placeholder, or error if the HTTP client cannot be created.
    pub fn new(config: &PostcodeConfig, timeout_secs: u64) -> Result<Self> {
        if !config.source_url_template.contains("{area}") {
            return Err(IngestError::InputContract(format!(
                "postcode source template has no {{area}} placeholder: {}",
                config.source_url_template
            )));
        }

        Ok(Self {
            client: build_http_client(timeout_secs)?,
            url_template: config.source_url_template.clone(),
        })
    }
}

#[async_trait]
impl PostcodeSource for HttpPostcodeSource {
    async fn districts(&self, area: &str) -> Result<Vec<String>> {
        let url = self.url_template.replace("{area}", area.trim());
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| IngestError::from_reqwest(PROVIDER, &e))?;
        let content = read_text(PROVIDER, check_status(PROVIDER, response).await?).await?;

        extract_postcode_districts(&content, area)
    }
}
