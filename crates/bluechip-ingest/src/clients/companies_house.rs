//! Companies House REST API and advanced search.

use super::{build_http_client, check_status, decode_json, missing_key, read_text, trim_base};
use crate::error::{IngestError, Result};
use crate::parser::extract_company_numbers;
use crate::sources::{
    CompanyDetailSource, FilingRecord, FilingSource, OfficerSource, SearchPageSource,
};
use crate::url_builder::build_search_url;
use async_trait::async_trait;
use bluechip_core::{Address, CompaniesHouseConfig, CompanyNumber, Entity, SearchConfig};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

const PROVIDER: &str = "companies-house";

/// Client for the company profile, officer and filing history endpoints.
///
/// The API key is sent as the basic-auth username with an empty password.
pub struct CompaniesHouseClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl CompaniesHouseClient {
    /// # Errors
    /// Returns error if no API key is configured or the HTTP client cannot be created.
    pub fn new(config: &CompaniesHouseConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| missing_key("companies_house.api_key"))?;

        Ok(Self {
            client: build_http_client(config.timeout_secs)?,
            base_url: trim_base(&config.api_base_url),
            api_key,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .basic_auth(&self.api_key, Some(""))
            .send()
            .await
            .map_err(|e| IngestError::from_reqwest(PROVIDER, &e))?;

        let response = check_status(PROVIDER, response).await?;
        decode_json(PROVIDER, response).await
    }
}

#[derive(Debug, Deserialize)]
struct OfficerList {
    #[serde(default)]
    active_count: u32,
}

#[derive(Debug, Deserialize)]
struct FilingHistory {
    #[serde(default)]
    items: Vec<FilingRecord>,
}

#[derive(Debug, Deserialize)]
struct CompanyProfile {
    company_number: String,
    #[serde(default)]
    company_name: String,
    #[serde(default)]
    sic_codes: Vec<String>,
    #[serde(default)]
    registered_office_address: RegisteredOffice,
}

#[derive(Debug, Default, Deserialize)]
struct RegisteredOffice {
    address_line_1: Option<String>,
    address_line_2: Option<String>,
    locality: Option<String>,
    postal_code: Option<String>,
    region: Option<String>,
}

impl From<RegisteredOffice> for Address {
    fn from(office: RegisteredOffice) -> Self {
        Self {
            line_1: office.address_line_1,
            line_2: office.address_line_2,
            locality: office.locality,
            postal_code: office.postal_code,
            region: office.region,
        }
    }
}

#[async_trait]
impl OfficerSource for CompaniesHouseClient {
    async fn active_officer_count(&self, number: &CompanyNumber) -> Result<u32> {
        let officers: OfficerList = self.get_json(&format!("/company/{number}/officers")).await?;
        Ok(officers.active_count)
    }
}

#[async_trait]
impl FilingSource for CompaniesHouseClient {
    async fn filing_history(&self, number: &CompanyNumber) -> Result<Vec<FilingRecord>> {
        let history: FilingHistory = self
            .get_json(&format!("/company/{number}/filing-history"))
            .await?;
        Ok(history.items)
    }
}

#[async_trait]
impl CompanyDetailSource for CompaniesHouseClient {
    async fn fetch_company(&self, number: &CompanyNumber) -> Result<Entity> {
        let profile: CompanyProfile = self.get_json(&format!("/company/{number}")).await?;

        Ok(Entity {
            company_number: CompanyNumber::new(profile.company_number)?,
            name: profile.company_name,
            sic_codes: profile.sic_codes,
            address: profile.registered_office_address.into(),
            coordinates: None,
        })
    }
}

/// Scrapes the public advanced-search result pages.
pub struct CompaniesHouseSearch {
    client: Client,
    search_url: String,
    search: SearchConfig,
}

impl CompaniesHouseSearch {
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(config: &CompaniesHouseConfig, search: SearchConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config.timeout_secs)?,
            search_url: config.search_url.clone(),
            search,
        })
    }
}

#[async_trait]
impl SearchPageSource for CompaniesHouseSearch {
    async fn fetch_page(&self, query_key: &str, page: u32) -> Result<Vec<CompanyNumber>> {
        let url = build_search_url(&self.search_url, query_key, page, &self.search)?;
        tracing::debug!("Scraping {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IngestError::from_reqwest(PROVIDER, &e))?;
        let html = read_text(PROVIDER, check_status(PROVIDER, response).await?).await?;

        Ok(extract_company_numbers(&html))
    }
}
