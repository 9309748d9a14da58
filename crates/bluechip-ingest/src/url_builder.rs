use crate::error::{IngestError, Result};
use bluechip_core::SearchConfig;
use chrono::Datelike;
use reqwest::Url;

/// Build the advanced-search URL for one page of results in `query_key`.
///
/// Every filter the search form knows is sent; the ones this search does not
/// use are present but empty.
pub fn build_search_url(
    base: &str,
    query_key: &str,
    page: u32,
    search: &SearchConfig,
) -> Result<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| IngestError::InputContract(format!("invalid search URL '{base}': {e}")))?;

    let before = search.incorporated_before;
    let day = format!("{:02}", before.day());
    let month = format!("{:02}", before.month());
    let year = before.year().to_string();
    let page = page.to_string();

    url.query_pairs_mut().extend_pairs([
        ("companyNameIncludes", ""),
        ("companyNameExcludes", ""),
        ("registeredOfficeAddress", query_key),
        ("incorporationFromDay", ""),
        ("incorporationFromMonth", ""),
        ("incorporationFromYear", ""),
        ("incorporationToDay", day.as_str()),
        ("incorporationToMonth", month.as_str()),
        ("incorporationToYear", year.as_str()),
        ("status", search.company_status.as_str()),
        ("sicCodes", ""),
        ("type", search.company_type.as_str()),
        ("dissolvedFromDay", ""),
        ("dissolvedFromMonth", ""),
        ("dissolvedFromYear", ""),
        ("dissolvedToDay", ""),
        ("dissolvedToMonth", ""),
        ("dissolvedToYear", ""),
        ("page", page.as_str()),
    ]);

    Ok(url)
}
