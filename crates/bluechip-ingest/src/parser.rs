//! Text extraction from search result pages and postcode templates.

use crate::error::{IngestError, Result};
use bluechip_core::CompanyNumber;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;

const INCORPORATED_MARKER: &str = "Incorporated on";

/// Company numbers listed on an advanced-search result page, in page order.
///
/// Each result is an `<li>` with a text node containing "Incorporated on";
/// its company number is the first run of digits in that node, with an
/// optional two-letter prefix (`SC`, `NI`, ...). A page without such items
/// yields an empty list.
#[must_use]
pub fn extract_company_numbers(html: &str) -> Vec<CompanyNumber> {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    let number = NUMBER.get_or_init(|| Regex::new(r"\b(?:[A-Z]{2})?\d+\b").expect("valid regex"));

    let document = Html::parse_document(html);
    let items = Selector::parse("li").expect("valid selector");

    let mut numbers = Vec::new();
    for item in document.select(&items) {
        // The number sits in the same text node as the marker, after the company name.
        let Some(text) = item.text().find(|t| t.contains(INCORPORATED_MARKER)) else {
            continue;
        };

        let Some(found) = number.find(text) else {
            tracing::debug!("Result item without a company number: {}", text.trim());
            continue;
        };
        match CompanyNumber::new(found.as_str()) {
            Ok(n) => numbers.push(n),
            Err(e) => tracing::warn!("Ignoring result item: {}", e),
        }
    }

    if numbers.is_empty() {
        tracing::debug!("No company numbers found on page");
    }
    numbers
}

/// Unique postcode districts of `area` (`SN1`, `SN10`, ...) in order of first appearance.
///
/// # Errors
/// Returns `IngestError::InputContract` if `area` is not one or two letters.
pub fn extract_postcode_districts(content: &str, area: &str) -> Result<Vec<String>> {
    let area = area.trim().to_ascii_uppercase();
    if area.is_empty() || area.len() > 2 || !area.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(IngestError::InputContract(format!(
            "postcode area must be one or two letters, got '{area}'"
        )));
    }

    // A district is the area letters followed by digits, not preceded by another letter.
    let pattern = Regex::new(&format!(r"(?:^|[^A-Za-z])({}\d+)", regex::escape(&area)))
        .map_err(|e| IngestError::InputContract(format!("bad postcode pattern: {e}")))?;

    let mut seen = HashSet::new();
    Ok(pattern
        .captures_iter(content)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|district| seen.insert(district.clone()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULTS_PAGE: &str = r#"
        <html><body>
          <ul id="results">
            <li class="type-company">
              <h3><a href="/company/01234567">ALPHA 2000 LIMITED</a></h3>
              <p>01234567 - Incorporated on 3 March 2001</p>
              <p>1 High Street, Swindon, SN1 1AA</p>
            </li>
            <li class="type-company">
              <h3><a href="/company/SC123456">BETA LTD</a></h3>
              <p>SC123456 - Incorporated on 12 June 2010</p>
            </li>
            <li class="pager">Next page</li>
          </ul>
        </body></html>
    "#;

    #[test]
    fn test_extract_company_numbers_in_page_order() {
        let numbers = extract_company_numbers(RESULTS_PAGE);
        let numbers: Vec<&str> = numbers.iter().map(CompanyNumber::as_str).collect();
        assert_eq!(numbers, vec!["01234567", "SC123456"]);
    }

    #[test]
    fn test_empty_results_page() {
        let html = "<html><body><p>No results found</p><ul><li>Home</li></ul></body></html>";
        assert!(extract_company_numbers(html).is_empty());
    }

    #[test]
    fn test_extract_postcode_districts() {
        let kml = "<Placemark><name>SN1</name></Placemark>\
                   <Placemark><name>SN10</name></Placemark>\
                   <Placemark><name>SN1</name></Placemark>\
                   <Placemark><name>BSN5</name></Placemark>\
                   <Placemark><name>SN2</name></Placemark>";

        let districts = extract_postcode_districts(kml, "sn").expect("extract");
        assert_eq!(districts, vec!["SN1", "SN10", "SN2"]);
    }

    #[test]
    fn test_no_districts_is_empty_not_error() {
        let districts = extract_postcode_districts("nothing here", "SN").expect("extract");
        assert!(districts.is_empty());
    }

    #[test]
    fn test_bad_area_is_input_contract_error() {
        for area in ["", "S1", "ABC", ".*"] {
            assert!(matches!(
                extract_postcode_districts("SN1", area),
                Err(IngestError::InputContract(_))
            ));
        }
    }
}
