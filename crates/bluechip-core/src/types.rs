//! Shared types used across the Bluechip pipeline.
//!
//! This module defines the company identifier newtype and the records that
//! flow between the ingestion stages and the store.

use crate::error::BluechipError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Newtype for company registration numbers with validation.
///
/// Company numbers are 1-10 ASCII letters or digits (e.g. `01234567`, `SC123456`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CompanyNumber(String);

impl CompanyNumber {
    /// Create a new `CompanyNumber` from a string.
    ///
    /// Surrounding whitespace is trimmed and letters are upper-cased.
    ///
    /// # Errors
    /// Returns error if the number is empty, too long, or contains other characters.
    pub fn new(id: impl Into<String>) -> Result<Self, BluechipError> {
        let id = id.into().trim().to_ascii_uppercase();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> Result<(), BluechipError> {
        static NUMBER_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex =
            NUMBER_REGEX.get_or_init(|| Regex::new(r"^[A-Z0-9]{1,10}$").expect("valid regex"));

        if regex.is_match(id) {
            Ok(())
        } else {
            Err(BluechipError::Validation(format!(
                "invalid company number: must be 1-10 letters or digits, got '{id}'"
            )))
        }
    }
}

impl fmt::Display for CompanyNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for CompanyNumber {
    type Error = BluechipError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CompanyNumber> for String {
    fn from(number: CompanyNumber) -> Self {
        number.0
    }
}

/// Registered office address. Any field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// First address line (street)
    pub line_1: Option<String>,
    /// Second address line
    pub line_2: Option<String>,
    /// Town or city
    pub locality: Option<String>,
    /// Postal code
    pub postal_code: Option<String>,
    /// Region or county
    pub region: Option<String>,
}

impl Address {
    /// True when no address field carries any text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        [
            &self.line_1,
            &self.line_2,
            &self.locality,
            &self.postal_code,
            &self.region,
        ]
        .iter()
        .all(|field| non_blank(field).is_none())
    }

    /// Free-text query for a geocoder: street, locality and postal code.
    ///
    /// Absent parts are left out. Returns `None` when none of the three is present.
    #[must_use]
    pub fn geocoding_query(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.line_1, &self.locality, &self.postal_code]
            .into_iter()
            .filter_map(non_blank)
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// A latitude/longitude pair. Both halves are always present together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
}

/// A business record as fetched from the company profile and enriched by geocoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable unique identifier
    pub company_number: CompanyNumber,
    /// Registered company name
    pub name: String,
    /// SIC classification codes (possibly empty)
    #[serde(default)]
    pub sic_codes: Vec<String>,
    /// Registered office address
    #[serde(default)]
    pub address: Address,
    /// Geocoded position of the registered office, if resolved
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

impl Entity {
    /// Create an entity with no address, codes or coordinates.
    #[must_use]
    pub fn new(company_number: CompanyNumber, name: impl Into<String>) -> Self {
        Self {
            company_number,
            name: name.into(),
            sic_codes: Vec::new(),
            address: Address::default(),
            coordinates: None,
        }
    }

    /// A record is complete enough to store once it carries a name.
    ///
    /// Missing coordinates or address parts are tolerated; they are reported
    /// later by the incomplete-record scan.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

/// Outcome status of validating a company.
///
/// Persisted as a lowercase string. Unrecognised strings found in older cache
/// files are kept as [`VerdictStatus::Other`] so hygiene passes can strip them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VerdictStatus {
    /// Passed every validation rule
    Valid,
    /// Failed a validation rule
    Rejected,
    /// Any other persisted status
    Other(String),
}

impl VerdictStatus {
    /// True only for [`VerdictStatus::Valid`].
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// String form used on disk.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Valid => "valid",
            Self::Rejected => "rejected",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for VerdictStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "valid" => Self::Valid,
            "rejected" => Self::Rejected,
            _ => Self::Other(value),
        }
    }
}

impl From<VerdictStatus> for String {
    fn from(status: VerdictStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Validation outcome for one company, with an optional diagnostic reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Accept/reject status
    pub status: VerdictStatus,
    /// Why the company was rejected (diagnostics only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Verdict {
    /// An accepting verdict.
    #[must_use]
    pub fn valid() -> Self {
        Self {
            status: VerdictStatus::Valid,
            reason: None,
        }
    }

    /// A rejecting verdict with a reason.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            status: VerdictStatus::Rejected,
            reason: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_company_number_valid() {
        for id in ["01234567", "SC123456", "ni000001", " 09876543 "] {
            assert!(CompanyNumber::new(id).is_ok(), "Failed for: {id}");
        }
        assert_eq!(
            CompanyNumber::new("sc123456").expect("valid number").as_str(),
            "SC123456"
        );
    }

    #[test]
    fn test_company_number_invalid() {
        for id in ["", "   ", "0123-4567", "12345678901", "AB 123"] {
            assert!(CompanyNumber::new(id).is_err(), "Should fail for: {id}");
        }
    }

    #[test]
    fn test_company_number_serde() {
        let number = CompanyNumber::new("01234567").expect("valid number");
        let json = serde_json::to_string(&number).expect("serialize");
        assert_eq!(json, "\"01234567\"");

        let bad: Result<CompanyNumber, _> = serde_json::from_str("\"not valid!\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_geocoding_query_skips_absent_parts() {
        let address = Address {
            line_1: Some("1 High Street".to_string()),
            line_2: Some("Unit 4".to_string()),
            locality: None,
            postal_code: Some("SN1 1AA".to_string()),
            region: Some("Wiltshire".to_string()),
        };
        assert_eq!(
            address.geocoding_query().as_deref(),
            Some("1 High Street, SN1 1AA")
        );
    }

    #[test]
    fn test_empty_address() {
        assert!(Address::default().is_empty());
        assert!(Address::default().geocoding_query().is_none());

        let region_only = Address {
            region: Some("Wiltshire".to_string()),
            ..Address::default()
        };
        assert!(!region_only.is_empty());
        assert!(region_only.geocoding_query().is_none());
    }

    #[test]
    fn test_verdict_status_round_trip_keeps_unknown() {
        let status: VerdictStatus =
            serde_json::from_str("\"pending\"").expect("deserialize status");
        assert_eq!(status, VerdictStatus::Other("pending".to_string()));
        assert!(!status.is_valid());

        let json = serde_json::to_string(&VerdictStatus::Valid).expect("serialize");
        assert_eq!(json, "\"valid\"");
    }

    #[test]
    fn test_entity_completeness() {
        let number = CompanyNumber::new("01234567").expect("valid number");
        assert!(Entity::new(number.clone(), "Acme Ltd").is_complete());
        assert!(!Entity::new(number, "  ").is_complete());
    }
}
