//! Bluechip Core - Foundation crate for the Bluechip company ingestion pipeline.
//!
//! This crate provides shared types, error handling and configuration management
//! that the store and ingestion crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths and env overrides
//! - [`types`] - Shared newtypes and domain records (`CompanyNumber`, `Entity`, `Address`)
//!
//! # Example
//!
//! ```rust
//! use bluechip_core::{AppConfig, CompanyNumber};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! config.validate()?;
//!
//! let number = CompanyNumber::new("01234567")?;
//! assert_eq!(number.as_str(), "01234567");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, CacheConfig, CompaniesHouseConfig, ExistenceBackend, GeocodingConfig,
    PostcodeConfig, RetryConfig, SearchConfig, StoreConfig,
};
pub use error::{BluechipError, ConfigError, ConfigResult, Result};
pub use types::{Address, CompanyNumber, Coordinates, Entity, Verdict, VerdictStatus};
