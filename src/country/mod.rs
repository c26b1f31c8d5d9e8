//! Country data integration.
//!
//! [`CountryLayerClient`] fetches countries by name from the countrylayer
//! API and only hands out records that passed [`validate`].

mod client;
pub mod service;
pub mod validate;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::RequestError;

pub use client::{ACCESS_KEY_PARAM, COUNTRY_LAYER_API_URL, CountryLayerClient, country_endpoint};
pub use service::{Country, CountryDetails, CountryDirectory, CountryService, InMemoryDirectory, ServiceError};
pub use validate::{FieldPath, ValidationErrors, validate};

/// A validated country record as returned by the upstream API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryRecord {
    pub name: String,
    pub top_level_domain: Vec<String>,
    pub alpha2_code: String,
    pub alpha3_code: String,
    pub calling_codes: Vec<String>,
    pub capital: String,
    pub alt_spellings: Vec<String>,
    pub region: String,
}

/// Failure of a country lookup.
#[derive(Debug, Error)]
pub enum CountryError {
    /// The request itself failed; the error is passed through unchanged.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// The upstream answered successfully but with an empty payload.
    #[error("Country not found")]
    CountryNotFound,

    /// The upstream answered successfully with a body that is not JSON.
    #[error("Country payload is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    /// The payload did not match the country schema.
    #[error("Invalid country payload: {0}")]
    Validation(#[from] ValidationErrors),
}

impl CountryError {
    /// Status an HTTP front end should answer with for this failure.
    pub fn http_status(&self) -> StatusCode {
        match self {
            CountryError::Request(e) => e.http_status(),
            CountryError::CountryNotFound
            | CountryError::Decode(_)
            | CountryError::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// Looks up countries by name.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CountryLookup: Send + Sync {
    /// Fetch every country matching `name`. Ambiguous names may yield more
    /// than one record; an empty result is reported as
    /// [`CountryError::CountryNotFound`].
    async fn get_country_by_name(&self, name: &str) -> Result<Vec<CountryRecord>, CountryError>;
}
