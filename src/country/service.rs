//! Combines locally known countries with their upstream records.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use super::{CountryError, CountryLookup, CountryRecord};

/// A country known to the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub id: u64,
    pub name: String,
}

/// A local country together with its validated upstream records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryDetails {
    pub country: Country,
    pub country_data: Vec<CountryRecord>,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Country {0} does not exist.")]
    CountryDoesNotExist(u64),

    #[error(transparent)]
    Lookup(#[from] CountryError),
}

impl ServiceError {
    pub fn http_status(&self) -> reqwest::StatusCode {
        match self {
            ServiceError::CountryDoesNotExist(_) => reqwest::StatusCode::NOT_FOUND,
            ServiceError::Lookup(e) => e.http_status(),
        }
    }
}

/// Source of locally known countries.
#[cfg_attr(test, mockall::automock)]
pub trait CountryDirectory: Send + Sync {
    fn get(&self, id: u64) -> Option<Country>;
    fn all(&self) -> Vec<Country>;
}

/// Directory held in memory. Names are unique; a repeated name keeps its
/// first id and does not consume a new one.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    countries: BTreeMap<u64, Country>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a country and returns it. An existing country with the same
    /// name is returned unchanged.
    pub fn insert(&mut self, name: impl Into<String>) -> Country {
        let name = name.into();
        if let Some(existing) = self.countries.values().find(|c| c.name == name) {
            return existing.clone();
        }

        let id = self.countries.keys().next_back().map_or(1, |last| last + 1);
        let country = Country { id, name };
        self.countries.insert(id, country.clone());
        country
    }
}

impl<S: Into<String>> FromIterator<S> for InMemoryDirectory {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut directory = Self::new();
        for name in iter {
            directory.insert(name);
        }
        directory
    }
}

impl CountryDirectory for InMemoryDirectory {
    fn get(&self, id: u64) -> Option<Country> {
        self.countries.get(&id).cloned()
    }

    fn all(&self) -> Vec<Country> {
        self.countries.values().cloned().collect()
    }
}

pub struct CountryService<D, L> {
    directory: D,
    lookup: L,
}

impl<D: CountryDirectory, L: CountryLookup> CountryService<D, L> {
    pub fn new(directory: D, lookup: L) -> Self {
        Self { directory, lookup }
    }

    /// All known countries, ordered by name.
    pub fn list_countries(&self) -> Vec<Country> {
        let mut countries = self.directory.all();
        countries.sort_by(|a, b| a.name.cmp(&b.name));
        countries
    }

    /// Loads a known country and fetches its upstream records by name.
    #[tracing::instrument(skip(self))]
    pub async fn retrieve_country(&self, id: u64) -> Result<CountryDetails, ServiceError> {
        let country = self
            .directory
            .get(id)
            .ok_or(ServiceError::CountryDoesNotExist(id))?;

        debug!("Fetching country data for {:?} (id {})", country.name, id);
        let country_data = self.lookup.get_country_by_name(&country.name).await?;

        Ok(CountryDetails {
            country,
            country_data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::country::MockCountryLookup;
    use crate::country::fixtures::france;
    use crate::http::RequestError;
    use mockall::predicate::eq;

    #[test]
    fn test_in_memory_directory_assigns_ids() {
        let mut directory = InMemoryDirectory::new();
        let france = directory.insert("France");
        let spain = directory.insert("Spain");
        let again = directory.insert("France");

        assert_eq!(france.id, 1);
        assert_eq!(spain.id, 2);
        assert_eq!(again, france);
        assert_eq!(directory.all().len(), 2);
        assert_eq!(directory.get(2).unwrap().name, "Spain");
        assert!(directory.get(3).is_none());
    }

    #[test]
    fn test_in_memory_directory_repeated_names_keep_first_id() {
        let directory: InMemoryDirectory = ["France", "France", "Spain"].into_iter().collect();

        assert_eq!(directory.get(1).unwrap().name, "France");
        assert_eq!(directory.get(2).unwrap().name, "Spain");
        assert!(directory.get(3).is_none());
    }

    #[test]
    fn test_list_countries_is_sorted_by_name() {
        let directory: InMemoryDirectory = ["Spain", "France", "Italy"].into_iter().collect();
        let service = CountryService::new(directory, MockCountryLookup::new());

        let names: Vec<String> = service
            .list_countries()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["France", "Italy", "Spain"]);
    }

    #[tokio::test]
    async fn test_retrieve_country() {
        let directory: InMemoryDirectory = ["France"].into_iter().collect();
        let mut lookup = MockCountryLookup::new();
        lookup
            .expect_get_country_by_name()
            .with(eq("France"))
            .times(1)
            .returning(|_| Ok(vec![france()]));

        let service = CountryService::new(directory, lookup);
        let details = service.retrieve_country(1).await.unwrap();

        assert_eq!(details.country.name, "France");
        assert_eq!(details.country_data, vec![france()]);

        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["country"]["id"], 1);
        assert_eq!(json["country_data"][0]["alpha2Code"], "FR");
    }

    #[tokio::test]
    async fn test_retrieve_unknown_country() {
        let mut directory = MockCountryDirectory::new();
        directory.expect_get().with(eq(42)).returning(|_| None);
        let mut lookup = MockCountryLookup::new();
        lookup.expect_get_country_by_name().never();

        let service = CountryService::new(directory, lookup);
        let err = service.retrieve_country(42).await.unwrap_err();

        assert!(matches!(err, ServiceError::CountryDoesNotExist(42)));
        assert_eq!(err.http_status(), reqwest::StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Country 42 does not exist.");
    }

    #[tokio::test]
    async fn test_retrieve_propagates_lookup_errors() {
        let directory: InMemoryDirectory = ["France"].into_iter().collect();
        let mut lookup = MockCountryLookup::new();
        lookup.expect_get_country_by_name().returning(|_| {
            Err(CountryError::Request(RequestError::UpstreamServer {
                status: reqwest::StatusCode::BAD_GATEWAY,
            }))
        });

        let service = CountryService::new(directory, lookup);
        let err = service.retrieve_country(1).await.unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Lookup(CountryError::Request(RequestError::UpstreamServer { .. }))
        ));
        assert_eq!(err.http_status(), reqwest::StatusCode::BAD_GATEWAY);
    }
}
