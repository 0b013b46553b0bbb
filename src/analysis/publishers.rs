//! Publisher location directory.
//!
//! Static city/county/state metadata for publishers the archive returns.
//! Extend it from config rather than editing the built-in table.

use crate::models::Location;
use std::collections::HashMap;

/// Publishers seen in earlier California runs.
const BUILT_IN: &[(&str, &str, &str, &str)] = &[
    ("San Francisco Chronicle", "San Francisco", "San Francisco", "CA"),
    ("The San Francisco Examiner", "San Francisco", "San Francisco", "CA"),
    ("The San Francisco Call Bulletin", "San Francisco", "San Francisco", "CA"),
    ("Los Angeles Star", "Los Angeles", "Los Angeles", "CA"),
    ("The Sacramento Bee", "Sacramento", "Sacramento", "CA"),
    ("Appeal-Democrat", "Marysville", "Yuba", "CA"),
    ("Daily Evening Herald", "Stockton", "San Joaquin", "CA"),
    ("Press Enterprise", "Riverside", "Riverside", "CA"),
    ("The Bismarck Tribune", "Bismarck", "Burleigh", "ND"),
    ("The Orlando Sentinel", "Orlando", "Orange", "FL"),
    ("Okmulgee Daily Times", "Okmulgee", "Okmulgee", "OK"),
    ("The Index-Journal", "Greenwood", "Greenwood", "SC"),
];

/// Lookup from publisher name to location, with an explicit fallback.
#[derive(Debug, Clone)]
pub struct PublisherDirectory {
    entries: HashMap<String, Location>,
    fallback: Location,
}

impl Default for PublisherDirectory {
    fn default() -> Self {
        let entries = BUILT_IN
            .iter()
            .map(|(name, city, county, state)| {
                (name.to_string(), Location::new(city, county, state))
            })
            .collect();

        Self {
            entries,
            fallback: Location::unknown(),
        }
    }
}

impl PublisherDirectory {
    /// An empty directory that resolves everything to the fallback.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
            fallback: Location::unknown(),
        }
    }

    /// Add or replace entries.
    pub fn extend<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, Location)>,
    {
        self.entries.extend(entries);
    }

    pub fn lookup(&self, publisher: &str) -> &Location {
        self.entries.get(publisher).unwrap_or(&self.fallback)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_publisher() {
        let directory = PublisherDirectory::default();
        let location = directory.lookup("Appeal-Democrat");
        assert_eq!(location, &Location::new("Marysville", "Yuba", "CA"));
    }

    #[test]
    fn test_unknown_publisher_falls_back() {
        let directory = PublisherDirectory::default();
        assert_eq!(directory.lookup("Weekly Nowhere"), &Location::unknown());
        assert_eq!(directory.lookup("Unknown"), &Location::unknown());
    }

    #[test]
    fn test_extend_overrides() {
        let mut directory = PublisherDirectory::empty();
        assert_eq!(directory.len(), 0);
        directory.extend([(
            "Daily Alta California".to_string(),
            Location::new("San Francisco", "San Francisco", "CA"),
        )]);
        assert_eq!(directory.lookup("Daily Alta California").state, "CA");
    }
}
