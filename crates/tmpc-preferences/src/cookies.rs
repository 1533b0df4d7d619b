//! Per-domain cookies injected into requests from temporary containers
//!
//! Entries are stored exactly as the options page writes them: every field
//! is a string, with `""` meaning "not specified". Type normalization happens
//! where the cookie is applied.

use crate::error::PreferencesError;
use crate::pattern::DomainPattern;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A cookie configured for a domain pattern
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfiguredCookie {
    /// `Domain` attribute
    pub domain: String,
    /// Expiry in seconds since the epoch
    pub expiration_date: String,
    /// First-party isolation key
    pub first_party_domain: String,
    /// `"true"` or `"false"`
    pub http_only: String,
    /// Cookie name
    pub name: String,
    /// `Path` attribute
    pub path: String,
    /// `no_restriction`, `lax` or `strict`
    pub same_site: String,
    /// `"true"` or `"false"`
    pub secure: String,
    /// URL the cookie is set for
    pub url: String,
    /// Cookie value
    pub value: String,
}

impl ConfiguredCookie {
    /// Minimal cookie with name, value and URL
    #[must_use]
    pub fn new(url: impl Into<String>, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            value: value.into(),
            ..Self::default()
        }
    }
}

/// Cookie preferences keyed by domain pattern
///
/// Keys are compiled once when the document is read; a key that does not
/// compile rejects the document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CookiePreferences {
    /// Cookies to set, by the pattern of the request domain
    pub domain: BTreeMap<DomainPattern, Vec<ConfiguredCookie>>,
}

impl CookiePreferences {
    /// Cookies whose domain pattern matches the URL
    pub fn cookies_for<'a>(&'a self, url: &'a str) -> impl Iterator<Item = &'a ConfiguredCookie> + 'a {
        self.domain
            .iter()
            .filter(move |(pattern, _)| pattern.matches(url))
            .flat_map(|(_, cookies)| cookies.iter())
    }

    /// Check that every entry is usable
    ///
    /// # Errors
    /// - `PreferencesError::IncompleteCookie` for an entry without name or URL
    pub fn validate(&self) -> Result<(), PreferencesError> {
        for (pattern, cookies) in &self.domain {
            for cookie in cookies {
                if cookie.name.is_empty() {
                    return Err(PreferencesError::IncompleteCookie {
                        domain: pattern.to_string(),
                        field: "name",
                    });
                }
                if cookie.url.is_empty() {
                    return Err(PreferencesError::IncompleteCookie {
                        domain: pattern.to_string(),
                        field: "url",
                    });
                }
            }
        }
        Ok(())
    }
}
