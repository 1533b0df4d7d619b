//! Root preference document
//!
//! Mirrors the persisted camelCase layout. Every section falls back to its
//! defaults when absent, so documents written by older versions still load.

use crate::appearance::ContainerPreferences;
use crate::cookies::CookiePreferences;
use crate::error::PreferencesError;
use crate::isolation::{IsolationDomain, IsolationGlobal, Toggle};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// When automatic mode opens a temporary container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutomaticTrigger {
    /// As soon as a new tab is created
    #[default]
    Created,
    /// On the first navigation of a new tab
    Navigation,
}

/// Automatic mode: new default-container tabs move into temporary containers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutomaticMode {
    /// Automatic mode is on
    pub active: bool,
    /// Which tab event triggers it
    pub new_tab: AutomaticTrigger,
}

/// Whether a trigger opens deletes-history containers on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletesHistoryMode {
    /// Only when a rule asks for deletes-history
    #[default]
    Never,
    /// Whenever the trigger isolates
    Automatic,
}

impl DeletesHistoryMode {
    /// Whether the trigger opens deletes-history containers
    #[inline]
    #[must_use]
    pub fn is_automatic(&self) -> bool {
        matches!(self, Self::Automatic)
    }
}

/// Deletes-history container policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeletesHistoryPreferences {
    /// Applies to automatic mode
    pub automatic_mode: DeletesHistoryMode,
    /// Applies to always-open-in rules
    pub container_always_per_domain: DeletesHistoryMode,
    /// Applies to navigation isolation
    pub container_isolation: DeletesHistoryMode,
    /// Applies to mouse-click isolation
    pub container_mouse_clicks: DeletesHistoryMode,
    /// Removal delay in milliseconds for deletes-history containers
    pub container_removal: u64,
}

impl Default for DeletesHistoryPreferences {
    fn default() -> Self {
        Self {
            automatic_mode: DeletesHistoryMode::Never,
            container_always_per_domain: DeletesHistoryMode::Never,
            container_isolation: DeletesHistoryMode::Never,
            container_mouse_clicks: DeletesHistoryMode::Never,
            container_removal: 0,
        }
    }
}

/// Multi-Account Containers integration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MacPreferences {
    /// Respect existing Multi-Account Containers assignments
    pub action: Toggle,
}

/// Isolation section
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationPreferences {
    /// Rules applying to every domain
    pub global: IsolationGlobal,
    /// Per-domain rules
    pub domain: Vec<IsolationDomain>,
    /// Multi-Account Containers integration
    pub mac: MacPreferences,
}

impl IsolationPreferences {
    /// Most specific domain rule applying to a navigation
    ///
    /// Among the rules whose target (and origin, when set) match, the one
    /// with the longest target pattern wins; on equal length the first
    /// configured rule wins.
    #[must_use]
    pub fn matching_domain(&self, target_url: &str, origin_url: Option<&str>) -> Option<&IsolationDomain> {
        self.domain
            .iter()
            .filter(|rule| rule.applies_to(target_url, origin_url))
            .fold(None, |best: Option<&IsolationDomain>, rule| match best {
                Some(current)
                    if current.target_pattern.specificity() >= rule.target_pattern.specificity() =>
                {
                    Some(current)
                }
                _ => Some(rule),
            })
    }
}

/// Complete preference snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    /// Automatic mode settings
    pub automatic_mode: AutomaticMode,
    /// Show a notification when a container is removed
    pub notifications: bool,
    /// Naming, appearance and numbering of new containers
    pub container: ContainerPreferences,
    /// Isolation rules
    pub isolation: IsolationPreferences,
    /// Domains whose requests are never intercepted
    pub ignore_requests: Vec<String>,
    /// Cookies to inject per domain
    pub cookies: CookiePreferences,
    /// Deletes-history container policy
    pub deletes_history: DeletesHistoryPreferences,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            automatic_mode: AutomaticMode::default(),
            notifications: false,
            container: ContainerPreferences::default(),
            isolation: IsolationPreferences::default(),
            ignore_requests: vec!["getpocket.com".to_string(), "addons.mozilla.org".to_string()],
            cookies: CookiePreferences::default(),
            deletes_history: DeletesHistoryPreferences::default(),
        }
    }
}

impl Preferences {
    /// Parse a JSON document
    ///
    /// # Errors
    /// - `PreferencesError::Json` if the document is malformed
    pub fn from_json_str(input: &str) -> Result<Self, PreferencesError> {
        Ok(serde_json::from_str(input)?)
    }

    /// Parse a TOML document
    ///
    /// # Errors
    /// - `PreferencesError::Toml` if the document is malformed
    pub fn from_toml_str(input: &str) -> Result<Self, PreferencesError> {
        Ok(toml::from_str(input)?)
    }

    /// Parse a YAML document
    ///
    /// # Errors
    /// - `PreferencesError::Yaml` if the document is malformed
    pub fn from_yaml_str(input: &str) -> Result<Self, PreferencesError> {
        Ok(serde_yaml::from_str(input)?)
    }

    /// Load and validate a document, choosing the format by extension
    ///
    /// # Errors
    /// - `PreferencesError::Io` if the file cannot be read
    /// - `PreferencesError::UnsupportedFormat` for unknown extensions
    /// - any parse or validation error
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PreferencesError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| PreferencesError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let prefs = match extension.as_str() {
            "json" => Self::from_json_str(&input)?,
            "toml" => Self::from_toml_str(&input)?,
            "yaml" | "yml" => Self::from_yaml_str(&input)?,
            other => return Err(PreferencesError::UnsupportedFormat(other.to_string())),
        };

        prefs.validate()?;
        tracing::debug!(path = %path.display(), domains = prefs.isolation.domain.len(), "loaded preferences");
        Ok(prefs)
    }

    /// Check invariants the type system cannot express
    ///
    /// # Errors
    /// - `PreferencesError::EmptyCandidates` if random color/icon selection
    ///   has nothing left to pick
    /// - cookie validation errors
    pub fn validate(&self) -> Result<(), PreferencesError> {
        if self.container.color_random && self.container.color_candidates().is_empty() {
            return Err(PreferencesError::EmptyCandidates {
                field: "container.colorRandomExcluded",
            });
        }
        if self.container.icon_random && self.container.icon_candidates().is_empty() {
            return Err(PreferencesError::EmptyCandidates {
                field: "container.iconRandomExcluded",
            });
        }
        self.cookies.validate()
    }

    /// Whether requests to the URL bypass interception
    #[must_use]
    pub fn ignores_request(&self, url: &str) -> bool {
        let host = crate::pattern::hostname(url);
        self.ignore_requests
            .iter()
            .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appearance::{ContainerColor, NumberMode};
    use crate::isolation::{ClickType, IsolationAction};
    use crate::pattern::DomainPattern;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn empty_document_yields_defaults() {
        let prefs = Preferences::from_json_str("{}").unwrap();
        assert_eq!(prefs, Preferences::default());
        assert_eq!(prefs.container.removal, 900_000);
        assert_eq!(prefs.container.name_prefix, "tmp");
    }

    #[test]
    fn toml_and_json_agree() {
        let toml = r#"
            [container]
            numberMode = "reuse"
            removal = 0

            [isolation.global.navigation]
            action = "always"
        "#;
        let json = r#"{"container":{"numberMode":"reuse","removal":0},
                       "isolation":{"global":{"navigation":{"action":"always"}}}}"#;

        let from_toml = Preferences::from_toml_str(toml).unwrap();
        let from_json = Preferences::from_json_str(json).unwrap();
        assert_eq!(from_toml, from_json);
        assert_eq!(from_toml.container.number_mode, NumberMode::Reuse);
        assert_eq!(
            from_toml.isolation.global.rule(ClickType::Navigation).action,
            IsolationAction::Always
        );
    }

    #[test]
    fn most_specific_domain_rule_wins() {
        let mut prefs = Preferences::default();
        prefs
            .isolation
            .domain
            .push(IsolationDomain::new(DomainPattern::new("*.com").unwrap()));
        prefs
            .isolation
            .domain
            .push(IsolationDomain::new(DomainPattern::new("*.example.com").unwrap()));

        let rule = prefs
            .isolation
            .matching_domain("https://www.example.com", None)
            .unwrap();
        assert_eq!(rule.target_pattern.as_str(), "*.example.com");

        let rule = prefs.isolation.matching_domain("https://other.com", None).unwrap();
        assert_eq!(rule.target_pattern.as_str(), "*.com");

        assert!(prefs.isolation.matching_domain("https://other.org", None).is_none());
    }

    #[test]
    fn validation_rejects_exhausted_color_pool() {
        let mut prefs = Preferences::default();
        prefs.container.color_random = true;
        prefs.container.color_random_excluded = ContainerColor::ALL.to_vec();
        assert!(matches!(
            prefs.validate(),
            Err(PreferencesError::EmptyCandidates { .. })
        ));
    }

    #[test]
    fn ignored_requests_include_subdomains() {
        let prefs = Preferences::default();
        assert!(prefs.ignores_request("https://getpocket.com/x"));
        assert!(prefs.ignores_request("https://www.getpocket.com"));
        assert!(!prefs.ignores_request("https://notgetpocket.com"));
    }

    #[test]
    fn load_picks_format_from_extension() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "automaticMode:\n  active: true\n  newTab: navigation").unwrap();

        let prefs = Preferences::load(file.path()).unwrap();
        assert!(prefs.automatic_mode.active);
        assert_eq!(prefs.automatic_mode.new_tab, AutomaticTrigger::Navigation);

        let other = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(matches!(
            Preferences::load(other.path()),
            Err(PreferencesError::UnsupportedFormat(_))
        ));
    }
}
