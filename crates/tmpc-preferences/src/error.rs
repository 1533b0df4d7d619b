//! Preference loading and validation errors

use std::path::PathBuf;

/// Errors raised while reading or validating a preference document
#[derive(Debug, thiserror::Error)]
pub enum PreferencesError {
    /// Document could not be read from disk
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that was being read
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// JSON document is malformed
    #[error("invalid JSON preferences: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML document is malformed
    #[error("invalid TOML preferences: {0}")]
    Toml(#[from] toml::de::Error),

    /// YAML document is malformed
    #[error("invalid YAML preferences: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// File extension does not map to a known format
    #[error("unsupported preferences format: {0}")]
    UnsupportedFormat(String),

    /// Domain pattern is empty or does not compile
    #[error("invalid domain pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// Pattern as written
        pattern: String,
        /// Why it did not compile
        reason: String,
    },

    /// A random-appearance exclusion list leaves nothing to pick from
    #[error("{field} excludes every candidate")]
    EmptyCandidates {
        /// Preference whose exclusions left nothing to pick
        field: &'static str,
    },

    /// A configured cookie is missing a required field
    #[error("cookie for '{domain}' is missing {field}")]
    IncompleteCookie {
        /// Domain pattern the cookie is configured under
        domain: String,
        /// Field that is empty
        field: &'static str,
    },
}

impl PreferencesError {
    /// Whether the error comes from the document contents rather than I/O
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidPattern { .. } | Self::EmptyCandidates { .. } | Self::IncompleteCookie { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mentions_pattern() {
        let err = PreferencesError::InvalidPattern {
            pattern: "/(/".to_string(),
            reason: "unclosed group".to_string(),
        };
        assert!(err.to_string().contains("/(/"));
        assert!(err.is_validation());
    }

    #[test]
    fn format_errors_are_not_validation() {
        let err = PreferencesError::UnsupportedFormat("ini".to_string());
        assert!(!err.is_validation());
    }
}
