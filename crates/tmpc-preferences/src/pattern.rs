//! Domain patterns used by per-domain rules, exclusions and cookie entries
//!
//! Three pattern forms are accepted:
//! - `/regex/flags` matched against the full URL
//! - globs containing `*`, matched against the hostname
//! - plain hostnames, matched exactly

use crate::error::PreferencesError;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};

/// A compiled domain pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DomainPattern {
    source: String,
    kind: PatternKind,
}

#[derive(Debug, Clone)]
enum PatternKind {
    Exact,
    Glob(Regex),
    Url(Regex),
}

impl DomainPattern {
    /// Compile a pattern
    ///
    /// # Errors
    /// - `PreferencesError::InvalidPattern` if the pattern is empty or the
    ///   regex form does not compile
    pub fn new(source: impl Into<String>) -> Result<Self, PreferencesError> {
        let source = source.into();
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(PreferencesError::InvalidPattern {
                pattern: source,
                reason: "empty pattern".to_string(),
            });
        }

        let kind = if let Some((body, flags)) = split_regex(trimmed) {
            let regex = RegexBuilder::new(body)
                .case_insensitive(flags.contains('i'))
                .multi_line(flags.contains('m'))
                .dot_matches_new_line(flags.contains('s'))
                .build()
                .map_err(|e| PreferencesError::InvalidPattern {
                    pattern: source.clone(),
                    reason: e.to_string(),
                })?;
            PatternKind::Url(regex)
        } else if trimmed.contains('*') {
            let escaped = regex::escape(&trimmed.to_ascii_lowercase()).replace(r"\*", ".*");
            let regex = Regex::new(&format!("^{escaped}$")).map_err(|e| {
                PreferencesError::InvalidPattern {
                    pattern: source.clone(),
                    reason: e.to_string(),
                }
            })?;
            PatternKind::Glob(regex)
        } else {
            PatternKind::Exact
        };

        Ok(Self { source, kind })
    }

    /// Pattern as written
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Specificity used to break ties between several matching patterns
    #[inline]
    #[must_use]
    pub fn specificity(&self) -> usize {
        self.source.trim().len()
    }

    /// Check a URL (or a bare hostname) against the pattern
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        match &self.kind {
            PatternKind::Url(regex) => regex.is_match(url),
            PatternKind::Glob(regex) => regex.is_match(&hostname(url)),
            PatternKind::Exact => hostname(url) == self.source.trim().to_ascii_lowercase(),
        }
    }
}

impl PartialEq for DomainPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for DomainPattern {}

impl PartialOrd for DomainPattern {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DomainPattern {
    fn cmp(&self, other: &Self) -> Ordering {
        self.source.cmp(&other.source)
    }
}

impl Hash for DomainPattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
    }
}

impl TryFrom<String> for DomainPattern {
    type Error = PreferencesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DomainPattern> for String {
    fn from(pattern: DomainPattern) -> Self {
        pattern.source
    }
}

impl Display for DomainPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Lowercased hostname of a URL; inputs that are not URLs are taken as hostnames
#[must_use]
pub(crate) fn hostname(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => parsed.host_str().unwrap_or_default().to_ascii_lowercase(),
        Err(_) => url
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase(),
    }
}

fn split_regex(pattern: &str) -> Option<(&str, &str)> {
    let rest = pattern.strip_prefix('/')?;
    let end = rest.rfind('/')?;
    let (body, flags) = (&rest[..end], &rest[end + 1..]);
    if flags.chars().all(|c| "gimsuy".contains(c)) {
        Some((body, flags))
    } else {
        None
    }
}
