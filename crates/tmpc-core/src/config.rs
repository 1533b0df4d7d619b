//! Core configuration and the live preference snapshot

use crate::types::ContainerId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tmpc_preferences::Preferences;

/// Host-level settings that are not user preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreConfig {
    /// Cookie store id of the browser's default context
    pub default_store_id: ContainerId,
    /// How long a recorded link click waits for its request
    pub click_ttl: Duration,
}

impl CoreConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With a different default cookie store id
    #[inline]
    #[must_use]
    pub fn with_default_store_id(mut self, id: impl Into<ContainerId>) -> Self {
        self.default_store_id = id.into();
        self
    }

    /// With a different click lifetime
    #[inline]
    #[must_use]
    pub fn with_click_ttl(mut self, ttl: Duration) -> Self {
        self.click_ttl = ttl;
        self
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            default_store_id: ContainerId::new("firefox-default"),
            click_ttl: Duration::from_secs(1),
        }
    }
}

/// Shared handle to the current preferences
///
/// Readers take an `Arc` snapshot and never observe a half-applied update.
#[derive(Debug, Clone, Default)]
pub struct PreferenceSnapshot {
    inner: Arc<RwLock<Arc<Preferences>>>,
}

impl PreferenceSnapshot {
    /// Snapshot holding `preferences`
    #[must_use]
    pub fn new(preferences: Preferences) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(preferences))),
        }
    }

    /// Current preferences
    #[must_use]
    pub fn load(&self) -> Arc<Preferences> {
        self.inner.read().clone()
    }

    /// Swap in new preferences for subsequent events
    pub fn replace(&self, preferences: Preferences) {
        *self.inner.write() = Arc::new(preferences);
    }
}
