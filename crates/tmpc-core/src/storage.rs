//! Persisted state
//!
//! The whole snapshot is written after every mutation that matters across
//! restarts. Writes are serialized, and each one captures state at the time
//! it runs, so a later write never loses to an earlier one.

use crate::config::PreferenceSnapshot;
use crate::host::StorageHost;
use crate::lifecycle::{ContainerLifecycle, TemporaryContainer};
use crate::statistics::{Statistics, StatisticsRecorder};
use crate::types::ContainerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tmpc_preferences::Preferences;

/// Everything kept in extension local storage
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageLocal {
    /// Extension version that wrote the snapshot
    pub version: String,
    /// Current preferences
    pub preferences: Preferences,
    /// Registered temporary containers by cookie store id
    pub temp_containers: BTreeMap<ContainerId, TemporaryContainer>,
    /// Numbers in use
    pub temp_containers_numbers: Vec<u32>,
    /// Highest number handed out so far
    pub temp_container_counter: u32,
    /// Cleanup counters
    pub statistics: Statistics,
}

/// Writes the current state through the storage host
pub struct Persistence {
    host: Arc<dyn StorageHost>,
    lifecycle: Arc<ContainerLifecycle>,
    statistics: Arc<StatisticsRecorder>,
    preferences: PreferenceSnapshot,
    write: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence").finish_non_exhaustive()
    }
}

impl Persistence {
    /// Persistence over shared state; nothing is written until asked
    #[must_use]
    pub fn new(
        host: Arc<dyn StorageHost>,
        lifecycle: Arc<ContainerLifecycle>,
        statistics: Arc<StatisticsRecorder>,
        preferences: PreferenceSnapshot,
    ) -> Self {
        Self {
            host,
            lifecycle,
            statistics,
            preferences,
            write: tokio::sync::Mutex::new(()),
        }
    }

    /// Snapshot of the current state
    #[must_use]
    pub fn snapshot(&self) -> StorageLocal {
        let (numbers, counter) = self.lifecycle.numbering();
        StorageLocal {
            version: crate::VERSION.to_string(),
            preferences: (*self.preferences.load()).clone(),
            temp_containers: self.lifecycle.containers(),
            temp_containers_numbers: numbers,
            temp_container_counter: counter,
            statistics: self.statistics.snapshot(),
        }
    }

    /// Write the snapshot; failures are logged, never propagated
    ///
    /// Returns whether the host accepted the write.
    pub async fn persist(&self) -> bool {
        let _guard = self.write.lock().await;
        let snapshot = self.snapshot();
        match self.host.persist(&snapshot).await {
            Ok(()) => {
                tracing::trace!(containers = snapshot.temp_containers.len(), "persisted state");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to persist state");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostError;
    use crate::host::memory::MemoryBrowser;
    use crate::host::MockStorageHost;

    #[test]
    fn stored_document_uses_camel_case() {
        let json = serde_json::json!({
            "preferences": {"container": {"namePrefix": "iso"}},
            "tempContainers": {
                "firefox-container-2": {
                    "cookieStoreId": "firefox-container-2",
                    "name": "iso2",
                    "color": "red",
                    "icon": "circle",
                    "number": 2,
                    "clean": false,
                    "deletesHistory": true,
                    "history": {"https://a.test/": {"tabId": 5}}
                }
            },
            "tempContainersNumbers": [2],
            "tempContainerCounter": 2
        });
        let local: StorageLocal = serde_json::from_value(json).unwrap();
        assert_eq!(local.preferences.container.name_prefix, "iso");
        let container = &local.temp_containers[&ContainerId::new("firefox-container-2")];
        assert!(container.deletes_history);
        assert_eq!(container.history.len(), 1);
        assert_eq!(local.temp_container_counter, 2);
    }

    #[tokio::test]
    async fn persist_writes_current_registry() {
        let browser = Arc::new(MemoryBrowser::new());
        let lifecycle = Arc::new(ContainerLifecycle::new(browser.clone()));
        let persistence = Persistence::new(
            browser.clone(),
            lifecycle.clone(),
            Arc::new(StatisticsRecorder::default()),
            PreferenceSnapshot::default(),
        );

        lifecycle
            .create_container(&Preferences::default().container, false)
            .await
            .unwrap();
        assert!(persistence.persist().await);

        let stored = browser.stored().unwrap();
        assert_eq!(stored.temp_containers.len(), 1);
        assert_eq!(stored.temp_container_counter, 1);
        assert_eq!(stored.version, crate::VERSION);
    }

    #[tokio::test]
    async fn storage_failure_is_swallowed() {
        let mut host = MockStorageHost::new();
        host.expect_persist()
            .returning(|_| Err(HostError::Unavailable("quota".to_string())));
        let browser = Arc::new(MemoryBrowser::new());
        let persistence = Persistence::new(
            Arc::new(host),
            Arc::new(ContainerLifecycle::new(browser)),
            Arc::new(StatisticsRecorder::default()),
            PreferenceSnapshot::default(),
        );
        assert!(!persistence.persist().await);
    }
}
