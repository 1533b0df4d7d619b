//! Cleanup and deletion
//!
//! Per container: `Active` (tabs open) → `PendingRemoval` (no tabs, timer
//! running) → removed. A tab attaching during the delay sends it back to
//! `Active`; conversion to permanent takes it out of the machine entirely.
//!
//! Timers are tokio tasks tagged with a generation. Cancelling aborts the
//! task and drops the entry; an expiring task only proceeds if its entry is
//! still the current one.
//!
//! Removal re-checks the container after every host call. Nothing is
//! deleted until the jar has been listed and the container is still idle;
//! from then on it is detached from the registry, and a tab that attaches
//! while cookies or history are deleted puts it back instead of losing it.

use crate::config::PreferenceSnapshot;
use crate::error::HistoryDeleteError;
use crate::host::{CookieHost, HistoryHost, TabHost};
use crate::lifecycle::{ContainerLifecycle, TemporaryContainer};
use crate::statistics::{RemovalReport, Statistics, StatisticsRecorder};
use crate::storage::Persistence;
use crate::types::{ContainerId, Cookie, Permissions, TabId, TabQuery};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Where a container stands in the removal state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalState {
    /// Tabs are open, or the container is not being tracked for removal
    Active,
    /// No tabs; removal scheduled for the deadline
    PendingRemoval {
        /// When the removal runs
        deadline: Instant,
    },
}

#[derive(Debug)]
struct PendingRemoval {
    generation: u64,
    deadline: Instant,
    handle: Option<AbortHandle>,
}

/// Collaborators the cleanup engine runs against
#[derive(Clone)]
pub struct CleanupHosts {
    /// Tab queries for the emptiness checks
    pub tabs: Arc<dyn TabHost>,
    /// Cookie listing and deletion for deletes-history containers
    pub cookies: Arc<dyn CookieHost>,
    /// History deletion for deletes-history containers
    pub history: Arc<dyn HistoryHost>,
}

/// Removes temporary containers once their last tab is gone
pub struct CleanupEngine {
    hosts: CleanupHosts,
    lifecycle: Arc<ContainerLifecycle>,
    statistics: Arc<StatisticsRecorder>,
    persistence: Arc<Persistence>,
    preferences: PreferenceSnapshot,
    permissions: Arc<RwLock<Permissions>>,
    /// Tabs reported closed whose removal has not been evaluated yet
    queue: Mutex<HashMap<TabId, Instant>>,
    pending: DashMap<ContainerId, PendingRemoval>,
    generation: AtomicU64,
}

impl std::fmt::Debug for CleanupEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupEngine")
            .field("queued", &self.queue.lock().len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl CleanupEngine {
    /// Engine over the shared registry, counters and storage
    #[must_use]
    pub fn new(
        hosts: CleanupHosts,
        lifecycle: Arc<ContainerLifecycle>,
        statistics: Arc<StatisticsRecorder>,
        persistence: Arc<Persistence>,
        preferences: PreferenceSnapshot,
        permissions: Arc<RwLock<Permissions>>,
    ) -> Self {
        Self {
            hosts,
            lifecycle,
            statistics,
            persistence,
            preferences,
            permissions,
            queue: Mutex::new(HashMap::new()),
            pending: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// A tab closed; evaluate every container
    pub async fn enqueue(self: &Arc<Self>, tab_id: TabId) {
        self.queue.lock().insert(tab_id, Instant::now());
        self.sweep().await;
    }

    /// Schedule removal for every container without open tabs, and cancel
    /// pending removals whose container has tabs again
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn sweep(self: &Arc<Self>) {
        let started = Instant::now();
        for id in self.lifecycle.ids() {
            let Some(open) = self.open_tabs(&id).await else {
                continue;
            };
            if open > 0 {
                if self.cancel(&id) {
                    tracing::debug!(container = %id, open, "tab attached, removal cancelled");
                }
                continue;
            }
            if self.pending.contains_key(&id) {
                continue;
            }
            let Some(container) = self.lifecycle.get(&id) else {
                continue;
            };
            let delay = self.removal_delay(&container);
            self.schedule(id, delay).await;
        }
        self.queue.lock().retain(|_, queued| *queued > started);
    }

    /// Cancel a pending removal; true if one was pending
    pub fn cancel(&self, id: &ContainerId) -> bool {
        match self.pending.remove(id) {
            Some((_, pending)) => {
                if let Some(handle) = pending.handle {
                    handle.abort();
                }
                true
            }
            None => false,
        }
    }

    /// Current removal state of a container
    #[must_use]
    pub fn state(&self, id: &ContainerId) -> RemovalState {
        self.pending
            .get(id)
            .map_or(RemovalState::Active, |p| RemovalState::PendingRemoval {
                deadline: p.deadline,
            })
    }

    /// Remove every tabless container now, ignoring delays
    pub async fn cleanup_now(self: &Arc<Self>) -> usize {
        let mut removed = 0;
        for id in self.lifecycle.ids() {
            if self.remove_container(&id).await.removed {
                removed += 1;
            }
        }
        removed
    }

    /// Delete an idle container with its cookies and history, and count it
    ///
    /// A container that is unknown, has open tabs, or is claimed by a
    /// navigation is left alone with an empty report. A tab attaching after
    /// deletion started keeps the container; what was already deleted is
    /// still counted.
    pub async fn remove_container(&self, id: &ContainerId) -> RemovalReport {
        self.cancel(id);
        if !self.is_idle(id).await {
            return RemovalReport::default();
        }
        let cookies = self.list_cookies(id).await;
        // listing suspends; a tab or a conversion may have come in
        if !self.is_idle(id).await {
            return RemovalReport::default();
        }
        let Some(container) = self.lifecycle.detach(id) else {
            return RemovalReport::default();
        };

        let mut report = RemovalReport {
            deletes_history: container.deletes_history,
            ..RemovalReport::default()
        };
        report.cookies_deleted = self.delete_cookies(&cookies).await;
        if container.deletes_history {
            report.urls_deleted = self.delete_history(&container).await;
        }

        if self.open_tabs(id).await != Some(0) {
            tracing::info!(container = %id, "tab attached during removal, container kept");
            self.lifecycle.reattach(container);
            self.statistics.record(&report);
            self.persistence.persist().await;
            return report;
        }

        match self.lifecycle.finish_removal(container).await {
            Ok(_) => report.removed = true,
            Err(e) => tracing::warn!(error = %e, "container removal failed, unregistered anyway"),
        }

        self.statistics.record(&report);
        self.persistence.persist().await;
        tracing::info!(
            container = %id,
            cookies = report.cookies_deleted,
            urls = report.urls_deleted,
            "cleaned up temporary container"
        );
        report
    }

    /// Counters snapshot
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        self.statistics.snapshot()
    }

    /// Zero the counters and persist them
    pub async fn reset_statistics(&self) {
        self.statistics.reset();
        self.persistence.persist().await;
    }

    async fn schedule(self: &Arc<Self>, id: ContainerId, delay: Duration) {
        if delay.is_zero() {
            self.remove_container(&id).await;
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let deadline = Instant::now() + delay;
        self.pending.insert(
            id.clone(),
            PendingRemoval {
                generation,
                deadline,
                handle: None,
            },
        );
        tracing::debug!(container = %id, delay_ms = delay.as_millis(), "removal scheduled");

        let engine = Arc::clone(self);
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            engine.expire_scheduled(&task_id, generation).await;
        })
        .abort_handle();

        if let Some(mut entry) = self.pending.get_mut(&id) {
            if entry.generation == generation {
                entry.handle = Some(handle);
            }
        }
    }

    async fn expire_scheduled(&self, id: &ContainerId, generation: u64) {
        if self
            .pending
            .remove_if(id, |_, p| p.generation == generation)
            .is_none()
        {
            return;
        }
        self.remove_container(id).await;
    }

    /// Registered, without open tabs, and not claimed by a navigation
    async fn is_idle(&self, id: &ContainerId) -> bool {
        match self.open_tabs(id).await {
            Some(0) => {}
            Some(open) => {
                tracing::debug!(container = %id, open, "container has tabs, keeping it");
                return false;
            }
            None => return false,
        }
        if self.lifecycle.is_claimed(id) {
            tracing::debug!(container = %id, "container claimed by a navigation, keeping it");
            return false;
        }
        self.lifecycle.is_temporary(id)
    }

    /// Open tabs in a container, not counting tabs reported closed
    async fn open_tabs(&self, id: &ContainerId) -> Option<usize> {
        match self.hosts.tabs.query(TabQuery::in_container(id)).await {
            Ok(tabs) => {
                let queue = self.queue.lock();
                Some(tabs.iter().filter(|t| !queue.contains_key(&t.id)).count())
            }
            Err(e) => {
                tracing::warn!(
                    container = %id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "tab query failed, skipping container until the next sweep"
                );
                None
            }
        }
    }

    fn removal_delay(&self, container: &TemporaryContainer) -> Duration {
        let prefs = self.preferences.load();
        let millis = if container.deletes_history {
            prefs.deletes_history.container_removal
        } else {
            prefs.container.removal
        };
        Duration::from_millis(millis)
    }

    async fn list_cookies(&self, id: &ContainerId) -> Vec<Cookie> {
        self.hosts.cookies.get_all(id).await.unwrap_or_else(|e| {
            tracing::warn!(container = %id, error = %e, "failed to list cookies");
            Vec::new()
        })
    }

    async fn delete_cookies(&self, cookies: &[Cookie]) -> u64 {
        let results =
            futures::future::join_all(cookies.iter().map(|c| self.hosts.cookies.remove(c))).await;
        let mut deleted = 0;
        for (cookie, result) in cookies.iter().zip(results) {
            match result {
                Ok(()) => deleted += 1,
                Err(e) => tracing::warn!(cookie = %cookie.name, error = %e, "failed to delete cookie"),
            }
        }
        deleted
    }

    async fn delete_history(&self, container: &TemporaryContainer) -> u64 {
        if !self.permissions.read().history {
            tracing::warn!(
                container = %container.cookie_store_id,
                "history permission missing, recorded history kept"
            );
            return 0;
        }
        let mut deleted = 0;
        for url in container.history.keys() {
            match self.hosts.history.delete_url(url).await {
                Ok(()) => deleted += 1,
                Err(source) => {
                    let e = HistoryDeleteError {
                        url: url.clone(),
                        source,
                    };
                    tracing::warn!(error = %e, "history deletion failed");
                }
            }
        }
        deleted
    }
}
