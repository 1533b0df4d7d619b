//! Temporary container lifecycle
//!
//! Owns the registry of live temporary containers:
//! - Creation with numbering, naming and appearance
//! - Reuse of a clean container through an exclusive claim
//! - Conversion to and from permanent containers
//! - Removal (idempotent; the registry entry goes first)
//!
//! The registry is only touched synchronously. Host calls happen outside any
//! lock, and a container is registered only after the host confirmed it.

use crate::error::{ContainerCreationError, ContainerRemovalError, CoreError, HostError};
use crate::host::ContainerHost;
use crate::types::{ContainerAttributes, ContainerId, ContainerKind, TabId};
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tmpc_preferences::{ContainerPreferences, NumberMode};

/// Name suffix marking a deletes-history container
pub const DELETES_HISTORY_SUFFIX: &str = "-deleteshistory";

/// Tab a URL was visited in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Tab the URL was opened in
    pub tab_id: TabId,
}

/// A container the core created and will eventually remove
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporaryContainer {
    /// Cookie store id assigned by the host
    pub cookie_store_id: ContainerId,
    /// Display name, including the number
    pub name: String,
    /// Color the container was created with
    pub color: tmpc_preferences::ContainerColor,
    /// Icon the container was created with
    pub icon: tmpc_preferences::ContainerIcon,
    /// Number from the numbering scheme
    pub number: u32,
    /// No navigation has happened in the container yet
    pub clean: bool,
    /// History and cookies are deleted on removal
    #[serde(default)]
    pub deletes_history: bool,
    /// URLs visited, recorded for deletes-history containers only
    #[serde(default)]
    pub history: BTreeMap<String, HistoryEntry>,
}

impl TemporaryContainer {
    fn attributes(&self) -> ContainerAttributes {
        ContainerAttributes {
            name: self.name.clone(),
            color: self.color,
            icon: self.icon,
        }
    }
}

#[derive(Debug, Default)]
struct Numbering {
    counter: u32,
    live: BTreeSet<u32>,
}

impl Numbering {
    fn reserve(&mut self, mode: NumberMode) -> u32 {
        let number = match mode {
            NumberMode::Reuse => (1..).find(|n| !self.live.contains(n)).unwrap_or(1),
            NumberMode::Keep | NumberMode::KeepUntilRestart | NumberMode::Hide => {
                self.counter += 1;
                while self.live.contains(&self.counter) {
                    self.counter += 1;
                }
                self.counter
            }
        };
        self.live.insert(number);
        number
    }

    /// Undo a reservation that never became a container
    fn rollback(&mut self, number: u32, mode: NumberMode) {
        self.live.remove(&number);
        // reuse mode picks free numbers without advancing the counter
        if !matches!(mode, NumberMode::Reuse) && self.counter == number {
            self.counter -= 1;
        }
    }
}

/// Registry of live temporary containers
pub struct ContainerLifecycle {
    host: Arc<dyn ContainerHost>,
    containers: DashMap<ContainerId, TemporaryContainer>,
    numbering: Mutex<Numbering>,
    claims: Mutex<HashSet<ContainerId>>,
}

impl std::fmt::Debug for ContainerLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerLifecycle")
            .field("containers", &self.containers.len())
            .field("claims", &self.claims.lock().len())
            .finish_non_exhaustive()
    }
}

impl ContainerLifecycle {
    /// Empty registry over `host`
    #[must_use]
    pub fn new(host: Arc<dyn ContainerHost>) -> Self {
        Self {
            host,
            containers: DashMap::new(),
            numbering: Mutex::new(Numbering::default()),
            claims: Mutex::new(HashSet::new()),
        }
    }

    /// Reload the registry from a persisted snapshot
    pub fn restore(
        &self,
        containers: impl IntoIterator<Item = TemporaryContainer>,
        counter: u32,
    ) {
        let mut numbering = self.numbering.lock();
        numbering.counter = counter;
        numbering.live.clear();
        self.containers.clear();
        for container in containers {
            numbering.live.insert(container.number);
            self.containers
                .insert(container.cookie_store_id.clone(), container);
        }
        tracing::debug!(containers = self.containers.len(), counter, "restored container registry");
    }

    /// Create a temporary container on the host and register it
    ///
    /// # Errors
    /// - `ContainerCreationError` if the host refuses; nothing is registered
    ///   and the reserved number is released
    #[tracing::instrument(skip(self, prefs), fields(prefix = %prefs.name_prefix))]
    pub async fn create_container(
        &self,
        prefs: &ContainerPreferences,
        deletes_history: bool,
    ) -> Result<TemporaryContainer, ContainerCreationError> {
        let number = self.numbering.lock().reserve(prefs.number_mode);
        let attributes = ContainerAttributes {
            name: container_name(prefs, number, deletes_history),
            color: pick(prefs.color_random, &prefs.color_candidates(), prefs.color),
            icon: pick(prefs.icon_random, &prefs.icon_candidates(), prefs.icon),
        };

        let id = match self.host.create(attributes.clone()).await {
            Ok(id) => id,
            Err(source) => {
                self.numbering.lock().rollback(number, prefs.number_mode);
                return Err(ContainerCreationError {
                    name: attributes.name,
                    source,
                });
            }
        };

        let container = TemporaryContainer {
            cookie_store_id: id.clone(),
            name: attributes.name,
            color: attributes.color,
            icon: attributes.icon,
            number,
            clean: true,
            deletes_history,
            history: BTreeMap::new(),
        };
        self.containers.insert(id.clone(), container.clone());
        tracing::info!(container = %id, name = %container.name, deletes_history, "created temporary container");
        Ok(container)
    }

    /// Claim a clean container for one navigation
    ///
    /// Returns `None` if the container is unknown, already used, or claimed
    /// by another in-flight navigation. The claim is taken synchronously.
    #[must_use]
    pub fn reuse_clean_container(&self, id: &ContainerId) -> Option<ReuseClaim<'_>> {
        let mut claims = self.claims.lock();
        let clean = self.containers.get(id).is_some_and(|c| c.clean);
        if !clean || !claims.insert(id.clone()) {
            return None;
        }
        tracing::debug!(container = %id, "claimed clean container");
        Some(ReuseClaim {
            lifecycle: self,
            id: id.clone(),
        })
    }

    /// Whether an in-flight navigation holds a claim on the container
    #[must_use]
    pub fn is_claimed(&self, id: &ContainerId) -> bool {
        self.claims.lock().contains(id)
    }

    /// Record a navigation; returns false for non-temporary containers
    pub fn mark_navigated(&self, id: &ContainerId, url: &str, tab_id: TabId) -> bool {
        let Some(mut container) = self.containers.get_mut(id) else {
            return false;
        };
        container.clean = false;
        if container.deletes_history {
            container
                .history
                .insert(url.to_string(), HistoryEntry { tab_id });
        }
        true
    }

    /// Stop managing a container and rename it
    ///
    /// # Errors
    /// - `CoreError::NotTemporary` if the container is not registered
    /// - `CoreError::Host` if the rename fails; the container stays
    ///   unregistered
    pub async fn convert_to_permanent(
        &self,
        id: &ContainerId,
        name: Option<String>,
    ) -> Result<TemporaryContainer, CoreError> {
        let (_, container) = self
            .containers
            .remove(id)
            .ok_or_else(|| CoreError::NotTemporary(id.clone()))?;
        self.numbering.lock().live.remove(&container.number);
        self.claims.lock().remove(id);

        let mut attributes = container.attributes();
        if let Some(name) = name {
            attributes.name = name;
        }
        self.host.update(id, attributes).await?;
        tracing::info!(container = %id, "converted to permanent container");
        Ok(container)
    }

    /// Turn a deletes-history container into a regular temporary one
    ///
    /// # Errors
    /// - `CoreError::NotTemporary` if the container is not registered
    /// - `CoreError::Host` if the rename fails
    pub async fn convert_to_regular(&self, id: &ContainerId) -> Result<TemporaryContainer, CoreError> {
        let container = {
            let mut entry = self
                .containers
                .get_mut(id)
                .ok_or_else(|| CoreError::NotTemporary(id.clone()))?;
            entry.deletes_history = false;
            entry.history.clear();
            if let Some(stripped) = entry.name.strip_suffix(DELETES_HISTORY_SUFFIX) {
                entry.name = stripped.to_string();
            }
            entry.clone()
        };

        self.host.update(id, container.attributes()).await?;
        tracing::info!(container = %id, "converted to regular temporary container");
        Ok(container)
    }

    /// Start managing an existing container as temporary
    ///
    /// Already temporary containers are returned unchanged.
    ///
    /// # Errors
    /// - `CoreError::Host` if the host does not know the container
    pub async fn convert_to_temporary(
        &self,
        id: &ContainerId,
        mode: NumberMode,
    ) -> Result<TemporaryContainer, CoreError> {
        if let Some(existing) = self.get(id) {
            return Ok(existing);
        }
        let host_container = self.host.get(id).await?;

        let number = self.numbering.lock().reserve(mode);
        let container = TemporaryContainer {
            cookie_store_id: id.clone(),
            name: host_container.name,
            color: host_container.color,
            icon: host_container.icon,
            number,
            clean: false,
            deletes_history: false,
            history: BTreeMap::new(),
        };
        self.containers.insert(id.clone(), container.clone());
        tracing::info!(container = %id, "converted to temporary container");
        Ok(container)
    }

    /// Unregister a container and delete it on the host
    ///
    /// Returns `Ok(None)` if the container was not registered. The entry is
    /// removed before the host call, so concurrent calls remove it once.
    ///
    /// # Errors
    /// - `ContainerRemovalError` if the host fails; the container stays
    ///   unregistered and is not retried
    pub async fn remove_container(
        &self,
        id: &ContainerId,
    ) -> Result<Option<TemporaryContainer>, ContainerRemovalError> {
        let Some((_, container)) = self.containers.remove(id) else {
            return Ok(None);
        };
        self.claims.lock().remove(id);
        self.finish_removal(container).await.map(Some)
    }

    /// Take an unclaimed container out of the registry ahead of its removal
    ///
    /// While detached the container can be neither reused nor converted. Its
    /// number stays reserved until [`Self::finish_removal`] or
    /// [`Self::reattach`]. Returns `None` if the container is not registered
    /// or a navigation holds a claim on it.
    #[must_use]
    pub fn detach(&self, id: &ContainerId) -> Option<TemporaryContainer> {
        let claims = self.claims.lock();
        if claims.contains(id) {
            return None;
        }
        self.containers.remove(id).map(|(_, container)| container)
    }

    /// Put a detached container back; it no longer counts as clean
    pub fn reattach(&self, mut container: TemporaryContainer) {
        container.clean = false;
        tracing::debug!(container = %container.cookie_store_id, "reattached container");
        self.containers
            .insert(container.cookie_store_id.clone(), container);
    }

    /// Delete a detached container on the host and release its number
    ///
    /// # Errors
    /// - `ContainerRemovalError` if the host fails; the container stays
    ///   unregistered and is not retried
    pub async fn finish_removal(
        &self,
        container: TemporaryContainer,
    ) -> Result<TemporaryContainer, ContainerRemovalError> {
        self.numbering.lock().live.remove(&container.number);
        let id = &container.cookie_store_id;
        match self.host.remove(id).await {
            Ok(()) | Err(HostError::ContainerNotFound(_)) => {
                tracing::info!(container = %id, name = %container.name, "removed temporary container");
                Ok(container)
            }
            Err(source) => Err(ContainerRemovalError {
                id: id.clone(),
                source,
            }),
        }
    }

    /// Restart numbering for counter-based modes
    pub fn reset_counter(&self) {
        self.numbering.lock().counter = 0;
    }

    /// Classify a container
    #[must_use]
    pub fn kind_of(&self, id: &ContainerId, default_store: &ContainerId) -> ContainerKind {
        if id == default_store {
            return ContainerKind::Default;
        }
        match self.containers.get(id) {
            Some(c) if c.clean => ContainerKind::TemporaryClean,
            Some(_) => ContainerKind::TemporaryUsed,
            None => ContainerKind::Permanent,
        }
    }

    /// Whether `id` is registered
    #[must_use]
    pub fn is_temporary(&self, id: &ContainerId) -> bool {
        self.containers.contains_key(id)
    }

    /// Registry entry for `id`
    #[must_use]
    pub fn get(&self, id: &ContainerId) -> Option<TemporaryContainer> {
        self.containers.get(id).map(|c| c.clone())
    }

    /// Ids of every live temporary container
    #[must_use]
    pub fn ids(&self) -> Vec<ContainerId> {
        self.containers.iter().map(|c| c.key().clone()).collect()
    }

    /// Copy of the registry, ordered by id
    #[must_use]
    pub fn containers(&self) -> BTreeMap<ContainerId, TemporaryContainer> {
        self.containers
            .iter()
            .map(|c| (c.key().clone(), c.value().clone()))
            .collect()
    }

    /// Numbers held by live containers, and the counter
    #[must_use]
    pub fn numbering(&self) -> (Vec<u32>, u32) {
        let numbering = self.numbering.lock();
        (numbering.live.iter().copied().collect(), numbering.counter)
    }

    /// Number of registered containers
    #[must_use]
    pub fn len(&self) -> usize {
        self.containers.len()
    }

    /// No container is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }
}

/// Exclusive right to navigate in a clean container
///
/// Dropping the claim without committing aborts it.
#[must_use]
#[derive(Debug)]
pub struct ReuseClaim<'a> {
    lifecycle: &'a ContainerLifecycle,
    id: ContainerId,
}

impl ReuseClaim<'_> {
    /// Container the claim is on
    #[must_use]
    pub fn id(&self) -> &ContainerId {
        &self.id
    }

    /// The navigation went ahead in the claimed container
    pub fn commit(self, url: &str, tab_id: TabId) {
        self.lifecycle.mark_navigated(&self.id, url, tab_id);
    }
}

impl Drop for ReuseClaim<'_> {
    fn drop(&mut self) {
        self.lifecycle.claims.lock().remove(&self.id);
    }
}

/// Visible name for a container
#[must_use]
pub fn container_name(prefs: &ContainerPreferences, number: u32, deletes_history: bool) -> String {
    let mut name = prefs.name_prefix.clone();
    if prefs.number_mode.is_visible() {
        name.push_str(&number.to_string());
    }
    if deletes_history {
        name.push_str(DELETES_HISTORY_SUFFIX);
    }
    name
}

fn pick<T: Copy>(random: bool, candidates: &[T], fallback: T) -> T {
    if !random {
        return fallback;
    }
    candidates
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::MemoryBrowser;
    use crate::host::MockContainerHost;
    use pretty_assertions::assert_eq;
    use tmpc_preferences::ContainerColor;

    fn lifecycle() -> (Arc<MemoryBrowser>, ContainerLifecycle) {
        let browser = Arc::new(MemoryBrowser::new());
        let lifecycle = ContainerLifecycle::new(browser.clone());
        (browser, lifecycle)
    }

    #[tokio::test]
    async fn keep_mode_counts_up() {
        let (browser, lifecycle) = lifecycle();
        let prefs = ContainerPreferences::default();

        let first = lifecycle.create_container(&prefs, false).await.unwrap();
        let second = lifecycle.create_container(&prefs, false).await.unwrap();
        assert_eq!(first.name, "tmp1");
        assert_eq!(second.name, "tmp2");
        assert!(first.clean);

        lifecycle.remove_container(&first.cookie_store_id).await.unwrap();
        let third = lifecycle.create_container(&prefs, false).await.unwrap();
        assert_eq!(third.number, 3);
        assert_eq!(browser.container_count(), 2);
    }

    #[tokio::test]
    async fn reuse_mode_fills_gaps() {
        let (_, lifecycle) = lifecycle();
        let prefs = ContainerPreferences {
            number_mode: NumberMode::Reuse,
            ..ContainerPreferences::default()
        };

        let first = lifecycle.create_container(&prefs, false).await.unwrap();
        let _second = lifecycle.create_container(&prefs, false).await.unwrap();
        lifecycle.remove_container(&first.cookie_store_id).await.unwrap();

        let third = lifecycle.create_container(&prefs, false).await.unwrap();
        assert_eq!(third.number, 1);
        assert_eq!(lifecycle.numbering().0, vec![1, 2]);
    }

    #[test]
    fn names_follow_mode_and_kind() {
        let mut prefs = ContainerPreferences::default();
        assert_eq!(container_name(&prefs, 4, true), "tmp4-deleteshistory");
        prefs.number_mode = NumberMode::Hide;
        assert_eq!(container_name(&prefs, 4, false), "tmp");
    }

    #[tokio::test]
    async fn random_color_stays_within_candidates() {
        let (_, lifecycle) = lifecycle();
        let prefs = ContainerPreferences {
            color_random: true,
            color_random_excluded: ContainerColor::ALL[1..].to_vec(),
            ..ContainerPreferences::default()
        };
        let container = lifecycle.create_container(&prefs, false).await.unwrap();
        assert_eq!(container.color, ContainerColor::ALL[0]);
    }

    #[tokio::test]
    async fn refused_creation_leaves_no_trace() {
        let mut host = MockContainerHost::new();
        host.expect_create()
            .returning(|_| Err(HostError::Rejected("quota".to_string())));
        let lifecycle = ContainerLifecycle::new(Arc::new(host));

        let err = lifecycle
            .create_container(&ContainerPreferences::default(), false)
            .await
            .unwrap_err();
        assert_eq!(err.name, "tmp1");
        assert!(lifecycle.is_empty());
        assert_eq!(lifecycle.numbering(), (vec![], 0));
    }

    #[tokio::test]
    async fn refused_reuse_numbering_keeps_the_counter() {
        let mut host = MockContainerHost::new();
        host.expect_create()
            .returning(|_| Err(HostError::Rejected("quota".to_string())));
        let lifecycle = ContainerLifecycle::new(Arc::new(host));
        // counter left at 1 by an earlier keep-mode container that is gone
        lifecycle.restore(Vec::new(), 1);

        let prefs = ContainerPreferences {
            number_mode: NumberMode::Reuse,
            ..ContainerPreferences::default()
        };
        let err = lifecycle.create_container(&prefs, false).await.unwrap_err();
        assert_eq!(err.name, "tmp1");
        assert_eq!(lifecycle.numbering(), (vec![], 1));
    }

    #[tokio::test]
    async fn claims_are_exclusive_until_released() {
        let (_, lifecycle) = lifecycle();
        let container = lifecycle
            .create_container(&ContainerPreferences::default(), false)
            .await
            .unwrap();
        let id = container.cookie_store_id;

        let claim = lifecycle.reuse_clean_container(&id).unwrap();
        assert!(lifecycle.reuse_clean_container(&id).is_none());
        drop(claim);

        let claim = lifecycle.reuse_clean_container(&id).unwrap();
        claim.commit("https://example.com", TabId(1));
        assert!(!lifecycle.is_claimed(&id));
        assert!(lifecycle.reuse_clean_container(&id).is_none());
        assert_eq!(
            lifecycle.kind_of(&id, &ContainerId::new("firefox-default")),
            ContainerKind::TemporaryUsed
        );
    }

    #[tokio::test]
    async fn history_is_recorded_for_deletes_history_only() {
        let (_, lifecycle) = lifecycle();
        let prefs = ContainerPreferences::default();
        let plain = lifecycle.create_container(&prefs, false).await.unwrap();
        let wiping = lifecycle.create_container(&prefs, true).await.unwrap();

        lifecycle.mark_navigated(&plain.cookie_store_id, "https://a.test", TabId(1));
        lifecycle.mark_navigated(&wiping.cookie_store_id, "https://b.test", TabId(2));

        assert!(lifecycle.get(&plain.cookie_store_id).unwrap().history.is_empty());
        let history = lifecycle.get(&wiping.cookie_store_id).unwrap().history;
        assert_eq!(history["https://b.test"].tab_id, TabId(2));
    }

    #[tokio::test]
    async fn conversions() {
        let (browser, lifecycle) = lifecycle();
        let prefs = ContainerPreferences::default();
        let container = lifecycle.create_container(&prefs, true).await.unwrap();
        let id = container.cookie_store_id.clone();
        lifecycle.mark_navigated(&id, "https://a.test", TabId(1));

        let regular = lifecycle.convert_to_regular(&id).await.unwrap();
        assert_eq!(regular.name, "tmp1");
        assert!(!regular.deletes_history);
        assert!(regular.history.is_empty());
        assert_eq!(browser.container(&id).unwrap().name, "tmp1");

        lifecycle
            .convert_to_permanent(&id, Some("Banking".to_string()))
            .await
            .unwrap();
        assert!(!lifecycle.is_temporary(&id));
        assert_eq!(browser.container(&id).unwrap().name, "Banking");
        assert!(matches!(
            lifecycle.convert_to_permanent(&id, None).await,
            Err(CoreError::NotTemporary(_))
        ));

        let back = lifecycle.convert_to_temporary(&id, NumberMode::Keep).await.unwrap();
        assert_eq!(back.name, "Banking");
        assert!(!back.clean);
        assert!(lifecycle.is_temporary(&id));
    }

    #[tokio::test]
    async fn removal_is_idempotent() {
        let (browser, lifecycle) = lifecycle();
        let container = lifecycle
            .create_container(&ContainerPreferences::default(), false)
            .await
            .unwrap();
        let id = container.cookie_store_id;

        assert!(lifecycle.remove_container(&id).await.unwrap().is_some());
        assert!(lifecycle.remove_container(&id).await.unwrap().is_none());
        assert!(browser.container(&id).is_none());
    }

    #[tokio::test]
    async fn detached_containers_are_out_of_reach_until_reattached() {
        let (browser, lifecycle) = lifecycle();
        let container = lifecycle
            .create_container(&ContainerPreferences::default(), false)
            .await
            .unwrap();
        let id = container.cookie_store_id.clone();

        let claim = lifecycle.reuse_clean_container(&id).unwrap();
        assert!(lifecycle.detach(&id).is_none());
        drop(claim);

        let detached = lifecycle.detach(&id).unwrap();
        assert!(!lifecycle.is_temporary(&id));
        assert!(lifecycle.reuse_clean_container(&id).is_none());
        assert!(matches!(
            lifecycle.convert_to_permanent(&id, None).await,
            Err(CoreError::NotTemporary(_))
        ));
        assert_eq!(lifecycle.numbering().0, vec![1]);

        lifecycle.reattach(detached.clone());
        assert_eq!(
            lifecycle.kind_of(&id, &ContainerId::new("firefox-default")),
            ContainerKind::TemporaryUsed
        );

        let detached = lifecycle.detach(&id).unwrap();
        lifecycle.finish_removal(detached).await.unwrap();
        assert!(browser.container(&id).is_none());
        assert_eq!(lifecycle.numbering().0, Vec::<u32>::new());
    }

    #[tokio::test]
    async fn failed_removal_still_unregisters() {
        let mut host = MockContainerHost::new();
        host.expect_create()
            .returning(|_| Ok(ContainerId::new("firefox-container-9")));
        host.expect_remove()
            .times(1)
            .returning(|_| Err(HostError::Unavailable("busy".to_string())));
        let lifecycle = ContainerLifecycle::new(Arc::new(host));

        let container = lifecycle
            .create_container(&ContainerPreferences::default(), false)
            .await
            .unwrap();
        let err = lifecycle
            .remove_container(&container.cookie_store_id)
            .await
            .unwrap_err();
        assert_eq!(err.id, container.cookie_store_id);
        assert!(lifecycle.is_empty());
        assert!(lifecycle
            .remove_container(&container.cookie_store_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn reset_counter_skips_live_numbers() {
        let (_, lifecycle) = lifecycle();
        let prefs = ContainerPreferences::default();
        lifecycle.create_container(&prefs, false).await.unwrap();
        lifecycle.reset_counter();
        let next = lifecycle.create_container(&prefs, false).await.unwrap();
        assert_eq!(next.number, 2);
    }
}
