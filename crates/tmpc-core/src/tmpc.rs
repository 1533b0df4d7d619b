//! Temporary Containers
//!
//! The event-facing core. It owns one of each engine, wires them to the
//! host collaborators, and maps browser events and runtime messages onto
//! them:
//! - tab events drive automatic mode, history recording and cleanup
//! - main-frame requests go through the isolation decision engine
//! - outgoing headers go through the request cookie policy
//! - runtime messages go through the closed command surface

use crate::cleanup::{CleanupEngine, CleanupHosts};
use crate::click::{LinkClick, PendingClicks};
use crate::config::{CoreConfig, PreferenceSnapshot};
use crate::cookies::RequestCookieEnforcer;
use crate::decision::{Decision, IsolationEngine, NavigationRequest, Trigger};
use crate::error::{Result, RuntimeError};
use crate::host::Hosts;
use crate::lifecycle::{ContainerLifecycle, TemporaryContainer};
use crate::runtime::{Command, ContainerTarget, CreateTabOptions, ExternalCommand, Response};
use crate::statistics::{Statistics, StatisticsRecorder};
use crate::storage::Persistence;
use crate::types::{
    ContainerId, HttpHeader, NewTab, Permissions, RequestDetails, RequestOutcome, ResourceType,
    SendHeadersDetails, Tab, TabId,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tmpc_preferences::{AutomaticTrigger, ClickType, NumberMode, Preferences};

/// Fields of a tab update the core looks at
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TabChange {
    /// New URL, when the update changed it
    pub url: Option<String>,
}

#[derive(Debug, Default)]
struct TabTracking {
    /// Tabs whose first request counts as part of their creation
    fresh: HashSet<TabId>,
    /// Tabs opened by the core for a URL; their first request is already decided
    reopened: HashSet<TabId>,
}

/// The temporary containers core
pub struct TemporaryContainers {
    config: CoreConfig,
    hosts: Hosts,
    preferences: PreferenceSnapshot,
    permissions: Arc<RwLock<Permissions>>,
    lifecycle: Arc<ContainerLifecycle>,
    engine: IsolationEngine,
    cleanup: Arc<CleanupEngine>,
    cookies: RequestCookieEnforcer,
    persistence: Arc<Persistence>,
    statistics: Arc<StatisticsRecorder>,
    clicks: PendingClicks,
    tabs: Mutex<TabTracking>,
}

impl std::fmt::Debug for TemporaryContainers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemporaryContainers")
            .field("config", &self.config)
            .field("containers", &self.lifecycle.len())
            .field("cleanup", &self.cleanup)
            .finish_non_exhaustive()
    }
}

impl TemporaryContainers {
    /// Load persisted state and wire up the engines
    ///
    /// A stored preference document that no longer validates is replaced by
    /// defaults.
    ///
    /// # Errors
    /// - `CoreError::Host` if the storage host cannot be read
    pub async fn initialize(
        config: CoreConfig,
        hosts: Hosts,
        permissions: Permissions,
    ) -> Result<Arc<Self>> {
        let stored = hosts.storage.load().await?.unwrap_or_default();
        let preferences = match stored.preferences.validate() {
            Ok(()) => stored.preferences,
            Err(e) => {
                tracing::warn!(error = %e, "stored preferences are invalid, using defaults");
                Preferences::default()
            }
        };

        let lifecycle = Arc::new(ContainerLifecycle::new(hosts.containers.clone()));
        lifecycle.restore(stored.temp_containers.into_values(), stored.temp_container_counter);

        let preferences = PreferenceSnapshot::new(preferences);
        let permissions = Arc::new(RwLock::new(permissions));
        let statistics = Arc::new(StatisticsRecorder::new(stored.statistics));
        let persistence = Arc::new(Persistence::new(
            hosts.storage.clone(),
            lifecycle.clone(),
            statistics.clone(),
            preferences.clone(),
        ));
        let cleanup = Arc::new(CleanupEngine::new(
            CleanupHosts {
                tabs: hosts.tabs.clone(),
                cookies: hosts.cookies.clone(),
                history: hosts.history.clone(),
            },
            lifecycle.clone(),
            statistics.clone(),
            persistence.clone(),
            preferences.clone(),
            permissions.clone(),
        ));

        tracing::info!(
            containers = lifecycle.len(),
            version = crate::VERSION,
            "temporary containers initialized"
        );
        Ok(Arc::new(Self {
            engine: IsolationEngine::new(lifecycle.clone()),
            cookies: RequestCookieEnforcer::new(hosts.cookies.clone(), lifecycle.clone()),
            clicks: PendingClicks::new(config.click_ttl),
            tabs: Mutex::new(TabTracking::default()),
            config,
            hosts,
            preferences,
            permissions,
            lifecycle,
            cleanup,
            persistence,
            statistics,
        }))
    }

    // ------------------------------------------------------------------
    // Browser events
    // ------------------------------------------------------------------

    /// Browser started; containers left over from the last session are
    /// queued for removal
    #[tracing::instrument(skip(self))]
    pub async fn on_startup(self: &Arc<Self>) {
        if self.preferences.load().container.number_mode == NumberMode::KeepUntilRestart {
            self.lifecycle.reset_counter();
        }
        self.cleanup.sweep().await;
        self.persistence.persist().await;
    }

    /// A tab was opened
    #[tracing::instrument(skip_all, fields(tab = %tab.id))]
    pub async fn on_tab_created(self: &Arc<Self>, tab: &Tab) {
        if self.cleanup.cancel(&tab.cookie_store_id) {
            tracing::debug!(container = %tab.cookie_store_id, "tab attached, removal cancelled");
        }
        if tab.incognito || tab.cookie_store_id != self.config.default_store_id {
            return;
        }
        let prefs = self.preferences.load();
        if !prefs.automatic_mode.active {
            return;
        }
        match prefs.automatic_mode.new_tab {
            // tabs opened from a link wait for the click's request
            AutomaticTrigger::Created if tab.is_blank() && tab.opener_tab_id.is_none() => {
                let trigger = Trigger::TabCreated;
                let request = self
                    .navigation_request(&prefs, trigger, &tab.url, None, &tab.cookie_store_id)
                    .await;
                let permissions = *self.permissions.read();
                let decision = self.engine.decide(&prefs, &request, permissions).decision;
                if let Decision::IsolateNew { deletes_history } = decision {
                    self.isolate_tab(&prefs, tab, None, trigger, deletes_history)
                        .await;
                }
            }
            // a tab created with a URL is isolated when its request arrives
            AutomaticTrigger::Created | AutomaticTrigger::Navigation => {
                self.tabs.lock().fresh.insert(tab.id);
            }
        }
    }

    /// A tab changed; URL changes mark its container as used
    pub async fn on_tab_updated(&self, tab_id: TabId, change: &TabChange, tab: &Tab) {
        let Some(url) = change.url.as_deref() else {
            return;
        };
        if url.starts_with("about:") {
            return;
        }
        if self.lifecycle.mark_navigated(&tab.cookie_store_id, url, tab_id) {
            self.persistence.persist().await;
        }
    }

    /// A tab was closed
    pub async fn on_tab_removed(self: &Arc<Self>, tab_id: TabId) {
        {
            let mut tabs = self.tabs.lock();
            tabs.fresh.remove(&tab_id);
            tabs.reopened.remove(&tab_id);
        }
        self.clicks.forget_tab(tab_id);
        self.cleanup.enqueue(tab_id).await;
    }

    /// A content script reported a link click
    pub fn on_link_clicked(&self, link: &LinkClick, sender: &Tab) -> Option<ClickType> {
        if sender.incognito {
            return None;
        }
        let click = self.clicks.record(link, sender.id, &sender.url)?;
        tracing::debug!(tab = %sender.id, href = %link.href, ?click, "link click recorded");
        Some(click)
    }

    /// Main-frame request interception
    ///
    /// Never fails: anything going wrong lets the request continue where it
    /// is.
    #[tracing::instrument(skip_all, fields(tab = %details.tab_id, url = %details.url))]
    pub async fn on_before_request(self: &Arc<Self>, details: &RequestDetails) -> RequestOutcome {
        if details.resource_type != ResourceType::MainFrame
            || !details.tab_id.is_tab()
            || !is_web_url(&details.url)
        {
            return RequestOutcome::Continue;
        }
        let prefs = self.preferences.load();
        if prefs.ignores_request(&details.url) {
            tracing::debug!("request on the ignore list");
            return RequestOutcome::Continue;
        }

        if self.tabs.lock().reopened.remove(&details.tab_id) {
            if self
                .lifecycle
                .mark_navigated(&details.cookie_store_id, &details.url, details.tab_id)
            {
                self.persistence.persist().await;
            }
            return RequestOutcome::Continue;
        }

        let tab = match self.hosts.tabs.get(details.tab_id).await {
            Ok(tab) => tab,
            Err(e) => {
                tracing::warn!(error = %e, "tab lookup failed, request continues");
                return RequestOutcome::Continue;
            }
        };
        if tab.incognito {
            return RequestOutcome::Continue;
        }

        let click = self.clicks.take(&details.url);
        let fresh = self.tabs.lock().fresh.remove(&details.tab_id);
        let trigger = match (&click, fresh) {
            (Some(pending), _) => Trigger::Click(pending.click),
            (None, true) if prefs.automatic_mode.new_tab == AutomaticTrigger::Created => {
                Trigger::TabCreated
            }
            (None, fresh) => Trigger::Navigation { new_tab: fresh },
        };
        let origin_url = click
            .map(|pending| pending.origin_url)
            .or_else(|| details.origin_url.clone())
            .or_else(|| (!tab.is_blank()).then(|| tab.url.clone()));

        let request = self
            .navigation_request(&prefs, trigger, &details.url, origin_url, &details.cookie_store_id)
            .await;
        let permissions = *self.permissions.read();
        let resolution = self.engine.decide(&prefs, &request, permissions);

        match resolution.decision {
            Decision::Ignore => RequestOutcome::Continue,
            Decision::Ask => {
                tracing::debug!("assigned container, confirmation left to Multi-Account Containers");
                RequestOutcome::Continue
            }
            Decision::IsolateReuse { container } => {
                if let Some(claim) = resolution.claim {
                    claim.commit(&details.url, details.tab_id);
                }
                tracing::debug!(container = %container, "navigation stays in its clean container");
                self.persistence.persist().await;
                RequestOutcome::Continue
            }
            Decision::IsolateNew { deletes_history } => {
                match self
                    .isolate_tab(&prefs, &tab, Some(&details.url), trigger, deletes_history)
                    .await
                {
                    Some(_) => RequestOutcome::Cancel,
                    None => RequestOutcome::Continue,
                }
            }
        }
    }

    /// Headers to send instead, if configured cookies were added
    pub async fn on_before_send_headers(
        &self,
        details: &SendHeadersDetails,
    ) -> Option<Vec<HttpHeader>> {
        let prefs = self.preferences.load();
        self.cookies.apply(&prefs, details).await
    }

    // ------------------------------------------------------------------
    // Runtime messages
    // ------------------------------------------------------------------

    /// Handle a message from the extension's own pages
    ///
    /// # Errors
    /// - `CoreError::Runtime` for unknown or malformed messages, and for
    ///   `linkClicked` without a sender tab
    /// - the error of the operation otherwise
    pub async fn handle_message(
        self: &Arc<Self>,
        message: &Value,
        sender: Option<&Tab>,
    ) -> Result<Response> {
        let command = Command::from_message(message)?;
        self.execute(command, sender).await
    }

    /// Handle a message from another extension
    ///
    /// # Errors
    /// - `CoreError::Runtime` for anything outside the external surface
    pub async fn handle_external_message(self: &Arc<Self>, message: &Value) -> Result<Response> {
        let command = match ExternalCommand::from_message(message)? {
            ExternalCommand::CreateTabInTempContainer(options) => {
                let automatic = self
                    .preferences
                    .load()
                    .deletes_history
                    .automatic_mode
                    .is_automatic();
                Command::CreateTabInTempContainer(CreateTabOptions {
                    deletes_history: Some(automatic),
                    ..options
                })
            }
            other => other.into(),
        };
        self.execute(command, None).await
    }

    #[tracing::instrument(level = "debug", skip(self, sender))]
    async fn execute(self: &Arc<Self>, command: Command, sender: Option<&Tab>) -> Result<Response> {
        match command {
            Command::CreateTabInTempContainer(options) => {
                let tab = self.create_tab_in_temp_container(options).await?;
                Ok(Response::Tab(Box::new(tab)))
            }
            Command::ConvertTempContainerToPermanent(target) => {
                let container = self.convert_to_permanent(target).await?;
                Ok(Response::Container(Box::new(container)))
            }
            Command::ConvertTempContainerToRegular(target) => {
                let container = self.convert_to_regular(target).await?;
                Ok(Response::Container(Box::new(container)))
            }
            Command::ConvertPermanentToTempContainer(target) => {
                let container = self.convert_to_temporary(target).await?;
                Ok(Response::Container(Box::new(container)))
            }
            Command::IsTempContainer(id) => Ok(Response::Bool(self.is_temp_container(&id))),
            Command::ResetStatistics => {
                self.cleanup.reset_statistics().await;
                Ok(Response::Done)
            }
            Command::CleanupNow => Ok(Response::Count(self.cleanup.cleanup_now().await)),
            Command::LinkClicked(link) => {
                let sender = sender.ok_or(RuntimeError::MissingSender("linkClicked"))?;
                self.on_link_clicked(&link, sender);
                Ok(Response::Done)
            }
            Command::SavePreferences(preferences) => {
                self.save_preferences(*preferences).await?;
                Ok(Response::Done)
            }
            Command::ResetContainerNumber => {
                self.lifecycle.reset_counter();
                self.persistence.persist().await;
                Ok(Response::Done)
            }
            Command::HistoryPermissionAllowed => {
                self.permissions.write().history = true;
                tracing::info!("history permission granted");
                Ok(Response::Done)
            }
            Command::Ping => Ok(Response::PONG),
        }
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Open a tab in a new temporary container
    ///
    /// # Errors
    /// - `CoreError::ContainerCreation` if the host refuses the container
    /// - `CoreError::Host` if the tab cannot be opened
    pub async fn create_tab_in_temp_container(
        self: &Arc<Self>,
        options: CreateTabOptions,
    ) -> Result<Tab> {
        let prefs = self.preferences.load();
        let mut deletes_history = options.deletes_history.unwrap_or(false);
        if deletes_history && !self.permissions.read().history {
            tracing::warn!("history permission missing, opening a regular container instead");
            deletes_history = false;
        }

        let container = self
            .lifecycle
            .create_container(&prefs.container, deletes_history)
            .await?;
        let tab = self
            .open_in(
                &container.cookie_store_id,
                NewTab {
                    url: options.url.clone(),
                    active: options.active.unwrap_or(true),
                    ..NewTab::default()
                },
            )
            .await?;
        self.persistence.persist().await;
        Ok(tab)
    }

    /// # Errors
    /// - `CoreError::NotTemporary` if the container is not temporary
    /// - `CoreError::Host` if the host rename fails
    pub async fn convert_to_permanent(&self, target: ContainerTarget) -> Result<TemporaryContainer> {
        self.cleanup.cancel(&target.cookie_store_id);
        let container = self
            .lifecycle
            .convert_to_permanent(&target.cookie_store_id, target.name)
            .await?;
        self.reload(target.tab_id).await;
        self.persistence.persist().await;
        Ok(container)
    }

    /// # Errors
    /// - `CoreError::NotTemporary` if the container is not temporary
    /// - `CoreError::Host` if the host rename fails
    pub async fn convert_to_regular(&self, target: ContainerTarget) -> Result<TemporaryContainer> {
        let container = self
            .lifecycle
            .convert_to_regular(&target.cookie_store_id)
            .await?;
        self.reload(target.tab_id).await;
        self.persistence.persist().await;
        Ok(container)
    }

    /// # Errors
    /// - `CoreError::Host` if the host does not know the container
    pub async fn convert_to_temporary(
        self: &Arc<Self>,
        target: ContainerTarget,
    ) -> Result<TemporaryContainer> {
        let mode = self.preferences.load().container.number_mode;
        let container = self
            .lifecycle
            .convert_to_temporary(&target.cookie_store_id, mode)
            .await?;
        self.reload(target.tab_id).await;
        self.persistence.persist().await;
        // no tabs left means the container goes through normal cleanup
        self.cleanup.sweep().await;
        Ok(container)
    }

    /// Whether the id names a registered temporary container
    #[must_use]
    pub fn is_temp_container(&self, id: &ContainerId) -> bool {
        self.lifecycle.is_temporary(id)
    }

    /// Replace the preference snapshot and persist it
    ///
    /// # Errors
    /// - `CoreError::Preferences` if the document does not validate; the
    ///   current snapshot is kept
    pub async fn save_preferences(&self, preferences: Preferences) -> Result<()> {
        preferences.validate()?;
        self.preferences.replace(preferences);
        self.persistence.persist().await;
        tracing::info!("preferences saved");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Configuration the core was built with
    #[must_use]
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Current preference snapshot
    #[must_use]
    pub fn preferences(&self) -> Arc<Preferences> {
        self.preferences.load()
    }

    /// Optional permissions granted so far
    #[must_use]
    pub fn permissions(&self) -> Permissions {
        *self.permissions.read()
    }

    /// Snapshot of the cleanup counters
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        self.statistics.snapshot()
    }

    /// Temporary container registry
    #[must_use]
    pub fn lifecycle(&self) -> &Arc<ContainerLifecycle> {
        &self.lifecycle
    }

    /// Cleanup engine
    #[must_use]
    pub fn cleanup(&self) -> &Arc<CleanupEngine> {
        &self.cleanup
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn navigation_request(
        &self,
        prefs: &Preferences,
        trigger: Trigger,
        target_url: &str,
        origin_url: Option<String>,
        container: &ContainerId,
    ) -> NavigationRequest {
        let mac_assignment = if prefs.isolation.mac.action.is_enabled() {
            match self.hosts.mac.lookup_assignment(target_url).await {
                Ok(assignment) => assignment,
                Err(e) => {
                    tracing::warn!(error = %e, "Multi-Account Containers lookup failed");
                    None
                }
            }
        } else {
            None
        };
        // read after the lookup so the kind is current when the claim is taken
        let kind = self.lifecycle.kind_of(container, &self.config.default_store_id);
        let container_deletes_history = self
            .lifecycle
            .get(container)
            .is_some_and(|c| c.deletes_history);

        NavigationRequest {
            trigger,
            target_url: target_url.to_string(),
            origin_url,
            container: container.clone(),
            kind,
            container_deletes_history,
            mac_assignment,
        }
    }

    /// Reopen a tab's navigation in a new temporary container
    ///
    /// Returns the new tab, or `None` if the container or tab could not be
    /// created; the caller then leaves the navigation where it is.
    async fn isolate_tab(
        self: &Arc<Self>,
        prefs: &Preferences,
        tab: &Tab,
        url: Option<&str>,
        trigger: Trigger,
        deletes_history: bool,
    ) -> Option<Tab> {
        let container = match self
            .lifecycle
            .create_container(&prefs.container, deletes_history)
            .await
        {
            Ok(container) => container,
            Err(e) => {
                tracing::warn!(error = %e, "staying in the current container");
                return None;
            }
        };

        let new_tab = NewTab {
            url: url.map(str::to_string),
            active: tab.active,
            index: Some(tab.index + 1),
            window_id: Some(tab.window_id),
            opener_tab_id: Some(tab.id),
            ..NewTab::default()
        };
        let created = match self.open_in(&container.cookie_store_id, new_tab).await {
            Ok(created) => created,
            Err(e) => {
                tracing::warn!(error = %e, "failed to open tab in new container");
                return None;
            }
        };

        let replaces_old = tab.is_blank()
            || matches!(
                trigger,
                Trigger::TabCreated | Trigger::Navigation { new_tab: true }
            );
        if replaces_old {
            if let Err(e) = self.hosts.tabs.remove(tab.id).await {
                tracing::debug!(tab = %tab.id, error = %e, "old tab already gone");
            }
        }
        self.persistence.persist().await;
        tracing::info!(
            from = %tab.id,
            to = %created.id,
            container = %container.cookie_store_id,
            ?trigger,
            "navigation isolated"
        );
        Some(created)
    }

    /// Open a tab in a freshly created container
    ///
    /// The container is claimed while the tab opens so a concurrent sweep
    /// does not remove it for having no tabs.
    async fn open_in(self: &Arc<Self>, container: &ContainerId, mut tab: NewTab) -> Result<Tab> {
        tab.cookie_store_id = Some(container.clone());
        let has_url = tab.url.is_some();
        let claim = self.lifecycle.reuse_clean_container(container);
        let created = self.hosts.tabs.create(tab).await;
        drop(claim);

        match created {
            Ok(created) => {
                if has_url {
                    self.tabs.lock().reopened.insert(created.id);
                }
                Ok(created)
            }
            Err(e) => {
                self.cleanup.sweep().await;
                Err(e.into())
            }
        }
    }

    async fn reload(&self, tab_id: Option<TabId>) {
        let Some(tab_id) = tab_id else {
            return;
        };
        if let Err(e) = self.hosts.tabs.reload(tab_id).await {
            tracing::debug!(tab = %tab_id, error = %e, "reload failed");
        }
    }
}

fn is_web_url(raw: &str) -> bool {
    url::Url::parse(raw).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::MemoryBrowser;
    use crate::types::ContainerKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tmpc_preferences::{
        ClickRule, ContainerChoice, ContainerColor, DeletesHistoryMode, DomainPattern, IsolationAction,
        IsolationDomain, Toggle,
    };

    async fn core_with(
        prefs: Preferences,
        permissions: Permissions,
    ) -> (Arc<MemoryBrowser>, Arc<TemporaryContainers>) {
        let browser = Arc::new(MemoryBrowser::new());
        let core = TemporaryContainers::initialize(
            CoreConfig::new(),
            Hosts::from_shared(browser.clone()),
            permissions,
        )
        .await
        .unwrap();
        core.save_preferences(prefs).await.unwrap();
        (browser, core)
    }

    fn main_frame(tab: &Tab, url: &str) -> RequestDetails {
        RequestDetails {
            request_id: "1".to_string(),
            tab_id: tab.id,
            url: url.to_string(),
            resource_type: ResourceType::MainFrame,
            cookie_store_id: tab.cookie_store_id.clone(),
            origin_url: None,
        }
    }

    fn isolate_navigation() -> Preferences {
        let mut prefs = Preferences::default();
        prefs.isolation.global.navigation = ClickRule::new(IsolationAction::Always);
        prefs
    }

    #[tokio::test]
    async fn isolating_navigation_opens_a_new_tab() {
        let (browser, core) = core_with(isolate_navigation(), Permissions::default()).await;
        let default_store = browser.default_store().clone();
        let tab = browser.open_tab(&default_store, "https://start.test");

        let outcome = core
            .on_before_request(&main_frame(&tab, "https://next.test"))
            .await;
        assert_eq!(outcome, RequestOutcome::Cancel);
        assert_eq!(core.lifecycle().len(), 1);

        let id = core.lifecycle().ids().remove(0);
        let opened = browser.tabs_in(&id);
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].url, "https://next.test");
        // the old tab showed a page, so it stays
        assert!(browser.tab(tab.id).is_some());

        // the reopened request goes through and uses up the container
        let outcome = core
            .on_before_request(&main_frame(&opened[0], "https://next.test"))
            .await;
        assert_eq!(outcome, RequestOutcome::Continue);
        assert_eq!(
            core.lifecycle().kind_of(&id, &default_store),
            ContainerKind::TemporaryUsed
        );
    }

    #[tokio::test]
    async fn clean_container_is_reused() {
        let (browser, core) = core_with(isolate_navigation(), Permissions::default()).await;
        let tab = core
            .create_tab_in_temp_container(CreateTabOptions::default())
            .await
            .unwrap();
        let tab = browser.tab(tab.id).unwrap();

        let outcome = core
            .on_before_request(&main_frame(&tab, "https://next.test"))
            .await;
        assert_eq!(outcome, RequestOutcome::Continue);
        assert_eq!(core.lifecycle().len(), 1);
        assert!(!core.lifecycle().get(&tab.cookie_store_id).unwrap().clean);
    }

    #[tokio::test]
    async fn ignored_requests_pass() {
        let mut prefs = isolate_navigation();
        prefs.ignore_requests = vec!["login.test".to_string()];
        let (browser, core) = core_with(prefs, Permissions::default()).await;
        let tab = browser.open_tab(&browser.default_store().clone(), "https://start.test");

        for details in [
            main_frame(&tab, "https://login.test/"),
            main_frame(&tab, "moz-extension://abc/options.html"),
            RequestDetails {
                resource_type: ResourceType::SubFrame,
                ..main_frame(&tab, "https://next.test")
            },
        ] {
            assert_eq!(core.on_before_request(&details).await, RequestOutcome::Continue);
        }
        assert!(core.lifecycle().is_empty());
    }

    #[tokio::test]
    async fn middle_click_opens_in_background_and_closes_placeholder() {
        let mut prefs = Preferences::default();
        *prefs.isolation.global.rule_mut(ClickType::Middle) = ClickRule::new(IsolationAction::Always);
        let (browser, core) = core_with(prefs, Permissions::default()).await;
        let default_store = browser.default_store().clone();
        let page = browser.open_tab(&default_store, "https://start.test");

        let link = LinkClick {
            href: "https://next.test/".to_string(),
            event: crate::click::ClickEvent {
                button: 1,
                ..Default::default()
            },
        };
        core.on_link_clicked(&link, &page);
        let placeholder = browser.open_tab(&default_store, "about:blank");

        let outcome = core
            .on_before_request(&main_frame(&placeholder, "https://next.test/"))
            .await;
        assert_eq!(outcome, RequestOutcome::Cancel);
        assert!(browser.tab(placeholder.id).is_none());
        assert!(browser.tab(page.id).is_some());
    }

    #[tokio::test]
    async fn automatic_mode_on_created_replaces_new_tab() {
        let mut prefs = Preferences::default();
        prefs.automatic_mode.active = true;
        let (browser, core) = core_with(prefs, Permissions::default()).await;
        let blank = browser.open_tab(&browser.default_store().clone(), "about:newtab");

        core.on_tab_created(&blank).await;
        assert!(browser.tab(blank.id).is_none());
        assert_eq!(core.lifecycle().len(), 1);
    }

    #[tokio::test]
    async fn domain_rule_can_pick_deletes_history() {
        let mut prefs = Preferences::default();
        let mut domain = IsolationDomain::new(DomainPattern::new("example.com").unwrap());
        domain.always.action = Toggle::Enabled;
        domain.navigation = ClickRule::new(IsolationAction::Global)
            .with_container(ContainerChoice::DeletesHistory);
        prefs.isolation.domain.push(domain);
        prefs.deletes_history.container_always_per_domain = DeletesHistoryMode::Never;

        let (browser, core) = core_with(
            prefs,
            Permissions {
                history: true,
                ..Permissions::default()
            },
        )
        .await;
        let tab = browser.open_tab(&browser.default_store().clone(), "https://start.test");

        core.on_before_request(&main_frame(&tab, "https://example.com/"))
            .await;
        let container = core.lifecycle().containers().into_values().next().unwrap();
        assert!(container.deletes_history);
    }

    #[tokio::test]
    async fn message_surface() {
        let (browser, core) = core_with(Preferences::default(), Permissions::default()).await;

        let response = core
            .handle_message(
                &json!({"method": "createTabInTempContainer", "payload": {"url": "https://a.test"}}),
                None,
            )
            .await
            .unwrap();
        let Response::Tab(tab) = response else {
            panic!("expected a tab");
        };
        assert_eq!(
            core.handle_message(
                &json!({"method": "isTempContainer", "cookieStoreId": tab.cookie_store_id}),
                None
            )
            .await
            .unwrap(),
            Response::Bool(true)
        );

        let response = core
            .handle_message(
                &json!({
                    "method": "convertTempContainerToPermanent",
                    "payload": {"cookieStoreId": tab.cookie_store_id, "tabId": tab.id, "name": "Kept"}
                }),
                None,
            )
            .await
            .unwrap();
        assert!(matches!(response, Response::Container(_)));
        assert!(!core.is_temp_container(&tab.cookie_store_id));
        assert_eq!(browser.container(&tab.cookie_store_id).unwrap().name, "Kept");
        assert_eq!(browser.reloaded(), vec![tab.id]);

        assert_eq!(
            core.handle_message(&json!({"method": "ping"}), None).await.unwrap(),
            Response::PONG
        );
        let err = core
            .handle_message(&json!({"method": "linkClicked", "payload": {"href": "https://a.test"}}), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "malformed");
    }

    #[tokio::test]
    async fn external_surface_uses_automatic_deletes_history() {
        let mut prefs = Preferences::default();
        prefs.deletes_history.automatic_mode = DeletesHistoryMode::Automatic;
        let (_, core) = core_with(
            prefs,
            Permissions {
                history: true,
                ..Permissions::default()
            },
        )
        .await;

        let response = core
            .handle_external_message(&json!({
                "method": "createTabInTempContainer",
                "payload": {"deletesHistory": false}
            }))
            .await
            .unwrap();
        let Response::Tab(tab) = response else {
            panic!("expected a tab");
        };
        assert!(core.lifecycle().get(&tab.cookie_store_id).unwrap().deletes_history);

        let err = core
            .handle_external_message(&json!({"method": "cleanupNow"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unknownOperation");
    }

    #[tokio::test]
    async fn invalid_preferences_are_rejected() {
        let (_, core) = core_with(Preferences::default(), Permissions::default()).await;
        let mut prefs = Preferences::default();
        prefs.container.color_random = true;
        prefs.container.color_random_excluded = ContainerColor::ALL.to_vec();

        assert!(core.save_preferences(prefs).await.is_err());
        assert_eq!(*core.preferences(), Preferences::default());
    }

    #[tokio::test]
    async fn state_survives_restart() {
        let browser = Arc::new(MemoryBrowser::new());
        let hosts = Hosts::from_shared(browser.clone());
        let core = TemporaryContainers::initialize(CoreConfig::new(), hosts.clone(), Permissions::default())
            .await
            .unwrap();
        let tab = core
            .create_tab_in_temp_container(CreateTabOptions::default())
            .await
            .unwrap();

        let restarted = TemporaryContainers::initialize(CoreConfig::new(), hosts, Permissions::default())
            .await
            .unwrap();
        assert!(restarted.is_temp_container(&tab.cookie_store_id));
    }
}
