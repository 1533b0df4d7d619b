//! In-memory browser
//!
//! Implements every host trait over plain collections. Used by the test
//! suites and the CLI simulator; failure switches let callers exercise the
//! error paths.

use super::{ContainerHost, CookieHost, HistoryHost, MacHost, StorageHost, TabHost};
use crate::error::HostError;
use crate::storage::StorageLocal;
use crate::types::{
    ContainerAttributes, ContainerId, Cookie, CookieDetails, CookieQuery, HostContainer,
    MacAssignment, NewTab, Tab, TabId, TabQuery,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Default)]
struct BrowserState {
    containers: BTreeMap<ContainerId, HostContainer>,
    next_container: u64,
    tabs: BTreeMap<TabId, Tab>,
    next_tab: i64,
    cookies: Vec<Cookie>,
    history: BTreeSet<String>,
    deleted_urls: Vec<String>,
    mac: HashMap<String, MacAssignment>,
    stored: Option<StorageLocal>,
    persist_count: usize,
    reloaded: Vec<TabId>,
    fail_create: bool,
    fail_remove: bool,
    refuse_cookies: bool,
}

impl BrowserState {
    fn insert_tab(&mut self, store: ContainerId, url: String, window_id: i64, active: bool) -> Tab {
        self.next_tab += 1;
        let index = self.tabs.values().filter(|t| t.window_id == window_id).count();
        if !url.starts_with("about:") {
            self.history.insert(url.clone());
        }
        let tab = Tab {
            id: TabId(self.next_tab),
            window_id,
            index: u32::try_from(index).unwrap_or(u32::MAX),
            url,
            cookie_store_id: store,
            active,
            incognito: false,
            opener_tab_id: None,
        };
        self.tabs.insert(tab.id, tab.clone());
        tab
    }
}

/// Browser double holding all state in memory
#[derive(Debug)]
pub struct MemoryBrowser {
    default_store: ContainerId,
    state: Mutex<BrowserState>,
}

impl Default for MemoryBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBrowser {
    /// Empty browser whose default store is `firefox-default`
    #[must_use]
    pub fn new() -> Self {
        Self {
            default_store: ContainerId::new("firefox-default"),
            state: Mutex::new(BrowserState::default()),
        }
    }

    /// Cookie store id of the default container
    #[must_use]
    pub fn default_store(&self) -> &ContainerId {
        &self.default_store
    }

    /// Open a tab as the user would
    pub fn open_tab(&self, store: &ContainerId, url: &str) -> Tab {
        self.state
            .lock()
            .insert_tab(store.clone(), url.to_string(), 1, true)
    }

    /// Navigate an existing tab; returns the updated tab
    pub fn navigate(&self, tab_id: TabId, url: &str) -> Option<Tab> {
        let mut state = self.state.lock();
        state.history.insert(url.to_string());
        let tab = state.tabs.get_mut(&tab_id)?;
        tab.url = url.to_string();
        Some(tab.clone())
    }

    /// Close a tab as the user would
    pub fn close_tab(&self, tab_id: TabId) -> Option<Tab> {
        self.state.lock().tabs.remove(&tab_id)
    }

    /// Tab by id
    #[must_use]
    pub fn tab(&self, tab_id: TabId) -> Option<Tab> {
        self.state.lock().tabs.get(&tab_id).cloned()
    }

    /// Every open tab
    #[must_use]
    pub fn tabs(&self) -> Vec<Tab> {
        self.state.lock().tabs.values().cloned().collect()
    }

    /// Tabs open in one container
    #[must_use]
    pub fn tabs_in(&self, store: &ContainerId) -> Vec<Tab> {
        self.state
            .lock()
            .tabs
            .values()
            .filter(|t| &t.cookie_store_id == store)
            .cloned()
            .collect()
    }

    /// Create a container the core does not own
    pub fn add_permanent_container(&self, name: &str) -> ContainerId {
        let mut state = self.state.lock();
        state.next_container += 1;
        let id = ContainerId::new(format!("firefox-container-{}", state.next_container));
        state.containers.insert(
            id.clone(),
            HostContainer {
                cookie_store_id: id.clone(),
                name: name.to_string(),
                color: tmpc_preferences::ContainerColor::Blue,
                icon: tmpc_preferences::ContainerIcon::Briefcase,
            },
        );
        id
    }

    /// Container by id
    #[must_use]
    pub fn container(&self, id: &ContainerId) -> Option<HostContainer> {
        self.state.lock().containers.get(id).cloned()
    }

    /// Number of containers, the default one included
    #[must_use]
    pub fn container_count(&self) -> usize {
        self.state.lock().containers.len()
    }

    /// Store a cookie directly, bypassing `CookieHost::set`
    pub fn add_cookie(&self, cookie: Cookie) {
        self.state.lock().cookies.push(cookie);
    }

    /// Cookies in one store
    #[must_use]
    pub fn cookies_in(&self, store: &ContainerId) -> Vec<Cookie> {
        self.state
            .lock()
            .cookies
            .iter()
            .filter(|c| &c.store_id == store)
            .cloned()
            .collect()
    }

    /// URLs currently in history
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.state.lock().history.iter().cloned().collect()
    }

    /// URLs deleted through `HistoryHost`, in order
    #[must_use]
    pub fn deleted_urls(&self) -> Vec<String> {
        self.state.lock().deleted_urls.clone()
    }

    /// Assign a hostname to a Multi-Account container
    pub fn assign(&self, host: &str, assignment: MacAssignment) {
        self.state.lock().mac.insert(host.to_string(), assignment);
    }

    /// Snapshot the next `load` returns
    pub fn seed_storage(&self, snapshot: StorageLocal) {
        self.state.lock().stored = Some(snapshot);
    }

    /// Last persisted snapshot
    #[must_use]
    pub fn stored(&self) -> Option<StorageLocal> {
        self.state.lock().stored.clone()
    }

    /// Number of persists so far
    #[must_use]
    pub fn persist_count(&self) -> usize {
        self.state.lock().persist_count
    }

    /// Tabs reloaded through `TabHost::reload`, in order
    #[must_use]
    pub fn reloaded(&self) -> Vec<TabId> {
        self.state.lock().reloaded.clone()
    }

    /// Make container creation fail
    pub fn fail_container_creation(&self, fail: bool) {
        self.state.lock().fail_create = fail;
    }

    /// Make container removal fail
    pub fn fail_container_removal(&self, fail: bool) {
        self.state.lock().fail_remove = fail;
    }

    /// Accept cookie writes without storing them
    pub fn refuse_cookies(&self, refuse: bool) {
        self.state.lock().refuse_cookies = refuse;
    }
}

fn hostname(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .unwrap_or_default()
}

fn domain_matches(cookie_domain: &str, host: &str) -> bool {
    let domain = cookie_domain.trim_start_matches('.');
    host == domain || host.ends_with(&format!(".{domain}"))
}

#[async_trait::async_trait]
impl ContainerHost for MemoryBrowser {
    async fn create(&self, attributes: ContainerAttributes) -> Result<ContainerId, HostError> {
        let mut state = self.state.lock();
        if state.fail_create {
            return Err(HostError::Rejected("container creation disabled".to_string()));
        }
        state.next_container += 1;
        let id = ContainerId::new(format!("firefox-container-{}", state.next_container));
        state.containers.insert(
            id.clone(),
            HostContainer {
                cookie_store_id: id.clone(),
                name: attributes.name,
                color: attributes.color,
                icon: attributes.icon,
            },
        );
        Ok(id)
    }

    async fn update(&self, id: &ContainerId, attributes: ContainerAttributes) -> Result<(), HostError> {
        let mut state = self.state.lock();
        let container = state
            .containers
            .get_mut(id)
            .ok_or_else(|| HostError::ContainerNotFound(id.clone()))?;
        container.name = attributes.name;
        container.color = attributes.color;
        container.icon = attributes.icon;
        Ok(())
    }

    async fn remove(&self, id: &ContainerId) -> Result<(), HostError> {
        let mut state = self.state.lock();
        if state.fail_remove {
            return Err(HostError::Unavailable("container removal disabled".to_string()));
        }
        state
            .containers
            .remove(id)
            .ok_or_else(|| HostError::ContainerNotFound(id.clone()))?;
        state.cookies.retain(|c| &c.store_id != id);
        state.tabs.retain(|_, t| &t.cookie_store_id != id);
        Ok(())
    }

    async fn get(&self, id: &ContainerId) -> Result<HostContainer, HostError> {
        self.container(id)
            .ok_or_else(|| HostError::ContainerNotFound(id.clone()))
    }
}

#[async_trait::async_trait]
impl TabHost for MemoryBrowser {
    async fn query(&self, query: TabQuery) -> Result<Vec<Tab>, HostError> {
        Ok(self
            .state
            .lock()
            .tabs
            .values()
            .filter(|t| query.cookie_store_id.as_ref().map_or(true, |s| &t.cookie_store_id == s))
            .filter(|t| query.window_id.map_or(true, |w| t.window_id == w))
            .cloned()
            .collect())
    }

    async fn get(&self, id: TabId) -> Result<Tab, HostError> {
        self.tab(id).ok_or(HostError::TabNotFound(id))
    }

    async fn create(&self, tab: NewTab) -> Result<Tab, HostError> {
        let mut state = self.state.lock();
        let store = tab
            .cookie_store_id
            .unwrap_or_else(|| self.default_store.clone());
        if store != self.default_store && !state.containers.contains_key(&store) {
            return Err(HostError::ContainerNotFound(store));
        }
        let url = tab.url.unwrap_or_else(|| "about:newtab".to_string());
        let mut created = state.insert_tab(store, url, tab.window_id.unwrap_or(1), tab.active);
        if let Some(index) = tab.index {
            created.index = index;
        }
        created.opener_tab_id = tab.opener_tab_id;
        state.tabs.insert(created.id, created.clone());
        Ok(created)
    }

    async fn remove(&self, id: TabId) -> Result<(), HostError> {
        self.state
            .lock()
            .tabs
            .remove(&id)
            .map(|_| ())
            .ok_or(HostError::TabNotFound(id))
    }

    async fn reload(&self, id: TabId) -> Result<(), HostError> {
        let mut state = self.state.lock();
        if !state.tabs.contains_key(&id) {
            return Err(HostError::TabNotFound(id));
        }
        state.reloaded.push(id);
        Ok(())
    }
}

#[async_trait::async_trait]
impl CookieHost for MemoryBrowser {
    async fn get(&self, query: CookieQuery) -> Result<Option<Cookie>, HostError> {
        let host = hostname(&query.url);
        Ok(self
            .state
            .lock()
            .cookies
            .iter()
            .find(|c| {
                c.store_id == query.store_id
                    && c.name == query.name
                    && domain_matches(&c.domain, &host)
                    && query
                        .first_party_domain
                        .as_ref()
                        .map_or(true, |fpd| &c.first_party_domain == fpd)
            })
            .cloned())
    }

    async fn get_all(&self, store_id: &ContainerId) -> Result<Vec<Cookie>, HostError> {
        Ok(self.cookies_in(store_id))
    }

    async fn set(&self, details: CookieDetails) -> Result<(), HostError> {
        let mut state = self.state.lock();
        if state.refuse_cookies {
            return Ok(());
        }
        let cookie = Cookie {
            name: details.name.unwrap_or_default(),
            value: details.value.unwrap_or_default(),
            domain: details.domain.unwrap_or_else(|| hostname(&details.url)),
            path: details.path.unwrap_or_else(|| "/".to_string()),
            store_id: details
                .store_id
                .unwrap_or_else(|| self.default_store.clone()),
            first_party_domain: details.first_party_domain.unwrap_or_default(),
        };
        state.cookies.retain(|c| {
            !(c.store_id == cookie.store_id
                && c.name == cookie.name
                && c.domain == cookie.domain
                && c.path == cookie.path)
        });
        state.cookies.push(cookie);
        Ok(())
    }

    async fn remove(&self, cookie: &Cookie) -> Result<(), HostError> {
        let mut state = self.state.lock();
        let before = state.cookies.len();
        state.cookies.retain(|c| c != cookie);
        if state.cookies.len() == before {
            return Err(HostError::Rejected(format!("no cookie {}", cookie.name)));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl HistoryHost for MemoryBrowser {
    async fn delete_url(&self, url: &str) -> Result<(), HostError> {
        let mut state = self.state.lock();
        state.history.remove(url);
        state.deleted_urls.push(url.to_string());
        Ok(())
    }
}

#[async_trait::async_trait]
impl MacHost for MemoryBrowser {
    async fn lookup_assignment(&self, url: &str) -> Result<Option<MacAssignment>, HostError> {
        Ok(self.state.lock().mac.get(&hostname(url)).cloned())
    }
}

#[async_trait::async_trait]
impl StorageHost for MemoryBrowser {
    async fn load(&self) -> Result<Option<StorageLocal>, HostError> {
        Ok(self.stored())
    }

    async fn persist(&self, snapshot: &StorageLocal) -> Result<(), HostError> {
        // a real storage write always suspends
        tokio::task::yield_now().await;
        let mut state = self.state.lock();
        state.stored = Some(snapshot.clone());
        state.persist_count += 1;
        Ok(())
    }
}
