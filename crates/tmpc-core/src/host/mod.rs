//! Host collaborators
//!
//! The core never talks to a browser directly. Everything it needs (tabs,
//! containers, cookies, history, persistence) goes through these traits, so
//! the engines run unchanged against a real browser bridge or the
//! [`memory`] host used by tests and the CLI.
//!
//! Every call may suspend. Implementations must not assume the core holds
//! any lock while awaiting them.

pub mod memory;

use crate::error::HostError;
use crate::storage::StorageLocal;
use crate::types::{
    ContainerAttributes, ContainerId, Cookie, CookieDetails, CookieQuery, HostContainer,
    MacAssignment, NewTab, Tab, TabId, TabQuery,
};
use std::sync::Arc;

/// Contextual identity management
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ContainerHost: Send + Sync {
    /// Create a container, returning its cookie store id
    async fn create(&self, attributes: ContainerAttributes) -> Result<ContainerId, HostError>;

    /// Rename or recolor an existing container
    async fn update(&self, id: &ContainerId, attributes: ContainerAttributes) -> Result<(), HostError>;

    /// Delete a container and everything stored in it
    async fn remove(&self, id: &ContainerId) -> Result<(), HostError>;

    /// Look up a container
    async fn get(&self, id: &ContainerId) -> Result<HostContainer, HostError>;
}

/// Tab management
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TabHost: Send + Sync {
    /// Tabs matching the filter
    async fn query(&self, query: TabQuery) -> Result<Vec<Tab>, HostError>;

    /// One tab by id
    async fn get(&self, id: TabId) -> Result<Tab, HostError>;

    /// Open a tab
    async fn create(&self, tab: NewTab) -> Result<Tab, HostError>;

    /// Close a tab
    async fn remove(&self, id: TabId) -> Result<(), HostError>;

    /// Reload a tab in place
    async fn reload(&self, id: TabId) -> Result<(), HostError>;
}

/// Cookie jar access
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CookieHost: Send + Sync {
    /// Read one cookie back; `None` if the jar does not hold it
    async fn get(&self, query: CookieQuery) -> Result<Option<Cookie>, HostError>;

    /// Every cookie in a store
    async fn get_all(&self, store_id: &ContainerId) -> Result<Vec<Cookie>, HostError>;

    /// Write a cookie
    async fn set(&self, details: CookieDetails) -> Result<(), HostError>;

    /// Delete a cookie
    async fn remove(&self, cookie: &Cookie) -> Result<(), HostError>;
}

/// Browsing history
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait HistoryHost: Send + Sync {
    /// Drop every visit to `url`
    async fn delete_url(&self, url: &str) -> Result<(), HostError>;
}

/// Multi-Account Containers bridge
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MacHost: Send + Sync {
    /// Assignment covering the URL, if any
    async fn lookup_assignment(&self, url: &str) -> Result<Option<MacAssignment>, HostError>;
}

/// Local storage for the persisted snapshot
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait StorageHost: Send + Sync {
    /// Last persisted snapshot, `None` on first run
    async fn load(&self) -> Result<Option<StorageLocal>, HostError>;

    /// Replace the stored snapshot
    async fn persist(&self, snapshot: &StorageLocal) -> Result<(), HostError>;
}

/// The full set of collaborators a core instance runs against
#[derive(Clone)]
pub struct Hosts {
    /// Container registry
    pub containers: Arc<dyn ContainerHost>,
    /// Tabs
    pub tabs: Arc<dyn TabHost>,
    /// Cookie jar
    pub cookies: Arc<dyn CookieHost>,
    /// Browsing history
    pub history: Arc<dyn HistoryHost>,
    /// Multi-Account Containers
    pub mac: Arc<dyn MacHost>,
    /// Local storage
    pub storage: Arc<dyn StorageHost>,
}

impl Hosts {
    /// Use one object for every collaborator
    pub fn from_shared<H>(host: Arc<H>) -> Self
    where
        H: ContainerHost + TabHost + CookieHost + HistoryHost + MacHost + StorageHost + 'static,
    {
        Self {
            containers: host.clone(),
            tabs: host.clone(),
            cookies: host.clone(),
            history: host.clone(),
            mac: host.clone(),
            storage: host,
        }
    }
}

impl std::fmt::Debug for Hosts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hosts").finish_non_exhaustive()
    }
}
