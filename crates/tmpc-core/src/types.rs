//! Core types shared between the engines and host collaborators

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use tmpc_preferences::{ContainerColor, ContainerIcon};

/// Host-assigned cookie store identifier of a container
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    /// Wrap a host identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as a string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ContainerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ContainerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ContainerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Host tab identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub i64);

impl TabId {
    /// Whether the id refers to a real tab (requests outside tabs carry -1)
    #[inline]
    #[must_use]
    pub fn is_tab(&self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of a host tab
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    /// Host tab id
    pub id: TabId,
    /// Window the tab lives in
    pub window_id: i64,
    /// Position within the window
    pub index: u32,
    /// Current URL
    pub url: String,
    /// Container the tab belongs to
    pub cookie_store_id: ContainerId,
    /// Whether the tab is focused in its window
    #[serde(default)]
    pub active: bool,
    /// Private browsing tab
    #[serde(default)]
    pub incognito: bool,
    /// Tab that opened this one, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opener_tab_id: Option<TabId>,
}

impl Tab {
    /// Whether the tab shows a blank or new-tab page
    #[must_use]
    pub fn is_blank(&self) -> bool {
        matches!(
            self.url.as_str(),
            "" | "about:blank" | "about:newtab" | "about:home"
        )
    }
}

/// How the core classifies a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContainerKind {
    /// The browser's default cookie store
    Default,
    /// Temporary container that has not navigated anywhere yet
    TemporaryClean,
    /// Temporary container that has seen at least one navigation
    TemporaryUsed,
    /// Any container the core does not own
    Permanent,
}

impl ContainerKind {
    /// Whether the kind is one of the temporary kinds
    #[inline]
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::TemporaryClean | Self::TemporaryUsed)
    }
}

/// Attributes sent to the host when creating or updating a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerAttributes {
    /// Display name
    pub name: String,
    /// Color shown next to the tab title
    pub color: ContainerColor,
    /// Icon shown next to the tab title
    pub icon: ContainerIcon,
}

/// A container as the host reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostContainer {
    /// Cookie store id of the container
    pub cookie_store_id: ContainerId,
    /// Display name
    pub name: String,
    /// Container color
    pub color: ContainerColor,
    /// Container icon
    pub icon: ContainerIcon,
}

/// Tab query filter; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabQuery {
    /// Only tabs in this container
    pub cookie_store_id: Option<ContainerId>,
    /// Only tabs in this window
    pub window_id: Option<i64>,
}

impl TabQuery {
    /// Tabs living in one container
    #[must_use]
    pub fn in_container(id: &ContainerId) -> Self {
        Self {
            cookie_store_id: Some(id.clone()),
            ..Self::default()
        }
    }
}

/// Request to open a tab
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTab {
    /// Container to open the tab in; the default store when unset
    pub cookie_store_id: Option<ContainerId>,
    /// Initial URL; a blank page when unset
    pub url: Option<String>,
    /// Focus the new tab
    pub active: bool,
    /// Position within the window
    pub index: Option<u32>,
    /// Window to open the tab in
    pub window_id: Option<i64>,
    /// Tab recorded as the opener
    pub opener_tab_id: Option<TabId>,
}

/// Cookie `SameSite` policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameSite {
    /// Sent with cross-site requests
    NoRestriction,
    /// Sent with top-level cross-site navigations
    Lax,
    /// Sent with same-site requests only
    Strict,
}

/// A cookie stored by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Domain the cookie is scoped to
    pub domain: String,
    /// Path the cookie is scoped to
    pub path: String,
    /// Cookie store the cookie lives in
    pub store_id: ContainerId,
    /// First-party isolation key; empty when isolation is off
    #[serde(default)]
    pub first_party_domain: String,
}

/// Cookie write request; `None` fields are left to the host's defaults
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieDetails {
    /// URL the cookie is associated with
    pub url: String,
    /// Cookie store to write into
    pub store_id: Option<ContainerId>,
    /// Cookie name
    pub name: Option<String>,
    /// Cookie value
    pub value: Option<String>,
    /// Domain attribute
    pub domain: Option<String>,
    /// Path attribute
    pub path: Option<String>,
    /// `Secure` attribute
    pub secure: Option<bool>,
    /// `HttpOnly` attribute
    pub http_only: Option<bool>,
    /// `SameSite` attribute
    pub same_site: Option<SameSite>,
    /// Seconds since the epoch
    pub expiration_date: Option<f64>,
    /// First-party isolation key
    pub first_party_domain: Option<String>,
}

/// Cookie lookup by name and URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieQuery {
    /// URL the cookie must be sent to
    pub url: String,
    /// Cookie name
    pub name: String,
    /// Cookie store to look in
    pub store_id: ContainerId,
    /// First-party isolation key
    pub first_party_domain: Option<String>,
}

/// Multi-Account Containers assignment for a URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacAssignment {
    /// Container the URL is assigned to
    pub container_id: ContainerId,
    /// Open without confirmation
    #[serde(default)]
    pub never_ask: bool,
}

/// Optional host permissions the core adapts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Permissions {
    /// Browsing history may be deleted
    pub history: bool,
    /// Notifications may be shown
    pub notifications: bool,
}

/// Resource type of an intercepted request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Top-level document
    MainFrame,
    /// Embedded frame
    SubFrame,
    /// Anything else
    Other,
}

/// Top-level request about to be sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDetails {
    /// Host request id
    pub request_id: String,
    /// Tab issuing the request
    pub tab_id: TabId,
    /// Requested URL
    pub url: String,
    /// Kind of resource requested
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    /// Container of the issuing tab
    pub cookie_store_id: ContainerId,
    /// URL of the document that triggered the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_url: Option<String>,
}

/// What the request interceptor tells the host to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestOutcome {
    /// Let the request proceed
    Continue,
    /// Drop it; the navigation was reissued in another container
    Cancel,
}

/// Request header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpHeader {
    /// Header name
    pub name: String,
    /// Header value
    pub value: String,
}

impl HttpHeader {
    /// Header from a name and a value
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Request whose headers are about to be sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendHeadersDetails {
    /// Tab issuing the request
    pub tab_id: TabId,
    /// Requested URL
    pub url: String,
    /// Container of the issuing tab
    pub cookie_store_id: ContainerId,
    /// Headers about to be sent
    pub request_headers: Vec<HttpHeader>,
}
