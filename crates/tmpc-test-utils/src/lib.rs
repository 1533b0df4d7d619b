//! Testing utilities for the tmpc workspace
//!
//! Preference builders, request fixtures, and a core wired to an in-memory
//! browser.

#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]

use std::sync::Arc;
use tmpc_core::host::memory::MemoryBrowser;
use tmpc_core::{
    ClickEvent, ContainerId, CoreConfig, Hosts, LinkClick, Permissions, RequestDetails,
    ResourceType, Tab, TemporaryContainers,
};
use tmpc_preferences::{
    ClickRule, ClickType, ContainerChoice, DomainPattern, IsolationAction, IsolationDomain,
    Preferences, Toggle,
};

/// A core and the browser it runs against
pub struct TestCore {
    pub browser: Arc<MemoryBrowser>,
    pub core: Arc<TemporaryContainers>,
}

impl TestCore {
    /// Open a page in the default container
    pub fn open_default(&self, url: &str) -> Tab {
        self.browser.open_tab(self.browser.default_store(), url)
    }

    #[must_use]
    pub fn default_store(&self) -> ContainerId {
        self.browser.default_store().clone()
    }

    /// Close a tab in the browser and tell the core about it
    pub async fn close_tab(&self, tab: &Tab) {
        self.browser.close_tab(tab.id);
        self.core.on_tab_removed(tab.id).await;
    }
}

/// Core with the given preferences over a fresh in-memory browser
pub async fn setup_core(prefs: Preferences, permissions: Permissions) -> TestCore {
    let browser = Arc::new(MemoryBrowser::new());
    let core = TemporaryContainers::initialize(
        CoreConfig::new(),
        Hosts::from_shared(browser.clone()),
        permissions,
    )
    .await
    .unwrap();
    core.save_preferences(prefs).await.unwrap();
    TestCore { browser, core }
}

#[must_use]
pub fn with_history() -> Permissions {
    Permissions {
        history: true,
        ..Permissions::default()
    }
}

/// Global rule for one click type
#[must_use]
pub fn global_rule(mut prefs: Preferences, click: ClickType, action: IsolationAction) -> Preferences {
    *prefs.isolation.global.rule_mut(click) = ClickRule::new(action);
    prefs
}

/// Domain rule with "always open in" switched on
#[must_use]
pub fn always_open_in(pattern: &str, container: ContainerChoice) -> IsolationDomain {
    let mut domain = IsolationDomain::new(DomainPattern::new(pattern).unwrap());
    domain.always.action = Toggle::Enabled;
    for click in ClickType::ALL {
        domain.rule_mut(click).container = container;
    }
    domain
}

/// Main-frame request from a tab
#[must_use]
pub fn main_frame(tab: &Tab, url: &str) -> RequestDetails {
    RequestDetails {
        request_id: format!("{}-{url}", tab.id),
        tab_id: tab.id,
        url: url.to_string(),
        resource_type: ResourceType::MainFrame,
        cookie_store_id: tab.cookie_store_id.clone(),
        origin_url: None,
    }
}

/// Link click as the content script reports it
#[must_use]
pub fn link_click(href: &str, button: u8, ctrl_key: bool) -> LinkClick {
    LinkClick {
        href: href.to_string(),
        event: ClickEvent {
            button,
            ctrl_key,
            meta_key: false,
        },
    }
}
