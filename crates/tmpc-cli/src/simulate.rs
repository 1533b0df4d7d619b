//! Scripted scenarios over the in-memory browser
//!
//! A scenario is a JSON document with optional `preferences` and
//! `permissions` and a list of `steps`. Each step plays a user action
//! against the browser and forwards the resulting events to the core the
//! way the extension's event listeners would. Waits run on virtual time.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tmpc_core::host::memory::MemoryBrowser;
use tmpc_core::host::TabHost;
use tmpc_core::types::NewTab;
use tmpc_core::{
    ClickEvent, ContainerId, CoreConfig, Hosts, LinkClick, Permissions, RequestDetails,
    RequestOutcome, ResourceType, Statistics, TabChange, TabId, TemporaryContainer,
    TemporaryContainers,
};
use tmpc_preferences::{ClickType, Preferences};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Scenario {
    #[serde(default)]
    preferences: Preferences,
    #[serde(default)]
    permissions: Permissions,
    steps: Vec<Step>,
}

impl Scenario {
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let input = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        serde_json::from_str(&input).with_context(|| format!("parsing scenario {}", path.display()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "step", rename_all = "camelCase")]
enum Step {
    Startup,
    /// User opens a tab, in the default container unless one is given
    Open {
        url: String,
        #[serde(default)]
        container: Option<ContainerId>,
    },
    /// User types a URL into a tab
    Navigate { tab: TabId, url: String },
    #[serde(rename_all = "camelCase")]
    Click {
        tab: TabId,
        href: String,
        #[serde(default)]
        button: u8,
        #[serde(default)]
        ctrl_key: bool,
        #[serde(default)]
        meta_key: bool,
    },
    Close { tab: TabId },
    Wait { ms: u64 },
    /// Runtime message from the extension's own pages
    Message { message: Value },
}

/// What a scenario left behind
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Report {
    pub(crate) transcript: Vec<Value>,
    pub(crate) containers: Vec<TemporaryContainer>,
    pub(crate) statistics: Statistics,
    pub(crate) deleted_urls: Vec<String>,
}

struct Simulation {
    browser: Arc<MemoryBrowser>,
    core: Arc<TemporaryContainers>,
    transcript: Vec<Value>,
    requests: u64,
}

/// Play a scenario to the end
pub(crate) async fn run(scenario: Scenario) -> Result<Report> {
    let browser = Arc::new(MemoryBrowser::new());
    let core = TemporaryContainers::initialize(
        CoreConfig::new(),
        Hosts::from_shared(browser.clone()),
        scenario.permissions,
    )
    .await?;
    core.save_preferences(scenario.preferences)
        .await
        .context("scenario preferences")?;

    let mut sim = Simulation {
        browser,
        core,
        transcript: Vec::new(),
        requests: 0,
    };
    for (index, step) in scenario.steps.into_iter().enumerate() {
        tracing::debug!(index, ?step, "step");
        sim.apply(index, step)
            .await
            .with_context(|| format!("step {index}"))?;
    }
    Ok(sim.report())
}

impl Simulation {
    async fn apply(&mut self, index: usize, step: Step) -> Result<()> {
        match step {
            Step::Startup => {
                self.core.on_startup().await;
                self.record(index, json!({"startup": true}));
            }
            Step::Open { url, container } => {
                let store = container.unwrap_or_else(|| self.browser.default_store().clone());
                let tab = self.browser.open_tab(&store, &url);
                self.record(index, json!({"opened": tab.id, "container": store}));
                let before = self.tab_ids();
                self.core.on_tab_created(&tab).await;
                let mut loads = self.dispatch(&before).await;
                if self.browser.tab(tab.id).is_some() && !url.starts_with("about:") {
                    loads.push_front((tab.id, url));
                }
                self.load_all(index, loads).await;
            }
            Step::Navigate { tab, url } => {
                self.load_all(index, VecDeque::from([(tab, url)])).await;
            }
            Step::Click {
                tab,
                href,
                button,
                ctrl_key,
                meta_key,
            } => {
                let sender = self
                    .browser
                    .tab(tab)
                    .with_context(|| format!("no tab {tab}"))?;
                let link = LinkClick {
                    href: href.clone(),
                    event: ClickEvent {
                        button,
                        ctrl_key,
                        meta_key,
                    },
                };
                let click = self.core.on_link_clicked(&link, &sender);
                self.record(index, json!({"clicked": tab, "href": href, "click": click}));

                let target = match click {
                    Some(ClickType::Middle | ClickType::CtrlLeft) => {
                        self.open_background_tab(&sender.cookie_store_id, tab).await?
                    }
                    _ => tab,
                };
                self.load_all(index, VecDeque::from([(target, href)])).await;
            }
            Step::Close { tab } => {
                self.browser
                    .close_tab(tab)
                    .with_context(|| format!("no tab {tab}"))?;
                self.core.on_tab_removed(tab).await;
                self.record(index, json!({"closed": tab}));
            }
            Step::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                self.record(index, json!({"waited": ms}));
            }
            Step::Message { message } => {
                let entry = match self.core.handle_message(&message, None).await {
                    Ok(response) => json!({"message": message, "response": response}),
                    Err(e) => json!({
                        "message": message,
                        "error": e.kind(),
                        "rejected": e.is_fatal_for_navigation(),
                        "reason": e.to_string(),
                    }),
                };
                self.record(index, entry);
            }
        }
        Ok(())
    }

    /// Tab the browser opens for a middle or ctrl click
    async fn open_background_tab(&mut self, store: &ContainerId, opener: TabId) -> Result<TabId> {
        let tab = self
            .browser
            .create(NewTab {
                cookie_store_id: Some(store.clone()),
                url: Some("about:blank".to_string()),
                active: false,
                opener_tab_id: Some(opener),
                ..NewTab::default()
            })
            .await?;
        self.core.on_tab_created(&tab).await;
        Ok(tab.id)
    }

    /// Send each load through the request handler, following the tabs the
    /// core opens along the way
    async fn load_all(&mut self, index: usize, mut loads: VecDeque<(TabId, String)>) {
        while let Some((tab_id, url)) = loads.pop_front() {
            let Some(tab) = self.browser.tab(tab_id) else {
                continue;
            };
            self.requests += 1;
            let details = RequestDetails {
                request_id: self.requests.to_string(),
                tab_id,
                url: url.clone(),
                resource_type: ResourceType::MainFrame,
                cookie_store_id: tab.cookie_store_id.clone(),
                origin_url: None,
            };

            let before = self.tab_ids();
            let outcome = self.core.on_before_request(&details).await;
            self.record(
                index,
                json!({
                    "request": url,
                    "tab": tab_id,
                    "container": tab.cookie_store_id,
                    "outcome": outcome,
                }),
            );
            if outcome == RequestOutcome::Continue {
                if let Some(tab) = self.browser.navigate(tab_id, &url) {
                    let change = TabChange {
                        url: Some(url.clone()),
                    };
                    self.core.on_tab_updated(tab_id, &change, &tab).await;
                }
            }
            loads.extend(self.dispatch(&before).await);
        }
    }

    /// Fire tab events for whatever changed since `before`; returns the new
    /// tabs that still have a page to load
    async fn dispatch(&mut self, before: &BTreeSet<TabId>) -> VecDeque<(TabId, String)> {
        let after = self.tab_ids();
        for removed in before.difference(&after) {
            self.core.on_tab_removed(*removed).await;
        }
        let mut loads = VecDeque::new();
        for created in after.difference(before) {
            let Some(tab) = self.browser.tab(*created) else {
                continue;
            };
            self.core.on_tab_created(&tab).await;
            if !tab.url.starts_with("about:") {
                loads.push_back((tab.id, tab.url));
            }
        }
        loads
    }

    fn tab_ids(&self) -> BTreeSet<TabId> {
        self.browser.tabs().into_iter().map(|t| t.id).collect()
    }

    fn record(&mut self, index: usize, mut entry: Value) {
        if let Value::Object(map) = &mut entry {
            map.insert("step".to_string(), json!(index));
        }
        self.transcript.push(entry);
    }

    fn report(self) -> Report {
        Report {
            transcript: self.transcript,
            containers: self.core.lifecycle().containers().into_values().collect(),
            statistics: self.core.statistics(),
            deleted_urls: self.browser.deleted_urls(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scenario(value: Value) -> Scenario {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn ctrl_click_then_close() {
        let report = run(scenario(json!({
            "preferences": {
                "isolation": {"global": {
                    "navigation": {"action": "always"},
                    "mouseClick": {"ctrlleft": {"action": "never"}}
                }},
                "container": {"removal": 1000}
            },
            "steps": [
                {"step": "open", "url": "https://start.test/"},
                {"step": "click", "tab": 1, "href": "https://next.test/", "button": 0, "ctrlKey": true},
                {"step": "close", "tab": 4},
                {"step": "wait", "ms": 1500}
            ]
        })))
        .await
        .unwrap();

        // tab 2 holds the isolated start page, tab 4 the ctrl-clicked link
        assert_eq!(report.containers.len(), 1);
        assert_eq!(report.statistics.containers_deleted, 1);
    }

    #[tokio::test]
    async fn messages_are_answered_in_the_transcript() {
        let report = run(scenario(json!({
            "steps": [
                {"step": "message", "message": {"method": "ping"}},
                {"step": "message", "message": {"method": "nope"}}
            ]
        })))
        .await
        .unwrap();

        assert_eq!(report.transcript[0]["response"], json!("pong"));
        assert_eq!(report.transcript[1]["error"], json!("unknownOperation"));
        assert_eq!(report.transcript[1]["rejected"], json!(true));
    }

    #[test]
    fn scenario_files_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.json");
        std::fs::write(&path, r#"{"steps": [{"step": "startup"}]}"#).unwrap();
        let scenario = Scenario::load(&path).unwrap();
        assert_eq!(scenario.steps.len(), 1);
    }
}
