//! Link clicks reported by content scripts
//!
//! A click arrives as a message shortly before the request it causes. It is
//! kept here, keyed by target URL, until the request handler consumes it or
//! it goes stale.

use crate::types::TabId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tmpc_preferences::ClickType;
use tokio::time::Instant;

/// Mouse event as the content script reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClickEvent {
    /// 0 for the primary button, 1 for the middle one
    pub button: u8,
    /// Ctrl was held
    pub ctrl_key: bool,
    /// Meta was held
    pub meta_key: bool,
}

impl ClickEvent {
    /// Click type, or `None` for buttons the rules do not cover
    #[must_use]
    pub fn classify(&self) -> Option<ClickType> {
        match self.button {
            1 => Some(ClickType::Middle),
            0 if self.ctrl_key || self.meta_key => Some(ClickType::CtrlLeft),
            0 => Some(ClickType::Left),
            _ => None,
        }
    }
}

/// `linkClicked` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkClick {
    /// Link target
    pub href: String,
    /// Mouse event behind the click
    #[serde(default)]
    pub event: ClickEvent,
}

/// A click waiting for its request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingClick {
    /// Rule the click falls under
    pub click: ClickType,
    /// Tab the link was clicked in
    pub tab_id: TabId,
    /// URL of the page the link was on
    pub origin_url: String,
    at: Instant,
}

/// Clicks keyed by target URL
#[derive(Debug)]
pub struct PendingClicks {
    ttl: Duration,
    clicks: Mutex<HashMap<String, PendingClick>>,
}

impl PendingClicks {
    /// Empty store whose entries expire after `ttl`
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            clicks: Mutex::new(HashMap::new()),
        }
    }

    /// Remember a click; returns its type, or `None` if it is not one the
    /// rules cover
    pub fn record(&self, link: &LinkClick, tab_id: TabId, origin_url: &str) -> Option<ClickType> {
        let click = link.event.classify()?;
        let now = Instant::now();
        let mut clicks = self.clicks.lock();
        clicks.retain(|_, pending| now.duration_since(pending.at) <= self.ttl);
        clicks.insert(
            link.href.clone(),
            PendingClick {
                click,
                tab_id,
                origin_url: origin_url.to_string(),
                at: now,
            },
        );
        Some(click)
    }

    /// Take the click that led to a request for `url`, if still fresh
    pub fn take(&self, url: &str) -> Option<PendingClick> {
        let pending = self.clicks.lock().remove(url)?;
        (Instant::now().duration_since(pending.at) <= self.ttl).then_some(pending)
    }

    /// Drop clicks made in a closed tab
    pub fn forget_tab(&self, tab_id: TabId) {
        self.clicks.lock().retain(|_, pending| pending.tab_id != tab_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(button: u8, ctrl: bool, meta: bool) -> LinkClick {
        LinkClick {
            href: "https://example.com/next".to_string(),
            event: ClickEvent {
                button,
                ctrl_key: ctrl,
                meta_key: meta,
            },
        }
    }

    #[test]
    fn buttons_and_modifiers() {
        assert_eq!(link(1, false, false).event.classify(), Some(ClickType::Middle));
        assert_eq!(link(0, true, false).event.classify(), Some(ClickType::CtrlLeft));
        assert_eq!(link(0, false, true).event.classify(), Some(ClickType::CtrlLeft));
        assert_eq!(link(0, false, false).event.classify(), Some(ClickType::Left));
        assert_eq!(link(2, false, false).event.classify(), None);
    }

    #[test]
    fn payload_shape() {
        let click: LinkClick = serde_json::from_str(
            r#"{"href":"https://a.test","event":{"button":0,"ctrlKey":true}}"#,
        )
        .unwrap();
        assert_eq!(click.event.classify(), Some(ClickType::CtrlLeft));
    }

    #[tokio::test]
    async fn clicks_are_consumed_once() {
        let clicks = PendingClicks::new(Duration::from_secs(1));
        clicks.record(&link(1, false, false), TabId(3), "https://origin.test");

        let pending = clicks.take("https://example.com/next").unwrap();
        assert_eq!(pending.click, ClickType::Middle);
        assert_eq!(pending.tab_id, TabId(3));
        assert!(clicks.take("https://example.com/next").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_clicks_expire() {
        let clicks = PendingClicks::new(Duration::from_secs(1));
        clicks.record(&link(0, false, false), TabId(3), "https://origin.test");

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(clicks.take("https://example.com/next").is_none());
    }

    #[tokio::test]
    async fn closed_tabs_drop_their_clicks() {
        let clicks = PendingClicks::new(Duration::from_secs(1));
        clicks.record(&link(0, false, false), TabId(3), "https://origin.test");
        clicks.forget_tab(TabId(3));
        assert!(clicks.take("https://example.com/next").is_none());
    }
}
