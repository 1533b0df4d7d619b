//! Isolation rules
//!
//! A rule is either global (every domain) or domain-scoped (keyed by a target
//! pattern and an optional origin pattern). Each rule carries one
//! [`ClickRule`] per [`ClickType`].
//!
//! Legacy actions (`notsamedomain`, `notsamedomainexact`) are normalized here
//! into [`IsolationAction::Always`]; the original spelling survives only as
//! [`ClickRule::legacy`] so the decision engine never branches on it.

use crate::pattern::DomainPattern;
use serde::{Deserialize, Serialize};

/// The user gesture (or lack of one) behind a navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClickType {
    /// Address bar, location change, redirect
    Navigation,
    /// Middle mouse button
    Middle,
    /// Left click with Ctrl (or Cmd)
    CtrlLeft,
    /// Plain left click
    Left,
}

impl ClickType {
    /// Every click type
    pub const ALL: [ClickType; 4] = [Self::Navigation, Self::Middle, Self::CtrlLeft, Self::Left];

    /// Whether this is a mouse click rather than a navigation
    #[inline]
    #[must_use]
    pub fn is_mouse_click(&self) -> bool {
        !matches!(self, Self::Navigation)
    }
}

/// Normalized isolation action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationAction {
    /// Never isolate
    #[default]
    Never,
    /// Always isolate
    Always,
    /// Defer to the global rule
    Global,
}

/// Deprecated action spellings, kept only as provenance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegacyAction {
    /// Stored as `notsamedomain`; read as `Always`
    NotSameDomain,
    /// Stored as `notsamedomainexact`; read as `Always`
    NotSameDomainExact,
}

/// Which kind of container an isolation opens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContainerChoice {
    /// A regular temporary container
    #[default]
    #[serde(rename = "default")]
    Default,
    /// A container that deletes its history and cookies on removal
    #[serde(rename = "deleteshistory")]
    DeletesHistory,
}

/// Action and container choice for one click type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "RawClickRule", into = "RawClickRule")]
pub struct ClickRule {
    /// What to do with the click
    pub action: IsolationAction,
    /// Kind of container to open
    pub container: ContainerChoice,
    /// Set when the stored action was a deprecated spelling
    pub legacy: Option<LegacyAction>,
}

impl ClickRule {
    /// Rule with the given action and the default container
    #[inline]
    #[must_use]
    pub fn new(action: IsolationAction) -> Self {
        Self {
            action,
            container: ContainerChoice::Default,
            legacy: None,
        }
    }

    /// Set the container choice
    #[inline]
    #[must_use]
    pub fn with_container(mut self, container: ContainerChoice) -> Self {
        self.container = container;
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RawAction {
    Never,
    NotSameDomain,
    NotSameDomainExact,
    Always,
    Global,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawClickRule {
    action: RawAction,
    #[serde(default)]
    container: ContainerChoice,
}

impl From<RawClickRule> for ClickRule {
    fn from(raw: RawClickRule) -> Self {
        let (action, legacy) = match raw.action {
            RawAction::Never => (IsolationAction::Never, None),
            RawAction::Always => (IsolationAction::Always, None),
            RawAction::Global => (IsolationAction::Global, None),
            RawAction::NotSameDomain => (IsolationAction::Always, Some(LegacyAction::NotSameDomain)),
            RawAction::NotSameDomainExact => {
                (IsolationAction::Always, Some(LegacyAction::NotSameDomainExact))
            }
        };
        Self {
            action,
            container: raw.container,
            legacy,
        }
    }
}

impl From<ClickRule> for RawClickRule {
    fn from(rule: ClickRule) -> Self {
        let action = match (rule.legacy, rule.action) {
            (Some(LegacyAction::NotSameDomain), IsolationAction::Always) => RawAction::NotSameDomain,
            (Some(LegacyAction::NotSameDomainExact), IsolationAction::Always) => {
                RawAction::NotSameDomainExact
            }
            (_, IsolationAction::Never) => RawAction::Never,
            (_, IsolationAction::Always) => RawAction::Always,
            (_, IsolationAction::Global) => RawAction::Global,
        };
        Self {
            action,
            container: rule.container,
        }
    }
}

/// Per-button mouse click rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MouseClickRules {
    /// Middle click
    pub middle: ClickRule,
    /// Ctrl or Cmd plus left click
    pub ctrlleft: ClickRule,
    /// Plain left click
    pub left: ClickRule,
}

impl MouseClickRules {
    fn uniform(action: IsolationAction) -> Self {
        Self {
            middle: ClickRule::new(action),
            ctrlleft: ClickRule::new(action),
            left: ClickRule::new(action),
        }
    }
}

impl Default for MouseClickRules {
    fn default() -> Self {
        Self::uniform(IsolationAction::Never)
    }
}

/// Rule applying to every domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IsolationGlobal {
    /// Rule for navigations typed or started by the page
    pub navigation: ClickRule,
    /// Rules for link clicks
    pub mouse_click: MouseClickRules,
    /// Target domain patterns exempted from the rule
    #[serde(with = "key_set")]
    pub excluded: Vec<DomainPattern>,
    /// Container ids in which the rule never isolates
    #[serde(with = "string_key_set")]
    pub excluded_containers: Vec<String>,
}

impl Default for IsolationGlobal {
    fn default() -> Self {
        Self {
            navigation: ClickRule::new(IsolationAction::Never),
            mouse_click: MouseClickRules::default(),
            excluded: Vec::new(),
            excluded_containers: Vec::new(),
        }
    }
}

impl IsolationGlobal {
    /// Rule for a click type
    #[must_use]
    pub fn rule(&self, click: ClickType) -> ClickRule {
        rule_for(&self.navigation, &self.mouse_click, click)
    }

    /// Whether the target is exempted from this rule
    #[must_use]
    pub fn excludes(&self, target_url: &str) -> bool {
        self.excluded.iter().any(|p| p.matches(target_url))
    }

    /// Whether the container is exempted from this rule
    #[must_use]
    pub fn excludes_container(&self, container_id: &str) -> bool {
        self.excluded_containers.iter().any(|c| c == container_id)
    }
}

/// Enabled/disabled switch as stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toggle {
    /// Switched on
    Enabled,
    /// Switched off
    #[default]
    Disabled,
}

impl Toggle {
    /// Whether the switch is on
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }
}

/// "Always open in a temporary container" switch of a domain rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlwaysRule {
    /// Whether the rule applies
    pub action: Toggle,
    /// Allowed to load in the permanent container it was opened in
    pub allowed_in_permanent: bool,
    /// Allowed to load in the temporary container it was opened in
    pub allowed_in_temporary: bool,
}

impl Default for AlwaysRule {
    fn default() -> Self {
        Self {
            action: Toggle::Disabled,
            allowed_in_permanent: false,
            allowed_in_temporary: false,
        }
    }
}

/// Rule keyed by a target pattern (and optionally an origin pattern)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IsolationDomain {
    /// Domains the rule targets
    pub target_pattern: DomainPattern,
    /// Restricts the rule to navigations starting from these domains
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_pattern: Option<DomainPattern>,
    /// Always-open-in switch
    #[serde(default)]
    pub always: AlwaysRule,
    /// Rule for navigations; follows the global rule by default
    #[serde(default = "ClickRule::global")]
    pub navigation: ClickRule,
    /// Rules for link clicks; follow the global rules by default
    #[serde(default = "MouseClickRules::global")]
    pub mouse_click: MouseClickRules,
    /// Target domains exempted from the rule
    #[serde(default, with = "key_set")]
    pub excluded: Vec<DomainPattern>,
    /// Container ids in which the rule never isolates
    #[serde(default, with = "string_key_set")]
    pub excluded_containers: Vec<String>,
}

impl ClickRule {
    fn global() -> Self {
        Self::new(IsolationAction::Global)
    }
}

impl MouseClickRules {
    fn global() -> Self {
        Self::uniform(IsolationAction::Global)
    }
}

impl IsolationDomain {
    /// New domain rule deferring every click type to the global rule
    #[must_use]
    pub fn new(target_pattern: DomainPattern) -> Self {
        Self {
            target_pattern,
            origin_pattern: None,
            always: AlwaysRule::default(),
            navigation: ClickRule::global(),
            mouse_click: MouseClickRules::global(),
            excluded: Vec::new(),
            excluded_containers: Vec::new(),
        }
    }

    /// Rule for a click type
    #[must_use]
    pub fn rule(&self, click: ClickType) -> ClickRule {
        rule_for(&self.navigation, &self.mouse_click, click)
    }

    /// Mutable rule for a click type
    pub fn rule_mut(&mut self, click: ClickType) -> &mut ClickRule {
        match click {
            ClickType::Navigation => &mut self.navigation,
            ClickType::Middle => &mut self.mouse_click.middle,
            ClickType::CtrlLeft => &mut self.mouse_click.ctrlleft,
            ClickType::Left => &mut self.mouse_click.left,
        }
    }

    /// Whether the rule applies to a navigation from `origin` to `target`
    ///
    /// An origin pattern requires a known origin that matches it.
    #[must_use]
    pub fn applies_to(&self, target_url: &str, origin_url: Option<&str>) -> bool {
        if !self.target_pattern.matches(target_url) {
            return false;
        }
        match (&self.origin_pattern, origin_url) {
            (None, _) => true,
            (Some(pattern), Some(origin)) => pattern.matches(origin),
            (Some(_), None) => false,
        }
    }

    /// Whether the target is exempted from this rule
    #[must_use]
    pub fn excludes(&self, target_url: &str) -> bool {
        self.excluded.iter().any(|p| p.matches(target_url))
    }

    /// Whether the container is exempted from this rule
    #[must_use]
    pub fn excludes_container(&self, container_id: &str) -> bool {
        self.excluded_containers.iter().any(|c| c == container_id)
    }
}

impl IsolationGlobal {
    /// Mutable rule for a click type
    pub fn rule_mut(&mut self, click: ClickType) -> &mut ClickRule {
        match click {
            ClickType::Navigation => &mut self.navigation,
            ClickType::Middle => &mut self.mouse_click.middle,
            ClickType::CtrlLeft => &mut self.mouse_click.ctrlleft,
            ClickType::Left => &mut self.mouse_click.left,
        }
    }
}

fn rule_for(navigation: &ClickRule, mouse: &MouseClickRules, click: ClickType) -> ClickRule {
    match click {
        ClickType::Navigation => *navigation,
        ClickType::Middle => mouse.middle,
        ClickType::CtrlLeft => mouse.ctrlleft,
        ClickType::Left => mouse.left,
    }
}

/// Exclusion sets are stored as objects keyed by pattern
mod key_set {
    use crate::pattern::DomainPattern;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub(super) fn serialize<S: Serializer>(
        patterns: &[DomainPattern],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let map: BTreeMap<&str, serde_json::Value> = patterns
            .iter()
            .map(|p| (p.as_str(), serde_json::Value::Object(serde_json::Map::new())))
            .collect();
        map.serialize(serializer)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<DomainPattern>, D::Error> {
        let map = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        map.into_keys()
            .map(|k| DomainPattern::new(k).map_err(D::Error::custom))
            .collect()
    }
}

mod string_key_set {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub(super) fn serialize<S: Serializer>(keys: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        let map: BTreeMap<&str, serde_json::Value> = keys
            .iter()
            .map(|k| (k.as_str(), serde_json::Value::Object(serde_json::Map::new())))
            .collect();
        map.serialize(serializer)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<String>, D::Error> {
        let map = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        Ok(map.into_keys().collect())
    }
}
