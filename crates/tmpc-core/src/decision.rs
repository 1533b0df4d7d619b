//! Isolation decisions
//!
//! A decision is made in two phases:
//! - [`evaluate`] is a pure function of the preference snapshot and the
//!   event; it picks the rule that decides and what it asks for.
//! - [`IsolationEngine::decide`] turns that verdict into an action against
//!   live state, taking the reuse claim synchronously.
//!
//! Evaluation order: Multi-Account assignment, most specific domain rule,
//! global rule, automatic mode. The deciding rule's excluded containers are
//! checked last.

use crate::lifecycle::{ContainerLifecycle, ReuseClaim};
use crate::types::{ContainerId, ContainerKind, MacAssignment, Permissions};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tmpc_preferences::{
    AutomaticTrigger, ClickType, ContainerChoice, DeletesHistoryMode, IsolationAction, Preferences,
};

/// What set the navigation off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Trigger {
    /// A tab was just created
    TabCreated,
    /// Navigation without a recorded click
    #[serde(rename_all = "camelCase")]
    Navigation {
        /// First navigation of a freshly created tab
        #[serde(default)]
        new_tab: bool,
    },
    /// Link click recorded by the content side
    Click(ClickType),
}

impl Trigger {
    /// Click type whose rules apply
    #[must_use]
    pub fn click_type(&self) -> ClickType {
        match self {
            Self::TabCreated | Self::Navigation { .. } => ClickType::Navigation,
            Self::Click(click) => *click,
        }
    }

    fn starts_automatic_mode(&self, trigger: AutomaticTrigger) -> bool {
        matches!(
            (self, trigger),
            (Self::TabCreated, AutomaticTrigger::Created)
                | (Self::Navigation { new_tab: true }, AutomaticTrigger::Navigation)
        )
    }
}

/// Event descriptor handed to the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationRequest {
    /// What set the navigation off
    pub trigger: Trigger,
    /// URL being navigated to
    pub target_url: String,
    /// URL of the page the navigation starts from
    #[serde(default)]
    pub origin_url: Option<String>,
    /// Container the navigation currently happens in
    pub container: ContainerId,
    /// Classification of the current container
    pub kind: ContainerKind,
    /// The current container is a deletes-history container
    #[serde(default)]
    pub container_deletes_history: bool,
    /// Multi-Account Containers assignment of the target, if any
    #[serde(default)]
    pub mac_assignment: Option<MacAssignment>,
}

/// Which rule produced an isolation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleSource {
    /// A domain rule's "always open in" switch
    AlwaysOpenIn,
    /// A domain rule's per-click action
    Domain,
    /// The global per-click action
    Global,
    /// Automatic mode on a new tab
    AutomaticMode,
}

/// Result of rule evaluation, before live state is consulted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "camelCase")]
pub enum Verdict {
    /// Leave the navigation alone
    Ignore,
    /// Defer to the Multi-Account Containers confirmation
    Ask,
    /// Isolate into a temporary container
    Isolate {
        /// Clean container or a fresh one
        container: ContainerChoice,
        /// Rule that asked for isolation
        source: RuleSource,
    },
}

/// What to do with a navigation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "camelCase")]
pub enum Decision {
    /// Let the navigation proceed where it is
    Ignore,
    /// Defer to the Multi-Account Containers confirmation
    Ask,
    /// Reopen the navigation in a new temporary container
    #[serde(rename_all = "camelCase")]
    IsolateNew {
        /// The new container deletes its history on removal
        deletes_history: bool,
    },
    /// Keep the navigation in the clean container it already is in
    IsolateReuse {
        /// The clean container to stay in
        container: ContainerId,
    },
}

impl Decision {
    /// Whether the decision moves the navigation into a temporary container
    #[inline]
    #[must_use]
    pub fn is_isolation(&self) -> bool {
        matches!(self, Self::IsolateNew { .. } | Self::IsolateReuse { .. })
    }
}

/// Evaluate the rules for one event
///
/// A middle or ctrl click that its click rule lets through still loads in a
/// new tab, so it is then evaluated as that tab's first navigation.
#[must_use]
pub fn evaluate(prefs: &Preferences, request: &NavigationRequest) -> Verdict {
    let verdict = evaluate_trigger(prefs, request, request.trigger);
    match request.trigger {
        Trigger::Click(ClickType::Middle | ClickType::CtrlLeft) if verdict == Verdict::Ignore => {
            evaluate_trigger(prefs, request, Trigger::Navigation { new_tab: true })
        }
        _ => verdict,
    }
}

fn evaluate_trigger(prefs: &Preferences, request: &NavigationRequest, trigger: Trigger) -> Verdict {
    let isolation = &prefs.isolation;
    let click = trigger.click_type();
    let target = request.target_url.as_str();
    let container = request.container.as_str();

    if isolation.mac.action.is_enabled() {
        if let Some(assignment) = &request.mac_assignment {
            if assignment.never_ask || assignment.container_id == request.container {
                return Verdict::Ignore;
            }
            return Verdict::Ask;
        }
    }

    let domain = isolation
        .matching_domain(target, request.origin_url.as_deref())
        .filter(|rule| !rule.excludes(target));

    if let Some(rule) = domain {
        let click_rule = rule.rule(click);

        if rule.always.action.is_enabled() {
            let allowed = match request.kind {
                ContainerKind::Permanent => rule.always.allowed_in_permanent,
                ContainerKind::TemporaryClean | ContainerKind::TemporaryUsed => {
                    rule.always.allowed_in_temporary
                }
                ContainerKind::Default => false,
            };
            if allowed {
                return Verdict::Ignore;
            }
            if rule.excludes_container(container) {
                return Verdict::Ignore;
            }
            return Verdict::Isolate {
                container: click_rule.container,
                source: RuleSource::AlwaysOpenIn,
            };
        }

        match click_rule.action {
            IsolationAction::Never => return Verdict::Ignore,
            IsolationAction::Always if rule.excludes_container(container) => return Verdict::Ignore,
            IsolationAction::Always => {
                return Verdict::Isolate {
                    container: click_rule.container,
                    source: RuleSource::Domain,
                }
            }
            IsolationAction::Global => {}
        }
    }

    if isolation.global.excludes(target) {
        return Verdict::Ignore;
    }

    let global_rule = isolation.global.rule(click);
    let verdict = match global_rule.action {
        IsolationAction::Always => Verdict::Isolate {
            container: global_rule.container,
            source: RuleSource::Global,
        },
        // a global rule has nothing to defer to
        IsolationAction::Never | IsolationAction::Global => {
            let automatic = prefs.automatic_mode.active
                && request.kind == ContainerKind::Default
                && trigger.starts_automatic_mode(prefs.automatic_mode.new_tab);
            if !automatic {
                return Verdict::Ignore;
            }
            Verdict::Isolate {
                container: ContainerChoice::Default,
                source: RuleSource::AutomaticMode,
            }
        }
    };

    if isolation.global.excludes_container(container) {
        return Verdict::Ignore;
    }
    verdict
}

/// Whether an isolation opens a deletes-history container, before the
/// permission check
#[must_use]
pub fn wants_deletes_history(
    prefs: &Preferences,
    container: ContainerChoice,
    source: RuleSource,
    click: ClickType,
) -> bool {
    if container == ContainerChoice::DeletesHistory {
        return true;
    }
    let policy = &prefs.deletes_history;
    let mode: DeletesHistoryMode = match source {
        RuleSource::AlwaysOpenIn => policy.container_always_per_domain,
        RuleSource::AutomaticMode => policy.automatic_mode,
        RuleSource::Domain | RuleSource::Global if click.is_mouse_click() => {
            policy.container_mouse_clicks
        }
        RuleSource::Domain | RuleSource::Global => policy.container_isolation,
    };
    mode.is_automatic()
}

/// A decision together with the reuse claim backing it
#[derive(Debug)]
pub struct Resolution<'a> {
    /// What to do with the navigation
    pub decision: Decision,
    /// Held while the navigation commits; dropping it aborts the reuse
    pub claim: Option<ReuseClaim<'a>>,
}

/// Applies verdicts against the live container registry
#[derive(Debug)]
pub struct IsolationEngine {
    lifecycle: Arc<ContainerLifecycle>,
}

impl IsolationEngine {
    /// Engine over the shared container registry
    #[must_use]
    pub fn new(lifecycle: Arc<ContainerLifecycle>) -> Self {
        Self { lifecycle }
    }

    /// Decide what happens to a navigation
    ///
    /// Never suspends: a reuse claim is either taken here or the decision
    /// falls through to a new container.
    #[tracing::instrument(level = "debug", skip_all, fields(target = %request.target_url, trigger = ?request.trigger))]
    pub fn decide(
        &self,
        prefs: &Preferences,
        request: &NavigationRequest,
        permissions: Permissions,
    ) -> Resolution<'_> {
        let verdict = evaluate(prefs, request);
        let (container, source) = match verdict {
            Verdict::Ignore => return Self::settled(Decision::Ignore),
            Verdict::Ask => return Self::settled(Decision::Ask),
            Verdict::Isolate { container, source } => (container, source),
        };

        let mut deletes_history =
            wants_deletes_history(prefs, container, source, request.trigger.click_type());
        if deletes_history && !permissions.history {
            tracing::warn!("history permission missing, opening a regular container instead");
            deletes_history = false;
        }

        // Every numbering mode qualifies: reusing a clean container takes no
        // new number, and the mode only governs numbers handed out on creation.
        let reusable = !deletes_history
            && request.kind == ContainerKind::TemporaryClean
            && !request.container_deletes_history;
        if reusable {
            if let Some(claim) = self.lifecycle.reuse_clean_container(&request.container) {
                tracing::debug!(container = %request.container, ?source, "reusing clean container");
                return Resolution {
                    decision: Decision::IsolateReuse {
                        container: request.container.clone(),
                    },
                    claim: Some(claim),
                };
            }
        }

        tracing::debug!(?source, deletes_history, "isolating into new container");
        Self::settled(Decision::IsolateNew { deletes_history })
    }

    fn settled(decision: Decision) -> Resolution<'static> {
        Resolution {
            decision,
            claim: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::MemoryBrowser;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use tmpc_preferences::{ClickRule, DomainPattern, IsolationDomain, NumberMode, Toggle};

    fn request(trigger: Trigger, target: &str, kind: ContainerKind) -> NavigationRequest {
        let container = match kind {
            ContainerKind::Default => "firefox-default",
            ContainerKind::Permanent => "firefox-container-1",
            _ => "firefox-container-2",
        };
        NavigationRequest {
            trigger,
            target_url: target.to_string(),
            origin_url: None,
            container: ContainerId::new(container),
            kind,
            container_deletes_history: false,
            mac_assignment: None,
        }
    }

    fn nav(target: &str) -> NavigationRequest {
        request(Trigger::Navigation { new_tab: false }, target, ContainerKind::Default)
    }

    fn domain(pattern: &str) -> IsolationDomain {
        IsolationDomain::new(DomainPattern::new(pattern).unwrap())
    }

    #[test]
    fn defaults_ignore_everything() {
        let prefs = Preferences::default();
        assert_eq!(evaluate(&prefs, &nav("https://example.com")), Verdict::Ignore);
    }

    #[test]
    fn global_always_isolates() {
        let mut prefs = Preferences::default();
        prefs.isolation.global.navigation = ClickRule::new(IsolationAction::Always);
        assert_eq!(
            evaluate(&prefs, &nav("https://example.com")),
            Verdict::Isolate {
                container: ContainerChoice::Default,
                source: RuleSource::Global
            }
        );
    }

    #[test]
    fn global_exclusions() {
        let mut prefs = Preferences::default();
        prefs.isolation.global.navigation = ClickRule::new(IsolationAction::Always);
        prefs
            .isolation
            .global
            .excluded
            .push(DomainPattern::new("*.example.com").unwrap());
        prefs
            .isolation
            .global
            .excluded_containers
            .push("firefox-container-1".to_string());

        assert_eq!(evaluate(&prefs, &nav("https://www.example.com")), Verdict::Ignore);
        let permanent = request(
            Trigger::Navigation { new_tab: false },
            "https://other.org",
            ContainerKind::Permanent,
        );
        assert_eq!(evaluate(&prefs, &permanent), Verdict::Ignore);
    }

    #[test]
    fn always_open_in_overrides_global_and_honors_gates() {
        let mut prefs = Preferences::default();
        prefs.isolation.global.navigation = ClickRule::new(IsolationAction::Always);
        let mut rule = domain("example.com");
        rule.always.action = Toggle::Enabled;
        rule.always.allowed_in_permanent = true;
        rule.navigation.container = ContainerChoice::DeletesHistory;
        prefs.isolation.domain.push(rule);

        assert_eq!(
            evaluate(&prefs, &nav("https://example.com")),
            Verdict::Isolate {
                container: ContainerChoice::DeletesHistory,
                source: RuleSource::AlwaysOpenIn
            }
        );

        let permanent = request(
            Trigger::Navigation { new_tab: false },
            "https://example.com",
            ContainerKind::Permanent,
        );
        assert_eq!(evaluate(&prefs, &permanent), Verdict::Ignore);

        let temporary = request(
            Trigger::Navigation { new_tab: false },
            "https://example.com",
            ContainerKind::TemporaryUsed,
        );
        assert!(matches!(evaluate(&prefs, &temporary), Verdict::Isolate { .. }));
    }

    #[test]
    fn domain_rule_can_defer_or_opt_out() {
        let mut prefs = Preferences::default();
        prefs.isolation.global.navigation = ClickRule::new(IsolationAction::Always);

        let mut never = domain("quiet.org");
        never.navigation = ClickRule::new(IsolationAction::Never);
        prefs.isolation.domain.push(never);
        prefs.isolation.domain.push(domain("loud.org"));

        assert_eq!(evaluate(&prefs, &nav("https://quiet.org")), Verdict::Ignore);
        assert!(matches!(
            evaluate(&prefs, &nav("https://loud.org")),
            Verdict::Isolate {
                source: RuleSource::Global,
                ..
            }
        ));
    }

    #[test]
    fn excluded_target_skips_domain_rule() {
        let mut prefs = Preferences::default();
        let mut rule = domain("*.example.com");
        rule.navigation = ClickRule::new(IsolationAction::Always);
        rule.excluded.push(DomainPattern::new("login.example.com").unwrap());
        prefs.isolation.domain.push(rule);

        assert!(matches!(
            evaluate(&prefs, &nav("https://www.example.com")),
            Verdict::Isolate { .. }
        ));
        assert_eq!(evaluate(&prefs, &nav("https://login.example.com")), Verdict::Ignore);
    }

    #[test]
    fn click_types_select_their_rule() {
        let mut prefs = Preferences::default();
        prefs.isolation.global.navigation = ClickRule::new(IsolationAction::Always);
        prefs.isolation.global.mouse_click.middle = ClickRule::new(IsolationAction::Always);

        let left = request(
            Trigger::Click(ClickType::Left),
            "https://a.test",
            ContainerKind::Default,
        );
        let middle = request(
            Trigger::Click(ClickType::Middle),
            "https://a.test",
            ContainerKind::Default,
        );
        assert_eq!(evaluate(&prefs, &left), Verdict::Ignore);
        assert!(matches!(evaluate(&prefs, &middle), Verdict::Isolate { .. }));
    }

    #[test]
    fn declined_new_tab_clicks_fall_back_to_navigation() {
        let mut prefs = Preferences::default();
        prefs.isolation.global.navigation = ClickRule::new(IsolationAction::Always);
        prefs.isolation.global.mouse_click.ctrlleft = ClickRule::new(IsolationAction::Never);

        let left = request(
            Trigger::Click(ClickType::Left),
            "https://a.test",
            ContainerKind::Default,
        );
        let ctrl = request(
            Trigger::Click(ClickType::CtrlLeft),
            "https://a.test",
            ContainerKind::Default,
        );
        assert_eq!(evaluate(&prefs, &left), Verdict::Ignore);
        assert_eq!(
            evaluate(&prefs, &ctrl),
            Verdict::Isolate {
                container: ContainerChoice::Default,
                source: RuleSource::Global,
            }
        );
    }

    #[test]
    fn mac_assignment_takes_priority() {
        let mut prefs = Preferences::default();
        prefs.isolation.global.navigation = ClickRule::new(IsolationAction::Always);
        prefs.isolation.mac.action = Toggle::Enabled;

        let mut req = nav("https://bank.test");
        req.mac_assignment = Some(MacAssignment {
            container_id: ContainerId::new("firefox-container-1"),
            never_ask: false,
        });
        assert_eq!(evaluate(&prefs, &req), Verdict::Ask);

        req.mac_assignment.as_mut().unwrap().never_ask = true;
        assert_eq!(evaluate(&prefs, &req), Verdict::Ignore);

        prefs.isolation.mac.action = Toggle::Disabled;
        assert!(matches!(evaluate(&prefs, &req), Verdict::Isolate { .. }));
    }

    #[test]
    fn automatic_mode_needs_default_container_and_matching_trigger() {
        let mut prefs = Preferences::default();
        prefs.automatic_mode.active = true;

        let created = request(Trigger::TabCreated, "about:newtab", ContainerKind::Default);
        assert_eq!(
            evaluate(&prefs, &created),
            Verdict::Isolate {
                container: ContainerChoice::Default,
                source: RuleSource::AutomaticMode
            }
        );

        let first_nav = request(
            Trigger::Navigation { new_tab: true },
            "https://a.test",
            ContainerKind::Default,
        );
        assert_eq!(evaluate(&prefs, &first_nav), Verdict::Ignore);

        prefs.automatic_mode.new_tab = AutomaticTrigger::Navigation;
        assert!(matches!(evaluate(&prefs, &first_nav), Verdict::Isolate { .. }));

        let in_permanent = request(
            Trigger::Navigation { new_tab: true },
            "https://a.test",
            ContainerKind::Permanent,
        );
        assert_eq!(evaluate(&prefs, &in_permanent), Verdict::Ignore);
    }

    #[test]
    fn deletes_history_policy_per_source() {
        let mut prefs = Preferences::default();
        prefs.deletes_history.container_mouse_clicks = DeletesHistoryMode::Automatic;

        assert!(wants_deletes_history(
            &prefs,
            ContainerChoice::Default,
            RuleSource::Global,
            ClickType::Middle
        ));
        assert!(!wants_deletes_history(
            &prefs,
            ContainerChoice::Default,
            RuleSource::Global,
            ClickType::Navigation
        ));
        assert!(wants_deletes_history(
            &prefs,
            ContainerChoice::DeletesHistory,
            RuleSource::AutomaticMode,
            ClickType::Navigation
        ));
    }

    #[tokio::test]
    async fn engine_reuses_clean_container_once() {
        let browser = Arc::new(MemoryBrowser::new());
        let lifecycle = Arc::new(ContainerLifecycle::new(browser));
        let engine = IsolationEngine::new(lifecycle.clone());
        let container = lifecycle
            .create_container(&Preferences::default().container, false)
            .await
            .unwrap();

        let mut prefs = Preferences::default();
        prefs.isolation.global.navigation = ClickRule::new(IsolationAction::Always);
        let mut req = nav("https://a.test");
        req.container = container.cookie_store_id.clone();
        req.kind = ContainerKind::TemporaryClean;

        let first = engine.decide(&prefs, &req, Permissions::default());
        assert_eq!(
            first.decision,
            Decision::IsolateReuse {
                container: container.cookie_store_id.clone()
            }
        );
        let second = engine.decide(&prefs, &req, Permissions::default());
        assert_eq!(second.decision, Decision::IsolateNew { deletes_history: false });
    }

    #[tokio::test]
    async fn clean_containers_are_reused_under_every_numbering_mode() {
        for mode in [
            NumberMode::Keep,
            NumberMode::KeepUntilRestart,
            NumberMode::Reuse,
            NumberMode::Hide,
        ] {
            let browser = Arc::new(MemoryBrowser::new());
            let lifecycle = Arc::new(ContainerLifecycle::new(browser));
            let engine = IsolationEngine::new(lifecycle.clone());

            let mut prefs = Preferences::default();
            prefs.container.number_mode = mode;
            prefs.isolation.global.navigation = ClickRule::new(IsolationAction::Always);
            let container = lifecycle
                .create_container(&prefs.container, false)
                .await
                .unwrap();
            let mut req = nav("https://a.test");
            req.container = container.cookie_store_id.clone();
            req.kind = ContainerKind::TemporaryClean;

            let resolution = engine.decide(&prefs, &req, Permissions::default());
            assert_eq!(
                resolution.decision,
                Decision::IsolateReuse {
                    container: container.cookie_store_id.clone()
                },
                "{mode:?}"
            );
            drop(resolution);
            assert_eq!(lifecycle.numbering().0, vec![1], "{mode:?}");
        }
    }

    #[test]
    fn engine_degrades_without_history_permission() {
        let browser = Arc::new(MemoryBrowser::new());
        let engine = IsolationEngine::new(Arc::new(ContainerLifecycle::new(browser)));
        let mut prefs = Preferences::default();
        prefs.isolation.global.navigation =
            ClickRule::new(IsolationAction::Always).with_container(ContainerChoice::DeletesHistory);
        let req = nav("https://a.test");

        let granted = Permissions {
            history: true,
            ..Permissions::default()
        };
        assert_eq!(
            engine.decide(&prefs, &req, granted).decision,
            Decision::IsolateNew { deletes_history: true }
        );
        assert_eq!(
            engine.decide(&prefs, &req, Permissions::default()).decision,
            Decision::IsolateNew { deletes_history: false }
        );
    }

    fn any_action() -> impl Strategy<Value = IsolationAction> {
        prop_oneof![
            Just(IsolationAction::Never),
            Just(IsolationAction::Always),
            Just(IsolationAction::Global),
        ]
    }

    fn any_click() -> impl Strategy<Value = ClickType> {
        prop::sample::select(ClickType::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn global_never_ignores_unless_a_domain_rule_decides(
            click in any_click(),
            domain_action in any_action(),
        ) {
            let mut prefs = Preferences::default();
            let mut rule = domain("example.com");
            *rule.rule_mut(click) = ClickRule::new(domain_action);
            prefs.isolation.domain.push(rule);

            let trigger = match click {
                ClickType::Navigation => Trigger::Navigation { new_tab: false },
                other => Trigger::Click(other),
            };
            let req = request(trigger, "https://example.com", ContainerKind::Default);
            let verdict = evaluate(&prefs, &req);

            if domain_action == IsolationAction::Always {
                prop_assert!(
                    matches!(verdict, Verdict::Isolate { source: RuleSource::Domain, .. }),
                    "domain rule should decide: {:?}",
                    verdict
                );
            } else {
                prop_assert_eq!(verdict, Verdict::Ignore);
            }

            let elsewhere = request(trigger, "https://other.test", ContainerKind::Default);
            prop_assert_eq!(evaluate(&prefs, &elsewhere), Verdict::Ignore);
        }
    }
}
