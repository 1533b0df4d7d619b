//! Temporary Containers preference model
//!
//! Typed, validated configuration consumed by the isolation core:
//! - Global and per-domain isolation rules
//! - Container appearance and numbering defaults
//! - Deletes-history and cookie policy
//!
//! The persisted document uses the camelCase shape the extension stores, so
//! a snapshot read from storage deserializes directly into [`Preferences`].
//! Legacy isolation actions are normalized on the way in (see
//! [`IsolationAction`] and [`LegacyAction`]).
//!
//! # Example
//!
//! ```rust
//! use tmpc_preferences::{ClickType, IsolationAction, Preferences};
//!
//! let prefs = Preferences::from_json_str(
//!     r#"{"isolation":{"global":{"navigation":{"action":"notsamedomain"}}}}"#,
//! )
//! .unwrap();
//!
//! let rule = prefs.isolation.global.rule(ClickType::Navigation);
//! assert_eq!(rule.action, IsolationAction::Always);
//! assert!(rule.legacy.is_some());
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

mod appearance;
mod cookies;
mod error;
mod isolation;
mod pattern;
mod preferences;

pub use appearance::{ContainerColor, ContainerIcon, ContainerPreferences, NumberMode};
pub use cookies::{ConfiguredCookie, CookiePreferences};
pub use error::PreferencesError;
pub use isolation::{
    AlwaysRule, ClickRule, ClickType, ContainerChoice, IsolationAction, IsolationDomain,
    IsolationGlobal, LegacyAction, MouseClickRules, Toggle,
};
pub use pattern::DomainPattern;
pub use preferences::{
    AutomaticMode, AutomaticTrigger, DeletesHistoryMode,
    DeletesHistoryPreferences, IsolationPreferences, MacPreferences, Preferences,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
