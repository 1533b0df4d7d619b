//! Temporary Containers core
//!
//! Isolates browsing into disposable containers:
//! - Decides per navigation whether to isolate, reuse, or leave alone
//! - Creates, numbers, converts and removes temporary containers
//! - Deletes cookies and recorded history when a container goes away
//! - Injects configured cookies into outgoing requests
//!
//! The browser is reached only through the traits in [`host`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tmpc_core::host::memory::MemoryBrowser;
//! use tmpc_core::{CoreConfig, Hosts, Permissions, TemporaryContainers};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let browser = Arc::new(MemoryBrowser::new());
//! let core = TemporaryContainers::initialize(
//!     CoreConfig::new(),
//!     Hosts::from_shared(browser),
//!     Permissions::default(),
//! )
//! .await?;
//!
//! let tab = core.create_tab_in_temp_container(Default::default()).await?;
//! assert!(core.is_temp_container(&tab.cookie_store_id));
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod cleanup;
pub mod click;
pub mod config;
pub mod cookies;
pub mod decision;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod runtime;
pub mod statistics;
pub mod storage;
pub mod tmpc;
pub mod types;

// Re-exports for convenience
pub use cleanup::{CleanupEngine, RemovalState};
pub use click::{ClickEvent, LinkClick};
pub use config::{CoreConfig, PreferenceSnapshot};
pub use cookies::RequestCookieEnforcer;
pub use decision::{
    evaluate, Decision, IsolationEngine, NavigationRequest, RuleSource, Trigger, Verdict,
};
pub use error::{
    ContainerCreationError, ContainerRemovalError, CookieApplyError, CoreError, HistoryDeleteError,
    HostError, RuntimeError,
};
pub use host::Hosts;
pub use lifecycle::{ContainerLifecycle, ReuseClaim, TemporaryContainer};
pub use runtime::{Command, ContainerTarget, CreateTabOptions, ExternalCommand, Response};
pub use statistics::{RemovalReport, Statistics};
pub use storage::StorageLocal;
pub use tmpc::{TabChange, TemporaryContainers};
pub use types::{
    ContainerId, ContainerKind, MacAssignment, Permissions, RequestDetails, RequestOutcome,
    ResourceType, SendHeadersDetails, Tab, TabId,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for embedding the core
    pub use crate::{
        ContainerId, CoreConfig, CoreError, Hosts, Permissions, RequestDetails, RequestOutcome,
        Tab, TabId, TemporaryContainers,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
