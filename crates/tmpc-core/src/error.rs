//! Error types for the isolation core
//!
//! Every failure is one of:
//! - A host collaborator refusing or failing a request
//! - A container that could not be created or removed
//! - A configured cookie that could not be applied
//! - A history entry that could not be deleted
//! - A malformed or unknown message
//!
//! None of them is fatal to the process; callers log and carry on.

use crate::types::{ContainerId, TabId};

/// Failure reported by a host collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// Referenced container does not exist on the host
    #[error("container not found: {0}")]
    ContainerNotFound(ContainerId),

    /// Referenced tab does not exist on the host
    #[error("tab not found: {0}")]
    TabNotFound(TabId),

    /// Host refused the request
    #[error("host rejected request: {0}")]
    Rejected(String),

    /// Host is temporarily unavailable
    #[error("host unavailable: {0}")]
    Unavailable(String),
}

impl HostError {
    /// Whether the same request may succeed later
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Host refused to create a container
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to create container {name:?}: {source}")]
pub struct ContainerCreationError {
    /// Name the container would have had
    pub name: String,
    /// Host error behind the refusal
    #[source]
    pub source: HostError,
}

/// Host failed to remove a container
///
/// The container is unregistered regardless; it will not be retried.
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to remove container {id}: {source}")]
pub struct ContainerRemovalError {
    /// Container that could not be removed
    pub id: ContainerId,
    /// Host error behind the failure
    #[source]
    pub source: HostError,
}

/// A configured cookie could not be applied to a request
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CookieApplyError {
    /// Stored field does not parse into the type the host expects
    #[error("cookie {name:?}: invalid {field} value {value:?}")]
    InvalidField {
        /// Cookie name
        name: String,
        /// Field that failed to parse
        field: &'static str,
        /// Stored value
        value: String,
    },

    /// Host refused to set the cookie
    #[error("cookie {name:?}: {source}")]
    Host {
        /// Cookie name
        name: String,
        /// Host error behind the refusal
        #[source]
        source: HostError,
    },
}

/// A URL could not be removed from history
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to delete history for {url}: {source}")]
pub struct HistoryDeleteError {
    /// URL that stayed in history
    pub url: String,
    /// Host error behind the failure
    #[source]
    pub source: HostError,
}

/// Message surface failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// Operation name not recognized, or not exposed on this surface
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// Payload does not match the operation's shape
    #[error("malformed {operation} message: {reason}")]
    Malformed {
        /// Operation the message named
        operation: String,
        /// What was wrong with the payload
        reason: String,
    },

    /// Operation needs a sender tab the message did not carry
    #[error("{0} requires a sender tab")]
    MissingSender(&'static str),
}

/// Umbrella error for fallible core operations
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A host call failed
    #[error(transparent)]
    Host(#[from] HostError),

    /// Creating a container failed
    #[error(transparent)]
    ContainerCreation(#[from] ContainerCreationError),

    /// Removing a container failed
    #[error(transparent)]
    ContainerRemoval(#[from] ContainerRemovalError),

    /// Setting a configured cookie failed
    #[error(transparent)]
    CookieApply(#[from] CookieApplyError),

    /// Deleting a history entry failed
    #[error(transparent)]
    HistoryDelete(#[from] HistoryDeleteError),

    /// A message could not be served
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Preferences did not validate
    #[error(transparent)]
    Preferences(#[from] tmpc_preferences::PreferencesError),

    /// Container is not a temporary container
    #[error("not a temporary container: {0}")]
    NotTemporary(ContainerId),
}

impl CoreError {
    /// Short machine-readable kind, used in message responses
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Host(_) => "host",
            Self::ContainerCreation(_) => "containerCreation",
            Self::ContainerRemoval(_) => "containerRemoval",
            Self::CookieApply(_) => "cookieApply",
            Self::HistoryDelete(_) => "historyDelete",
            Self::Runtime(RuntimeError::UnknownOperation(_)) => "unknownOperation",
            Self::Runtime(_) => "malformed",
            Self::Preferences(_) => "preferences",
            Self::NotTemporary(_) => "notTemporary",
        }
    }

    /// Whether the error is surfaced to the caller of the message surface
    /// rather than degrading to a logged no-op
    #[must_use]
    pub fn is_fatal_for_navigation(&self) -> bool {
        matches!(self, Self::Runtime(RuntimeError::UnknownOperation(_)))
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, CoreError>;
