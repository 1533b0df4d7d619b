//! Message surface
//!
//! Messages are `{"method": ..., "payload": {...}}` objects. They parse into
//! closed command enums; anything unrecognized is `UnknownOperation`. Other
//! extensions only reach [`ExternalCommand`], a strict subset.

use crate::click::LinkClick;
use crate::error::RuntimeError;
use crate::lifecycle::TemporaryContainer;
use crate::types::{ContainerId, Tab, TabId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tmpc_preferences::Preferences;

/// `createTabInTempContainer` payload
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateTabOptions {
    /// Page to open; a blank tab when unset
    pub url: Option<String>,
    /// Focus the new tab; defaults to true
    pub active: Option<bool>,
    /// Open a deletes-history container instead of a regular one
    pub deletes_history: Option<bool>,
}

/// A container addressed from a tab's context menu
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerTarget {
    /// Cookie store id of the container
    pub cookie_store_id: ContainerId,
    /// Tab the menu was opened on
    #[serde(default)]
    pub tab_id: Option<TabId>,
    /// New display name, for conversions to a regular container
    #[serde(default)]
    pub name: Option<String>,
}

/// Operations available to the extension's own pages and scripts
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `createTabInTempContainer`
    CreateTabInTempContainer(CreateTabOptions),
    /// `convertTempContainerToPermanent`
    ConvertTempContainerToPermanent(ContainerTarget),
    /// `convertTempContainerToRegular`
    ConvertTempContainerToRegular(ContainerTarget),
    /// `convertPermanentToTempContainer`
    ConvertPermanentToTempContainer(ContainerTarget),
    /// `isTempContainer`
    IsTempContainer(ContainerId),
    /// `resetStatistics`
    ResetStatistics,
    /// `cleanup`
    CleanupNow,
    /// `linkClicked`, sent by the content script
    LinkClicked(LinkClick),
    /// `savePreferences`
    SavePreferences(Box<Preferences>),
    /// `resetContainerNumber`
    ResetContainerNumber,
    /// `historyPermissionAllowed`
    HistoryPermissionAllowed,
    /// `ping`
    Ping,
}

/// Operations available to other extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalCommand {
    /// `createTabInTempContainer`
    CreateTabInTempContainer(CreateTabOptions),
    /// `isTempContainer`
    IsTempContainer(ContainerId),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    method: String,
    #[serde(default)]
    payload: Option<Value>,
    /// `isTempContainer` has always carried its id at the top level
    #[serde(default)]
    cookie_store_id: Option<ContainerId>,
}

#[derive(Deserialize)]
struct PreferencesPayload {
    preferences: Preferences,
}

impl Envelope {
    fn parse(message: &Value) -> Result<Self, RuntimeError> {
        serde_json::from_value(message.clone()).map_err(|e| RuntimeError::Malformed {
            operation: "message".to_string(),
            reason: e.to_string(),
        })
    }

    fn payload<T: DeserializeOwned>(&self) -> Result<T, RuntimeError> {
        let payload = self
            .payload
            .clone()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        serde_json::from_value(payload).map_err(|e| RuntimeError::Malformed {
            operation: self.method.clone(),
            reason: e.to_string(),
        })
    }

    fn container_id(&self) -> Result<ContainerId, RuntimeError> {
        if let Some(id) = &self.cookie_store_id {
            return Ok(id.clone());
        }
        self.payload::<ContainerTarget>().map(|t| t.cookie_store_id)
    }
}

impl Command {
    /// Parse an internal message
    ///
    /// # Errors
    /// - `RuntimeError::UnknownOperation` for unrecognized methods
    /// - `RuntimeError::Malformed` if the payload does not fit
    pub fn from_message(message: &Value) -> Result<Self, RuntimeError> {
        let envelope = Envelope::parse(message)?;
        Ok(match envelope.method.as_str() {
            "createTabInTempContainer" => Self::CreateTabInTempContainer(envelope.payload()?),
            "convertTempContainerToPermanent" => {
                Self::ConvertTempContainerToPermanent(envelope.payload()?)
            }
            "convertTempContainerToRegular" => Self::ConvertTempContainerToRegular(envelope.payload()?),
            "convertPermanentToTempContainer" => {
                Self::ConvertPermanentToTempContainer(envelope.payload()?)
            }
            "isTempContainer" => Self::IsTempContainer(envelope.container_id()?),
            "resetStatistics" => Self::ResetStatistics,
            "cleanupNow" => Self::CleanupNow,
            "linkClicked" => Self::LinkClicked(envelope.payload()?),
            "savePreferences" => {
                let payload: PreferencesPayload = envelope.payload()?;
                Self::SavePreferences(Box::new(payload.preferences))
            }
            "resetContainerNumber" => Self::ResetContainerNumber,
            "historyPermissionAllowed" => Self::HistoryPermissionAllowed,
            "ping" => Self::Ping,
            _ => return Err(RuntimeError::UnknownOperation(envelope.method)),
        })
    }
}

impl ExternalCommand {
    /// Parse a message from another extension
    ///
    /// # Errors
    /// - `RuntimeError::UnknownOperation` for anything outside the external
    ///   surface, including internal-only operations
    /// - `RuntimeError::Malformed` if the payload does not fit
    pub fn from_message(message: &Value) -> Result<Self, RuntimeError> {
        let envelope = Envelope::parse(message)?;
        Ok(match envelope.method.as_str() {
            "createTabInTempContainer" => Self::CreateTabInTempContainer(envelope.payload()?),
            "isTempContainer" => Self::IsTempContainer(envelope.container_id()?),
            _ => return Err(RuntimeError::UnknownOperation(envelope.method)),
        })
    }
}

impl From<ExternalCommand> for Command {
    fn from(command: ExternalCommand) -> Self {
        match command {
            ExternalCommand::CreateTabInTempContainer(options) => Self::CreateTabInTempContainer(options),
            ExternalCommand::IsTempContainer(id) => Self::IsTempContainer(id),
        }
    }
}

/// Successful response payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    /// Newly opened tab
    Tab(Box<Tab>),
    /// Container affected by a conversion
    Container(Box<TemporaryContainer>),
    /// Yes or no answer
    Bool(bool),
    /// Number of containers removed
    Count(usize),
    /// Fixed reply such as `pong`
    Text(&'static str),
    /// Nothing to report
    Done,
}

impl Response {
    /// Reply to `ping`
    pub const PONG: Response = Response::Text("pong");
}
