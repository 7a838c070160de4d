//! JSON messages exchanged with the extension over native messaging.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{
    browser::{BrowserEvent, Tab, TabId},
    report::DateTotals,
};

/// Requests from the extension's UI contexts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "camelCase")]
pub enum Request {
    GetCurrentTab,
    /// Missing fields fall back to the focus defaults in settings.
    #[serde(rename_all = "camelCase")]
    StartFocusMode {
        #[serde(default)]
        duration: Option<u32>,
        #[serde(default)]
        blocked_sites: Option<Vec<String>>,
    },
    StopFocusMode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    CurrentTab {
        tab: Option<Tab>,
        #[serde(rename = "isIdle")]
        is_idle: bool,
    },
    Success {
        success: bool,
    },
    Error {
        error: String,
    },
}

impl Response {
    pub fn unknown_action() -> Self {
        Response::Error {
            error: "Unknown action".into(),
        }
    }
}

/// Page level pair used by the web dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PageMessage {
    #[serde(rename = "GET_EXTENSION_DATA")]
    GetExtensionData,
    #[serde(rename = "EXTENSION_DATA_RESPONSE")]
    ExtensionDataResponse { data: DateTotals },
}

/// Instructions for the extension shim to carry out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    Redirect { tab_id: TabId, url: String },
    SetIdleDetectionInterval { seconds: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Event(BrowserEvent),
    /// `request` is `None` for actions this host doesn't know.
    Request {
        id: Option<Value>,
        request: Option<Request>,
    },
    Page(PageMessage),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outbound {
    Response {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<Value>,
        #[serde(flatten)]
        response: Response,
    },
    Command(Command),
    Page(PageMessage),
}

/// Sorts a frame into a request (has `action`), a page message or a browser event.
pub fn decode_inbound(frame: &[u8]) -> Result<Inbound> {
    let mut value: Value = serde_json::from_slice(frame).context("Frame is not JSON")?;

    if let Some(object) = value.as_object_mut() {
        if object.contains_key("action") {
            let id = object.remove("id");
            let request = serde_json::from_value(value)
                .inspect_err(|e| debug!("Unrecognized request {e}"))
                .ok();
            return Ok(Inbound::Request { id, request });
        }
    }

    if value.get("type").and_then(Value::as_str) == Some("GET_EXTENSION_DATA") {
        return Ok(Inbound::Page(PageMessage::GetExtensionData));
    }

    let event = serde_json::from_value(value).context("Unrecognized browser event")?;
    Ok(Inbound::Event(event))
}
