//! Contract between the tracking core and the browser. [BrowserApi] is what the core calls into,
//! [BrowserEvent] is what the browser reports. The native messaging implementation lives in
//! [host::native](crate::host::native).

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

pub type TabId = i64;
pub type WindowId = i64;

/// Window id the browser reports when none of its windows has focus.
pub const WINDOW_ID_NONE: WindowId = -1;

/// Page the focus guard sends blocked tabs to. Resolved relative to the extension by the browser
/// side.
pub const BLOCKED_PAGE: &str = "focus-blocked.html";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: TabId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_id: Option<WindowId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub active: bool,
}

impl Tab {
    /// Hostname of the tab's page, if it is a page whose time counts.
    pub fn domain(&self) -> Option<String> {
        self.url.as_deref().and_then(tracked_domain)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleState {
    Active,
    Idle,
    Locked,
}

/// Events forwarded by the extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BrowserEvent {
    /// Sent once the extension connects, with a snapshot of open tabs.
    Startup {
        #[serde(default)]
        tabs: Vec<Tab>,
    },
    TabActivated {
        tab_id: TabId,
        #[serde(default)]
        window_id: Option<WindowId>,
    },
    /// `url` is only present when the update changed the tab's URL.
    TabUpdated {
        tab_id: TabId,
        #[serde(default)]
        url: Option<String>,
        tab: Tab,
    },
    TabRemoved {
        tab_id: TabId,
    },
    FocusChanged {
        window_id: WindowId,
    },
    IdleStateChanged {
        state: IdleState,
    },
}

/// Timers firing inside the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alarm {
    /// Periodic flush, every minute.
    Tick,
    /// The focus mode window ended.
    FocusModeEnd,
}

/// Everything the event subscribers react to.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Browser(BrowserEvent),
    Alarm(Alarm),
}

impl From<BrowserEvent> for Event {
    fn from(value: BrowserEvent) -> Self {
        Event::Browser(value)
    }
}

impl From<Alarm> for Event {
    fn from(value: Alarm) -> Self {
        Event::Alarm(value)
    }
}

/// Operations the core needs from the browser.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrowserApi: Send + Sync {
    /// Fails if the tab is gone.
    async fn get_tab(&self, tab_id: TabId) -> Result<Tab>;

    /// Active tab of the focused window, if there is one.
    async fn active_tab(&self) -> Result<Option<Tab>>;

    async fn redirect(&self, tab_id: TabId, page: &str) -> Result<()>;

    async fn set_idle_detection_interval(&self, seconds: u32) -> Result<()>;
}

/// Hostname of `url` when time on it should be attributed. Browser-internal pages, extension
/// pages and anything that isn't http(s) are excluded. The hostname is taken as the URL parser
/// reports it, `www.` is kept.
pub fn tracked_domain(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?;
    if host.starts_with("chrome") {
        return None;
    }
    Some(host.to_string())
}

/// Hostname with a leading `www.` removed, for matching against user entered domains.
pub fn normalized_host(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    url.host_str()
        .map(|host| crate::categories::strip_www(host).to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn internal_pages_are_not_tracked() {
        assert_eq!(tracked_domain("chrome://newtab/"), None);
        assert_eq!(tracked_domain("chrome-extension://abcdef/popup.html"), None);
        assert_eq!(tracked_domain("about:blank"), None);
        assert_eq!(tracked_domain("file:///home/me/notes.txt"), None);
        assert_eq!(tracked_domain("https://chromewebstore.google.com/x"), None);
        assert_eq!(tracked_domain("not a url"), None);
    }

    #[test]
    fn hostnames_keep_www() {
        assert_eq!(
            tracked_domain("https://www.youtube.com/watch?v=1").as_deref(),
            Some("www.youtube.com")
        );
        assert_eq!(normalized_host("https://www.facebook.com/feed").as_deref(), Some("facebook.com"));
    }

    #[test]
    fn events_use_extension_field_names() {
        let event: BrowserEvent = serde_json::from_value(json!({
            "type": "tabUpdated",
            "tabId": 4,
            "url": "https://github.com/",
            "tab": {"id": 4, "windowId": 1, "url": "https://github.com/", "active": true},
        }))
        .unwrap();

        let BrowserEvent::TabUpdated { tab_id, url, tab } = event else {
            panic!("wrong variant");
        };
        assert_eq!(tab_id, 4);
        assert_eq!(url.as_deref(), Some("https://github.com/"));
        assert_eq!(tab.domain().as_deref(), Some("github.com"));

        let idle: BrowserEvent =
            serde_json::from_value(json!({"type": "idleStateChanged", "state": "locked"})).unwrap();
        assert_eq!(idle, BrowserEvent::IdleStateChanged { state: IdleState::Locked });
    }
}
