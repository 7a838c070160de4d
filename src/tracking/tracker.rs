use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{
    browser::{Alarm, BrowserApi, BrowserEvent, Event, IdleState, Tab, TabId, WindowId, WINDOW_ID_NONE},
    storage::{entities::Session, SerializedStore, Store},
    utils::clock::Clock,
};

use super::{
    cursor::{Attribution, AttributionCursor, TrackerState},
    session::SessionManager,
    EventSubscriber,
};

/// Longest idle threshold pushed to the browser, one day.
const MAX_IDLE_THRESHOLD_MINUTES: u32 = 24 * 60;

/// Read-only view of the tracker handed out to other contexts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSnapshot {
    pub tab: Option<Tab>,
    pub is_idle: bool,
    pub state: TrackerState,
}

/// Attributes elapsed time to one domain at a time and commits it to the store.
///
/// Every transition first closes the running interval (commit), then moves the cursor. A failed
/// commit is reported after the cursor moved, so the interval is lost rather than counted twice.
pub struct ActivityTracker<S> {
    store: Arc<SerializedStore<S>>,
    browser: Arc<dyn BrowserApi>,
    clock: Arc<dyn Clock>,
    cursor: AttributionCursor,
    sessions: SessionManager<S>,
}

impl<S: Store> ActivityTracker<S> {
    pub fn new(
        store: Arc<SerializedStore<S>>,
        browser: Arc<dyn BrowserApi>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.time();
        Self {
            sessions: SessionManager::new(store.clone()),
            store,
            browser,
            clock,
            cursor: AttributionCursor::new(now),
        }
    }

    /// Opens the first session and pushes the configured idle threshold to the browser.
    pub async fn begin(&mut self) {
        self.sessions.begin(self.clock.time());

        let settings = self.store.read_or_default().await.settings;
        let seconds = settings.idle_threshold.clamp(1, MAX_IDLE_THRESHOLD_MINUTES) * 60;
        if let Err(e) = self.browser.set_idle_detection_interval(seconds).await {
            warn!("Failed to set idle detection interval {e:?}");
        }
    }

    /// Picks up the active tab without committing anything, there was no interval before.
    pub async fn on_startup(&mut self) {
        let now = self.clock.time();
        self.sessions.begin(now);

        let tab = match self.browser.active_tab().await {
            Ok(tab) => tab,
            Err(e) => {
                error!("Error getting initial tab {e:?}");
                None
            }
        };
        info!("Tracking starts on {:?}", tab.as_ref().and_then(Tab::domain));
        self.cursor.switch_to(tab, now);
    }

    pub async fn on_tab_activated(&mut self, tab_id: TabId) -> Result<()> {
        let now = self.clock.time();
        let committed = self.commit(now).await;

        let tab = match self.browser.get_tab(tab_id).await {
            Ok(tab) => Some(tab),
            Err(e) => {
                error!("Error getting active tab {tab_id} {e:?}");
                None
            }
        };
        self.cursor.switch_to(tab, now);
        committed
    }

    /// Only URL changes of the tab being tracked matter here.
    pub async fn on_tab_updated(&mut self, tab_id: TabId, url: Option<&str>, tab: &Tab) -> Result<()> {
        let Some(url) = url else {
            return Ok(());
        };
        if !self.cursor.is_current(tab_id) {
            return Ok(());
        }

        let now = self.clock.time();
        let committed = self.commit(now).await;
        let mut tab = tab.clone();
        tab.url = Some(url.to_string());
        self.cursor.switch_to(Some(tab), now);
        committed
    }

    pub async fn on_tab_removed(&mut self, tab_id: TabId) -> Result<()> {
        if !self.cursor.is_current(tab_id) {
            return Ok(());
        }
        let now = self.clock.time();
        let committed = self.commit(now).await;
        self.cursor.switch_to(None, now);
        committed
    }

    /// Losing focus pauses on the same tab, regaining it resumes there.
    pub async fn on_focus_changed(&mut self, window_id: WindowId) -> Result<()> {
        let now = self.clock.time();
        if window_id == WINDOW_ID_NONE {
            let committed = self.commit(now).await;
            self.cursor.pause();
            committed
        } else {
            self.cursor.resume(now);
            Ok(())
        }
    }

    pub async fn on_idle_state(&mut self, state: IdleState) -> Result<()> {
        let now = self.clock.time();
        match state {
            IdleState::Idle | IdleState::Locked => {
                let committed = self.commit(now).await;
                self.cursor.pause();
                committed
            }
            IdleState::Active => {
                self.cursor.resume(now);
                Ok(())
            }
        }
    }

    /// Periodic flush so a crash loses at most one tick of time, plus session rotation.
    pub async fn on_tick(&mut self) -> Result<()> {
        let now = self.clock.time();
        let committed = self.commit(now).await;

        let rotated = if self.sessions.should_rotate(now) {
            self.sessions.rotate(now).await
        } else {
            Ok(())
        };
        committed.and(rotated)
    }

    /// Flushes the running interval and closes the open session.
    pub async fn shutdown(&mut self) -> Result<()> {
        let now = self.clock.time();
        let committed = self.commit(now).await;
        let closed = self.sessions.close(now).await.map(|_| ());
        committed.and(closed)
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            tab: self.cursor.current().cloned(),
            is_idle: self.cursor.is_idle(),
            state: self.cursor.state(),
        }
    }

    pub fn current_session(&self) -> Option<&Session> {
        self.sessions.current()
    }

    async fn commit(&mut self, now: DateTime<Utc>) -> Result<()> {
        let Some(Attribution { domain, elapsed_ms }) = self.cursor.checkpoint(now) else {
            return Ok(());
        };

        let recorded = self
            .store
            .update_site_data(&domain, elapsed_ms, now)
            .await
            .with_context(|| format!("Failed to commit {elapsed_ms}ms on {domain}"))?;

        if recorded {
            self.sessions.record(&domain, elapsed_ms);
            debug!("Tracked {elapsed_ms}ms on {domain}");
        } else {
            debug!("Tracking disabled, dropped {elapsed_ms}ms on {domain}");
        }
        Ok(())
    }
}

impl<S: Store> EventSubscriber for ActivityTracker<S> {
    fn name(&self) -> &'static str {
        "tracker"
    }

    async fn handle(&mut self, event: &Event) -> Result<()> {
        match event {
            Event::Browser(BrowserEvent::Startup { .. }) => {
                self.on_startup().await;
                Ok(())
            }
            Event::Browser(BrowserEvent::TabActivated { tab_id, .. }) => {
                self.on_tab_activated(*tab_id).await
            }
            Event::Browser(BrowserEvent::TabUpdated { tab_id, url, tab }) => {
                self.on_tab_updated(*tab_id, url.as_deref(), tab).await
            }
            Event::Browser(BrowserEvent::TabRemoved { tab_id }) => self.on_tab_removed(*tab_id).await,
            Event::Browser(BrowserEvent::FocusChanged { window_id }) => {
                self.on_focus_changed(*window_id).await
            }
            Event::Browser(BrowserEvent::IdleStateChanged { state }) => {
                self.on_idle_state(*state).await
            }
            Event::Alarm(Alarm::Tick) => self.on_tick().await,
            Event::Alarm(Alarm::FocusModeEnd) => Ok(()),
        }
    }
}
