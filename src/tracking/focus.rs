use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    browser::{normalized_host, Alarm, BrowserApi, BrowserEvent, Event, TabId, BLOCKED_PAGE},
    storage::{
        entities::{FocusDefaults, FocusModeState, StoragePatch},
        SerializedStore, Store,
    },
    utils::clock::Clock,
};

use super::EventSubscriber;

/// Redirects blocked sites away while focus mode runs and owns the timer that ends it.
pub struct FocusGuard<S> {
    store: Arc<SerializedStore<S>>,
    browser: Arc<dyn BrowserApi>,
    clock: Arc<dyn Clock>,
    alarms: mpsc::Sender<Alarm>,
    timer: Option<CancellationToken>,
}

impl<S: Store> FocusGuard<S> {
    pub fn new(
        store: Arc<SerializedStore<S>>,
        browser: Arc<dyn BrowserApi>,
        clock: Arc<dyn Clock>,
        alarms: mpsc::Sender<Alarm>,
    ) -> Self {
        Self {
            store,
            browser,
            clock,
            alarms,
            timer: None,
        }
    }

    /// Durations and sites used when a request leaves them out.
    pub async fn defaults(&self) -> FocusDefaults {
        self.store.read_or_default().await.settings.focus_mode
    }

    pub async fn start_focus_mode(
        &mut self,
        duration: u32,
        blocked_sites: Vec<String>,
    ) -> Result<FocusModeState> {
        if duration == 0 {
            bail!("Focus mode needs a duration of at least one minute");
        }
        let state = FocusModeState::started(duration, blocked_sites, self.clock.time());
        self.store
            .write(StoragePatch::focus_mode(state.clone()))
            .await
            .context("Failed to persist focus mode")?;

        self.arm_timer(Duration::minutes(duration as i64));
        info!(
            "Focus mode on for {duration} minutes, blocking {:?}",
            state.blocked_sites
        );
        Ok(state)
    }

    /// Safe to call when focus mode is already off, the same stopped state is written again.
    pub async fn stop_focus_mode(&mut self) -> Result<FocusModeState> {
        self.disarm_timer();
        let state = FocusModeState::stopped();
        self.store
            .write(StoragePatch::focus_mode(state.clone()))
            .await
            .context("Failed to persist focus mode")?;
        info!("Focus mode off");
        Ok(state)
    }

    /// Picks up focus mode left running by a previous host. An expired one is stopped, a running
    /// one gets its timer back.
    pub async fn restore(&mut self) -> Result<()> {
        let state = self.store.read_or_default().await.focus_mode;
        if !state.is_active {
            return Ok(());
        }

        let now = self.clock.time();
        match state.end_time {
            Some(end) if end <= now => {
                info!("Focus mode expired at {end} while the host was down");
                self.stop_focus_mode().await.map(|_| ())
            }
            Some(end) => {
                debug!("Resuming focus mode until {end}");
                self.arm_timer(end - now);
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub async fn on_url_changed(&self, tab_id: TabId, url: &str) -> Result<()> {
        let state = self.store.read_or_default().await.focus_mode;
        if !state.is_blocking(self.clock.time()) {
            return Ok(());
        }
        let Some(host) = normalized_host(url) else {
            return Ok(());
        };
        if !state.blocks(&host) {
            return Ok(());
        }

        info!("Blocking {host} in tab {tab_id}");
        self.browser
            .redirect(tab_id, BLOCKED_PAGE)
            .await
            .with_context(|| format!("Failed to redirect tab {tab_id} away from {host}"))
    }

    /// The timer fired. An alarm left over from an earlier run of focus mode finds the current
    /// one still blocking and is ignored.
    pub async fn on_focus_end(&mut self) -> Result<()> {
        if !self.stop_if_expired().await? {
            debug!("Ignoring stale focus mode alarm");
        }
        Ok(())
    }

    /// Focus mode started from outside the host has no timer here, the periodic tick ends it.
    pub async fn on_tick(&mut self) -> Result<()> {
        self.stop_if_expired().await.map(|_| ())
    }

    async fn stop_if_expired(&mut self) -> Result<bool> {
        let state = self.store.read_or_default().await.focus_mode;
        if state.is_active && !state.is_blocking(self.clock.time()) {
            self.stop_focus_mode().await?;
            return Ok(true);
        }
        Ok(false)
    }

    fn arm_timer(&mut self, remaining: Duration) {
        self.disarm_timer();

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let alarms = self.alarms.clone();
        let clock = self.clock.clone();
        let wait = remaining.to_std().unwrap_or_default();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => (),
                _ = clock.sleep(wait) => {
                    if alarms.send(Alarm::FocusModeEnd).await.is_err() {
                        debug!("Focus mode ended after the dispatcher stopped");
                    }
                }
            }
        });
        self.timer = Some(token);
    }

    fn disarm_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

impl<S> Drop for FocusGuard<S> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

impl<S: Store> EventSubscriber for FocusGuard<S> {
    fn name(&self) -> &'static str {
        "focus guard"
    }

    async fn handle(&mut self, event: &Event) -> Result<()> {
        match event {
            Event::Browser(BrowserEvent::TabUpdated {
                tab_id,
                url: Some(url),
                ..
            }) => self.on_url_changed(*tab_id, url).await,
            Event::Alarm(Alarm::FocusModeEnd) => self.on_focus_end().await,
            Event::Alarm(Alarm::Tick) => self.on_tick().await,
            _ => Ok(()),
        }
    }
}
