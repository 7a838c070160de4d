use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    browser::{Alarm, Event},
    report::date_totals,
    storage::{SerializedStore, Store},
    tracking::{focus::FocusGuard, tracker::ActivityTracker, EventSubscriber},
};

use super::protocol::{Inbound, Outbound, PageMessage, Request, Response};

/// Hands every event to both subscribers and answers requests, one message at a time.
///
/// The tracker and the focus guard run side by side on each event. A failure in one is logged
/// and doesn't keep the other from seeing the event.
pub struct EventDispatcher<S> {
    inbound: mpsc::Receiver<Inbound>,
    alarms: mpsc::Receiver<Alarm>,
    outbound: mpsc::Sender<Outbound>,
    tracker: ActivityTracker<S>,
    guard: FocusGuard<S>,
    store: Arc<SerializedStore<S>>,
    shutdown: CancellationToken,
}

impl<S: Store> EventDispatcher<S> {
    pub fn new(
        inbound: mpsc::Receiver<Inbound>,
        alarms: mpsc::Receiver<Alarm>,
        outbound: mpsc::Sender<Outbound>,
        tracker: ActivityTracker<S>,
        guard: FocusGuard<S>,
        store: Arc<SerializedStore<S>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inbound,
            alarms,
            outbound,
            tracker,
            guard,
            store,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        self.tracker.begin().await;
        if let Err(e) = self.guard.restore().await {
            error!("Failed to restore focus mode {e:?}");
        }

        loop {
            tokio::select! {
                // Messages already read from the browser are handled before shutting down.
                biased;
                message = self.inbound.recv() => match message {
                    Some(message) => self.on_inbound(message).await,
                    None => break,
                },
                _ = self.shutdown.cancelled() => break,
                Some(alarm) = self.alarms.recv() => self.dispatch(&alarm.into()).await,
            }
        }

        info!("Dispatcher stopping");
        self.tracker
            .shutdown()
            .await
            .inspect_err(|e| error!("Failed to flush tracking on shutdown {e:?}"))
    }

    async fn on_inbound(&mut self, message: Inbound) {
        match message {
            Inbound::Event(event) => self.dispatch(&event.into()).await,
            Inbound::Request { id, request } => {
                let response = self.respond(request).await;
                self.send(Outbound::Response { id, response }).await;
            }
            Inbound::Page(PageMessage::GetExtensionData) => {
                let data = self.store.read_or_default().await;
                let data = date_totals(&data.sites, &Local);
                self.send(Outbound::Page(PageMessage::ExtensionDataResponse { data }))
                    .await;
            }
            Inbound::Page(other) => debug!("Ignoring page message {other:?}"),
        }
    }

    async fn dispatch(&mut self, event: &Event) {
        debug!("Dispatching {event:?}");
        let (tracked, guarded) =
            futures::join!(self.tracker.handle(event), self.guard.handle(event));

        if let Err(e) = tracked {
            error!("Subscriber {} failed on {event:?}: {e:?}", self.tracker.name());
        }
        if let Err(e) = guarded {
            error!("Subscriber {} failed on {event:?}: {e:?}", self.guard.name());
        }
    }

    async fn respond(&mut self, request: Option<Request>) -> Response {
        let Some(request) = request else {
            return Response::unknown_action();
        };

        let result = match request {
            Request::GetCurrentTab => {
                let snapshot = self.tracker.snapshot();
                return Response::CurrentTab {
                    tab: snapshot.tab,
                    is_idle: snapshot.is_idle,
                };
            }
            Request::StartFocusMode {
                duration,
                blocked_sites,
            } => {
                let defaults = self.guard.defaults().await;
                self.guard
                    .start_focus_mode(
                        duration.unwrap_or(defaults.default_duration),
                        blocked_sites.unwrap_or(defaults.default_blocked_sites),
                    )
                    .await
                    .map(|_| ())
            }
            Request::StopFocusMode => self.guard.stop_focus_mode().await.map(|_| ()),
        };

        match result {
            Ok(()) => Response::Success { success: true },
            Err(e) => {
                warn!("Request failed {e:?}");
                Response::Error {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn send(&self, message: Outbound) {
        if self.outbound.send(message).await.is_err() {
            warn!("Browser connection is closed, dropping reply");
        }
    }
}
