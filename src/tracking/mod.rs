//! The tracking core. [tracker::ActivityTracker] turns browser events into committed dwell time,
//! [session::SessionManager] groups it into sessions, [focus::FocusGuard] blocks distracting
//! sites while focus mode runs.

use std::future::Future;

use anyhow::Result;

use crate::browser::Event;

pub mod cursor;
pub mod focus;
pub mod session;
pub mod tracker;

/// A component reacting to host events. Every subscriber sees every event; subscribers ignore
/// the ones they don't care about.
pub trait EventSubscriber {
    fn name(&self) -> &'static str;

    fn handle(&mut self, event: &Event) -> impl Future<Output = Result<()>>;
}
