use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::browser::Tab;

/// Below this an interval is considered a flicker between tabs and dropped.
pub const MIN_ATTRIBUTION_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "domain", rename_all = "camelCase")]
pub enum TrackerState {
    Tracking(String),
    Idle,
    NoDomain,
}

/// An interval that passed the commit policy and should be credited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub domain: String,
    pub elapsed_ms: u64,
}

/// What the tracker currently believes the user is looking at, and since when.
/// Only lives in memory; a restart loses at most one unflushed interval.
#[derive(Debug)]
pub struct AttributionCursor {
    current: Option<Tab>,
    started_at: DateTime<Utc>,
    idle: bool,
}

impl AttributionCursor {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            current: None,
            started_at: now,
            idle: false,
        }
    }

    pub fn current(&self) -> Option<&Tab> {
        self.current.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }

    pub fn is_current(&self, tab_id: i64) -> bool {
        self.current.as_ref().is_some_and(|tab| tab.id == tab_id)
    }

    pub fn state(&self) -> TrackerState {
        if self.idle {
            return TrackerState::Idle;
        }
        match self.current.as_ref().and_then(Tab::domain) {
            Some(domain) => TrackerState::Tracking(domain),
            None => TrackerState::NoDomain,
        }
    }

    /// Ends the interval running up to `now` and starts the next one at `now`. Returns the
    /// interval if it should be committed: not idle, at least [MIN_ATTRIBUTION_MS] long, and on
    /// a tracked domain.
    pub fn checkpoint(&mut self, now: DateTime<Utc>) -> Option<Attribution> {
        let elapsed_ms = (now - self.started_at).num_milliseconds();
        self.started_at = now;

        if self.idle || elapsed_ms < MIN_ATTRIBUTION_MS as i64 {
            return None;
        }
        let domain = self.current.as_ref()?.domain()?;
        Some(Attribution {
            domain,
            elapsed_ms: elapsed_ms as u64,
        })
    }

    pub fn switch_to(&mut self, tab: Option<Tab>, now: DateTime<Utc>) {
        self.current = tab;
        self.started_at = now;
    }

    pub fn pause(&mut self) {
        self.idle = true;
    }

    /// Leaves idle. Time spent idle is never attributed.
    pub fn resume(&mut self, now: DateTime<Utc>) {
        self.idle = false;
        self.started_at = now;
    }
}
