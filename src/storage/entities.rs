use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::categories::{categorize, strip_www, Category};

pub const SITES_FIELD: &str = "sites";
pub const SESSIONS_FIELD: &str = "sessions";
pub const SETTINGS_FIELD: &str = "settings";
pub const FOCUS_MODE_FIELD: &str = "focusMode";

/// Accumulated time for one domain. Lives until explicitly deleted.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SiteAggregate {
    pub domain: String,
    /// Milliseconds.
    pub time_spent: u64,
    pub visits: u64,
    /// Recomputed on every read, the persisted value is informational only.
    #[serde(default)]
    pub category: Category,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_visit: DateTime<Utc>,
}

impl SiteAggregate {
    pub fn new(domain: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            domain: domain.into(),
            time_spent: 0,
            visits: 0,
            category: Category::Other,
            last_visit: now,
        }
    }

    /// Adds one committed interval.
    pub fn record(&mut self, elapsed_ms: u64, now: DateTime<Utc>) {
        self.time_spent += elapsed_ms;
        self.visits += 1;
        self.last_visit = now;
    }
}

/// Closed sessions are kept for this long.
pub const SESSION_RETENTION: Duration = Duration::days(30);

/// A bounded grouping of dwell time. Open while `end_time` is unset.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sites: BTreeMap<String, u64>,
    #[serde(default)]
    pub total_time: u64,
}

impl Session {
    pub fn start(now: DateTime<Utc>) -> Self {
        Self {
            id: format!("session_{}", Uuid::new_v4().simple()),
            start_time: now,
            end_time: None,
            sites: BTreeMap::new(),
            total_time: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.start_time
    }

    pub fn add(&mut self, domain: &str, elapsed_ms: u64) {
        *self.sites.entry(domain.to_string()).or_default() += elapsed_ms;
    }

    pub fn close(&mut self, now: DateTime<Utc>) {
        self.end_time = Some(now);
        self.total_time = (now - self.start_time).num_milliseconds().max(0) as u64;
    }
}

pub const DEFAULT_FOCUS_DURATION: u32 = 25;

#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FocusModeState {
    pub is_active: bool,
    #[serde(default)]
    pub blocked_sites: Vec<String>,
    /// Minutes.
    #[serde(default)]
    pub duration: u32,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_time: Option<DateTime<Utc>>,
}

impl Default for FocusModeState {
    fn default() -> Self {
        Self {
            is_active: false,
            blocked_sites: vec![],
            duration: DEFAULT_FOCUS_DURATION,
            start_time: None,
            end_time: None,
        }
    }
}

impl FocusModeState {
    /// Blocked sites are stored the way [FocusModeState::blocks] compares them: trimmed,
    /// lowercase, without `www.`, empty entries dropped.
    pub fn started(duration: u32, blocked_sites: Vec<String>, now: DateTime<Utc>) -> Self {
        let blocked_sites = blocked_sites
            .iter()
            .map(|site| strip_www(&site.trim().to_lowercase()).to_string())
            .filter(|site| !site.is_empty())
            .collect();
        Self {
            is_active: true,
            blocked_sites,
            duration,
            start_time: Some(now),
            end_time: Some(now + Duration::minutes(duration as i64)),
        }
    }

    /// The state written when focus mode stops, explicitly or by its timer.
    pub fn stopped() -> Self {
        Self {
            is_active: false,
            blocked_sites: vec![],
            duration: 0,
            start_time: None,
            end_time: None,
        }
    }

    /// Active and not past its end. A state whose end passed while nobody was around to stop it
    /// does not block.
    pub fn is_blocking(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.end_time.is_none_or(|end| end > now)
    }

    pub fn blocks(&self, host: &str) -> bool {
        let host = strip_www(host);
        self.blocked_sites.iter().any(|site| site == host)
    }
}

#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct FocusDefaults {
    pub default_duration: u32,
    pub default_blocked_sites: Vec<String>,
}

impl Default for FocusDefaults {
    fn default() -> Self {
        Self {
            default_duration: DEFAULT_FOCUS_DURATION,
            default_blocked_sites: ["facebook.com", "twitter.com", "youtube.com", "instagram.com"]
                .map(String::from)
                .to_vec(),
        }
    }
}

#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncData {
    pub time_tracking: bool,
    pub focus_settings: bool,
    pub categories: bool,
}

impl Default for SyncData {
    fn default() -> Self {
        Self {
            time_tracking: true,
            focus_settings: true,
            categories: true,
        }
    }
}

/// Carried for the settings page. Nothing syncs.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudSync {
    pub enabled: bool,
    pub sync_data: SyncData,
}

#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub tracking_enabled: bool,
    /// Minutes of inactivity before the browser reports idle.
    pub idle_threshold: u32,
    /// Domain to category name overrides.
    pub categories: BTreeMap<String, String>,
    pub focus_mode: FocusDefaults,
    pub cloud_sync: CloudSync,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tracking_enabled: true,
            idle_threshold: 5,
            categories: BTreeMap::new(),
            focus_mode: FocusDefaults::default(),
            cloud_sync: CloudSync::default(),
        }
    }
}

/// Everything the store holds. Missing fields are always filled with defaults.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageData {
    pub sites: BTreeMap<String, SiteAggregate>,
    pub sessions: Vec<Session>,
    pub settings: Settings,
    pub focus_mode: FocusModeState,
}

impl StorageData {
    /// Applies derived values that are never trusted from disk.
    pub(crate) fn recompute_categories(mut self) -> Self {
        for site in self.sites.values_mut() {
            site.category = categorize(&site.domain, &self.settings.categories);
        }
        self
    }
}

/// A shallow partial update. Every `Some` field replaces the stored field as a whole.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct StoragePatch {
    pub sites: Option<BTreeMap<String, SiteAggregate>>,
    pub sessions: Option<Vec<Session>>,
    pub settings: Option<Settings>,
    pub focus_mode: Option<FocusModeState>,
}

impl StoragePatch {
    pub fn sites(sites: BTreeMap<String, SiteAggregate>) -> Self {
        Self {
            sites: Some(sites),
            ..Default::default()
        }
    }

    pub fn sessions(sessions: Vec<Session>) -> Self {
        Self {
            sessions: Some(sessions),
            ..Default::default()
        }
    }

    pub fn settings(settings: Settings) -> Self {
        Self {
            settings: Some(settings),
            ..Default::default()
        }
    }

    pub fn focus_mode(focus_mode: FocusModeState) -> Self {
        Self {
            focus_mode: Some(focus_mode),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_none()
            && self.sessions.is_none()
            && self.settings.is_none()
            && self.focus_mode.is_none()
    }
}
