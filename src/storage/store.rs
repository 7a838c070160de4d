use std::{collections::BTreeMap, fmt::Display, future::Future, path::Path};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::categories::categorize;

use super::{
    blob_store::BlobStore,
    entities::{
        Session, SiteAggregate, StorageData, StoragePatch, FOCUS_MODE_FIELD, SESSIONS_FIELD,
        SESSION_RETENTION, SETTINGS_FIELD, SITES_FIELD,
    },
    field_store::FieldStore,
};

pub(crate) type RawFields = serde_json::Map<String, Value>;

pub(crate) const FIELDS: [&str; 4] = [SITES_FIELD, SESSIONS_FIELD, SETTINGS_FIELD, FOCUS_MODE_FIELD];

/// Durable mapping from field name to value.
///
/// `read` never fails because something is missing or malformed, only on I/O failure. `write`
/// replaces exactly the fields present in the patch.
pub trait Store {
    fn read(&self) -> impl Future<Output = Result<StorageData>> + Send;

    fn write(&self, patch: StoragePatch) -> impl Future<Output = Result<()>> + Send;
}

/// Builds [StorageData] out of raw JSON fields. A field that doesn't parse is dropped with a
/// warning and replaced by its default; the next write of that field clears it on disk.
pub(crate) fn decode_fields(mut raw: RawFields) -> StorageData {
    StorageData {
        sites: decode_entries(&mut raw, SITES_FIELD),
        sessions: decode_items(&mut raw, SESSIONS_FIELD),
        settings: decode_field(&mut raw, SETTINGS_FIELD),
        focus_mode: decode_field(&mut raw, FOCUS_MODE_FIELD),
    }
    .recompute_categories()
}

fn decode_field<T: DeserializeOwned + Default>(raw: &mut RawFields, name: &str) -> T {
    match raw.remove(name) {
        None | Some(Value::Null) => T::default(),
        Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
            warn!("Stored field {name} is corrupted, falling back to defaults: {e}");
            T::default()
        }),
    }
}

/// Decodes a map field one entry at a time. A bad entry is skipped so the rest of the history
/// survives the next read-modify-write.
fn decode_entries<T: DeserializeOwned>(raw: &mut RawFields, name: &str) -> BTreeMap<String, T> {
    match raw.remove(name) {
        Some(Value::Object(entries)) => entries
            .into_iter()
            .filter_map(|(key, value)| match serde_json::from_value(value) {
                Ok(entry) => Some((key, entry)),
                Err(e) => {
                    warn!("Dropping corrupted {name} entry {key}: {e}");
                    None
                }
            })
            .collect(),
        None | Some(Value::Null) => BTreeMap::new(),
        Some(other) => {
            warn!("Stored field {name} is not a map, falling back to defaults: {other}");
            BTreeMap::new()
        }
    }
}

/// List counterpart of [decode_entries].
fn decode_items<T: DeserializeOwned>(raw: &mut RawFields, name: &str) -> Vec<T> {
    match raw.remove(name) {
        Some(Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .filter_map(|(index, value)| match serde_json::from_value(value) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!("Dropping corrupted {name} entry {index}: {e}");
                    None
                }
            })
            .collect(),
        None | Some(Value::Null) => Vec::new(),
        Some(other) => {
            warn!("Stored field {name} is not a list, falling back to defaults: {other}");
            Vec::new()
        }
    }
}

/// Serializes the fields carried by a patch, in a stable order.
pub(crate) fn encode_patch(patch: StoragePatch) -> Result<Vec<(&'static str, Value)>> {
    let StoragePatch {
        sites,
        sessions,
        settings,
        focus_mode,
    } = patch;

    let mut fields = Vec::with_capacity(4);
    if let Some(sites) = sites {
        fields.push((SITES_FIELD, serde_json::to_value(sites)?));
    }
    if let Some(sessions) = sessions {
        fields.push((SESSIONS_FIELD, serde_json::to_value(sessions)?));
    }
    if let Some(settings) = settings {
        fields.push((SETTINGS_FIELD, serde_json::to_value(settings)?));
    }
    if let Some(focus_mode) = focus_mode {
        fields.push((FOCUS_MODE_FIELD, serde_json::to_value(focus_mode)?));
    }
    Ok(fields)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum StoreBackend {
    /// One JSON document per field, the layout of the extension's key-value storage.
    #[default]
    Fields,
    /// A single JSON blob holding every field.
    Blob,
}

impl Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::Fields => write!(f, "fields"),
            StoreBackend::Blob => write!(f, "blob"),
        }
    }
}

/// The on-disk store selected at startup.
pub enum LocalStore {
    Fields(FieldStore),
    Blob(BlobStore),
}

impl Store for LocalStore {
    async fn read(&self) -> Result<StorageData> {
        match self {
            LocalStore::Fields(store) => store.read().await,
            LocalStore::Blob(store) => store.read().await,
        }
    }

    async fn write(&self, patch: StoragePatch) -> Result<()> {
        match self {
            LocalStore::Fields(store) => store.write(patch).await,
            LocalStore::Blob(store) => store.write(patch).await,
        }
    }
}

pub fn open_store(app_dir: &Path, backend: StoreBackend) -> Result<LocalStore> {
    debug!("Opening {backend} store in {app_dir:?}");
    let store = match backend {
        StoreBackend::Fields => LocalStore::Fields(
            FieldStore::new(app_dir.join("store")).context("Failed to create store directory")?,
        ),
        StoreBackend::Blob => LocalStore::Blob(
            BlobStore::new(app_dir.join("app_storage.json"))
                .context("Failed to create store directory")?,
        ),
    };
    Ok(store)
}

/// Serializes every write and every read-modify-write against a [Store].
///
/// Handlers suspend while the store does I/O, so two commits could otherwise both read `sites`,
/// each add their own domain and write back, with the second write dropping the first update.
/// Within one process all writers share this wrapper. Between processes each write is still a
/// whole-field replacement, last writer wins.
pub struct SerializedStore<S> {
    inner: S,
    write_lock: Mutex<()>,
}

impl<S: Store> SerializedStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            write_lock: Mutex::new(()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub async fn read(&self) -> Result<StorageData> {
        self.inner.read().await
    }

    /// For readers that can live without data: failures are logged and defaults returned.
    pub async fn read_or_default(&self) -> StorageData {
        match self.inner.read().await {
            Ok(data) => data,
            Err(e) => {
                error!("Failed to read storage, using defaults {e:?}");
                StorageData::default()
            }
        }
    }

    pub async fn write(&self, patch: StoragePatch) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.inner.write(patch).await
    }

    /// Reads, lets `modify` build a patch out of the current data, and writes it, with no other
    /// write in between. Returns whether anything was written.
    pub async fn update<F>(&self, modify: F) -> Result<bool>
    where
        F: FnOnce(StorageData) -> Option<StoragePatch>,
    {
        let _guard = self.write_lock.lock().await;
        let data = self.inner.read().await?;
        match modify(data) {
            Some(patch) if !patch.is_empty() => {
                self.inner.write(patch).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Credits `elapsed_ms` to `domain`. Nothing is written while tracking is disabled in
    /// settings, in which case `false` is returned.
    pub async fn update_site_data(
        &self,
        domain: &str,
        elapsed_ms: u64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.update(|data| {
            if !data.settings.tracking_enabled {
                return None;
            }
            let mut sites = data.sites;
            let site = sites
                .entry(domain.to_string())
                .or_insert_with(|| SiteAggregate::new(domain, now));
            site.record(elapsed_ms, now);
            site.category = categorize(domain, &data.settings.categories);
            Some(StoragePatch::sites(sites))
        })
        .await
    }

    /// Appends a closed session to the history. Entries that started [SESSION_RETENTION] or more
    /// before `now` are dropped in the same write.
    pub async fn append_session(&self, session: Session, now: DateTime<Utc>) -> Result<()> {
        let cutoff = now - SESSION_RETENTION;
        self.update(move |data| {
            let mut sessions = data.sessions;
            sessions.push(session);
            sessions.retain(|session| session.start_time > cutoff);
            Some(StoragePatch::sessions(sessions))
        })
        .await
        .map(|_| ())
    }

    /// Removes a domain's aggregate. Returns whether it existed.
    pub async fn delete_site(&self, domain: &str) -> Result<bool> {
        self.update(|data| {
            let mut sites = data.sites;
            sites.remove(domain)?;
            Some(StoragePatch::sites(sites))
        })
        .await
    }
}
