use std::path::PathBuf;

use anyhow::{Context, Result};
use fs4::tokio::AsyncFileExt;
use serde_json::Value;
use tracing::warn;

use crate::fs::operations::{open_for_update, overwrite, read_all, read_locked};

use super::{
    entities::{StorageData, StoragePatch},
    store::{decode_fields, encode_patch, RawFields, Store},
};

/// Fallback layout: all fields serialized together into one JSON object. A write merges its
/// fields into the existing blob under an exclusive lock.
pub struct BlobStore {
    path: PathBuf,
}

impl BlobStore {
    pub fn new(path: PathBuf) -> Result<Self, std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Ok(Self { path })
    }

    fn parse_blob(&self, contents: &str) -> RawFields {
        if contents.trim().is_empty() {
            return RawFields::new();
        }
        match serde_json::from_str::<Value>(contents) {
            Ok(Value::Object(fields)) => fields,
            Ok(other) => {
                warn!("Storage blob {:?} is not an object: {other}", self.path);
                RawFields::new()
            }
            Err(e) => {
                warn!("Storage blob {:?} is corrupted, ignoring it: {e}", self.path);
                RawFields::new()
            }
        }
    }

    async fn merge_into_file(&self, fields: Vec<(&'static str, Value)>) -> Result<()> {
        let mut file = open_for_update(&self.path).await?;
        file.lock_exclusive()?;

        let result = async {
            let mut blob = self.parse_blob(&read_all(&mut file).await?);
            for (name, value) in fields {
                blob.insert(name.to_string(), value);
            }
            overwrite(&mut file, &serde_json::to_vec(&blob)?).await?;
            anyhow::Ok(())
        }
        .await;

        file.unlock_async().await?;
        result
    }
}

impl Store for BlobStore {
    async fn read(&self) -> Result<StorageData> {
        let contents = read_locked(&self.path)
            .await
            .with_context(|| format!("Failed to read {:?}", self.path))?;
        let raw = contents
            .map(|contents| self.parse_blob(&contents))
            .unwrap_or_default();
        Ok(decode_fields(raw))
    }

    async fn write(&self, patch: StoragePatch) -> Result<()> {
        let fields = encode_patch(patch)?;
        if fields.is_empty() {
            return Ok(());
        }
        self.merge_into_file(fields)
            .await
            .with_context(|| format!("Failed to write {:?}", self.path))
    }
}
