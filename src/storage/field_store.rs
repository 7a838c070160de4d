use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, warn};

use crate::fs::operations::{read_locked, write_locked};

use super::{
    entities::{StorageData, StoragePatch},
    store::{decode_fields, encode_patch, RawFields, Store, FIELDS},
};

/// Key-value layout: every top-level field is its own JSON document, `<dir>/<field>.json`.
/// Writing one field never rewrites the others.
pub struct FieldStore {
    dir: PathBuf,
}

impl FieldStore {
    pub fn new(dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&dir)?;

        Ok(Self { dir })
    }

    fn field_path(&self, field: &str) -> PathBuf {
        self.dir.join(format!("{field}.json"))
    }

    async fn read_field(&self, field: &str) -> Result<Option<Value>> {
        let path = self.field_path(field);
        let Some(contents) = read_locked(&path)
            .await
            .with_context(|| format!("Failed to read {path:?}"))?
        else {
            return Ok(None);
        };

        if contents.trim().is_empty() {
            return Ok(None);
        }

        match serde_json::from_str(&contents) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                // Might happen if a write got cut off. Treated as missing.
                warn!("Field file {path:?} is not valid json: {e}");
                Ok(None)
            }
        }
    }
}

impl Store for FieldStore {
    async fn read(&self) -> Result<StorageData> {
        let mut raw = RawFields::new();
        for field in FIELDS {
            if let Some(value) = self.read_field(field).await? {
                raw.insert(field.to_string(), value);
            }
        }
        Ok(decode_fields(raw))
    }

    async fn write(&self, patch: StoragePatch) -> Result<()> {
        for (field, value) in encode_patch(patch)? {
            let path = self.field_path(field);
            debug!("Writing field {field} to {path:?}");
            write_locked(&path, &serde_json::to_vec(&value)?)
                .await
                .with_context(|| format!("Failed to write {path:?}"))?;
        }
        Ok(())
    }
}
