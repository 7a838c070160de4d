use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex,
};

use anyhow::{bail, Result};
use serde_json::Value;

use super::{
    entities::{StorageData, StoragePatch},
    store::{decode_fields, encode_patch, RawFields, Store},
};

/// In-memory [Store] for tests. Every call yields to the scheduler first, like real I/O would,
/// so interleavings between handlers show up.
#[derive(Default)]
pub struct MemoryStore {
    fields: Mutex<RawFields>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn with_fields(fields: Value) -> Self {
        let Value::Object(fields) = fields else {
            panic!("fields must be a JSON object");
        };
        Self {
            fields: Mutex::new(fields),
            ..Default::default()
        }
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn raw(&self, field: &str) -> Option<Value> {
        self.fields.lock().unwrap().get(field).cloned()
    }
}

impl Store for MemoryStore {
    async fn read(&self) -> Result<StorageData> {
        tokio::task::yield_now().await;
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("simulated read failure");
        }
        let raw = self.fields.lock().unwrap().clone();
        Ok(decode_fields(raw))
    }

    async fn write(&self, patch: StoragePatch) -> Result<()> {
        tokio::task::yield_now().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("simulated write failure");
        }
        let encoded = encode_patch(patch)?;
        let mut fields = self.fields.lock().unwrap();
        for (name, value) in encoded {
            fields.insert(name.to_string(), value);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
