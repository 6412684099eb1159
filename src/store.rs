// src/store.rs
//! Persistent key-value storage for the session, settings and oracle key.
//!
//! Reads and writes are best effort at the call sites: [`load`] and [`save`]
//! log failures and degrade to "nothing stored" / "not persisted".

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::fs;

pub const FOCUS_STATE_KEY: &str = "focusState";
pub const FOCUS_SETTINGS_KEY: &str = "focusSettings";
pub const ORACLE_KEY_KEY: &str = "oracleApiKey";

pub const DEFAULT_STATE_DIR: &str = "state";
pub const ENV_STATE_DIR: &str = "FOCUS_STATE_DIR";

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> anyhow::Result<()>;
}

/// Read and decode `key`; absent, unreadable or malformed values yield `None`.
pub async fn load<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    match store.get(key).await {
        Ok(Some(v)) => match serde_json::from_value(v) {
            Ok(t) => Some(t),
            Err(e) => {
                tracing::warn!(target: "store", key, error = %e, "stored value has unexpected shape, ignoring");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(target: "store", key, "read failed: {e:#}");
            None
        }
    }
}

/// Encode and write `value`; failures are logged, never returned.
pub async fn save<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) {
    let v = match serde_json::to_value(value) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(target: "store", key, error = %e, "encode failed");
            return;
        }
    };
    if let Err(e) = store.set(key, v).await {
        tracing::warn!(target: "store", key, "write failed: {e:#}");
    }
}

/// One pretty-printed JSON file per key under `dir`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `$FOCUS_STATE_DIR` or `state/`.
    pub fn from_env() -> Self {
        Self::new(std::env::var(ENV_STATE_DIR).unwrap_or_else(|_| DEFAULT_STATE_DIR.to_string()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path).await {
            Ok(s) => {
                let v = serde_json::from_str(&s)
                    .with_context(|| format!("parse {}", path.display()))?;
                Ok(Some(v))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
        }
    }

    async fn set(&self, key: &str, value: Value) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("state dir {}", self.dir.display()))?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&value)?)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("rename into {}", path.display()))?;
        Ok(())
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: Value) -> anyhow::Result<()> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Settings;

    #[tokio::test]
    async fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let a = JsonFileStore::new(dir.path().join("nested"));
        let settings = Settings {
            allowlist: vec!["docs.rs".into()],
            grace_duration_secs: 42,
        };
        save(&a, FOCUS_SETTINGS_KEY, &settings).await;

        let b = JsonFileStore::new(dir.path().join("nested"));
        let back: Settings = load(&b, FOCUS_SETTINGS_KEY).await.unwrap();
        assert_eq!(back, settings);
        assert!(load::<Settings>(&b, "missing").await.is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let s = JsonFileStore::new(dir.path());
        std::fs::write(dir.path().join("focusState.json"), b"{not json").unwrap();
        assert!(s.get(FOCUS_STATE_KEY).await.is_err());
        assert!(load::<serde_json::Value>(&s, FOCUS_STATE_KEY).await.is_none());
    }

    #[tokio::test]
    async fn memory_store_round_trip_and_shape_mismatch() {
        let s = MemoryStore::new();
        save(&s, ORACLE_KEY_KEY, &"k-123").await;
        assert_eq!(load::<String>(&s, ORACLE_KEY_KEY).await.as_deref(), Some("k-123"));
        assert!(load::<Settings>(&s, ORACLE_KEY_KEY).await.is_none());
    }

    #[test]
    fn keys_map_to_safe_file_names() {
        let s = JsonFileStore::new("/tmp/x");
        assert!(s.path_for("../evil").ends_with("___evil.json"));
    }
}
