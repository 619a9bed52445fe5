//! Persistent preference store
//!
//! The browser build keeps preferences in local storage under a slug
//! derived from the page URL; here the same key/value layout lives in a
//! JSON file. Values keep the storage string conventions: booleans as
//! `"true"` / `"false"`, integers as decimal strings.
//!
//! The store buffers writes; [`PreferenceStore::commit`] flushes to disk.
//! The reconciler commits before its delta is handed out, so a `SETTINGS`
//! message never precedes its persisted state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Error;
use crate::types::StreamMode;
use crate::Result;

/// Derive the storage namespace slug from a page URL.
///
/// Every non-alphanumeric character maps to `_`, matching the persisted
/// key layout of the browser build.
pub fn storage_slug(url: &str) -> String {
    url.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Slug-prefixed key/value preference store
#[derive(Debug)]
pub struct PreferenceStore {
    prefix: String,
    path: Option<PathBuf>,
    values: BTreeMap<String, String>,
}

impl PreferenceStore {
    /// Open (or create) a file-backed store for the given namespace.
    pub fn open(path: impl Into<PathBuf>, prefix: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let values = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)
                .map_err(|e| Error::Store(format!("corrupt store {}: {e}", path.display())))?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            prefix: prefix.into(),
            path: Some(path),
            values,
        })
    }

    /// In-memory store, used by tests and ephemeral sessions.
    pub fn in_memory(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            path: None,
            values: BTreeMap::new(),
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}_{}", self.prefix, key)
    }

    /// Raw string read, prefix applied.
    pub fn get_raw(&self, key: &str) -> Option<&str> {
        self.values.get(&self.full_key(key)).map(String::as_str)
    }

    /// Raw string write, prefix applied. Returns whether the stored value
    /// changed.
    pub fn set_raw(&mut self, key: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        let full = self.full_key(key);
        let changed = self.values.get(&full) != Some(&value);
        if changed {
            debug!(key = %full, %value, "preference updated");
            self.values.insert(full, value);
        }
        changed
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(&self.full_key(key))
    }

    pub fn remove(&mut self, key: &str) {
        self.values.remove(&self.full_key(key));
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get_raw(key) {
            Some("true") => Some(true),
            Some("false") => Some(false),
            _ => None,
        }
    }

    pub fn set_bool(&mut self, key: &str, value: bool) -> bool {
        self.set_raw(key, if value { "true" } else { "false" })
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get_raw(key).and_then(|raw| raw.parse().ok())
    }

    pub fn set_int(&mut self, key: &str, value: i64) -> bool {
        self.set_raw(key, value.to_string())
    }

    /// Stream mode lives beside the settings keys at `<prefix>_stream_mode`.
    pub fn stream_mode(&self) -> Option<StreamMode> {
        self.get_raw("stream_mode").and_then(StreamMode::from_str_opt)
    }

    pub fn set_stream_mode(&mut self, mode: StreamMode) -> bool {
        self.set_raw("stream_mode", mode.as_str())
    }

    /// Flush buffered values to the backing file, if any.
    pub fn commit(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(&self.values)?;
        write_atomic(path, raw.as_bytes())
    }
}

// Write via a sibling temp file + rename so a crash mid-write never leaves
// a truncated store behind.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
