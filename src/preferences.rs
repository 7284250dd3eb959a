/*!
 # Preference persistence

 The record written to storage and the key-value stores it is written to.

 Only the configuration is persisted: brightness, color, auto mode and the
 two schedule hours. Power state and the load flag are never saved.
*/

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, trace, warn};

use crate::state::LightState;
use crate::{Error, Result};

/// Persisted subset of [`LightState`]
///
/// Every field is optional so that partial or older records still load;
/// a missing field keeps the in-memory value. A field whose value cannot be
/// used is logged and treated as missing, without affecting the others.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(
        default,
        deserialize_with = "lenient_u8",
        skip_serializing_if = "Option::is_none"
    )]
    pub brightness: Option<u8>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub color: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub auto_mode: Option<bool>,
    #[serde(
        default,
        deserialize_with = "lenient_u8",
        skip_serializing_if = "Option::is_none"
    )]
    pub auto_start_hour: Option<u8>,
    #[serde(
        default,
        deserialize_with = "lenient_u8",
        skip_serializing_if = "Option::is_none"
    )]
    pub auto_end_hour: Option<u8>,
}

/// Decodes a field as `T`, or `None` if the stored value has another shape
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match serde_json::from_value(value.clone()) {
        Ok(decoded) => Ok(Some(decoded)),
        Err(e) => {
            warn!("Ignoring saved value {}: {}", value, e);
            Ok(None)
        }
    }
}

/// Like [`lenient`] for small integers, also taking whole floats such as `6.0`
fn lenient_u8<'de, D>(deserializer: D) -> std::result::Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let decoded = match &value {
        Value::Null => return Ok(None),
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
            .and_then(|whole| u8::try_from(whole).ok()),
        _ => None,
    };
    if decoded.is_none() {
        warn!("Ignoring saved value {}: not an integer in 0..=255", value);
    }
    Ok(decoded)
}

impl Preferences {
    /// Captures all five persisted fields of `state`
    pub fn from_state(state: &LightState) -> Self {
        Self {
            brightness: Some(state.brightness),
            color: Some(state.color.clone()),
            auto_mode: Some(state.auto_mode),
            auto_start_hour: Some(state.auto_start_hour),
            auto_end_hour: Some(state.auto_end_hour),
        }
    }

    /// Parses a stored blob
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Asynchronous key-value storage for preference blobs
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Returns the stored value, or `None` when the key has never been written
    async fn read(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value
    async fn write(&self, key: &str, value: &str) -> Result<()>;
}

/// In-process store, with switches to simulate storage failures
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding `value` under `key`
    pub fn with_entry(key: impl Into<String>, value: impl Into<String>) -> Self {
        let store = Self::default();
        store.entries.write().insert(key.into(), value.into());
        store
    }

    /// Current value under `key`, bypassing failure simulation
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PreferenceStore for MemoryStore {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(Error::Storage(format!("read of {key} refused")));
        }
        Ok(self.get(key))
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(Error::Storage(format!("write of {key} refused")));
        }
        self.entries.write().insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Stores each key as a JSON file inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File backing `key`. Characters outside `[A-Za-z0-9_-]` become `_`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

#[async_trait]
impl PreferenceStore for FileStore {
    #[instrument(skip(self))]
    async fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        trace!("Reading {}", path.display());
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No file at {}", path.display());
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, value))]
    async fn write(&self, key: &str, value: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        trace!("Writing {} bytes to {}", value.len(), path.display());
        // Overlapping saves each get their own temp file; rename keeps the
        // target whole
        let tmp = path.with_extension(format!(
            "json.{}.tmp",
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::write(&tmp, value).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_uses_camel_case_keys() {
        let state = LightState::default().turn_on();
        let json = Preferences::from_state(&state).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "brightness": 50,
                "color": "#FFFFFF",
                "autoMode": false,
                "autoStartHour": 18,
                "autoEndHour": 7,
            })
        );
    }

    #[test]
    fn missing_and_null_fields_parse_as_absent() {
        let prefs = Preferences::parse(r#"{"brightness": 80, "color": null}"#).unwrap();
        assert_eq!(
            prefs,
            Preferences {
                brightness: Some(80),
                ..Default::default()
            }
        );
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let prefs = Preferences::parse(r#"{"isOn": true, "autoMode": true}"#).unwrap();
        assert_eq!(prefs.auto_mode, Some(true));
        assert_eq!(prefs.brightness, None);
    }

    #[test]
    fn malformed_blob_is_an_error() {
        assert!(matches!(Preferences::parse("{not json"), Err(Error::Json(_))));
        assert!(Preferences::parse("42").is_err());
    }

    #[test]
    fn unusable_field_falls_back_alone() {
        let prefs = Preferences::parse(
            r##"{"brightness":"bright","color":"#FF6B6B","autoMode":"yes","autoStartHour":-3,"autoEndHour":6}"##,
        )
        .unwrap();
        assert_eq!(
            prefs,
            Preferences {
                color: Some("#FF6B6B".into()),
                auto_end_hour: Some(6),
                ..Default::default()
            }
        );
    }

    #[test]
    fn whole_floats_are_accepted_for_numbers() {
        let prefs =
            Preferences::parse(r#"{"brightness":70.0,"autoStartHour":20,"autoEndHour":6.0}"#).unwrap();
        assert_eq!(prefs.brightness, Some(70));
        assert_eq!(prefs.auto_start_hour, Some(20));
        assert_eq!(prefs.auto_end_hour, Some(6));

        let fractional = Preferences::parse(r#"{"brightness":70.5,"autoEndHour":300}"#).unwrap();
        assert_eq!(fractional.brightness, None);
        assert_eq!(fractional.auto_end_hour, None);
    }

    #[tokio::test]
    async fn memory_store_reads_back_writes() {
        let store = MemoryStore::new();
        assert_eq!(store.read("k").await.unwrap(), None);

        store.write("k", "one").await.unwrap();
        store.write("k", "two").await.unwrap();
        assert_eq!(store.read("k").await.unwrap().as_deref(), Some("two"));
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn memory_store_failure_switches() {
        let store = MemoryStore::with_entry("k", "v");
        store.set_fail_reads(true);
        store.set_fail_writes(true);

        assert!(matches!(store.read("k").await, Err(Error::Storage(_))));
        assert!(matches!(store.write("k", "x").await, Err(Error::Storage(_))));
        assert_eq!(store.get("k").as_deref(), Some("v"));
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn file_names_are_sanitized() {
        let store = FileStore::new("/tmp/prefs");
        assert_eq!(
            store.path_for("@toggle_light_preferences"),
            PathBuf::from("/tmp/prefs/_toggle_light_preferences.json")
        );
        assert_eq!(store.path_for("a/b c"), PathBuf::from("/tmp/prefs/a_b_c.json"));
    }

    #[tokio::test]
    async fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested"));

        assert_eq!(store.read("@key").await.unwrap(), None);
        store.write("@key", r#"{"brightness":10}"#).await.unwrap();
        assert_eq!(
            store.read("@key").await.unwrap().as_deref(),
            Some(r#"{"brightness":10}"#)
        );
    }

    #[tokio::test]
    async fn file_store_reports_unreadable_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        // A directory where the file should be
        std::fs::create_dir(store.path_for("key")).unwrap();

        assert!(matches!(store.read("key").await, Err(Error::Io(_))));
    }
}
