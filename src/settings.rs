use std::{fs, path::PathBuf};

use serde_json::{Map, Value};

use crate::{
    core::{restrict_file_permissions, settings_file},
    debug_log, unique_time_suffix,
};

/// Durable store for non-secret strings. Synchronous; values survive process
/// restarts.
pub(crate) trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), String>;
}

/// File-backed settings store: a flat JSON string map in the user config dir.
pub(crate) struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub(crate) fn open_default() -> Result<Self, String> {
        Ok(Self {
            path: settings_file()?,
        })
    }

    #[cfg(test)]
    pub(crate) fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_all(&self) -> Result<Map<String, Value>, String> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|error| format!("Failed to read settings: {error}"))?;
        serde_json::from_str::<Map<String, Value>>(&content)
            .map_err(|error| format!("Failed to parse settings: {error}"))
    }

    fn write_all(&self, entries: &Map<String, Value>) -> Result<(), String> {
        let content = serde_json::to_string_pretty(entries)
            .map_err(|error| format!("Failed to serialize settings: {error}"))?;

        // Write to a sibling temp file and rename so a crash mid-write never
        // leaves a truncated settings file behind.
        let tmp_path = self
            .path
            .with_extension(format!("json.tmp-{}", unique_time_suffix()));
        fs::write(&tmp_path, content)
            .map_err(|error| format!("Failed to write settings: {error}"))?;
        restrict_file_permissions(&tmp_path);
        fs::rename(&tmp_path, &self.path)
            .map_err(|error| format!("Failed to replace settings file: {error}"))?;
        restrict_file_permissions(&self.path);
        Ok(())
    }
}

impl SettingsStore for JsonSettingsStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.read_all() {
            Ok(entries) => entries
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string),
            Err(error) => {
                debug_log(&format!("settings get {key:?} failed: {error}"));
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        let mut entries = self.read_all().unwrap_or_default();
        entries.insert(key.to_string(), Value::String(value.to_string()));
        self.write_all(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (PathBuf, JsonSettingsStore) {
        let dir = std::env::temp_dir().join(format!(
            "access-gate-settings-{}-{}",
            std::process::id(),
            unique_time_suffix()
        ));
        fs::create_dir_all(&dir).unwrap();
        let store = JsonSettingsStore::at_path(dir.join("settings.json"));
        (dir, store)
    }

    #[test]
    fn missing_key_is_none() {
        let (dir, store) = temp_store();
        assert_eq!(store.get("storedTrustedURL"), None);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn set_then_get_round_trips() {
        let (dir, store) = temp_store();
        store
            .set("storedTrustedURL", "https://dest.example/x")
            .unwrap();
        assert_eq!(
            store.get("storedTrustedURL").as_deref(),
            Some("https://dest.example/x")
        );
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn set_overwrites_existing_value() {
        let (dir, store) = temp_store();
        store.set("key", "first").unwrap();
        store.set("key", "second").unwrap();
        assert_eq!(store.get("key").as_deref(), Some("second"));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn values_survive_reopening_the_store() {
        let (dir, store) = temp_store();
        store.set("key", "value").unwrap();
        let path = dir.join("settings.json");
        drop(store);

        let reopened = JsonSettingsStore::at_path(path);
        assert_eq!(reopened.get("key").as_deref(), Some("value"));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn set_preserves_unrelated_keys() {
        let (dir, store) = temp_store();
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        assert_eq!(store.get("a").as_deref(), Some("1"));
        assert_eq!(store.get("b").as_deref(), Some("2"));
        let _ = fs::remove_dir_all(dir);
    }
}
