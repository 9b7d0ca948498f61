use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use storage::Storage;
use tokio::sync::Mutex;

/// Storage slot holding the dark-mode flag.
pub const DISPLAY_PREFERENCE_KEY: &str = "darkMode";

/// Durable string key–value slots the controller persists UI preferences in.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

#[async_trait]
impl PreferenceStore for Storage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.get_preference(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_preference(key, value).await
    }
}

/// Process-local store; values vanish with the process.
#[derive(Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut values = HashMap::new();
        values.insert(key.into(), value.into());
        Self {
            values: Mutex::new(values),
        }
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub fn parse_display_preference(raw: &str) -> bool {
    let raw = raw.trim();
    raw.eq_ignore_ascii_case("true") || raw == "1"
}

pub fn encode_display_preference(enabled: bool) -> &'static str {
    if enabled {
        "true"
    } else {
        "false"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stored_flag_leniently() {
        assert!(parse_display_preference("true"));
        assert!(parse_display_preference(" TRUE "));
        assert!(parse_display_preference("1"));
        assert!(!parse_display_preference("false"));
        assert!(!parse_display_preference(""));
        assert!(!parse_display_preference("yes please"));
    }

    #[tokio::test]
    async fn sqlite_storage_backs_the_preference_store() {
        let storage = Storage::new("sqlite::memory:").await.expect("db");
        let store: &dyn PreferenceStore = &storage;
        assert_eq!(store.get(DISPLAY_PREFERENCE_KEY).await.expect("get"), None);
        store
            .set(DISPLAY_PREFERENCE_KEY, encode_display_preference(true))
            .await
            .expect("set");
        assert_eq!(
            store.get(DISPLAY_PREFERENCE_KEY).await.expect("get"),
            Some("true".to_string())
        );
    }
}
