use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use shared::domain::DEFAULT_MAX_UPLOAD_BYTES;

use crate::controller::ControllerOptions;

pub const DEFAULT_SETTINGS_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub endpoint_url: String,
    pub max_upload_bytes: u64,
    /// `None` waits on the endpoint indefinitely.
    pub request_timeout_secs: Option<u64>,
    pub preferences_database_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint_url: "http://localhost:5000/predict".into(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            request_timeout_secs: Some(30),
            preferences_database_url: "sqlite://./data/preferences.db".into(),
        }
    }
}

impl Settings {
    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            max_upload_bytes: self.max_upload_bytes,
            request_timeout: self.request_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Defaults, then `client.toml` in the working directory, then environment.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();
    if let Err(err) = apply_settings_file(&mut settings, Path::new(DEFAULT_SETTINGS_FILE)) {
        tracing::warn!(error = %err, "ignoring unreadable settings file");
    }
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings
}

/// Overlays values from a flat TOML table. A missing file is not an error.
pub fn apply_settings_file(settings: &mut Settings, path: &Path) -> anyhow::Result<()> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()))
        }
    };
    let table = toml::from_str::<toml::Table>(&raw)
        .with_context(|| format!("failed to parse '{}'", path.display()))?;

    if let Some(v) = table_string(&table, "endpoint_url") {
        settings.endpoint_url = v;
    }
    if let Some(v) = table_string(&table, "max_upload_bytes") {
        settings.max_upload_bytes = v
            .parse()
            .with_context(|| format!("invalid max_upload_bytes '{v}'"))?;
    }
    if let Some(v) = table_string(&table, "request_timeout_secs") {
        settings.request_timeout_secs = parse_timeout_secs(&v)
            .with_context(|| format!("invalid request_timeout_secs '{v}'"))?;
    }
    if let Some(v) = table_string(&table, "preferences_database_url") {
        settings.preferences_database_url = v;
    }

    Ok(())
}

pub fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("PREDICT_ENDPOINT") {
        settings.endpoint_url = v;
    }
    if let Some(v) = lookup("APP__PREDICT_ENDPOINT") {
        settings.endpoint_url = v;
    }

    if let Some(v) = lookup("APP__MAX_UPLOAD_BYTES") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.max_upload_bytes = parsed;
        }
    }

    if let Some(v) = lookup("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = parse_timeout_secs(&v) {
            settings.request_timeout_secs = parsed;
        }
    }

    if let Some(v) = lookup("PREFERENCES_DATABASE_URL") {
        settings.preferences_database_url = v;
    }
    if let Some(v) = lookup("APP__PREFERENCES_DATABASE_URL") {
        settings.preferences_database_url = v;
    }
}

/// `0` disables the timeout.
fn parse_timeout_secs(raw: &str) -> Result<Option<u64>, std::num::ParseIntError> {
    let secs = raw.trim().parse::<u64>()?;
    Ok((secs > 0).then_some(secs))
}

fn table_string(table: &toml::Table, key: &str) -> Option<String> {
    match table.get(key)? {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
