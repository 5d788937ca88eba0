use std::{collections::HashMap, fs, path::Path, time::Duration};

use tracing::warn;

use crate::session::SessionOptions;

pub const DEFAULT_SETTINGS_FILE: &str = "content.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub persist_attachment_list_on_upload: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:3000/api".into(),
            request_timeout: Duration::from_secs(15),
            persist_attachment_list_on_upload: false,
        }
    }
}

impl Settings {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            persist_attachment_list_on_upload: self.persist_attachment_list_on_upload,
        }
    }
}

/// Defaults, then `content.toml` in the working directory, then the environment.
pub fn load_settings() -> Settings {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE))
}

pub fn load_settings_from(path: &Path) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        apply_file_config(&mut settings, &raw);
    }
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());

    settings
}

pub(crate) fn apply_file_config(settings: &mut Settings, raw: &str) {
    let file_cfg = match toml::from_str::<HashMap<String, toml::Value>>(raw) {
        Ok(file_cfg) => file_cfg,
        Err(err) => {
            warn!(error = %err, "ignoring unreadable settings file");
            return;
        }
    };

    if let Some(v) = file_cfg.get("api_base_url").and_then(toml::Value::as_str) {
        settings.api_base_url = normalize_base_url(v);
    }
    if let Some(secs) = file_cfg
        .get("request_timeout_secs")
        .and_then(toml::Value::as_integer)
        .and_then(|secs| u64::try_from(secs).ok())
    {
        settings.request_timeout = Duration::from_secs(secs);
    }
    if let Some(v) = file_cfg
        .get("persist_attachment_list_on_upload")
        .and_then(toml::Value::as_bool)
    {
        settings.persist_attachment_list_on_upload = v;
    }
}

pub(crate) fn apply_env_overrides(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = lookup("CONTENT_API_BASE_URL") {
        settings.api_base_url = normalize_base_url(&v);
    }
    if let Some(v) = lookup("APP__API_BASE_URL") {
        settings.api_base_url = normalize_base_url(&v);
    }

    if let Some(v) = lookup("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.trim().parse::<u64>() {
            settings.request_timeout = Duration::from_secs(parsed);
        }
    }

    if let Some(v) = lookup("APP__PERSIST_ATTACHMENT_LIST_ON_UPLOAD") {
        if let Ok(parsed) = v.trim().to_ascii_lowercase().parse::<bool>() {
            settings.persist_attachment_list_on_upload = parsed;
        }
    }
}

pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Settings::default().api_base_url;
    }
    trimmed.to_string()
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
