use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::suggestion::DEFAULT_MAX_SUGGESTIONS;

pub const DEFAULT_SETTINGS_FILE: &str = "wordsuggest.json";
pub const DEFAULT_REMOTE_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_REMOTE_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 800;

/// Checked in order when the settings file carries no credential.
pub const API_KEY_ENV_VARS: [&str; 2] = ["WORDSUGGEST_API_KEY", "OPENAI_API_KEY"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub enabled: bool,
    pub timeout_ms: u64,
    pub model: String,
    /// Extra attempts after a transient failure, within the same time budget.
    pub max_retries: u32,
    pub temperature: f32,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_REMOTE_ENDPOINT.to_string(),
            api_key: None,
            enabled: true,
            timeout_ms: DEFAULT_REMOTE_TIMEOUT_MS,
            model: DEFAULT_REMOTE_MODEL.to_string(),
            max_retries: 1,
            temperature: 0.7,
        }
    }
}

impl RemoteSettings {
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Enabled, has a credential and a parseable endpoint. Anything else means local-only mode.
    pub fn is_usable(&self) -> bool {
        self.enabled && self.credential().is_some() && reqwest::Url::parse(&self.endpoint).is_ok()
    }

    /// Plain-http endpoints are only expected for loopback test servers.
    pub fn endpoint_warning(&self) -> Option<String> {
        let url = match reqwest::Url::parse(&self.endpoint) {
            Ok(url) => url,
            Err(e) => return Some(format!("Invalid remote endpoint '{}': {}", self.endpoint, e)),
        };
        let loopback = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
        if url.scheme() != "https" && !loopback {
            return Some(format!(
                "Remote endpoint '{}' does not use HTTPS; the credential is sent in clear text",
                self.endpoint
            ));
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub max_suggestions: usize,
    pub remote: RemoteSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexicon_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            max_suggestions: DEFAULT_MAX_SUGGESTIONS,
            remote: RemoteSettings::default(),
            lexicon_path: None,
            log_dir: None,
        }
    }
}

impl AppSettings {
    /// Replace out-of-range values with defaults, returning a warning per replacement.
    fn sanitize(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.max_suggestions == 0 {
            warnings.push("max_suggestions must be at least 1, using default".to_string());
            self.max_suggestions = DEFAULT_MAX_SUGGESTIONS;
        }
        if self.remote.timeout_ms == 0 {
            warnings.push("remote.timeout_ms must be positive, using default".to_string());
            self.remote.timeout_ms = DEFAULT_REMOTE_TIMEOUT_MS;
        }
        warnings
    }

    /// Fill a missing credential from the environment. Never persisted.
    /// Returns the variable the credential came from.
    fn apply_env_overrides<F>(&mut self, lookup: F) -> Option<&'static str>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.remote.credential().is_some() {
            return None;
        }
        for var in API_KEY_ENV_VARS {
            if let Some(key) = lookup(var).filter(|k| !k.trim().is_empty()) {
                self.remote.api_key = Some(key);
                return Some(var);
            }
        }
        None
    }
}

/// Settings plus the diagnostics gathered while loading them.
///
/// Loading happens before tracing is up (the log directory is itself a setting), so
/// nothing is logged during the load; call [`LoadedSettings::log_diagnostics`] once
/// the subscriber is installed.
#[derive(Debug, Clone)]
pub struct LoadedSettings {
    pub settings: AppSettings,
    pub path: PathBuf,
    pub created: bool,
    pub credential_source: Option<&'static str>,
    pub warnings: Vec<String>,
}

impl LoadedSettings {
    pub fn log_diagnostics(&self) {
        if self.created {
            info!(path = %self.path.display(), "Created default settings file");
        } else {
            debug!(path = %self.path.display(), "Loaded settings");
        }
        if let Some(source) = self.credential_source {
            debug!(source, "Using remote credential from environment");
        }
        for warning in &self.warnings {
            warn!("{}", warning);
        }
    }
}

pub fn get_default_settings() -> AppSettings {
    AppSettings::default()
}

/// Read settings from `path`, creating the file with defaults when missing.
pub fn load_or_create_app_settings(path: &Path) -> Result<LoadedSettings> {
    let created = !path.exists();
    let mut settings = if created {
        let settings = get_default_settings();
        write_settings(path, &settings)?;
        settings
    } else {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?
    };

    let mut warnings = settings.sanitize();
    let credential_source = settings.apply_env_overrides(|var| std::env::var(var).ok());
    warnings.extend(settings.remote.endpoint_warning());

    Ok(LoadedSettings {
        settings,
        path: path.to_path_buf(),
        created,
        credential_source,
        warnings,
    })
}

pub fn write_settings(path: &Path, settings: &AppSettings) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create settings directory {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(settings)?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write settings file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracing_config::CapturedLogs;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let loaded = load_or_create_app_settings(&path).unwrap();
        assert!(loaded.created);
        let settings = loaded.settings;
        assert!(path.exists());
        assert_eq!(settings.max_suggestions, 5);
        assert_eq!(settings.remote.timeout_ms, 800);

        let written = fs::read_to_string(&path).unwrap();
        assert!(!written.contains("api_key"));
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "max_suggestions": 3, "remote": { "enabled": false, "api_key": "sk-test" } }"#,
        )
        .unwrap();

        let loaded = load_or_create_app_settings(&path).unwrap();
        assert!(!loaded.created);
        let settings = loaded.settings;
        assert_eq!(settings.max_suggestions, 3);
        assert!(!settings.remote.enabled);
        assert_eq!(settings.remote.endpoint, DEFAULT_REMOTE_ENDPOINT);
        assert_eq!(settings.remote.credential(), Some("sk-test"));
        assert!(!settings.remote.is_usable());
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ max_suggestions: ").unwrap();
        assert!(load_or_create_app_settings(&path).is_err());
    }

    #[test]
    fn sanitize_replaces_zero_values() {
        let mut settings = AppSettings {
            max_suggestions: 0,
            ..Default::default()
        };
        settings.remote.timeout_ms = 0;
        assert_eq!(settings.sanitize().len(), 2);
        assert_eq!(settings.max_suggestions, DEFAULT_MAX_SUGGESTIONS);
        assert_eq!(settings.remote.timeout_ms, DEFAULT_REMOTE_TIMEOUT_MS);
    }

    #[test]
    fn env_credential_fills_missing_key_in_order() {
        let mut settings = AppSettings::default();
        let source = settings.apply_env_overrides(|var| match var {
            "WORDSUGGEST_API_KEY" => Some("  ".to_string()),
            "OPENAI_API_KEY" => Some("sk-env".to_string()),
            _ => None,
        });
        assert_eq!(source, Some("OPENAI_API_KEY"));
        assert_eq!(settings.remote.credential(), Some("sk-env"));
        assert!(settings.remote.is_usable());
    }

    #[test]
    fn env_does_not_override_file_credential() {
        let mut settings = AppSettings::default();
        settings.remote.api_key = Some("sk-file".to_string());
        assert_eq!(settings.apply_env_overrides(|_| Some("sk-env".to_string())), None);
        assert_eq!(settings.remote.credential(), Some("sk-file"));
    }

    #[test]
    fn blank_credential_is_not_usable() {
        let remote = RemoteSettings {
            api_key: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(remote.credential(), None);
        assert!(!remote.is_usable());
    }

    #[test]
    fn endpoint_warning_flags_plain_http_to_remote_hosts() {
        let mut remote = RemoteSettings::default();
        assert!(remote.endpoint_warning().is_none());

        remote.endpoint = "http://127.0.0.1:8080/v1/chat/completions".to_string();
        assert!(remote.endpoint_warning().is_none());

        remote.endpoint = "http://example.com/v1/chat/completions".to_string();
        assert!(remote.endpoint_warning().is_some());

        remote.endpoint = "not a url".to_string();
        assert!(remote.endpoint_warning().is_some());
        remote.api_key = Some("sk".to_string());
        assert!(!remote.is_usable());
    }

    #[test]
    fn load_warnings_are_logged_once_tracing_is_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "remote": { "endpoint": "http://example.com/v1/chat/completions", "timeout_ms": 0 } }"#,
        )
        .unwrap();

        let loaded = load_or_create_app_settings(&path).unwrap();
        assert_eq!(loaded.settings.remote.timeout_ms, DEFAULT_REMOTE_TIMEOUT_MS);
        assert_eq!(loaded.warnings.len(), 2);

        let logs = CapturedLogs::default();
        tracing::subscriber::with_default(logs.subscriber(), || loaded.log_diagnostics());

        let output = logs.contents();
        assert!(output.contains("remote.timeout_ms must be positive"), "{output}");
        assert!(output.contains("does not use HTTPS"), "{output}");
        assert!(output.contains("Loaded settings"), "{output}");
        assert_eq!(output.lines().filter(|l| l.contains("WARN")).count(), 2);
    }
}
