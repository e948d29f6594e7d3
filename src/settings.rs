use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, RwLock};

use crate::expand::{DEFAULT_LOOKAHEAD, ExpansionConfig, GenerationPreferences};

pub const CURRENT_VERSION: u32 = 2;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "unslide";

/// Environment variable that replaces `backend_url` from the file
pub const BACKEND_URL_ENV: &str = "BACKEND_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    #[serde(default = "default_expand_path")]
    pub expand_path: String,

    #[serde(default = "default_topic")]
    pub topic: String,

    #[serde(default = "default_lookahead")]
    pub prefetch_lookahead: usize,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_backend_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_expand_path() -> String {
    "/api/v1/expand".to_string()
}

fn default_topic() -> String {
    "General".to_string()
}

fn default_lookahead() -> usize {
    DEFAULT_LOOKAHEAD
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            backend_url: default_backend_url(),
            expand_path: default_expand_path(),
            topic: default_topic(),
            prefetch_lookahead: default_lookahead(),
            connect_timeout_secs: default_connect_timeout(),
            provider: None,
            model: None,
            api_key: None,
        }
    }
}

impl Settings {
    /// Values handed to the expansion service
    #[must_use]
    pub fn expansion_config(&self) -> ExpansionConfig {
        ExpansionConfig {
            topic: self.topic.clone(),
            lookahead: self.prefetch_lookahead,
            preferences: GenerationPreferences {
                provider: self.provider.clone(),
                model: self.model.clone(),
                api_key: self.api_key.clone(),
            },
        }
    }
}

static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Load settings from `path` (or the default location) into the global.
///
/// A missing file is created with defaults. `BACKEND_URL` is applied last.
pub fn load_settings(path: Option<&Path>) {
    load_settings_with_override(path, std::env::var(BACKEND_URL_ENV).ok());
}

fn load_settings_with_override(path: Option<&Path>, backend_url: Option<String>) {
    let path = path.map(Path::to_path_buf).or_else(default_config_path);
    match path {
        Some(path) if path.exists() => load_settings_from_path(&path),
        Some(path) => {
            info!("Settings file not found, creating with defaults at {path:?}");
            if let Ok(settings) = SETTINGS.read() {
                save_settings_to_file(&settings, &path);
            }
        }
        None => warn!("Could not determine config directory, using default settings"),
    }

    if let Some(url) = backend_url.as_deref().map(str::trim) {
        if !url.is_empty() {
            debug!("Backend URL taken from {BACKEND_URL_ENV}");
            set_backend_url(url);
        }
    }
}

fn load_settings_from_path(path: &Path) {
    match fs::read_to_string(path) {
        Ok(content) => match parse_settings(&content) {
            Ok(mut settings) => {
                debug!("Loaded settings from {path:?}");

                if settings.version < CURRENT_VERSION {
                    migrate_settings(&mut settings);
                    save_settings_to_file(&settings, path);
                }

                if let Ok(mut global) = SETTINGS.write() {
                    *global = settings;
                }
            }
            Err(e) => {
                error!("Failed to parse settings file {path:?}: {e}");
            }
        },
        Err(e) => {
            error!("Failed to read settings file {path:?}: {e}");
        }
    }
}

pub fn parse_settings(content: &str) -> Result<Settings, serde_yaml::Error> {
    serde_yaml::from_str(content)
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );

    // v1 stored the full endpoint in backend_url
    if settings.version < 2 {
        if let Some(base) = settings.backend_url.strip_suffix(&settings.expand_path) {
            settings.backend_url = base.to_string();
        }
    }

    settings.version = CURRENT_VERSION;
}

fn save_settings_to_file(settings: &Settings, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    let content = generate_settings_yaml(settings);

    match fs::write(path, content) {
        Ok(()) => debug!("Saved settings to {path:?}"),
        Err(e) => error!("Failed to save settings to {path:?}: {e}"),
    }
}

/// Quoted YAML scalar; user text may contain quotes or backslashes
fn yaml_string(value: &str) -> String {
    serde_yaml::to_string(value)
        .map(|rendered| rendered.trim_end().to_string())
        .unwrap_or_else(|_| format!("{value:?}"))
}

fn generate_settings_yaml(settings: &Settings) -> String {
    let mut content = String::new();

    content.push_str(&format!("version: {}\n", settings.version));
    content.push_str(&format!(
        "backend_url: {}\n",
        yaml_string(&settings.backend_url)
    ));
    content.push_str(&format!(
        "expand_path: {}\n",
        yaml_string(&settings.expand_path)
    ));
    content.push_str(&format!("topic: {}\n", yaml_string(&settings.topic)));
    content.push_str(&format!(
        "prefetch_lookahead: {}\n",
        settings.prefetch_lookahead
    ));
    content.push_str(&format!(
        "connect_timeout_secs: {}\n",
        settings.connect_timeout_secs
    ));
    content.push('\n');

    content.push_str(PREFERENCES_TEMPLATE);
    if let Some(provider) = &settings.provider {
        content.push_str(&format!("provider: {}\n", yaml_string(provider)));
    }
    if let Some(model) = &settings.model {
        content.push_str(&format!("model: {}\n", yaml_string(model)));
    }
    if let Some(api_key) = &settings.api_key {
        content.push_str(&format!("api_key: {}\n", yaml_string(api_key)));
    }

    content
}

const PREFERENCES_TEMPLATE: &str = r#"# ============================================================================
# Generation preferences
# ============================================================================
# Forwarded to the backend with every request. Leave unset to use the
# backend's defaults.
#
# Example:
#   provider: "groq"
#   model: "llama-3.3-70b-versatile"
#   api_key: "..."

"#;

// Public API for accessing/modifying settings

pub fn current() -> Settings {
    SETTINGS.read().map(|s| s.clone()).unwrap_or_default()
}

pub fn set_backend_url(url: &str) {
    if let Ok(mut settings) = SETTINGS.write() {
        settings.backend_url = url.to_string();
    }
}

pub fn set_topic(topic: &str) {
    if let Ok(mut settings) = SETTINGS.write() {
        settings.topic = topic.to_string();
    }
}

pub fn set_prefetch_lookahead(lookahead: usize) {
    if let Ok(mut settings) = SETTINGS.write() {
        settings.prefetch_lookahead = lookahead;
    }
}
