use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::parser::{DEFAULT_DELIMITER, Defaults, ParseOptions};
use crate::render::HIGHLIGHTERS;
use crate::session::{AudiencePolicy, SessionOptions};
use crate::sync::HubSettings;

const FILENAME: &str = "config.yaml";
const APP_DIR: &str = "deckhand";

const TRANSITIONS: &[&str] = &["fade", "slide", "spatial", "none"];

const VALID_KEYS: &str = "defaults.theme, defaults.transition, defaults.highlighter, \
    defaults.drawings_persist, defaults.delimiter, sync.audience_policy, sync.client_queue, \
    sync.client_timeout_ms, sync.max_backlog";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DefaultsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlighter: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drawings_persist: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience_policy: Option<AudiencePolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_queue: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_backlog: Option<usize>,
}

impl Config {
    pub fn path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|d| d.join(APP_DIR).join(FILENAME))
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                anyhow::anyhow!("No config found. Run `deckhand config show` to see defaults.")
            } else {
                anyhow::anyhow!("Failed to read config: {e}")
            }
        })?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("using built-in defaults: {e}");
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        let contents = format!("# deckhand configuration\n{yaml}");
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "defaults.theme" => {
                match value {
                    "light" | "dark" | "default" => {}
                    _ => anyhow::bail!(
                        "Invalid theme: {value}. Must be 'light', 'dark', or 'default'."
                    ),
                }
                self.defaults_mut().theme = Some(value.to_string());
            }
            "defaults.transition" => {
                if !TRANSITIONS.contains(&value) {
                    anyhow::bail!(
                        "Invalid transition: {value}. Must be 'fade', 'slide', 'spatial', or 'none'."
                    );
                }
                self.defaults_mut().transition = Some(value.to_string());
            }
            "defaults.highlighter" => {
                if !HIGHLIGHTERS.contains(&value) {
                    anyhow::bail!(
                        "Invalid highlighter: {value}. Must be one of: {}.",
                        HIGHLIGHTERS.join(", ")
                    );
                }
                self.defaults_mut().highlighter = Some(value.to_string());
            }
            "defaults.drawings_persist" => {
                let persist = parse_bool(value).ok_or_else(|| {
                    anyhow::anyhow!("Invalid drawings_persist: {value}. Must be 'true' or 'false'.")
                })?;
                self.defaults_mut().drawings_persist = Some(persist);
            }
            "defaults.delimiter" => {
                let value = value.trim();
                if value.is_empty() || value.starts_with('@') || value.starts_with('#') {
                    anyhow::bail!(
                        "Invalid delimiter: '{value}'. It must be non-empty and not look like a directive or heading."
                    );
                }
                self.defaults_mut().delimiter = Some(value.to_string());
            }
            "sync.audience_policy" => {
                let policy: AudiencePolicy = value.parse().map_err(|e: String| anyhow::anyhow!(e))?;
                self.sync_mut().audience_policy = Some(policy);
            }
            "sync.client_queue" => {
                self.sync_mut().client_queue = Some(parse_positive(key, value)?);
            }
            "sync.client_timeout_ms" => {
                self.sync_mut().client_timeout_ms = Some(parse_positive(key, value)? as u64);
            }
            "sync.max_backlog" => {
                self.sync_mut().max_backlog = Some(parse_positive(key, value)?);
            }
            _ => anyhow::bail!("Unknown config key: {key}. Valid keys: {VALID_KEYS}"),
        }
        Ok(())
    }

    fn defaults_mut(&mut self) -> &mut DefaultsConfig {
        self.defaults.get_or_insert_with(DefaultsConfig::default)
    }

    fn sync_mut(&mut self) -> &mut SyncConfig {
        self.sync.get_or_insert_with(SyncConfig::default)
    }

    /// Session settings: built-in defaults overlaid with this config.
    pub fn session_options(&self, renderer: &str) -> SessionOptions {
        let mut defaults = Defaults::default();
        let mut delimiter = DEFAULT_DELIMITER.to_string();
        if let Some(d) = &self.defaults {
            if let Some(theme) = &d.theme {
                defaults.theme = theme.clone();
            }
            if let Some(transition) = &d.transition {
                defaults.transition = transition.clone();
            }
            if let Some(highlighter) = &d.highlighter {
                defaults.highlighter = highlighter.clone();
            }
            if let Some(persist) = d.drawings_persist {
                defaults.drawings_persist = persist;
            }
            if let Some(custom) = &d.delimiter {
                delimiter = custom.clone();
            }
        }

        let mut hub = HubSettings::default();
        let mut audience_policy = AudiencePolicy::default();
        if let Some(s) = &self.sync {
            if let Some(policy) = s.audience_policy {
                audience_policy = policy;
            }
            if let Some(queue) = s.client_queue {
                hub.queue_capacity = queue;
            }
            if let Some(ms) = s.client_timeout_ms {
                hub.client_timeout = Duration::from_millis(ms);
            }
            if let Some(backlog) = s.max_backlog {
                hub.max_backlog = backlog;
            }
        }

        SessionOptions {
            parse: ParseOptions {
                delimiter,
                defaults,
            },
            hub,
            audience_policy,
            renderer: renderer.to_string(),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => Some(true),
        "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_positive(key: &str, value: &str) -> Result<usize> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => anyhow::bail!("Invalid {key}: {value}. Must be a positive integer."),
    }
}
