use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::bail;
use data_access::DEFAULT_CHANNEL;
use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "usuarios.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub store_url: Option<String>,
    pub store_key: Option<String>,
    pub realtime_channel: String,
    pub database_url: Option<String>,
    pub export_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_url: None,
            store_key: None,
            realtime_channel: DEFAULT_CHANNEL.into(),
            database_url: None,
            export_dir: PathBuf::from("."),
        }
    }
}

/// Which store the console talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Hosted { url: String, key: String },
    Sqlite { database_url: String },
}

impl Settings {
    /// A configured `database_url` selects the local SQLite store.
    pub fn backend(&self) -> anyhow::Result<Backend> {
        if let Some(raw) = self.database_url.as_deref() {
            return Ok(Backend::Sqlite {
                database_url: normalize_database_url(raw),
            });
        }
        match (self.store_url.as_deref(), self.store_key.as_deref()) {
            (Some(url), Some(key)) if !url.trim().is_empty() && !key.trim().is_empty() => {
                Ok(Backend::Hosted {
                    url: url.trim().to_string(),
                    key: key.trim().to_string(),
                })
            }
            _ => bail!(
                "no store configured: set SUPABASE_URL and SUPABASE_KEY, or APP__DATABASE_URL for a local database"
            ),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    store_url: Option<String>,
    store_key: Option<String>,
    realtime_channel: Option<String>,
    database_url: Option<String>,
    export_dir: Option<PathBuf>,
}

/// Defaults, then the config file (if readable), then environment variables.
pub fn load_settings(config_path: Option<&Path>) -> Settings {
    let path = config_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        apply_file(&mut settings, &raw, path);
    }
    apply_env(&mut settings, |name| std::env::var(name).ok());

    settings
}

fn apply_file(settings: &mut Settings, raw: &str, path: &Path) {
    let file_cfg = match toml::from_str::<FileSettings>(raw) {
        Ok(file_cfg) => file_cfg,
        Err(err) => {
            warn!(path = %path.display(), %err, "config: ignoring unparseable file");
            return;
        }
    };

    if let Some(v) = file_cfg.store_url {
        settings.store_url = Some(v);
    }
    if let Some(v) = file_cfg.store_key {
        settings.store_key = Some(v);
    }
    if let Some(v) = file_cfg.realtime_channel {
        settings.realtime_channel = v;
    }
    if let Some(v) = file_cfg.database_url {
        settings.database_url = Some(v);
    }
    if let Some(v) = file_cfg.export_dir {
        settings.export_dir = v;
    }
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("SUPABASE_URL") {
        settings.store_url = Some(v);
    }
    if let Some(v) = var("APP__STORE_URL") {
        settings.store_url = Some(v);
    }

    if let Some(v) = var("SUPABASE_KEY") {
        settings.store_key = Some(v);
    }
    if let Some(v) = var("APP__STORE_KEY") {
        settings.store_key = Some(v);
    }

    if let Some(v) = var("APP__REALTIME_CHANNEL") {
        settings.realtime_channel = v;
    }

    if let Some(v) = var("APP__DATABASE_URL") {
        settings.database_url = Some(v).filter(|v| !v.trim().is_empty());
    }

    if let Some(v) = var("APP__EXPORT_DIR") {
        settings.export_dir = PathBuf::from(v);
    }
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
