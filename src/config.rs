#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_UPLOADS_PORT: u16 = 8080;
pub const DEFAULT_UPLOADS_HOST: &str = "127.0.0.1";
pub const DEFAULT_DATA_ROOT: &str = "uploads-data";
/// Channel used when nothing has been saved yet.
pub const DEFAULT_CHANNEL_ID: &str = "UCuAXFkgsw1L7xaCfnd5JJOw";
pub const DEFAULT_ITEM_COUNT: usize = 12;
pub const DEFAULT_COLUMN_COUNT: u8 = 3;
pub const DEFAULT_CACHE_HOURS: u32 = 2;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 15;
/// Lower bound on cache lifetimes so a bad `UPLOADS_CACHE_HOURS` cannot
/// hammer the feed endpoint.
pub const MIN_CACHE_SECS: i64 = 300;
pub const MAX_COLUMN_COUNT: u8 = 4;
/// Upper bound on `UPLOADS_CACHE_HOURS`, one century.
pub const MAX_CACHE_HOURS: u32 = 24 * 365 * 100;

/// How many videos to show, how to lay them out and how long to keep them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySettings {
    pub item_count: usize,
    pub column_count: u8,
    pub cache_hours: u32,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            item_count: DEFAULT_ITEM_COUNT,
            column_count: DEFAULT_COLUMN_COUNT,
            cache_hours: DEFAULT_CACHE_HOURS,
        }
    }
}

impl DisplaySettings {
    /// Cache lifetime in seconds, never below [`MIN_CACHE_SECS`].
    pub fn cache_ttl_secs(&self) -> i64 {
        (i64::from(self.cache_hours) * 3600).max(MIN_CACHE_SECS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    File,
}

impl CacheBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" | "ram" => Some(Self::Memory),
            "file" | "disk" | "fs" => Some(Self::File),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub data_root: PathBuf,
    pub uploads_port: u16,
    pub uploads_host: String,
    pub default_channel: String,
    pub display: DisplaySettings,
    pub fetch_timeout: Duration,
    pub cache_backend: CacheBackend,
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub data_root: Option<PathBuf>,
    pub uploads_port: Option<u16>,
    pub uploads_host: Option<String>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_runtime_settings(overrides: RuntimeOverrides) -> Result<RuntimeSettings> {
    resolve_runtime_settings_with(overrides, env_var_string)
}

fn resolve_runtime_settings_with(
    overrides: RuntimeOverrides,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<RuntimeSettings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    Ok(build_runtime_settings_with_overrides(
        &file_vars,
        env_lookup,
        overrides,
    ))
}

#[cfg(test)]
fn build_runtime_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> RuntimeSettings {
    build_runtime_settings_with_overrides(file_vars, env_lookup, RuntimeOverrides::default())
}

fn build_runtime_settings_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> RuntimeSettings {
    let lookup = |key: &str| lookup_value(key, file_vars, &env_lookup);
    let parsed = |key: &str| lookup(key).and_then(|value| value.trim().parse::<u64>().ok());

    let data_root = overrides
        .data_root
        .or_else(|| lookup("UPLOADS_DATA_ROOT").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_ROOT));
    let uploads_port = overrides
        .uploads_port
        .or_else(|| lookup("UPLOADS_PORT").and_then(|value| value.parse::<u16>().ok()))
        .unwrap_or(DEFAULT_UPLOADS_PORT);
    let uploads_host = overrides
        .uploads_host
        .and_then(|value| non_blank(&value))
        .or_else(|| lookup("UPLOADS_HOST"))
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_UPLOADS_HOST.to_string());
    let default_channel = lookup("UPLOADS_DEFAULT_CHANNEL")
        .and_then(|value| non_blank(&value))
        .unwrap_or_else(|| DEFAULT_CHANNEL_ID.to_string());

    let item_count = parsed("UPLOADS_ITEM_COUNT")
        .and_then(|value| usize::try_from(value).ok())
        .unwrap_or(DEFAULT_ITEM_COUNT);
    let column_count = parsed("UPLOADS_COLUMNS")
        .map(|value| value.clamp(1, u64::from(MAX_COLUMN_COUNT)) as u8)
        .unwrap_or(DEFAULT_COLUMN_COUNT);
    let cache_hours = parsed("UPLOADS_CACHE_HOURS")
        .map(|value| value.min(u64::from(MAX_CACHE_HOURS)) as u32)
        .unwrap_or(DEFAULT_CACHE_HOURS);
    let fetch_timeout = parsed("UPLOADS_FETCH_TIMEOUT_SECS")
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS));
    let cache_backend = lookup("UPLOADS_CACHE_BACKEND")
        .as_deref()
        .and_then(CacheBackend::parse)
        .unwrap_or(CacheBackend::File);

    RuntimeSettings {
        data_root,
        uploads_port,
        uploads_host,
        default_channel,
        display: DisplaySettings {
            item_count,
            column_count,
            cache_hours,
        },
        fetch_timeout,
        cache_backend,
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| non_blank(&value))
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| file_vars.get(key).cloned())
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
