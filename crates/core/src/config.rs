use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EavlogError, Result};
use crate::settings::{DEFAULT_DROP_FIELDS, RuntimeSettings};
use crate::time::parse_duration_str;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub intake_addr: String,
    pub http_addr: String,
    pub query_addr: String,
    pub health_addr: String,
    pub queue_capacity: usize,
    pub pool_size: usize,
    pub vocab_cache_capacity: usize,
    pub max_batch_size: usize,
    pub max_batch_age: Duration,
    pub max_pending: usize,
    pub drop_fields: Vec<String>,
    pub refresh_enabled: bool,
    pub refresh_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        let data_root = env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(home).join(".local/share"));
        let runtime = RuntimeSettings::default();

        Self {
            db_path: data_root.join("eavlog/eavlog.duckdb"),
            intake_addr: "127.0.0.1:56119".to_string(),
            http_addr: "127.0.0.1:56120".to_string(),
            query_addr: "127.0.0.1:56121".to_string(),
            health_addr: "127.0.0.1:5000".to_string(),
            queue_capacity: 65_536,
            pool_size: 2,
            vocab_cache_capacity: 1 << 20,
            max_batch_size: runtime.max_batch_size,
            max_batch_age: runtime.max_batch_age,
            max_pending: runtime.max_pending,
            drop_fields: DEFAULT_DROP_FIELDS.iter().map(|s| s.to_string()).collect(),
            refresh_enabled: true,
            refresh_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(file_overrides) = load_file_overrides(path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            max_batch_size: self.max_batch_size,
            max_batch_age: self.max_batch_age,
            drop_fields: self.drop_fields.clone(),
            max_pending: self.max_pending,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(EavlogError::Config("max_batch_size must be > 0".to_string()));
        }
        if self.max_batch_age.is_zero() {
            return Err(EavlogError::Config("max_batch_age must be > 0".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(EavlogError::Config("queue_capacity must be > 0".to_string()));
        }
        if self.pool_size == 0 {
            return Err(EavlogError::Config("pool_size must be > 0".to_string()));
        }
        if self.vocab_cache_capacity == 0 {
            return Err(EavlogError::Config(
                "vocab_cache_capacity must be > 0".to_string(),
            ));
        }
        if self.max_pending < self.max_batch_size {
            return Err(EavlogError::Config(
                "max_pending must be >= max_batch_size".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    db_path: Option<PathBuf>,
    intake_addr: Option<String>,
    http_addr: Option<String>,
    query_addr: Option<String>,
    health_addr: Option<String>,
    queue_capacity: Option<usize>,
    pool_size: Option<usize>,
    vocab_cache_capacity: Option<usize>,
    max_batch_size: Option<usize>,
    max_batch_age: Option<String>,
    max_pending: Option<usize>,
    drop_fields: Option<Vec<String>>,
    refresh_enabled: Option<bool>,
    refresh_interval: Option<String>,
}

pub fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("EAVLOG_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("eavlog/config.toml")
}

fn load_file_overrides(path: &Path) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| EavlogError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed: ConfigOverrides = toml::from_str(&raw)
        .map_err(|e| EavlogError::Config(format!("failed parsing {}: {e}", path.display())))?;
    Ok(Some(parsed))
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    Ok(ConfigOverrides {
        db_path: env::var("EAVLOG_DB_PATH").ok().map(PathBuf::from),
        intake_addr: env::var("EAVLOG_INTAKE_ADDR").ok(),
        http_addr: env::var("EAVLOG_HTTP_ADDR").ok(),
        query_addr: env::var("EAVLOG_QUERY_ADDR").ok(),
        health_addr: env::var("EAVLOG_HEALTH_ADDR").ok(),
        queue_capacity: env_parse("EAVLOG_QUEUE_CAPACITY")?,
        pool_size: env_parse("EAVLOG_POOL_SIZE")?,
        vocab_cache_capacity: env_parse("EAVLOG_VOCAB_CACHE_CAPACITY")?,
        max_batch_size: env_parse("EAVLOG_MAX_BATCH_SIZE")?,
        max_batch_age: env::var("EAVLOG_MAX_BATCH_AGE").ok(),
        max_pending: env_parse("EAVLOG_MAX_PENDING")?,
        drop_fields: env::var("EAVLOG_DROP_FIELDS")
            .ok()
            .map(|v| parse_list(&v)),
        refresh_enabled: env_parse("EAVLOG_REFRESH_ENABLED")?,
        refresh_interval: env::var("EAVLOG_REFRESH_INTERVAL").ok(),
    })
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| EavlogError::Config(format!("bad {key} in environment: {e}"))),
        Err(_) => Ok(None),
    }
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.db_path {
        cfg.db_path = v;
    }
    if let Some(v) = overrides.intake_addr {
        cfg.intake_addr = v;
    }
    if let Some(v) = overrides.http_addr {
        cfg.http_addr = v;
    }
    if let Some(v) = overrides.query_addr {
        cfg.query_addr = v;
    }
    if let Some(v) = overrides.health_addr {
        cfg.health_addr = v;
    }
    if let Some(v) = overrides.queue_capacity {
        cfg.queue_capacity = v;
    }
    if let Some(v) = overrides.pool_size {
        cfg.pool_size = v;
    }
    if let Some(v) = overrides.vocab_cache_capacity {
        cfg.vocab_cache_capacity = v;
    }
    if let Some(v) = overrides.max_batch_size {
        cfg.max_batch_size = v;
    }
    if let Some(v) = overrides.max_batch_age {
        cfg.max_batch_age = parse_seconds_or_duration(&v).map_err(|e| {
            EavlogError::Config(format!("bad max_batch_age in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.max_pending {
        cfg.max_pending = v;
    }
    if let Some(v) = overrides.drop_fields {
        cfg.drop_fields = v;
    }
    if let Some(v) = overrides.refresh_enabled {
        cfg.refresh_enabled = v;
    }
    if let Some(v) = overrides.refresh_interval {
        cfg.refresh_interval = parse_seconds_or_duration(&v).map_err(|e| {
            EavlogError::Config(format!("bad refresh_interval in {source}: {e} (value={v})"))
        })?;
    }
    Ok(())
}

/// Accepts a bare number of seconds (`"5"`, `"0.5"`) or a humantime
/// duration (`"500ms"`).
fn parse_seconds_or_duration(raw: &str) -> Result<Duration> {
    let trimmed = raw.trim();
    if let Ok(secs) = trimmed.parse::<f64>() {
        return Duration::try_from_secs_f64(secs)
            .map_err(|e| EavlogError::Parse(format!("invalid seconds: {e}")));
    }
    parse_duration_str(trimmed)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
