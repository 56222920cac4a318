use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::enrichment::DEFAULT_TIMEOUT;
use crate::listing::DEFAULT_PAGE_SIZE;

pub const DEFAULT_BIND: &str = "127.0.0.1:3000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    Mock,
    Http { endpoint: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub bind: String,
    pub provider: ProviderKind,
    pub enrich_timeout: Duration,
    pub page_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            bind: DEFAULT_BIND.to_string(),
            provider: ProviderKind::Mock,
            enrich_timeout: DEFAULT_TIMEOUT,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Config {
    /// Build from `SCOUT_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = var("SCOUT_DB") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(bind) = var("SCOUT_BIND") {
            config.bind = bind;
        }
        if let Some(endpoint) = var("SCOUT_ENRICH_URL") {
            config.provider = ProviderKind::Http { endpoint };
        }
        if let Some(secs) = var("SCOUT_ENRICH_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .with_context(|| format!("SCOUT_ENRICH_TIMEOUT_SECS must be a number of seconds, got '{}'", secs))?;
            if secs == 0 {
                return Err(anyhow!("SCOUT_ENRICH_TIMEOUT_SECS must be greater than zero"));
            }
            config.enrich_timeout = Duration::from_secs(secs);
        }
        if let Some(size) = var("SCOUT_PAGE_SIZE") {
            config.page_size = size
                .trim()
                .parse()
                .with_context(|| format!("SCOUT_PAGE_SIZE must be a whole number, got '{}'", size))?;
            if config.page_size == 0 {
                return Err(anyhow!("SCOUT_PAGE_SIZE must be greater than zero"));
            }
        }

        Ok(config)
    }
}

fn default_db_path() -> PathBuf {
    // Use XDG data directory or fallback
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "scout") {
        proj_dirs.data_dir().join("scout.db")
    } else {
        PathBuf::from("scout.db")
    }
}
