//! Server configuration: engine settings and linked accounts
//!
//! ```toml
//! default_user = "alice"
//!
//! [settings]
//! email_order = "newest_first"
//! fetch_timeout_secs = 20
//!
//! [[accounts]]
//! user = "alice"
//! service = "google"
//! account_id = "alice@corp.com"
//!
//! [[accounts.sources]]
//! source_id = "gmail"
//! feed = "feeds/gmail.toml"
//! mode = "incremental"
//! page_size = 50
//! ```

use crate::engine::{EmailOrder, EngineSettings, SourceRegistry, SyncMode};
use crate::model::{AccountToken, Lifecycle};
use crate::sources::FeedSource;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub email_order: EmailOrder,
    pub lookahead_days: u32,
    /// 0 disables the bound
    pub fetch_timeout_secs: u64,
    pub min_refresh_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            email_order: EmailOrder::OldestFirst,
            lookahead_days: 7,
            fetch_timeout_secs: 30,
            min_refresh_interval_secs: 10,
        }
    }
}

impl Settings {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            email_order: self.email_order,
            lookahead: chrono::Duration::days(i64::from(self.lookahead_days)),
            fetch_timeout: (self.fetch_timeout_secs > 0)
                .then(|| std::time::Duration::from_secs(self.fetch_timeout_secs)),
            min_refresh_interval: chrono::Duration::seconds(
                i64::try_from(self.min_refresh_interval_secs).unwrap_or(i64::MAX),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub feed: PathBuf,
    #[serde(default)]
    pub mode: SyncMode,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default = "default_absence")]
    pub absence: Lifecycle,
}

fn default_absence() -> Lifecycle {
    Lifecycle::Completed
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccountConfig {
    pub user: String,
    pub service: String,
    pub account_id: String,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl AccountConfig {
    pub fn token(&self) -> AccountToken {
        AccountToken::new(&self.user, &self.service, &self.account_id)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default = "default_user")]
    pub default_user: String,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

fn default_user() -> String {
    "default".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_user: default_user(),
            settings: Settings::default(),
            accounts: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration; a missing path or file means defaults
    ///
    /// Relative feed paths are resolved against the configuration file's
    /// directory.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config = Self::parse(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;

        if let Some(base) = path.parent() {
            for source in config.accounts.iter_mut().flat_map(|a| a.sources.iter_mut()) {
                if source.feed.is_relative() {
                    source.feed = base.join(&source.feed);
                }
            }
        }
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.default_user.trim().is_empty() {
            bail!("default_user must not be empty");
        }
        let mut seen = HashSet::new();
        for account in &self.accounts {
            if account.user.trim().is_empty()
                || account.service.trim().is_empty()
                || account.account_id.trim().is_empty()
            {
                bail!("accounts need a user, a service and an account_id");
            }
            for source in &account.sources {
                if source.source_id.trim().is_empty() {
                    bail!("account {} has a source without source_id", account.account_id);
                }
                let key = (
                    account.service.as_str(),
                    account.account_id.as_str(),
                    source.source_id.as_str(),
                );
                if !seen.insert(key) {
                    bail!(
                        "source '{}' is configured twice for account {}",
                        source.source_id,
                        account.account_id
                    );
                }
                if source.absence == Lifecycle::Active {
                    bail!("source '{}': absence must be completed or deleted", source.source_id);
                }
            }
        }
        Ok(())
    }

    /// Linked account tokens to register with the store
    pub fn tokens(&self) -> Vec<AccountToken> {
        self.accounts.iter().map(AccountConfig::token).collect()
    }

    /// Feed adapters for every configured source
    pub fn registry(&self) -> SourceRegistry {
        let mut registry = SourceRegistry::new();
        for account in &self.accounts {
            let token_id = AccountToken::token_id_for(&account.service, &account.account_id);
            for source in &account.sources {
                let adapter = FeedSource::new(&source.source_id, &source.feed)
                    .with_mode(source.mode)
                    .with_page_size(source.page_size)
                    .with_absence(source.absence);
                registry.register(token_id.clone(), Arc::new(adapter));
            }
        }
        registry
    }
}
