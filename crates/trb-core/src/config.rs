use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{de::DeserializeOwned, Deserialize};

use crate::{errors::Error, security::WhitelistConfig, Result};

const DEFAULT_CONFIG_DIR: &str = "config/.stash";

/// Typed configuration for the bot.
///
/// Credentials come from JSON files under the config directory; tunables come
/// from the environment. Contents are only checked for presence.
#[derive(Clone, Debug)]
pub struct Config {
    // Credentials
    pub telegram_bot_token: String,
    pub gcloud_api_key: String,

    // Access
    pub whitelist: WhitelistConfig,

    // Translation
    pub target_language: String,
    pub fallback_language: String,

    // Telegram client timeouts
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub polling_timeout: Duration,

    // Lifecycle
    pub shutdown_timeout: Duration,
}

#[derive(Deserialize)]
struct TelegramFile {
    token: String,
}

#[derive(Deserialize)]
struct GcloudFile {
    api_key: String,
    #[serde(default)]
    target_language: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let dir = env_path("TRB_CONFIG_DIR").unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR));
        Self::load_from(&dir)
    }

    pub fn load_from(dir: &Path) -> Result<Self> {
        tracing::info!(dir = %dir.display(), "read config begin");

        let whitelist: WhitelistConfig = read_json(&dir.join("bot.json"))?;
        tracing::info!(
            restricted = whitelist.is_restricted(),
            usernames = whitelist.len().unwrap_or(0),
            "bot config read"
        );

        // The env var wins so the token can be rotated without touching files.
        let telegram_bot_token = match env_str("TELEGRAM_BOT_TOKEN").and_then(non_empty) {
            Some(t) => t,
            None => read_json::<TelegramFile>(&dir.join("telegram.json"))?.token,
        };
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config("telegram token is required".to_string()));
        }
        tracing::info!("telegram token read");

        let gcloud: GcloudFile = read_json(&dir.join("gcloud.json"))?;
        if gcloud.api_key.trim().is_empty() {
            return Err(Error::Config("gcloud api_key is required".to_string()));
        }
        tracing::info!("gcloud credentials read");

        let target_language = gcloud
            .target_language
            .and_then(non_empty)
            .unwrap_or_else(|| "ro".to_string());
        let fallback_language =
            env_str("TRB_FALLBACK_LANGUAGE").and_then(non_empty).unwrap_or_else(|| "en".to_string());

        let connect_timeout = Duration::from_secs(env_u64("TRB_CONNECT_TIMEOUT_SECS").unwrap_or(5));
        let request_timeout =
            Duration::from_secs(env_u64("TRB_REQUEST_TIMEOUT_SECS").unwrap_or(10));
        let polling_timeout =
            Duration::from_secs(env_u64("TRB_POLLING_TIMEOUT_SECS").unwrap_or(30));
        let shutdown_timeout =
            Duration::from_secs(env_u64("TRB_SHUTDOWN_TIMEOUT_SECS").unwrap_or(30));

        tracing::info!("read config end");

        Ok(Self {
            telegram_bot_token,
            gcloud_api_key: gcloud.api_key,
            whitelist,
            target_language,
            fallback_language,
            connect_timeout,
            request_timeout,
            polling_timeout,
            shutdown_timeout,
        })
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).map_err(|e| Error::ConfigFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| Error::ConfigFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
