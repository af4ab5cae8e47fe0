use crate::global;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const MB: u64 = 1024 * 1024;

/// Environment variables that override values from the config file.
pub mod env_vars {
    pub const BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
    pub const CONVERSION_TIMEOUT: &str = "CONVERSION_TIMEOUT";
    pub const API_URL: &str = "RECAST_API_URL";
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bot: BotConfig,
    pub limits: LimitsConfig,
    pub transcode: TranscodeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub token: String,
    /// Bot API base URL. Point this at a self-hosted bot API server to
    /// lift the hosted service's transfer ceilings.
    pub api_url: String,
    pub poll_timeout_seconds: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_url: "https://api.telegram.org".to_string(),
            poll_timeout_seconds: 30,
        }
    }
}

/// Size limits, all in megabytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest input the bot accepts at all.
    pub max_input_mb: u64,
    /// Largest file the bot API will hand out for download.
    pub bot_download_limit_mb: u64,
    /// Largest file the bot API accepts for upload.
    pub max_upload_mb: u64,
    /// Inputs above this are split into parts before conversion.
    pub split_threshold_mb: u64,
    pub max_concurrent_conversions: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_input_mb: 2000,
            bot_download_limit_mb: 20,
            max_upload_mb: 50,
            split_threshold_mb: 1500,
            max_concurrent_conversions: 2,
        }
    }
}

impl LimitsConfig {
    pub fn max_input_bytes(&self) -> u64 {
        self.max_input_mb * MB
    }

    pub fn bot_download_limit_bytes(&self) -> u64 {
        self.bot_download_limit_mb * MB
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb * MB
    }

    pub fn split_threshold_bytes(&self) -> u64 {
        self.split_threshold_mb * MB
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    pub docker_program: String,
    pub image: String,
    /// Pass `--gpus all` to the container (required by the nvenc encoder).
    pub use_gpu: bool,
    pub timeout_seconds: u64,
    /// Root for per-request working directories (default: system temp dir).
    pub work_dir: Option<PathBuf>,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            docker_program: "docker".to_string(),
            image: "jrottenberg/ffmpeg:5.1.4-nvidia2004".to_string(),
            use_gpu: true,
            timeout_seconds: 300,
            work_dir: None,
        }
    }
}

impl TranscodeConfig {
    pub fn work_root(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(global::work_dir)
    }
}

impl Config {
    /// Load the config from the default location, creating it with
    /// defaults on first run, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = global::config_file()?;
        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save_to(&config_path)?;
            config
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load an explicit config file (no defaults are written), then apply
    /// environment overrides.
    pub fn load_explicit(path: &Path) -> Result<Self> {
        let mut config = Self::load_from(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).context("Failed to read config file")?;
        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Apply overrides from `lookup`, normally the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(env_vars::BOT_TOKEN).filter(|t| !t.trim().is_empty()) {
            self.bot.token = token.trim().to_string();
        }
        if let Some(url) = lookup(env_vars::API_URL).filter(|u| !u.trim().is_empty()) {
            self.bot.api_url = url.trim().to_string();
        }
        if let Some(timeout) = lookup(env_vars::CONVERSION_TIMEOUT)
            .and_then(|raw| raw.trim().parse::<u64>().ok())
        {
            self.transcode.timeout_seconds = timeout;
        }
    }

    /// Check the settings the service cannot start without.
    pub fn validate(&self) -> Result<()> {
        if self.bot.token.trim().is_empty() {
            bail!(
                "Bot token is missing. Set {} or [bot].token in the config file",
                env_vars::BOT_TOKEN
            );
        }
        if self.transcode.timeout_seconds == 0 {
            bail!("[transcode].timeout_seconds must be greater than zero");
        }
        if self.limits.max_concurrent_conversions == 0 {
            bail!("[limits].max_concurrent_conversions must be at least 1");
        }
        if self.limits.split_threshold_mb == 0 {
            bail!("[limits].split_threshold_mb must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bot.api_url, "https://api.telegram.org");
        assert_eq!(config.limits.max_upload_mb, 50);
        assert_eq!(config.limits.split_threshold_bytes(), 1500 * MB);
        assert_eq!(config.transcode.timeout_seconds, 300);
        assert!(config.transcode.use_gpu);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [bot]
            token = "123:abc"

            [limits]
            max_upload_mb = 2000
            "#,
        )
        .unwrap();

        assert_eq!(config.bot.token, "123:abc");
        assert_eq!(config.bot.poll_timeout_seconds, 30);
        assert_eq!(config.limits.max_upload_mb, 2000);
        assert_eq!(config.limits.max_input_mb, 2000);
        assert_eq!(config.transcode.image, "jrottenberg/ffmpeg:5.1.4-nvidia2004");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.bot.token = "token".to_string();
        config.transcode.work_dir = Some(PathBuf::from("/srv/recast"));
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            (env_vars::BOT_TOKEN, " 42:secret "),
            (env_vars::CONVERSION_TIMEOUT, "900"),
            (env_vars::API_URL, "http://localhost:8081"),
        ]);
        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).cloned());

        assert_eq!(config.bot.token, "42:secret");
        assert_eq!(config.bot.api_url, "http://localhost:8081");
        assert_eq!(config.transcode.timeout_seconds, 900);
    }

    #[test]
    fn test_invalid_timeout_override_is_ignored() {
        let vars = env(&[(env_vars::CONVERSION_TIMEOUT, "soon")]);
        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).cloned());
        assert_eq!(config.transcode.timeout_seconds, 300);
    }

    #[test]
    fn test_validate_requires_token() {
        let mut config = Config::default();
        assert!(config.validate().is_err());

        config.bot.token = "1:x".to_string();
        assert!(config.validate().is_ok());

        config.limits.max_concurrent_conversions = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_work_root_defaults_to_temp_dir() {
        let config = TranscodeConfig::default();
        assert_eq!(config.work_root(), global::work_dir());
    }
}
