//! Configuration management for Skycast

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::draft::DEFAULT_LANG;
use crate::error::{ConfigError, Result, SkycastError};

pub const DEFAULT_SERVICE: &str = "https://bsky.social";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default = "default_service")]
    pub service: String,
    #[serde(default)]
    pub handle: Option<String>,
    /// Prefer SKYCAST_APP_PASSWORD or the interactive prompt over this.
    #[serde(default)]
    pub app_password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_langs")]
    pub langs: Vec<String>,
    /// Deadline for a whole composition, e.g. "30s" or "2m"
    #[serde(default)]
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_service() -> String {
    DEFAULT_SERVICE.to_string()
}

fn default_langs() -> Vec<String> {
    vec![DEFAULT_LANG.to_string()]
}

fn default_user_agent() -> String {
    format!("skycast/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            service: default_service(),
            handle: None,
            app_password: None,
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            langs: default_langs(),
            timeout: None,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl DefaultsConfig {
    /// Parsed composition deadline, if one is configured.
    pub fn timeout(&self) -> Result<Option<Duration>> {
        self.timeout
            .as_deref()
            .map(|raw| {
                humantime::parse_duration(raw).map_err(|e| {
                    SkycastError::from(ConfigError::InvalidValue {
                        field: "defaults.timeout".to_string(),
                        reason: e.to_string(),
                    })
                })
            })
            .transpose()
    }
}

/// Login material for one account.
#[derive(Debug)]
pub struct Credentials {
    pub service: String,
    pub handle: String,
    pub app_password: SecretString,
}

impl Config {
    /// Load configuration from the default location, falling back to
    /// defaults when no file exists there.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default_config());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            account: AccountConfig::default(),
            defaults: DefaultsConfig::default(),
            http: HttpConfig::default(),
        }
    }

    /// Service URL after applying SKYCAST_SERVICE.
    pub fn service(&self) -> String {
        std::env::var("SKYCAST_SERVICE").unwrap_or_else(|_| self.account.service.clone())
    }

    /// Handle after applying SKYCAST_HANDLE.
    pub fn handle(&self) -> Option<String> {
        std::env::var("SKYCAST_HANDLE")
            .ok()
            .filter(|h| !h.is_empty())
            .or_else(|| self.account.handle.clone())
    }

    /// App password from SKYCAST_APP_PASSWORD or the config file.
    pub fn app_password(&self) -> Option<SecretString> {
        std::env::var("SKYCAST_APP_PASSWORD")
            .ok()
            .filter(|p| !p.is_empty())
            .or_else(|| self.account.app_password.clone())
            .map(SecretString::from)
    }

    /// Complete credentials, if both handle and password are available
    /// without prompting.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingField` naming whichever part is missing.
    pub fn credentials(&self) -> Result<Credentials> {
        let handle = self
            .handle()
            .ok_or_else(|| ConfigError::MissingField("account.handle".to_string()))?;
        let app_password = self
            .app_password()
            .ok_or_else(|| ConfigError::MissingField("account.app_password".to_string()))?;
        Ok(Credentials {
            service: self.service(),
            handle,
            app_password,
        })
    }

    /// Like [`Config::credentials`], but asks for the app password on the
    /// terminal when none is configured and stdin is interactive.
    pub fn credentials_or_prompt(&self) -> Result<Credentials> {
        let handle = match (self.handle(), self.app_password()) {
            (Some(handle), None) if atty::is(atty::Stream::Stdin) => handle,
            _ => return self.credentials(),
        };

        let password = rpassword::prompt_password(format!("App password for {}: ", handle))
            .map_err(|e| {
                SkycastError::Authentication(format!("failed to read app password: {}", e))
            })?;
        if password.is_empty() {
            return Err(SkycastError::Authentication(
                "app password cannot be empty".to_string(),
            ));
        }

        Ok(Credentials {
            service: self.service(),
            handle,
            app_password: SecretString::from(password),
        })
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SKYCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("skycast").join("config.toml"))
}
