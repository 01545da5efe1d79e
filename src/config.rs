use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Browser identity sent with every page request. Matches what a desktop
/// Chrome install reports so product pages serve the normal layout.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36";

pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub fetcher: FetcherConfig,
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    pub user_agent: String,
}

/// Mail relay endpoint. Sender credentials are per-tracker input, not
/// process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let s = Config::builder()
            // Built-in defaults so the binary runs without config files
            .set_default("fetcher.user_agent", DEFAULT_USER_AGENT)?
            .set_default("smtp.host", DEFAULT_SMTP_HOST)?
            .set_default("smtp.port", DEFAULT_SMTP_PORT as i64)?
            // Optional file overrides
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Environment variables with prefix "DROPWATCH_"
            .add_source(Environment::with_prefix("DROPWATCH").separator("__"))
            .build()?;

        let config: AppConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetcher.user_agent.trim().is_empty() {
            return Err(ConfigError::Message(
                "Fetcher user_agent must not be empty".into(),
            ));
        }

        if self.smtp.port == 0 {
            return Err(ConfigError::Message(
                "SMTP port must be greater than 0".into(),
            ));
        }

        if self.smtp.host.trim().is_empty() {
            return Err(ConfigError::Message("SMTP host must not be empty".into()));
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            fetcher: FetcherConfig {
                user_agent: DEFAULT_USER_AGENT.to_string(),
            },
            smtp: SmtpConfig {
                host: DEFAULT_SMTP_HOST.to_string(),
                port: DEFAULT_SMTP_PORT,
            },
        }
    }
}
