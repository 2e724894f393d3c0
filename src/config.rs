use std::path::PathBuf;

use config::{Config, Environment};
use regex_lite::Regex;
use thiserror::Error;

pub const DEFAULT_PORT: i64 = 8080;
pub const DEFAULT_MAX_CONNECTIONS: i64 = 10;
pub const DEFAULT_TOKEN_TTL_DAYS: i64 = 7;
pub const DEFAULT_MAX_UPLOAD_BYTES: i64 = 10 * 1024 * 1024;

pub const DEFAULT_NAME_PATTERN: &str = r"^[A-Za-z0-9_.\-]+$";
pub const DEFAULT_EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[A-Za-z]{2,}$";
// At least one letter and one digit.
pub const DEFAULT_PASSWORD_PATTERN: &str = r"[A-Za-z].*[0-9]|[0-9].*[A-Za-z]";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub port: u16,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub environment: String,
    pub frontend_urls: Vec<String>,
    pub attachments_dir: PathBuf,
    pub images_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub notification_webhook_url: Option<String>,
    pub rules: ValidationRules,
}

/// Patterns applied to user supplied names, emails and passwords.
#[derive(Debug, Clone)]
pub struct ValidationRules {
    pub name: Regex,
    pub email: Regex,
    pub password: Regex,
}

impl ValidationRules {
    pub fn from_patterns(name: &str, email: &str, password: &str) -> Result<Self, ConfigError> {
        let compile = |var: &str, pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| ConfigError::InvalidFormat(format!("{} is not a valid pattern: {}", var, e)))
        };

        Ok(ValidationRules {
            name: compile("NAME_REGEX", name)?,
            email: compile("EMAIL_REGEX", email)?,
            password: compile("PASSWORD_REGEX", password)?,
        })
    }

    pub fn with_defaults() -> Result<Self, ConfigError> {
        Self::from_patterns(DEFAULT_NAME_PATTERN, DEFAULT_EMAIL_PATTERN, DEFAULT_PASSWORD_PATTERN)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    #[error("Failed to read configuration: {0}")]
    Source(#[from] config::ConfigError),
}

impl AppConfig {
    /// Configuration with every optional setting at its default.
    pub fn new(database_url: &str, jwt_secret: &str) -> Result<Self, ConfigError> {
        Ok(AppConfig {
            database_url: database_url.to_string(),
            database_max_connections: DEFAULT_MAX_CONNECTIONS as u32,
            port: DEFAULT_PORT as u16,
            jwt_secret: jwt_secret.to_string(),
            token_ttl_days: DEFAULT_TOKEN_TTL_DAYS,
            environment: "development".to_string(),
            frontend_urls: vec!["http://localhost:3000".to_string()],
            attachments_dir: PathBuf::from("attachments"),
            images_dir: PathBuf::from("images"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES as usize,
            notification_webhook_url: None,
            rules: ValidationRules::with_defaults()?,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let settings = Config::builder()
            .set_default("server_port", DEFAULT_PORT)?
            .set_default("environment", "development")?
            .set_default("cors_allowed_origins", "http://localhost:3000")?
            .set_default("database_max_connections", DEFAULT_MAX_CONNECTIONS)?
            .set_default("token_ttl_days", DEFAULT_TOKEN_TTL_DAYS)?
            .set_default("attachments_dir", "attachments")?
            .set_default("images_dir", "images")?
            .set_default("max_upload_bytes", DEFAULT_MAX_UPLOAD_BYTES)?
            .set_default("name_regex", DEFAULT_NAME_PATTERN)?
            .set_default("email_regex", DEFAULT_EMAIL_PATTERN)?
            .set_default("password_regex", DEFAULT_PASSWORD_PATTERN)?
            .add_source(Environment::default())
            .build()?;

        let database_url = settings
            .get_string("database_url")
            .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?;

        let jwt_secret = settings
            .get_string("jwt_secret")
            .map_err(|_| ConfigError::MissingVariable("JWT_SECRET".to_string()))?;

        let port = settings
            .get_int("server_port")
            .ok()
            .and_then(|p| u16::try_from(p).ok())
            .ok_or_else(|| ConfigError::InvalidFormat("SERVER_PORT must be a valid port number".to_string()))?;

        let database_max_connections = settings
            .get_int("database_max_connections")
            .ok()
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| *n > 0)
            .ok_or_else(|| ConfigError::InvalidFormat("DATABASE_MAX_CONNECTIONS must be a positive number".to_string()))?;

        let token_ttl_days = settings
            .get_int("token_ttl_days")
            .ok()
            .filter(|d| *d > 0)
            .ok_or_else(|| ConfigError::InvalidFormat("TOKEN_TTL_DAYS must be a positive number".to_string()))?;

        let max_upload_bytes = settings
            .get_int("max_upload_bytes")
            .ok()
            .and_then(|n| usize::try_from(n).ok())
            .filter(|n| *n > 0)
            .ok_or_else(|| ConfigError::InvalidFormat("MAX_UPLOAD_BYTES must be a positive number".to_string()))?;

        let frontend_urls = settings
            .get_string("cors_allowed_origins")?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let notification_webhook_url = settings
            .get_string("notification_webhook_url")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let rules = ValidationRules::from_patterns(
            &settings.get_string("name_regex")?,
            &settings.get_string("email_regex")?,
            &settings.get_string("password_regex")?,
        )?;

        Ok(AppConfig {
            database_url,
            database_max_connections,
            port,
            jwt_secret,
            token_ttl_days,
            environment: settings.get_string("environment")?,
            frontend_urls,
            attachments_dir: PathBuf::from(settings.get_string("attachments_dir")?),
            images_dir: PathBuf::from(settings.get_string("images_dir")?),
            max_upload_bytes,
            notification_webhook_url,
            rules,
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_config_uses_defaults() {
        let config = AppConfig::new("postgres://localhost/taskhub", "secret").unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.token_ttl_days, 7);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert!(config.notification_webhook_url.is_none());
        assert!(config.is_development());
    }

    #[test]
    fn default_password_pattern_needs_letter_and_digit() {
        let rules = ValidationRules::with_defaults().unwrap();
        assert!(rules.password.is_match("abcdefg1"));
        assert!(rules.password.is_match("1abcdefg"));
        assert!(!rules.password.is_match("abcdefgh"));
        assert!(!rules.password.is_match("12345678"));
    }

    #[test]
    fn default_name_pattern_rejects_spaces() {
        let rules = ValidationRules::with_defaults().unwrap();
        assert!(rules.name.is_match("jane_doe"));
        assert!(!rules.name.is_match("jane doe"));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = ValidationRules::from_patterns("(", DEFAULT_EMAIL_PATTERN, DEFAULT_PASSWORD_PATTERN).unwrap_err();
        assert!(err.to_string().contains("NAME_REGEX"));
    }
}
