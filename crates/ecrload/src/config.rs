//! Job configuration
//!
//! All settings come from the environment, optionally seeded from a `.env`
//! file, with defaults suitable for local development. [`Config::load`]
//! reads and validates everything a run needs up front, so a misconfigured
//! job fails before touching the remote site or the database.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use ecrload_common::retry::{RetryPolicy, DEFAULT_DELAY_SECS, DEFAULT_MAX_ATTEMPTS};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub remote: RemoteSiteConfig,
    pub pgp: PgpConfig,
    pub smtp: SmtpConfig,
}

impl Config {
    /// Load configuration from the environment
    ///
    /// Reads a `.env` file when present, then environment variables, then
    /// validates the result.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database: DatabaseConfig::from_env()?,
            remote: RemoteSiteConfig::from_env(),
            pgp: PgpConfig::from_env(),
            smtp: SmtpConfig::from_env(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate all sections
    pub fn validate(&self) -> Result<()> {
        self.database.validate()?;
        self.remote.validate()?;
        self.pgp.validate()?;
        self.smtp.validate()?;
        Ok(())
    }
}

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres connection URL
    pub url: String,

    /// Maximum pool connections
    pub max_connections: u32,

    /// Connection acquire timeout (seconds)
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/ecrload".to_string(),
            max_connections: 2,
            connect_timeout_secs: 30,
        }
    }
}

impl DatabaseConfig {
    /// Read from `ECR_DATABASE_*` (the URL falls back to `DATABASE_URL`)
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let url = std::env::var("ECR_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .context("ECR_DATABASE_URL (or DATABASE_URL) must be set")?;

        Ok(Self {
            url,
            max_connections: env_parse("ECR_DATABASE_MAX_CONNECTIONS", defaults.max_connections),
            connect_timeout_secs: env_parse(
                "ECR_DATABASE_CONNECT_TIMEOUT",
                defaults.connect_timeout_secs,
            ),
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            bail!("Database URL must not be empty");
        }
        if self.max_connections == 0 {
            bail!("Database pool needs at least one connection");
        }
        Ok(())
    }
}

/// Remote file-transfer site settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSiteConfig {
    /// Server hostname
    pub host: String,

    /// Server port
    pub port: u16,

    pub username: String,
    pub password: String,

    /// Directory the transaction file is downloaded from
    pub download_dir: String,

    /// Directory the error report is uploaded to
    pub upload_dir: String,

    /// Incremental transaction file name
    pub download_file: String,

    /// Full-extract transaction file name
    pub full_download_file: String,

    /// Total transfer attempts, first try included
    pub retry_attempts: u32,

    /// Wait between transfer attempts (seconds)
    pub retry_wait_secs: u64,
}

impl Default for RemoteSiteConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 21,
            username: "anonymous".to_string(),
            password: String::new(),
            download_dir: "/outbound".to_string(),
            upload_dir: "/inbound".to_string(),
            download_file: "ECR_Transactions.pgp".to_string(),
            full_download_file: "ECR_Transactions_Full.pgp".to_string(),
            retry_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_wait_secs: DEFAULT_DELAY_SECS,
        }
    }
}

impl RemoteSiteConfig {
    /// Read from `ECR_FTP_*`
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: env_or("ECR_FTP_HOST", &defaults.host),
            port: env_parse("ECR_FTP_PORT", defaults.port),
            username: env_or("ECR_FTP_USERNAME", &defaults.username),
            password: env_or("ECR_FTP_PASSWORD", &defaults.password),
            download_dir: env_or("ECR_FTP_DOWNLOAD_DIR", &defaults.download_dir),
            upload_dir: env_or("ECR_FTP_UPLOAD_DIR", &defaults.upload_dir),
            download_file: env_or("ECR_FTP_DOWNLOAD_FILE", &defaults.download_file),
            full_download_file: env_or(
                "ECR_FTP_DOWNLOAD_FULL_FILE",
                &defaults.full_download_file,
            ),
            retry_attempts: env_parse("ECR_FTP_RETRY_ATTEMPTS", defaults.retry_attempts),
            retry_wait_secs: env_parse("ECR_FTP_RETRY_WAIT", defaults.retry_wait_secs),
        }
    }

    /// Retry policy shared by the download and error-report upload legs
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_secs(self.retry_wait_secs))
    }

    fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            bail!("FTP host must not be empty");
        }
        if self.port == 0 {
            bail!("FTP port must not be zero");
        }
        if self.download_file.is_empty() || self.full_download_file.is_empty() {
            bail!("Transaction file names must not be empty");
        }
        if self.retry_attempts == 0 {
            bail!("At least one transfer attempt is required");
        }
        Ok(())
    }
}

/// OpenPGP key settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PgpConfig {
    /// Private key file (ASCII-armored or binary)
    pub private_key_path: PathBuf,

    /// Passphrase protecting the private key
    pub passphrase: String,
}

impl Default for PgpConfig {
    fn default() -> Self {
        Self {
            private_key_path: PathBuf::from("ecr_private.asc"),
            passphrase: String::new(),
        }
    }
}

impl PgpConfig {
    /// Read from `ECR_PGP_*`
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            private_key_path: std::env::var("ECR_PGP_KEY_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.private_key_path),
            passphrase: env_or("ECR_PGP_PASSPHRASE", &defaults.passphrase),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.private_key_path.as_os_str().is_empty() {
            bail!("PGP private key path must not be empty");
        }
        Ok(())
    }
}

/// Operator notification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Relay hostname
    pub host: String,

    /// Relay port
    pub port: u16,

    /// Sender address
    pub from_address: String,

    /// Data-team address, on every notification
    pub admin_address: String,

    /// Operator address, added for content notifications
    pub operator_address: String,

    /// Label appended to subjects outside production (empty in production)
    pub environment_label: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25,
            from_address: "ecr-load@localhost".to_string(),
            admin_address: "data-team@localhost".to_string(),
            operator_address: "operators@localhost".to_string(),
            environment_label: String::new(),
        }
    }
}

impl SmtpConfig {
    /// Read from `ECR_SMTP_*` and `ECR_ENVIRONMENT_LABEL`
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: env_or("ECR_SMTP_HOST", &defaults.host),
            port: env_parse("ECR_SMTP_PORT", defaults.port),
            from_address: env_or("ECR_SMTP_FROM", &defaults.from_address),
            admin_address: env_or("ECR_SMTP_ADMIN", &defaults.admin_address),
            operator_address: env_or("ECR_SMTP_OPERATORS", &defaults.operator_address),
            environment_label: env_or("ECR_ENVIRONMENT_LABEL", &defaults.environment_label),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            bail!("SMTP host must not be empty");
        }
        if self.from_address.is_empty()
            || self.admin_address.is_empty()
            || self.operator_address.is_empty()
        {
            bail!("SMTP sender and recipient addresses must not be empty");
        }
        Ok(())
    }
}

/// Name of the error report for a run starting at `now`
///
/// Non-production runs carry a prefix so operators can tell them apart at
/// the remote site.
pub fn error_file_name(environment_label: &str, now: DateTime<Utc>) -> String {
    let stamp = now.format("%Y%m%d_%H");

    if environment_label.trim().is_empty() {
        format!("ECR_Upload_Errors{}.csv", stamp)
    } else {
        format!("PreProd_ECR_Upload_Errors{}.csv", stamp)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
