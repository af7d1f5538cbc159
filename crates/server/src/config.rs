//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `FOOTFALL_DATABASE_URL` - `PostgreSQL` connection string
//! - `FOOTFALL_BASE_URL` - Public URL for the service
//! - `FOOTFALL_SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//! - `REMINDER_TRIGGER_SECRET` - Bearer credential presented by the periodic trigger
//! - `SMTP_HOST` - SMTP server hostname
//! - `SMTP_USERNAME` - SMTP authentication username
//! - `SMTP_PASSWORD` - SMTP authentication password
//! - `SMTP_FROM` - Email sender address
//!
//! ## Optional
//! - `FOOTFALL_HOST` - Bind address (default: 127.0.0.1)
//! - `FOOTFALL_PORT` - Listen port (default: 3002)
//! - `REMINDER_OFFSETS` - Ordered reminder offsets (default: 24h,1h)
//! - `VISIT_GRACE_PERIOD` - Arrival window after the scheduled time (default: 1h)
//! - `REMINDER_CONCURRENCY` - Dispatcher worker pool size (default: 8)
//! - `REMINDER_SEND_TIMEOUT_SECS` - Per-send timeout (default: 10)
//! - `REMINDER_RUN_DEADLINE_SECS` - Whole-cycle deadline (default: 55)
//! - `SMTP_PORT` - SMTP port (default: 587)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//!
//! ## Optional (TLS)
//! - `FOOTFALL_TLS_CERT` - PEM-encoded certificate chain
//! - `FOOTFALL_TLS_KEY` - PEM-encoded private key

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use footfall_core::reminder::{self, OffsetParseError, ReminderOffset};

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
    #[error("Invalid reminder offset in REMINDER_OFFSETS: {0}")]
    InvalidOffsets(#[from] OffsetParseError),
}

/// Server application configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the service
    pub base_url: String,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Reminder engine configuration
    pub reminders: ReminderConfig,
    /// Email (SMTP) configuration
    pub email: EmailConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "staging", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
    /// TLS configuration for HTTPS (optional)
    pub tls: Option<TlsConfig>,
}

/// Reminder engine configuration.
///
/// Implements `Debug` manually to redact the trigger secret.
#[derive(Clone)]
pub struct ReminderConfig {
    /// Bearer credential the periodic trigger must present.
    pub trigger_secret: SecretString,
    /// Ordered reminder offsets before the scheduled time.
    pub offsets: Vec<ReminderOffset>,
    /// Arrival window after the scheduled time before a visit is swept.
    pub grace: chrono::Duration,
    /// Dispatcher worker pool size.
    pub concurrency: usize,
    /// Per-send timeout for the notification provider.
    pub send_timeout: std::time::Duration,
    /// Overall deadline for one trigger cycle.
    pub run_deadline: std::time::Duration,
}

impl std::fmt::Debug for ReminderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReminderConfig")
            .field("trigger_secret", &"[REDACTED]")
            .field("offsets", &self.offsets)
            .field("grace", &self.grace)
            .field("concurrency", &self.concurrency)
            .field("send_timeout", &self.send_timeout)
            .field("run_deadline", &self.run_deadline)
            .finish()
    }
}

/// Email (SMTP) configuration.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    /// SMTP server hostname
    pub smtp_host: String,
    /// SMTP server port
    pub smtp_port: u16,
    /// SMTP authentication username
    pub smtp_username: String,
    /// SMTP authentication password
    pub smtp_password: SecretString,
    /// Email sender address (From header)
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

/// TLS configuration for HTTPS.
#[derive(Clone)]
pub struct TlsConfig {
    /// PEM-encoded certificate chain
    pub cert_pem: String,
    /// PEM-encoded private key
    pub key_pem: SecretString,
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("cert_pem", &"[CERTIFICATE]")
            .field("key_pem", &"[REDACTED]")
            .finish()
    }
}

impl TlsConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let cert_pem = get_optional_env("FOOTFALL_TLS_CERT");
        let key_pem = get_optional_env("FOOTFALL_TLS_KEY");

        match (cert_pem, key_pem) {
            (Some(cert), Some(key)) => Ok(Some(Self {
                cert_pem: cert,
                key_pem: SecretString::from(key),
            })),
            (None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "FOOTFALL_TLS_*".to_string(),
                "Both FOOTFALL_TLS_CERT and FOOTFALL_TLS_KEY must be set together".to_string(),
            )),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("FOOTFALL_DATABASE_URL")?;
        let host = get_env_or_default("FOOTFALL_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("FOOTFALL_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("FOOTFALL_PORT", "3002")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("FOOTFALL_PORT".to_string(), e.to_string()))?;
        let base_url = get_required_env("FOOTFALL_BASE_URL")?;
        let session_secret = get_validated_secret("FOOTFALL_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "FOOTFALL_SESSION_SECRET")?;

        let reminders = ReminderConfig::from_env()?;
        let email = EmailConfig::from_env()?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let tls = TlsConfig::from_env()?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            session_secret,
            reminders,
            email,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
            tls,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Returns a reference to the reminder engine configuration.
    #[must_use]
    pub const fn reminders(&self) -> &ReminderConfig {
        &self.reminders
    }
}

impl ReminderConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let trigger_secret = get_validated_secret("REMINDER_TRIGGER_SECRET")?;

        let offsets = reminder::parse_offsets(&get_env_or_default("REMINDER_OFFSETS", "24h,1h"))?;

        let grace = reminder::ReminderOffset::parse(&get_env_or_default("VISIT_GRACE_PERIOD", "1h"))
            .map(|o| o.before())
            .map_err(ConfigError::InvalidOffsets)?;

        let concurrency = get_env_or_default("REMINDER_CONCURRENCY", "8")
            .parse::<usize>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("REMINDER_CONCURRENCY".to_string(), e.to_string())
            })?;
        if concurrency == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "REMINDER_CONCURRENCY".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let send_timeout = get_env_or_default("REMINDER_SEND_TIMEOUT_SECS", "10")
            .parse::<u64>()
            .map(std::time::Duration::from_secs)
            .map_err(|e| {
                ConfigError::InvalidEnvVar("REMINDER_SEND_TIMEOUT_SECS".to_string(), e.to_string())
            })?;

        let run_deadline = get_env_or_default("REMINDER_RUN_DEADLINE_SECS", "55")
            .parse::<u64>()
            .map(std::time::Duration::from_secs)
            .map_err(|e| {
                ConfigError::InvalidEnvVar("REMINDER_RUN_DEADLINE_SECS".to_string(), e.to_string())
            })?;

        Ok(Self {
            trigger_secret,
            offsets,
            grace,
            concurrency,
            send_timeout,
            run_deadline,
        })
    }
}

impl EmailConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let smtp_port = get_env_or_default("SMTP_PORT", "587")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("SMTP_PORT".to_string(), e.to_string()))?;

        Ok(Self {
            smtp_host: get_required_env("SMTP_HOST")?,
            smtp_port,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: get_validated_secret("SMTP_PASSWORD")?,
            from_address: get_required_env("SMTP_FROM")?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    // Try primary key first (e.g., FOOTFALL_DATABASE_URL)
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    // Fallback to generic DATABASE_URL (set by Fly.io postgres attach)
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    // Check blocklist
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Check entropy (real secrets like API keys have high entropy)
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_single_char() {
        // All same character = 0 entropy
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        // "ab" has entropy of 1 bit per char (50% a, 50% b)
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_shannon_entropy_high() {
        // Random-looking string should have high entropy
        let entropy = shannon_entropy("aB3$xY9!mK2@nL5#");
        assert!(entropy > 3.3);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-trigger-credential-here", "TEST_VAR");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_changeme() {
        let result = validate_secret_strength("changeme123", "TEST_VAR");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        // High-entropy random string
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_session_secret_too_short() {
        let secret = SecretString::from("short");
        let result = validate_session_secret(&secret, "TEST_SESSION");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_session_secret_valid_length() {
        let secret = SecretString::from("a".repeat(32));
        let result = validate_session_secret(&secret, "TEST_SESSION");
        assert!(result.is_ok());
    }

    #[test]
    fn test_socket_addr() {
        let config = ServerConfig {
            database_url: SecretString::from("postgres://localhost/test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 3002,
            base_url: "http://localhost:3002".to_string(),
            session_secret: SecretString::from("x".repeat(32)),
            reminders: ReminderConfig {
                trigger_secret: SecretString::from("t3st-tr1gger"),
                offsets: reminder::parse_offsets("24h,1h").unwrap(),
                grace: chrono::Duration::hours(1),
                concurrency: 8,
                send_timeout: std::time::Duration::from_secs(10),
                run_deadline: std::time::Duration::from_secs(55),
            },
            email: EmailConfig {
                smtp_host: "smtp.test.invalid".to_string(),
                smtp_port: 587,
                smtp_username: "user".to_string(),
                smtp_password: SecretString::from("pass"),
                from_address: "rewards@test.invalid".to_string(),
            },
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 1.0,
            tls: None,
        };

        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3002);
    }

    #[test]
    fn test_reminder_config_debug_redacts_secret() {
        let config = ReminderConfig {
            trigger_secret: SecretString::from("wJ8#kP2$mN5@qR7!"),
            offsets: reminder::parse_offsets("24h").unwrap(),
            grace: chrono::Duration::hours(1),
            concurrency: 8,
            send_timeout: std::time::Duration::from_secs(10),
            run_deadline: std::time::Duration::from_secs(55),
        };

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("wJ8#kP2$mN5@qR7!"));
        assert!(debug_output.contains("24h"));
    }

    #[test]
    fn test_email_config_debug_redacts_secrets() {
        let config = EmailConfig {
            smtp_host: "smtp.test.invalid".to_string(),
            smtp_port: 587,
            smtp_username: "rewards@test.invalid".to_string(),
            smtp_password: SecretString::from("super_secret_smtp_password"),
            from_address: "noreply@test.invalid".to_string(),
        };

        let debug_output = format!("{config:?}");

        // Public fields should be visible
        assert!(debug_output.contains("smtp.test.invalid"));
        assert!(debug_output.contains("587"));
        assert!(debug_output.contains("noreply@test.invalid"));

        // Secret fields should be redacted
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_smtp_password"));
    }
}
