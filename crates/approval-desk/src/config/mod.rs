use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub workflow: WorkflowConfig,
    pub roles: RoleConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let format = match environment {
            AppEnvironment::Production => LogFormat::Json,
            _ => LogFormat::Compact,
        };

        let defaults = WorkflowConfig::default();
        let workflow = WorkflowConfig {
            review_timeout: seconds_var("DESK_REVIEW_TIMEOUT_SECS", defaults.review_timeout)?,
            storage_timeout: seconds_var("DESK_STORAGE_TIMEOUT_SECS", defaults.storage_timeout)?,
            notify_timeout: seconds_var("DESK_NOTIFY_TIMEOUT_SECS", defaults.notify_timeout)?,
            max_conflict_retries: match env::var("DESK_CONFLICT_RETRIES") {
                Ok(raw) => raw
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| ConfigError::InvalidRetryCount)?,
                Err(_) => defaults.max_conflict_retries,
            },
            review_failure_policy: match env::var("DESK_REVIEW_FAILURE_POLICY") {
                Ok(raw) => ReviewFailurePolicy::parse(&raw)
                    .ok_or(ConfigError::InvalidReviewPolicy { value: raw })?,
                Err(_) => defaults.review_failure_policy,
            },
            supervisor_inbox: env::var("DESK_SUPERVISOR_INBOX")
                .ok()
                .map(|value| value.trim().to_ascii_lowercase())
                .filter(|value| !value.is_empty()),
            mail_sender: env::var("DESK_MAIL_SENDER").unwrap_or(defaults.mail_sender),
        };

        let admin_email = env::var("DESK_ADMIN_EMAIL")
            .unwrap_or_else(|_| "admin@localhost".to_string())
            .trim()
            .to_ascii_lowercase();
        if admin_email.is_empty() {
            return Err(ConfigError::MissingAdmin);
        }

        let storage = StorageConfig {
            root: env::var("DESK_STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/assets")),
            public_base_url: env::var("DESK_PUBLIC_BASE_URL")
                .unwrap_or_else(|_| format!("http://{host}:{port}/assets")),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level, format },
            workflow,
            roles: RoleConfig { admin_email },
            storage,
        })
    }
}

fn seconds_var(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => Err(ConfigError::InvalidTimeout { variable: name }),
        },
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

/// What intake does when the content reviewer errors, times out, or returns nothing usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewFailurePolicy {
    /// Abort the submission; nothing is stored.
    FailClosed,
    /// Store the submission with an `unavailable` report.
    ProceedUnreviewed,
}

impl ReviewFailurePolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fail-closed" | "fail_closed" | "closed" => Some(Self::FailClosed),
            "proceed-unreviewed" | "proceed_unreviewed" | "proceed" => {
                Some(Self::ProceedUnreviewed)
            }
            _ => None,
        }
    }
}

/// Knobs for the submission workflow and its external collaborators.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub review_timeout: Duration,
    pub storage_timeout: Duration,
    pub notify_timeout: Duration,
    pub max_conflict_retries: u32,
    pub review_failure_policy: ReviewFailurePolicy,
    /// Inbox that receives every new submission; `None` skips the supervisor e-mail.
    pub supervisor_inbox: Option<String>,
    pub mail_sender: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            review_timeout: Duration::from_secs(30),
            storage_timeout: Duration::from_secs(15),
            notify_timeout: Duration::from_secs(10),
            max_conflict_retries: 3,
            review_failure_policy: ReviewFailurePolicy::FailClosed,
            supervisor_inbox: None,
            mail_sender: "no-reply@localhost".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoleConfig {
    /// Identity that always resolves to admin and cannot be edited through the directory.
    pub admin_email: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub public_base_url: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidTimeout { variable: &'static str },
    InvalidRetryCount,
    InvalidReviewPolicy { value: String },
    MissingAdmin,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidTimeout { variable } => {
                write!(f, "{variable} must be a positive number of seconds")
            }
            ConfigError::InvalidRetryCount => {
                write!(f, "DESK_CONFLICT_RETRIES must be a non-negative integer")
            }
            ConfigError::InvalidReviewPolicy { value } => write!(
                f,
                "DESK_REVIEW_FAILURE_POLICY '{value}' is not one of fail-closed, proceed-unreviewed"
            ),
            ConfigError::MissingAdmin => write!(f, "DESK_ADMIN_EMAIL must not be blank"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
