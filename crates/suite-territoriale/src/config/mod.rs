use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
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
    pub directory: DirectoryConfig,
    pub onboarding: OnboardingConfig,
    pub grist: GristConfig,
    pub rate_limits: RateLimitConfig,
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

        let data_dir = optional_var("DIRECTORY_DATA_DIR").map(PathBuf::from);
        let signups_file = optional_var("SIGNUPS_FILE").map(PathBuf::from);
        let open = bool_var("ONBOARDING_OPEN", false)?;

        let grist = GristConfig {
            api_key: optional_var("GRIST_API_KEY"),
            signup_doc_id: optional_var("GRIST_DOC_ID_SIGNUP"),
            pilot_doc_id: optional_var("GRIST_DOC_ID_PILOT"),
            base_url: grist_base_url(),
            timeout: Duration::from_secs(u64::from(number_var("GRIST_TIMEOUT_SECS", 10)?.get())),
        };

        let rate_limits = RateLimitConfig {
            signup_per_hour: number_var("RATE_LIMIT_SIGNUP_PER_HOUR", 5)?,
            pilot_per_hour: number_var("RATE_LIMIT_PILOT_PER_HOUR", 5)?,
            activate_per_hour: number_var("RATE_LIMIT_ACTIVATE_PER_HOUR", 10)?,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            directory: DirectoryConfig {
                data_dir,
                signups_file,
            },
            onboarding: OnboardingConfig { open },
            grist,
            rate_limits,
        })
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn bool_var(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match optional_var(key) {
        None => Ok(default),
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "y" | "on" => Ok(true),
            "0" | "false" | "no" | "n" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidBoolean { key }),
        },
    }
}

fn number_var(key: &'static str, default: u32) -> Result<NonZeroU32, ConfigError> {
    let value = match optional_var(key) {
        None => default,
        Some(raw) => raw
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidNumber { key })?,
    };
    NonZeroU32::new(value).ok_or(ConfigError::InvalidNumber { key })
}

fn grist_base_url() -> String {
    let self_managed = optional_var("GRIST_SELF_MANAGED").as_deref() == Some("Y");
    match (self_managed, optional_var("GRIST_SELF_MANAGED_HOME")) {
        (true, Some(home)) => home.trim_end_matches('/').to_string(),
        _ => DEFAULT_GRIST_URL.to_string(),
    }
}

const DEFAULT_GRIST_URL: &str = "https://docs.getgrist.com";

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

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Where the organization directory and the pending signups are loaded from.
#[derive(Debug, Clone, Default)]
pub struct DirectoryConfig {
    pub data_dir: Option<PathBuf>,
    pub signups_file: Option<PathBuf>,
}

impl DirectoryConfig {
    /// `SIGNUPS_FILE` when set, otherwise `signups.csv` inside the data directory.
    pub fn signups_path(&self) -> Option<PathBuf> {
        self.signups_file.clone().or_else(|| {
            self.data_dir
                .as_ref()
                .map(|dir| dir.join(crate::signups::SIGNUPS_FILE))
        })
    }
}

/// Whether the onboarding flow is publicly open or still behind the preview toggle.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnboardingConfig {
    pub open: bool,
}

/// Grist form-backend credentials. Missing values are reported per request, not at startup.
#[derive(Clone)]
pub struct GristConfig {
    pub api_key: Option<String>,
    pub signup_doc_id: Option<String>,
    pub pilot_doc_id: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
}

impl fmt::Debug for GristConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GristConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("signup_doc_id", &self.signup_doc_id)
            .field("pilot_doc_id", &self.pilot_doc_id)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Hourly quotas applied per client IP on the form endpoints.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub signup_per_hour: NonZeroU32,
    pub pilot_per_hour: NonZeroU32,
    pub activate_per_hour: NonZeroU32,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
    InvalidBoolean { key: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => {
                write!(f, "{key} must be a positive integer")
            }
            ConfigError::InvalidBoolean { key } => {
                write!(f, "{key} must be a boolean (true/false, 1/0, yes/no)")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidBoolean { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "DIRECTORY_DATA_DIR",
            "SIGNUPS_FILE",
            "ONBOARDING_OPEN",
            "GRIST_API_KEY",
            "GRIST_DOC_ID_SIGNUP",
            "GRIST_DOC_ID_PILOT",
            "GRIST_SELF_MANAGED",
            "GRIST_SELF_MANAGED_HOME",
            "GRIST_TIMEOUT_SECS",
            "RATE_LIMIT_SIGNUP_PER_HOUR",
            "RATE_LIMIT_PILOT_PER_HOUR",
            "RATE_LIMIT_ACTIVATE_PER_HOUR",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert!(config.directory.data_dir.is_none());
        assert!(config.directory.signups_path().is_none());
        assert!(!config.onboarding.open);
        assert_eq!(config.grist.base_url, "https://docs.getgrist.com");
        assert_eq!(config.grist.timeout, Duration::from_secs(10));
        assert_eq!(config.rate_limits.signup_per_hour.get(), 5);
        assert_eq!(config.rate_limits.pilot_per_hour.get(), 5);
        assert_eq!(config.rate_limits.activate_per_hour.get(), 10);
    }

    #[test]
    fn signups_default_to_the_data_directory() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("DIRECTORY_DATA_DIR", "/srv/suite/data");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(
            config.directory.signups_path(),
            Some(PathBuf::from("/srv/suite/data/signups.csv"))
        );

        env::set_var("SIGNUPS_FILE", "/srv/exports/signups.csv");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(
            config.directory.signups_path(),
            Some(PathBuf::from("/srv/exports/signups.csv"))
        );
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn self_managed_grist_home_is_used_only_when_flagged() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("GRIST_SELF_MANAGED_HOME", "https://grist.example.org/");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.grist.base_url, "https://docs.getgrist.com");

        env::set_var("GRIST_SELF_MANAGED", "Y");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.grist.base_url, "https://grist.example.org");
    }

    #[test]
    fn rejects_zero_quota_and_bad_boolean() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("RATE_LIMIT_SIGNUP_PER_HOUR", "0");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidNumber {
                key: "RATE_LIMIT_SIGNUP_PER_HOUR"
            })
        ));

        reset_env();
        env::set_var("ONBOARDING_OPEN", "sometimes");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidBoolean {
                key: "ONBOARDING_OPEN"
            })
        ));
    }
}
