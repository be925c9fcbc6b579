//! Configuration management for rmtbook.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use chrono::{Duration, FixedOffset, Offset, Utc};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::is_valid_email;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "rmtbook";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "rmtbook.db";

/// Minimum length of the session signing secret, in bytes.
pub const MIN_SESSION_SECRET_LEN: usize = 32;

/// Longest accepted booking horizon.
pub const MAX_BOOKING_HORIZON_DAYS: u32 = 730;

/// Longest accepted minimum booking notice or reminder lead.
pub const MAX_LEAD_HOURS: u32 = 30 * 24;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `RMTBOOK_`, sections split on `__`)
/// 2. TOML config file at `~/.config/rmtbook/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Session cookie configuration.
    pub session: SessionConfig,
    /// Booking and background job configuration.
    pub scheduling: SchedulingConfig,
    /// Details printed on receipts and emails.
    pub practice: PracticeConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_address: IpAddr,
    /// Port to listen on.
    pub port: u16,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/rmtbook/rmtbook.db`
    pub database_path: Option<PathBuf>,
}

/// Session cookie configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// HMAC key used to sign session cookies.
    #[serde(skip_serializing)]
    pub secret: String,
    /// Session lifetime; refreshed on every authenticated request.
    pub ttl_minutes: u32,
    /// Name of the session cookie.
    pub cookie_name: String,
    /// Mark the cookie `Secure` (HTTPS only).
    pub secure_cookie: bool,
}

/// Booking rules and background job timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Offset of the practice's local time from UTC.
    pub utc_offset_minutes: i32,
    /// Granularity of bookable start times.
    pub slot_increment_minutes: u32,
    /// Turnover time kept free around every appointment.
    pub buffer_minutes: u32,
    /// How far ahead of a slot it must be booked.
    pub min_notice_hours: u32,
    /// How far into the future slots are offered.
    pub booking_horizon_days: u32,
    /// How long an appointment may stay in `rescheduling` before it is reset.
    pub stale_rescheduling_minutes: u32,
    /// How long before an appointment its reminder is sent.
    pub reminder_lead_hours: u32,
    /// Interval between background job runs.
    pub job_interval_minutes: u32,
    /// Refuse bookings from patients whose health history is missing or due.
    pub require_current_health_history: bool,
}

/// Practice details used on receipts and outgoing emails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PracticeConfig {
    /// Business name.
    pub business_name: String,
    /// Practitioner name.
    pub rmt_name: String,
    /// Practitioner registration number.
    pub rmt_registration_number: String,
    /// Address that receives booking notifications.
    pub rmt_email: String,
    /// Street address of the practice.
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 3000,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: String::new(), // Must be provided to serve
            ttl_minutes: 60,
            cookie_name: "session".to_string(),
            secure_cookie: true,
        }
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            slot_increment_minutes: 30,
            buffer_minutes: 15,
            min_notice_hours: 24,
            booking_horizon_days: 60,
            stale_rescheduling_minutes: 60,
            reminder_lead_hours: 48,
            job_interval_minutes: 15,
            require_current_health_history: true,
        }
    }
}

impl Default for PracticeConfig {
    fn default() -> Self {
        Self {
            business_name: "Massage Therapy".to_string(),
            rmt_name: String::new(),
            rmt_registration_number: String::new(),
            rmt_email: String::new(),
            address: String::new(),
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("RMTBOOK_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let scheduling = &self.scheduling;

        if scheduling.slot_increment_minutes == 0 {
            return Err(invalid("slot_increment_minutes must be greater than 0"));
        }

        if scheduling.job_interval_minutes == 0 {
            return Err(invalid("job_interval_minutes must be greater than 0"));
        }

        for (name, value, max) in [
            ("slot_increment_minutes", scheduling.slot_increment_minutes, MINUTES_PER_DAY),
            ("buffer_minutes", scheduling.buffer_minutes, MINUTES_PER_DAY),
            ("min_notice_hours", scheduling.min_notice_hours, MAX_LEAD_HOURS),
            ("booking_horizon_days", scheduling.booking_horizon_days, MAX_BOOKING_HORIZON_DAYS),
            (
                "stale_rescheduling_minutes",
                scheduling.stale_rescheduling_minutes,
                7 * MINUTES_PER_DAY,
            ),
            ("reminder_lead_hours", scheduling.reminder_lead_hours, MAX_LEAD_HOURS),
            ("job_interval_minutes", scheduling.job_interval_minutes, MINUTES_PER_DAY),
        ] {
            if value > max {
                return Err(invalid(format!("{name} ({value}) must be at most {max}")));
            }
        }

        if scheduling.min_notice() > scheduling.booking_horizon() {
            return Err(invalid("min_notice_hours must not exceed booking_horizon_days"));
        }

        if self.session.ttl_minutes == 0 {
            return Err(invalid("ttl_minutes must be greater than 0"));
        }

        if self.session.cookie_name.trim().is_empty() {
            return Err(invalid("cookie_name cannot be empty"));
        }

        if scheduling.utc_offset_minutes.abs() > 14 * 60 {
            return Err(invalid(format!(
                "utc_offset_minutes ({}) must be within +/- 840",
                scheduling.utc_offset_minutes
            )));
        }

        if !self.practice.rmt_email.is_empty() && !is_valid_email(&self.practice.rmt_email) {
            return Err(invalid(format!(
                "rmt_email is not a valid address: {}",
                self.practice.rmt_email
            )));
        }

        Ok(())
    }

    /// Check that a usable session secret is configured.
    ///
    /// Only the HTTP server needs one, so this is separate from [`validate`](Self::validate).
    ///
    /// # Errors
    ///
    /// Returns an error if the secret is missing or too short.
    pub fn require_session_secret(&self) -> Result<&[u8]> {
        let secret = self.session.secret.as_bytes();
        if secret.len() < MIN_SESSION_SECRET_LEN {
            return Err(invalid(format!(
                "session.secret must be at least {MIN_SESSION_SECRET_LEN} bytes (set RMTBOOK_SESSION__SECRET)"
            )));
        }
        Ok(secret)
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Socket address the server listens on.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.bind_address, self.server.port)
    }

    /// Get the session lifetime.
    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::minutes(i64::from(self.session.ttl_minutes))
    }

    /// Get the interval between background job runs.
    #[must_use]
    pub fn job_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.scheduling.job_interval_minutes) * 60)
    }
}

impl SchedulingConfig {
    /// The practice's local time zone.
    #[must_use]
    pub fn local_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    /// Get the slot increment as a Duration.
    #[must_use]
    pub fn slot_increment(&self) -> Duration {
        Duration::minutes(i64::from(self.slot_increment_minutes))
    }

    /// Get the buffer kept around appointments.
    #[must_use]
    pub fn buffer(&self) -> Duration {
        Duration::minutes(i64::from(self.buffer_minutes))
    }

    /// Get the minimum booking notice.
    #[must_use]
    pub fn min_notice(&self) -> Duration {
        Duration::hours(i64::from(self.min_notice_hours))
    }

    /// Get the booking horizon.
    #[must_use]
    pub fn booking_horizon(&self) -> Duration {
        Duration::days(i64::from(self.booking_horizon_days))
    }

    /// Get the window after which a rescheduling attempt is considered stale.
    #[must_use]
    pub fn stale_rescheduling_after(&self) -> Duration {
        Duration::minutes(i64::from(self.stale_rescheduling_minutes))
    }

    /// Get how far ahead reminders are sent.
    #[must_use]
    pub fn reminder_lead(&self) -> Duration {
        Duration::hours(i64::from(self.reminder_lead_hours))
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.port, 3000);
        assert!(config.session.secure_cookie);
        assert!(config.scheduling.require_current_health_history);
        assert!(config.session.secret.is_empty());
    }

    #[test]
    fn test_default_scheduling_config() {
        let scheduling = SchedulingConfig::default();

        assert_eq!(scheduling.slot_increment_minutes, 30);
        assert_eq!(scheduling.buffer_minutes, 15);
        assert_eq!(scheduling.min_notice_hours, 24);
        assert_eq!(scheduling.stale_rescheduling_minutes, 60);
        assert_eq!(scheduling.reminder_lead_hours, 48);
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_slot_increment() {
        let mut config = Config::default();
        config.scheduling.slot_increment_minutes = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("slot_increment_minutes"));
    }

    #[test]
    fn test_validate_zero_job_interval() {
        let mut config = Config::default();
        config.scheduling.job_interval_minutes = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("job_interval_minutes"));
    }

    #[test]
    fn test_validate_zero_ttl() {
        let mut config = Config::default();
        config.session.ttl_minutes = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("ttl_minutes"));
    }

    #[test]
    fn test_validate_offset_out_of_range() {
        let mut config = Config::default();
        config.scheduling.utc_offset_minutes = 15 * 60;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("utc_offset_minutes"));
    }

    #[test]
    fn test_validate_caps_scheduling_windows() {
        let mut config = Config::default();
        config.scheduling.booking_horizon_days = u32::MAX;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("booking_horizon_days"));

        let mut config = Config::default();
        config.scheduling.reminder_lead_hours = MAX_LEAD_HOURS + 1;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("reminder_lead_hours"));

        let mut config = Config::default();
        config.scheduling.min_notice_hours = u32::MAX;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("min_notice_hours"));

        let mut config = Config::default();
        config.scheduling.booking_horizon_days = MAX_BOOKING_HORIZON_DAYS;
        config.scheduling.reminder_lead_hours = MAX_LEAD_HOURS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_notice_within_horizon() {
        let mut config = Config::default();
        config.scheduling.booking_horizon_days = 1;
        config.scheduling.min_notice_hours = 25;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("min_notice_hours"));
    }

    #[test]
    fn test_validate_bad_rmt_email() {
        let mut config = Config::default();
        config.practice.rmt_email = "not-an-email".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_require_session_secret() {
        let mut config = Config::default();
        assert!(config.require_session_secret().is_err());

        config.session.secret = "x".repeat(MIN_SESSION_SECRET_LEN);
        assert_eq!(
            config.require_session_secret().unwrap().len(),
            MIN_SESSION_SECRET_LEN
        );
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        assert!(config
            .database_path()
            .to_string_lossy()
            .contains("rmtbook.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_socket_addr() {
        let config = Config::default();
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn test_local_offset() {
        let scheduling = SchedulingConfig {
            utc_offset_minutes: -300,
            ..SchedulingConfig::default()
        };
        assert_eq!(scheduling.local_offset().local_minus_utc(), -300 * 60);
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.session_ttl(), Duration::minutes(60));
        assert_eq!(config.job_interval(), std::time::Duration::from_secs(900));
        assert_eq!(config.scheduling.reminder_lead(), Duration::hours(48));
        assert_eq!(
            config.scheduling.stale_rescheduling_after(),
            Duration::minutes(60)
        );
    }

    #[test]
    fn test_load_nonexistent_config() {
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[server]\nport = 8088\n\n[scheduling]\nbuffer_minutes = 5\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.server.port, 8088);
        assert_eq!(config.scheduling.buffer_minutes, 5);
        assert_eq!(config.scheduling.slot_increment_minutes, 30);
    }

    #[test]
    fn test_secret_not_serialized() {
        let mut config = Config::default();
        config.session.secret = "super-secret".to_string();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("super-secret"));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("rmtbook"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }
}
