//! Configuration for the treatment tracker
//!
//! CLI arguments and environment variable handling using clap. A `.env` file
//! in the working directory is loaded first by `main`.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::auth::SessionManager;
use crate::types::TrackerError;

/// Session lifetime of 30 days
pub const DEFAULT_SESSION_MAX_AGE_SECONDS: u64 = 60 * 60 * 24 * 30;

/// Treatment tracker - patient treatment paths that unlock step by step
#[derive(Parser, Debug, Clone)]
#[command(name = "treatment-tracker")]
#[command(about = "Patient treatment tracker with symptom-driven unlocks")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// SQLite database file
    #[arg(long, env = "DATABASE_PATH", default_value = "./data/tracker.db")]
    pub database_path: PathBuf,

    /// Secret for signing session cookies (required in production, 32+ characters)
    #[arg(long, env = "APP_SECRET")]
    pub app_secret: Option<String>,

    /// Session cookie lifetime in seconds
    #[arg(long, env = "SESSION_MAX_AGE_SECONDS", default_value_t = DEFAULT_SESSION_MAX_AGE_SECONDS)]
    pub session_max_age_seconds: u64,

    /// Mark the session cookie `Secure` (disable for plain-HTTP local setups)
    #[arg(long, env = "COOKIE_SECURE", default_value = "true", action = clap::ArgAction::Set)]
    pub cookie_secure: bool,

    /// Enable development mode (built-in fixed session secret when APP_SECRET
    /// is unset, insecure cookie). Never use it for real patients.
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format: pretty or json
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Administrator account created or refreshed at startup
    #[arg(long, env = "ADMIN_EMAIL")]
    pub admin_email: Option<String>,

    /// Password for ADMIN_EMAIL
    #[arg(long, env = "ADMIN_PASSWORD")]
    pub admin_password: Option<String>,

    /// Display name for ADMIN_EMAIL
    #[arg(long, env = "ADMIN_NAME", default_value = "Administrator")]
    pub admin_name: String,

    /// Largest accepted request body in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "1048576")]
    pub max_body_bytes: usize,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            match self.app_secret.as_deref() {
                None | Some("") => {
                    return Err("APP_SECRET is required in production mode".to_string())
                }
                Some(secret) if secret.len() < 32 => {
                    return Err("APP_SECRET must be at least 32 characters".to_string())
                }
                _ => {}
            }
        }

        if self.admin_email.is_some() != self.admin_password.is_some() {
            return Err("ADMIN_EMAIL and ADMIN_PASSWORD must be set together".to_string());
        }

        if self.session_max_age_seconds == 0 {
            return Err("SESSION_MAX_AGE_SECONDS must be positive".to_string());
        }

        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            return Err("LOG_FORMAT must be 'pretty' or 'json'".to_string());
        }

        Ok(())
    }

    /// Whether logs should be emitted as JSON lines
    pub fn json_logs(&self) -> bool {
        self.log_format == "json"
    }

    /// Configured admin credentials, if both halves are present
    pub fn admin_credentials(&self) -> Option<(&str, &str)> {
        match (self.admin_email.as_deref(), self.admin_password.as_deref()) {
            (Some(email), Some(password)) => Some((email, password)),
            _ => None,
        }
    }

    /// Session manager for the configured secret.
    ///
    /// Dev mode without a secret gets a fixed development secret.
    pub fn session_manager(&self) -> Result<SessionManager, TrackerError> {
        match &self.app_secret {
            Some(secret) if !secret.is_empty() => SessionManager::new(
                secret.clone(),
                self.session_max_age_seconds,
                self.cookie_secure && !self.dev_mode,
            ),
            _ if self.dev_mode => Ok(SessionManager::new_dev()),
            _ => Err(TrackerError::Config(
                "APP_SECRET is required in production mode".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn parse(args: &[&str]) -> Args {
        let mut argv = vec!["treatment-tracker"];
        argv.extend_from_slice(args);
        Args::parse_from(argv)
    }

    #[test]
    fn test_production_requires_secret() {
        let args = parse(&["--app-secret", ""]);
        assert!(args.validate().is_err());

        let args = parse(&["--app-secret", "too-short"]);
        assert_eq!(
            args.validate().unwrap_err(),
            "APP_SECRET must be at least 32 characters"
        );

        let args = parse(&["--app-secret", SECRET]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_dev_mode_without_secret() {
        let args = parse(&["--dev-mode", "--app-secret", ""]);
        assert!(args.validate().is_ok());
        assert!(args.session_manager().is_ok());
    }

    #[test]
    fn test_admin_credentials_come_in_pairs() {
        let args = parse(&["--app-secret", SECRET, "--admin-email", "admin@example.com"]);
        assert!(args.validate().is_err());

        let args = parse(&[
            "--app-secret",
            SECRET,
            "--admin-email",
            "admin@example.com",
            "--admin-password",
            "long enough password",
        ]);
        assert!(args.validate().is_ok());
        assert_eq!(
            args.admin_credentials(),
            Some(("admin@example.com", "long enough password"))
        );
    }

    #[test]
    fn test_log_format() {
        let args = parse(&["--app-secret", SECRET, "--log-format", "json"]);
        assert!(args.validate().is_ok());
        assert!(args.json_logs());

        let args = parse(&["--app-secret", SECRET, "--log-format", "xml"]);
        assert!(args.validate().is_err());
    }
}
