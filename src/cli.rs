//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::Database;
use crate::password::Passwords;
use clap::Parser;
use std::time::Duration;
use tracing::{error, info};
use url::Url;

const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Upper bound for either token lifetime (10 years).
const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

pub const ACCESS_SECRET_ENV: &str = "JWT_ACCESS_SECRET";
pub const REFRESH_SECRET_ENV: &str = "JWT_REFRESH_SECRET";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tally-auth",
    about = "Authentication service with rotating refresh tokens"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7291")]
    pub port: u16,

    /// Path to SQLite database file, or ":memory:"
    #[arg(short, long, default_value = "tally.db")]
    pub database: String,

    /// Public origin of the service (full URL, e.g., "https://auth.example.com")
    #[arg(long, default_value = "http://localhost:7291")]
    pub origin: String,

    /// Production mode: cross-site Secure cookies, HTTPS origin required
    #[arg(long, env = "TALLY_PRODUCTION")]
    pub production: bool,

    /// Access token lifetime, e.g. "15m"
    #[arg(long, default_value = "15m", value_parser = parse_ttl)]
    pub access_ttl: Duration,

    /// Refresh token lifetime, e.g. "7d"
    #[arg(long, default_value = "7d", value_parser = parse_ttl)]
    pub refresh_ttl: Duration,

    /// Path to file containing the access token secret. Prefer JWT_ACCESS_SECRET
    #[arg(long)]
    pub access_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer JWT_REFRESH_SECRET
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Parse a lifetime written as `<n><unit>`, unit one of `s`, `m`, `h`, `d`.
pub fn parse_ttl(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let Some(unit) = s.chars().last() else {
        return Err("Duration cannot be empty".to_string());
    };
    let multiplier = match unit {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        'd' => 24 * 60 * 60,
        _ => return Err(format!("Duration must end in s, m, h or d: {}", s)),
    };
    let amount: u64 = s[..s.len() - 1]
        .parse()
        .map_err(|_| format!("Invalid duration: {}", s))?;
    if amount == 0 {
        return Err(format!("Duration must be positive: {}", s));
    }
    amount
        .checked_mul(multiplier)
        .filter(|secs| *secs <= MAX_TTL_SECS)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("Duration is too large: {}", s))
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load a signing secret from an environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_secret(env_var: &str, secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        secret
    } else if let Some(path) = secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return None;
            }
        }
    } else {
        error!(
            env = env_var,
            "Signing secret is required. Set the environment variable (recommended) or pass a secret file"
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            env = env_var,
            "Secret is shorter than {} characters. Use a longer secret", MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Load both signing secrets. They must differ so neither token kind
/// verifies under the other's key.
pub fn load_secrets(args: &Args) -> Option<(String, String)> {
    let access = load_secret(ACCESS_SECRET_ENV, args.access_secret_file.as_deref())?;
    let refresh = load_secret(REFRESH_SECRET_ENV, args.refresh_secret_file.as_deref())?;

    if access == refresh {
        error!("Access and refresh secrets must be different");
        return None;
    }

    Some((access, refresh))
}

/// Parse and validate the public origin.
/// Returns None and logs an error if validation fails.
pub fn validate_origin(origin: &str, production: bool) -> Option<Url> {
    let url = match Url::parse(origin) {
        Ok(url) => url,
        Err(e) => {
            error!(origin = %origin, error = %e, "Invalid origin URL");
            return None;
        }
    };

    if production && url.scheme() != "https" {
        error!(origin = %origin, "Origin must use HTTPS in production");
        return None;
    }

    Some(url)
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    access_secret: String,
    refresh_secret: String,
) -> ServerConfig {
    ServerConfig {
        db,
        access_secret: access_secret.into_bytes(),
        refresh_secret: refresh_secret.into_bytes(),
        access_ttl: args.access_ttl,
        refresh_ttl: args.refresh_ttl,
        production: args.production,
        passwords: Passwords::default(),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ttl() {
        assert_eq!(parse_ttl("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_ttl("15m"), Ok(Duration::from_secs(900)));
        assert_eq!(parse_ttl("2h"), Ok(Duration::from_secs(7200)));
        assert_eq!(parse_ttl("7d"), Ok(Duration::from_secs(604800)));
        assert_eq!(parse_ttl("3650d"), Ok(Duration::from_secs(MAX_TTL_SECS)));
    }

    #[test]
    fn test_parse_ttl_rejects_bad_input() {
        for input in [
            "", "15", "m", "0m", "-1m", "1.5h", "10w", "1 d", "3651d", "213503982334601d",
        ] {
            assert!(parse_ttl(input).is_err(), "{input:?} should be rejected");
        }
    }

    #[test]
    fn test_validate_origin() {
        assert!(validate_origin("http://localhost:7291", false).is_some());
        assert!(validate_origin("http://localhost:7291", true).is_none());
        assert!(validate_origin("https://auth.example.com", true).is_some());
        assert!(validate_origin("not a url", false).is_none());
    }

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["tally-auth"]);
        assert_eq!(args.port, 7291);
        assert_eq!(args.access_ttl, Duration::from_secs(15 * 60));
        assert_eq!(args.refresh_ttl, Duration::from_secs(7 * 24 * 60 * 60));
    }

    #[test]
    fn test_secret_file_too_short() {
        let path = std::env::temp_dir().join(format!("tally-secret-{}", uuid::Uuid::new_v4()));
        std::fs::write(&path, "short\n").unwrap();
        let loaded = load_secret(
            "TALLY_TEST_SECRET_THAT_IS_NEVER_SET",
            Some(path.to_str().unwrap()),
        );
        std::fs::remove_file(&path).unwrap();
        assert!(loaded.is_none());
    }
}
