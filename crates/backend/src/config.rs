//! Server configuration, read from flags or the environment.

use std::time::Duration;

use anyhow::{ensure, Context};
use clap::Parser;

use crate::auth::types::{GoogleConfig, TokenConfig};

#[derive(Parser, Clone)]
#[command(name = "backend")]
#[command(about = "Authentication API server")]
pub struct Config {
    /// Postgres connection string. Without one, accounts live in memory only.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    #[arg(long, env = "SERVER_PORT", default_value_t = 8080)]
    pub port: u16,

    /// HS256 signing secret for all issued tokens.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Access token lifetime, e.g. `15m` or `24h`.
    #[arg(long, env = "JWT_EXPIRATION", default_value = "24h", value_parser = parse_duration)]
    pub access_token_ttl: Duration,

    #[arg(
        long,
        env = "REFRESH_TOKEN_EXPIRATION",
        default_value = "7d",
        value_parser = parse_duration
    )]
    pub refresh_token_ttl: Duration,

    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    pub google_client_id: String,

    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    pub google_client_secret: String,

    /// Redirect URI registered with Google, pointing at `/auth/google/callback`.
    #[arg(long, env = "GOOGLE_CALLBACK_URL")]
    pub google_callback_url: String,

    /// How long a login started at `/auth/google/login` may take to complete.
    #[arg(long, env = "OAUTH_STATE_TTL", default_value = "10m", value_parser = parse_duration)]
    pub oauth_state_ttl: Duration,

    /// Upper bound on each request to the identity provider.
    #[arg(long, env = "PROVIDER_TIMEOUT", default_value = "10s", value_parser = parse_duration)]
    pub provider_timeout: Duration,

    /// Comma-separated list of allowed origins. Permissive when unset.
    #[arg(long, env = "CORS_ALLOWED_ORIGINS")]
    pub cors_allowed_origins: Option<String>,

    /// Mark cookies `Secure`. Enable whenever served over HTTPS.
    #[arg(long, env = "SECURE_COOKIES")]
    pub secure_cookies: bool,
}

impl Config {
    /// Reject values that parse but cannot work.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.jwt_secret.trim().is_empty(), "JWT_SECRET must not be empty");
        check_ttl("JWT_EXPIRATION", self.access_token_ttl)?;
        check_ttl("REFRESH_TOKEN_EXPIRATION", self.refresh_token_ttl)?;
        check_ttl("OAUTH_STATE_TTL", self.oauth_state_ttl)?;
        ensure!(
            !self.google_client_id.trim().is_empty(),
            "GOOGLE_CLIENT_ID must not be empty"
        );
        ensure!(
            !self.google_callback_url.trim().is_empty(),
            "GOOGLE_CALLBACK_URL must not be empty"
        );
        Ok(())
    }

    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            jwt_secret: self.jwt_secret.clone(),
            access_token_ttl: self.access_token_ttl,
            refresh_token_ttl: self.refresh_token_ttl,
        }
    }

    pub fn google_config(&self) -> anyhow::Result<GoogleConfig> {
        let state_ttl = chrono::Duration::from_std(self.oauth_state_ttl)
            .context("OAUTH_STATE_TTL is out of range")?;

        Ok(GoogleConfig {
            client_id: self.google_client_id.clone(),
            client_secret: self.google_client_secret.clone(),
            redirect_uri: self.google_callback_url.clone(),
            state_ttl,
            request_timeout: self.provider_timeout,
        })
    }
}

/// Longest lifetime accepted for tokens and OAuth state.
const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Token claims count whole seconds, so anything under one second would
/// issue tokens that are already expired.
fn check_ttl(name: &str, ttl: Duration) -> anyhow::Result<()> {
    ensure!(
        ttl >= Duration::from_secs(1),
        "{} must be at least one second",
        name
    );
    ensure!(ttl <= MAX_TTL, "{} must not exceed 10 years", name);
    Ok(())
}

/// Parse a duration such as `500ms`, `90s`, `15m`, `24h`, `7d` or `1h30m`.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("duration must not be empty".to_string());
    }

    let invalid = || format!("invalid duration '{}'", input);
    let mut total = Duration::ZERO;
    let mut rest = trimmed;

    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits == 0 {
            return Err(invalid());
        }
        let value: u64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let seconds_per_unit = match unit {
            "ms" => {
                total = total
                    .checked_add(Duration::from_millis(value))
                    .ok_or_else(invalid)?;
                continue;
            }
            "s" => 1,
            "m" => 60,
            "h" => 60 * 60,
            "d" => 24 * 60 * 60,
            "" => return Err(format!("missing unit in duration '{}'", input)),
            other => {
                return Err(format!(
                    "unknown unit '{}' in duration '{}' (use ms, s, m, h or d)",
                    other, input
                ))
            }
        };

        let part = value.checked_mul(seconds_per_unit).ok_or_else(invalid)?;
        total = total
            .checked_add(Duration::from_secs(part))
            .ok_or_else(invalid)?;
    }

    Ok(total)
}
