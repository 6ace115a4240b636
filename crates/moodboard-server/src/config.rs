use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

/// Values from sample configs that are refused as signing secrets.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me",
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub blob_dir: PathBuf,
    /// Base URL clients reach this server at; blob URLs are built from it.
    pub public_url: String,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub notification_poll: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = lookup("MOODBOARD_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("MOODBOARD_JWT_SECRET is unset or still a placeholder; set it in .env");
        }

        let port = var("MOODBOARD_PORT", "3000")
            .parse()
            .context("MOODBOARD_PORT must be a port number")?;
        let ttl_days: i64 = var("MOODBOARD_TOKEN_TTL_DAYS", "30")
            .parse()
            .context("MOODBOARD_TOKEN_TTL_DAYS must be a whole number of days")?;
        let poll_secs: u64 = var("MOODBOARD_NOTIFICATION_POLL_SECS", "60")
            .parse()
            .context("MOODBOARD_NOTIFICATION_POLL_SECS must be a whole number of seconds")?;
        if ttl_days <= 0 || poll_secs == 0 {
            bail!("token TTL and notification poll interval must be positive");
        }

        Ok(Self {
            host: var("MOODBOARD_HOST", "0.0.0.0"),
            port,
            db_path: var("MOODBOARD_DB_PATH", "moodboard.db").into(),
            blob_dir: var("MOODBOARD_BLOB_DIR", "./blobs").into(),
            public_url: var("MOODBOARD_PUBLIC_URL", "http://localhost:3000")
                .trim_end_matches('/')
                .to_string(),
            jwt_secret,
            token_ttl: chrono::Duration::days(ttl_days),
            notification_poll: Duration::from_secs(poll_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[("MOODBOARD_JWT_SECRET", "s3cret-value")]).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.db_path, PathBuf::from("moodboard.db"));
        assert_eq!(cfg.public_url, "http://localhost:3000");
        assert_eq!(cfg.notification_poll, Duration::from_secs(60));
        assert_eq!(cfg.token_ttl, chrono::Duration::days(30));
    }

    #[test]
    fn refuses_placeholder_secrets() {
        assert!(config(&[]).is_err());
        assert!(config(&[("MOODBOARD_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn rejects_bad_numbers() {
        let secret = ("MOODBOARD_JWT_SECRET", "s3cret-value");
        assert!(config(&[secret, ("MOODBOARD_PORT", "http")]).is_err());
        assert!(config(&[secret, ("MOODBOARD_NOTIFICATION_POLL_SECS", "0")]).is_err());
    }
}
