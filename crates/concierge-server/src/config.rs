use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use concierge_messaging::{DirectoryMode, MessagingConfig};

/// Log filter used when `RUST_LOG` is unset. Each crate logs under its own
/// target, so every one is listed.
pub const DEFAULT_LOG_FILTER: &str = "concierge=debug,concierge_api=debug,concierge_gateway=debug,\
     concierge_messaging=debug,concierge_db=debug,tower_http=debug";

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub media_dir: PathBuf,
    pub public_url: String,
    pub messaging: MessagingConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = var("CONCIERGE_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("CONCIERGE_JWT_SECRET is unset or still a placeholder");
        }

        let defaults = MessagingConfig::default();
        let directory_mode = if parse_or(&var, "CONCIERGE_CANONICAL_PAIRS", false)? {
            DirectoryMode::CanonicalPair
        } else {
            DirectoryMode::LookupThenCreate
        };

        Ok(Self {
            host: var("CONCIERGE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&var, "CONCIERGE_PORT", 3000)?,
            db_path: var("CONCIERGE_DB_PATH").unwrap_or_else(|| "concierge.db".into()).into(),
            jwt_secret,
            media_dir: var("CONCIERGE_MEDIA_DIR").unwrap_or_else(|| "./media".into()).into(),
            public_url: var("CONCIERGE_PUBLIC_URL").unwrap_or_else(|| "http://localhost:3000".into()),
            messaging: MessagingConfig {
                directory_mode,
                max_image_bytes: parse_or(&var, "CONCIERGE_MAX_IMAGE_BYTES", defaults.max_image_bytes)?,
                max_video_bytes: parse_or(&var, "CONCIERGE_MAX_VIDEO_BYTES", defaults.max_video_bytes)?,
                community_window: parse_or(&var, "CONCIERGE_COMMUNITY_WINDOW", defaults.community_window)?,
                ..defaults
            },
        })
    }

    /// Largest request body any upload route accepts.
    pub fn max_upload_bytes(&self) -> usize {
        self.messaging.max_image_bytes.max(self.messaging.max_video_bytes)
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: '{}'", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_log_filter_names_every_crate_target() {
        let directives: Vec<&str> = DEFAULT_LOG_FILTER.split(',').collect();
        for target in [
            "concierge",
            "concierge_api",
            "concierge_gateway",
            "concierge_messaging",
            "concierge_db",
        ] {
            assert!(directives.contains(&format!("{}=debug", target).as_str()), "{}", target);
        }
        assert!(tracing_subscriber::EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }

    #[test]
    fn defaults_apply_when_only_the_secret_is_set() {
        let config = Config::from_lookup(lookup(&[("CONCIERGE_JWT_SECRET", "s3cr3t")])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, PathBuf::from("concierge.db"));
        assert_eq!(config.messaging.directory_mode, DirectoryMode::LookupThenCreate);
        assert_eq!(config.messaging.community_window, 50);
        assert_eq!(config.max_upload_bytes(), 50 * 1024 * 1024);
    }

    #[test]
    fn placeholder_secret_is_refused() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("CONCIERGE_JWT_SECRET", "dev-secret-change-me")])).is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("CONCIERGE_JWT_SECRET", "s3cr3t"),
            ("CONCIERGE_PORT", "8080"),
            ("CONCIERGE_CANONICAL_PAIRS", "true"),
            ("CONCIERGE_COMMUNITY_WINDOW", "25"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.messaging.directory_mode, DirectoryMode::CanonicalPair);
        assert_eq!(config.messaging.community_window, 25);

        let bad = Config::from_lookup(lookup(&[
            ("CONCIERGE_JWT_SECRET", "s3cr3t"),
            ("CONCIERGE_PORT", "eighty"),
        ]));
        assert!(bad.is_err());
    }
}
