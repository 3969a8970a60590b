//! Server configuration from the environment.

use crate::types::SessionConfig;
use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Base of invite links handed out when a room is created
    pub public_url: String,
    /// How often the session clock task ticks every room
    pub tick_interval: Duration,
    /// Base seed for room RNGs (None = seed from the OS)
    pub seed: Option<u64>,
    /// Rooms without human activity for this long are removed
    pub room_idle_timeout: Duration,
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 6573,
            public_url: "http://localhost:6573".to_string(),
            tick_interval: Duration::from_millis(250),
            seed: None,
            room_idle_timeout: Duration::from_secs(30 * 60),
            session: SessionConfig::default(),
        }
    }
}

/// Read and parse `key`, falling back to `default` with a warning when the
/// value does not parse
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return default;
            }
            match trimmed.parse() {
                Ok(value) => value,
                Err(_) => {
                    tracing::warn!("Ignoring invalid {}={:?}, using default", key, raw);
                    default
                }
            }
        }
        Err(_) => default,
    }
}

/// Like [`env_or`] for durations and counts where zero would stall a session
fn env_positive<T>(key: &str, default: T) -> T
where
    T: FromStr + PartialEq + Default + Copy + std::fmt::Display,
{
    let value = env_or(key, default);
    if value == T::default() {
        tracing::warn!("{} must be positive, using {}", key, default);
        return default;
    }
    value
}

impl ServerConfig {
    /// Load config from BOARDROOM_* environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let public_url = std::env::var("BOARDROOM_PUBLIC_URL")
            .ok()
            .and_then(|url| {
                let trimmed = url.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .unwrap_or(defaults.public_url);

        let tick_interval = Duration::from_millis(env_positive("BOARDROOM_TICK_MS", 250));
        let idle_minutes: u64 = env_positive(
            "BOARDROOM_ROOM_IDLE_MINUTES",
            defaults.room_idle_timeout.as_secs() / 60,
        );

        let seed = std::env::var("BOARDROOM_SEED").ok().and_then(|s| {
            let parsed = s.trim().parse().ok();
            if parsed.is_none() {
                tracing::warn!("Ignoring invalid BOARDROOM_SEED={:?}", s);
            }
            parsed
        });

        let session = SessionConfig {
            day_seconds: env_positive("BOARDROOM_DAY_SECONDS", defaults.session.day_seconds),
            discussion_seconds: env_positive(
                "BOARDROOM_DISCUSSION_SECONDS",
                defaults.session.discussion_seconds,
            ),
            ..defaults.session
        };

        let config = Self {
            port: env_or("BOARDROOM_PORT", defaults.port),
            public_url,
            tick_interval,
            seed,
            room_idle_timeout: Duration::from_secs(idle_minutes * 60),
            session,
        };
        tracing::info!(
            port = config.port,
            public_url = %config.public_url,
            tick_ms = config.tick_interval.as_millis() as u64,
            seeded = config.seed.is_some(),
            "Server config loaded"
        );
        config
    }

    /// Link a participant can open to join `code`
    pub fn invite_url(&self, code: &str) -> String {
        format!("{}/#room={}", self.public_url.trim_end_matches('/'), code)
    }
}
