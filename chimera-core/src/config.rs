//! Runtime configuration for the generation facade.

use crate::artifact::ArtifactKind;
use crate::constants::{
    DEFAULT_IMAGE_TTL_SECS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_POLL_MAX_ATTEMPTS,
    DEFAULT_TEXT_TTL_SECS,
};
use std::str::FromStr;
use std::time::Duration;

/// Read an environment variable and parse it, falling back to `default` when
/// it is unset or unparseable.
pub fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Read a boolean flag; anything other than `false`/`0` counts as true.
pub fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|s| !matches!(s.trim().to_lowercase().as_str(), "false" | "0"))
        .unwrap_or(default)
}

/// Per-kind facade configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationConfig {
    /// Delay between ledger status polls while waiting on another attempt
    pub poll_interval: Duration,
    /// Polls before a waiter gives up with a timeout
    pub poll_max_attempts: u32,
    /// Lifetime of a cached artifact
    pub artifact_ttl: Duration,
}

impl GenerationConfig {
    pub fn image_defaults() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            poll_max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
            artifact_ttl: Duration::from_secs(DEFAULT_IMAGE_TTL_SECS),
        }
    }

    pub fn text_defaults() -> Self {
        Self {
            artifact_ttl: Duration::from_secs(DEFAULT_TEXT_TTL_SECS),
            ..Self::image_defaults()
        }
    }

    /// Create GenerationConfig for `kind` from environment variables.
    ///
    /// # Environment Variables
    /// - `CHIMERA_POLL_INTERVAL_MS`: Wait between polls (default: 1000)
    /// - `CHIMERA_POLL_MAX_ATTEMPTS`: Polls before timing out (default: 30)
    /// - `CHIMERA_IMAGE_TTL_SECS`: Image lifetime (default: 30 days)
    /// - `CHIMERA_TEXT_TTL_SECS`: Text lifetime (default: 7 days)
    pub fn from_env(kind: ArtifactKind) -> Self {
        let (ttl_var, ttl_default) = match kind {
            ArtifactKind::Image => ("CHIMERA_IMAGE_TTL_SECS", DEFAULT_IMAGE_TTL_SECS),
            ArtifactKind::Text => ("CHIMERA_TEXT_TTL_SECS", DEFAULT_TEXT_TTL_SECS),
        };
        Self {
            poll_interval: Duration::from_millis(env_parse(
                "CHIMERA_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )),
            poll_max_attempts: env_parse("CHIMERA_POLL_MAX_ATTEMPTS", DEFAULT_POLL_MAX_ATTEMPTS)
                .max(1),
            artifact_ttl: Duration::from_secs(env_parse(ttl_var, ttl_default)),
        }
    }

    /// Fast polling for local development and tests.
    pub fn development() -> Self {
        Self {
            poll_interval: Duration::from_millis(20),
            poll_max_attempts: 50,
            artifact_ttl: Duration::from_secs(3600),
        }
    }

    /// Upper bound on how long a waiter blocks.
    pub fn max_wait(&self) -> Duration {
        self.poll_interval * self.poll_max_attempts
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_poll_max_attempts(mut self, attempts: u32) -> Self {
        self.poll_max_attempts = attempts.max(1);
        self
    }

    pub fn with_artifact_ttl(mut self, ttl: Duration) -> Self {
        self.artifact_ttl = ttl;
        self
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self::image_defaults()
    }
}
