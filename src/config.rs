//! Workflow configuration.

use crate::credentials::CredentialBundle;
use crate::error::{ClipWeaveError, Result};
use crate::provider::{ProviderFamily, ProviderKind};
use std::env;
use std::time::Duration;

/// Default wait between probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Default cap on the wait between probes when backoff is enabled.
pub const DEFAULT_MAX_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Polling policy.
///
/// The defaults poll every 5 seconds with no ceiling and no overall
/// timeout. Callers that cannot watch the attempt should set `max_probes` or
/// `timeout`.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Wait before the second probe.
    pub interval: Duration,
    /// Multiplier applied to the wait after each pending probe (1.0 = fixed).
    pub backoff_factor: f64,
    /// Upper bound on any single wait.
    pub max_interval: Duration,
    /// Maximum number of probes before giving up.
    pub max_probes: Option<u32>,
    /// Maximum total time spent polling.
    pub timeout: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            backoff_factor: 1.0,
            max_interval: DEFAULT_MAX_POLL_INTERVAL,
            max_probes: None,
            timeout: None,
        }
    }
}

impl PollConfig {
    /// Sets the wait between probes.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the backoff multiplier and the cap on a single wait.
    pub fn backoff(mut self, factor: f64, max_interval: Duration) -> Self {
        self.backoff_factor = factor;
        self.max_interval = max_interval;
        self
    }

    /// Sets the probe ceiling.
    pub fn max_probes(mut self, max: u32) -> Self {
        self.max_probes = Some(max);
        self
    }

    /// Sets the overall polling timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Wait after the `completed`-th pending probe (1-based).
    ///
    /// Never exceeds `max(max_interval, interval)`; waits too large to
    /// represent saturate at that cap.
    pub fn delay_after(&self, completed: u32) -> Duration {
        let exponent = completed.saturating_sub(1).min(i32::MAX as u32) as i32;
        let cap = self.max_interval.max(self.interval);
        let scaled = self.interval.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(scaled).map_or(cap, |wait| wait.min(cap))
    }

    /// Rejects values that would make the poller spin or never wait.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(ClipWeaveError::InvalidConfig(
                "poll interval must be greater than zero".into(),
            ));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(ClipWeaveError::InvalidConfig(format!(
                "backoff factor must be >= 1.0, got {}",
                self.backoff_factor
            )));
        }
        if self.max_probes == Some(0) {
            return Err(ClipWeaveError::InvalidConfig(
                "max probes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Options for one workflow controller.
#[derive(Debug, Clone, Default)]
pub struct WorkflowConfig {
    /// Use `preset_credentials` instead of user-entered fields.
    pub dev_mode: bool,
    /// Credentials injected in dev mode.
    pub preset_credentials: Option<CredentialBundle>,
    /// Polling policy.
    pub poll: PollConfig,
}

impl WorkflowConfig {
    /// Creates the default configuration (dev mode off, default polling).
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables dev mode with the given preset credentials.
    pub fn with_dev_credentials(mut self, bundle: CredentialBundle) -> Self {
        self.dev_mode = true;
        self.preset_credentials = Some(bundle);
        self
    }

    /// Sets the polling policy.
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Loads the configuration from environment variables.
    ///
    /// Reads `CLIPWEAVE_DEV_MODE`, `CLIPWEAVE_POLL_INTERVAL_SECS`,
    /// `CLIPWEAVE_MAX_PROBES` and `CLIPWEAVE_POLL_TIMEOUT_SECS`. When dev
    /// mode is on, presets for `provider` come from
    /// [`preset_credentials_from_env`].
    pub fn from_env(provider: Option<ProviderKind>) -> Self {
        let dev_mode = env::var("CLIPWEAVE_DEV_MODE")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let mut poll = PollConfig::default();
        if let Some(secs) = env_parse::<u64>("CLIPWEAVE_POLL_INTERVAL_SECS").filter(|s| *s > 0) {
            poll.interval = Duration::from_secs(secs);
        }
        poll.max_probes = env_parse::<u32>("CLIPWEAVE_MAX_PROBES").filter(|n| *n > 0);
        poll.timeout = env_parse::<u64>("CLIPWEAVE_POLL_TIMEOUT_SECS").map(Duration::from_secs);

        let preset_credentials = if dev_mode {
            provider.and_then(preset_credentials_from_env)
        } else {
            None
        };

        Self {
            dev_mode,
            preset_credentials,
            poll,
        }
    }

    /// Returns the preset bundle when dev mode is on and it fits `family`.
    pub fn preset_for(&self, family: ProviderFamily) -> Option<&CredentialBundle> {
        if !self.dev_mode {
            return None;
        }
        self.preset_credentials
            .as_ref()
            .filter(|bundle| bundle.family() == family)
    }
}

/// Reads dev-mode credentials for `provider` from the environment.
///
/// Kling uses `KLING_ACCESS_KEY` and `KLING_SECRET_KEY` (aliases
/// `KLING_ACCESS_KEY_ID`, `KLING_ACCESS_KEY_SECRET`); MiniMax uses
/// `MINIMAX_API_KEY` and `MINIMAX_GROUP_ID` (aliases `MINMAX_API_KEY`,
/// `MINMAX_GROUP_ID`). The first name of each pair wins. Returns `None` unless
/// both values are set and non-empty.
pub fn preset_credentials_from_env(provider: ProviderKind) -> Option<CredentialBundle> {
    match provider.family() {
        ProviderFamily::AccessKey => Some(CredentialBundle::AccessKey {
            access_key_id: env_non_empty(&["KLING_ACCESS_KEY", "KLING_ACCESS_KEY_ID"])?,
            access_key_secret: env_non_empty(&["KLING_SECRET_KEY", "KLING_ACCESS_KEY_SECRET"])?,
        }),
        ProviderFamily::ApiKeyGroup => Some(CredentialBundle::ApiKeyGroup {
            api_key: env_non_empty(&["MINIMAX_API_KEY", "MINMAX_API_KEY"])?,
            group_id: env_non_empty(&["MINIMAX_GROUP_ID", "MINMAX_GROUP_ID"])?,
        }),
    }
}

fn env_non_empty(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        env::var(name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
