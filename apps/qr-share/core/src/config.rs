use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(15);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Timing knobs for the session lifecycle.
///
/// `heartbeat_interval` is how often viewers are asked to beat, `stale_after` is how
/// long a viewer may stay silent before a sweep evicts it, and `sweep_interval` is
/// the period of the sweep itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleConfig {
    heartbeat_interval: Duration,
    stale_after: Duration,
    sweep_interval: Duration,
}

impl LifecycleConfig {
    pub fn new(
        heartbeat_interval: Duration,
        stale_after: Duration,
        sweep_interval: Duration,
    ) -> Result<Self, LifecycleConfigError> {
        if heartbeat_interval.is_zero() {
            return Err(LifecycleConfigError::ZeroInterval("heartbeat_interval"));
        }
        if stale_after.is_zero() {
            return Err(LifecycleConfigError::ZeroInterval("stale_after"));
        }
        if sweep_interval.is_zero() {
            return Err(LifecycleConfigError::ZeroInterval("sweep_interval"));
        }
        if heartbeat_interval >= stale_after {
            return Err(LifecycleConfigError::HeartbeatNotBelowTimeout {
                heartbeat_interval,
                stale_after,
            });
        }
        Ok(Self {
            heartbeat_interval,
            stale_after,
            sweep_interval,
        })
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            stale_after: DEFAULT_STALE_AFTER,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleConfigError {
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
    #[error(
        "heartbeat interval ({heartbeat_interval:?}) must be shorter than the staleness timeout ({stale_after:?})"
    )]
    HeartbeatNotBelowTimeout {
        heartbeat_interval: Duration,
        stale_after: Duration,
    },
}
