//! Routing-domain configuration.

use crate::error::{Error, Result};

/// Configuration for a [`crate::RoutingDomain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingConfig {
    /// Recompute stale route tables on the worker pool instead of inline
    pub async_recompute: bool,

    /// Number of recompute worker threads
    pub worker_count: usize,

    /// Capacity of the routing event channel
    pub event_capacity: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            async_recompute: true,
            worker_count: 2,
            event_capacity: 256,
        }
    }
}

impl RoutingConfig {
    /// Inline recomputation only; no worker threads are started.
    pub fn synchronous() -> Self {
        Self {
            async_recompute: false,
            ..Self::default()
        }
    }

    /// Create config from environment variables with defaults for anything
    /// unset.
    ///
    /// - `CITADEL_ROUTING_ASYNC`: `true`/`false`/`1`/`0`
    /// - `CITADEL_ROUTING_WORKERS`: worker thread count, at least 1
    /// - `CITADEL_ROUTING_EVENT_CAPACITY`: event channel capacity, at least 1
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let async_recompute = match lookup("CITADEL_ROUTING_ASYNC") {
            None => defaults.async_recompute,
            Some(v) => match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(Error::Config(format!(
                        "CITADEL_ROUTING_ASYNC: expected a boolean, got {:?}",
                        other
                    )))
                }
            },
        };

        let worker_count = parse_count(&lookup, "CITADEL_ROUTING_WORKERS", defaults.worker_count)?;
        let event_capacity =
            parse_count(&lookup, "CITADEL_ROUTING_EVENT_CAPACITY", defaults.event_capacity)?;

        let config = Self {
            async_recompute,
            worker_count,
            event_capacity,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the domain cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(Error::Config("worker_count must be at least 1".into()));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

fn parse_count<F>(lookup: &F, key: &str, default: usize) -> Result<usize>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{}: {:?} is not a count ({})", key, v, e))),
    }
}
