use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{ArbiterError, Result};
use crate::global_variables::{
    DEQUEUE_TIMEOUT_MS, EMERGENCY_DURATION_SECS, EVENT_LOG_CAPACITY, PHASE_DURATION_SECS,
    POLL_INCREMENT_MS, RETRY_INTERVAL_SECS, SERVICE_DURATION_SECS,
};

/// Timing contracts and policy switches for one engine instance.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// How long each pair stays GREEN in normal mode.
    pub phase_duration: Duration,
    /// Minimum GREEN hold granted to a preempting direction.
    pub emergency_duration: Duration,
    /// Transit time a request occupies the crossing slot.
    pub service_duration: Duration,
    /// How long a deferred request waits for GREEN before re-queueing.
    pub retry_interval: Duration,
    pub dequeue_timeout: Duration,
    /// Granularity of every bounded wait.
    pub poll_increment: Duration,
    pub event_log_capacity: usize,
    pub allow_right_turn_on_red: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            phase_duration: Duration::from_secs(PHASE_DURATION_SECS),
            emergency_duration: Duration::from_secs(EMERGENCY_DURATION_SECS),
            service_duration: Duration::from_secs(SERVICE_DURATION_SECS),
            retry_interval: Duration::from_secs(RETRY_INTERVAL_SECS),
            dequeue_timeout: Duration::from_millis(DEQUEUE_TIMEOUT_MS),
            poll_increment: Duration::from_millis(POLL_INCREMENT_MS),
            event_log_capacity: EVENT_LOG_CAPACITY,
            allow_right_turn_on_red: false,
        }
    }
}

/// On-disk shape of the config; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    phase_secs: Option<f64>,
    emergency_secs: Option<f64>,
    service_secs: Option<f64>,
    retry_secs: Option<f64>,
    dequeue_timeout_ms: Option<u64>,
    poll_increment_ms: Option<u64>,
    event_log_capacity: Option<usize>,
    allow_right_turn_on_red: Option<bool>,
}

impl EngineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let file: ConfigFile = serde_json::from_str(text)?;
        let mut config = EngineConfig::default();

        if let Some(secs) = file.phase_secs {
            config.phase_duration = secs_to_duration("phase_secs", secs)?;
        }
        if let Some(secs) = file.emergency_secs {
            config.emergency_duration = secs_to_duration("emergency_secs", secs)?;
        }
        if let Some(secs) = file.service_secs {
            config.service_duration = secs_to_duration("service_secs", secs)?;
        }
        if let Some(secs) = file.retry_secs {
            config.retry_interval = secs_to_duration("retry_secs", secs)?;
        }
        if let Some(ms) = file.dequeue_timeout_ms {
            config.dequeue_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.poll_increment_ms {
            config.poll_increment = Duration::from_millis(ms);
        }
        if let Some(capacity) = file.event_log_capacity {
            config.event_log_capacity = capacity;
        }
        if let Some(allow) = file.allow_right_turn_on_red {
            config.allow_right_turn_on_red = allow;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("phase_duration", self.phase_duration),
            ("emergency_duration", self.emergency_duration),
            ("service_duration", self.service_duration),
            ("retry_interval", self.retry_interval),
            ("dequeue_timeout", self.dequeue_timeout),
            ("poll_increment", self.poll_increment),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(ArbiterError::Config(format!("{} must be non-zero", name)));
            }
        }
        if self.event_log_capacity == 0 {
            return Err(ArbiterError::Config(
                "event_log_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn secs_to_duration(key: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| ArbiterError::Config(format!("{} = {}: {}", key, secs, e)))
}
