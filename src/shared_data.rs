use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::control_system::event_log::EventRecord;
use crate::control_system::intersection_state::LightMap;
use crate::models::direction::{Direction, LightColor, Phase};
use crate::models::request::Request;

/// What external viewers see of the intersection at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntersectionSnapshot {
    pub timestamp: u64,
    pub lights: LightMap,
    pub phase: Phase,
    pub preemption_target: Option<Direction>,
    pub queue_lengths: BTreeMap<Direction, usize>,
    pub in_progress: Option<Request>,
    pub event_log: Vec<EventRecord>,
}

impl IntersectionSnapshot {
    pub fn light(&self, direction: Direction) -> LightColor {
        self.lights
            .get(&direction)
            .copied()
            .unwrap_or(LightColor::Red)
    }

    pub fn queue_length(&self, direction: Direction) -> usize {
        self.queue_lengths.get(&direction).copied().unwrap_or(0)
    }

    pub fn green_directions(&self) -> Vec<Direction> {
        self.lights
            .iter()
            .filter(|(_, color)| **color == LightColor::Green)
            .map(|(direction, _)| *direction)
            .collect()
    }

    /// One line of newline-delimited JSON for the status stream.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Seconds since the Unix epoch.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
