use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ArbiterError, Result};
use crate::models::direction::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Turn {
    Straight,
    Left,
    Right,
    Emergency,
}

impl fmt::Display for Turn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Turn::Straight => f.write_str("straight"),
            Turn::Left => f.write_str("left"),
            Turn::Right => f.write_str("right"),
            Turn::Emergency => f.write_str("emergency"),
        }
    }
}

/// Different kinds of vehicles that can request a crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Normal,
    Ambulance,
    FireTruck,
    Police,
}

impl VehicleType {
    pub fn is_emergency(self) -> bool {
        !matches!(self, VehicleType::Normal)
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VehicleType::Normal => f.write_str("normal"),
            VehicleType::Ambulance => f.write_str("ambulance"),
            VehicleType::FireTruck => f.write_str("fire_truck"),
            VehicleType::Police => f.write_str("police"),
        }
    }
}

/// A single crossing attempt. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub vehicle_type: VehicleType,
    pub urgent: bool,
    pub origin: Direction,
    pub destination: Direction,
    pub turn: Turn,
    pub created_at: DateTime<Local>,
}

impl Request {
    /// A non-urgent crossing request.
    pub fn new(id: impl Into<String>, origin: Direction, destination: Direction, turn: Turn) -> Self {
        Self {
            id: id.into(),
            vehicle_type: VehicleType::Normal,
            urgent: false,
            origin,
            destination,
            turn,
            created_at: Local::now(),
        }
    }

    /// An urgent request; these always carry the `emergency` turn.
    pub fn urgent(
        id: impl Into<String>,
        vehicle_type: VehicleType,
        origin: Direction,
        destination: Direction,
    ) -> Self {
        Self {
            id: id.into(),
            vehicle_type,
            urgent: true,
            origin,
            destination,
            turn: Turn::Emergency,
            created_at: Local::now(),
        }
    }

    /// Checks the cross-field rules a producer could get wrong.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(self.malformed("empty id"));
        }
        if self.origin == self.destination {
            return Err(self.malformed("destination equals origin"));
        }
        if self.turn == Turn::Emergency && !self.urgent {
            return Err(self.malformed("emergency turn on a non-urgent request"));
        }
        Ok(())
    }

    /// First eight characters of the id, as shown in log lines.
    pub fn short_id(&self) -> &str {
        match self.id.char_indices().nth(8) {
            Some((idx, _)) => &self.id[..idx],
            None => &self.id,
        }
    }

    fn malformed(&self, reason: &str) -> ArbiterError {
        ArbiterError::MalformedRequest {
            id: self.id.clone(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}vehicle {} from {} to {} (turn: {})",
            if self.urgent { "PRIORITY " } else { "" },
            self.short_id(),
            self.origin,
            self.destination,
            self.turn
        )
    }
}

/// Loosely typed producer input, as received over JSON.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestPayload {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub vehicle_type: Option<VehicleType>,
    #[serde(alias = "priority")]
    pub urgent: Option<bool>,
    #[serde(alias = "source")]
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub turn: Option<Turn>,
    pub created_at: Option<DateTime<Local>>,
}

impl TryFrom<RequestPayload> for Request {
    type Error = ArbiterError;

    fn try_from(payload: RequestPayload) -> Result<Self> {
        let id = payload.id.unwrap_or_default();
        let missing = |field: &str| ArbiterError::MalformedRequest {
            id: id.clone(),
            reason: format!("missing field `{}`", field),
        };

        let urgent = payload.urgent.ok_or_else(|| missing("urgent"))?;
        let origin = payload.origin.as_deref().ok_or_else(|| missing("origin"))?;
        let destination = payload
            .destination
            .as_deref()
            .ok_or_else(|| missing("destination"))?;
        let turn = payload.turn.ok_or_else(|| missing("turn"))?;

        let request = Request {
            vehicle_type: payload.vehicle_type.unwrap_or(if urgent {
                VehicleType::Ambulance
            } else {
                VehicleType::Normal
            }),
            urgent,
            origin: origin.parse()?,
            destination: destination.parse()?,
            turn,
            created_at: payload.created_at.unwrap_or_else(Local::now),
            id,
        };
        request.validate()?;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_with_all_fields_converts() {
        let payload: RequestPayload = serde_json::from_str(
            r#"{"id":"v1","priority":false,"source":"E","destination":"W","turn":"left"}"#,
        )
        .unwrap();
        let request = Request::try_from(payload).unwrap();
        assert_eq!(request.origin, Direction::East);
        assert_eq!(request.destination, Direction::West);
        assert_eq!(request.vehicle_type, VehicleType::Normal);
        assert!(!request.urgent);
    }

    #[test]
    fn payload_missing_turn_is_malformed() {
        let payload: RequestPayload =
            serde_json::from_str(r#"{"id":"v2","urgent":false,"origin":"N","destination":"S"}"#)
                .unwrap();
        match Request::try_from(payload) {
            Err(ArbiterError::MalformedRequest { id, reason }) => {
                assert_eq!(id, "v2");
                assert!(reason.contains("turn"));
            }
            other => panic!("expected malformed request, got {:?}", other),
        }
    }

    #[test]
    fn payload_with_bad_direction_is_rejected() {
        let payload = RequestPayload {
            id: Some("v3".into()),
            urgent: Some(false),
            origin: Some("Q".into()),
            destination: Some("S".into()),
            turn: Some(Turn::Straight),
            ..Default::default()
        };
        assert!(matches!(
            Request::try_from(payload),
            Err(ArbiterError::InvalidDirection(_))
        ));
    }

    #[test]
    fn validate_catches_inconsistent_requests() {
        let u_turn = Request::new("v4", Direction::North, Direction::North, Turn::Left);
        assert!(u_turn.validate().is_err());

        let mut fake = Request::new("v5", Direction::North, Direction::East, Turn::Left);
        fake.turn = Turn::Emergency;
        assert!(fake.validate().is_err());

        let ok = Request::urgent("e1", VehicleType::Police, Direction::West, Direction::East);
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn short_id_truncates_long_ids() {
        let request = Request::new(
            "0123456789abcdef",
            Direction::South,
            Direction::North,
            Turn::Straight,
        );
        assert_eq!(request.short_id(), "01234567");
        let request = Request::new("v1", Direction::South, Direction::North, Turn::Straight);
        assert_eq!(request.short_id(), "v1");
    }
}
