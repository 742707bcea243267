use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ArbiterError;

/// One of the four approaches to the intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "N")]
    North,
    #[serde(rename = "S")]
    South,
    #[serde(rename = "E")]
    East,
    #[serde(rename = "W")]
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    /// The normal-mode phase this direction belongs to.
    pub fn phase(self) -> Phase {
        match self {
            Direction::North | Direction::South => Phase::NorthSouth,
            Direction::East | Direction::West => Phase::EastWest,
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            Direction::North => "N",
            Direction::South => "S",
            Direction::East => "E",
            Direction::West => "W",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Direction::North => 0,
            Direction::South => 1,
            Direction::East => 2,
            Direction::West => 3,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for Direction {
    type Err = ArbiterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "N" | "NORTH" => Ok(Direction::North),
            "S" | "SOUTH" => Ok(Direction::South),
            "E" | "EAST" => Ok(Direction::East),
            "W" | "WEST" => Ok(Direction::West),
            _ => Err(ArbiterError::InvalidDirection(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LightColor {
    Green,
    Red,
}

impl fmt::Display for LightColor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LightColor::Green => f.write_str("GREEN"),
            LightColor::Red => f.write_str("RED"),
        }
    }
}

/// Paired-direction green assignment used in normal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    #[serde(rename = "NS")]
    NorthSouth,
    #[serde(rename = "EW")]
    EastWest,
}

impl Phase {
    pub fn next(self) -> Phase {
        match self {
            Phase::NorthSouth => Phase::EastWest,
            Phase::EastWest => Phase::NorthSouth,
        }
    }

    pub fn directions(self) -> [Direction; 2] {
        match self {
            Phase::NorthSouth => [Direction::North, Direction::South],
            Phase::EastWest => [Direction::East, Direction::West],
        }
    }

    pub fn contains(self, direction: Direction) -> bool {
        direction.phase() == self
    }

    /// Light color a direction shows while this phase is active.
    pub fn light_for(self, direction: Direction) -> LightColor {
        if self.contains(direction) {
            LightColor::Green
        } else {
            LightColor::Red
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Phase::NorthSouth => f.write_str("NS"),
            Phase::EastWest => f.write_str("EW"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_long_names() {
        assert_eq!("n".parse::<Direction>().unwrap(), Direction::North);
        assert_eq!("West".parse::<Direction>().unwrap(), Direction::West);
        assert_eq!(" E ".parse::<Direction>().unwrap(), Direction::East);
    }

    #[test]
    fn rejects_unknown_direction() {
        let err = "X".parse::<Direction>().unwrap_err();
        assert!(matches!(err, ArbiterError::InvalidDirection(ref d) if d == "X"));
    }

    #[test]
    fn phases_pair_opposite_directions() {
        for dir in Direction::ALL {
            assert_eq!(dir.phase(), dir.opposite().phase());
            assert_ne!(dir.phase(), dir.phase().next().directions()[0].phase());
        }
        assert_eq!(Phase::EastWest.light_for(Direction::North), LightColor::Red);
        assert_eq!(Phase::EastWest.light_for(Direction::West), LightColor::Green);
    }

    #[test]
    fn serializes_with_short_names() {
        let json = serde_json::to_string(&Direction::East).unwrap();
        assert_eq!(json, "\"E\"");
        let json = serde_json::to_string(&LightColor::Green).unwrap();
        assert_eq!(json, "\"GREEN\"");
    }
}
