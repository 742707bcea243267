//! Four-way intersection arbitration: a light phase scheduler, priority
//! preemption and per-direction dispatchers sharing one intersection state.

pub mod config;
pub mod control_system;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod global_variables;
pub mod models;
pub mod monitoring;
pub mod shared_data;
pub mod shutdown;
pub mod simulation_engine;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{ArbiterError, Result};
pub use models::{Direction, LightColor, Phase, Request, RequestPayload, Turn, VehicleType};
pub use shared_data::IntersectionSnapshot;
