pub mod direction;
pub mod request;

pub use direction::{Direction, LightColor, Phase};
pub use request::{Request, RequestPayload, Turn, VehicleType};
