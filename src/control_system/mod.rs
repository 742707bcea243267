pub mod event_log;
pub mod intersection_state;
pub mod preemption;
pub mod traffic_light_controller;

pub use event_log::{EventLog, EventRecord};
pub use intersection_state::{IntersectionState, SharedIntersection};
pub use preemption::{preemption_channel, PreemptionHandle, PreemptionHandler};
pub use traffic_light_controller::{PhaseClock, TrafficLightController};
