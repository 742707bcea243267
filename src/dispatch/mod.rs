pub mod direction_queue;
pub mod dispatcher;

pub use direction_queue::{DirectionQueue, DirectionQueues};
pub use dispatcher::{decide, Decision, DirectionDispatcher};
