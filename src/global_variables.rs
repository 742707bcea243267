// Default timings for the arbitration engine.
pub const PHASE_DURATION_SECS: u64 = 30;
pub const EMERGENCY_DURATION_SECS: u64 = 5;
pub const SERVICE_DURATION_SECS: u64 = 4;
pub const RETRY_INTERVAL_SECS: u64 = 3;

// Bounded waits so every loop observes shutdown promptly.
pub const DEQUEUE_TIMEOUT_MS: u64 = 500;
pub const POLL_INCREMENT_MS: u64 = 100;

// Most recent events kept in the intersection state.
pub const EVENT_LOG_CAPACITY: usize = 10;

// Status stream defaults
pub const STATUS_ADDR: &str = "127.0.0.1:65432";
pub const STATUS_INTERVAL_MS: u64 = 200;

// Generator defaults
pub const NORMAL_TRAFFIC_INTERVAL_SECS: f64 = 2.0;
pub const PRIORITY_TRAFFIC_INTERVAL_SECS: f64 = 15.0;
pub const RIGHT_TURN_PROBABILITY: f64 = 0.3;
