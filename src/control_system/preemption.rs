//! Priority preemption: an asynchronous entry point that forces a single
//! direction GREEN for at least the emergency duration.
//!
//! Requests travel over an unbounded channel to one handler task, so the
//! caller never blocks and arrival order on the channel is the tie-break
//! between concurrent urgent requests. While a hold is active, a request
//! for the same direction extends it and a request for another direction
//! is queued and applied as soon as the hold expires, without passing
//! through normal mode.

use log::{error, info, warn};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use crate::control_system::intersection_state::SharedIntersection;
use crate::error::{ArbiterError, Result};
use crate::global_variables::POLL_INCREMENT_MS;
use crate::models::direction::Direction;
use crate::shutdown::ShutdownSignal;

/// Cloneable entry point used by dispatchers and external notifiers.
#[derive(Debug, Clone)]
pub struct PreemptionHandle {
    tx: mpsc::UnboundedSender<Direction>,
    state: SharedIntersection,
}

impl PreemptionHandle {
    pub fn request_preemption(&self, direction: Direction) -> Result<()> {
        self.tx.send(direction).map_err(|_| {
            error!(
                "Preemption request for {} dropped: handler is not running",
                direction
            );
            self.state.append_event(format!(
                "Preemption request for {} failed: channel unavailable",
                direction
            ));
            ArbiterError::ChannelUnavailable(direction)
        })
    }

    /// Entry point for callers holding a raw direction name.
    pub fn request_preemption_by_name(&self, direction: &str) -> Result<()> {
        let direction: Direction = direction.parse().map_err(|e| {
            warn!("Dropping preemption request: {}", e);
            e
        })?;
        self.request_preemption(direction)
    }

    pub fn is_available(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// The task side of the preemption channel.
pub struct PreemptionHandler {
    rx: mpsc::UnboundedReceiver<Direction>,
    state: SharedIntersection,
    emergency_duration: Duration,
    /// How often an expired hold re-checks for an urgent vehicle still in
    /// the crossing.
    recheck: Duration,
    pending: VecDeque<Direction>,
    closed: bool,
}

pub fn preemption_channel(
    state: SharedIntersection,
    emergency_duration: Duration,
) -> (PreemptionHandle, PreemptionHandler) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = PreemptionHandle {
        tx,
        state: state.clone(),
    };
    let handler = PreemptionHandler {
        rx,
        state,
        emergency_duration,
        recheck: Duration::from_millis(POLL_INCREMENT_MS),
        pending: VecDeque::new(),
        closed: false,
    };
    (handle, handler)
}

impl PreemptionHandler {
    pub fn recheck_every(mut self, interval: Duration) -> Self {
        self.recheck = interval;
        self
    }

    /// An urgent vehicle from `direction` is still transiting.
    fn urgent_transit_on(&self, direction: Direction) -> bool {
        self.state
            .in_progress()
            .is_some_and(|r| r.urgent && r.origin == direction)
    }

    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        info!("Preemption handler ready");
        loop {
            let direction = tokio::select! {
                _ = shutdown.triggered() => break,
                msg = self.rx.recv() => match msg {
                    Some(direction) => direction,
                    None => break,
                },
            };
            if !self.serve(direction, &mut shutdown).await {
                break;
            }
        }
        self.rx.close();
        info!("Preemption handler stopped");
    }

    /// Holds `first`, then every direction queued behind it. Returns
    /// `false` when interrupted by shutdown.
    async fn serve(&mut self, first: Direction, shutdown: &mut ShutdownSignal) -> bool {
        let mut current = first;
        loop {
            if let Err(e) = self.state.begin_preemption(current) {
                error!("Could not start priority override for {}: {}", current, e);
            } else {
                warn!(
                    "Priority override: {} GREEN for at least {:?}",
                    current, self.emergency_duration
                );
            }

            let mut deadline = Instant::now() + self.emergency_duration;
            loop {
                tokio::select! {
                    _ = shutdown.triggered() => return false,
                    _ = sleep_until(deadline) => {
                        if !self.urgent_transit_on(current) {
                            break;
                        }
                        deadline = Instant::now() + self.recheck;
                    }
                    msg = self.rx.recv(), if !self.closed => match msg {
                        Some(direction) if direction == current => {
                            deadline = deadline.max(Instant::now() + self.emergency_duration);
                            info!("Priority override for {} extended", current);
                            self.state
                                .append_event(format!("Priority override for {} extended", current));
                        }
                        Some(direction) => {
                            if !self.pending.contains(&direction) {
                                self.pending.push_back(direction);
                                info!(
                                    "Priority request for {} queued behind active override for {}",
                                    direction, current
                                );
                                self.state.append_event(format!(
                                    "Priority request for {} queued behind {}",
                                    direction, current
                                ));
                            }
                        }
                        None => self.closed = true,
                    },
                }
            }

            match self.pending.pop_front() {
                Some(next) => {
                    info!("Priority override handed from {} to {}", current, next);
                    current = next;
                }
                None => {
                    let resume = current.phase();
                    if let Err(e) = self.state.end_preemption(resume) {
                        error!("Could not release priority override: {}", e);
                    } else {
                        info!(
                            "Priority override for {} released, resuming at {} phase",
                            current, resume
                        );
                    }
                    return true;
                }
            }
        }
    }
}
