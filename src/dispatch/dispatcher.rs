use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;

use crate::config::EngineConfig;
use crate::control_system::intersection_state::{DispatchView, SharedIntersection};
use crate::control_system::preemption::PreemptionHandle;
use crate::dispatch::direction_queue::DirectionQueues;
use crate::error::{ArbiterError, Result};
use crate::models::direction::{Direction, LightColor};
use crate::models::request::{Request, Turn};
use crate::shutdown::ShutdownSignal;

/// The engine-wide crossing slot. Whoever holds it is the single request
/// currently transiting the intersection.
pub type CrossingSlot = Arc<AsyncMutex<()>>;

pub fn crossing_slot() -> CrossingSlot {
    Arc::new(AsyncMutex::new(()))
}

/// Outcome of looking at one request against the current lights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Urgent: force the direction GREEN and admit regardless of color.
    Preempt,
    AdmitOnGreen,
    AdmitRightOnRed,
    Wait,
}

impl Decision {
    pub fn admits(self) -> bool {
        !matches!(self, Decision::Wait)
    }
}

pub fn decide(request: &Request, view: &DispatchView, allow_right_turn_on_red: bool) -> Decision {
    if request.urgent {
        return Decision::Preempt;
    }
    let direction = request.origin;
    let preempted_elsewhere = matches!(view.preemption_target, Some(target) if target != direction);
    if view.light(direction) == LightColor::Green && !preempted_elsewhere {
        Decision::AdmitOnGreen
    } else if allow_right_turn_on_red && request.turn == Turn::Right && !view.preemption_active() {
        Decision::AdmitRightOnRed
    } else {
        Decision::Wait
    }
}

/// Records the request as in progress for as long as it lives; clearing
/// happens on drop so every exit path releases the crossing.
struct InProgressGuard<'a> {
    state: &'a SharedIntersection,
}

impl<'a> InProgressGuard<'a> {
    fn enter(state: &'a SharedIntersection, request: Request) -> Self {
        state.set_in_progress(Some(request));
        Self { state }
    }
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.state.set_in_progress(None);
    }
}

/// Names the request a dispatcher was holding if its loop unwinds, so the
/// loss shows up in the log instead of vanishing with the task.
struct InHandGuard<'a> {
    state: &'a SharedIntersection,
    direction: Direction,
    id: String,
}

impl Drop for InHandGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!(
                "[{}] Dispatcher failed while handling vehicle {}; request dropped",
                self.direction, self.id
            );
            self.state.append_event(format!(
                "Vehicle {} on {} lost to dispatcher failure",
                self.id, self.direction
            ));
        }
    }
}

#[cfg(test)]
pub(crate) type FaultHook = Arc<dyn Fn(&Request) + Send + Sync>;

/// Arbitration loop for one approach.
#[derive(Clone)]
pub struct DirectionDispatcher {
    direction: Direction,
    queues: Arc<DirectionQueues>,
    state: SharedIntersection,
    preemption: PreemptionHandle,
    crossing: CrossingSlot,
    config: EngineConfig,
    /// Runs while a request occupies the crossing; lets tests fail mid-service.
    #[cfg(test)]
    fault_hook: Option<FaultHook>,
}

impl DirectionDispatcher {
    pub fn new(
        direction: Direction,
        queues: Arc<DirectionQueues>,
        state: SharedIntersection,
        preemption: PreemptionHandle,
        crossing: CrossingSlot,
        config: EngineConfig,
    ) -> Self {
        Self {
            direction,
            queues,
            state,
            preemption,
            crossing,
            config,
            #[cfg(test)]
            fault_hook: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_fault_hook(mut self, hook: FaultHook) -> Self {
        self.fault_hook = Some(hook);
        self
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub async fn run(self, mut shutdown: ShutdownSignal) {
        info!("[{}] Dispatcher started", self.direction);
        let queue = self.queues.get(self.direction);
        while !shutdown.is_triggered() {
            let next = tokio::select! {
                _ = shutdown.triggered() => break,
                next = queue.pop_timeout(self.config.dequeue_timeout) => next,
            };
            let Some(request) = next else {
                continue;
            };

            if let Err(e) = self.check(&request) {
                warn!("[{}] Discarding request: {}", self.direction, e);
                self.state
                    .append_event(format!("{} discarded request: {}", self.direction, e));
                continue;
            }
            let _in_hand = InHandGuard {
                state: &self.state,
                direction: self.direction,
                id: request.id.clone(),
            };
            self.handle(request, &mut shutdown).await;
        }
        info!("[{}] Dispatcher stopped", self.direction);
    }

    /// Producers already validate; this guards the loop against bad input.
    fn check(&self, request: &Request) -> Result<()> {
        request.validate()?;
        if request.origin != self.direction {
            return Err(ArbiterError::MalformedRequest {
                id: request.id.clone(),
                reason: format!(
                    "queued on {} but origin is {}",
                    self.direction, request.origin
                ),
            });
        }
        Ok(())
    }

    async fn handle(&self, mut request: Request, shutdown: &mut ShutdownSignal) {
        loop {
            let view = self.state.dispatch_view();
            let decision = decide(&request, &view, self.config.allow_right_turn_on_red);
            debug!(
                "[{}] {} (urgent: {}) -> {:?}",
                self.direction,
                request.short_id(),
                request.urgent,
                decision
            );
            match decision {
                Decision::Preempt => {
                    if view.preemption_target != Some(self.direction) {
                        warn!(
                            "[{}] Urgent {} {} requests priority override",
                            self.direction,
                            request.vehicle_type,
                            request.short_id()
                        );
                    }
                    // Turn the light now so other approaches stop admitting
                    // while this vehicle waits for the crossing slot.
                    self.notify_preemption(&request);
                    self.service(request, decision, shutdown).await;
                    return;
                }
                Decision::AdmitOnGreen | Decision::AdmitRightOnRed => {
                    match self.service(request, decision, shutdown).await {
                        Some(deferred) => request = deferred,
                        None => return,
                    }
                }
                Decision::Wait => match self.wait_for_green(request, shutdown).await {
                    Some(ready) => request = ready,
                    None => return,
                },
            }
        }
    }

    fn notify_preemption(&self, request: &Request) {
        if let Err(e) = self.preemption.request_preemption(self.direction) {
            error!(
                "[{}] Urgent request {} admitted without override: {}",
                self.direction,
                request.short_id(),
                e
            );
        }
    }

    /// Waits up to the retry interval for the light to turn GREEN. Returns
    /// the request when it may now be admitted, `None` once it has been
    /// re-queued (or shutdown arrived).
    async fn wait_for_green(
        &self,
        request: Request,
        shutdown: &mut ShutdownSignal,
    ) -> Option<Request> {
        info!(
            "[{}] Vehicle {} (urgent: {}) waiting at RED light",
            self.direction,
            request.short_id(),
            request.urgent
        );
        self.state.append_event(format!(
            "Vehicle {} from {} waiting at RED light",
            request.short_id(),
            self.direction
        ));

        let deadline = Instant::now() + self.config.retry_interval;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            if !shutdown.sleep(self.config.poll_increment.min(remaining)).await {
                self.requeue(request);
                return None;
            }
            let view = self.state.dispatch_view();
            if decide(&request, &view, self.config.allow_right_turn_on_red).admits() {
                return Some(request);
            }
        }

        info!(
            "[{}] Light still RED, re-queueing vehicle {}",
            self.direction,
            request.short_id()
        );
        self.state.append_event(format!(
            "Vehicle {} re-queued on {}",
            request.short_id(),
            self.direction
        ));
        self.requeue(request);
        None
    }

    fn requeue(&self, request: Request) {
        let id = request.id.clone();
        if let Err(e) = self.queues.get(self.direction).push(request) {
            warn!("[{}] Could not re-queue vehicle {}: {}", self.direction, id, e);
        }
    }

    /// Takes the crossing slot and holds it for the service duration.
    /// Returns the request back if the light changed while waiting for the
    /// slot and it may no longer go.
    async fn service(
        &self,
        request: Request,
        decision: Decision,
        shutdown: &mut ShutdownSignal,
    ) -> Option<Request> {
        let _slot = tokio::select! {
            _ = shutdown.triggered() => {
                self.requeue(request);
                return None;
            }
            slot = self.crossing.lock() => slot,
        };

        if decision == Decision::Preempt {
            // Keep the override alive for the whole transit.
            self.notify_preemption(&request);
        } else {
            let view = self.state.dispatch_view();
            if !decide(&request, &view, self.config.allow_right_turn_on_red).admits() {
                debug!(
                    "[{}] Light changed before {} could enter",
                    self.direction,
                    request.short_id()
                );
                return Some(request);
            }
        }

        let message = passed_through_message(&request, decision);
        #[cfg(test)]
        let occupant = request.clone();
        let _occupied = InProgressGuard::enter(&self.state, request);
        #[cfg(test)]
        if let Some(hook) = &self.fault_hook {
            hook(&occupant);
        }
        info!("[{}] {}", self.direction, message);
        self.state.append_event(message);

        if !shutdown.sleep(self.config.service_duration).await {
            info!("[{}] Service cut short by shutdown", self.direction);
        }
        None
    }
}

fn passed_through_message(request: &Request, decision: Decision) -> String {
    match decision {
        Decision::Preempt => format!(
            "PRIORITY {} {} from {} to {} passed through under priority override",
            request.vehicle_type,
            request.short_id(),
            request.origin,
            request.destination
        ),
        Decision::AdmitRightOnRed => format!(
            "Vehicle {} from {} to {} turned right on RED light",
            request.short_id(),
            request.origin,
            request.destination
        ),
        _ => format!(
            "Vehicle {} from {} to {} (turn: {}) passed through on GREEN light",
            request.short_id(),
            request.origin,
            request.destination,
            request.turn
        ),
    }
}
