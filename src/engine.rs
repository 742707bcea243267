//! The arbitration engine: one light phase scheduler, one preemption
//! handler and four direction dispatchers around a single shared state.

use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::control_system::intersection_state::SharedIntersection;
use crate::control_system::preemption::{preemption_channel, PreemptionHandle};
use crate::control_system::traffic_light_controller::TrafficLightController;
use crate::dispatch::direction_queue::DirectionQueues;
use crate::dispatch::dispatcher::{crossing_slot, DirectionDispatcher};
use crate::error::{ArbiterError, Result};
use crate::models::direction::Direction;
use crate::models::request::{Request, RequestPayload};
use crate::shared_data::{current_timestamp, IntersectionSnapshot};
use crate::shutdown::{ShutdownSignal, ShutdownTrigger};

pub struct Engine {
    config: EngineConfig,
    state: SharedIntersection,
    queues: Arc<DirectionQueues>,
    preemption: PreemptionHandle,
    shutdown: ShutdownTrigger,
    tasks: AsyncMutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Spawns every engine task on the current tokio runtime.
    pub fn start(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        tokio::runtime::Handle::try_current()
            .map_err(|e| ArbiterError::Runtime(e.to_string()))?;

        let state = SharedIntersection::new(config.event_log_capacity);
        let queues = Arc::new(DirectionQueues::new());
        let shutdown = ShutdownTrigger::new();
        let (preemption, handler) = preemption_channel(state.clone(), config.emergency_duration);
        let handler = handler.recheck_every(config.poll_increment);
        let crossing = crossing_slot();

        let mut tasks = Vec::with_capacity(6);
        let scheduler = TrafficLightController::new(
            state.clone(),
            config.phase_duration,
            config.poll_increment,
        );
        tasks.push(tokio::spawn(scheduler.run_update_loop(shutdown.subscribe())));
        tasks.push(tokio::spawn(handler.run(shutdown.subscribe())));
        for direction in Direction::ALL {
            let dispatcher = DirectionDispatcher::new(
                direction,
                Arc::clone(&queues),
                state.clone(),
                preemption.clone(),
                Arc::clone(&crossing),
                config.clone(),
            );
            tasks.push(supervise(dispatcher, shutdown.subscribe()));
        }

        info!(
            "Intersection engine started (phase {:?}, emergency hold {:?}, service {:?})",
            config.phase_duration, config.emergency_duration, config.service_duration
        );

        Ok(Self {
            config,
            state,
            queues,
            preemption,
            shutdown,
            tasks: AsyncMutex::new(tasks),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &SharedIntersection {
        &self.state
    }

    pub fn queues(&self) -> &DirectionQueues {
        &self.queues
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_triggered()
    }

    /// A signal that fires when this engine shuts down.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.subscribe()
    }

    /// The entry point external urgent-request notifiers hold on to.
    pub fn preemption_handle(&self) -> PreemptionHandle {
        self.preemption.clone()
    }

    pub fn request_preemption(&self, direction: Direction) -> Result<()> {
        self.preemption.request_preemption(direction)
    }

    /// Puts a request on the queue matching its origin.
    pub fn submit(&self, request: Request) -> Result<()> {
        if !self.is_running() {
            return Err(ArbiterError::EngineStopped);
        }
        if let Err(e) = request.validate() {
            warn!("Rejected request: {}", e);
            return Err(e);
        }
        // A shutdown racing past the check above closes the queues first.
        self.queues.enqueue(request)
    }

    /// Parses a JSON request document and submits it.
    pub fn submit_json(&self, text: &str) -> Result<()> {
        let payload: RequestPayload = serde_json::from_str(text)?;
        let request = Request::try_from(payload).map_err(|e| {
            warn!("Rejected request: {}", e);
            e
        })?;
        self.submit(request)
    }

    /// Lights, preemption, crossing and log come from one locked read;
    /// each queue length is its own read.
    pub fn snapshot(&self) -> IntersectionSnapshot {
        let state = self.state.state();
        IntersectionSnapshot {
            timestamp: current_timestamp(),
            lights: state.lights(),
            phase: state.phase(),
            preemption_target: state.preemption_target(),
            queue_lengths: self.queues.lengths(),
            in_progress: state.in_progress().cloned(),
            event_log: state.event_log().to_vec(),
        }
    }

    /// Stops every task, waits for in-flight work to release the crossing,
    /// drops pending requests and resets the state. Safe to call more than
    /// once and from several tasks at the same time.
    pub async fn shutdown(&self) {
        if self.shutdown.trigger() {
            info!("Intersection engine shutting down");
        }

        let mut tasks = self.tasks.lock().await;
        if tasks.is_empty() {
            return;
        }
        for task in tasks.drain(..) {
            if let Err(e) = task.await {
                error!("Engine task ended abnormally: {}", e);
            }
        }

        let dropped = self.queues.close_all();
        if dropped > 0 {
            info!("Discarded {} pending requests", dropped);
        }
        self.state.clear();
        info!("Intersection engine stopped");
    }
}

/// Restarts a dispatcher whose loop panicked, until shutdown.
fn supervise(dispatcher: DirectionDispatcher, shutdown: ShutdownSignal) -> JoinHandle<()> {
    tokio::spawn(async move {
        let direction = dispatcher.direction();
        loop {
            let run = tokio::spawn(dispatcher.clone().run(shutdown.clone()));
            match run.await {
                Ok(()) => break,
                Err(e) if e.is_panic() && !shutdown.is_triggered() => {
                    error!("[{}] Dispatcher panicked, restarting: {}", direction, e);
                }
                Err(e) => {
                    error!("[{}] Dispatcher task failed: {}", direction, e);
                    break;
                }
            }
        }
    })
}
