use log::{error, info, warn};
use std::time::Duration;
use tokio::time::Instant;

use crate::control_system::intersection_state::SharedIntersection;
use crate::models::direction::Phase;
use crate::shutdown::ShutdownSignal;

/// Elapsed-time bookkeeping for the normal NS/EW cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseClock {
    pub current_phase: Phase,
    pub phase_duration: Duration,
    pub elapsed_in_phase: Duration,
}

impl PhaseClock {
    pub fn new(phase_duration: Duration) -> Self {
        Self {
            current_phase: Phase::NorthSouth,
            phase_duration,
            elapsed_in_phase: Duration::ZERO,
        }
    }

    /// Adds `elapsed` to the current phase and reports whether it is due to
    /// flip. Time spent under preemption is discarded, so a resumed phase
    /// always gets its full duration.
    pub fn update(&mut self, elapsed: Duration, preempted: bool) -> bool {
        if preempted {
            self.elapsed_in_phase = Duration::ZERO;
            return false;
        }
        self.elapsed_in_phase += elapsed;
        self.elapsed_in_phase >= self.phase_duration
    }

    /// Starts `phase` from zero elapsed time.
    pub fn restart(&mut self, phase: Phase) {
        self.current_phase = phase;
        self.elapsed_in_phase = Duration::ZERO;
    }

    pub fn remaining(&self) -> Duration {
        self.phase_duration.saturating_sub(self.elapsed_in_phase)
    }
}

/// Drives the normal NS/EW alternation on the shared intersection.
pub struct TrafficLightController {
    state: SharedIntersection,
    clock: PhaseClock,
    /// Last phase epoch this controller wrote or observed.
    epoch: u64,
    tick: Duration,
}

impl TrafficLightController {
    pub fn new(state: SharedIntersection, phase_duration: Duration, tick: Duration) -> Self {
        let epoch = state.scheduler_view().phase_epoch;
        Self {
            state,
            clock: PhaseClock::new(phase_duration),
            epoch,
            tick,
        }
    }

    pub fn clock(&self) -> &PhaseClock {
        &self.clock
    }

    /// Applies the initial NS phase.
    pub fn start(&mut self) {
        let phase = self.clock.current_phase;
        self.epoch = self.state.apply_phase(phase);
        info!("{} road -> GREEN", phase);
    }

    /// One scheduler step covering `elapsed` since the previous step.
    pub fn update(&mut self, elapsed: Duration) {
        if let Err(e) = self.state.verify() {
            error!("Light invariants violated: {}", e);
        }

        let view = self.state.scheduler_view();
        if view.phase_epoch != self.epoch {
            // Phase was moved by a preemption release or a reset.
            self.epoch = view.phase_epoch;
            self.clock.restart(view.phase);
            if !view.preemption_active {
                info!("Normal cycle resumed at {} phase", view.phase);
            }
            return;
        }

        if !self.clock.update(elapsed, view.preemption_active) {
            return;
        }

        match self.state.advance_phase(self.epoch) {
            Ok(Some((phase, epoch))) => {
                self.epoch = epoch;
                self.clock.restart(phase);
                info!("{} road -> GREEN", phase);
            }
            Ok(None) => {
                warn!("Phase flip skipped, state changed underneath; resyncing next tick");
            }
            Err(e) => {
                error!("Failed to advance phase: {}; retrying next tick", e);
            }
        }
    }

    /// Runs until shutdown, ticking every `tick`.
    pub async fn run_update_loop(mut self, mut shutdown: ShutdownSignal) {
        self.start();
        let mut last = Instant::now();
        loop {
            if !shutdown.sleep(self.tick).await {
                break;
            }
            let now = Instant::now();
            self.update(now - last);
            last = now;
        }
        info!("Light phase scheduler stopped");
    }
}
