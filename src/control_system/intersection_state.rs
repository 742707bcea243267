use log::error;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::control_system::event_log::{EventLog, EventRecord};
use crate::error::{ArbiterError, Result};
use crate::models::direction::{Direction, LightColor, Phase};
use crate::models::request::Request;

pub type LightMap = BTreeMap<Direction, LightColor>;

/// Point-in-time view a dispatcher needs to make its admission decision.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchView {
    pub lights: LightMap,
    pub preemption_target: Option<Direction>,
}

impl DispatchView {
    pub fn light(&self, direction: Direction) -> LightColor {
        self.lights
            .get(&direction)
            .copied()
            .unwrap_or(LightColor::Red)
    }

    pub fn preemption_active(&self) -> bool {
        self.preemption_target.is_some()
    }
}

/// What the phase scheduler reads each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerView {
    pub preemption_active: bool,
    pub phase: Phase,
    pub phase_epoch: u64,
}

/// The intersection's mutable state. Every field is only reachable through
/// [`SharedIntersection`] once the engine is running.
#[derive(Debug, Clone)]
pub struct IntersectionState {
    lights: [LightColor; 4],
    phase: Phase,
    /// Bumped on every phase assignment so the scheduler can notice when
    /// someone else (preemption release, reset) moved the phase.
    phase_epoch: u64,
    preemption_target: Option<Direction>,
    in_progress: Option<Request>,
    event_log: EventLog,
}

impl IntersectionState {
    /// Starts in the NS phase: `{N: GREEN, S: GREEN, E: RED, W: RED}`.
    pub fn new(event_log_capacity: usize) -> Self {
        let phase = Phase::NorthSouth;
        Self {
            lights: Direction::ALL.map(|d| phase.light_for(d)),
            phase,
            phase_epoch: 0,
            preemption_target: None,
            in_progress: None,
            event_log: EventLog::new(event_log_capacity),
        }
    }

    pub fn light(&self, direction: Direction) -> LightColor {
        self.lights[direction.index()]
    }

    pub fn lights(&self) -> LightMap {
        Direction::ALL.iter().map(|&d| (d, self.light(d))).collect()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn preemption_active(&self) -> bool {
        self.preemption_target.is_some()
    }

    pub fn preemption_target(&self) -> Option<Direction> {
        self.preemption_target
    }

    pub fn in_progress(&self) -> Option<&Request> {
        self.in_progress.as_ref()
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    /// Raw single-light write. Does not maintain the pairing invariant;
    /// callers changing phases go through `apply_phase`.
    pub fn set_light(&mut self, direction: Direction, color: LightColor) {
        self.lights[direction.index()] = color;
        self.event_log
            .append(format!("Light {} set to {}", direction, color));
    }

    pub fn apply_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.phase_epoch += 1;
        self.lights = Direction::ALL.map(|d| phase.light_for(d));
        self.event_log.append(format!("{} road -> GREEN", phase));
    }

    pub fn begin_preemption(&mut self, direction: Direction) {
        self.preemption_target = Some(direction);
        self.lights = Direction::ALL.map(|d| {
            if d == direction {
                LightColor::Green
            } else {
                LightColor::Red
            }
        });
        self.event_log.append(format!(
            "Priority override: {} -> GREEN, all other directions RED",
            direction
        ));
    }

    /// Clears preemption and resumes normal cycling at `resume`.
    pub fn end_preemption(&mut self, resume: Phase) {
        if let Some(direction) = self.preemption_target.take() {
            self.event_log
                .append(format!("Priority override for {} released", direction));
        }
        self.apply_phase(resume);
    }

    pub fn set_in_progress(&mut self, request: Option<Request>) {
        match &request {
            Some(req) => self
                .event_log
                .append(format!("{} entered the crossing", req)),
            None => {
                if let Some(prev) = &self.in_progress {
                    self.event_log
                        .append(format!("Crossing cleared after vehicle {}", prev.short_id()));
                }
            }
        }
        self.in_progress = request;
    }

    pub fn append_event(&mut self, message: impl Into<String>) {
        self.event_log.append(message);
    }

    /// Either normal pairing with exactly one pair GREEN, or exactly the
    /// preemption target GREEN.
    pub fn check_invariants(&self) -> Result<()> {
        let greens: Vec<Direction> = Direction::ALL
            .iter()
            .copied()
            .filter(|&d| self.light(d) == LightColor::Green)
            .collect();

        match self.preemption_target {
            Some(target) => {
                if greens != [target] {
                    return Err(ArbiterError::StateCorruption(format!(
                        "preemption targets {} but GREEN directions are {:?}",
                        target, greens
                    )));
                }
            }
            None => {
                let expected = self.phase.directions();
                if greens.len() != 2 || !expected.iter().all(|d| greens.contains(d)) {
                    return Err(ArbiterError::StateCorruption(format!(
                        "phase {} expects {:?} GREEN but GREEN directions are {:?}",
                        self.phase, expected, greens
                    )));
                }
            }
        }
        Ok(())
    }

    /// NS phase, no preemption, empty crossing. The event log is kept.
    pub fn reset_to_safe_default(&mut self) {
        self.preemption_target = None;
        self.in_progress = None;
        self.apply_phase(Phase::NorthSouth);
        self.event_log.append("State reset to safe default");
    }

    /// Shutdown cleanup: safe default and an empty event log.
    pub fn clear(&mut self) {
        self.reset_to_safe_default();
        self.event_log.clear();
    }
}

/// Single-lock handle shared by the scheduler, the preemption handler and
/// the dispatchers. Accessors hand out copies, never references.
#[derive(Debug, Clone)]
pub struct SharedIntersection {
    inner: Arc<Mutex<IntersectionState>>,
}

impl SharedIntersection {
    pub fn new(event_log_capacity: usize) -> Self {
        Self::from_state(IntersectionState::new(event_log_capacity))
    }

    pub fn from_state(state: IntersectionState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, IntersectionState> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            error!("Intersection state lock was poisoned; continuing with last written state");
            poisoned.into_inner()
        })
    }

    pub fn set_light(&self, direction: Direction, color: LightColor) {
        self.lock().set_light(direction, color);
    }

    /// Same as `set_light`, for callers holding an unvalidated name.
    pub fn set_light_by_name(&self, direction: &str, color: LightColor) -> Result<()> {
        let direction: Direction = direction.parse()?;
        self.set_light(direction, color);
        Ok(())
    }

    pub fn get_lights(&self) -> LightMap {
        self.lock().lights()
    }

    pub fn dispatch_view(&self) -> DispatchView {
        let state = self.lock();
        DispatchView {
            lights: state.lights(),
            preemption_target: state.preemption_target,
        }
    }

    pub fn scheduler_view(&self) -> SchedulerView {
        let state = self.lock();
        SchedulerView {
            preemption_active: state.preemption_active(),
            phase: state.phase,
            phase_epoch: state.phase_epoch,
        }
    }

    pub fn preemption_target(&self) -> Option<Direction> {
        self.lock().preemption_target
    }

    /// Applies `phase`, returning the new epoch. Used at scheduler start.
    pub fn apply_phase(&self, phase: Phase) -> u64 {
        let mut state = self.lock();
        state.apply_phase(phase);
        state.phase_epoch
    }

    /// Flips to the next phase, provided nobody else touched the phase
    /// since `expected_epoch` and no preemption is active. Returns the new
    /// phase and epoch when a flip happened.
    pub fn advance_phase(&self, expected_epoch: u64) -> Result<Option<(Phase, u64)>> {
        let mut state = self.lock();
        if state.preemption_active() || state.phase_epoch != expected_epoch {
            return Ok(None);
        }
        let next = state.phase.next();
        state.apply_phase(next);
        Self::checked(&mut state)?;
        Ok(Some((next, state.phase_epoch)))
    }

    pub fn begin_preemption(&self, direction: Direction) -> Result<()> {
        let mut state = self.lock();
        state.begin_preemption(direction);
        Self::checked(&mut state)
    }

    pub fn end_preemption(&self, resume: Phase) -> Result<()> {
        let mut state = self.lock();
        state.end_preemption(resume);
        Self::checked(&mut state)
    }

    pub fn set_in_progress(&self, request: Option<Request>) {
        self.lock().set_in_progress(request);
    }

    pub fn in_progress(&self) -> Option<Request> {
        self.lock().in_progress.clone()
    }

    pub fn append_event(&self, message: impl Into<String>) {
        self.lock().append_event(message);
    }

    pub fn event_log(&self) -> Vec<EventRecord> {
        self.lock().event_log.to_vec()
    }

    /// Verifies the light invariants, resetting the state when they fail.
    pub fn verify(&self) -> Result<()> {
        let mut state = self.lock();
        Self::checked(&mut state)
    }

    pub fn reset_to_safe_default(&self) {
        self.lock().reset_to_safe_default();
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Copy of the whole state, for tests and diagnostics.
    pub fn state(&self) -> IntersectionState {
        self.lock().clone()
    }

    fn checked(state: &mut IntersectionState) -> Result<()> {
        if let Err(e) = state.check_invariants() {
            error!("{}; resetting intersection to safe default", e);
            state.reset_to_safe_default();
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::request::Turn;

    fn greens(lights: &LightMap) -> Vec<Direction> {
        lights
            .iter()
            .filter(|(_, c)| **c == LightColor::Green)
            .map(|(d, _)| *d)
            .collect()
    }

    #[test]
    fn starts_with_north_south_green() {
        let state = IntersectionState::new(10);
        assert_eq!(
            greens(&state.lights()),
            vec![Direction::North, Direction::South]
        );
        assert!(!state.preemption_active());
        assert!(state.in_progress().is_none());
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn preemption_leaves_exactly_one_green() {
        let shared = SharedIntersection::new(10);
        shared.begin_preemption(Direction::West).unwrap();
        assert_eq!(greens(&shared.get_lights()), vec![Direction::West]);
        assert_eq!(shared.preemption_target(), Some(Direction::West));

        shared.end_preemption(Direction::West.phase()).unwrap();
        assert_eq!(
            greens(&shared.get_lights()),
            vec![Direction::East, Direction::West]
        );
        assert_eq!(shared.preemption_target(), None);
    }

    #[test]
    fn advance_phase_is_suspended_during_preemption() {
        let shared = SharedIntersection::new(10);
        let epoch = shared.scheduler_view().phase_epoch;
        shared.begin_preemption(Direction::North).unwrap();
        assert_eq!(shared.advance_phase(epoch).unwrap(), None);
        assert_eq!(greens(&shared.get_lights()), vec![Direction::North]);
    }

    #[test]
    fn advance_phase_ignores_stale_epoch() {
        let shared = SharedIntersection::new(10);
        let stale = shared.scheduler_view().phase_epoch;
        shared.apply_phase(Phase::EastWest);
        assert_eq!(shared.advance_phase(stale).unwrap(), None);

        let fresh = shared.scheduler_view().phase_epoch;
        let (phase, epoch) = shared.advance_phase(fresh).unwrap().unwrap();
        assert_eq!(phase, Phase::NorthSouth);
        assert_eq!(epoch, fresh + 1);
    }

    #[test]
    fn corrupted_lights_are_detected_and_reset() {
        let shared = SharedIntersection::new(10);
        shared.set_light(Direction::East, LightColor::Green);
        let err = shared.verify().unwrap_err();
        assert!(matches!(err, ArbiterError::StateCorruption(_)));
        assert_eq!(
            greens(&shared.get_lights()),
            vec![Direction::North, Direction::South]
        );
        assert!(shared.verify().is_ok());
    }

    #[test]
    fn all_red_is_a_violation() {
        let mut state = IntersectionState::new(10);
        state.set_light(Direction::North, LightColor::Red);
        state.set_light(Direction::South, LightColor::Red);
        assert!(state.check_invariants().is_err());
    }

    #[test]
    fn set_light_by_name_rejects_unknown_direction() {
        let shared = SharedIntersection::new(10);
        let before = shared.state().event_log().len();
        let err = shared.set_light_by_name("NE", LightColor::Green).unwrap_err();
        assert!(matches!(err, ArbiterError::InvalidDirection(_)));
        assert_eq!(shared.state().event_log().len(), before);
    }

    #[test]
    fn in_progress_transitions_are_logged() {
        let shared = SharedIntersection::new(10);
        let request = Request::new("v1", Direction::East, Direction::West, Turn::Left);
        shared.set_in_progress(Some(request.clone()));
        assert_eq!(shared.in_progress(), Some(request));
        shared.set_in_progress(None);
        assert!(shared.in_progress().is_none());

        let log = shared.event_log();
        assert!(log[log.len() - 2].message.contains("entered the crossing"));
        assert!(log[log.len() - 1].message.contains("Crossing cleared after vehicle v1"));
    }

    #[test]
    fn clear_resets_and_empties_the_log() {
        let shared = SharedIntersection::new(10);
        shared.begin_preemption(Direction::South).unwrap();
        shared.append_event("something happened");
        shared.clear();
        let state = shared.state();
        assert!(state.event_log().is_empty());
        assert!(!state.preemption_active());
        assert_eq!(state.phase(), Phase::NorthSouth);
    }
}
