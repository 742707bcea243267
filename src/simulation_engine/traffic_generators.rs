use log::{info, warn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::engine::Engine;
use crate::error::ArbiterError;
use crate::global_variables::RIGHT_TURN_PROBABILITY;
use crate::models::direction::Direction;
use crate::models::request::{Request, Turn, VehicleType};

const EMERGENCY_TYPES: [VehicleType; 3] = [
    VehicleType::Ambulance,
    VehicleType::FireTruck,
    VehicleType::Police,
];

/// How a generator loop paces itself.
#[derive(Debug, Clone, Copy)]
pub struct GeneratorSettings {
    pub interval: Duration,
    pub max_vehicles: Option<usize>,
    pub seed: Option<u64>,
}

impl GeneratorSettings {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            max_vehicles: None,
            seed: None,
        }
    }

    fn rng(&self) -> SmallRng {
        match self.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        }
    }
}

fn random_origin_and_destination<R: Rng + ?Sized>(rng: &mut R) -> (Direction, Direction) {
    let origin = Direction::ALL[rng.random_range(0..Direction::ALL.len())];
    let others: Vec<Direction> = Direction::ALL
        .iter()
        .copied()
        .filter(|&d| d != origin)
        .collect();
    let destination = others[rng.random_range(0..others.len())];
    (origin, destination)
}

/// A normal vehicle; right turns make up about 30% of the traffic.
pub fn create_vehicle<R: Rng + ?Sized>(rng: &mut R) -> Request {
    let (origin, destination) = random_origin_and_destination(rng);
    let turn = if rng.random_bool(RIGHT_TURN_PROBABILITY) {
        Turn::Right
    } else if rng.random_bool(0.5) {
        Turn::Left
    } else {
        Turn::Straight
    };
    Request::new(Uuid::new_v4().to_string(), origin, destination, turn)
}

pub fn create_emergency_vehicle<R: Rng + ?Sized>(rng: &mut R) -> Request {
    let (origin, destination) = random_origin_and_destination(rng);
    let vehicle_type = EMERGENCY_TYPES[rng.random_range(0..EMERGENCY_TYPES.len())];
    Request::urgent(Uuid::new_v4().to_string(), vehicle_type, origin, destination)
}

/// Feeds normal vehicles into the engine until it stops or the limit is
/// reached. Returns how many vehicles were submitted.
pub async fn normal_traffic_gen(engine: Arc<Engine>, settings: GeneratorSettings) -> usize {
    let mut rng = settings.rng();
    let mut shutdown = engine.shutdown_signal();
    let mut count = 0;
    while settings.max_vehicles.map_or(true, |max| count < max) {
        let vehicle = create_vehicle(&mut rng);
        let summary = format!(
            "vehicle {} from {} to {} (turn: {})",
            vehicle.short_id(),
            vehicle.origin,
            vehicle.destination,
            vehicle.turn
        );
        match engine.submit(vehicle) {
            Ok(()) => info!("Generated normal {}", summary),
            Err(ArbiterError::EngineStopped) => break,
            Err(e) => warn!("Dropped generated {}: {}", summary, e),
        }
        count += 1;
        if !shutdown.sleep(settings.interval).await {
            break;
        }
    }
    if settings.max_vehicles == Some(count) {
        info!("Normal traffic generator reached its limit of {} vehicles", count);
    }
    count
}

/// Feeds emergency vehicles into the engine and notifies the preemption
/// entry point for each one.
pub async fn priority_traffic_gen(engine: Arc<Engine>, settings: GeneratorSettings) -> usize {
    let mut rng = settings.rng();
    let mut shutdown = engine.shutdown_signal();
    let mut count = 0;
    while settings.max_vehicles.map_or(true, |max| count < max) {
        let vehicle = create_emergency_vehicle(&mut rng);
        let (id, vehicle_type, origin) =
            (vehicle.short_id().to_string(), vehicle.vehicle_type, vehicle.origin);
        match engine.submit(vehicle) {
            Ok(()) => {
                warn!("EMERGENCY {} {} from {}", vehicle_type, id, origin);
                if let Err(e) = engine.request_preemption(origin) {
                    warn!("Could not notify preemption for {}: {}", id, e);
                }
            }
            Err(ArbiterError::EngineStopped) => break,
            Err(e) => warn!("Dropped generated {} {}: {}", vehicle_type, id, e),
        }
        count += 1;
        if !shutdown.sleep(settings.interval).await {
            break;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn generated_vehicles_are_well_formed() {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut right_turns = 0;
        for _ in 0..500 {
            let vehicle = create_vehicle(&mut rng);
            vehicle.validate().unwrap();
            assert!(!vehicle.urgent);
            assert_ne!(vehicle.turn, Turn::Emergency);
            if vehicle.turn == Turn::Right {
                right_turns += 1;
            }
        }
        assert!((100..200).contains(&right_turns), "right turns: {}", right_turns);
    }

    #[test]
    fn emergency_vehicles_are_urgent() {
        let mut rng = SmallRng::seed_from_u64(11);
        for _ in 0..50 {
            let vehicle = create_emergency_vehicle(&mut rng);
            vehicle.validate().unwrap();
            assert!(vehicle.urgent);
            assert!(vehicle.vehicle_type.is_emergency());
            assert_eq!(vehicle.turn, Turn::Emergency);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn normal_generator_stops_at_limit() {
        let engine = Arc::new(Engine::start(EngineConfig::default()).unwrap());
        let settings = GeneratorSettings {
            interval: Duration::from_millis(10),
            max_vehicles: Some(5),
            seed: Some(3),
        };
        let produced = normal_traffic_gen(Arc::clone(&engine), settings).await;
        assert_eq!(produced, 5);
        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn priority_generator_triggers_preemption() {
        let engine = Arc::new(Engine::start(EngineConfig::default()).unwrap());
        let settings = GeneratorSettings {
            interval: Duration::from_millis(10),
            max_vehicles: Some(1),
            seed: Some(5),
        };
        assert_eq!(priority_traffic_gen(Arc::clone(&engine), settings).await, 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(engine.state().preemption_target().is_some());
        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn generator_ends_when_engine_stops() {
        let engine = Arc::new(Engine::start(EngineConfig::default()).unwrap());
        let task = tokio::spawn(normal_traffic_gen(
            Arc::clone(&engine),
            GeneratorSettings::every(Duration::from_secs(1)),
        ));
        tokio::time::sleep(Duration::from_millis(2500)).await;
        engine.shutdown().await;
        let produced = task.await.unwrap();
        assert!(produced >= 2);
    }
}
