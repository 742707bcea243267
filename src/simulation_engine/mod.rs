pub mod traffic_generators;

pub use traffic_generators::{
    create_emergency_vehicle, create_vehicle, normal_traffic_gen, priority_traffic_gen,
    GeneratorSettings,
};
