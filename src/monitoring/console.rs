use std::fmt::Write;

use crate::models::direction::{Direction, LightColor};
use crate::shared_data::IntersectionSnapshot;

/// Plain-text view of a snapshot for terminals without a renderer.
pub fn render_snapshot(snapshot: &IntersectionSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Intersection @ {} ===", snapshot.timestamp);
    let _ = writeln!(
        out,
        "Phase: {}  Preemption: {}",
        snapshot.phase,
        snapshot
            .preemption_target
            .map_or_else(|| "none".to_string(), |d| d.to_string())
    );
    for direction in Direction::ALL {
        let marker = match snapshot.light(direction) {
            LightColor::Green => "[G]",
            LightColor::Red => "[R]",
        };
        let _ = writeln!(
            out,
            "  {:<5} {} queue: {}",
            direction.short_name(),
            marker,
            snapshot.queue_length(direction)
        );
    }
    match &snapshot.in_progress {
        Some(request) => {
            let _ = writeln!(out, "Crossing: {}", request);
        }
        None => {
            let _ = writeln!(out, "Crossing: empty");
        }
    }
    if !snapshot.event_log.is_empty() {
        let _ = writeln!(out, "Recent events:");
        for event in &snapshot.event_log {
            let _ = writeln!(
                out,
                "  #{} {} {}",
                event.seq,
                event.time.format("%H:%M:%S"),
                event.message
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_system::event_log::EventLog;
    use crate::models::direction::Phase;
    use crate::models::request::{Request, VehicleType};

    #[test]
    fn renders_lights_queues_and_crossing() {
        let mut log = EventLog::new(4);
        log.append("Preemption active for W");
        let snapshot = IntersectionSnapshot {
            timestamp: 42,
            lights: Direction::ALL
                .iter()
                .map(|&d| {
                    let color = if d == Direction::West {
                        LightColor::Green
                    } else {
                        LightColor::Red
                    };
                    (d, color)
                })
                .collect(),
            phase: Phase::NorthSouth,
            preemption_target: Some(Direction::West),
            queue_lengths: Direction::ALL.iter().map(|&d| (d, 1)).collect(),
            in_progress: Some(Request::urgent(
                "amb-0001",
                VehicleType::Ambulance,
                Direction::West,
                Direction::East,
            )),
            event_log: log.to_vec(),
        };

        let text = render_snapshot(&snapshot);
        assert!(text.contains("Preemption: W"));
        assert!(text.contains("W     [G] queue: 1"));
        assert!(text.contains("N     [R] queue: 1"));
        assert!(text.contains("Crossing: PRIORITY vehicle amb-0001 from W to E"));
        assert!(text.contains("#0"));
    }
}
