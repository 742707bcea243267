use criterion::{
    black_box, AxisScale, Criterion, PlotConfiguration, criterion_group, criterion_main,
};
use intersection_arbiter::control_system::SharedIntersection;
use intersection_arbiter::dispatch::{decide, DirectionQueues};
use intersection_arbiter::{Direction, Request, Turn, VehicleType};
use std::time::Duration;

fn bench_decide(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_decision");
    group.sample_size(100);
    group.measurement_time(Duration::from_secs(5));
    group.warm_up_time(Duration::from_secs(2));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Linear));

    let state = SharedIntersection::new(10);
    let normal = Request::new("bench-normal", Direction::East, Direction::North, Turn::Right);
    let urgent = Request::urgent("bench-urgent", VehicleType::Ambulance, Direction::West, Direction::East);

    group.bench_function("normal_on_red", |b| {
        let view = state.dispatch_view();
        b.iter(|| decide(black_box(&normal), black_box(&view), false));
    });
    group.bench_function("right_turn_on_red", |b| {
        let view = state.dispatch_view();
        b.iter(|| decide(black_box(&normal), black_box(&view), true));
    });
    group.bench_function("urgent", |b| {
        let view = state.dispatch_view();
        b.iter(|| decide(black_box(&urgent), black_box(&view), false));
    });
    group.bench_function("view_then_decide", |b| {
        b.iter(|| {
            let view = state.dispatch_view();
            decide(black_box(&normal), &view, false)
        });
    });
    group.finish();
}

fn bench_queues(c: &mut Criterion) {
    let mut group = c.benchmark_group("direction_queues");
    group.sample_size(100);
    group.measurement_time(Duration::from_secs(5));
    group.warm_up_time(Duration::from_secs(2));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Linear));

    for &size in [10, 100, 1000].iter() {
        group.bench_function(format!("enqueue_drain_{}", size), |b| {
            let queues = DirectionQueues::new();
            let requests: Vec<Request> = (0..size)
                .map(|i| {
                    let origin = Direction::ALL[i % 4];
                    Request::new(format!("v{}", i), origin, origin.opposite(), Turn::Straight)
                })
                .collect();
            b.iter(|| {
                for request in &requests {
                    queues.enqueue(request.clone()).unwrap();
                }
                black_box(queues.lengths());
                for direction in Direction::ALL {
                    while queues.get(direction).try_pop().is_some() {}
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_decide, bench_queues);
criterion_main!(benches);
