use clap::Parser;
use intersection_arbiter::global_variables::{
    NORMAL_TRAFFIC_INTERVAL_SECS, PRIORITY_TRAFFIC_INTERVAL_SECS, STATUS_ADDR, STATUS_INTERVAL_MS,
};
use intersection_arbiter::monitoring::{render_snapshot, EventArchive, StatusServer};
use intersection_arbiter::simulation_engine::{
    normal_traffic_gen, priority_traffic_gen, GeneratorSettings,
};
use intersection_arbiter::{ArbiterError, Engine, EngineConfig, Result};
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "intersection_main")]
#[command(about = "Four-way intersection arbitration with simulated traffic")]
struct Cli {
    /// JSON config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    phase_secs: Option<f64>,

    #[arg(long)]
    emergency_secs: Option<f64>,

    #[arg(long)]
    service_secs: Option<f64>,

    #[arg(long)]
    retry_secs: Option<f64>,

    /// Admit right turns on RED when no preemption is active
    #[arg(long)]
    right_on_red: bool,

    /// Seconds between normal vehicles
    #[arg(long, default_value_t = NORMAL_TRAFFIC_INTERVAL_SECS)]
    normal_interval: f64,

    /// Seconds between emergency vehicles
    #[arg(long, default_value_t = PRIORITY_TRAFFIC_INTERVAL_SECS)]
    priority_interval: f64,

    /// Address the status stream listens on
    #[arg(long, default_value = STATUS_ADDR)]
    status_addr: String,

    /// CSV file that receives every logged event
    #[arg(long)]
    archive: Option<PathBuf>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    run_secs: Option<f64>,

    /// Print the intersection to stdout once a second
    #[arg(long)]
    console: bool,
}

fn seconds(flag: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| ArbiterError::Config(format!("--{} {}: {}", flag, secs, e)))
}

fn build_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(secs) = cli.phase_secs {
        config.phase_duration = seconds("phase-secs", secs)?;
    }
    if let Some(secs) = cli.emergency_secs {
        config.emergency_duration = seconds("emergency-secs", secs)?;
    }
    if let Some(secs) = cli.service_secs {
        config.service_duration = seconds("service-secs", secs)?;
    }
    if let Some(secs) = cli.retry_secs {
        config.retry_interval = seconds("retry-secs", secs)?;
    }
    if cli.right_on_red {
        config.allow_right_turn_on_red = true;
    }
    config.validate()?;
    Ok(config)
}

/// Archives new events and optionally prints the intersection.
async fn observe(engine: Arc<Engine>, archive: Option<PathBuf>, console: bool) {
    let mut archive = archive.map(EventArchive::new);
    let mut shutdown = engine.shutdown_signal();
    loop {
        let snapshot = engine.snapshot();
        if let Some(archive) = archive.as_mut() {
            if let Err(e) = archive.archive(&snapshot.event_log) {
                error!("Failed to archive events to {}: {}", archive.path().display(), e);
            }
        }
        if console {
            print!("{}", render_snapshot(&snapshot));
        }
        if !shutdown.sleep(Duration::from_secs(1)).await {
            break;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;
    let engine = Arc::new(Engine::start(config)?);

    let status = StatusServer::bind(&cli.status_addr, Duration::from_millis(STATUS_INTERVAL_MS))
        .await?;
    info!("Viewers can connect to {}", status.local_addr()?);

    let mut workers = vec![
        tokio::spawn(status.run(Arc::clone(&engine), engine.shutdown_signal())),
        tokio::spawn(observe(Arc::clone(&engine), cli.archive.clone(), cli.console)),
    ];
    let normal = GeneratorSettings::every(seconds("normal-interval", cli.normal_interval)?);
    let priority = GeneratorSettings::every(seconds("priority-interval", cli.priority_interval)?);
    let normal_task = tokio::spawn(normal_traffic_gen(Arc::clone(&engine), normal));
    let priority_task = tokio::spawn(priority_traffic_gen(Arc::clone(&engine), priority));

    match cli.run_secs {
        Some(secs) => tokio::time::sleep(seconds("run-secs", secs)?).await,
        None => {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
        }
    }

    engine.shutdown().await;
    for worker in workers.drain(..) {
        if let Err(e) = worker.await {
            error!("Worker ended abnormally: {}", e);
        }
    }
    match (normal_task.await, priority_task.await) {
        (Ok(normal), Ok(priority)) => info!(
            "Generated {} normal and {} emergency vehicles",
            normal, priority
        ),
        (normal, priority) => error!("Generator ended abnormally: {:?} {:?}", normal.err(), priority.err()),
    }
    Ok(())
}
