use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use crate::engine::Engine;
use crate::error::Result;
use crate::shared_data::IntersectionSnapshot;
use crate::shutdown::ShutdownSignal;

/// Anything that can produce a consistent intersection snapshot.
pub trait SnapshotSource: Send + Sync + 'static {
    fn snapshot(&self) -> IntersectionSnapshot;
}

impl SnapshotSource for Engine {
    fn snapshot(&self) -> IntersectionSnapshot {
        Engine::snapshot(self)
    }
}

/// Streams newline-delimited JSON snapshots to every connected viewer.
pub struct StatusServer {
    listener: TcpListener,
    interval: Duration,
}

impl StatusServer {
    pub async fn bind(addr: &str, interval: Duration) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, interval })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run<S: SnapshotSource>(self, source: Arc<S>, mut shutdown: ShutdownSignal) {
        match self.listener.local_addr() {
            Ok(addr) => info!("Status server ready on {}", addr),
            Err(e) => warn!("Status server ready (address unknown: {})", e),
        }
        loop {
            tokio::select! {
                _ = shutdown.triggered() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!("New viewer connection from {}", peer);
                        tokio::spawn(stream_snapshots(
                            stream,
                            peer,
                            Arc::clone(&source),
                            self.interval,
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => warn!("Failed to accept viewer: {}", e),
                },
            }
        }
        info!("Status server stopped");
    }
}

async fn stream_snapshots<S: SnapshotSource>(
    mut stream: TcpStream,
    peer: SocketAddr,
    source: Arc<S>,
    interval: Duration,
    mut shutdown: ShutdownSignal,
) {
    loop {
        let line = match source.snapshot().to_json_line() {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to encode snapshot for {}: {}", peer, e);
                break;
            }
        };
        if let Err(e) = stream.write_all(line.as_bytes()).await {
            debug!("Viewer {} disconnected: {}", peer, e);
            break;
        }
        if !shutdown.sleep(interval).await {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_system::intersection_state::IntersectionState;
    use crate::models::direction::{Direction, Phase};
    use crate::shared_data::current_timestamp;
    use crate::shutdown::ShutdownTrigger;
    use tokio::io::{AsyncBufReadExt, BufReader};

    struct FixedSource;

    impl SnapshotSource for FixedSource {
        fn snapshot(&self) -> IntersectionSnapshot {
            let state = IntersectionState::new(5);
            IntersectionSnapshot {
                timestamp: current_timestamp(),
                lights: state.lights(),
                phase: state.phase(),
                preemption_target: None,
                queue_lengths: Direction::ALL.iter().map(|&d| (d, 2)).collect(),
                in_progress: None,
                event_log: Vec::new(),
            }
        }
    }

    #[tokio::test]
    async fn viewer_receives_json_lines() {
        let trigger = ShutdownTrigger::new();
        let server = StatusServer::bind("127.0.0.1:0", Duration::from_millis(20))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let task = tokio::spawn(server.run(Arc::new(FixedSource), trigger.subscribe()));

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut lines = BufReader::new(stream).lines();
        for _ in 0..2 {
            let line = lines.next_line().await.unwrap().unwrap();
            let snapshot: IntersectionSnapshot = serde_json::from_str(&line).unwrap();
            assert_eq!(snapshot.phase, Phase::NorthSouth);
            assert_eq!(snapshot.queue_length(Direction::West), 2);
        }

        trigger.trigger();
        task.await.unwrap();
    }
}
