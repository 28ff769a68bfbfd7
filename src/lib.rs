pub mod capture;
pub mod config;
pub mod detection;
pub mod ipc;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod registry;
pub mod stream;

use anyhow::Result;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use config::Config;
use ipc::{ErrorResponse, IpcMessage, IpcRequest, IpcServer};
use models::SnapshotPayload;
use pipeline::ReconPipeline;

/// Daemon runner: drives the scan loop and fans emitted snapshots out to
/// subscribers. Owns all mutable pipeline state directly, so baseline
/// updates have exactly one writer without any locking.
pub struct Daemon {
    config: Config,
    pipeline: ReconPipeline,
    last_payload: Option<SnapshotPayload>,
    cycles: Arc<AtomicU64>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl Daemon {
    /// Create a new daemon
    pub fn new(config: Config) -> Self {
        let pipeline = ReconPipeline::new(config.clone());

        Self {
            config,
            pipeline,
            last_payload: None,
            cycles: Arc::new(AtomicU64::new(0)),
            shutdown_tx: None,
        }
    }

    /// Run the daemon
    pub async fn run(&mut self) -> Result<()> {
        let socket_path = PathBuf::from(&self.config.ipc.socket_path);
        let mut ipc = IpcServer::new(Some(&socket_path), self.cycles.clone());
        ipc.start().await?;

        let mut request_rx = ipc
            .take_request_receiver()
            .ok_or_else(|| anyhow::anyhow!("Request receiver already taken"))?;

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        let mut poll = tokio::time::interval(self.config.poll_interval());

        info!(
            interval_secs = self.config.general.poll_interval_secs,
            capture_dir = %self.config.capture.dir,
            "Daemon started, polling for capture snapshots"
        );

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    match self.pipeline.run_cycle() {
                        Ok(outcome) => {
                            self.cycles.store(self.pipeline.cycles(), Ordering::Relaxed);
                            if outcome.emit {
                                ipc.broadcast(IpcMessage::Snapshot(outcome.payload.clone()));
                            }
                            self.last_payload = Some(outcome.payload);
                        }
                        Err(e) => {
                            error!("Cycle failed: {:#}", e);
                            tokio::time::sleep(self.config.error_backoff()).await;
                        }
                    }
                }
                Some(request) = request_rx.recv() => {
                    self.handle_request(request);
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        ipc.stop().await;
        info!("Daemon stopped");
        Ok(())
    }

    /// Answer one on-demand request from the cached payload. When no cycle
    /// has completed yet, run a single bootstrap cycle inline; requests are
    /// handled in the same loop as the poll tick, so baseline state still
    /// has only one writer.
    fn handle_request(&mut self, request: IpcRequest) {
        let response = match request.message {
            IpcMessage::GetSnapshot => match &self.last_payload {
                Some(payload) => IpcMessage::SnapshotResponse(payload.clone()),
                None => match self.pipeline.run_cycle() {
                    Ok(outcome) => {
                        self.cycles.store(self.pipeline.cycles(), Ordering::Relaxed);
                        self.last_payload = Some(outcome.payload.clone());
                        IpcMessage::SnapshotResponse(outcome.payload)
                    }
                    Err(e) => IpcMessage::Error(ErrorResponse {
                        code: "CYCLE_FAILED".to_string(),
                        message: format!("{:#}", e),
                    }),
                },
            },
            _ => IpcMessage::Error(ErrorResponse {
                code: "UNSUPPORTED".to_string(),
                message: "Unsupported request".to_string(),
            }),
        };

        // Requester may have given up; that only affects them
        let _ = request.response_tx.send(response);
    }

    /// Signal shutdown
    pub async fn shutdown(&self) {
        if let Some(tx) = &self.shutdown_tx {
            let _ = tx.send(()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::ScanStatus;
    use tokio::sync::oneshot;

    fn daemon_with_capture_dir(dir: &std::path::Path) -> Daemon {
        let mut config = Config::default();
        config.capture.dir = dir.to_string_lossy().to_string();
        Daemon::new(config)
    }

    #[tokio::test]
    async fn test_get_snapshot_bootstraps_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut daemon = daemon_with_capture_dir(dir.path());

        let (tx, rx) = oneshot::channel();
        daemon.handle_request(IpcRequest {
            message: IpcMessage::GetSnapshot,
            response_tx: tx,
        });

        match rx.await.unwrap() {
            IpcMessage::SnapshotResponse(payload) => {
                assert_eq!(payload.status, ScanStatus::NoCsv);
            }
            other => panic!("unexpected response: {:?}", other),
        }
        assert_eq!(daemon.cycles.load(Ordering::Relaxed), 1);

        // A second request reads the cache instead of running another cycle
        let (tx, rx) = oneshot::channel();
        daemon.handle_request(IpcRequest {
            message: IpcMessage::GetSnapshot,
            response_tx: tx,
        });
        assert!(matches!(
            rx.await.unwrap(),
            IpcMessage::SnapshotResponse(_)
        ));
        assert_eq!(daemon.cycles.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_unsupported_request_gets_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut daemon = daemon_with_capture_dir(dir.path());

        let (tx, rx) = oneshot::channel();
        daemon.handle_request(IpcRequest {
            message: IpcMessage::Pong,
            response_tx: tx,
        });

        match rx.await.unwrap() {
            IpcMessage::Error(e) => assert_eq!(e.code, "UNSUPPORTED"),
            other => panic!("unexpected response: {:?}", other),
        }
    }
}
