// Vitals listener - Accept loop and connection lifecycle
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};

use crate::infrastructure::connection::{ConnectionContext, ConnectionHandler};

/// Pause after a failed accept so a persistent error (e.g. fd exhaustion) cannot spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerSettings {
    pub max_connections: usize,
    pub shutdown_grace: Duration,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            max_connections: 32,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("listener already running on {0}")]
    AlreadyRunning(SocketAddr),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

struct Running {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owns the ingestion subsystem's lifecycle: `start` binds and accepts, `stop` tears everything down.
pub struct VitalsListener {
    ctx: Arc<ConnectionContext>,
    settings: ListenerSettings,
    running: Mutex<Option<Running>>,
}

impl VitalsListener {
    pub fn new(ctx: Arc<ConnectionContext>, settings: ListenerSettings) -> Self {
        Self {
            ctx,
            settings,
            running: Mutex::new(None),
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|r| r.local_addr)
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Binds `addr` and spawns the accept loop. Returns the bound address.
    pub async fn start(&self, addr: SocketAddr) -> Result<SocketAddr, ListenerError> {
        if let Some(addr) = self.local_addr() {
            return Err(ListenerError::AlreadyRunning(addr));
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::Bind { addr, source })?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(
            listener,
            self.ctx.clone(),
            self.settings,
            shutdown_rx,
        ));

        let mut running = self.running.lock();
        if let Some(existing) = running.as_ref() {
            // lost a race with a concurrent start; keep the first one
            let _ = shutdown.send(true);
            return Err(ListenerError::AlreadyRunning(existing.local_addr));
        }
        *running = Some(Running {
            local_addr,
            shutdown,
            task,
        });

        tracing::info!(%local_addr, "vitals listener started");
        Ok(local_addr)
    }

    /// Stops accepting, signals every handler and waits for the accept loop to exit.
    ///
    /// Idempotent. Returns once the port is released.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };

        let _ = running.shutdown.send(true);
        let bound = self.settings.shutdown_grace + Duration::from_secs(1);
        let mut task = running.task;
        match tokio::time::timeout(bound, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "accept loop task failed"),
            Err(_) => {
                tracing::warn!("accept loop did not exit in time, aborting");
                task.abort();
                let _ = task.await;
            }
        }

        tracing::info!(local_addr = %running.local_addr, "vitals listener stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    ctx: Arc<ConnectionContext>,
    settings: ListenerSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    let limit = Arc::new(Semaphore::new(settings.max_connections.max(1)));
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let Ok(permit) = limit.clone().try_acquire_owned() else {
                        tracing::warn!(%peer, max = settings.max_connections, "connection limit reached, rejecting");
                        drop(stream);
                        continue;
                    };

                    tracing::info!(%peer, "device connected");
                    let handler = ConnectionHandler::new(stream, peer, ctx.clone(), shutdown.clone());
                    connections.spawn(async move {
                        let _permit = permit;
                        match handler.run().await {
                            Ok(summary) => tracing::info!(
                                %peer,
                                frames = summary.frames,
                                malformed = summary.malformed,
                                "device disconnected"
                            ),
                            Err(e) => tracing::warn!(%peer, error = %e, "device connection closed"),
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "connection task failed");
                }
            }
        }
    }

    // release the port before waiting on in-flight handlers
    drop(listener);

    let drained = tokio::time::timeout(settings.shutdown_grace, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        tracing::warn!(remaining = connections.len(), "aborting connections after grace period");
        connections.abort_all();
        while connections.join_next().await.is_some() {}
    }
}
