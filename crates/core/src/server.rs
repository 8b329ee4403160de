//! The planet orchestrator: listener, dispatcher, worker pool, sweeper.

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::clock::monotonic_ms;
use crate::config::Config;
use crate::error::{PlanetError, Result};
use crate::registry::Registry;
use crate::worker::{Worker, WorkerMsg, WorkerShared};

/// How often the ping sweeper scans for stalled connections.
pub const CHECK_PING_INTERVAL: Duration = Duration::from_secs(10);

/// A client silent for longer than this is disconnected. Clients ping
/// about once a minute, so this allows three missed pings.
pub const CLIENT_PING_TIMEOUT_MS: u64 = 210_000;

/// Poll interval of the nonblocking accept loop.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Sleep slice of the sweeper loop, kept short so stop() is prompt.
const SWEEP_SLICE: Duration = Duration::from_millis(250);

/// The long-running master-server process state.
///
/// Owns the registry and the worker pool. [`start`](Self::start) binds
/// the listener and spawns the accept, worker, and sweeper threads; they
/// all observe a shared running flag, so [`stop`](Self::stop) brings the
/// whole process down cleanly (open connections are torn down by closing
/// their sockets).
pub struct Planet {
    config: Arc<Config>,
    registry: Arc<Registry>,
    workers: Vec<Arc<WorkerShared>>,
    running: Arc<AtomicBool>,
    local_addr: Option<SocketAddr>,
}

impl Planet {
    pub fn new(config: Config) -> Self {
        Planet {
            config: Arc::new(config),
            registry: Arc::new(Registry::new()),
            workers: Vec::new(),
            running: Arc::new(AtomicBool::new(false)),
            local_addr: None,
        }
    }

    /// Bind the listener and spawn the worker pool, accept loop, and
    /// ping sweeper.
    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(PlanetError::AlreadyRunning);
        }

        let bind_addr = format!(
            "{}:{}",
            self.config.network.address, self.config.network.port
        );
        let listener = TcpListener::bind(&bind_addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);

        self.running.store(true, Ordering::SeqCst);

        let worker_count = self
            .config
            .network
            .workers
            .unwrap_or_else(|| {
                thread::available_parallelism()
                    .map(std::num::NonZeroUsize::get)
                    .unwrap_or(1)
            })
            .max(1);
        for index in 0..worker_count {
            self.workers.push(Worker::spawn(
                index,
                self.registry.clone(),
                self.config.clone(),
                self.running.clone(),
            )?);
        }

        tracing::info!(
            addr = %local_addr,
            workers = worker_count,
            "master server listening"
        );

        let workers = self.workers.clone();
        let running = self.running.clone();
        thread::spawn(move || accept_loop(listener, workers, running));

        let registry = self.registry.clone();
        let running = self.running.clone();
        thread::spawn(move || sweep_loop(registry, running));

        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("server stopping");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The bound listener address, available after [`start`](Self::start).
    /// Useful when the configured port is 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Number of currently connected clients.
    pub fn client_count(&self) -> usize {
        self.registry.client_count()
    }
}

/// Nonblocking accept loop: hand each new socket to the least-loaded
/// worker. The chosen worker increments its own load when it attaches
/// the connection.
fn accept_loop(listener: TcpListener, workers: Vec<Arc<WorkerShared>>, running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                let worker = least_loaded(&workers);
                tracing::debug!(peer = %addr, worker = worker.index(), "dispatching connection");
                worker.send(WorkerMsg::Attach(stream, addr));
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
    tracing::debug!("accept loop exited");
}

/// Pick the worker with the fewest connections, ties to the lowest index.
fn least_loaded(workers: &[Arc<WorkerShared>]) -> &Arc<WorkerShared> {
    let mut best = &workers[0];
    let mut best_load = best.load();
    for worker in &workers[1..] {
        let load = worker.load();
        if load < best_load {
            best_load = load;
            best = worker;
        }
    }
    best
}

/// Periodically close connections that stopped pinging. The sweeper
/// never touches a socket itself; each stalled client is handed to its
/// owning worker.
fn sweep_loop(registry: Arc<Registry>, running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        let mut slept = Duration::ZERO;
        while slept < CHECK_PING_INTERVAL && running.load(Ordering::SeqCst) {
            thread::sleep(SWEEP_SLICE);
            slept += SWEEP_SLICE;
        }
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let now = monotonic_ms();
        for client in registry.snapshot_clients() {
            if now.saturating_sub(client.last_pinged_ms()) > CLIENT_PING_TIMEOUT_MS {
                tracing::debug!(
                    peer = %client.peer_ip,
                    port = client.peer_port,
                    "ping timeout"
                );
                client.owner.send(WorkerMsg::Disconnect {
                    client: client.clone(),
                    reason: "ping timeout",
                });
            }
        }
    }
    tracing::debug!("ping sweeper exited");
}
