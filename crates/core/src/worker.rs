//! Worker threads: each owns a disjoint set of connections and runs
//! their I/O and command dispatch.
//!
//! A connection is processed by exactly one worker for its entire
//! lifetime. Anything another thread wants done to a worker's connection
//! — evicting it on an `R` collision, relaying an invite line to its
//! socket, closing it on ping timeout — is sent as a [`WorkerMsg`] on the
//! owner's queue and executed on the owner's thread. Shared registry
//! state is the only cross-thread mutation that happens directly, under
//! the registry's own locks.
//!
//! The loop itself is cooperative: drain the queue, poll every owned
//! socket for readable bytes, dispatch complete lines one at a time,
//! purge dead connections, then sleep briefly when nothing happened.

use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use parking_lot::Mutex;

use crate::client::Client;
use crate::config::Config;
use crate::error::{PlanetError, PolicyErrorKind, Result};
use crate::penalty::PenaltyMeter;
use crate::protocol::command::extract_line;
use crate::protocol::handler::handle_line;
use crate::registry::Registry;

/// How long an idle worker sleeps before rechecking its queue and
/// sockets.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A request executed on the owning worker's thread.
pub(crate) enum WorkerMsg {
    /// A freshly accepted socket from the dispatcher.
    Attach(TcpStream, SocketAddr),
    /// Tear down one of this worker's clients.
    Disconnect {
        client: Arc<Client>,
        reason: &'static str,
    },
    /// Write a line to one of this worker's clients (invite relay).
    Relay { to: Arc<Client>, line: Vec<u8> },
}

/// The part of a worker visible to other threads: its queue and its
/// load counter.
#[derive(Debug)]
pub struct WorkerShared {
    index: usize,
    load: Mutex<usize>,
    tx: Sender<WorkerMsg>,
}

impl WorkerShared {
    /// Worker position in the pool, used for tie-breaking and logs.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of connections currently assigned to this worker.
    pub fn load(&self) -> usize {
        *self.load.lock()
    }

    /// Enqueue a request for the owning worker. Sends to a worker that
    /// has already shut down are dropped.
    pub(crate) fn send(&self, msg: WorkerMsg) {
        let _ = self.tx.send(msg);
    }

    pub(crate) fn inc_load(&self) {
        *self.load.lock() += 1;
    }

    fn dec_load(&self) {
        let mut load = self.load.lock();
        *load = load.saturating_sub(1);
    }

    /// A shared handle with no worker thread behind it, for tests that
    /// need a [`Client`] without a pool.
    #[cfg(test)]
    pub(crate) fn detached(index: usize) -> Arc<WorkerShared> {
        let (tx, _rx) = unbounded();
        Arc::new(WorkerShared {
            index,
            load: Mutex::new(0),
            tx,
        })
    }
}

/// One connection as the owning worker sees it: the shared client plus
/// worker-private read state.
struct Conn {
    client: Arc<Client>,
    buf: Vec<u8>,
}

enum ConnPoll {
    Idle,
    Busy,
    Closed(&'static str),
}

pub(crate) struct Worker {
    shared: Arc<WorkerShared>,
    rx: Receiver<WorkerMsg>,
    conns: Vec<Conn>,
    registry: Arc<Registry>,
    config: Arc<Config>,
    running: Arc<AtomicBool>,
}

impl Worker {
    /// Spawn a worker thread and return its shared handle.
    pub(crate) fn spawn(
        index: usize,
        registry: Arc<Registry>,
        config: Arc<Config>,
        running: Arc<AtomicBool>,
    ) -> std::io::Result<Arc<WorkerShared>> {
        let (tx, rx) = unbounded();
        let shared = Arc::new(WorkerShared {
            index,
            load: Mutex::new(0),
            tx,
        });
        let worker = Worker {
            shared: shared.clone(),
            rx,
            conns: Vec::new(),
            registry,
            config,
            running,
        };
        thread::Builder::new()
            .name(format!("planet-worker-{index}"))
            .spawn(move || worker.run())?;
        Ok(shared)
    }

    fn run(mut self) {
        tracing::debug!(worker = self.shared.index, "worker started");
        while self.running.load(Ordering::SeqCst) {
            let mut busy = false;
            while let Ok(msg) = self.rx.try_recv() {
                self.handle_message(msg);
                busy = true;
            }
            busy |= self.poll_connections();
            if !busy {
                match self.rx.recv_timeout(POLL_INTERVAL) {
                    Ok(msg) => self.handle_message(msg),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        }
        for conn in std::mem::take(&mut self.conns) {
            self.disconnect(conn.client, "server shutting down");
        }
        tracing::debug!(worker = self.shared.index, "worker exited");
    }

    fn handle_message(&mut self, msg: WorkerMsg) {
        match msg {
            WorkerMsg::Attach(stream, addr) => self.attach(stream, addr),
            WorkerMsg::Disconnect { client, reason } => {
                if let Some(i) = self
                    .conns
                    .iter()
                    .position(|c| Arc::ptr_eq(&c.client, &client))
                {
                    self.conns.swap_remove(i);
                }
                self.disconnect(client, reason);
            }
            WorkerMsg::Relay { to, line } => to.send_logged(&line),
        }
    }

    /// Take ownership of a freshly accepted socket, register it, and run
    /// the admission checks.
    fn attach(&mut self, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nonblocking(true) {
            tracing::warn!(peer = %addr, error = %e, "failed to configure accepted socket");
            return;
        }
        let penalty = PenaltyMeter::new(
            self.config.penalty.window_seconds,
            self.config.penalty.max_points,
        );
        let client = Arc::new(Client::new(stream, addr, self.shared.clone(), penalty));

        self.registry.add_client(client.clone());
        self.shared.inc_load();
        let ip_conns = self.registry.inc_ip(&client.peer_ip);

        tracing::info!(
            peer = %client.peer_ip,
            port = client.peer_port,
            worker = self.shared.index,
            ip_conns,
            "client connected"
        );

        if let Err(e) = self.admit(&client, ip_conns) {
            tracing::info!(
                peer = %client.peer_ip,
                port = client.peer_port,
                error = %e,
                "refusing connection"
            );
            self.disconnect(client, "admission refused");
            return;
        }

        self.conns.push(Conn {
            client,
            buf: Vec::new(),
        });
    }

    fn admit(&self, client: &Arc<Client>, ip_conns: u32) -> Result<()> {
        if self.registry.client_count() >= self.config.network.max_clients {
            return Err(PlanetError::Policy {
                kind: PolicyErrorKind::MaxClients,
            });
        }
        if self.config.is_blacklisted(&client.peer_ip) {
            return Err(PlanetError::Policy {
                kind: PolicyErrorKind::Blacklisted,
            });
        }
        let cap = self.config.network.max_per_ip;
        if cap >= 0 && i64::from(ip_conns) > i64::from(cap) {
            return Err(PlanetError::Policy {
                kind: PolicyErrorKind::TooManyFromIp,
            });
        }
        Ok(())
    }

    fn poll_connections(&mut self) -> bool {
        let mut busy = false;
        let mut i = 0;
        while i < self.conns.len() {
            match self.poll_conn(i) {
                ConnPoll::Idle => i += 1,
                ConnPoll::Busy => {
                    busy = true;
                    i += 1;
                }
                ConnPoll::Closed(reason) => {
                    busy = true;
                    let conn = self.conns.swap_remove(i);
                    self.disconnect(conn.client, reason);
                }
            }
        }
        busy
    }

    /// Read whatever the socket has, dispatch complete lines, and report
    /// how the connection fared.
    fn poll_conn(&mut self, i: usize) -> ConnPoll {
        let client = self.conns[i].client.clone();
        let mut chunk = [0u8; 512];
        let mut busy = false;
        loop {
            match client.read(&mut chunk) {
                Ok(0) => return ConnPoll::Closed("connection closed by peer"),
                Ok(n) => {
                    busy = true;
                    self.conns[i].buf.extend_from_slice(&chunk[..n]);
                    if let Some(reason) = self.dispatch_buffered(i, &client) {
                        return ConnPoll::Closed(reason);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::debug!(peer = %client.peer_ip, error = %e, "read error");
                    return ConnPoll::Closed("read error");
                }
            }
        }
        if busy { ConnPoll::Busy } else { ConnPoll::Idle }
    }

    /// Dispatch every complete line in the connection's buffer. Returns
    /// a close reason on the first fatal condition.
    fn dispatch_buffered(&mut self, i: usize, client: &Arc<Client>) -> Option<&'static str> {
        loop {
            let line = match extract_line(&mut self.conns[i].buf) {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(e) => {
                    tracing::warn!(
                        peer = %client.peer_ip,
                        port = client.peer_port,
                        error = %e,
                        "dropping client"
                    );
                    return Some("framing violation");
                }
            };
            if let Err(e) = handle_line(&self.registry, &self.config, client, &line) {
                tracing::warn!(
                    peer = %client.peer_ip,
                    port = client.peer_port,
                    error = %e,
                    "dropping client"
                );
                return Some("protocol violation");
            }
        }
    }

    /// Disconnect hook. Idempotent: the registry removal is the gate, so
    /// a client that was already torn down by another path is a no-op.
    fn disconnect(&self, client: Arc<Client>, reason: &'static str) {
        if !self.registry.remove_client(&client) {
            return;
        }
        self.registry.dec_ip(&client.peer_ip);
        if let Some(session) = client.session.lock().take() {
            self.registry.remove_session(&session);
        }
        self.shared.dec_load();
        client.close();
        tracing::info!(
            peer = %client.peer_ip,
            port = client.peer_port,
            worker = self.shared.index,
            reason,
            "client disconnected"
        );
    }
}
