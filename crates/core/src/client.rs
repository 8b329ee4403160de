//! Per-connection client state.
//!
//! A [`Client`] represents anyone connected to the planet. It is created
//! by its owning worker when the dispatcher hands over an accepted
//! socket, and destroyed by the disconnect hook once the read loop
//! observes EOF or a protocol violation.
//!
//! Ownership discipline: the client's socket is read and written only on
//! its owning worker's thread. Other workers that need to act on a
//! client (evict it, relay an invite line to it) enqueue a request on the
//! owner's queue instead of touching the socket themselves.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::clock::monotonic_ms;
use crate::penalty::PenaltyMeter;
use crate::session::Session;
use crate::worker::WorkerShared;

/// How long a single reply write may stall on a full send buffer before
/// the write is abandoned. A client that stops draining its socket for
/// this long is not worth waiting for.
const WRITE_STALL_LIMIT: Duration = Duration::from_secs(5);

/// One connected client.
pub struct Client {
    stream: TcpStream,
    pub peer_ip: String,
    pub peer_port: u16,
    /// 0 until the `V` handshake completes.
    version: AtomicI32,
    /// Monotonic millisecond stamp, set on accept and on every `K`.
    last_pinged_ms: AtomicU64,
    /// The session this client hosts, at most one.
    pub session: Mutex<Option<Arc<Session>>>,
    /// Sliding-window command-cost meter.
    pub penalty: Mutex<PenaltyMeter>,
    /// The worker that owns this connection, stable for its lifetime.
    pub owner: Arc<WorkerShared>,
}

impl Client {
    pub(crate) fn new(
        stream: TcpStream,
        peer_addr: SocketAddr,
        owner: Arc<WorkerShared>,
        penalty: PenaltyMeter,
    ) -> Self {
        Client {
            stream,
            peer_ip: peer_addr.ip().to_string(),
            peer_port: peer_addr.port(),
            version: AtomicI32::new(0),
            last_pinged_ms: AtomicU64::new(monotonic_ms()),
            session: Mutex::new(None),
            penalty: Mutex::new(penalty),
            owner,
        }
    }

    /// Protocol version reported by the client; 0 before the handshake.
    pub fn version(&self) -> i32 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn set_version(&self, version: i32) {
        self.version.store(version, Ordering::SeqCst);
    }

    pub fn last_pinged_ms(&self) -> u64 {
        self.last_pinged_ms.load(Ordering::SeqCst)
    }

    /// Record ping activity now.
    pub fn touch_ping(&self) {
        self.last_pinged_ms.store(monotonic_ms(), Ordering::SeqCst);
    }

    /// Nonblocking read on the owning worker's thread.
    pub(crate) fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.stream).read(buf)
    }

    /// Write a full reply, riding out short `WouldBlock` stalls.
    ///
    /// The socket is nonblocking for the read loop's sake; replies are
    /// small and normally land in the OS send buffer on the first write.
    pub fn send(&self, bytes: &[u8]) -> io::Result<()> {
        let mut stream = &self.stream;
        let mut written = 0;
        let mut stalled = Duration::ZERO;
        while written < bytes.len() {
            match stream.write(&bytes[written..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    written += n;
                    stalled = Duration::ZERO;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if stalled >= WRITE_STALL_LIMIT {
                        return Err(io::ErrorKind::TimedOut.into());
                    }
                    std::thread::sleep(Duration::from_millis(1));
                    stalled += Duration::from_millis(1);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Write a reply; transport failures are logged, never fatal here.
    /// A broken socket surfaces as a read failure on the next poll.
    pub fn send_logged(&self, bytes: &[u8]) {
        if let Err(e) = self.send(bytes) {
            tracing::error!(
                peer = %self.peer_ip,
                port = self.peer_port,
                error = %e,
                "failed to write reply"
            );
        }
    }

    /// Shut the socket down; the peer observes EOF.
    pub(crate) fn close(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("peer_ip", &self.peer_ip)
            .field("peer_port", &self.peer_port)
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}
