//! Process-wide directories of clients, sessions, and per-IP counts.
//!
//! Backed by `parking_lot` reader–writer locks because list requests
//! dominate the workload: every `G` takes a sessions read lock and every
//! `S` takes a clients read lock, while mutations only happen on connect,
//! register, and disconnect.
//!
//! Locking discipline: when more than one registry lock is needed, the
//! order is `sessions` before `clients` before `ip_count`. No registry
//! lock is ever held across a socket write — encoders work from
//! [`snapshot_sessions`](Registry::snapshot_sessions) copies.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::client::Client;
use crate::session::{Session, SessionInfo};

/// Shared directory of everything connected to and hosted on the planet.
#[derive(Debug, Default)]
pub struct Registry {
    clients: RwLock<Vec<Arc<Client>>>,
    sessions: RwLock<Vec<Arc<Session>>>,
    ip_count: Mutex<HashMap<String, u32>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_client(&self, client: Arc<Client>) {
        let mut clients = self.clients.write();
        clients.push(client);
        tracing::debug!(total = clients.len(), "client added to registry");
    }

    /// Remove a client; returns whether it was still present.
    ///
    /// The `false` case is how a disconnect hook detects that another
    /// path already tore this client down.
    pub fn remove_client(&self, client: &Arc<Client>) -> bool {
        let mut clients = self.clients.write();
        match clients.iter().position(|c| Arc::ptr_eq(c, client)) {
            Some(i) => {
                clients.remove(i);
                tracing::debug!(total = clients.len(), "client removed from registry");
                true
            }
            None => false,
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Clone out the current client set (used by the ping sweeper).
    pub fn snapshot_clients(&self) -> Vec<Arc<Client>> {
        self.clients.read().clone()
    }

    pub fn add_session(&self, session: Arc<Session>) {
        let mut sessions = self.sessions.write();
        sessions.push(session);
        tracing::debug!(total = sessions.len(), "session added to registry");
    }

    /// Remove a session; returns whether it was still present.
    pub fn remove_session(&self, session: &Arc<Session>) -> bool {
        let mut sessions = self.sessions.write();
        match sessions.iter().position(|s| Arc::ptr_eq(s, session)) {
            Some(i) => {
                sessions.remove(i);
                tracing::debug!(total = sessions.len(), "session removed from registry");
                true
            }
            None => false,
        }
    }

    /// Look up a session hosted at `(ip, port)`. IPs compare
    /// case-insensitively.
    pub fn find_session(&self, ip: &str, port: u16) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .iter()
            .find(|s| s.matches_endpoint(ip, port))
            .cloned()
    }

    /// Consistent copy of all sessions, in registration order, for the
    /// `G` list encoder.
    pub fn snapshot_sessions(&self) -> Vec<SessionInfo> {
        self.sessions.read().iter().map(|s| s.snapshot()).collect()
    }

    /// Count a new connection from `ip`; returns the count including it.
    pub fn inc_ip(&self, ip: &str) -> u32 {
        let mut counts = self.ip_count.lock();
        let count = counts.entry(ip.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Uncount a connection from `ip`, dropping the entry at zero so the
    /// map only ever holds positive counts.
    pub fn dec_ip(&self, ip: &str) {
        let mut counts = self.ip_count.lock();
        if let Some(count) = counts.get_mut(ip) {
            *count -= 1;
            if *count == 0 {
                counts.remove(ip);
            }
        }
    }

    /// Current connection count for `ip`; absent means zero.
    pub fn ip_connections(&self, ip: &str) -> u32 {
        self.ip_count.lock().get(ip).copied().unwrap_or(0)
    }
}
