//! Hosted game sessions.
//!
//! A session is a record describing one game-hosting endpoint that other
//! players can join. It is created by the `R` command, advertised through
//! `G` list responses, and destroyed when its owning client disconnects
//! (or when another client re-registers the same `(ip, port)` endpoint
//! and the prior owner is evicted).
//!
//! A client owns at most one session; a session has exactly one owner.
//! The back-reference to the owner is a [`Weak`] handle so the session
//! never keeps a disconnected client alive, and the owner's IP is cached
//! immutably because list encoding needs it on every `G` request.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::client::Client;

/// Field values a session carries right after registration, before the
/// owner has sent any `N`/`m`/`C`/`M`/`P` updates.
pub const DEFAULT_HOSTNAME: &str = "null";
pub const DEFAULT_MAPNAME: &str = "null";
pub const DEFAULT_CURRENT_USERS: u8 = b'0';
pub const DEFAULT_MAX_USERS: u8 = b'8';
pub const DEFAULT_GAMETYPE: u8 = b'0';

/// One registered game-hosting endpoint.
#[derive(Debug)]
pub struct Session {
    owner: Weak<Client>,
    /// Owner's IP at registration time. Immutable for the session's life.
    pub owner_ip: String,
    /// Game port the owner is hosting on.
    pub port: u16,
    details: RwLock<SessionDetails>,
}

#[derive(Debug)]
struct SessionDetails {
    hostname: String,
    mapname: String,
    gametype: u8,
    current_users: u8,
    max_users: u8,
}

/// Consistent copy of the fields the `G` list encoder needs.
///
/// Taken under the registry reader lock so the lock is never held across
/// socket writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub ip: String,
    pub hostname: String,
    pub mapname: String,
    pub gametype: u8,
    pub current_users: u8,
    pub max_users: u8,
    pub port: u16,
}

impl Session {
    pub fn new(owner: Weak<Client>, owner_ip: String, port: u16) -> Self {
        Session {
            owner,
            owner_ip,
            port,
            details: RwLock::new(SessionDetails {
                hostname: DEFAULT_HOSTNAME.to_string(),
                mapname: DEFAULT_MAPNAME.to_string(),
                gametype: DEFAULT_GAMETYPE,
                current_users: DEFAULT_CURRENT_USERS,
                max_users: DEFAULT_MAX_USERS,
            }),
        }
    }

    /// Upgrade the back-reference to the owning client, if still connected.
    pub fn owner(&self) -> Option<Arc<Client>> {
        self.owner.upgrade()
    }

    /// Whether this session is hosted at `(ip, port)`. IPs compare
    /// case-insensitively.
    pub fn matches_endpoint(&self, ip: &str, port: u16) -> bool {
        self.port == port && self.owner_ip.eq_ignore_ascii_case(ip)
    }

    pub fn set_hostname(&self, hostname: &str) {
        tracing::debug!(ip = %self.owner_ip, port = self.port, hostname, "session hostname set");
        self.details.write().hostname = hostname.to_string();
    }

    pub fn set_mapname(&self, mapname: &str) {
        tracing::debug!(ip = %self.owner_ip, port = self.port, mapname, "session mapname set");
        self.details.write().mapname = mapname.to_string();
    }

    pub fn set_current_users(&self, value: u8) {
        self.details.write().current_users = value;
    }

    pub fn set_max_users(&self, value: u8) {
        self.details.write().max_users = value;
    }

    pub fn set_gametype(&self, value: u8) {
        self.details.write().gametype = value;
    }

    /// Copy out the fields the list encoder needs.
    pub fn snapshot(&self) -> SessionInfo {
        let details = self.details.read();
        SessionInfo {
            ip: self.owner_ip.clone(),
            hostname: details.hostname.clone(),
            mapname: details.mapname.clone(),
            gametype: details.gametype,
            current_users: details.current_users,
            max_users: details.max_users,
            port: self.port,
        }
    }
}
