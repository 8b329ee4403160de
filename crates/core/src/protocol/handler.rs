//! Command dispatch for a single client line.
//!
//! The worker read loop hands each stripped line to [`handle_line`],
//! which runs the preamble checks in protocol order (length, `?` prefix,
//! handshake, penalty) and then dispatches on the command letter. Any
//! error returned here is fatal: the worker disconnects the client and
//! nothing goes out on the wire.
//!
//! Each command charges its configured penalty cost as soon as its letter
//! is recognized, before payload validation, so that malformed floods
//! still accumulate cost.

use std::sync::Arc;

use crate::client::Client;
use crate::config::Config;
use crate::error::{ParseErrorKind, PlanetError, PolicyErrorKind, Result, StateErrorKind};
use crate::protocol::command::{self, RawCommand};
use crate::protocol::{
    HOSTING_MIN_VERSION, LEGACY_CLIENT_VERSION, LEGACY_VERSION_REPLY, SERVER_VERSION,
    SERVER_VERSION_TOKEN, wire,
};
use crate::registry::Registry;
use crate::session::Session;
use crate::worker::WorkerMsg;

/// What became of a well-framed line.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The command was dispatched.
    Handled,
    /// The penalty meter tripped with the ignore reaction configured;
    /// the command was dropped silently.
    Ignored,
}

/// Run one stripped command line for `client`. Errors are fatal to the
/// connection.
pub(crate) fn handle_line(
    registry: &Registry,
    config: &Config,
    client: &Arc<Client>,
    stripped: &[u8],
) -> Result<Outcome> {
    let cmd = command::parse_line(stripped)?;

    // The client must report its version before anything else is served.
    if client.version() == 0 && cmd.letter != b'V' {
        return Err(PlanetError::State {
            kind: StateErrorKind::HandshakeRequired,
        });
    }

    if config.penalty.enabled && client.penalty.lock().over_limit() {
        tracing::warn!(
            peer = %client.peer_ip,
            port = client.peer_port,
            "penalty limit reached"
        );
        if config.penalty.blacklist_on_limit {
            config.blacklist_ip(&client.peer_ip);
        }
        if config.penalty.disconnect_on_limit {
            return Err(PlanetError::Policy {
                kind: PolicyErrorKind::PenaltyLimit,
            });
        }
        if config.penalty.ignore_on_limit {
            return Ok(Outcome::Ignored);
        }
    }

    tracing::debug!(
        peer = %client.peer_ip,
        port = client.peer_port,
        command = %(cmd.letter as char),
        "command received"
    );

    let handler = CommandHandler {
        registry,
        config,
        client,
    };
    handler.dispatch(cmd)?;
    Ok(Outcome::Handled)
}

struct CommandHandler<'a> {
    registry: &'a Registry,
    config: &'a Config,
    client: &'a Arc<Client>,
}

impl CommandHandler<'_> {
    fn dispatch(&self, cmd: RawCommand<'_>) -> Result<()> {
        match cmd.letter {
            b'V' => self.version(cmd.payload),
            b'G' => self.list(),
            b'R' => self.register(cmd.payload),
            b'N' => self.set_hostname(cmd.payload),
            b'm' => self.set_mapname(cmd.payload),
            b'C' => self.set_current_users(cmd.payload),
            b'M' => self.set_max_users(cmd.payload),
            b'P' => self.set_gametype(cmd.payload),
            b'S' => self.client_count(),
            b'K' => self.ping(),
            b'X' => self.invite(cmd.payload),
            _ => Err(PlanetError::Parse {
                kind: ParseErrorKind::UnknownCommand,
            }),
        }
    }

    fn charge(&self, cost: u32) {
        if self.config.penalty.enabled {
            self.client.penalty.lock().add(cost);
        }
    }

    /// The session this client hosts, required by the `N`/`m`/`C`/`M`/`P`
    /// family.
    fn own_session(&self) -> Result<Arc<Session>> {
        self.client.session.lock().clone().ok_or(PlanetError::State {
            kind: StateErrorKind::NoSession,
        })
    }

    fn version(&self, payload: &[u8]) -> Result<()> {
        self.charge(self.config.penalty.costs.version);

        if payload.is_empty() {
            // Pre-handshake clients that cannot report a version get the
            // legacy version back.
            self.client.set_version(LEGACY_CLIENT_VERSION);
            self.client.send_logged(LEGACY_VERSION_REPLY);
        } else {
            self.client.set_version(command::parse_version(payload)?);
            self.client
                .send_logged(format!("V{SERVER_VERSION_TOKEN}\n").as_bytes());
        }
        Ok(())
    }

    fn list(&self) -> Result<()> {
        self.charge(self.config.penalty.costs.list);

        if self.client.version() < SERVER_VERSION {
            tracing::debug!(
                peer = %self.client.peer_ip,
                version = self.client.version(),
                "sending old-version banner"
            );
            self.client.send_logged(wire::OLD_VERSION_BANNER);
        } else {
            let sessions = self.registry.snapshot_sessions();
            let response = wire::encode_session_list(&sessions, self.client.version());
            tracing::debug!(
                peer = %self.client.peer_ip,
                sessions = sessions.len(),
                "sending session list"
            );
            self.client.send_logged(&response);
        }
        Ok(())
    }

    fn register(&self, payload: &[u8]) -> Result<()> {
        self.charge(self.config.penalty.costs.register);

        if self.client.session.lock().is_some() {
            return Err(PlanetError::State {
                kind: StateErrorKind::DuplicateRegistration,
            });
        }
        if self.client.version() < HOSTING_MIN_VERSION {
            return Err(PlanetError::State {
                kind: StateErrorKind::VersionTooOld,
            });
        }
        let port = command::parse_port(payload)?;

        // Another client re-hosting the same endpoint evicts the prior
        // owner. The prior session leaves the registry before the new one
        // is inserted so the duplicate pair is never observable; the
        // disconnect itself travels through the owner's queue because
        // only the owning worker may tear a connection down.
        if let Some(prior) = self.registry.find_session(&self.client.peer_ip, port) {
            self.registry.remove_session(&prior);
            if let Some(prior_owner) = prior.owner() {
                tracing::info!(
                    peer = %self.client.peer_ip,
                    port,
                    prior_peer_port = prior_owner.peer_port,
                    "session endpoint re-registered, evicting prior owner"
                );
                prior_owner.owner.send(WorkerMsg::Disconnect {
                    client: prior_owner.clone(),
                    reason: "session endpoint re-registered",
                });
            }
        }

        let session = Arc::new(Session::new(
            Arc::downgrade(self.client),
            self.client.peer_ip.clone(),
            port,
        ));
        *self.client.session.lock() = Some(session.clone());
        self.registry.add_session(session);

        tracing::info!(
            peer = %self.client.peer_ip,
            peer_port = self.client.peer_port,
            port,
            "session registered"
        );
        self.client.send_logged(b"r\n");
        Ok(())
    }

    fn set_hostname(&self, payload: &[u8]) -> Result<()> {
        self.charge(self.config.penalty.costs.set_hostname);
        self.own_session()?
            .set_hostname(&String::from_utf8_lossy(payload));
        Ok(())
    }

    fn set_mapname(&self, payload: &[u8]) -> Result<()> {
        self.charge(self.config.penalty.costs.set_mapname);
        self.own_session()?
            .set_mapname(&String::from_utf8_lossy(payload));
        Ok(())
    }

    fn set_current_users(&self, payload: &[u8]) -> Result<()> {
        self.charge(self.config.penalty.costs.set_current_users);
        let session = self.own_session()?;
        session.set_current_users(Self::attribute_byte(payload)?);
        Ok(())
    }

    fn set_max_users(&self, payload: &[u8]) -> Result<()> {
        self.charge(self.config.penalty.costs.set_max_users);
        let session = self.own_session()?;
        session.set_max_users(Self::attribute_byte(payload)?);
        Ok(())
    }

    fn set_gametype(&self, payload: &[u8]) -> Result<()> {
        self.charge(self.config.penalty.costs.set_gametype);
        let session = self.own_session()?;
        session.set_gametype(Self::attribute_byte(payload)?);
        Ok(())
    }

    fn attribute_byte(payload: &[u8]) -> Result<u8> {
        payload.first().copied().ok_or(PlanetError::Parse {
            kind: ParseErrorKind::MissingAttribute,
        })
    }

    fn client_count(&self) -> Result<()> {
        self.charge(self.config.penalty.costs.client_count);
        let count = self.registry.client_count();
        self.client.send_logged(format!("S{count}\n").as_bytes());
        Ok(())
    }

    fn ping(&self) -> Result<()> {
        self.charge(self.config.penalty.costs.ping);
        self.client.touch_ping();
        self.client.send_logged(b"K\n");
        Ok(())
    }

    fn invite(&self, payload: &[u8]) -> Result<()> {
        self.charge(self.config.penalty.costs.invite);

        let (ip, port) = command::parse_endpoint(payload)?;
        match self.registry.find_session(ip, port) {
            Some(target) => {
                if let Some(target_owner) = target.owner() {
                    tracing::debug!(
                        peer = %self.client.peer_ip,
                        target_ip = ip,
                        target_port = port,
                        "relaying invite request"
                    );
                    target_owner.owner.send(WorkerMsg::Relay {
                        to: target_owner.clone(),
                        line: format!("x{}\n", self.client.peer_ip).into_bytes(),
                    });
                }
            }
            // An unknown target is a quiet miss, not a protocol violation.
            None => {
                tracing::debug!(
                    peer = %self.client.peer_ip,
                    target_ip = ip,
                    target_port = port,
                    "invite target not found"
                );
            }
        }
        Ok(())
    }
}
