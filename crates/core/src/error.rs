//! Error types for the planet master-server library.

use std::fmt;

/// Errors that can occur while running the master server.
///
/// Variants map to the protocol's failure classes:
///
/// - **Framing**: [`Framing`](Self::Framing) — malformed line structure.
/// - **Parse**: [`Parse`](Self::Parse) — well-framed command with a bad payload.
/// - **State**: [`State`](Self::State) — command not valid in the connection's
///   current state.
/// - **Policy**: [`Policy`](Self::Policy) — admission or abuse-control refusal.
/// - **Transport**: [`Io`](Self::Io) — socket/network failures.
///
/// Framing, parse, state, and policy errors are fatal to the connection and
/// produce nothing on the wire; the misbehaving client is silently
/// disconnected.
#[derive(Debug, thiserror::Error)]
pub enum PlanetError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed command line structure.
    #[error("framing error: {kind}")]
    Framing { kind: FramingErrorKind },

    /// Well-framed command with an unparseable payload.
    #[error("parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// Command not valid in the connection's current state.
    #[error("state error: {kind}")]
    State { kind: StateErrorKind },

    /// Admission or abuse-control refusal.
    #[error("policy violation: {kind}")]
    Policy { kind: PolicyErrorKind },

    /// [`Planet::start`](crate::Planet::start) was called while already running.
    #[error("server already running")]
    AlreadyRunning,

    /// Configuration file could not be parsed.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be serialized for persistence.
    #[error("config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

/// Specific kind of framing failure.
#[derive(Debug)]
pub enum FramingErrorKind {
    /// Line exceeded the 256-byte limit, terminator included.
    Oversize,
    /// Stripped line was shorter than the two-byte minimum.
    TooShort,
    /// First byte was not `'?'`.
    MissingPrefix,
}

impl fmt::Display for FramingErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Oversize => write!(f, "command line too long"),
            Self::TooShort => write!(f, "command line too short"),
            Self::MissingPrefix => write!(f, "missing '?' prefix"),
        }
    }
}

/// Specific kind of payload parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// `V` payload was not a decimal integer.
    Version,
    /// `R` or `X` port was not a decimal 16-bit unsigned integer.
    Port,
    /// `X` payload was not of the form `ip:port`.
    Endpoint,
    /// `C`, `M`, or `P` arrived with an empty payload.
    MissingAttribute,
    /// Command letter is not part of the protocol.
    UnknownCommand,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version => write!(f, "invalid version number"),
            Self::Port => write!(f, "invalid port"),
            Self::Endpoint => write!(f, "invalid ip:port endpoint"),
            Self::MissingAttribute => write!(f, "missing attribute byte"),
            Self::UnknownCommand => write!(f, "unknown command"),
        }
    }
}

/// Specific kind of connection-state violation.
#[derive(Debug)]
pub enum StateErrorKind {
    /// A command other than `V` arrived before the version handshake.
    HandshakeRequired,
    /// A session operation arrived from a client with no registered session.
    NoSession,
    /// `R` arrived from a client that already owns a session.
    DuplicateRegistration,
    /// `R` arrived from a client too old to host sessions.
    VersionTooOld,
}

impl fmt::Display for StateErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HandshakeRequired => write!(f, "version handshake required"),
            Self::NoSession => write!(f, "no session registered"),
            Self::DuplicateRegistration => write!(f, "session already registered"),
            Self::VersionTooOld => write!(f, "client version too old to host"),
        }
    }
}

/// Specific kind of policy refusal.
#[derive(Debug)]
pub enum PolicyErrorKind {
    /// Global client cap reached.
    MaxClients,
    /// Peer IP is on the persistent blacklist.
    Blacklisted,
    /// Per-IP simultaneous-connection cap exceeded.
    TooManyFromIp,
    /// Penalty meter tripped with the disconnect reaction configured.
    PenaltyLimit,
}

impl fmt::Display for PolicyErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxClients => write!(f, "maximum client count reached"),
            Self::Blacklisted => write!(f, "blacklisted IP"),
            Self::TooManyFromIp => write!(f, "too many connections from IP"),
            Self::PenaltyLimit => write!(f, "penalty limit reached"),
        }
    }
}

/// Convenience alias for `Result<T, PlanetError>`.
pub type Result<T> = std::result::Result<T, PlanetError>;
