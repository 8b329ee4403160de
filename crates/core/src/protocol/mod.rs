//! The planet line protocol.
//!
//! TCP, line-oriented, 8-bit bytes. Every client-to-server line has the
//! shape `?<cmd><payload>\r\n` and is at most 256 bytes including the
//! terminator. Server replies end with a bare `\n`; list responses
//! additionally carry NUL bytes on the wire (see [`wire`]).
//!
//! ## Commands
//!
//! | Letter | Meaning | Payload | Reply |
//! |--------|---------|---------|-------|
//! | `V` | Version handshake | empty or decimal int | `V075\n` / `V077\n` |
//! | `G` | Session list | empty | record list or old-version banner |
//! | `R` | Register hosted session | decimal u16 port | `r\n` |
//! | `N` | Set session hostname | text | none |
//! | `m` | Set session mapname | text | none |
//! | `C` | Set current users | single byte | none |
//! | `M` | Set max users | single byte | none |
//! | `P` | Set gametype | single byte | none |
//! | `S` | Client count | empty | `S<count>\n` |
//! | `K` | Ping | empty | `K\n` |
//! | `X` | Invite relay | `ip:port` | `x<ip>\n` to the session owner |
//!
//! There is no error reply format: any framing, state, parse, or policy
//! failure silently disconnects the client.

pub mod command;
pub mod handler;
pub mod wire;

pub use command::{RawCommand, extract_line, parse_line};
pub use wire::{LIST_TERMINATOR, OLD_VERSION_BANNER, encode_session_list};

/// Protocol version this server speaks, as sent on the wire.
pub const SERVER_VERSION_TOKEN: &str = "077";

/// Numeric form of [`SERVER_VERSION_TOKEN`].
pub const SERVER_VERSION: i32 = 77;

/// Clients older than this may not host sessions.
pub const HOSTING_MIN_VERSION: i32 = 76;

/// Clients newer than this see the hosting port in list records.
pub const PORT_IN_LIST_MIN_VERSION: i32 = 76;

/// Version assigned to clients that send an empty `V` handshake.
pub const LEGACY_CLIENT_VERSION: i32 = 75;

/// Reply to an empty `V` handshake.
pub const LEGACY_VERSION_REPLY: &[u8] = b"V075\n";

/// Maximum command line length in bytes, `\r\n` included.
pub const MAX_COMMAND_LENGTH: usize = 256;
