//! Reply and list-response encoding.
//!
//! List responses are NUL-delimited record streams: each session becomes
//!
//! ```text
//! L<ip>\r<hostname>\r<mapname>\r<gametype>\r<current_users>\r<max_users>\r[<port>\r]\n\0
//! ```
//!
//! with the port field only present for clients newer than version 76,
//! and the whole response ends with the literal bytes `E\n\0`. The NULs
//! are part of the wire format.

use crate::protocol::PORT_IN_LIST_MIN_VERSION;
use crate::session::SessionInfo;

/// Terminator of every list response.
pub const LIST_TERMINATOR: &[u8] = b"E\n\0";

/// Fixed response sent to any `G` request from a client older than the
/// server. The exact bytes are a compatibility contract with deployed
/// game clients; do not edit them.
pub const OLD_VERSION_BANNER: &[u8] =
    b"L127.0.0.1\rYour version of NF\rK is too old\r1\r1\r1\r\n\0\
      L127.0.0.1\rPlease download\rthe latest version\r1\r1\r1\r\n\0\
      L127.0.0.1\rfrom\r^2needforkill.ru     \r1\r1\r1\r\n\0\
      L127.0.0.1\r\r\r1\r1\r1\r\n\0\
      L127.0.0.1\rCKA4AUTE HOBY|-0\rNFK C CAUTA\r1\r1\r1\r\n\0\
      L127.0.0.1\r^2needforkill.ru    \r\r1\r1\r1\r\n\0\
      E\n\0";

/// Per-record size estimate used to presize list responses.
const RECORD_SIZE_HINT: usize = 90;

/// Encode the session list for a current-version client.
pub fn encode_session_list(sessions: &[SessionInfo], client_version: i32) -> Vec<u8> {
    let mut out = Vec::with_capacity(RECORD_SIZE_HINT * sessions.len() + LIST_TERMINATOR.len());
    for session in sessions {
        out.push(b'L');
        out.extend_from_slice(session.ip.as_bytes());
        out.push(b'\r');
        out.extend_from_slice(session.hostname.as_bytes());
        out.push(b'\r');
        out.extend_from_slice(session.mapname.as_bytes());
        out.push(b'\r');
        out.push(session.gametype);
        out.push(b'\r');
        out.push(session.current_users);
        out.push(b'\r');
        out.push(session.max_users);
        out.push(b'\r');
        if client_version > PORT_IN_LIST_MIN_VERSION {
            out.extend_from_slice(session.port.to_string().as_bytes());
            out.push(b'\r');
        }
        out.push(b'\n');
        out.push(0);
    }
    out.extend_from_slice(LIST_TERMINATOR);
    out
}
