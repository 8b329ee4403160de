//! Command line framing and payload parsing.

use crate::error::{FramingErrorKind, ParseErrorKind, PlanetError, Result};
use crate::protocol::MAX_COMMAND_LENGTH;

/// A framed command: the letter at byte 1 and everything after it.
///
/// Produced by [`parse_line`] after the preamble checks; payload
/// validation is the dispatcher's job, so that each command can charge
/// its penalty cost before rejecting a bad payload.
#[derive(Debug, PartialEq, Eq)]
pub struct RawCommand<'a> {
    pub letter: u8,
    pub payload: &'a [u8],
}

/// Pull the next complete line out of a connection's read buffer.
///
/// Returns `Ok(Some(line))` with the terminator stripped, `Ok(None)` when
/// no full line has arrived yet, and a framing error once the line can no
/// longer fit in [`MAX_COMMAND_LENGTH`] bytes. A line of exactly 256
/// bytes including `\r\n` is accepted; 257 is an error.
pub fn extract_line(buf: &mut Vec<u8>) -> Result<Option<Vec<u8>>> {
    match buf.iter().position(|&b| b == b'\n') {
        Some(pos) => {
            if pos + 1 > MAX_COMMAND_LENGTH {
                return Err(PlanetError::Framing {
                    kind: FramingErrorKind::Oversize,
                });
            }
            let mut line: Vec<u8> = buf.drain(..=pos).collect();
            // Strip `\r\n`. Short lines fail the length preamble later.
            line.truncate(line.len().saturating_sub(2));
            Ok(Some(line))
        }
        None if buf.len() >= MAX_COMMAND_LENGTH => Err(PlanetError::Framing {
            kind: FramingErrorKind::Oversize,
        }),
        None => Ok(None),
    }
}

/// Preamble checks on a stripped line: minimum length, `?` prefix.
pub fn parse_line(stripped: &[u8]) -> Result<RawCommand<'_>> {
    if stripped.len() < 2 {
        return Err(PlanetError::Framing {
            kind: FramingErrorKind::TooShort,
        });
    }
    if stripped[0] != b'?' {
        return Err(PlanetError::Framing {
            kind: FramingErrorKind::MissingPrefix,
        });
    }
    Ok(RawCommand {
        letter: stripped[1],
        payload: &stripped[2..],
    })
}

/// Parse a `V` payload as a decimal integer version.
pub fn parse_version(payload: &[u8]) -> Result<i32> {
    std::str::from_utf8(payload)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(PlanetError::Parse {
            kind: ParseErrorKind::Version,
        })
}

/// Parse an `R` payload as a decimal 16-bit unsigned port.
pub fn parse_port(payload: &[u8]) -> Result<u16> {
    std::str::from_utf8(payload)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(PlanetError::Parse {
            kind: ParseErrorKind::Port,
        })
}

/// Parse an `X` payload of the form `ip:port`, splitting on the first `:`.
pub fn parse_endpoint(payload: &[u8]) -> Result<(&str, u16)> {
    let text = std::str::from_utf8(payload).map_err(|_| PlanetError::Parse {
        kind: ParseErrorKind::Endpoint,
    })?;
    let (ip, port) = text.split_once(':').ok_or(PlanetError::Parse {
        kind: ParseErrorKind::Endpoint,
    })?;
    let port = port.parse().map_err(|_| PlanetError::Parse {
        kind: ParseErrorKind::Port,
    })?;
    Ok((ip, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_strips_terminator() {
        let mut buf = b"?V77\r\n?G\r\n".to_vec();
        assert_eq!(extract_line(&mut buf).unwrap(), Some(b"?V77".to_vec()));
        assert_eq!(extract_line(&mut buf).unwrap(), Some(b"?G".to_vec()));
        assert_eq!(extract_line(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn extract_waits_for_full_line() {
        let mut buf = b"?Nhalf".to_vec();
        assert_eq!(extract_line(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"name\r\n");
        assert_eq!(extract_line(&mut buf).unwrap(), Some(b"?Nhalfname".to_vec()));
    }

    #[test]
    fn line_of_exactly_256_bytes_is_accepted() {
        let mut line = vec![b'?', b'N'];
        line.extend(std::iter::repeat_n(b'a', 252));
        line.extend_from_slice(b"\r\n");
        assert_eq!(line.len(), 256);
        let mut buf = line.clone();
        let extracted = extract_line(&mut buf).unwrap().unwrap();
        assert_eq!(extracted.len(), 254);
    }

    #[test]
    fn line_of_257_bytes_is_a_framing_error() {
        let mut line = vec![b'?', b'N'];
        line.extend(std::iter::repeat_n(b'a', 253));
        line.extend_from_slice(b"\r\n");
        assert_eq!(line.len(), 257);
        let mut buf = line;
        assert!(extract_line(&mut buf).is_err());
    }

    #[test]
    fn unterminated_full_buffer_is_a_framing_error() {
        let mut buf = vec![b'a'; MAX_COMMAND_LENGTH];
        assert!(extract_line(&mut buf).is_err());
    }

    #[test]
    fn preamble_rejects_short_and_unprefixed() {
        assert!(parse_line(b"?").is_err());
        assert!(parse_line(b"").is_err());
        assert!(parse_line(b"GET / HTTP/1.1").is_err());
        let cmd = parse_line(b"?V77").unwrap();
        assert_eq!(cmd.letter, b'V');
        assert_eq!(cmd.payload, b"77");
    }

    #[test]
    fn empty_payload_is_preserved() {
        let cmd = parse_line(b"?V").unwrap();
        assert_eq!(cmd.letter, b'V');
        assert!(cmd.payload.is_empty());
    }

    #[test]
    fn version_parsing() {
        assert_eq!(parse_version(b"77").unwrap(), 77);
        assert_eq!(parse_version(b"-5").unwrap(), -5);
        assert!(parse_version(b"seventy").is_err());
        assert!(parse_version(b"").is_err());
    }

    #[test]
    fn port_parsing_is_unsigned_16_bit() {
        assert_eq!(parse_port(b"20000").unwrap(), 20000);
        // Above the signed 16-bit range but a valid port.
        assert_eq!(parse_port(b"40000").unwrap(), 40000);
        assert!(parse_port(b"65536").is_err());
        assert!(parse_port(b"-1").is_err());
        assert!(parse_port(b"").is_err());
    }

    #[test]
    fn endpoint_splits_on_first_colon() {
        assert_eq!(parse_endpoint(b"127.0.0.1:20000").unwrap(), ("127.0.0.1", 20000));
        assert!(parse_endpoint(b"127.0.0.1").is_err());
        assert!(parse_endpoint(b"127.0.0.1:notaport").is_err());
        // Extra colon lands in the port field and fails to parse there.
        assert!(parse_endpoint(b"1:2:3").is_err());
    }
}
