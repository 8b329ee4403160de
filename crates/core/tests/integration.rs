//! Integration tests: real TCP clients against a started server.
//!
//! Each test starts its own server on port 0 so tests can run in
//! parallel without colliding. Expected wire bytes are asserted exactly,
//! NULs included.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use planet::protocol::OLD_VERSION_BANNER;
use planet::{Config, Planet};

const IO_TIMEOUT: Duration = Duration::from_secs(2);

/// Window in which we assert that no reply arrives.
const SILENCE_WINDOW: Duration = Duration::from_millis(500);

fn start_server(config: Config) -> (Planet, SocketAddr) {
    let mut config = config;
    config.network.address = "127.0.0.1".to_string();
    config.network.port = 0;
    // Keep the pool small unless a test pins it down.
    config.network.workers.get_or_insert(2);
    let mut server = Planet::new(config);
    server.start().expect("server start");
    let addr = server.local_addr().expect("bound address");
    (server, addr)
}

fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect_timeout(&addr, IO_TIMEOUT).expect("connect to server");
    stream.set_read_timeout(Some(IO_TIMEOUT)).unwrap();
    stream.set_write_timeout(Some(IO_TIMEOUT)).unwrap();
    stream
}

fn send(stream: &mut TcpStream, bytes: &[u8]) {
    stream.write_all(bytes).expect("write command");
    stream.flush().expect("flush command");
}

/// Read exactly `n` bytes.
fn read_bytes(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    stream.read_exact(&mut buf).expect("read reply");
    buf
}

/// Read up to and including the next `\n`.
fn read_reply_line(stream: &mut TcpStream) -> Vec<u8> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte).expect("read reply byte");
        line.push(byte[0]);
        if byte[0] == b'\n' {
            return line;
        }
    }
}

/// Assert the server closed this connection.
fn expect_eof(stream: &mut TcpStream) {
    let mut buf = [0u8; 64];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return,
            // Discard whatever was still in flight before the close.
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::ConnectionReset => return,
            Err(e) => panic!("expected EOF, got error: {e}"),
        }
    }
}

/// Assert nothing arrives within the silence window.
fn expect_silence(stream: &mut TcpStream) {
    stream.set_read_timeout(Some(SILENCE_WINDOW)).unwrap();
    let mut buf = [0u8; 64];
    match stream.read(&mut buf) {
        Ok(n) => panic!("expected silence, got {n} bytes"),
        Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {}
        Err(e) => panic!("expected silence, got error: {e}"),
    }
    stream.set_read_timeout(Some(IO_TIMEOUT)).unwrap();
}

/// Handshake as a version-77 client.
fn handshake(stream: &mut TcpStream) {
    send(stream, b"?V77\r\n");
    assert_eq!(read_bytes(stream, 5), b"V077\n");
}

#[test]
fn handshake_then_empty_list() {
    let (_server, addr) = start_server(Config::default());
    let mut client = connect(addr);

    handshake(&mut client);
    send(&mut client, b"?G\r\n");
    assert_eq!(read_bytes(&mut client, 3), b"E\n\0");
}

#[test]
fn empty_handshake_gets_legacy_version_and_banner() {
    let (_server, addr) = start_server(Config::default());
    let mut client = connect(addr);

    // `?V\r\n` is the shortest valid line and takes the empty-V branch.
    send(&mut client, b"?V\r\n");
    assert_eq!(read_bytes(&mut client, 5), b"V075\n");

    // A version-75 client asking for the list gets the upgrade banner.
    send(&mut client, b"?G\r\n");
    assert_eq!(read_bytes(&mut client, OLD_VERSION_BANNER.len()), OLD_VERSION_BANNER);
}

#[test]
fn old_client_gets_banner() {
    let (_server, addr) = start_server(Config::default());
    let mut client = connect(addr);

    send(&mut client, b"?V75\r\n");
    assert_eq!(read_bytes(&mut client, 5), b"V077\n");

    send(&mut client, b"?G\r\n");
    assert_eq!(read_bytes(&mut client, OLD_VERSION_BANNER.len()), OLD_VERSION_BANNER);
}

#[test]
fn registered_session_appears_in_list() {
    let (_server, addr) = start_server(Config::default());

    let mut host = connect(addr);
    handshake(&mut host);
    send(&mut host, b"?R20000\r\n");
    assert_eq!(read_bytes(&mut host, 2), b"r\n");
    send(&mut host, b"?Nmygame\r\n");
    send(&mut host, b"?mdust\r\n");
    send(&mut host, b"?C3\r\n");
    send(&mut host, b"?M8\r\n");
    send(&mut host, b"?P1\r\n");
    // Ping sync: once the reply arrives, every prior command has been
    // dispatched and the session fields are visible.
    send(&mut host, b"?K\r\n");
    assert_eq!(read_bytes(&mut host, 2), b"K\n");

    let mut viewer = connect(addr);
    handshake(&mut viewer);
    send(&mut viewer, b"?G\r\n");
    let expected = b"L127.0.0.1\rmygame\rdust\r1\r3\r8\r20000\r\n\0E\n\0";
    assert_eq!(read_bytes(&mut viewer, expected.len()), expected);
}

#[test]
fn version_76_client_may_host_but_still_gets_banner() {
    let (_server, addr) = start_server(Config::default());

    // 76 is the oldest version allowed to register a session, yet it is
    // still older than the server, so `G` serves the upgrade banner.
    let mut host = connect(addr);
    send(&mut host, b"?V76\r\n");
    assert_eq!(read_bytes(&mut host, 5), b"V077\n");
    send(&mut host, b"?R20000\r\n");
    assert_eq!(read_bytes(&mut host, 2), b"r\n");
    send(&mut host, b"?G\r\n");
    assert_eq!(read_bytes(&mut host, OLD_VERSION_BANNER.len()), OLD_VERSION_BANNER);

    // A current client sees the version-76 host's session.
    let mut viewer = connect(addr);
    handshake(&mut viewer);
    send(&mut viewer, b"?G\r\n");
    let expected = b"L127.0.0.1\rnull\rnull\r0\r0\r8\r20000\r\n\0E\n\0";
    assert_eq!(read_bytes(&mut viewer, expected.len()), expected);
}

#[test]
fn client_count_and_ping() {
    let (_server, addr) = start_server(Config::default());
    let mut client = connect(addr);

    handshake(&mut client);
    send(&mut client, b"?K\r\n");
    assert_eq!(read_bytes(&mut client, 2), b"K\n");
    send(&mut client, b"?S\r\n");
    assert_eq!(read_reply_line(&mut client), b"S1\n");

    let mut second = connect(addr);
    handshake(&mut second);
    send(&mut second, b"?S\r\n");
    assert_eq!(read_reply_line(&mut second), b"S2\n");
}

#[test]
fn duplicate_registration_evicts_prior_owner() {
    let mut config = Config::default();
    // Two workers so the eviction crosses worker queues.
    config.network.workers = Some(2);
    let (_server, addr) = start_server(config);

    let mut first = connect(addr);
    handshake(&mut first);
    send(&mut first, b"?R40000\r\n");
    assert_eq!(read_bytes(&mut first, 2), b"r\n");

    let mut second = connect(addr);
    handshake(&mut second);
    send(&mut second, b"?R40000\r\n");
    assert_eq!(read_bytes(&mut second, 2), b"r\n");

    // The first owner is disconnected and its session is gone.
    expect_eof(&mut first);

    send(&mut second, b"?K\r\n");
    assert_eq!(read_bytes(&mut second, 2), b"K\n");
    let mut viewer = connect(addr);
    handshake(&mut viewer);
    send(&mut viewer, b"?G\r\n");
    let expected = b"L127.0.0.1\rnull\rnull\r0\r0\r8\r40000\r\n\0E\n\0";
    assert_eq!(read_bytes(&mut viewer, expected.len()), expected);
}

#[test]
fn invite_is_relayed_to_session_owner() {
    let mut config = Config::default();
    config.network.workers = Some(2);
    let (_server, addr) = start_server(config);

    let mut host = connect(addr);
    handshake(&mut host);
    send(&mut host, b"?R30000\r\n");
    assert_eq!(read_bytes(&mut host, 2), b"r\n");

    let mut guest = connect(addr);
    handshake(&mut guest);

    // Unknown target: silently ignored, the connection stays up.
    send(&mut guest, b"?X127.0.0.1:9999\r\n");
    send(&mut guest, b"?K\r\n");
    assert_eq!(read_bytes(&mut guest, 2), b"K\n");

    send(&mut guest, b"?X127.0.0.1:30000\r\n");
    assert_eq!(read_reply_line(&mut host), b"x127.0.0.1\n");
}

#[test]
fn per_ip_cap_refuses_the_third_connection() {
    let mut config = Config::default();
    config.network.max_per_ip = 2;
    // A single worker keeps attach processing in accept order.
    config.network.workers = Some(1);
    let (_server, addr) = start_server(config);

    let mut first = connect(addr);
    let mut second = connect(addr);
    let mut third = connect(addr);

    // Refused before any command exchange.
    expect_eof(&mut third);

    handshake(&mut first);
    handshake(&mut second);
}

#[test]
fn unlimited_per_ip_cap_admits_everyone() {
    let mut config = Config::default();
    config.network.max_per_ip = -1;
    let (_server, addr) = start_server(config);

    let mut clients: Vec<TcpStream> = (0..12).map(|_| connect(addr)).collect();
    for client in &mut clients {
        handshake(client);
    }
}

#[test]
fn garbage_is_silently_disconnected() {
    let (_server, addr) = start_server(Config::default());
    let mut client = connect(addr);

    send(&mut client, b"GET / HTTP/1.1\r\n");
    expect_eof(&mut client);
}

#[test]
fn command_before_handshake_is_fatal() {
    let (_server, addr) = start_server(Config::default());
    let mut client = connect(addr);

    send(&mut client, b"?G\r\n");
    expect_eof(&mut client);
}

#[test]
fn oversize_line_is_fatal() {
    let (_server, addr) = start_server(Config::default());
    let mut client = connect(addr);

    handshake(&mut client);
    let mut line = vec![b'?', b'N'];
    line.extend(std::iter::repeat_n(b'a', 253));
    line.extend_from_slice(b"\r\n");
    assert_eq!(line.len(), 257);
    send(&mut client, &line);
    expect_eof(&mut client);
}

#[test]
fn register_without_handshake_payload_errors_are_fatal() {
    let (_server, addr) = start_server(Config::default());

    // Bad port.
    let mut client = connect(addr);
    handshake(&mut client);
    send(&mut client, b"?Rnotaport\r\n");
    expect_eof(&mut client);

    // Session attribute without a session.
    let mut client = connect(addr);
    handshake(&mut client);
    send(&mut client, b"?Nmygame\r\n");
    expect_eof(&mut client);

    // Old client trying to host.
    let mut client = connect(addr);
    send(&mut client, b"?V75\r\n");
    assert_eq!(read_bytes(&mut client, 5), b"V077\n");
    send(&mut client, b"?R20000\r\n");
    expect_eof(&mut client);
}

#[test]
fn penalty_trip_ignores_commands() {
    let mut config = Config::default();
    config.penalty.max_points = 3;
    config.penalty.disconnect_on_limit = false;
    config.penalty.ignore_on_limit = true;
    config.penalty.blacklist_on_limit = false;
    let (_server, addr) = start_server(config);

    let mut client = connect(addr);
    handshake(&mut client); // version: 1 point
    send(&mut client, b"?K\r\n"); // ping: 1 point, total 2
    assert_eq!(read_bytes(&mut client, 2), b"K\n");
    send(&mut client, b"?K\r\n"); // total 3 = limit
    assert_eq!(read_bytes(&mut client, 2), b"K\n");

    // Meter is at the limit now: commands are dropped silently.
    send(&mut client, b"?K\r\n");
    expect_silence(&mut client);
}

#[test]
fn penalty_trip_disconnects_when_configured() {
    let mut config = Config::default();
    config.penalty.max_points = 3;
    config.penalty.disconnect_on_limit = true;
    config.penalty.blacklist_on_limit = false;
    let (_server, addr) = start_server(config);

    let mut client = connect(addr);
    handshake(&mut client);
    send(&mut client, b"?K\r\n");
    assert_eq!(read_bytes(&mut client, 2), b"K\n");
    send(&mut client, b"?K\r\n");
    assert_eq!(read_bytes(&mut client, 2), b"K\n");

    send(&mut client, b"?K\r\n");
    expect_eof(&mut client);
}

#[test]
fn penalty_trip_blacklists_and_blocks_reconnects() {
    let mut config = Config::default();
    config.penalty.max_points = 3;
    config.penalty.disconnect_on_limit = true;
    config.penalty.blacklist_on_limit = true;
    let (_server, addr) = start_server(config);

    let mut client = connect(addr);
    handshake(&mut client);
    send(&mut client, b"?K\r\n");
    assert_eq!(read_bytes(&mut client, 2), b"K\n");
    send(&mut client, b"?K\r\n");
    assert_eq!(read_bytes(&mut client, 2), b"K\n");
    send(&mut client, b"?K\r\n");
    expect_eof(&mut client);

    // 127.0.0.1 is now blacklisted: new connections are refused at accept.
    let mut banned = connect(addr);
    expect_eof(&mut banned);
}
