//! Sender lifecycle behavior that needs no live receiver.

use std::net::UdpSocket;
use std::time::Duration;

use rudp_client::{HandshakeError, Sender, SenderConfig, TransferError};
use rudp_core::ConnectionState;

/// A bound socket that never answers.
fn silent_peer() -> (UdpSocket, u16) {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = socket.local_addr().unwrap().port();
    (socket, port)
}

fn config(port: u16) -> SenderConfig {
    SenderConfig::new("127.0.0.1", port, Duration::from_millis(50), false)
}

#[test]
fn connect_times_out_against_silent_peer() {
    let (_socket, port) = silent_peer();
    let mut sender = Sender::new(config(port)).unwrap();

    let err = sender.connect().unwrap_err();
    assert!(matches!(err, HandshakeError::Timeout { .. }));
    assert_eq!(sender.state(), ConnectionState::Closed);
}

#[test]
fn send_without_connection_is_rejected() {
    let (_socket, port) = silent_peer();
    let mut sender = Sender::new(config(port)).unwrap();

    let err = sender.send(b"data").unwrap_err();
    assert!(matches!(err, TransferError::InvalidState { state: ConnectionState::Closed }));
}

#[test]
fn close_without_connection_is_a_noop() {
    let (_socket, port) = silent_peer();
    let mut sender = Sender::new(config(port)).unwrap();

    sender.close();
    assert_eq!(sender.state(), ConnectionState::Closed);
}

#[test]
fn crypto_sender_generates_a_key() {
    let (_socket, port) = silent_peer();
    let plain = Sender::new(config(port)).unwrap();
    assert!(plain.key().is_none());

    let sealed = Sender::new(SenderConfig {
        use_crypto: true,
        ..config(port)
    })
    .unwrap();
    assert!(sealed.key().is_some());
}

#[test]
fn unresolvable_host_fails_construction() {
    let result = Sender::new(SenderConfig::new(
        "rudp.invalid",
        9000,
        Duration::from_millis(50),
        false,
    ));
    assert!(matches!(result, Err(HandshakeError::Io(_))));
}
