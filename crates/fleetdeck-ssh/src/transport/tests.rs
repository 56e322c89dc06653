//! Tests for the SSH transport

use super::*;
use std::io::Write;
use std::net::TcpListener;
use std::thread;

fn local_host(port: u16) -> HostConfig {
    HostConfig::with_password("local", "127.0.0.1", "ops", "secret").port(port)
}

#[test]
fn test_transport_defaults() {
    let transport = SshTransport::default();
    assert_eq!(transport.name(), "ssh");
    assert_eq!(transport.keepalive_seconds(), 30);
    assert!(transport.command_timeout().is_none());

    let tuned = SshTransport::new()
        .with_keepalive_seconds(0)
        .with_command_timeout(Duration::from_secs(20));
    assert_eq!(tuned.keepalive_seconds(), 0);
    assert_eq!(tuned.command_timeout(), Some(Duration::from_secs(20)));
}

#[test]
fn test_millis_saturate() {
    assert_eq!(millis_u32(Duration::from_millis(1_500)), 1_500);
    assert_eq!(millis_u32(Duration::from_secs(u64::MAX / 1_000)), u32::MAX);
}

#[tokio::test]
async fn test_missing_private_key_fails_before_dialing() {
    let dir = tempfile::tempdir().unwrap();
    let key = dir.path().join("id_ed25519");
    // Port 1 is never dialed: the key check comes first
    let host = HostConfig::with_private_key("alpha", "127.0.0.1", "ops", &key).port(1);

    let err = SshTransport::new()
        .connect(&host, Duration::from_secs(1))
        .await
        .err()
        .expect("missing key must fail");

    assert!(matches!(err, FleetError::Authentication(_)));
    assert!(err.to_string().contains("id_ed25519"));
}

#[tokio::test]
async fn test_refused_port_is_connection_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let err = SshTransport::new()
        .connect(&local_host(port), Duration::from_secs(2))
        .await
        .err()
        .expect("nothing listens on the port");

    assert!(matches!(err, FleetError::Connection(_)));
    assert!(err.is_connection_lost());
}

#[tokio::test]
async fn test_non_ssh_server_fails_handshake() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let _ = stream.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n");
        }
    });

    let err = SshTransport::new()
        .connect(&local_host(port), Duration::from_secs(2))
        .await
        .err()
        .expect("handshake must fail");

    assert!(matches!(err, FleetError::Connection(_)));
    assert!(err.to_string().contains("handshake"), "{}", err);
    server.join().unwrap();
}

#[test]
fn test_check_private_key_accepts_existing_file() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let auth = HostAuth::private_key(file.path());
    assert!(check_private_key(&auth).is_ok());
    assert!(check_private_key(&HostAuth::agent()).is_ok());
}
