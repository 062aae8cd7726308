mod common;

use std::io::{Read, Write};
use std::os::unix::net::UnixListener;
use std::thread;

use ssh_agent_proxy::{health_check, is_healthy, ProxyError};
use tempfile::TempDir;

#[test]
fn test_health_check_passes_with_live_agent() {
    let scan_root = TempDir::new().unwrap();
    common::spawn_discoverable_agent(scan_root.path(), "healthy");

    let sock_dir = TempDir::new().unwrap();
    let proxy_socket = sock_dir.path().join("proxy.sock");
    let _proxy = common::start_proxy(scan_root.path(), &proxy_socket);

    health_check(&proxy_socket).expect("health check should pass");
    assert!(is_healthy(&proxy_socket));
}

#[test]
fn test_health_check_reports_agentless_proxy_distinctly() {
    // The proxy is up but has nothing to forward to. That is a specific
    // outcome, not a generic failure.
    let scan_root = TempDir::new().unwrap();

    let sock_dir = TempDir::new().unwrap();
    let proxy_socket = sock_dir.path().join("proxy.sock");
    let _proxy = common::start_proxy(scan_root.path(), &proxy_socket);

    match health_check(&proxy_socket) {
        Err(ProxyError::NoAgent) => {}
        other => panic!("expected NoAgent, got {other:?}"),
    }
    assert!(!is_healthy(&proxy_socket));
}

#[test]
fn test_health_check_fails_for_missing_socket() {
    let sock_dir = TempDir::new().unwrap();
    let missing = sock_dir.path().join("missing.sock");

    match health_check(&missing) {
        Err(ProxyError::Message(msg)) => {
            assert!(msg.contains("failed to connect"), "unexpected cause: {msg}")
        }
        other => panic!("expected a connect failure, got {other:?}"),
    }
}

#[test]
fn test_health_check_rejects_oversized_response() {
    // A peer that declares a multi-gigabyte response must be rejected on
    // the header alone.
    let sock_dir = TempDir::new().unwrap();
    let path = sock_dir.path().join("bogus.sock");
    let listener = UnixListener::bind(&path).unwrap();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { return };
            thread::spawn(move || {
                let mut request = [0u8; 5];
                if stream.read_exact(&mut request).is_ok() {
                    let _ = stream.write_all(&[0xff, 0xff, 0xff, 0xff, 12]);
                }
            });
        }
    });

    match health_check(&path) {
        Err(ProxyError::Oversized(len)) => assert_eq!(len, u32::MAX),
        other => panic!("expected oversize rejection, got {other:?}"),
    }
}

#[test]
fn test_health_check_rejects_unexpected_tag() {
    let sock_dir = TempDir::new().unwrap();
    let path = sock_dir.path().join("weird.sock");
    let listener = UnixListener::bind(&path).unwrap();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { return };
            thread::spawn(move || {
                let mut request = [0u8; 5];
                if stream.read_exact(&mut request).is_ok() {
                    let _ = stream.write_all(&[0, 0, 0, 1, 99]);
                }
            });
        }
    });

    match health_check(&path) {
        Err(ProxyError::Message(msg)) => {
            assert!(
                msg.contains("unexpected response type: 99"),
                "unexpected cause: {msg}"
            )
        }
        other => panic!("expected an unexpected-tag failure, got {other:?}"),
    }
}
