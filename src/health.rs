//! End-to-end health probe of a running proxy.
//!
//! The probe talks to the stable socket exactly like a real client would,
//! so a passing check covers the listener, the forwarder and the agent
//! behind them in one round trip.

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use log::debug;

use crate::errors::ProxyError;
use crate::protocol;

/// Deadline for the proxied agent response.
const HEALTH_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Probe the proxy listening on `socket_path`.
///
/// `Ok(())` means a live agent answered through the proxy.
/// [`ProxyError::NoAgent`] is the distinct in-between outcome: the proxy
/// answered with the generic failure message, so it is up but has no
/// working agent behind it. Everything else is a plain failure with its
/// cause.
pub fn health_check(socket_path: &Path) -> Result<(), ProxyError> {
    let mut stream = UnixStream::connect(socket_path).map_err(|e| {
        ProxyError::Message(format!(
            "failed to connect to proxy socket {}: {e}",
            socket_path.display()
        ))
    })?;
    stream.set_read_timeout(Some(HEALTH_READ_TIMEOUT))?;

    stream
        .write_all(&protocol::REQUEST_IDENTITIES_MSG)
        .map_err(|e| ProxyError::Message(format!("failed to send health check request: {e}")))?;

    let payload = protocol::read_message(&mut stream)?;
    match payload.first() {
        Some(&protocol::SSH_AGENT_IDENTITIES_ANSWER) => Ok(()),
        Some(&protocol::SSH_AGENT_FAILURE) => Err(ProxyError::NoAgent),
        Some(&tag) => Err(ProxyError::Message(format!(
            "unexpected response type: {tag}"
        ))),
        None => Err(ProxyError::Message("empty response from proxy".to_string())),
    }
}

/// Boolean convenience wrapper around [`health_check`].
pub fn is_healthy(socket_path: &Path) -> bool {
    match health_check(socket_path) {
        Ok(()) => true,
        Err(e) => {
            debug!("health check failed: {e}");
            false
        }
    }
}
