//! Error taxonomy and exit-code mapping.
//!
//! The enum keeps internal call sites honest about which failures are
//! expected (no agent running) and which are not, while `Display` carries
//! the user-visible strings. Exit codes: 0 success or healthy, 2 for the
//! distinct "proxy reachable but no working agent" health outcome, 1 for
//! everything else.

use std::fmt;
use std::io;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ProxyError {
    /// The scan of the agent socket directory itself failed. Individual
    /// entries that vanish or cannot be stat'ed never produce this.
    Discovery(io::Error),
    /// No candidate socket validated. Expected whenever no agent is running.
    NoAgent,
    /// A peer declared a message length above the sanity ceiling.
    Oversized(u32),
    /// The stable proxy socket could not be bound.
    Bind { path: PathBuf, source: io::Error },
    /// Transport-level failure (dial, read or write).
    Io(io::Error),
    /// Descriptive failure without a useful source error.
    Message(String),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::Discovery(e) => write!(f, "socket discovery failed: {e}"),
            ProxyError::NoAgent => write!(f, "no active SSH agent socket found"),
            ProxyError::Oversized(len) => write!(f, "invalid response length: {len}"),
            ProxyError::Bind { path, source } => {
                write!(f, "failed to create proxy socket {}: {source}", path.display())
            }
            ProxyError::Io(e) => write!(f, "{e}"),
            ProxyError::Message(s) => f.write_str(s),
        }
    }
}

impl std::error::Error for ProxyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProxyError::Discovery(e) | ProxyError::Io(e) => Some(e),
            ProxyError::Bind { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for ProxyError {
    fn from(e: io::Error) -> Self {
        ProxyError::Io(e)
    }
}

/// Map an error to a process exit code for the CLI layer.
pub fn exit_code_for_proxy_error(e: &ProxyError) -> u8 {
    match e {
        ProxyError::NoAgent => 2,
        _ => 1,
    }
}
