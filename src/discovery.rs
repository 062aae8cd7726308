/*!
Agent socket discovery.

Each login with agent forwarding leaves a socket at
`/tmp/ssh-XXXXXXXX/agent.<pid>`, and old ones linger after the session is
gone. Discovery lists the candidates newest first so the latest login wins,
keeps only real sockets owned by the invoking user, and validates candidates
with a request-identities round trip until one answers.
*/

use std::env;
use std::io::{Read, Write};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use log::debug;
use nix::unistd::Uid;
use walkdir::{DirEntry, WalkDir};

use crate::errors::ProxyError;
use crate::protocol;

/// Deadline for a probed socket to produce a response header.
const PROBE_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// A candidate agent socket produced by a scan. `valid` starts out false;
/// the discovery diagnostics fill it in per candidate, while
/// [`find_active_socket`] probes lazily and stops at the first live one.
#[derive(Debug, Clone)]
pub struct SocketInfo {
    pub path: PathBuf,
    pub mtime: SystemTime,
    pub valid: bool,
}

/// Directory scanned for agent sockets. `SSH_AGENT_PROXY_SCAN_DIR`
/// overrides the `/tmp` default, which the diagnostics and the tests use to
/// point discovery at a private tree.
pub fn default_scan_root() -> PathBuf {
    env::var_os("SSH_AGENT_PROXY_SCAN_DIR")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
}

// Keeps the walk from descending into unrelated directories: only `ssh-*`
// directories at the first level, only `agent.*` entries inside them.
fn is_agent_candidate(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    match entry.depth() {
        0 => true,
        1 => entry.file_type().is_dir() && name.starts_with("ssh-"),
        _ => name.starts_with("agent."),
    }
}

/// List candidate sockets under `root`, newest first.
///
/// Entries that vanish or cannot be stat'ed mid-scan are skipped; only a
/// failure to read `root` itself is an error. An empty result is not an
/// error, it simply means no agent has forwarded into this machine yet.
pub fn discover_sockets_in(root: &Path) -> Result<Vec<SocketInfo>, ProxyError> {
    let uid = Uid::current().as_raw();
    let mut sockets = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(2)
        .into_iter()
        .filter_entry(is_agent_candidate)
    {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                if err.path() == Some(root) {
                    return Err(ProxyError::Discovery(err.into()));
                }
                continue;
            }
        };
        if entry.depth() != 2 {
            continue;
        }
        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(_) => continue,
        };
        if !meta.file_type().is_socket() {
            continue;
        }
        // Ownership is compared by numeric uid, never by user name, so a
        // look-alike account cannot plant a candidate.
        if meta.uid() != uid {
            continue;
        }
        let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        sockets.push(SocketInfo {
            path: entry.into_path(),
            mtime,
            valid: false,
        });
    }

    sockets.sort_by(|a, b| b.mtime.cmp(&a.mtime));
    Ok(sockets)
}

/// List candidate sockets under the default scan root.
pub fn discover_sockets() -> Result<Vec<SocketInfo>, ProxyError> {
    discover_sockets_in(&default_scan_root())
}

/// Validate `path` with a request-identities round trip.
///
/// True only when a complete 5-byte response header arrives within the
/// deadline and carries an identities-answer or failure tag; both mean a
/// live protocol speaker is listening. The response body is never read, so
/// an arbitrarily large identity list cannot stall the probe.
pub fn probe_socket(path: &Path) -> bool {
    let mut stream = match UnixStream::connect(path) {
        Ok(s) => s,
        Err(_) => return false,
    };
    if stream.write_all(&protocol::REQUEST_IDENTITIES_MSG).is_err() {
        return false;
    }
    let _ = stream.set_read_timeout(Some(PROBE_READ_TIMEOUT));

    let mut header = [0u8; protocol::RESPONSE_HEADER_LEN];
    match stream.read_exact(&mut header) {
        Ok(()) => matches!(
            header[4],
            protocol::SSH_AGENT_IDENTITIES_ANSWER | protocol::SSH_AGENT_FAILURE
        ),
        Err(_) => false,
    }
}

/// Return the newest candidate under `root` that answers a probe.
pub fn find_active_socket_in(root: &Path) -> Result<PathBuf, ProxyError> {
    let sockets = discover_sockets_in(root)?;
    for socket in &sockets {
        if probe_socket(&socket.path) {
            return Ok(socket.path.clone());
        }
        debug!("candidate {} did not answer probe", socket.path.display());
    }
    Err(ProxyError::NoAgent)
}

/// Return the newest live agent socket under the default scan root.
pub fn find_active_socket() -> Result<PathBuf, ProxyError> {
    find_active_socket_in(&default_scan_root())
}
