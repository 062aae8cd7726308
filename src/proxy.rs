/*!
Proxy engine: active-socket cache, accept loop and per-connection forwarding.

One `AgentProxy` owns the stable listening socket and the cached active
agent socket. The accept loop hands every client connection to its own
thread; connection threads share nothing but the cache, which sits behind a
single mutex so that lookups racing across a TTL boundary collapse into one
discovery rescan instead of several.
*/

use std::fs;
use std::io;
use std::io::Write;
use std::net::Shutdown;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::discovery;
use crate::errors::ProxyError;
use crate::protocol;

/// How long a confirmed agent socket is trusted before a lookup rescans.
/// Five seconds keeps staleness imperceptible for interactive use while
/// cutting filesystem scans to a tiny fraction of connection volume.
const CACHE_TTL: Duration = Duration::from_secs(5);

/// Pause between polls of the nonblocking listener.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
struct CacheState {
    active_socket: Option<PathBuf>,
    last_check: Option<Instant>,
}

/// SSH agent proxy serving one stable socket path.
///
/// Clones are shallow and share the cache, the shutdown flag and the stable
/// path, which is exactly what the per-connection threads need.
#[derive(Clone)]
pub struct AgentProxy {
    proxy_socket: PathBuf,
    scan_root: PathBuf,
    shutdown: Arc<AtomicBool>,
    state: Arc<Mutex<CacheState>>,
}

impl AgentProxy {
    pub fn new(proxy_socket: impl Into<PathBuf>) -> Self {
        AgentProxy {
            proxy_socket: proxy_socket.into(),
            scan_root: discovery::default_scan_root(),
            shutdown: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    /// Replace the discovery root, e.g. to point the proxy at a private
    /// directory tree in tests.
    pub fn with_scan_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scan_root = root.into();
        self
    }

    /// Flag that makes [`start`](Self::start) wind down after its current
    /// accept poll. Registered with the signal handlers by the CLI layer.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn proxy_socket(&self) -> &Path {
        &self.proxy_socket
    }

    /// Bind the stable socket and serve until the shutdown flag is set.
    ///
    /// A failed accept is logged and the loop keeps going; only the bind
    /// itself is fatal. A flag-triggered stop is a clean return and removes
    /// the socket file.
    pub fn start(&self) -> Result<(), ProxyError> {
        let listener = UnixListener::bind(&self.proxy_socket).map_err(|e| ProxyError::Bind {
            path: self.proxy_socket.clone(),
            source: e,
        })?;
        // The socket stands in for the real agent socket: owner-only.
        let _ = fs::set_permissions(&self.proxy_socket, fs::Permissions::from_mode(0o600));
        listener.set_nonblocking(true)?;
        info!("SSH agent proxy listening on {}", self.proxy_socket.display());

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            match listener.accept() {
                Ok((stream, _addr)) => {
                    let _ = stream.set_nonblocking(false);
                    let proxy = self.clone();
                    thread::spawn(move || proxy.handle_connection(stream));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    warn!("accept error: {e}");
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        let _ = fs::remove_file(&self.proxy_socket);
        info!("SSH agent proxy stopped");
        Ok(())
    }

    /// Return the active agent socket, rescanning when the cache is stale.
    ///
    /// A cache hit requires both a fresh confirmation timestamp and a
    /// successful revalidation probe of the cached path. The TTL check and
    /// the full rescan share the cache lock, so concurrent lookups provoke
    /// at most one discovery pass; the loser of the race reuses the state
    /// the winner just stored.
    pub fn find_active_socket_cached(&self) -> Option<PathBuf> {
        let mut state = self.state.lock().unwrap();

        if let (Some(path), Some(checked)) = (state.active_socket.as_ref(), state.last_check) {
            if checked.elapsed() < CACHE_TTL && discovery::probe_socket(path) {
                return Some(path.clone());
            }
        }

        match discovery::find_active_socket_in(&self.scan_root) {
            Ok(path) => {
                if state.active_socket.as_deref() != Some(path.as_path()) {
                    info!("active agent socket is now {}", path.display());
                }
                state.active_socket = Some(path.clone());
                state.last_check = Some(Instant::now());
                Some(path)
            }
            Err(e) => {
                match e {
                    ProxyError::NoAgent => debug!("no active agent socket found"),
                    other => warn!("failed to find active socket: {other}"),
                }
                // Both fields are cleared; a leftover timestamp would let a
                // later lookup treat a dead path as confirmed.
                state.active_socket = None;
                state.last_check = None;
                None
            }
        }
    }

    /// Forget the cached socket so the next lookup is forced to rescan.
    pub fn invalidate_cache(&self) {
        let mut state = self.state.lock().unwrap();
        state.active_socket = None;
        state.last_check = None;
    }

    /// Forward one client connection to the active agent socket.
    ///
    /// Two attempts at most: a dial failure invalidates the cache, and the
    /// second attempt gets whatever a fresh rescan turns up. When both
    /// attempts fail to locate or reach an agent, the client receives a
    /// best-effort failure message instead of a hang or a reset.
    pub fn handle_connection(&self, mut client: UnixStream) {
        for _attempt in 0..2 {
            let Some(active) = self.find_active_socket_cached() else {
                continue;
            };
            match UnixStream::connect(&active) {
                Ok(agent) => {
                    self.forward(client, agent);
                    return;
                }
                Err(e) => {
                    warn!(
                        "failed to connect to agent socket {}: {e}",
                        active.display()
                    );
                    self.invalidate_cache();
                }
            }
        }

        debug!("no agent reachable, sending failure response");
        let _ = client.write_all(&protocol::FAILURE_MSG);
        let _ = client.shutdown(Shutdown::Both);
    }

    /// Pump bytes both ways until either direction finishes, then close
    /// both transports so the other direction unwinds on its own.
    fn forward(&self, client: UnixStream, agent: UnixStream) {
        let handles = client.try_clone().and_then(|client_in| {
            let agent_out = agent.try_clone()?;
            let agent_in = agent.try_clone()?;
            let client_out = client.try_clone()?;
            Ok((client_in, agent_out, agent_in, client_out))
        });
        let (mut client_in, mut agent_out, mut agent_in, mut client_out) = match handles {
            Ok(h) => h,
            Err(e) => {
                warn!("failed to duplicate connection handles: {e}");
                return;
            }
        };

        let (done_tx, done_rx) = mpsc::channel::<io::Result<u64>>();
        let tx = done_tx.clone();
        thread::spawn(move || {
            let _ = tx.send(io::copy(&mut client_in, &mut agent_out));
        });
        thread::spawn(move || {
            let _ = done_tx.send(io::copy(&mut agent_in, &mut client_out));
        });

        // The first direction to finish ends the session. A clean EOF is
        // the normal case; an actual error suggests the agent died mid
        // stream, so the cached socket is dropped for the next connection.
        match done_rx.recv() {
            Ok(Err(e)) => {
                debug!("forwarding ended with error: {e}");
                self.invalidate_cache();
            }
            Ok(Ok(_)) | Err(_) => {}
        }

        let _ = client.shutdown(Shutdown::Both);
        let _ = agent.shutdown(Shutdown::Both);
    }
}
