//! Shared fixtures: a mock SSH agent and a proxy runner.

use std::io::Write;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use ssh_agent_proxy::{protocol, AgentProxy};

/// Spawn a mock agent listening on `path`.
///
/// Answers request-identities with an empty identity list, key management
/// requests with success and anything else with failure, one connection
/// per thread, until the test process exits.
#[allow(dead_code)]
pub fn spawn_mock_agent(path: &Path) -> PathBuf {
    let listener = UnixListener::bind(path).expect("bind mock agent socket");
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { return };
            thread::spawn(move || serve_agent_connection(stream));
        }
    });
    path.to_path_buf()
}

fn serve_agent_connection(mut stream: UnixStream) {
    loop {
        let payload = match protocol::read_message(&mut stream) {
            Ok(p) => p,
            Err(_) => return,
        };
        let reply = match payload.first() {
            Some(&protocol::SSH_AGENTC_REQUEST_IDENTITIES) => protocol::encode_message(
                protocol::SSH_AGENT_IDENTITIES_ANSWER,
                &0u32.to_be_bytes(),
            ),
            Some(&protocol::SSH_AGENTC_ADD_IDENTITY)
            | Some(&protocol::SSH_AGENTC_REMOVE_IDENTITY)
            | Some(&protocol::SSH_AGENTC_REMOVE_ALL_IDENTITIES) => {
                protocol::encode_message(protocol::SSH_AGENT_SUCCESS, &[])
            }
            _ => protocol::FAILURE_MSG.to_vec(),
        };
        if stream.write_all(&reply).is_err() {
            return;
        }
    }
}

/// Spawn a mock agent under `scan_root` following the `ssh-*/agent.*`
/// naming convention so discovery can find it.
#[allow(dead_code)]
pub fn spawn_discoverable_agent(scan_root: &Path, session: &str) -> PathBuf {
    let dir = scan_root.join(format!("ssh-{session}"));
    std::fs::create_dir_all(&dir).expect("create agent dir");
    spawn_mock_agent(&dir.join("agent.1"))
}

/// Start a proxy over `scan_root` on `socket_path` and wait until it
/// accepts connections.
#[allow(dead_code)]
pub fn start_proxy(scan_root: &Path, socket_path: &Path) -> AgentProxy {
    let proxy = AgentProxy::new(socket_path).with_scan_root(scan_root);
    let runner = proxy.clone();
    thread::spawn(move || {
        let _ = runner.start();
    });
    wait_for_socket(socket_path);
    proxy
}

/// Poll until `path` accepts a connection.
#[allow(dead_code)]
pub fn wait_for_socket(path: &Path) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if UnixStream::connect(path).is_ok() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("proxy socket {} did not come up", path.display());
}
