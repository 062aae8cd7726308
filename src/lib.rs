/*!
ssh-agent-proxy: a stable rendezvous socket for SSH agent clients.

Long-lived tmux sessions inherit `SSH_AUTH_SOCK` once and keep it forever,
while every new login drops the real agent socket somewhere else under
`/tmp`. This crate serves a fixed Unix socket and forwards each accepted
connection to whichever real agent socket currently answers, so the
environment variable never has to change.

The crate root re-exports the operations the CLI layer consumes; the binary
in `main.rs` is a thin argument-parsing shell around them.
*/

pub mod discovery;
pub mod errors;
pub mod health;
pub mod protocol;
pub mod proxy;
pub mod sanitizer;

pub use discovery::{
    discover_sockets, discover_sockets_in, find_active_socket, find_active_socket_in,
    probe_socket, SocketInfo,
};
pub use errors::{exit_code_for_proxy_error, ProxyError};
pub use health::{health_check, is_healthy};
pub use proxy::AgentProxy;
pub use sanitizer::{init_logging, sanitize_string, SanitizingLogger};
