use std::fs;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use log::warn;
use signal_hook::consts::{SIGINT, SIGTERM};

use ssh_agent_proxy::{
    discover_sockets, exit_code_for_proxy_error, find_active_socket, health_check, init_logging,
    probe_socket, AgentProxy, ProxyError,
};

#[derive(Parser, Debug)]
#[command(
    name = "ssh-agent-proxy",
    version,
    about = "Serve a stable SSH agent socket that follows the newest live agent socket."
)]
struct Cli {
    /// Path of the stable proxy socket to listen on (a leading ~/ is expanded)
    #[arg(required_unless_present = "test_discovery")]
    socket_path: Option<PathBuf>,

    /// Print detailed execution info
    #[arg(long)]
    verbose: bool,

    /// Detach from the terminal and run in the background
    #[arg(long)]
    daemon: bool,

    /// List candidate agent sockets with their validity and exit
    #[arg(long)]
    test_discovery: bool,

    /// Probe the proxy socket end to end and exit
    #[arg(long)]
    health_check: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("ssh-agent-proxy: failed to initialize logging: {e}");
        return ExitCode::from(1);
    }

    if cli.test_discovery {
        return run_test_discovery();
    }

    let socket_path = match cli.socket_path.as_deref().map(expand_tilde) {
        Some(p) => p,
        None => {
            // Unreachable through clap, kept as a guard for direct callers.
            eprintln!("ssh-agent-proxy: missing proxy socket path");
            return ExitCode::from(1);
        }
    };

    if cli.health_check {
        return run_health_check(&socket_path);
    }

    match run_proxy(&socket_path, cli.daemon) {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            eprintln!("ssh-agent-proxy: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = home::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

fn run_test_discovery() -> ExitCode {
    println!("Testing SSH agent socket discovery...");
    println!();

    let mut sockets = match discover_sockets() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("ssh-agent-proxy: discovery failed: {e}");
            return ExitCode::from(1);
        }
    };

    if sockets.is_empty() {
        println!("No SSH agent sockets found");
        return ExitCode::from(0);
    }

    for socket in &mut sockets {
        socket.valid = probe_socket(&socket.path);
    }

    println!("Found {} socket(s):", sockets.len());
    for socket in &sockets {
        let status = if socket.valid { "VALID" } else { "STALE" };
        println!("  {} [{}]", socket.path.display(), status);
        if let Ok(age) = socket.mtime.elapsed() {
            println!("    Modified: {}s ago", age.as_secs());
        }
    }

    println!();
    match find_active_socket() {
        Ok(path) => println!("Active socket: {}", path.display()),
        Err(e) => println!("No active socket found: {e}"),
    }
    ExitCode::from(0)
}

fn run_health_check(socket_path: &Path) -> ExitCode {
    match health_check(socket_path) {
        Ok(()) => {
            println!("proxy is healthy");
            ExitCode::from(0)
        }
        Err(e @ ProxyError::NoAgent) => {
            eprintln!("ssh-agent-proxy: proxy is running but no active SSH agent found");
            ExitCode::from(exit_code_for_proxy_error(&e))
        }
        Err(e) => {
            eprintln!("ssh-agent-proxy: health check failed: {e}");
            ExitCode::from(exit_code_for_proxy_error(&e))
        }
    }
}

fn run_proxy(socket_path: &Path, daemonize: bool) -> anyhow::Result<()> {
    if let Some(dir) = socket_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(dir)
            .with_context(|| format!("failed to create socket directory {}", dir.display()))?;
    }

    // A previous run may have left its socket behind.
    if let Err(e) = fs::remove_file(socket_path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("failed to remove existing socket: {e}");
        }
    }

    if daemonize {
        // Stdio ends up on /dev/null from here on; log output goes with it,
        // as expected of a detached process.
        nix::unistd::daemon(false, false).context("failed to daemonize")?;
    }

    let proxy = AgentProxy::new(socket_path);
    let shutdown = proxy.shutdown_flag();
    for sig in [SIGINT, SIGTERM] {
        signal_hook::flag::register(sig, shutdown.clone())
            .context("failed to register signal handler")?;
    }

    proxy.start()?;
    Ok(())
}
