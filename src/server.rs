//! Server / activation shell
//!
//! Binds a loopback listener and serves the API router. When launched
//! under systemd socket activation the inherited socket is adopted
//! instead, so the unit can stay stopped between requests. The RPC
//! surface is never bound to a non-loopback address.

use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::api;
use crate::state::AppState;

/// Serve until SIGINT/SIGTERM.
pub async fn run(state: Arc<AppState>) -> std::io::Result<()> {
    let listener = match inherited_listener()? {
        Some(listener) => {
            info!("Adopted socket-activated listener");
            listener
        }
        None => {
            let addr = (Ipv4Addr::LOCALHOST, state.config.port);
            let listener = TcpListener::bind(addr).await?;
            info!(addr = %listener.local_addr()?, "Listening");
            listener
        }
    };

    let app = api::router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

/// systemd socket activation: the supervisor passes the listening socket
/// as fd 3 and announces it via LISTEN_FDS/LISTEN_PID.
#[cfg(unix)]
fn inherited_listener() -> std::io::Result<Option<TcpListener>> {
    use std::os::unix::io::FromRawFd;

    const SD_LISTEN_FDS_START: i32 = 3;

    let fds: u32 = match std::env::var("LISTEN_FDS").ok().and_then(|v| v.parse().ok()) {
        Some(n) => n,
        None => return Ok(None),
    };
    let for_us = std::env::var("LISTEN_PID")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .map_or(true, |pid| pid == std::process::id());
    if fds == 0 || !for_us {
        return Ok(None);
    }

    // The fd is owned by us once adopted; only the first socket is used.
    let std_listener = unsafe { std::net::TcpListener::from_raw_fd(SD_LISTEN_FDS_START) };
    std_listener.set_nonblocking(true)?;
    TcpListener::from_std(std_listener).map(Some)
}

#[cfg(not(unix))]
fn inherited_listener() -> std::io::Result<Option<TcpListener>> {
    Ok(None)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
