#![forbid(unsafe_code)]

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod seed;
pub mod state;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::signal::{self, ctrl_c};
use tracing::info;

pub use routes::build_router;
pub use state::AppState;

/// Bind `address` and serve the API until Ctrl+C or SIGTERM.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(state: AppState, address: SocketAddr) -> std::io::Result<()> {
    let app = build_router(state);
    let listener = TcpListener::bind(address).await?;
    info!(%address, "server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
