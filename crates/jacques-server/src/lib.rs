//! Client-facing surface of the core: REST on one fixed port, the
//! WebSocket feed on another, SSE for long-running archive operations.

pub mod api;
pub mod errors;
pub mod queries;
pub mod router;
pub mod state;

use jacques_types::{Error, Result};

pub use state::AppState;

pub const DEFAULT_REST_PORT: u16 = 4473;
pub const DEFAULT_WS_PORT: u16 = 4474;

/// Bind and serve both surfaces until the process is stopped.
///
/// Binding failures surface as `Conflict` so the binary can exit with the
/// dedicated port-in-use code.
pub async fn start_server(state: AppState, rest_port: u16, ws_port: u16) -> Result<()> {
    let rest_listener = bind(rest_port).await?;
    let ws_listener = bind(ws_port).await?;

    tracing::info!(rest_port, ws_port, "http surfaces listening");

    let rest_app = router::build_rest_router(state.clone());
    let ws_app = router::build_ws_router(state);

    tokio::select! {
        result = axum::serve(rest_listener, rest_app) => result.map_err(Error::Io)?,
        result = axum::serve(ws_listener, ws_app) => result.map_err(Error::Io)?,
    }
    Ok(())
}

async fn bind(port: u16) -> Result<tokio::net::TcpListener> {
    let addr = format!("127.0.0.1:{port}");
    tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::AddrInUse {
            Error::conflict(format!("port {port} is already in use"))
        } else {
            Error::Io(e)
        }
    })
}
