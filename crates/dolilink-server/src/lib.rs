//! Dolilink Server - admin HTTP API.
//!
//! This crate provides the HTTP surface the admin panel and the in-page
//! collaborator talk to.
//!
//! ## Endpoints
//!
//! - `GET /api/settings` - Get the rule set (content-script rule source)
//! - `POST /api/settings` - Save the rule set (admin rule sink)
//! - `GET /api/status` - Engine status with patched-link details
//! - `POST /api/links/{index}/unpatch` - Unpatch one link
//! - `POST /api/links/clear` - Unpatch every link
//! - `POST /api/rules/test` - Dry-run the rules with transient highlights
//!
//! ## Example
//!
//! ```no_run
//! use dolilink_server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = Server::new(ServerConfig::default()).unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod error;
mod handlers;
pub mod models;
pub mod settings;
pub mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use axum::routing::{get, post};
use axum::Router;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use dolilink_core::engine::LinkEngine;
use dolilink_core::page::PageDocument;

pub use error::{ApiError, Result};
pub use settings::{SettingsStore, StoredSettings};
pub use state::AppState;

/// Default server port.
pub const DEFAULT_PORT: u16 = 48790;

/// Default server host (localhost only for security).
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1).
    pub host: String,
    /// Port to bind to.
    pub port: u16,
    /// Settings file path (None = in-memory only).
    pub settings_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            settings_path: None,
        }
    }
}

impl ServerConfig {
    /// Creates a config for in-memory testing.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Creates a config with a specific settings file path.
    pub fn with_settings_path(path: impl Into<PathBuf>) -> Self {
        Self {
            settings_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    BindError(SocketAddr, std::io::Error),

    /// Server runtime error.
    #[error("server error: {0}")]
    Runtime(String),
}

/// The admin HTTP API server.
pub struct Server {
    router: Router,
    addr: SocketAddr,
}

impl Server {
    /// Creates a server over a fresh empty document.
    pub fn new(config: ServerConfig) -> std::result::Result<Self, ServerError> {
        let settings = match config.settings_path {
            Some(ref path) => SettingsStore::load_or_default(path),
            None => SettingsStore::in_memory(),
        };
        let engine = LinkEngine::new(Arc::new(RwLock::new(PageDocument::new())));
        let state = AppState::new(engine, settings);
        Self::with_state(config, state)
    }

    /// Creates a server with custom application state.
    pub fn with_state(
        config: ServerConfig,
        state: AppState,
    ) -> std::result::Result<Self, ServerError> {
        // CORS open for the in-page collaborator.
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let router = Self::routes()
            .layer(cors)
            .with_state(state);

        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| ServerError::Runtime(format!("invalid address: {}", e)))?;

        Ok(Self { router, addr })
    }

    fn routes() -> Router<AppState> {
        Router::new()
            .route("/api/settings", get(handlers::get_settings))
            .route("/api/settings", post(handlers::save_settings))
            .route("/api/status", get(handlers::get_status))
            .route("/api/links/{index}/unpatch", post(handlers::unpatch_link))
            .route("/api/links/clear", post(handlers::clear_links))
            .route("/api/rules/test", post(handlers::test_rules))
    }

    /// Returns the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs the server until shutdown.
    pub async fn run(self) -> std::result::Result<(), ServerError> {
        info!("Starting Dolilink API server on {}", self.addr);

        // Create socket with SO_REUSEADDR to allow binding even when
        // sockets are lingering.
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        socket
            .set_reuse_address(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        socket
            .bind(&self.addr.into())
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .listen(128)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        // Set non-blocking for tokio.
        socket
            .set_nonblocking(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = tokio::net::TcpListener::from_std(std_listener)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        axum::serve(listener, self.router)
            .await
            .map_err(|e| ServerError::Runtime(e.to_string()))?;

        Ok(())
    }

    /// Returns the router for testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}
