//! HTTP and WebSocket surface
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             LoglineServer                │
//! │                                          │
//! │  GET  /ws       ──► SessionHub           │
//! │  GET  /health   ──► connection count     │
//! │  POST /execute  ──► ExecutionGateway     │
//! │  GET  /metrics  ──► Prometheus text      │
//! │                                          │
//! │  SessionHub ◄──► FanoutBridge (Redis)    │
//! └──────────────────────────────────────────┘
//! ```

pub mod api;
pub mod ws;

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{Config, ConfigError};
use crate::execution::ExecutionGateway;
use crate::fanout::{FanoutBridge, LocalFanout, RedisFanout};
use crate::session::SessionHub;

use api::create_router;

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Session coordinator for this process
    pub hub: Arc<SessionHub>,

    /// Code execution side channel
    pub gateway: Arc<ExecutionGateway>,

    /// Server start time
    pub start_time: Instant,
}

// ============================================================================
// Server
// ============================================================================

pub struct LoglineServer {
    config: Config,
    state: AppState,
}

impl LoglineServer {
    /// Create a server on top of an already connected fanout bridge
    pub fn new(config: Config, fanout: Arc<dyn FanoutBridge>) -> Result<Self, ServerError> {
        config.validate()?;

        let state = AppState {
            hub: Arc::new(SessionHub::with_outbox_capacity(
                fanout,
                config.server.outbox_capacity,
            )),
            gateway: Arc::new(ExecutionGateway::new(config.execution.clone())),
            start_time: Instant::now(),
        };

        Ok(Self { config, state })
    }

    /// Create a server fanning out through Redis
    ///
    /// If Redis cannot be reached the server still starts, with an
    /// in-process topic: edits apply locally but never reach other processes.
    pub async fn connect(config: Config) -> Result<Self, ServerError> {
        let fanout: Arc<dyn FanoutBridge> = match RedisFanout::try_connect(&config.redis).await {
            Some(redis) => Arc::new(redis),
            None => Arc::new(LocalFanout::new()),
        };
        Self::new(config, fanout)
    }

    /// Get the application state
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Build the router with all routes and configured layers
    pub fn build_router(&self) -> Router {
        let mut router = create_router(self.state.clone());

        if self.config.server.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        if self.config.server.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Serve until `shutdown_signal` resolves
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let addr = self.config.bind_address()?;
        let router = self.build_router();

        let listener = match self.state.hub.spawn_fanout_listener().await {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "Fanout subscription failed, running in single-process mode"
                );
                None
            }
        };

        let tcp = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(format!("{addr}: {e}")))?;

        tracing::info!(
            addr = %addr,
            transport = self.state.hub.transport(),
            "LogLine server running"
        );

        let result = axum::serve(tcp, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::Serve(e.to_string()));

        if let Some(handle) = listener {
            handle.abort();
        }

        tracing::info!(
            uptime_secs = self.state.start_time.elapsed().as_secs(),
            "Server closed"
        );
        result
    }

    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            host: self.config.server.host.clone(),
            port: self.config.server.port,
            channel: self.config.redis.channel.clone(),
            transport: self.state.hub.transport(),
            cors_enabled: self.config.server.enable_cors,
        }
    }
}

/// Startup summary printed by the binary
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub host: String,
    pub port: u16,
    pub channel: String,
    pub transport: &'static str,
    pub cors_enabled: bool,
}

impl ServerInfo {
    pub fn display(&self) -> String {
        format!(
            "LogLine Server\n\
             {:-<40}\n\
             Listen: {}:{}\n\
             Fanout: {} ({})\n\
             CORS: {}",
            "",
            self.host,
            self.port,
            self.transport,
            self.channel,
            if self.cors_enabled { "enabled" } else { "disabled" }
        )
    }
}

// ============================================================================
// Server Errors
// ============================================================================

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to bind: {0}")]
    Bind(String),

    #[error("Server error: {0}")]
    Serve(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_server(config: Config) -> Result<LoglineServer, ServerError> {
        LoglineServer::new(config, Arc::new(LocalFanout::new()))
    }

    #[test]
    fn test_server_creation() {
        assert!(local_server(Config::default()).is_ok());
    }

    #[test]
    fn test_server_rejects_invalid_config() {
        let mut config = Config::default();
        config.redis.channel = String::new();
        assert!(matches!(local_server(config), Err(ServerError::Config(_))));
    }

    #[test]
    fn test_server_info() {
        let server = local_server(Config::default()).unwrap();
        let info = server.info();
        assert_eq!(info.port, 3001);
        assert_eq!(info.transport, "local");
        assert!(info.display().contains("document-updates"));
    }

    #[tokio::test]
    async fn test_fresh_state() {
        let server = local_server(Config::default()).unwrap();
        let state = server.state();
        assert_eq!(state.hub.connection_count().await, 0);
        assert_eq!(state.hub.document().await, "");
    }
}
