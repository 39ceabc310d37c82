//! logline - real-time shared text buffer server
//!
//! Many clients edit one shared document over WebSockets and see each
//! other's cursors and presence. Several server processes can run side by
//! side; document edits are fanned out between them through a Redis pub/sub
//! channel.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`session`] - identity allocation, presence, the document store and the session hub
//! - [`fanout`] - cross-process publish/subscribe of document updates
//! - [`protocol`] - WebSocket wire events
//! - [`execution`] - the code execution side channel
//! - [`server`] - axum routes, WebSocket transport and server lifecycle
//! - [`config`] - configuration management
//! - [`metrics`] - Prometheus metrics
//! - [`error`] - unified error types
//!
//! The document uses last-write-wins full replacement. Concurrent edits from
//! different clients can overwrite each other.
//!
//! # Example
//!
//! ```no_run
//! use logline::config::Config;
//! use logline::server::LoglineServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let server = LoglineServer::connect(config).await?;
//!     server.start_with_shutdown(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     }).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod fanout;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod session;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, LoglineErrorTrait, Result};
    pub use crate::fanout::{DocumentUpdate, FanoutBridge, LocalFanout, RedisFanout};
    pub use crate::protocol::{ClientEvent, ServerEvent};
    pub use crate::server::LoglineServer;
    pub use crate::session::{Connection, SessionHub};
}
