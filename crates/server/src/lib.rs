//! Echo analyzer server
//!
//! HTTP front of the analyzer stage. The queue pushes `{doc_id}` messages to
//! `POST /analyze`; the response status tells it whether to acknowledge.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     server::start_server(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # API Endpoints
//!
//! - `POST /analyze` - Push endpoint: `200` acknowledges, `503` asks for redelivery
//! - `GET /` - Service info
//! - `GET /healthz`, `GET /health` - Liveness probes
//! - `GET /ready` - Readiness probe (cluster store reachable)
//! - `GET /metrics` - Prometheus metrics
//! - `GET /api/v1/topics` - Topics with update counts
//! - `GET /api/v1/stats` - Document, analysis and topic totals
//! - `GET /api/v1/analyses/{doc_id}` - Stored analysis result
//! - `PUT /api/v1/documents/{doc_id}` - Store a document

pub mod config;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{build_router, start_server};
pub use state::ServerState;
