//! RagGuard HTTP Server
//!
//! Exposes the query orchestrator as `POST /ask_compliance` and reports
//! breaker state on `GET /health`.

mod protocol;
mod server;

pub use protocol::{AskRequest, AskResponse, BreakerHealth, ErrorBody, HealthResponse, ResponseMetadata};
pub use server::{router, serve, spawn_bucket_eviction, AppState, ClientId};
