//! Router, handlers and server lifecycle

use crate::protocol::{AskRequest, AskResponse, BreakerHealth, ErrorBody, HealthResponse};
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use ragguard_core::{CircuitState, QueryError, QueryOrchestrator, RateLimiter};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

const UNKNOWN_CLIENT: &str = "unknown";
const INVALID_JSON: &str = "invalid_json";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<QueryOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<QueryOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ask_compliance", post(ask_compliance))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C, then drain the audit queue
pub async fn serve(
    orchestrator: Arc<QueryOrchestrator>,
    addr: SocketAddr,
    bucket_idle: Duration,
) -> anyhow::Result<()> {
    let eviction = spawn_bucket_eviction(orchestrator.rate_limiter().clone(), bucket_idle);
    let app = router(AppState::new(orchestrator.clone()));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        retriever = orchestrator.retriever_name(),
        model = orchestrator.model_name(),
        "listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    eviction.abort();
    orchestrator.audit().flush().await;
    tracing::info!(dropped_audit_records = orchestrator.audit().dropped(), "server stopped");
    Ok(())
}

/// Periodically drop rate-limit buckets idle for longer than `idle`
pub fn spawn_bucket_eviction(limiter: Arc<RateLimiter>, idle: Duration) -> JoinHandle<()> {
    let period = (idle / 2).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = limiter.evict_idle(idle);
            if evicted > 0 {
                tracing::debug!(
                    evicted,
                    tracked = limiter.tracked_clients(),
                    "evicted idle rate-limit buckets"
                );
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

/// Caller identity used for rate limiting: first `X-Forwarded-For` hop, then
/// the peer address, then `unknown`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        if let Some(client) = forwarded {
            return Ok(Self(client.to_string()));
        }

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Ok(Self(peer.unwrap_or_else(|| UNKNOWN_CLIENT.to_string())))
    }
}

enum ApiError {
    Query(QueryError),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody::new(INVALID_JSON, message)),
            )
                .into_response(),
            ApiError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::new("internal", message)),
            )
                .into_response(),
            ApiError::Query(err) => {
                let mut body = ErrorBody::new(err.kind(), err.to_string());
                match err {
                    QueryError::Validation(_) => (StatusCode::BAD_REQUEST, Json(body)).into_response(),
                    QueryError::RateLimited { retry_after } => {
                        let secs = retry_after.as_secs().max(1);
                        body.rate_limit_remaining = Some(0);
                        body.retry_after_seconds = Some(secs);
                        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
                        response
                            .headers_mut()
                            .insert(header::RETRY_AFTER, HeaderValue::from(secs));
                        response
                    }
                    QueryError::Retrieval(_) => {
                        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
                    }
                    QueryError::NoContext => (StatusCode::NOT_FOUND, Json(body)).into_response(),
                }
            }
        }
    }
}

async fn ask_compliance(
    State(state): State<AppState>,
    ClientId(client_id): ClientId,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let Json(request) = match payload {
        Ok(request) => request,
        Err(rejection) => {
            let detail = rejection.body_text();
            state.orchestrator.audit().record_rejected_request(
                Uuid::new_v4(),
                &client_id,
                None,
                INVALID_JSON,
                &detail,
            );
            return Err(ApiError::BadRequest(detail));
        }
    };

    // Own task so a disconnecting client cannot cancel the audit write
    let orchestrator = state.orchestrator.clone();
    let task = tokio::spawn(async move {
        orchestrator
            .ask(&client_id, &request.question)
            .await
    });

    let answer = task
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "orchestration task failed");
            ApiError::Internal("request processing failed".to_string())
        })?
        .map_err(ApiError::Query)?;

    Ok(Json(AskResponse::from_answer(
        answer,
        state.orchestrator.compliance_level(),
    )))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.orchestrator.circuit_breaker().snapshot();
    let status = match snapshot.state {
        CircuitState::Closed => "healthy",
        CircuitState::Open | CircuitState::HalfOpen => "degraded",
    };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        breaker: BreakerHealth::from(snapshot),
        retriever: state.orchestrator.retriever_name().to_string(),
        model: state.orchestrator.model_name().to_string(),
    })
}
