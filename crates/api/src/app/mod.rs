//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: key source, directories, token services, sweeper
//! - `routes/`: route table and handlers
//! - `dto.rs`: request/response bodies
//! - `errors.rs`: error kind to HTTP status mapping

use std::sync::Arc;

use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::response::Response;
use axum::{Router, routing::get};
use thiserror::Error;

use gatehouse_auth::{DirectoryError, PermissionError};
use gatehouse_core::{ErrorKind, GatewayError};

use crate::config::ApiConfig;
use crate::context::GatewayRequest;
use crate::dispatcher::{Dispatcher, cors_preflight};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Request bodies above this are rejected before reaching the dispatcher.
const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to seed user directory: {0}")]
    Directory(#[from] DirectoryError),

    #[error("invalid route permission: {0}")]
    Permission(#[from] PermissionError),
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(config: &ApiConfig) -> Result<(Router, Arc<services::AppServices>), BuildError> {
    let services = Arc::new(services::build_services(config)?);
    let router = build_router(config, services.clone())?;
    Ok((router, services))
}

pub fn build_router(
    config: &ApiConfig,
    services: Arc<services::AppServices>,
) -> Result<Router, BuildError> {
    let mut dispatcher = Dispatcher::new().with_timeout(config.request_timeout);
    routes::register_routes(&mut dispatcher, &services)?;

    Ok(Router::new()
        .route(
            "/health",
            get(routes::system::health).options(|| async { cors_preflight() }),
        )
        .fallback(dispatch_http)
        .with_state(Arc::new(dispatcher)))
}

/// Bridge from axum into the gateway dispatcher.
async fn dispatch_http(State(dispatcher): State<Arc<Dispatcher>>, req: Request) -> Response {
    let (parts, body) = req.into_parts();

    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let err = GatewayError::new(ErrorKind::InvalidInput, "request body too large or unreadable")
                .with_source(e);
            tracing::debug!(error = %err.chain(), "rejecting request body");
            return errors::error_response(&err);
        }
    };

    let request = GatewayRequest::new(parts.method, parts.uri.path(), parts.headers, body);
    dispatcher.dispatch(request).await
}
