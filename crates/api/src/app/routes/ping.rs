use axum::Json;
use axum::response::{IntoResponse, Response};

use gatehouse_core::GatewayError;

use crate::context::GatewayRequest;

pub async fn ping(_req: GatewayRequest) -> Result<Response, GatewayError> {
    Ok("pong".into_response())
}

/// The caller's identity as carried by their token.
pub async fn whoami(req: GatewayRequest) -> Result<Response, GatewayError> {
    let principal = req.principal()?;
    Ok(Json(principal.clone()).into_response())
}
