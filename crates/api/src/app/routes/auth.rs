use std::sync::Arc;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use gatehouse_auth::UserRecord;
use gatehouse_core::{Clock, GatewayError, UserId};

use crate::app::dto::{LoginRequest, RegisterRequest, TokenResponse};
use crate::app::services::AppServices;
use crate::context::GatewayRequest;

pub async fn login(services: Arc<AppServices>, req: GatewayRequest) -> Result<Response, GatewayError> {
    let body: LoginRequest = req.json()?;
    let user_id = UserId::parse(&body.user_id)?;

    let issued = services
        .authenticator
        .login(&user_id, &body.password, services.clock.now())
        .await?;
    Ok(Json(TokenResponse::from(issued)).into_response())
}

pub async fn register(services: Arc<AppServices>, req: GatewayRequest) -> Result<Response, GatewayError> {
    let body: RegisterRequest = req.json()?;
    let record = UserRecord::new(UserId::parse(&body.user_id)?, body.name);

    let issued = services
        .authenticator
        .register(record, &body.password, services.clock.now())
        .await?;
    Ok((StatusCode::CREATED, Json(TokenResponse::from(issued))).into_response())
}

/// Revoke the presented token for the rest of its lifetime.
pub async fn logout(services: Arc<AppServices>, req: GatewayRequest) -> Result<Response, GatewayError> {
    let token = req.bearer_token()?;
    services.verifier.block(token, services.clock.now()).await?;

    if let Some(principal) = &req.principal {
        tracing::info!(user_id = %principal.user_id, "logged out");
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}
