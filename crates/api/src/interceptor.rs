//! Ordered request interceptors.
//!
//! Each interceptor either short-circuits with an error or hands the request
//! to [`Next::run`]. The last link calls the route handler.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::response::Response;
use tracing::Instrument;

use gatehouse_auth::{ClaimVerifier, PermissionBit, has_authority};
use gatehouse_core::{Clock, GatewayError};

use crate::context::GatewayRequest;
use crate::dispatcher::Handler;

#[async_trait]
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn intercept(&self, req: GatewayRequest, next: Next<'_>) -> Result<Response, GatewayError>;
}

/// The remainder of a chain.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Interceptor>],
    handler: &'a dyn Handler,
}

impl<'a> Next<'a> {
    pub fn new(chain: &'a [Arc<dyn Interceptor>], handler: &'a dyn Handler) -> Self {
        Self { chain, handler }
    }

    pub async fn run(self, req: GatewayRequest) -> Result<Response, GatewayError> {
        match self.chain.split_first() {
            Some((head, rest)) => {
                let next = Next {
                    chain: rest,
                    handler: self.handler,
                };
                head.intercept(req, next).await
            }
            None => self.handler.call(req).await,
        }
    }
}

/// Always passes. Opens a span per request and logs the outcome.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingInterceptor;

#[async_trait]
impl Interceptor for LoggingInterceptor {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn intercept(&self, req: GatewayRequest, next: Next<'_>) -> Result<Response, GatewayError> {
        let span = tracing::info_span!(
            "request",
            request_id = %req.request_id,
            method = %req.method,
            path = %req.path,
        );

        async move {
            // Presence only; the token itself never reaches the log.
            tracing::info!(has_authorization = req.has_authorization(), "request received");

            let started = Instant::now();
            let outcome = next.run(req).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match &outcome {
                Ok(response) => {
                    tracing::info!(status = response.status().as_u16(), elapsed_ms, "request completed")
                }
                Err(err) => tracing::info!(kind = %err.kind(), elapsed_ms, "request failed"),
            }
            outcome
        }
        .instrument(span)
        .await
    }
}

/// Requires a valid, unrevoked bearer token and attaches its `UserContext`.
pub struct AuthenticationInterceptor {
    verifier: Arc<ClaimVerifier>,
    clock: Arc<dyn Clock>,
}

impl AuthenticationInterceptor {
    pub fn new(verifier: Arc<ClaimVerifier>, clock: Arc<dyn Clock>) -> Self {
        Self { verifier, clock }
    }
}

#[async_trait]
impl Interceptor for AuthenticationInterceptor {
    fn name(&self) -> &'static str {
        "authentication"
    }

    async fn intercept(&self, mut req: GatewayRequest, next: Next<'_>) -> Result<Response, GatewayError> {
        let token = req.bearer_token()?;

        let claim = match self.verifier.verify(token, self.clock.now()).await {
            Ok(claim) => claim,
            Err(err) => {
                let err = GatewayError::from(err);
                match err.auth_failure() {
                    Some(failure) if failure.is_benign() => {
                        tracing::info!(failure = %failure, "token rejected")
                    }
                    _ => tracing::error!(error = %err.chain(), "token verification failed"),
                }
                return Err(err);
            }
        };

        tracing::debug!(user_id = %claim.user.user_id, "authenticated");
        req.principal = Some(claim.user);
        next.run(req).await
    }
}

/// Admits the principal if its mask covers at least one of `required`.
#[derive(Debug, Clone)]
pub struct AuthorizationInterceptor {
    required: Vec<PermissionBit>,
}

impl AuthorizationInterceptor {
    pub fn new(required: Vec<PermissionBit>) -> Self {
        Self { required }
    }
}

#[async_trait]
impl Interceptor for AuthorizationInterceptor {
    fn name(&self) -> &'static str {
        "authorization"
    }

    async fn intercept(&self, req: GatewayRequest, next: Next<'_>) -> Result<Response, GatewayError> {
        let principal = req.principal()?;

        if !has_authority(principal.permission_bit, &self.required) {
            tracing::info!(
                user_id = %principal.user_id,
                held = %principal.permission_bit,
                "permission denied"
            );
            return Err(GatewayError::forbidden("insufficient permission"));
        }
        next.run(req).await
    }
}
