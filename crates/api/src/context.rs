use axum::body::Bytes;
use axum::http::{HeaderMap, Method, header};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use gatehouse_auth::UserContext;
use gatehouse_core::{AuthFailure, GatewayError};

/// One inbound request as it travels through an interceptor chain.
///
/// Owned by exactly one pipeline; the authentication interceptor attaches the
/// caller's [`UserContext`] here for later interceptors and the handler.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub principal: Option<UserContext>,
    pub request_id: Uuid,
}

impl GatewayRequest {
    pub fn new(method: Method, path: impl Into<String>, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            path: path.into(),
            headers,
            body,
            principal: None,
            request_id: Uuid::now_v7(),
        }
    }

    pub fn has_authorization(&self) -> bool {
        self.headers.contains_key(header::AUTHORIZATION)
    }

    /// The token of an `Authorization: Bearer <token>` header.
    pub fn bearer_token(&self) -> Result<&str, GatewayError> {
        let invalid = || {
            GatewayError::unauthenticated(AuthFailure::InvalidHeader, "missing or malformed bearer token")
        };

        let value = self
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(invalid)?
            .to_str()
            .map_err(|_| invalid())?;

        let token = value.strip_prefix("Bearer ").ok_or_else(invalid)?.trim();
        if token.is_empty() {
            return Err(invalid());
        }
        Ok(token)
    }

    /// The attached principal; absent means the route is misconfigured.
    pub fn principal(&self) -> Result<&UserContext, GatewayError> {
        self.principal
            .as_ref()
            .ok_or_else(|| GatewayError::missing_principal("no authenticated principal on request"))
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, GatewayError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| GatewayError::invalid_input("malformed JSON body").with_source(e))
    }
}
