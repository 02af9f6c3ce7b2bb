//! Route table and the single place where errors become HTTP responses.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};

use gatehouse_core::{ErrorKind, GatewayError};

use crate::app::errors::error_response;
use crate::context::GatewayRequest;
use crate::interceptor::{Interceptor, Next};

/// Terminal step of a chain.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, req: GatewayRequest) -> Result<Response, GatewayError>;
}

/// Adapter turning an async closure into a [`Handler`].
pub struct HandlerFn<F>(F);

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(GatewayRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, GatewayError>> + Send,
{
    async fn call(&self, req: GatewayRequest) -> Result<Response, GatewayError> {
        (self.0)(req).await
    }
}

pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(GatewayRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, GatewayError>> + Send + 'static,
{
    Arc::new(HandlerFn(f))
}

struct Route {
    interceptors: Vec<Arc<dyn Interceptor>>,
    handler: Arc<dyn Handler>,
}

/// Maps `(path, method)` to an interceptor chain plus handler.
///
/// Built once at startup and then shared read-only.
#[derive(Default)]
pub struct Dispatcher {
    routes: HashMap<String, HashMap<Method, Route>>,
    timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any chain that runs longer than `timeout` (`None` disables).
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register `handler` behind `interceptors` (run in order) for each method.
    /// A later registration for the same `(path, method)` replaces the earlier.
    pub fn register(
        &mut self,
        path: &str,
        methods: &[Method],
        interceptors: Vec<Arc<dyn Interceptor>>,
        handler: Arc<dyn Handler>,
    ) {
        let path = normalize_path(path);
        let by_method = self.routes.entry(path.clone()).or_default();

        for method in methods {
            let route = Route {
                interceptors: interceptors.clone(),
                handler: handler.clone(),
            };
            if by_method.insert(method.clone(), route).is_some() {
                tracing::debug!(path = %path, method = %method, "route replaced");
            }
        }
    }

    pub async fn dispatch(&self, mut req: GatewayRequest) -> Response {
        req.path = normalize_path(&req.path);

        let Some(by_method) = self.routes.get(&req.path) else {
            return unmatched(&req, None);
        };
        let Some(route) = by_method.get(&req.method) else {
            return unmatched(&req, Some(by_method));
        };

        let request_id = req.request_id;
        let chain = Next::new(&route.interceptors, route.handler.as_ref());

        // Dropping the chain future on timeout cancels everything downstream.
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, chain.run(req)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(GatewayError::new(
                    ErrorKind::Timeout,
                    format!("request exceeded {}ms", limit.as_millis()),
                )),
            },
            None => chain.run(req).await,
        };

        match outcome {
            Ok(response) => response,
            Err(err) => {
                if err.kind().is_server_error() {
                    tracing::error!(%request_id, kind = %err.kind(), error = %err.chain(), "request failed");
                } else {
                    tracing::debug!(%request_id, kind = %err.kind(), error = %err.chain(), "request rejected");
                }
                error_response(&err)
            }
        }
    }
}

fn unmatched(req: &GatewayRequest, known: Option<&HashMap<Method, Route>>) -> Response {
    if req.method == Method::OPTIONS {
        return cors_preflight();
    }

    match known {
        Some(by_method) => {
            let mut allowed: Vec<&str> = by_method.keys().map(Method::as_str).collect();
            allowed.sort_unstable();

            let mut response = error_response(&GatewayError::new(
                ErrorKind::MethodNotAllowed,
                "method not allowed",
            ));
            if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
                response.headers_mut().insert(header::ALLOW, value);
            }
            response
        }
        None => error_response(&GatewayError::new(ErrorKind::NotFound, "no such route")),
    }
}

/// Permissive answer to an `OPTIONS` request no handler claims.
pub(crate) fn cors_preflight() -> Response {
    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "*"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true"),
        ],
    )
        .into_response()
}

/// Trim, force a leading `/`, drop trailing `/` (the root stays `/`).
pub fn normalize_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
