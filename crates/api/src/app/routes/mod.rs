//! Route table of the gateway.

use std::sync::Arc;

use axum::http::Method;

use gatehouse_auth::permissions::capability;
use gatehouse_auth::{PermissionError, generate_bit};

use crate::app::services::AppServices;
use crate::dispatcher::{Dispatcher, handler_fn};
use crate::interceptor::{
    AuthenticationInterceptor, AuthorizationInterceptor, Interceptor, LoggingInterceptor,
};

pub mod auth;
pub mod ping;
pub mod system;

/// Register every gateway route on `dispatcher`.
pub fn register_routes(
    dispatcher: &mut Dispatcher,
    services: &Arc<AppServices>,
) -> Result<(), PermissionError> {
    let logging: Arc<dyn Interceptor> = Arc::new(LoggingInterceptor);
    let authn: Arc<dyn Interceptor> = Arc::new(AuthenticationInterceptor::new(
        services.verifier.clone(),
        services.clock.clone(),
    ));
    let authz = |indices: &[u8]| -> Result<Arc<dyn Interceptor>, PermissionError> {
        let required = generate_bit(indices.iter().copied())?;
        Ok(Arc::new(AuthorizationInterceptor::new(vec![required])))
    };

    let public = vec![logging.clone()];
    let authenticated = vec![logging.clone(), authn.clone()];

    let s = services.clone();
    dispatcher.register(
        "/auth/login",
        &[Method::POST],
        public.clone(),
        handler_fn(move |req| auth::login(s.clone(), req)),
    );
    let s = services.clone();
    dispatcher.register(
        "/auth/register",
        &[Method::POST],
        public.clone(),
        handler_fn(move |req| auth::register(s.clone(), req)),
    );
    let s = services.clone();
    dispatcher.register(
        "/auth/logout",
        &[Method::POST],
        authenticated.clone(),
        handler_fn(move |req| auth::logout(s.clone(), req)),
    );

    dispatcher.register("/api/ping", &[Method::GET], public, handler_fn(ping::ping));
    dispatcher.register(
        "/api/ping",
        &[Method::POST],
        authenticated.clone(),
        handler_fn(ping::ping),
    );
    dispatcher.register(
        "/api/ping",
        &[Method::PUT],
        vec![logging.clone(), authn.clone(), authz(&[capability::APP_PING])?],
        handler_fn(ping::ping),
    );
    dispatcher.register(
        "/api/whoami",
        &[Method::GET],
        vec![logging, authn, authz(&[capability::APP])?],
        handler_fn(ping::whoami),
    );

    Ok(())
}
