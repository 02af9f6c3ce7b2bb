//! HTTP gateway: interceptor chains, dispatch and the bundled routes.

pub mod app;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod interceptor;
