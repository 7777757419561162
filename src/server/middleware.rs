//! Request decorators applied to every listener
//!
//! Order (outermost first): access log, then panic recovery, then the route table.
//! Recovery sits inside the access log so a panicking handler is still logged,
//! at error level, with the 500 it was turned into.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use futures::FutureExt;
use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{debug, error};

/// Marks a response whose handler failed; the access log reports it at error level
#[derive(Debug, Clone)]
pub struct HandlerError(pub String);

impl HandlerError {
    /// Build a response carrying this marker
    pub fn into_response_with(self, status: StatusCode) -> Response {
        let mut response = status.into_response();
        response.extensions_mut().insert(self);
        response
    }
}

#[derive(Clone, Copy)]
struct Component(&'static str);

/// Wrap a route table with the standard decorator chain
pub fn decorate(router: Router, component: &'static str) -> Router {
    // Layers wrap bottom-up: the last one added runs first
    router
        .layer(middleware::from_fn(recover))
        .layer(middleware::from_fn_with_state(
            Component(component),
            access_log,
        ))
}

async fn access_log(State(component): State<Component>, req: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let query = req.uri().query().unwrap_or_default().to_owned();
    let remote = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default();

    let response = next.run(req).await;

    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    let status = response.status().as_u16();

    match response.extensions().get::<HandlerError>() {
        Some(HandlerError(message)) => error!(
            component = component.0,
            %method,
            %path,
            %query,
            %remote,
            status,
            latency_ms,
            error = %message,
            "Request failed"
        ),
        None => debug!(
            component = component.0,
            %method,
            %path,
            %query,
            %remote,
            status,
            latency_ms,
            "Request served"
        ),
    }

    response
}

async fn recover(req: Request, next: Next) -> Response {
    match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => HandlerError(format!("handler panicked: {}", panic_message(&*panic)))
            .into_response_with(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
