//! Request logging and metrics middleware.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;

pub async fn logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();
    tracing::info!(%method, path, "request start");

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    tracing::info!(
        %method,
        path,
        status = response.status().as_u16(),
        duration,
        "request end"
    );
    response
}

pub async fn request_metrics(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    crate::metrics::http_in_flight(1);
    let response = next.run(request).await;
    crate::metrics::http_in_flight(-1);

    crate::metrics::http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}
