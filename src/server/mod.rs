//! Bundled server: a minimal protected site wrapped by the gate.

use crate::{config::GateConfig, gate::Gate};
use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::get,
    Extension, Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, warn, Span};
use ulid::Ulid;

pub mod handlers;

/// Start the server: demo pages behind the gate, `/health` outside it.
///
/// # Errors
///
/// Returns an error if the gate refuses the configuration or the listener
/// cannot bind.
pub async fn new(port: u16, config: GateConfig) -> Result<()> {
    let gate = Gate::new(config)?;

    let protected = Router::new()
        .route("/", get(handlers::whoami))
        .route("/sign-out", get(handlers::sign_out));

    let app = Router::new()
        .merge(gate.wrap(protected))
        .route("/health", get(handlers::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(gate)),
        );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Gracefully shutdown"),
        Err(err) => {
            warn!("failed to install the shutdown handler: {err}");
            std::future::pending::<()>().await;
        }
    }
}
