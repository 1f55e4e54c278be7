//! HTTP surface of the relay.
//!
//! # Endpoints
//!
//! - `GET /health` - 200 with a JSON [`HealthReport`] while the process is up

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::router::EventRouter;

pub mod health;

pub use health::{HealthReport, health_handler};

/// Shared application state, handed to handlers via axum's `State`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    started_at: DateTime<Utc>,
    router: Arc<EventRouter>,
}

impl AppState {
    pub fn new(router: Arc<EventRouter>) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                started_at: Utc::now(),
                router,
            }),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    pub fn router(&self) -> &EventRouter {
        &self.inner.router
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::get;

    axum::Router::new()
        .route("/health", get(health_handler))
        .with_state(app_state)
}

/// Serves [`build_router`] on `addr` until `shutdown` fires.
pub async fn serve(
    addr: SocketAddr,
    app_state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Health endpoint listening");

    axum::serve(listener, build_router(app_state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::router::RouterBuilder;

    fn empty_state() -> AppState {
        AppState::new(Arc::new(RouterBuilder::new().build()))
    }

    #[tokio::test]
    async fn health_route_returns_json() {
        let app = build_router(empty_state());

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let report: HealthReport = serde_json::from_slice(&body).unwrap();
        assert_eq!(report.status, "ok");
        assert_eq!(report.handlers, 0);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let app = build_router(empty_state());

        let request = Request::builder()
            .uri("/webhook")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown() {
        let shutdown = CancellationToken::new();
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();

        let handle = tokio::spawn(serve(addr, empty_state(), shutdown.clone()));
        shutdown.cancel();

        handle.await.unwrap().unwrap();
    }
}
