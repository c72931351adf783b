//! Keepalive HTTP server so the hosting platform sees the process as alive.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{ConnectInfo, Request, State},
    http::header::USER_AGENT,
    response::{IntoResponse, Json},
    routing::get,
};
use chrono::Utc;
use courtside_sync::HeartbeatReader;
use serde_json::json;
use tokio::sync::watch;
use tracing::info;

struct KeepaliveState {
    heartbeat: HeartbeatReader,
    stale_after: Duration,
}

/// Routes: `/` and `/keepalive` always answer 200, `/health` reports staleness.
pub fn router(heartbeat: HeartbeatReader, stale_after: Duration) -> Router {
    let state = Arc::new(KeepaliveState {
        heartbeat,
        stale_after,
    });

    Router::new()
        .route("/", get(alive))
        .route("/keepalive", get(keepalive))
        .route("/health", get(health))
        .with_state(state)
}

async fn alive() -> &'static str {
    "Bot is alive!"
}

async fn keepalive(request: Request) -> &'static str {
    let caller = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let user_agent = request
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    info!(%caller, %user_agent, "keepalive ping");
    "Bot is alive!"
}

async fn health(State(state): State<Arc<KeepaliveState>>) -> impl IntoResponse {
    let last = state.heartbeat.last();
    let status = state.heartbeat.status(Utc::now(), state.stale_after);

    Json(json!({
        "status": status,
        "last_successful_update": last.to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Serve until shutdown.
pub async fn serve(
    port: u16,
    heartbeat: HeartbeatReader,
    stale_after: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!(port, "keepalive server listening");

    axum::serve(
        listener,
        router(heartbeat, stale_after).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        while shutdown_rx.changed().await.is_ok() {
            if *shutdown_rx.borrow() {
                break;
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use chrono::TimeZone;
    use tower::ServiceExt;

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or_default())
    }

    #[tokio::test]
    async fn test_keepalive_routes_answer_ok() {
        let (_writer, reader) = courtside_sync::heartbeat(Utc::now());

        for uri in ["/", "/keepalive"] {
            let response = router(reader.clone(), Duration::from_secs(300))
                .oneshot(
                    Request::builder()
                        .uri(uri)
                        .header("User-Agent", "UptimeRobot/2.0")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let body = to_bytes(response.into_body(), 1024).await.unwrap();
            assert_eq!(&body[..], b"Bot is alive!");
        }
    }

    #[tokio::test]
    async fn test_health_reports_healthy() {
        let (writer, reader) = courtside_sync::heartbeat(Utc::now());
        writer.beat(Utc::now());

        let (status, body) = get_json(router(reader, Duration::from_secs(300)), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_health_reports_stale() {
        let long_ago = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let (_writer, reader) = courtside_sync::heartbeat(long_ago);

        let (status, body) = get_json(router(reader, Duration::from_secs(300)), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "stale");
        assert_eq!(body["last_successful_update"], "2020-01-01T00:00:00+00:00");
    }
}
