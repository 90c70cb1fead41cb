//! Webhook server: health, manual trigger and status endpoints.

use std::num::NonZeroU16;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Json;
use axum::Router;
use serde_json::{Value, json};
use tracing::{error, info};

use crate::constants::{SERVICE_NAME, X_HUB_SIGNATURE_256};
use crate::error::WebhookError;
use crate::persist::list_records;
use crate::pipeline::{Pipeline, log_events};

mod signature;

#[derive(Clone, Debug)]
pub(crate) struct AppState {
    pipeline: Arc<Pipeline>,
    webhook_secret: Option<String>,
    run_timeout: Duration,
}

impl AppState {
    pub(crate) fn new(
        pipeline: Arc<Pipeline>,
        webhook_secret: Option<String>,
        run_timeout: Duration,
    ) -> Self {
        Self {
            pipeline,
            webhook_secret: webhook_secret.filter(|secret| !secret.is_empty()),
            run_timeout,
        }
    }
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Local::now().to_rfc3339(),
        "service": SERVICE_NAME,
    }))
}

async fn generate_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, WebhookError> {
    if let Some(secret) = state.webhook_secret.as_deref() {
        let header = headers
            .get(X_HUB_SIGNATURE_256)
            .and_then(|value| value.to_str().ok())
            .ok_or(WebhookError::Unauthorized)?;
        if !signature::verify(secret, &body, header) {
            return Err(WebhookError::Unauthorized);
        }
    }

    info!("Webhook generation request received");
    let outcome = state
        .pipeline
        .clone()
        .run_within(state.run_timeout)
        .await
        .ok_or(WebhookError::Timeout)?;
    log_events(&outcome);

    if !outcome.succeeded {
        return Err(WebhookError::GenerationFailed(outcome.record));
    }
    info!("Content generated via webhook");
    Ok(Json(json!({
        "status": "success",
        "message": "Content generated successfully",
        "timestamp": chrono::Local::now().to_rfc3339(),
        "record": outcome.record,
        "events": outcome.events,
    })))
}

async fn status_handler(State(state): State<AppState>) -> Result<Json<Value>, WebhookError> {
    let output_dir = &state.pipeline.config().output_dir;
    let dir_exists = tokio::fs::metadata(output_dir)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false);
    let records = list_records(output_dir).await?;

    Ok(Json(json!({
        "system_status": if dir_exists { "healthy" } else { "degraded" },
        "output_dir_exists": dir_exists,
        "record_count": records.len(),
        "last_record": records.first(),
        "timestamp": chrono::Local::now().to_rfc3339(),
    })))
}

fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", axum::routing::get(health_handler))
        .route("/webhook/generate", axum::routing::post(generate_handler))
        .route("/webhook/status", axum::routing::get(status_handler))
}

/// Serves the webhook endpoints until the listener fails.
pub async fn setup_server(
    listen_addr: &str,
    port: NonZeroU16,
    pipeline: Arc<Pipeline>,
    webhook_secret: Option<String>,
    run_timeout: Duration,
) -> Result<(), anyhow::Error> {
    let app = create_router().with_state(AppState::new(pipeline, webhook_secret, run_timeout));

    let addr = format!("{}:{}", listen_addr, port);
    info!("Starting webhook server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app).await {
        error!("Server error: {}", err);
    }
    Ok(())
}
