//! Light Restoration - rule administration API server

use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use restoration_engine::{
    AreaFilter, CreateRuleRequest, RestorationController, RestorationError, StateChanged,
    TimeSlotRequest,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod hass;
mod settings;
mod websocket;

use hass::HassHost;
use settings::Settings;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<RestorationController<HassHost>>,
}

/// API response wrapper using serde_json::Value for flexibility
#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponse {
    fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: Some(serde_json::to_value(data).unwrap_or(serde_json::Value::Null)),
            error: None,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Map an engine error onto a status code and error body
fn error_response(e: &RestorationError) -> (StatusCode, Json<ApiResponse>) {
    let status = match e {
        _ if e.is_validation() => StatusCode::BAD_REQUEST,
        RestorationError::RuleNotFound(_) => StatusCode::NOT_FOUND,
        RestorationError::ActionFailed(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiResponse::error(e.to_string())))
}

/// List all rules
async fn list_rules(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.controller.list()))
}

/// Create a rule
async fn create_rule(
    State(state): State<AppState>,
    Json(req): Json<CreateRuleRequest>,
) -> impl IntoResponse {
    match state.controller.create(req).await {
        Ok(rule) => (StatusCode::CREATED, Json(ApiResponse::success(rule))),
        Err(e) => error_response(&e),
    }
}

/// Get a specific rule
async fn get_rule(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.controller.get(&id) {
        Some(rule) => (StatusCode::OK, Json(ApiResponse::success(rule))),
        None => error_response(&RestorationError::RuleNotFound(id)),
    }
}

/// Delete a rule
async fn delete_rule(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.controller.delete(&id).await {
        Ok(rule) => (StatusCode::OK, Json(ApiResponse::success(rule))),
        Err(e) => error_response(&e),
    }
}

/// Append a time slot to matching rules
async fn add_time_slot(
    State(state): State<AppState>,
    Json(req): Json<TimeSlotRequest>,
) -> impl IntoResponse {
    match state.controller.add_time_slot(&req).await {
        Ok(rules) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({ "rules": rules }))),
        ),
        Err(e) => error_response(&e),
    }
}

/// Remove a time slot from matching rules
async fn remove_time_slot(
    State(state): State<AppState>,
    Json(req): Json<TimeSlotRequest>,
) -> impl IntoResponse {
    match state.controller.remove_time_slot(&req).await {
        Ok(rules) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({ "rules": rules }))),
        ),
        Err(e) => error_response(&e),
    }
}

/// Enable matching rules
async fn enable(
    State(state): State<AppState>,
    filter: Option<Json<AreaFilter>>,
) -> impl IntoResponse {
    let filter = filter.map(|Json(f)| f).unwrap_or_default();
    let rules = state.controller.set_enabled(&filter, true);
    Json(ApiResponse::success(serde_json::json!({ "rules": rules })))
}

/// Disable matching rules
async fn disable(
    State(state): State<AppState>,
    filter: Option<Json<AreaFilter>>,
) -> impl IntoResponse {
    let filter = filter.map(|Json(f)| f).unwrap_or_default();
    let rules = state.controller.set_enabled(&filter, false);
    Json(ApiResponse::success(serde_json::json!({ "rules": rules })))
}

/// Receive an entity state change from the host
async fn state_changed(
    State(state): State<AppState>,
    Json(change): Json<StateChanged>,
) -> impl IntoResponse {
    let rules = state.controller.publish_state_change(change);
    Json(ApiResponse::success(serde_json::json!({ "rules": rules })))
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket::handle_socket(socket, state))
}

/// Health check
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "restoration_api=debug,restoration_engine=debug,info".into()
            }),
        )
        .init();

    tracing::info!("Starting Light Restoration API server");

    let settings = Settings::from_env()?;
    tracing::info!("Using host at {}", settings.hass_url);

    let host = Arc::new(HassHost::new(
        settings.hass_url.clone(),
        settings.hass_token.clone(),
    ));
    let controller = Arc::new(
        RestorationController::new(host, &settings.data_dir, settings.scan_interval).await?,
    );

    let state = AppState {
        controller: Arc::clone(&controller),
    };

    // Build the router
    let app = Router::new()
        .route("/health", get(health))
        .route("/api/v1/rules", get(list_rules).post(create_rule))
        .route("/api/v1/rules/:id", get(get_rule).delete(delete_rule))
        .route("/api/v1/services/add_time_slot", post(add_time_slot))
        .route("/api/v1/services/remove_time_slot", post(remove_time_slot))
        .route("/api/v1/services/enable", post(enable))
        .route("/api/v1/services/disable", post(disable))
        .route("/api/v1/events/state_changed", post(state_changed))
        // WebSocket
        .route("/ws", get(ws_handler))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    tracing::info!("Listening on http://{}", settings.bind);

    let listener = tokio::net::TcpListener::bind(settings.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    controller.shutdown();
    Ok(())
}
