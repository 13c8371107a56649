//! Engagement Rules - automation rule API server

use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use engagement_rules::{
    ActionDispatcher, Event, RuleDraft, RuleEngine, RuleError, RuleFilter, RuleStore,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod websocket;

use config::ServerConfig;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RuleStore>,
    pub engine: Arc<RuleEngine>,
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

type ApiResult = (StatusCode, Json<ApiResponse>);

fn ok<T: Serialize>(data: T) -> ApiResult {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

/// Map a store error to its HTTP status
fn rule_error(e: RuleError) -> ApiResult {
    let status = match &e {
        RuleError::Validation { .. } => StatusCode::BAD_REQUEST,
        RuleError::NotFound(_) => StatusCode::NOT_FOUND,
        RuleError::Io(_) | RuleError::Json(_) => {
            tracing::error!("Rule store failure: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(ApiResponse::error(e.to_string())))
}

/// System info response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SystemInfo {
    name: String,
    version: String,
    rule_count: usize,
    active_rule_count: usize,
    match_policy: String,
}

/// Get system info
async fn system_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(SystemInfo {
        name: "Engagement Rules".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        rule_count: state.store.len(),
        active_rule_count: state.store.snapshot().len(),
        match_policy: state.engine.policy().to_string(),
    }))
}

/// List rules, optionally filtered by platform and active flag
async fn list_rules(
    State(state): State<AppState>,
    Query(filter): Query<RuleFilter>,
) -> ApiResult {
    ok(state.store.list(&filter))
}

/// Create a rule
async fn create_rule(
    State(state): State<AppState>,
    Json(draft): Json<RuleDraft>,
) -> ApiResult {
    match state.store.create(draft).await {
        Ok(rule) => (StatusCode::CREATED, Json(ApiResponse::success(rule))),
        Err(e) => rule_error(e),
    }
}

/// Get a specific rule
async fn get_rule(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    match state.store.get(&id) {
        Some(rule) => ok(rule),
        None => rule_error(RuleError::NotFound(id)),
    }
}

/// Replace a rule's editable fields
async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(draft): Json<RuleDraft>,
) -> ApiResult {
    match state.store.update(&id, draft).await {
        Ok(rule) => ok(rule),
        Err(e) => rule_error(e),
    }
}

/// Delete a rule
async fn delete_rule(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    match state.store.delete(&id).await {
        Ok(rule) => ok(rule),
        Err(e) => rule_error(e),
    }
}

async fn activate_rule(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    match state.store.set_active(&id, true).await {
        Ok(rule) => ok(rule),
        Err(e) => rule_error(e),
    }
}

async fn deactivate_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult {
    match state.store.set_active(&id, false).await {
        Ok(rule) => ok(rule),
        Err(e) => rule_error(e),
    }
}

/// Trigger counters for a rule
async fn rule_stats(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    match state.store.stats(&id) {
        Ok(stats) => ok(stats),
        Err(e) => rule_error(e),
    }
}

/// Dry-run one rule against an event without recording anything
async fn test_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(event): Json<Event>,
) -> ApiResult {
    match state.store.get(&id) {
        Some(rule) => ok(state.engine.evaluate_rule(&rule, &event)),
        None => rule_error(RuleError::NotFound(id)),
    }
}

/// Run an incoming event through the active rules
async fn process_event(
    State(state): State<AppState>,
    Json(event): Json<Event>,
) -> ApiResult {
    let rules = state.store.snapshot();
    let report = state.engine.process_report(&rules, &event);
    state.store.record_dispatch(&report.commands);
    ok(report)
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket::handle_socket(socket, state))
}

/// Health check
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/system/info", get(system_info))
        .route("/api/v1/rules", get(list_rules).post(create_rule))
        .route(
            "/api/v1/rules/:id",
            get(get_rule).put(update_rule).delete(delete_rule),
        )
        .route("/api/v1/rules/:id/activate", post(activate_rule))
        .route("/api/v1/rules/:id/deactivate", post(deactivate_rule))
        .route("/api/v1/rules/:id/stats", get(rule_stats))
        .route("/api/v1/rules/:id/test", post(test_rule))
        .route("/api/v1/events", post(process_event))
        // WebSocket
        .route("/ws", get(ws_handler))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "engagement_api=debug,engagement_rules=debug,info".into()),
        )
        .init();

    tracing::info!("Starting Engagement Rules API server");

    let config = ServerConfig::from_env()?;
    tracing::info!(
        "Data directory {:?}, match policy {}",
        config.data_dir,
        config.match_policy
    );

    let store = RuleStore::open(&config.data_dir).await;
    tracing::info!("{} rules loaded", store.len());

    let engine = RuleEngine::new(
        ActionDispatcher::new(config.business_hours.clone()),
        config.match_policy,
    );

    let state = AppState {
        store: Arc::new(store),
        engine: Arc::new(engine),
    };

    let app = router(state);

    tracing::info!("Listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use engagement_rules::{
        Action, ActionType, Condition, ConditionField, ContentType, Operator, Platform,
        Sentiment,
    };

    fn state() -> AppState {
        AppState {
            store: Arc::new(RuleStore::in_memory()),
            engine: Arc::new(RuleEngine::default()),
        }
    }

    fn draft() -> RuleDraft {
        RuleDraft::new(
            "Product inquiry",
            Action::with_value(ActionType::Reply, "Product Inquiry Response"),
        )
        .with_condition(Condition::new(
            ConditionField::ContentText,
            Operator::Contains,
            "available",
        ))
    }

    fn event(text: &str) -> Event {
        Event {
            id: "evt-42".to_string(),
            platform: Platform::Facebook,
            content_type: ContentType::Comment,
            text: text.to_string(),
            author_username: "mike_chen".to_string(),
            author_follower_count: 120,
            is_following_us: false,
            has_commented_before: true,
            sentiment: Sentiment::Neutral,
            timestamp: chrono::DateTime::parse_from_rfc3339("2024-05-15T10:30:00+00:00").unwrap(),
        }
    }

    fn status_of((status, _): ApiResult) -> StatusCode {
        status
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let state = state();
        let (status, Json(body)) = create_rule(State(state.clone()), Json(draft())).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body.data.unwrap()["id"].as_str().unwrap().to_string();

        assert_eq!(
            status_of(get_rule(State(state.clone()), Path(id)).await),
            StatusCode::OK
        );
        assert_eq!(
            status_of(get_rule(State(state), Path("missing".to_string())).await),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_validation_error_is_bad_request() {
        let state = state();
        let mut invalid = draft();
        invalid.conditions.clear();

        let (status, Json(body)) = create_rule(State(state.clone()), Json(invalid)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.error.unwrap().contains("conditions"));
        assert!(state.store.is_empty());
    }

    #[tokio::test]
    async fn test_process_event_records_stats() {
        let state = state();
        let rule = state.store.create(draft()).await.unwrap();

        let (status, Json(body)) =
            process_event(State(state.clone()), Json(event("Still available?"))).await;
        assert_eq!(status, StatusCode::OK);
        let data = body.data.unwrap();
        assert_eq!(data["commands"].as_array().unwrap().len(), 1);
        assert_eq!(data["commands"][0]["templateId"], "Product Inquiry Response");
        assert_eq!(state.store.stats(&rule.id).unwrap().trigger_count, 1);
    }

    #[tokio::test]
    async fn test_dry_run_leaves_stats_alone() {
        let state = state();
        let rule = state.store.create(draft().inactive()).await.unwrap();

        let (_, Json(body)) = test_rule(
            State(state.clone()),
            Path(rule.id.clone()),
            Json(event("is it available")),
        )
        .await;
        assert_eq!(body.data.unwrap()["outcome"], "matched");
        assert_eq!(state.store.stats(&rule.id).unwrap().trigger_count, 0);
    }

    #[tokio::test]
    async fn test_deactivate_then_process() {
        let state = state();
        let rule = state.store.create(draft()).await.unwrap();
        assert_eq!(
            status_of(deactivate_rule(State(state.clone()), Path(rule.id.clone())).await),
            StatusCode::OK
        );

        let (_, Json(body)) = process_event(State(state), Json(event("available?"))).await;
        assert!(body.data.unwrap()["commands"].as_array().unwrap().is_empty());
    }
}
