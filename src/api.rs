//! REST API Server for the crypto agent orchestrator
//!
//! Exposes planning, chat, grounded Q&A and live trade decisions over HTTP.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::Orchestrator;
use crate::analysis::{AnswerBudget, ReasoningAgent};
use crate::config::Settings;
use crate::conversational::{ChatService, ChatTurn};
use crate::error::OrchestrationError;
use crate::llm::build_reasoning_service;
use crate::models::{Document, PlanRequest, Source};
use crate::planner::LlmPlanner;
use crate::state::{InMemorySessionStore, SessionStore};
use crate::tools::{
    create_default_registry, ContextSource, HttpContextSource, HttpProfileSource, NoContextSource,
    NoProfileSource, ProfileSource,
};
use crate::trade::{LiveTradeAdvisor, DEFAULT_TRADE_TOP_K};

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct PlanBody {
    pub goal: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub max_steps: Option<usize>,
    #[serde(default)]
    pub stop_score: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct AskBody {
    pub token: String,
    pub question: String,
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub token_budget_tokens: Option<usize>,
    #[serde(default)]
    pub model_answer_tokens: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskResponse {
    pub token: String,
    pub answer: String,
    pub sources: Vec<Source>,
}

#[derive(Debug, Deserialize)]
pub struct LiveTradeBody {
    pub token: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type ApiResult = std::result::Result<Json<ApiResponse>, (StatusCode, Json<ApiResponse>)>;

fn error_response(err: OrchestrationError) -> (StatusCode, Json<ApiResponse>) {
    let status = match &err {
        OrchestrationError::ValidationError(_) => StatusCode::BAD_REQUEST,
        OrchestrationError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!(error = %err, "Request failed");
    }
    (status, Json(ApiResponse::error(err.to_string())))
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub chat: Arc<ChatService>,
    pub reasoner: Arc<ReasoningAgent>,
    pub trade: Arc<LiveTradeAdvisor>,
    pub sessions: Arc<dyn SessionStore>,
    pub default_max_steps: usize,
    pub default_stop_score: f64,
}

impl ApiState {
    /// Wire every component from settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let llm = build_reasoning_service(settings);
        let reasoner = Arc::new(ReasoningAgent::new(llm.clone()).with_budget(AnswerBudget {
            total_tokens: settings.token_budget_tokens,
            answer_tokens: settings.model_answer_tokens,
        }));

        let news: Arc<dyn ContextSource> = match &settings.news_api_base_url {
            Some(url) => Arc::new(HttpContextSource::new(url, settings.request_timeout)),
            None => Arc::new(NoContextSource),
        };
        let profiles: Arc<dyn ProfileSource> = match &settings.profile_api_base_url {
            Some(url) => Arc::new(HttpProfileSource::new(url, settings.request_timeout)),
            None => Arc::new(NoProfileSource),
        };

        let registry = create_default_registry(news.clone(), profiles, reasoner.clone());
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(LlmPlanner::new(llm.clone())),
            Arc::new(registry),
        ));

        let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new(
            settings.session_ttl,
            settings.max_history_chars,
        ));
        let chat = Arc::new(ChatService::new(sessions.clone(), reasoner.clone()));
        let trade = Arc::new(LiveTradeAdvisor::new(
            news,
            reasoner.clone(),
            llm,
            settings.sell_signal_policy,
        ));

        Self {
            orchestrator,
            chat,
            reasoner,
            trade,
            sessions,
            default_max_steps: settings.max_steps,
            default_stop_score: settings.stop_score,
        }
    }

    fn plan_request(&self, body: PlanBody) -> PlanRequest {
        PlanRequest {
            goal: body.goal.trim().to_string(),
            token: body.token.filter(|t| !t.trim().is_empty()),
            user_id: body.user_id.filter(|u| !u.trim().is_empty()),
            max_steps: body.max_steps.unwrap_or(self.default_max_steps),
            stop_score: body.stop_score.unwrap_or(self.default_stop_score),
        }
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Orchestration Endpoints
/// =============================

async fn run_plan(State(state): State<ApiState>, Json(body): Json<PlanBody>) -> ApiResult {
    info!(goal = %body.goal, "Received plan request");

    let request = state.plan_request(body);
    let result = state
        .orchestrator
        .run(request)
        .await
        .map_err(error_response)?;

    Ok(Json(ApiResponse::success(result)))
}

async fn stream_plan(State(state): State<ApiState>, Json(body): Json<PlanBody>) -> Response {
    info!(goal = %body.goal, "Received streaming plan request");

    let request = state.plan_request(body);
    let events = match state.orchestrator.stream(request) {
        Ok(events) => events,
        Err(e) => return error_response(e).into_response(),
    };

    let lines = events.map(|event| {
        serde_json::to_string(&event).map(|mut line| {
            line.push('\n');
            line
        })
    });

    (
        [(header::CONTENT_TYPE, "application/jsonl")],
        Body::from_stream(lines),
    )
        .into_response()
}

/// =============================
/// Chat / Q&A Endpoints
/// =============================

async fn chat_handler(State(state): State<ApiState>, Json(turn): Json<ChatTurn>) -> ApiResult {
    let reply = state.chat.handle(turn).await.map_err(error_response)?;
    Ok(Json(ApiResponse::success(reply)))
}

async fn ask_handler(State(state): State<ApiState>, Json(body): Json<AskBody>) -> ApiResult {
    if body.documents.is_empty() {
        return Err(error_response(OrchestrationError::ValidationError(
            "documents must not be empty".to_string(),
        )));
    }

    let defaults = state.reasoner.default_budget();
    let budget = AnswerBudget {
        total_tokens: body.token_budget_tokens.unwrap_or(defaults.total_tokens),
        answer_tokens: body.model_answer_tokens.unwrap_or(defaults.answer_tokens),
    };
    let answer = state
        .reasoner
        .answer_within(&body.question, &body.documents, budget)
        .await;

    Ok(Json(ApiResponse::success(AskResponse {
        token: body.token.trim().to_uppercase(),
        answer: answer.answer,
        sources: answer.sources,
    })))
}

/// =============================
/// Live Trade Endpoint
/// =============================

async fn live_trade_handler(
    State(state): State<ApiState>,
    Json(body): Json<LiveTradeBody>,
) -> ApiResult {
    let decision = state
        .trade
        .decide(
            &body.token,
            body.prompt.as_deref(),
            body.top_k.unwrap_or(DEFAULT_TRADE_TOP_K),
        )
        .await
        .map_err(error_response)?;

    Ok(Json(ApiResponse::success(decision)))
}

/// =============================
/// Router
/// =============================

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn create_router(state: ApiState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/orchestrate/plan", post(run_plan))
        .route("/orchestrate/plan-stream", post(stream_plan))
        .route("/chat", post(chat_handler))
        .route("/ask", post(ask_handler))
        .route("/live-trade/decision", post(live_trade_handler))
        .with_state(state)
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(state: ApiState, settings: &Settings) -> crate::Result<()> {
    let router = create_router(state, &settings.cors_origins);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", settings.port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", settings.port);
    info!("Local: http://127.0.0.1:{}", settings.port);

    axum::serve(listener, router).await?;

    Ok(())
}
