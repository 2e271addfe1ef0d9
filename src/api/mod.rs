//! HTTP 对外接口（feature = "http"）
//!
//! - POST /api/chat：入站消息入口，x-api-key 校验后交给编排器
//! - POST /api/force-report/{session_id}：手动触发上报（测试/管理用）
//! - GET /track/*path：蜜罐捕获链接。假装是回执文件，实际记录来访 IP 与 UA；
//!   带 ?s=<session_id> 时把 IP 并入该会话的 dynamic_intel（ip 目标据此判成功）。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::{AgentError, TaskScheduler, TurnOrchestrator};
use crate::intel::RawIntel;
use crate::report::Reporter;
use crate::session::SessionStore;

/// HTTP 服务状态
pub struct ApiState {
    pub orchestrator: Arc<TurnOrchestrator>,
    pub store: Arc<dyn SessionStore>,
    pub reporter: Arc<dyn Reporter>,
    pub scheduler: Arc<dyn TaskScheduler>,
    /// 未配置时不校验 x-api-key
    pub api_key: Option<String>,
}

/// /api/chat 请求体
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub message: MessageData,
}

#[derive(Debug, Deserialize)]
pub struct MessageData {
    pub sender: Option<String>,
    pub text: String,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub status: &'static str,
    pub reply: String,
}

/// 创建路由
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/force-report/:session_id", post(force_report))
        .route("/health", get(|| async { "OK" }))
        .route("/track/*path", get(track))
        .with_state(state)
}

/// POST /api/chat - 处理一条入站消息
async fn chat(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<Value>)> {
    if let Some(ref expected) = state.api_key {
        let provided = headers.get("x-api-key").and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({"detail": "Invalid API Key"})),
            ));
        }
    }

    match state
        .orchestrator
        .process_turn(&request.session_id, &request.message.text)
        .await
    {
        Ok(reply) => Ok(Json(ChatResponse {
            status: "success",
            reply,
        })),
        // 持久化失败是可重试错误，用 503 告知调用方
        Err(e @ (AgentError::PersistenceFailure(_) | AgentError::InvalidSession(_))) => {
            tracing::error!(session = %request.session_id, "Turn aborted: {}", e);
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"detail": "Temporarily unavailable, please retry"})),
            ))
        }
        Err(e) => {
            tracing::error!(session = %request.session_id, "Turn failed: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"detail": "Internal error"})),
            ))
        }
    }
}

/// POST /api/force-report/{session_id} - 手动触发上报
async fn force_report(
    State(state): State<Arc<ApiState>>,
    Path(session_id): Path<String>,
) -> Json<Value> {
    let reporter = state.reporter.clone();
    state
        .scheduler
        .spawn(Box::pin(async move { reporter.submit(&session_id).await }));
    Json(json!({"status": "Report submission queued"}))
}

/// GET /track/*path - 蜜罐捕获端点，对任意路径返回假的「文件损坏」
async fn track(
    State(state): State<Arc<ApiState>>,
    Path(path): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Json<Value> {
    let ip = addr.ip().to_string();
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    tracing::info!(path = %path, ip = %ip, user_agent = %user_agent, "Honeypot link hit");

    // 链接里带会话标记时，把 IP 作为开放情报并入该会话
    if let Some(session_id) = params.get("s") {
        let mut raw = RawIntel::new();
        raw.insert("ip".to_string(), vec![ip]);
        if let Err(e) = state.store.merge_intel(session_id, &raw).await {
            tracing::warn!(session = %session_id, "Failed to record honeypot hit: {}", e);
        }
    }

    Json(json!({
        "message": "File is corrupted. Please try again.",
        "error_code": "PDF_LOAD_FAIL"
    }))
}
