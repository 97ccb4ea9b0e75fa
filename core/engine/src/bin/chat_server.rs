use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use chat_engine::config_manager::{config_path_from_args, ConfigManager, TomlConfigManager};
use chat_engine::conversation::GREETING_REPLIES;
use chat_engine::session::{session_cookie, session_id_from_cookie, SessionStore};
use chat_engine::{ChatEngine, ChatEngineBuilder, TurnReply, APOLOGY_REPLY};

/// 应用状态
#[derive(Clone)]
struct AppState {
    engine: ChatEngine,
    sessions: Arc<SessionStore>,
}

/// `/get?msg=...`
#[derive(Debug, Deserialize)]
struct ChatQuery {
    msg: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    policy: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 1. 解析命令行参数并加载配置（文件不存在时使用默认值）
    let args: Vec<String> = std::env::args().collect();
    let config_path = config_path_from_args(&args);
    tracing::info!("Loading config from: {}", config_path.display());
    let config = TomlConfigManager::new(&config_path)
        .allow_missing(true)
        .load()
        .await?;

    // 2. 加载模型；产物缺失或损坏直接退出，不对外服务
    let engine = ChatEngineBuilder::from_config(&config)?.build()?;
    tracing::info!(policy = ?engine.policy(), "ChatEngine initialized successfully");

    // 3. 启动 HTTP 服务器
    let app_state = AppState {
        engine,
        sessions: Arc::new(SessionStore::new()),
    };

    let app = Router::new()
        .route("/", get(start_session))
        .route("/get", get(chat_turn))
        .route("/health", get(health_check))
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let addr = format!("{}:{}", config.server.host, config.effective_port());
    tracing::info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn current_session(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(session_id_from_cookie)
}

/// cookie 里的 id 只有在会话表里还存在时才沿用，否则新建
fn known_session(state: &AppState, headers: &HeaderMap) -> Option<String> {
    current_session(headers).filter(|id| state.sessions.contains(id))
}

fn with_session_cookie(mut response: Response, id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(&session_cookie(id)) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
}

/// 新会话（或重置已有会话）：状态回到 general
async fn start_session(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let id = match known_session(&state, &headers) {
        Some(id) if state.sessions.reset(&id) => id,
        _ => state.sessions.create(),
    };
    with_session_cookie(Json(GREETING_REPLIES[0]).into_response(), &id)
}

/// 一轮对话：读会话状态 -> 引擎 -> 写回新状态
async fn chat_turn(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ChatQuery>,
) -> Response {
    let id = known_session(&state, &headers).unwrap_or_else(|| state.sessions.create());
    let input = query.msg.unwrap_or_default();
    let current = state.sessions.get(&id);

    // beam search 是纯 CPU 计算，放到阻塞线程池里跑
    let engine = state.engine.clone();
    let reply = match tokio::task::spawn_blocking(move || engine.respond(&input, current)).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(session = %id, error = %e, "turn task failed");
            TurnReply::new(APOLOGY_REPLY, current)
        }
    };

    if !state.sessions.set(&id, reply.state) {
        tracing::warn!(session = %id, "session expired during turn, state not stored");
    }
    with_session_cookie(Json(reply.reply).into_response(), &id)
}

/// 健康检查端点
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        policy: format!("{:?}", state.engine.policy()).to_lowercase(),
    })
}
