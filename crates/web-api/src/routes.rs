use std::net::SocketAddr;

use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, DefaultBodyLimit, Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::Response,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::{error::ApiError, state::AppState, upload::upload_file, ws_connection::WebSocketConnection};

/// 上传文件的访问前缀
pub const UPLOADS_ROUTE: &str = "/uploads/chat";

pub fn router(state: AppState) -> Router {
    let uploads = ServeDir::new(&state.uploads.dir);
    let body_limit = state.uploads.max_bytes;
    let cors = cors_layer(&state.cors_origins);

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .route(
            "/api/upload",
            post(upload_file).layer(DefaultBodyLimit::max(body_limit)),
        )
        .nest_service(UPLOADS_ROUTE, uploads)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if origins.iter().any(|origin| origin == "*") {
        return base.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(allowed))
}

fn api_routes() -> Router<AppState> {
    Router::new().route("/ws", get(websocket_upgrade))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// 升级前校验凭证，失败返回 401，不建立会话
async fn websocket_upgrade(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let identity = state
        .delivery_service
        .authenticate_connection(query.token.as_deref())
        .map_err(|err| {
            tracing::info!(remote = %remote, error = %err, "WebSocket connection rejected");
            ApiError::from(err)
        })?;
    let credential = query.token.unwrap_or_default();

    Ok(ws.on_upgrade(move |socket| {
        WebSocketConnection::new(state, identity, credential, remote.ip()).run(socket)
    }))
}
