use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::AppState;
use crate::utils::{ApiResponse, success_to_api_response};

pub mod geocell;
pub mod presence;
pub mod request;

/// Ping响应
#[derive(Serialize)]
pub struct PingResponse {
    /// 服务状态
    pub status: String,
    /// 服务器时间
    pub timestamp: i64,
}

/// 健康检查接口
pub async fn ping() -> Json<ApiResponse<PingResponse>> {
    success_to_api_response(PingResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().timestamp(),
    })
}

/// 全部业务路由，挂在 config.api_base_uri 之下。
/// 中间件（日志、限流、CORS）由 main 统一加
pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/ping", get(ping))
        // 网格调试路由，移动端用它核对跨平台向量
        .route("/geocell/at", get(geocell::cell_at))
        // 司机在线状态路由
        .route("/presence/heartbeat", post(presence::heartbeat))
        .route("/presence/offline", post(presence::offline))
        .route("/presence/count", get(presence::count))
        .route("/presence/count/watch", get(presence::watch_count))
        .route("/presence/nearby", get(presence::nearby))
        // 打车请求路由
        .route("/requests/submit", post(request::submit))
        .route("/requests/open", get(request::open_requests))
        .route("/requests/watch", get(request::watch_requests))
        .route("/requests/accept", post(request::accept))
        .route("/requests/complete", post(request::complete))
        .route("/requests/cancel", post(request::cancel));

    let base = state.config.api_base_uri.clone();
    Router::new().nest(&base, api_routes).with_state(state)
}
