use axum::{
    body::{Body, to_bytes},
    http::Request,
    middleware::Next,
    response::Response,
};
use tracing::error;

// 5xx 响应体最多记录这么多字节
const LOG_BODY_LIMIT: usize = 1024;

pub async fn log_errors(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let response = next.run(req).await;

    if response.status().is_server_error() {
        let (mut parts, body) = response.into_parts();
        let bytes = match to_bytes(body, LOG_BODY_LIMIT).await {
            Ok(b) => b,
            Err(e) => {
                error!(%method, %uri, "读取错误响应体失败: {}", e);
                return Response::from_parts(parts, Body::empty());
            }
        };

        error!(
            %method,
            %uri,
            status = %parts.status,
            body = %String::from_utf8_lossy(&bytes),
            "服务端错误"
        );

        // 重新组装响应体，长度头已不可信
        parts.headers.remove(axum::http::header::CONTENT_LENGTH);
        Response::from_parts(parts, Body::from(bytes))
    } else {
        response
    }
}
