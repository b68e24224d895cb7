use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::utils::{error_codes, error_to_api_response};

// 业务错误类型，统一映射为 ApiResponse 错误信封
#[derive(Debug, Error)]
pub enum AppError {
    #[error("无效坐标: ({latitude}, {longitude})")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    #[error("请求不存在: {0}")]
    RequestNotFound(String),

    #[error("请求已被其他司机接单: {0}")]
    RequestAlreadyTaken(String),

    #[error("非法状态迁移: {0}")]
    InvalidTransition(String),

    #[error("内部服务器错误: {0}")]
    Internal(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, i32) {
        match self {
            AppError::InvalidCoordinate { .. } => {
                (StatusCode::BAD_REQUEST, error_codes::VALIDATION_ERROR)
            }
            AppError::RequestNotFound(_) => (StatusCode::NOT_FOUND, error_codes::NOT_FOUND),
            AppError::RequestAlreadyTaken(_) => (StatusCode::CONFLICT, error_codes::REQUEST_TAKEN),
            AppError::InvalidTransition(_) => {
                (StatusCode::CONFLICT, error_codes::INVALID_TRANSITION)
            }
            AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, error_codes::INTERNAL_ERROR)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        (status, error_to_api_response::<()>(code, self.to_string())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_mapping() {
        let (status, code) = AppError::RequestAlreadyTaken("r1".into()).status_and_code();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(code, error_codes::REQUEST_TAKEN);

        let (status, _) = AppError::InvalidCoordinate {
            latitude: 91.0,
            longitude: 0.0,
        }
        .status_and_code();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
