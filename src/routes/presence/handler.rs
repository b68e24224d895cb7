use std::convert::Infallible;

use axum::extract::{Json, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use chrono::Utc;
use futures_util::{Stream, StreamExt};

use crate::AppState;
use crate::error::AppError;
use crate::utils::success_to_api_response;

use super::model::{
    DriverCountResponse, HeartbeatRequest, HeartbeatResponse, LocationQuery, NearbyDriverInfo,
    OfflineRequest,
};

#[axum::debug_handler]
pub async fn heartbeat(
    State(state): State<AppState>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<impl IntoResponse, AppError> {
    let seq = req
        .seq
        .unwrap_or_else(|| Utc::now().timestamp_millis() as u64);
    let (presence, applied) = state
        .presence
        .publish(
            &req.driver_id,
            req.latitude,
            req.longitude,
            seq,
            req.active_ride_id,
        )
        .await?;

    Ok((
        StatusCode::OK,
        success_to_api_response(HeartbeatResponse {
            cell_id: presence.cell_id,
            applied,
            last_heartbeat_at: presence.last_heartbeat_at,
        }),
    ))
}

#[axum::debug_handler]
pub async fn offline(
    State(state): State<AppState>,
    Json(req): Json<OfflineRequest>,
) -> impl IntoResponse {
    state.presence.go_offline(&req.driver_id).await;
    (StatusCode::OK, success_to_api_response(()))
}

#[axum::debug_handler]
pub async fn count(
    State(state): State<AppState>,
    Query(query): Query<LocationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let cell_id = state.grid.cell_id(query.latitude, query.longitude)?;
    let count = state
        .presence
        .count_nearby(query.latitude, query.longitude)
        .await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(DriverCountResponse { cell_id, count }),
    ))
}

/// 司机数 SSE 订阅。乘客移动超过阈值后由客户端断开重订
pub async fn watch_count(
    State(state): State<AppState>,
    Query(query): Query<LocationQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let watch = state
        .presence
        .watch_driver_count(query.latitude, query.longitude)?;
    let stream = watch.map(|count| Ok(Event::default().data(count.to_string())));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[axum::debug_handler]
pub async fn nearby(
    State(state): State<AppState>,
    Query(query): Query<LocationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let drivers = state
        .presence
        .nearby_drivers(query.latitude, query.longitude)
        .await?;
    let infos = drivers
        .into_iter()
        .map(NearbyDriverInfo::from)
        .collect::<Vec<_>>();
    Ok((StatusCode::OK, success_to_api_response(infos)))
}
