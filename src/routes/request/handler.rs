use std::convert::Infallible;

use axum::extract::{Json, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};

use crate::AppState;
use crate::error::AppError;
use crate::utils::success_to_api_response;

use super::model::{AcceptRequest, LocationQuery, RequestIdPayload, RideRequestInfo, SubmitRequest};

#[axum::debug_handler]
pub async fn submit(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Result<impl IntoResponse, AppError> {
    let request = state
        .requests
        .submit(req.client_id, req.pickup, req.dropoff)
        .await?;
    Ok((
        StatusCode::CREATED,
        success_to_api_response(RideRequestInfo::from(request)),
    ))
}

#[axum::debug_handler]
pub async fn open_requests(
    State(state): State<AppState>,
    Query(query): Query<LocationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let requests = state
        .requests
        .open_requests_near(query.latitude, query.longitude)
        .await?;
    let infos = requests
        .into_iter()
        .map(RideRequestInfo::from)
        .collect::<Vec<_>>();
    Ok((StatusCode::OK, success_to_api_response(infos)))
}

/// 司机侧 SSE 订阅：单格起步，等待窗口内无结果自动扩九格
pub async fn watch_requests(
    State(state): State<AppState>,
    Query(query): Query<LocationQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let watch = state
        .requests
        .watch_open_requests(query.latitude, query.longitude)?;
    let stream = watch.map(|requests| {
        let infos = requests
            .into_iter()
            .map(RideRequestInfo::from)
            .collect::<Vec<_>>();
        let payload = serde_json::to_string(&infos).unwrap_or_else(|_| "[]".into());
        Ok(Event::default().data(payload))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[axum::debug_handler]
pub async fn accept(
    State(state): State<AppState>,
    Json(req): Json<AcceptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let claimed = state
        .requests
        .accept(&req.request_id, &req.driver_id)
        .await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(RideRequestInfo::from(claimed)),
    ))
}

#[axum::debug_handler]
pub async fn complete(
    State(state): State<AppState>,
    Json(req): Json<RequestIdPayload>,
) -> Result<impl IntoResponse, AppError> {
    let completed = state.requests.complete(&req.request_id).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(RideRequestInfo::from(completed)),
    ))
}

#[axum::debug_handler]
pub async fn cancel(
    State(state): State<AppState>,
    Json(req): Json<RequestIdPayload>,
) -> Result<impl IntoResponse, AppError> {
    let cancelled = state.requests.cancel(&req.request_id).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(RideRequestInfo::from(cancelled)),
    ))
}
