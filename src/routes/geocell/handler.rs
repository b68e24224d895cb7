use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::AppState;
use crate::error::AppError;
use crate::utils::success_to_api_response;

use super::model::{CellResponse, LocationQuery};

#[axum::debug_handler]
pub async fn cell_at(
    State(state): State<AppState>,
    Query(query): Query<LocationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let grid = state.grid;
    Ok((
        StatusCode::OK,
        success_to_api_response(CellResponse {
            cell_id: grid.cell_id(query.latitude, query.longitude)?,
            canonical_key: grid.canonical_key(query.latitude, query.longitude)?,
            neighbors: grid.neighbor_cells(query.latitude, query.longitude)?,
            resolution: grid.resolution(),
        }),
    ))
}
