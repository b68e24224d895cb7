use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{RequestStatus, RideLocation, RideRequest};

#[derive(Debug, Deserialize)]
pub struct LocationQuery {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub client_id: String,
    pub pickup: RideLocation,
    pub dropoff: Option<RideLocation>,
}

#[derive(Debug, Deserialize)]
pub struct AcceptRequest {
    pub request_id: String,
    pub driver_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RequestIdPayload {
    pub request_id: String,
}

#[derive(Debug, Serialize)]
pub struct RideRequestInfo {
    pub request_id: String,
    pub client_id: String,
    pub pickup: RideLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropoff: Option<RideLocation>,
    pub cell_id: String,
    pub status: RequestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    /// 客户端拿它渲染「x 分钟前」的等待时长
    pub age_secs: i64,
}

impl From<RideRequest> for RideRequestInfo {
    fn from(request: RideRequest) -> Self {
        let age_secs = (Utc::now() - request.created_at).num_seconds().max(0);
        Self {
            request_id: request.request_id,
            client_id: request.client_id,
            pickup: request.pickup,
            dropoff: request.dropoff,
            cell_id: request.cell_id,
            status: request.status,
            claimed_by: request.claimed_by,
            created_at: request.created_at,
            age_secs,
        }
    }
}
