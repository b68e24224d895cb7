use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::DriverPresence;

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub driver_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// 不传时服务端用接收时刻的毫秒时间戳兜底
    pub seq: Option<u64>,
    pub active_ride_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    pub cell_id: String,
    /// false 表示乱序心跳被忽略
    pub applied: bool,
    pub last_heartbeat_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct OfflineRequest {
    pub driver_id: String,
}

// 乘客端人数浮层与司机端订阅共用的位置查询参数
#[derive(Debug, Deserialize)]
pub struct LocationQuery {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Serialize)]
pub struct DriverCountResponse {
    pub cell_id: String,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct NearbyDriverInfo {
    pub driver_id: String,
    pub cell_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub last_heartbeat_at: DateTime<Utc>,
}

impl From<DriverPresence> for NearbyDriverInfo {
    fn from(presence: DriverPresence) -> Self {
        Self {
            driver_id: presence.driver_id,
            cell_id: presence.cell_id,
            latitude: presence.latitude,
            longitude: presence.longitude,
            last_heartbeat_at: presence.last_heartbeat_at,
        }
    }
}
