use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, watch};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Open,
    Claimed,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
}

// 打车请求。状态只沿 open -> claimed -> completed
// 或 open/claimed -> cancelled 单向迁移
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideRequest {
    pub request_id: String,
    pub client_id: String,
    pub pickup: RideLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropoff: Option<RideLocation>,
    /// 按上车点所在格分区
    pub cell_id: String,
    pub status: RequestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RideRequest {
    /// 只有 open 且未超出新鲜窗口的请求才对司机可见
    pub fn is_fresh(&self, now: DateTime<Utc>, freshness: Duration) -> bool {
        self.status == RequestStatus::Open && now - self.created_at <= freshness
    }
}

#[derive(Default)]
struct RequestInner {
    by_id: HashMap<String, RideRequest>,
    // cell_id -> 仍为 open 的请求 id
    open_by_cell: HashMap<String, HashSet<String>>,
}

pub struct RequestStore {
    inner: RwLock<RequestInner>,
    version: watch::Sender<u64>,
}

impl Default for RequestStore {
    fn default() -> Self {
        RequestStore::new()
    }
}

impl RequestStore {
    pub fn new() -> Self {
        RequestStore {
            inner: RwLock::new(RequestInner::default()),
            version: watch::Sender::new(0),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }

    pub async fn create(
        &self,
        request_id: Option<String>,
        client_id: String,
        pickup: RideLocation,
        dropoff: Option<RideLocation>,
        cell_id: String,
    ) -> RideRequest {
        let now = Utc::now();
        let request = RideRequest {
            request_id: request_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            client_id,
            pickup,
            dropoff,
            cell_id,
            status: RequestStatus::Open,
            claimed_by: None,
            created_at: now,
            updated_at: now,
        };

        let mut inner = self.inner.write().await;
        inner
            .open_by_cell
            .entry(request.cell_id.clone())
            .or_default()
            .insert(request.request_id.clone());
        inner
            .by_id
            .insert(request.request_id.clone(), request.clone());
        drop(inner);

        self.bump();
        request
    }

    /// 抢单仲裁：整个系统唯一需要强互斥的地方。写锁内做条件更新，
    /// 并发抢同一单时恰好一个成功，其余拿到 RequestAlreadyTaken
    pub async fn claim(&self, request_id: &str, driver_id: &str) -> Result<RideRequest, AppError> {
        let mut inner = self.inner.write().await;
        let Some(request) = inner.by_id.get_mut(request_id) else {
            return Err(AppError::RequestNotFound(request_id.to_string()));
        };

        if request.status != RequestStatus::Open || request.claimed_by.is_some() {
            return Err(AppError::RequestAlreadyTaken(request_id.to_string()));
        }

        request.status = RequestStatus::Claimed;
        request.claimed_by = Some(driver_id.to_string());
        request.updated_at = Utc::now();
        let claimed = request.clone();

        Self::unindex_open(&mut inner, &claimed);
        drop(inner);

        self.bump();
        Ok(claimed)
    }

    pub async fn complete(&self, request_id: &str) -> Result<RideRequest, AppError> {
        self.transition(request_id, RequestStatus::Completed, &[RequestStatus::Claimed])
            .await
    }

    pub async fn cancel(&self, request_id: &str) -> Result<RideRequest, AppError> {
        self.transition(
            request_id,
            RequestStatus::Cancelled,
            &[RequestStatus::Open, RequestStatus::Claimed],
        )
        .await
    }

    async fn transition(
        &self,
        request_id: &str,
        to: RequestStatus,
        allowed_from: &[RequestStatus],
    ) -> Result<RideRequest, AppError> {
        let mut inner = self.inner.write().await;
        let Some(request) = inner.by_id.get_mut(request_id) else {
            return Err(AppError::RequestNotFound(request_id.to_string()));
        };

        if !allowed_from.contains(&request.status) {
            return Err(AppError::InvalidTransition(format!(
                "{} 不能从 {:?} 迁移到 {:?}",
                request_id, request.status, to
            )));
        }

        request.status = to;
        request.updated_at = Utc::now();
        let updated = request.clone();

        Self::unindex_open(&mut inner, &updated);
        drop(inner);

        self.bump();
        Ok(updated)
    }

    fn unindex_open(inner: &mut RequestInner, request: &RideRequest) {
        let emptied = inner
            .open_by_cell
            .get_mut(&request.cell_id)
            .map(|ids| {
                ids.remove(&request.request_id);
                ids.is_empty()
            })
            .unwrap_or(false);
        if emptied {
            inner.open_by_cell.remove(&request.cell_id);
        }
    }

    /// 给定格集合内的 open 请求，按创建时间升序（最久等待的最先）
    pub async fn list_open_in_cells(&self, cells: &HashSet<String>) -> Vec<RideRequest> {
        let inner = self.inner.read().await;
        let mut requests: Vec<RideRequest> = cells
            .iter()
            .filter_map(|cell| inner.open_by_cell.get(cell))
            .flatten()
            .filter_map(|id| inner.by_id.get(id))
            .filter(|r| r.status == RequestStatus::Open)
            .cloned()
            .collect();
        requests.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.request_id.cmp(&b.request_id))
        });
        requests
    }

    pub async fn get(&self, request_id: &str) -> Option<RideRequest> {
        self.inner.read().await.by_id.get(request_id).cloned()
    }

    /// 后台回收：过旧的 open 请求转为 cancelled，限制存量增长。
    /// 匹配可见性早就被新鲜窗口挡掉了，这里只是兜底
    pub async fn sweep_expired(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let mut inner = self.inner.write().await;
        let expired: Vec<RideRequest> = inner
            .by_id
            .values()
            .filter(|r| r.status == RequestStatus::Open && now - r.created_at > max_age)
            .cloned()
            .collect();

        for request in &expired {
            if let Some(stored) = inner.by_id.get_mut(&request.request_id) {
                stored.status = RequestStatus::Cancelled;
                stored.updated_at = now;
            }
            Self::unindex_open(&mut inner, request);
        }
        let swept = expired.len();
        drop(inner);

        if swept > 0 {
            self.bump();
        }
        swept
    }
}
