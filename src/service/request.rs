use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::Config;
use crate::error::AppError;
use crate::geocell::CellGrid;
use crate::service::{RequestWatch, WatchStream};
use crate::store::{RequestStore, RideLocation, RideRequest};

/// 打车请求服务：提交、按格订阅（单格起步、超时扩九格）、
/// 抢单、完成与取消
pub struct RequestService {
    store: Arc<RequestStore>,
    grid: CellGrid,
    freshness: chrono::Duration,
    expand_wait: Duration,
    watch_refresh: Duration,
    sweep_interval: Duration,
    sweep_max_age: chrono::Duration,
}

impl RequestService {
    pub fn new(store: Arc<RequestStore>, config: &Config) -> Self {
        RequestService {
            store,
            grid: CellGrid::new(config.grid_resolution),
            freshness: chrono::Duration::from_std(config.request_freshness())
                .unwrap_or_else(|_| chrono::Duration::seconds(180)),
            expand_wait: config.expand_wait(),
            watch_refresh: config.watch_refresh(),
            sweep_interval: config.sweep_interval(),
            sweep_max_age: chrono::Duration::from_std(config.sweep_max_age())
                .unwrap_or_else(|_| chrono::Duration::seconds(600)),
        }
    }

    fn validate(&self, location: &RideLocation) -> Result<String, AppError> {
        self.grid.cell_id(location.latitude, location.longitude)
    }

    /// 乘客提交请求。上车点与目的地坐标都先过索引校验，
    /// 请求按上车点所在格分区落库
    pub async fn submit(
        &self,
        client_id: String,
        pickup: RideLocation,
        dropoff: Option<RideLocation>,
    ) -> Result<RideRequest, AppError> {
        let cell_id = self.validate(&pickup)?;
        if let Some(dropoff) = &dropoff {
            self.validate(dropoff)?;
        }

        let request = self
            .store
            .create(None, client_id, pickup, dropoff, cell_id)
            .await;
        tracing::info!(
            request_id = %request.request_id,
            cell_id = %request.cell_id,
            "新的打车请求"
        );
        Ok(request)
    }

    /// 抢单。输的一方拿到 RequestAlreadyTaken，其余司机的列表
    /// 会在下一次求值时自然不再包含该请求，无需额外广播
    pub async fn accept(
        &self,
        request_id: &str,
        driver_id: &str,
    ) -> Result<RideRequest, AppError> {
        let claimed = self.store.claim(request_id, driver_id).await?;
        tracing::info!(request_id, driver_id, "抢单成功");
        Ok(claimed)
    }

    pub async fn complete(&self, request_id: &str) -> Result<RideRequest, AppError> {
        self.store.complete(request_id).await
    }

    pub async fn cancel(&self, request_id: &str) -> Result<RideRequest, AppError> {
        self.store.cancel(request_id).await
    }

    pub async fn get(&self, request_id: &str) -> Result<RideRequest, AppError> {
        self.store
            .get(request_id)
            .await
            .ok_or_else(|| AppError::RequestNotFound(request_id.to_string()))
    }

    /// 九格内仍然新鲜的 open 请求快照（无 SSE 能力的客户端轮询用）
    pub async fn open_requests_near(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Vec<RideRequest>, AppError> {
        let cells = self.grid.cell_with_neighbors(latitude, longitude)?;
        let now = Utc::now();
        Ok(self
            .store
            .list_open_in_cells(&cells)
            .await
            .into_iter()
            .filter(|r| r.is_fresh(now, self.freshness))
            .collect())
    }

    /// 司机侧的核心匹配订阅。先只看所在的单格；等待窗口内一直
    /// 没有可见请求就自动扩到九格并保持，直到订阅被丢弃。
    /// 每次下发都是新鲜过滤后的 open 列表，内容不变不重复下发
    pub fn watch_open_requests(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<RequestWatch, AppError> {
        let single: std::collections::HashSet<String> =
            [self.grid.cell_id(latitude, longitude)?].into();
        let nine = self.grid.cell_with_neighbors(latitude, longitude)?;

        let store = self.store.clone();
        let freshness = self.freshness;
        let expand_wait = self.expand_wait;
        let refresh = self.watch_refresh;
        let (tx, rx) = mpsc::channel(16);

        let task = tokio::spawn(async move {
            let mut version_rx = store.subscribe();
            let mut ticker = tokio::time::interval(refresh);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut expand = Box::pin(tokio::time::sleep(expand_wait));
            let mut expanded = false;
            let mut cells = single;
            let mut last_ids: Option<Vec<String>> = None;

            loop {
                tokio::select! {
                    changed = version_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {}
                    _ = &mut expand, if !expanded => {
                        tracing::debug!("单格等待超时，扩大到九格");
                        expanded = true;
                        cells = nine.clone();
                    }
                }

                let now = Utc::now();
                let visible: Vec<RideRequest> = store
                    .list_open_in_cells(&cells)
                    .await
                    .into_iter()
                    .filter(|r| r.is_fresh(now, freshness))
                    .collect();

                // 单格阶段只要还有可见请求就推迟扩圈计时
                if !expanded && !visible.is_empty() {
                    expand.as_mut().reset(Instant::now() + expand_wait);
                }

                let ids: Vec<String> = visible.iter().map(|r| r.request_id.clone()).collect();
                if last_ids.as_ref() != Some(&ids) {
                    if tx.send(visible).await.is_err() {
                        break;
                    }
                    last_ids = Some(ids);
                }
            }
        });

        Ok(WatchStream::new(rx, task))
    }

    /// 后台回收任务：周期性把过旧的 open 请求置为 cancelled
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let store = self.store.clone();
        let interval = self.sweep_interval;
        let max_age = self.sweep_max_age;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let swept = store.sweep_expired(Utc::now(), max_age).await;
                if swept > 0 {
                    tracing::info!(swept, "回收过期的打车请求");
                }
            }
        })
    }
}
