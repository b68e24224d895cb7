use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::Config;
use crate::error::AppError;
use crate::geocell::CellGrid;
use crate::service::{CountWatch, WatchStream};
use crate::store::{DriverPresence, PresenceStore};

/// 司机在线状态服务：心跳发布、下线、周边司机数订阅
pub struct PresenceService {
    store: Arc<PresenceStore>,
    grid: CellGrid,
    watch_refresh: Duration,
    // driver_id -> 心跳循环任务，下线时中止
    heartbeat_loops: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl PresenceService {
    pub fn new(store: Arc<PresenceStore>, config: &Config) -> Self {
        PresenceService {
            store,
            grid: CellGrid::new(config.grid_resolution),
            watch_refresh: config.watch_refresh(),
            heartbeat_loops: Mutex::new(HashMap::new()),
        }
    }

    /// 发布一次心跳。坐标在存储写入之前就被校验，
    /// 返回 false 表示乱序心跳被忽略
    pub async fn publish(
        &self,
        driver_id: &str,
        latitude: f64,
        longitude: f64,
        seq: u64,
        active_ride_id: Option<String>,
    ) -> Result<(DriverPresence, bool), AppError> {
        let cell_id = self.grid.cell_id(latitude, longitude)?;
        let presence = DriverPresence {
            driver_id: driver_id.to_string(),
            cell_id,
            latitude,
            longitude,
            seq,
            last_heartbeat_at: Utc::now(),
            active_ride_id,
        };
        let applied = self.store.upsert(presence.clone()).await;
        Ok((presence, applied))
    }

    /// 启动司机侧的循环发布：每个周期读一次位置与当前行程 id
    /// 并覆盖写入，直到 go_offline。重复启动会替换旧循环
    pub async fn start_heartbeat<L, R>(
        self: &Arc<Self>,
        driver_id: String,
        location: L,
        active_ride: R,
        interval: Duration,
    ) where
        L: Fn() -> (f64, f64) + Send + Sync + 'static,
        R: Fn() -> Option<String> + Send + Sync + 'static,
    {
        let service = self.clone();
        let loop_driver_id = driver_id.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                // 用发送时刻做序号，循环重启后仍然单调
                let seq = Utc::now().timestamp_millis() as u64;
                let (latitude, longitude) = location();
                if let Err(e) = service
                    .publish(&loop_driver_id, latitude, longitude, seq, active_ride())
                    .await
                {
                    tracing::warn!(driver_id = %loop_driver_id, error = %e, "心跳发布失败");
                }
            }
        });

        let mut loops = self.heartbeat_loops.lock().await;
        if let Some(old) = loops.insert(driver_id, handle) {
            old.abort();
        }
    }

    /// 停掉心跳循环并删除在线记录，幂等
    pub async fn go_offline(&self, driver_id: &str) {
        if let Some(handle) = self.heartbeat_loops.lock().await.remove(driver_id) {
            handle.abort();
        }
        self.store.remove(driver_id).await;
        tracing::info!(driver_id, "司机下线");
    }

    /// 九格内未过期司机数的一次性快照
    pub async fn count_nearby(&self, latitude: f64, longitude: f64) -> Result<usize, AppError> {
        let cells = self.grid.cell_with_neighbors(latitude, longitude)?;
        Ok(self.store.count_in_cells(&cells, Utc::now()).await)
    }

    /// 九格内未过期且空闲（无进行中行程）的司机列表
    pub async fn nearby_drivers(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Vec<DriverPresence>, AppError> {
        let cells = self.grid.cell_with_neighbors(latitude, longitude)?;
        let drivers = self.store.list_in_cells(&cells, Utc::now()).await;
        Ok(drivers
            .into_iter()
            .filter(|d| d.active_ride_id.is_none())
            .collect())
    }

    /// 周边司机数的实时订阅。写入变化立即重算，周期 tick 用来在
    /// 没有新写入时淘汰过期记录；计数不变则不重复下发。
    /// 订阅方换位置超过阈值后应丢弃本句柄重新订阅
    pub fn watch_driver_count(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<CountWatch, AppError> {
        let cells = self.grid.cell_with_neighbors(latitude, longitude)?;
        let store = self.store.clone();
        let refresh = self.watch_refresh;
        let (tx, rx) = mpsc::channel(16);

        let task = tokio::spawn(async move {
            let mut version_rx = store.subscribe();
            let mut ticker = tokio::time::interval(refresh);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last: Option<usize> = None;

            loop {
                let recheck = tokio::select! {
                    changed = version_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        true
                    }
                    _ = ticker.tick() => {
                        // 没有写入且上次就是 0 时，过期淘汰不可能再降低计数，
                        // 跳过这次重查
                        last != Some(0)
                    }
                };
                if !recheck {
                    continue;
                }

                let count = store.count_in_cells(&cells, Utc::now()).await;
                if last != Some(count) {
                    if tx.send(count).await.is_err() {
                        break;
                    }
                    last = Some(count);
                }
            }
        });

        Ok(WatchStream::new(rx, task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> Arc<PresenceService> {
        let config = Config::default();
        let store = Arc::new(PresenceStore::new(config.presence_staleness()));
        Arc::new(PresenceService::new(store, &config))
    }

    #[tokio::test]
    async fn publish_rejects_invalid_coordinates() {
        let service = service();
        let err = service
            .publish("d1", 95.0, 0.0, 1, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCoordinate { .. }));
        // 非法坐标不会产生任何存储写入
        assert_eq!(service.count_nearby(89.99, 0.0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn publish_then_count_roundtrip() {
        let service = service();
        service.publish("d1", 4.7410, -74.0721, 1, None).await.unwrap();
        service.publish("d2", 4.7412, -74.0720, 1, None).await.unwrap();
        assert_eq!(service.count_nearby(4.7410, -74.0721).await.unwrap(), 2);

        service.go_offline("d1").await;
        assert_eq!(service.count_nearby(4.7410, -74.0721).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn nearby_drivers_excludes_busy() {
        let service = service();
        service.publish("idle", 0.5, 0.5, 1, None).await.unwrap();
        service
            .publish("busy", 0.5, 0.5, 1, Some("ride-1".into()))
            .await
            .unwrap();

        let drivers = service.nearby_drivers(0.5, 0.5).await.unwrap();
        assert_eq!(drivers.len(), 1);
        assert_eq!(drivers[0].driver_id, "idle");
        // 接单途中的司机仍计入人数展示
        assert_eq!(service.count_nearby(0.5, 0.5).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn count_watch_reacts_to_store_changes() {
        let service = service();
        let mut watch = service.watch_driver_count(0.5, 0.5).unwrap();

        service.publish("d1", 0.5, 0.5, 1, None).await.unwrap();
        // 首个非零计数必然到达；中间可能先看到初始 0
        let mut latest = watch.recv().await.unwrap();
        if latest == 0 {
            latest = watch.recv().await.unwrap();
        }
        assert_eq!(latest, 1);

        service.go_offline("d1").await;
        assert_eq!(watch.recv().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn heartbeat_loop_publishes_until_offline() {
        let service = service();
        service
            .start_heartbeat(
                "d1".into(),
                || (0.5, 0.5),
                || None,
                Duration::from_millis(10),
            )
            .await;

        // 循环的首个 tick 立即触发
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(service.count_nearby(0.5, 0.5).await.unwrap(), 1);

        service.go_offline("d1").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(service.count_nearby(0.5, 0.5).await.unwrap(), 0);
    }
}
