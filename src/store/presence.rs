use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, watch};

// 司机在线状态记录，心跳时整条覆盖，不保留历史
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverPresence {
    pub driver_id: String,
    pub cell_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// 单调递增的心跳序号，乱序到达的旧心跳会被忽略
    pub seq: u64,
    pub last_heartbeat_at: DateTime<Utc>,
    /// 接单途中携带当前行程 id，此时不参与派单
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_ride_id: Option<String>,
}

impl DriverPresence {
    fn is_fresh(&self, now: DateTime<Utc>, staleness: Duration) -> bool {
        now - self.last_heartbeat_at <= staleness
    }
}

#[derive(Default)]
struct PresenceInner {
    by_driver: HashMap<String, DriverPresence>,
    // cell_id -> driver_id 二级索引，保证同一司机只出现在一个格里
    by_cell: HashMap<String, HashSet<String>>,
}

pub struct PresenceStore {
    inner: RwLock<PresenceInner>,
    staleness: Duration,
    // 每次写入递增，订阅方据此判断是否需要重查
    version: watch::Sender<u64>,
}

impl PresenceStore {
    pub fn new(staleness: std::time::Duration) -> Self {
        PresenceStore {
            inner: RwLock::new(PresenceInner::default()),
            staleness: Duration::from_std(staleness).unwrap_or_else(|_| Duration::seconds(45)),
            version: watch::Sender::new(0),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }

    /// 按 driver_id 插入或覆盖。换格时同一逻辑操作内迁移二级索引，
    /// 序号不大于已存记录的写入被忽略并返回 false
    pub async fn upsert(&self, presence: DriverPresence) -> bool {
        let mut inner = self.inner.write().await;

        let prior = inner
            .by_driver
            .get(&presence.driver_id)
            .map(|e| (e.seq, e.cell_id.clone()));
        if let Some((stored_seq, old_cell)) = prior {
            if stored_seq >= presence.seq {
                tracing::debug!(
                    driver_id = %presence.driver_id,
                    stored_seq,
                    incoming_seq = presence.seq,
                    "忽略乱序心跳"
                );
                return false;
            }
            if old_cell != presence.cell_id {
                let emptied = inner
                    .by_cell
                    .get_mut(&old_cell)
                    .map(|members| {
                        members.remove(&presence.driver_id);
                        members.is_empty()
                    })
                    .unwrap_or(false);
                if emptied {
                    inner.by_cell.remove(&old_cell);
                }
            }
        }

        inner
            .by_cell
            .entry(presence.cell_id.clone())
            .or_default()
            .insert(presence.driver_id.clone());
        inner
            .by_driver
            .insert(presence.driver_id.clone(), presence);
        drop(inner);

        self.bump();
        true
    }

    /// 幂等删除
    pub async fn remove(&self, driver_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        let Some(existing) = inner.by_driver.remove(driver_id) else {
            return false;
        };
        let emptied = inner
            .by_cell
            .get_mut(&existing.cell_id)
            .map(|members| {
                members.remove(driver_id);
                members.is_empty()
            })
            .unwrap_or(false);
        if emptied {
            inner.by_cell.remove(&existing.cell_id);
        }
        drop(inner);

        self.bump();
        true
    }

    /// 给定格集合内未过期司机数。过期在读取时对当前时钟判定，
    /// 被杀掉的客户端超过阈值后自然从计数里消失
    pub async fn count_in_cells(&self, cells: &HashSet<String>, now: DateTime<Utc>) -> usize {
        let inner = self.inner.read().await;
        cells
            .iter()
            .filter_map(|cell| inner.by_cell.get(cell))
            .flatten()
            .filter_map(|id| inner.by_driver.get(id))
            .filter(|p| p.is_fresh(now, self.staleness))
            .count()
    }

    /// 同样的过期过滤，调用方自行排除接单途中的司机
    pub async fn list_in_cells(
        &self,
        cells: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> Vec<DriverPresence> {
        let inner = self.inner.read().await;
        let mut drivers: Vec<DriverPresence> = cells
            .iter()
            .filter_map(|cell| inner.by_cell.get(cell))
            .flatten()
            .filter_map(|id| inner.by_driver.get(id))
            .filter(|p| p.is_fresh(now, self.staleness))
            .cloned()
            .collect();
        drivers.sort_by(|a, b| a.driver_id.cmp(&b.driver_id));
        drivers
    }

    pub async fn get(&self, driver_id: &str) -> Option<DriverPresence> {
        self.inner.read().await.by_driver.get(driver_id).cloned()
    }
}
