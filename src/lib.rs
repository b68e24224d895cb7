use std::sync::Arc;

use config::Config;
use geocell::CellGrid;
use service::{PresenceService, RequestService};
use store::{PresenceStore, RequestStore};

pub mod config;
pub mod error;
pub mod geocell;
pub mod middleware;
pub mod routes;
pub mod service;
pub mod store;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub grid: CellGrid,
    pub presence: Arc<PresenceService>,
    pub requests: Arc<RequestService>,
}

impl AppState {
    /// 组装存储与服务。句柄在连接处理器之间显式传递，
    /// 不存在进程级可变全局
    pub fn new(config: Config) -> Self {
        let presence_store = Arc::new(PresenceStore::new(config.presence_staleness()));
        let request_store = Arc::new(RequestStore::new());
        let presence = Arc::new(PresenceService::new(presence_store, &config));
        let requests = Arc::new(RequestService::new(request_store, &config));
        let grid = CellGrid::new(config.grid_resolution);
        AppState {
            config,
            grid,
            presence,
            requests,
        }
    }
}
