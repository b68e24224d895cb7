use std::env;
use std::str::FromStr;
use std::time::Duration;

// 所有匹配策略参数（网格精度、过期阈值、扩圈等待等）必须在
// 协作部署之间保持一致，通过环境变量统一下发
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    /// 地理网格边长，单位为度
    pub grid_resolution: f64,
    /// 司机心跳过期阈值，单位秒
    pub presence_stale_secs: u64,
    /// 订单对司机可见的新鲜窗口，单位秒
    pub request_fresh_secs: u64,
    /// 单格无结果多久后扩大到九格，单位秒
    pub expand_wait_secs: u64,
    /// 订阅周期性重算间隔，单位秒
    pub watch_refresh_secs: u64,
    pub sweep_interval_secs: u64,
    pub sweep_max_age_secs: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server_host: "0.0.0.0".into(),
            server_port: 3000,
            api_base_uri: "/api".into(),
            grid_resolution: 0.01,
            presence_stale_secs: 45,
            request_fresh_secs: 180,
            expand_wait_secs: 20,
            watch_refresh_secs: 5,
            sweep_interval_secs: 60,
            sweep_max_age_secs: 600,
            rate_limit_window_secs: 60,
            rate_limit_requests: 100,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let defaults = Config::default();
        Config {
            server_host: env::var("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            api_base_uri: env::var("API_BASE_URI").unwrap_or(defaults.api_base_uri),
            grid_resolution: env_or("GRID_RESOLUTION", defaults.grid_resolution),
            presence_stale_secs: env_or("PRESENCE_STALE_SECS", defaults.presence_stale_secs),
            request_fresh_secs: env_or("REQUEST_FRESH_SECS", defaults.request_fresh_secs),
            expand_wait_secs: env_or("EXPAND_WAIT_SECS", defaults.expand_wait_secs),
            watch_refresh_secs: env_or("WATCH_REFRESH_SECS", defaults.watch_refresh_secs),
            sweep_interval_secs: env_or("SWEEP_INTERVAL_SECS", defaults.sweep_interval_secs),
            sweep_max_age_secs: env_or("SWEEP_MAX_AGE_SECS", defaults.sweep_max_age_secs),
            rate_limit_window_secs: env_or("RATE_LIMIT_WINDOW", defaults.rate_limit_window_secs),
            rate_limit_requests: env_or("RATE_LIMIT_REQUESTS", defaults.rate_limit_requests),
        }
    }

    pub fn presence_staleness(&self) -> Duration {
        Duration::from_secs(self.presence_stale_secs)
    }

    pub fn request_freshness(&self) -> Duration {
        Duration::from_secs(self.request_fresh_secs)
    }

    pub fn expand_wait(&self) -> Duration {
        Duration::from_secs(self.expand_wait_secs)
    }

    pub fn watch_refresh(&self) -> Duration {
        Duration::from_secs(self.watch_refresh_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn sweep_max_age(&self) -> Duration {
        Duration::from_secs(self.sweep_max_age_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}
