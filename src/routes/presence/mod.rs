mod handler;
mod model;

pub use handler::{count, heartbeat, nearby, offline, watch_count};
