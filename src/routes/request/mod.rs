mod handler;
mod model;

pub use handler::{accept, cancel, complete, open_requests, submit, watch_requests};
