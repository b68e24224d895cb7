mod handler;
mod model;

pub use handler::cell_at;
