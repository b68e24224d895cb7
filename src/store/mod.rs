//! 内存分区存储层。司机在线状态与打车请求的唯一可变共享状态，
//! 外部只能通过这里的窄接口修改记录。

mod presence;
mod request;

pub use presence::{DriverPresence, PresenceStore};
pub use request::{RequestStatus, RequestStore, RideLocation, RideRequest};
