//! 服务层：长连接订阅与业务编排。权威状态全在存储层，
//! 服务只持有进行中的订阅任务。

mod presence;
mod request;

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use presence::PresenceService;
pub use request::RequestService;

/// 后台求值任务 + 接收端。句柄被丢弃时任务随即中止，
/// 保证订阅方断开后服务端资源在一个刷新周期内释放
pub struct WatchStream<T> {
    rx: mpsc::Receiver<T>,
    task: JoinHandle<()>,
}

impl<T> WatchStream<T> {
    pub(crate) fn new(rx: mpsc::Receiver<T>, task: JoinHandle<()>) -> Self {
        WatchStream { rx, task }
    }

    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

impl<T> Stream for WatchStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl<T> Drop for WatchStream<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// 司机数订阅
pub type CountWatch = WatchStream<usize>;
/// 可见 open 请求列表订阅
pub type RequestWatch = WatchStream<Vec<crate::store::RideRequest>>;
