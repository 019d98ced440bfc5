//! 协作式取消信号
//!
//! `CancelHandle` 持有通道的发送端，drop 或调用 `cancel` 即关闭通道；
//! `CancelToken` 持有接收端，可阻塞等待，也可放进 `crossbeam::select!` 中

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

/// 创建一对取消句柄和取消令牌
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (sender, receiver) = channel::bounded(0);
    (
        CancelHandle {
            sender: Some(sender),
        },
        CancelToken { receiver },
    )
}

/// 取消句柄，drop 时自动触发取消
#[derive(Debug)]
pub struct CancelHandle {
    sender: Option<Sender<()>>,
}

impl CancelHandle {
    /// 触发取消，所有克隆的令牌都会收到信号
    pub fn cancel(mut self) {
        self.sender.take();
    }
}

/// 取消令牌
#[derive(Debug, Clone)]
pub struct CancelToken {
    receiver: Receiver<()>,
}

impl CancelToken {
    /// 阻塞直到被取消
    pub fn cancelled(&self) {
        // 发送端从不发送数据，recv 只会在通道关闭时返回
        let _ = self.receiver.recv();
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.receiver.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// 最多等待 `timeout`，期间被取消返回 true
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        !matches!(
            self.receiver.recv_timeout(timeout),
            Err(RecvTimeoutError::Timeout)
        )
    }

    /// 底层接收端，用于 `crossbeam::select!`
    pub fn receiver(&self) -> &Receiver<()> {
        &self.receiver
    }
}
