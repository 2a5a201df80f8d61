// 取消信号：发送端被 drop 后，所有接收端立刻断开

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

/// 取消源，由停止线程的一方持有
pub struct CancelSource {
    tx: Option<Sender<()>>,
    rx: Receiver<()>,
}

/// 取消令牌，交给工作线程，在每个阻塞等待点检查
#[derive(Clone)]
pub struct CancelToken {
    rx: Receiver<()>,
}

impl CancelSource {
    pub fn new() -> Self {
        // 通道里永远不会有消息，只用“断开”这一个状态
        let (tx, rx) = bounded(0);
        Self { tx: Some(tx), rx }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.rx.clone(),
        }
    }

    /// 发出取消信号（可重复调用）
    pub fn cancel(&mut self) {
        self.tx.take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.tx.is_none()
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// 等待一段时间，期间被取消则提前返回 true
    pub fn wait(&self, timeout: Duration) -> bool {
        matches!(
            self.rx.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }

    /// 供 `select!` 使用的接收端
    pub(crate) fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}
