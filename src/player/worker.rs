use crate::core::{log_ctx, CancelSource, CancelToken, PlayerError, Result, SpawnError};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use log::{info, warn};
use std::any::Any;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// 限时停止的结果
pub enum StopOutcome<R> {
    /// 线程正常结束，带回返回值
    Finished(R),
    Panicked(String),
    /// 超时仍未结束，线程被分离，取消信号保持有效
    TimedOut,
}

/// 后台工作线程管理器
///
/// - 每个线程有独立的取消信号，线程在每个阻塞等待点检查
/// - stop() 先发出取消，再 join，把线程独占的资源（返回值）交还给调用方
/// - 线程退出时 drop 完成信号的发送端，用于限时等待
pub struct WorkerThread<R> {
    name: String,
    cancel: CancelSource,
    handle: Option<JoinHandle<R>>,
    done_rx: Receiver<()>,
}

impl<R: Send + 'static> WorkerThread<R> {
    /// 启动命名线程
    pub fn spawn<F>(name: &str, f: F) -> std::result::Result<Self, SpawnError>
    where
        F: FnOnce(CancelToken) -> R + Send + 'static,
    {
        let cancel = CancelSource::new();
        let token = cancel.token();
        let (done_tx, done_rx) = bounded::<()>(0);

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                // 线程结束（包括 panic 展开）时 drop，通知等待方
                let _done = done_tx;
                f(token)
            })
            .map_err(|e| SpawnError {
                thread: name.to_string(),
                reason: e.to_string(),
            })?;

        info!("{} 🚀 线程 {} 已启动", log_ctx(), name);
        Ok(Self {
            name: name.to_string(),
            cancel,
            handle: Some(handle),
            done_rx,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 线程是否已经结束
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map(|h| h.is_finished()).unwrap_or(true)
    }

    /// 发出取消并等待线程结束
    ///
    /// 取消源随 `WorkerThread` 一起 drop，调用方可以在清空队列之后再 drop 它
    pub fn stop(&mut self) -> Result<R> {
        self.cancel.cancel();
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => return Err(PlayerError::ThreadPanicked(format!("{} 已停止", self.name))),
        };
        let result = handle
            .join()
            .map_err(|e| PlayerError::ThreadPanicked(format!("{}: {}", self.name, panic_message(&*e))));
        info!("{} ✅ 线程 {} 已结束", log_ctx(), self.name);
        result
    }

    /// 发出取消并最多等待 `timeout`
    pub fn stop_timeout(&mut self, timeout: Duration) -> StopOutcome<R> {
        self.cancel.cancel();
        match self.done_rx.recv_timeout(timeout) {
            // 通道里不会有消息，断开表示线程已退出
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "{} ⚠️ 线程 {} 未能在 {:?} 内停止，已分离",
                    log_ctx(),
                    self.name,
                    timeout
                );
                // 分离线程：它持有的 Arc 资源会在它最终退出时释放
                self.handle.take();
                return StopOutcome::TimedOut;
            }
        }
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(value) => {
                    info!("{} ✅ 线程 {} 已结束", log_ctx(), self.name);
                    StopOutcome::Finished(value)
                }
                Err(e) => StopOutcome::Panicked(panic_message(&*e)),
            },
            None => StopOutcome::TimedOut,
        }
    }
}

impl<R> Drop for WorkerThread<R> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            warn!(
                "{} ⚠ 线程 {} 被 drop，但未调用 stop()，正在尝试停止",
                log_ctx(),
                self.name
            );
            self.cancel.cancel();
            let _ = handle.join();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
