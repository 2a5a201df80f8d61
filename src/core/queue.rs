// 有界队列：解封装 → 解码（数据包），解码 → 呈现（帧）

use crate::core::CancelToken;
use crossbeam_channel::{bounded, select, Receiver, SendTimeoutError, Sender};
use std::time::{Duration, Instant};

/// 阻塞取出的结果
#[derive(Debug)]
pub enum Take<T> {
    Item(T),
    TimedOut,
    Cancelled,
}

/// 限时投递的结果，未投递的元素会交还给调用方
#[derive(Debug)]
pub enum Offer<T> {
    Accepted,
    Full(T),
    Cancelled(T),
}

/// 有界队列
///
/// - 容量由 crossbeam 有界通道保证，队列本身永远不会无限增长
/// - `high_watermark` 用于背压：长度超过它时生产者应暂停，而不是继续分配
/// - 队列同时持有发送端和接收端，因此任何一方都可以在停止时清空它
pub struct BoundedQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    high_watermark: usize,
}

/// 投递时每次等待的最长时间，期间检查取消
const OFFER_SLICE: Duration = Duration::from_millis(20);

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize, high_watermark: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            high_watermark,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(0)
    }

    pub fn high_watermark(&self) -> usize {
        self.high_watermark
    }

    /// 长度超过高水位，生产者应暂停
    pub fn is_saturated(&self) -> bool {
        self.len() > self.high_watermark
    }

    /// 限时投递：队列满时最多等待 `timeout`，被取消时立即交还元素
    pub fn offer(&self, item: T, timeout: Duration, cancel: &CancelToken) -> Offer<T> {
        let deadline = Instant::now() + timeout;
        let mut item = item;
        loop {
            if cancel.is_cancelled() {
                return Offer::Cancelled(item);
            }
            let slice = deadline.saturating_duration_since(Instant::now()).min(OFFER_SLICE);
            match self.tx.send_timeout(item, slice) {
                Ok(()) => return Offer::Accepted,
                Err(SendTimeoutError::Timeout(back)) => {
                    if Instant::now() >= deadline {
                        return Offer::Full(back);
                    }
                    item = back;
                }
                // 队列自己持有接收端，不会断开
                Err(SendTimeoutError::Disconnected(back)) => return Offer::Full(back),
            }
        }
    }

    /// 阻塞取出一个元素，最多等待 `timeout`，期间可被取消
    pub fn take(&self, timeout: Duration, cancel: &CancelToken) -> Take<T> {
        if cancel.is_cancelled() {
            return Take::Cancelled;
        }
        select! {
            recv(self.rx) -> msg => match msg {
                Ok(item) => Take::Item(item),
                Err(_) => Take::TimedOut,
            },
            recv(cancel.receiver()) -> _ => Take::Cancelled,
            default(timeout) => Take::TimedOut,
        }
    }

    /// 非阻塞取出
    pub fn try_take(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// 清空队列，drop（释放）所有剩余元素，返回数量
    pub fn drain(&self) -> usize {
        let mut count = 0;
        while let Ok(item) = self.rx.try_recv() {
            drop(item);
            count += 1;
        }
        count
    }
}
