use std::sync::atomic::{AtomicU64, Ordering};

/// 流水线计数器（各线程原子累加）
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub packets_read: AtomicU64,
    pub packets_decoded: AtomicU64,
    /// 停止时从队列中清理掉的数据包
    pub packets_discarded: AtomicU64,
    pub frames_decoded: AtomicU64,
    /// 帧队列满而丢弃的帧
    pub frames_dropped: AtomicU64,
    pub frames_presented: AtomicU64,
    /// 非视频帧、取消或停止时清理掉的帧
    pub frames_discarded: AtomicU64,
}

/// 计数器快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub packets_read: u64,
    pub packets_decoded: u64,
    pub packets_discarded: u64,
    pub frames_decoded: u64,
    pub frames_dropped: u64,
    pub frames_presented: u64,
    pub frames_discarded: u64,
}

impl PipelineStats {
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            packets_read: self.packets_read.load(Ordering::Relaxed),
            packets_decoded: self.packets_decoded.load(Ordering::Relaxed),
            packets_discarded: self.packets_discarded.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_presented: self.frames_presented.load(Ordering::Relaxed),
            frames_discarded: self.frames_discarded.load(Ordering::Relaxed),
        }
    }
}
