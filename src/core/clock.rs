use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 呈现时钟 - 单调时钟，用于视频帧定时
///
/// 每次开始渲染时重置为 0，渲染线程用 `elapsed()` 与帧的呈现时间比较
#[derive(Clone)]
pub struct PresentationClock {
    inner: Arc<Mutex<ClockInner>>,
}

struct ClockInner {
    base_instant: Instant, // 基准时刻（对应 0 秒）
}

impl PresentationClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockInner {
                base_instant: Instant::now(),
            })),
        }
    }

    /// 重置到 0
    pub fn reset(&self) {
        self.inner.lock().base_instant = Instant::now();
    }

    /// 自上次重置以来经过的时间
    pub fn elapsed(&self) -> Duration {
        self.inner.lock().base_instant.elapsed()
    }

    /// 距离呈现时间还需等待多久，已经到期返回 None
    pub fn delay_until(&self, presentation_seconds: f64) -> Option<Duration> {
        let delay = presentation_seconds - self.elapsed().as_secs_f64();
        if delay > 0.0 {
            Duration::try_from_secs_f64(delay).ok()
        } else {
            None
        }
    }
}

impl Default for PresentationClock {
    fn default() -> Self {
        Self::new()
    }
}
