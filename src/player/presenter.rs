use crate::core::{
    log_ctx, BoundedQueue, CancelToken, CancelledFramePolicy, EventSink, Frame, MediaKind,
    PipelineStats, PlayerError, PresentationClock, PresenterConfig, Result, Stage, Take,
};
use crate::player::backend::ConvertBackend;
use crate::player::video_output::VideoOutput;
use crate::player::worker::{StopOutcome, WorkerThread};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;

/// 呈现器 - 从帧队列取帧，按呈现时间定时，转换后交给显示端
///
/// 当前只显示视频帧，音频帧取出后直接释放。
/// 视频输出由渲染线程独占，停止时随线程返回值一起交还并释放
pub struct Presenter {
    frames: Arc<BoundedQueue<Frame>>,
    config: PresenterConfig,
    events: EventSink,
    stats: Arc<PipelineStats>,
    clock: PresentationClock,
    convert: Arc<dyn ConvertBackend>,
    worker: Mutex<Option<WorkerThread<VideoOutput>>>,
}

impl Presenter {
    pub fn new(
        convert: Arc<dyn ConvertBackend>,
        frames: Arc<BoundedQueue<Frame>>,
        config: PresenterConfig,
        events: EventSink,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            frames,
            config,
            events,
            stats,
            clock: PresentationClock::new(),
            convert,
            worker: Mutex::new(None),
        }
    }

    /// 重置时钟并启动渲染线程
    pub fn start_rendering(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        self.stop_locked(&mut worker);

        let mut output = VideoOutput::new(
            self.convert.clone(),
            self.config.output_format,
            self.events.clone(),
        );
        self.clock.reset();

        let frames = self.frames.clone();
        let config = self.config.clone();
        let stats = self.stats.clone();
        let clock = self.clock.clone();
        let spawned = WorkerThread::spawn("presenter", move |token| {
            render_loop(&frames, &config, &stats, &clock, &mut output, &token);
            output
        });

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                self.events.info(Stage::Presenter, "Start rendering");
                Ok(())
            }
            Err(e) => {
                error!("{} ❌ {}", log_ctx(), e);
                self.events.error(Stage::Presenter, e.clone().into());
                Err(e.into())
            }
        }
    }

    /// 停止渲染（可重复调用）
    ///
    /// 最多等待 `stop_timeout`，超时发出 RenderTimeoutError 后继续清理，
    /// 视频输出留给分离的线程在退出时释放
    pub fn stop_rendering(&self) {
        let mut worker = self.worker.lock();
        self.stop_locked(&mut worker);
    }

    fn stop_locked(&self, worker: &mut Option<WorkerThread<VideoOutput>>) {
        let Some(mut handle) = worker.take() else {
            return;
        };

        info!("{} ⏹️  停止渲染", log_ctx());
        self.events.info(Stage::Presenter, "Stop rendering");
        let timeout = self.config.stop_timeout();
        let output = match handle.stop_timeout(timeout) {
            StopOutcome::Finished(output) => Some(output),
            StopOutcome::Panicked(message) => {
                error!("{} ❌ 渲染线程异常退出: {}", log_ctx(), message);
                self.events
                    .error(Stage::Presenter, PlayerError::ThreadPanicked(message));
                None
            }
            StopOutcome::TimedOut => {
                error!("{} ❌ 渲染线程未能在 {:?} 内停止", log_ctx(), timeout);
                self.events
                    .error(Stage::Presenter, PlayerError::RenderTimeoutError(timeout));
                None
            }
        };

        let drained = self.frames.drain();
        if drained > 0 {
            PipelineStats::add(&self.stats.frames_discarded, drained as u64);
            debug!("{} 🗑️  清空帧队列: {} 帧", log_ctx(), drained);
        }

        drop(output);
        drop(handle);
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    pub fn clock(&self) -> &PresentationClock {
        &self.clock
    }
}

impl Drop for Presenter {
    fn drop(&mut self) {
        self.stop_rendering();
    }
}

/// 渲染循环（在独立线程中运行）
fn render_loop(
    frames: &BoundedQueue<Frame>,
    config: &PresenterConfig,
    stats: &PipelineStats,
    clock: &PresentationClock,
    output: &mut VideoOutput,
    token: &CancelToken,
) {
    info!("{} 🎬 渲染线程启动", log_ctx());
    let mut presented: u64 = 0;

    loop {
        let frame = match frames.take(config.frame_take_timeout(), token) {
            Take::Item(frame) => frame,
            Take::TimedOut => continue,
            Take::Cancelled => break,
        };

        if frame.kind() != MediaKind::Video {
            PipelineStats::add(&stats.frames_discarded, 1);
            continue;
        }

        let mut cancelled = false;
        if let Some(delay) = clock.delay_until(frame.presentation_seconds()) {
            cancelled = token.wait(delay);
        }
        if cancelled && config.cancelled_frames == CancelledFramePolicy::SkipDisplay {
            PipelineStats::add(&stats.frames_discarded, 1);
            break;
        }

        let shown = output.render(&frame);
        drop(frame);

        if shown {
            presented += 1;
            PipelineStats::add(&stats.frames_presented, 1);
            if presented <= 3 || presented % 100 == 0 {
                debug!(
                    "{} 🖼️ 显示第 {} 帧 (时钟 {:.3}s)",
                    log_ctx(),
                    presented,
                    clock.elapsed().as_secs_f64()
                );
            }
        } else {
            warn!("{} 视频帧未能显示", log_ctx());
        }

        if cancelled {
            break;
        }
    }

    info!("{} 🛑 渲染线程退出（共显示 {} 帧）", log_ctx(), presented);
}
