use crate::core::{
    log_ctx, BoundedQueue, CancelToken, ContainerInfo, DemuxerConfig, EventSink, Offer, Packet,
    PipelineStats, PlayerError, Result, Stage,
};
use crate::player::backend::{Container, ContainerBackend};
use crate::player::worker::WorkerThread;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// 解封装器 - 负责打开容器并在独立线程中读取数据包
///
/// - 打开的容器在空闲时由解封装器持有，读取期间移交给读取线程，停止时 join 取回
/// - 数据包写入有界队列，队列超过高水位时读取线程暂停（背压）
pub struct Demuxer {
    backend: Arc<dyn ContainerBackend>,
    packets: Arc<BoundedQueue<Packet>>,
    config: DemuxerConfig,
    events: EventSink,
    stats: Arc<PipelineStats>,
    state: Mutex<DemuxerState>,
}

#[derive(Default)]
struct DemuxerState {
    container: Option<Box<dyn Container>>,
    info: Option<ContainerInfo>,
    reader: Option<WorkerThread<Box<dyn Container>>>,
}

impl Demuxer {
    pub fn new(
        backend: Arc<dyn ContainerBackend>,
        config: DemuxerConfig,
        events: EventSink,
        stats: Arc<PipelineStats>,
    ) -> Self {
        let packets = Arc::new(BoundedQueue::new(
            config.packet_queue_capacity,
            config.packet_high_watermark,
        ));
        Self {
            backend,
            packets,
            config,
            events,
            stats,
            state: Mutex::new(DemuxerState::default()),
        }
    }

    /// 数据包队列（解码器的输入）
    pub fn packet_queue(&self) -> Arc<BoundedQueue<Packet>> {
        self.packets.clone()
    }

    /// 打开媒体文件
    ///
    /// 先关闭之前的容器；任何失败都不会留下打开的资源
    pub fn open(&self, path: &Path) -> Result<ContainerInfo> {
        self.close();
        info!("{} 正在打开文件: {}", log_ctx(), path.display());
        self.events
            .info(Stage::Demuxer, format!("Opening {}", path.display()));

        let container = match self.probe(path) {
            Ok(container) => container,
            Err(e) => {
                error!("{} ❌ {}", log_ctx(), e);
                self.events.error(Stage::Demuxer, e);
                return Err(PlayerError::OpenError(path.display().to_string()));
            }
        };

        let info = container.info().clone();
        {
            let mut state = self.state.lock();
            state.container = Some(container);
            state.info = Some(info.clone());
        }

        info!("{} 📎 媒体信息:\n{}", log_ctx(), info);
        self.events
            .info(Stage::Demuxer, format!("File {} opened", path.display()));
        self.events.info(Stage::Demuxer, info.to_string());
        Ok(info)
    }

    /// 打开并校验容器，失败时容器随 `Box` 一起释放
    fn probe(&self, path: &Path) -> Result<Box<dyn Container>> {
        if !path.is_file() {
            return Err(PlayerError::OpenError(format!(
                "文件不存在: {}",
                path.display()
            )));
        }

        let container = self.backend.open(path).map_err(|e| match e {
            PlayerError::OpenError(_) => e,
            other => PlayerError::OpenError(other.to_string()),
        })?;

        let info = container.info();
        if info.streams.is_empty() {
            return Err(PlayerError::OpenError(format!(
                "没有找到任何流: {}",
                path.display()
            )));
        }
        if !info.has_unique_indices() {
            return Err(PlayerError::OpenError(format!(
                "流索引重复: {}",
                path.display()
            )));
        }
        Ok(container)
    }

    /// 启动读取线程
    pub fn start_reading(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.stop_reading_locked(&mut state);

        let mut container = match state.container.take() {
            Some(container) => container,
            None => {
                return Err(PlayerError::OpenError("没有打开的文件".to_string()));
            }
        };

        let packets = self.packets.clone();
        let config = self.config.clone();
        let events = self.events.clone();
        let stats = self.stats.clone();
        let spawned = WorkerThread::spawn("demuxer-reader", move |token| {
            read_loop(&mut *container, &packets, &config, &events, &stats, &token);
            container
        });

        match spawned {
            Ok(reader) => {
                self.events.info(Stage::Demuxer, "Start reading");
                state.reader = Some(reader);
                Ok(())
            }
            Err(e) => {
                // 线程没有启动，容器已随闭包释放
                error!("{} ❌ {}", log_ctx(), e);
                state.info = None;
                self.events.error(Stage::Demuxer, e.clone().into());
                Err(e.into())
            }
        }
    }

    /// 停止读取（可重复调用）
    pub fn stop_reading(&self) {
        let mut state = self.state.lock();
        self.stop_reading_locked(&mut state);
    }

    /// 取消 → join → 清空队列 → 释放取消信号
    fn stop_reading_locked(&self, state: &mut DemuxerState) {
        let Some(mut reader) = state.reader.take() else {
            return;
        };

        info!("{} ⏹️  停止读取", log_ctx());
        self.events.info(Stage::Demuxer, "Stop reading");
        match reader.stop() {
            Ok(container) => state.container = Some(container),
            Err(e) => {
                // 读取线程异常退出，容器已丢失
                error!("{} ❌ {}", log_ctx(), e);
                state.info = None;
                self.events.error(Stage::Demuxer, e);
            }
        }

        let drained = self.packets.drain();
        if drained > 0 {
            PipelineStats::add(&self.stats.packets_discarded, drained as u64);
            info!("{} 🗑️  清空数据包队列: {} 个包", log_ctx(), drained);
        }
        drop(reader);
    }

    /// 关闭文件（可重复调用）
    pub fn close(&self) {
        let mut state = self.state.lock();
        let was_open = state.info.is_some() || state.container.is_some();
        self.stop_reading_locked(&mut state);
        state.container = None;
        state.info = None;
        if was_open {
            info!("{} 📁 文件已关闭", log_ctx());
            self.events.info(Stage::Demuxer, "File closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().info.is_some()
    }

    pub fn is_reading(&self) -> bool {
        self.state.lock().reader.is_some()
    }

    /// 当前容器信息快照
    pub fn info(&self) -> Option<ContainerInfo> {
        self.state.lock().info.clone()
    }
}

impl Drop for Demuxer {
    fn drop(&mut self) {
        self.close();
    }
}

/// 读取循环（在独立线程中运行）
///
/// - 队列超过高水位：等待一个轮询间隔，不分配新的包
/// - EOF 或读取错误：退出循环（EOF 不算错误）
fn read_loop(
    container: &mut dyn Container,
    packets: &BoundedQueue<Packet>,
    config: &DemuxerConfig,
    events: &EventSink,
    stats: &PipelineStats,
    token: &CancelToken,
) {
    info!(
        "{} 🎬 读取线程启动: {}",
        log_ctx(),
        container.info().path.display()
    );

    let mut packet_count: u64 = 0;
    let mut throttled = false;
    const LOG_FIRST_N: u64 = 5;

    while !token.is_cancelled() {
        if packets.is_saturated() {
            if !throttled {
                debug!(
                    "{} 数据包队列满，等待消费 ({}/{})",
                    log_ctx(),
                    packets.len(),
                    packets.high_watermark()
                );
                throttled = true;
            }
            if token.wait(config.backpressure_poll()) {
                break;
            }
            continue;
        }
        throttled = false;

        match container.read_packet() {
            Ok(Some(packet)) => {
                packet_count += 1;
                PipelineStats::add(&stats.packets_read, 1);
                if packet_count <= LOG_FIRST_N || packet_count % 100 == 0 {
                    debug!(
                        "{} 📦 读取数据包 #{} (流 {}, 队列 {})",
                        log_ctx(),
                        packet_count,
                        packet.stream_index(),
                        packets.len()
                    );
                }
                if !push_packet(packets, packet, config, stats, token) {
                    break;
                }
            }
            Ok(None) => {
                info!("{} 📄 到达文件末尾", log_ctx());
                events.info(Stage::Demuxer, "End of stream");
                break;
            }
            Err(e) => {
                error!("{} ❌ 读取包失败: {}", log_ctx(), e);
                let e = match e {
                    PlayerError::ReadError(_) => e,
                    other => PlayerError::ReadError(other.to_string()),
                };
                events.error(Stage::Demuxer, e);
                break;
            }
        }
    }

    info!(
        "{} 🛑 读取线程退出（共读取 {} 个包）",
        log_ctx(),
        packet_count
    );
}

/// 写入队列；只有被取消时才放弃（并释放）这个包
fn push_packet(
    packets: &BoundedQueue<Packet>,
    packet: Packet,
    config: &DemuxerConfig,
    stats: &PipelineStats,
    token: &CancelToken,
) -> bool {
    let mut packet = packet;
    loop {
        match packets.offer(packet, config.backpressure_poll(), token) {
            Offer::Accepted => return true,
            Offer::Full(back) => {
                warn!("{} 数据包队列已满，继续等待", log_ctx());
                packet = back;
            }
            Offer::Cancelled(back) => {
                drop(back);
                PipelineStats::add(&stats.packets_discarded, 1);
                return false;
            }
        }
    }
}
