use crate::core::{
    log_ctx, BoundedQueue, CancelToken, DecoderConfig, DroppedFramePolicy, EventSink, Frame,
    MediaKind, Offer, Packet, PipelineStats, PlayerError, Result, Stage, StreamDescriptor, Take,
};
use crate::player::backend::DecodeBackend;
use crate::player::codec::CodecUnit;
use crate::player::worker::WorkerThread;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// 流索引 → 解码单元
type CodecMap = HashMap<usize, CodecUnit>;

/// 解码器 - 从数据包队列取包，按流索引路由到解码单元，把帧写入帧队列
pub struct Decoder {
    backend: Arc<dyn DecodeBackend>,
    packets: Arc<BoundedQueue<Packet>>,
    frames: Arc<BoundedQueue<Frame>>,
    config: DecoderConfig,
    events: EventSink,
    stats: Arc<PipelineStats>,
    worker: Mutex<Option<WorkerThread<CodecMap>>>,
}

impl Decoder {
    pub fn new(
        backend: Arc<dyn DecodeBackend>,
        packets: Arc<BoundedQueue<Packet>>,
        config: DecoderConfig,
        events: EventSink,
        stats: Arc<PipelineStats>,
    ) -> Self {
        let frames = Arc::new(BoundedQueue::new(
            config.frame_queue_capacity,
            config.frame_high_watermark,
        ));
        Self {
            backend,
            packets,
            frames,
            config,
            events,
            stats,
            worker: Mutex::new(None),
        }
    }

    /// 帧队列（呈现端的输入）
    pub fn frame_queue(&self) -> Arc<BoundedQueue<Frame>> {
        self.frames.clone()
    }

    /// 为音视频流创建解码单元并启动解码线程
    ///
    /// 没有任何可用的解码单元时返回 `NoDecodableStream`，不启动线程
    pub fn start_decoding(&self, streams: &[StreamDescriptor]) -> Result<()> {
        let mut worker = self.worker.lock();
        self.stop_locked(&mut worker);

        let mut codecs = CodecMap::new();
        for stream in streams.iter().filter(|s| s.kind.is_decodable()) {
            let unit = CodecUnit::new(stream, self.backend.as_ref(), self.events.clone());
            if unit.is_ready() {
                codecs.insert(stream.index, unit);
            }
        }

        if codecs.is_empty() {
            error!("{} ❌ 没有可用的解码器", log_ctx());
            self.events
                .error(Stage::Decoder, PlayerError::NoDecodableStream);
            return Err(PlayerError::NoDecodableStream);
        }

        let mut indices: Vec<usize> = codecs.keys().copied().collect();
        indices.sort_unstable();
        info!("{} 🎞️ 解码流: {:?}", log_ctx(), indices);

        let packets = self.packets.clone();
        let frames = self.frames.clone();
        let config = self.config.clone();
        let events = self.events.clone();
        let stats = self.stats.clone();
        let spawned = WorkerThread::spawn("decoder", move |token| {
            let mut codecs = codecs;
            decode_loop(
                &mut codecs,
                &packets,
                &frames,
                &config,
                &events,
                &stats,
                &token,
            );
            codecs
        });

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                self.events.info(Stage::Decoder, "Start decoding");
                Ok(())
            }
            Err(e) => {
                error!("{} ❌ {}", log_ctx(), e);
                self.events.error(Stage::Decoder, e.clone().into());
                Err(e.into())
            }
        }
    }

    /// 停止解码（可重复调用）
    pub fn stop_decoding(&self) {
        let mut worker = self.worker.lock();
        self.stop_locked(&mut worker);
    }

    /// 取消 → join → 清空数据包队列 → 释放解码单元 → 释放取消信号
    fn stop_locked(&self, worker: &mut Option<WorkerThread<CodecMap>>) {
        let Some(mut handle) = worker.take() else {
            return;
        };

        info!("{} ⏹️  停止解码", log_ctx());
        self.events.info(Stage::Decoder, "Stop decoding");
        let codecs = match handle.stop() {
            Ok(codecs) => Some(codecs),
            Err(e) => {
                error!("{} ❌ {}", log_ctx(), e);
                self.events.error(Stage::Decoder, e);
                None
            }
        };

        let drained = self.packets.drain();
        if drained > 0 {
            PipelineStats::add(&self.stats.packets_discarded, drained as u64);
            debug!("{} 🗑️  清空数据包队列: {} 个包", log_ctx(), drained);
        }

        if let Some(mut codecs) = codecs {
            for unit in codecs.values_mut() {
                unit.dispose();
            }
        }
        drop(handle);
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        self.stop_decoding();
    }
}

/// 解码循环（在独立线程中运行）
///
/// - 帧队列超过高水位时等待，不再取包
/// - 没有对应解码单元的包直接释放
/// - 帧队列在限时内仍然满时丢弃该帧
fn decode_loop(
    codecs: &mut CodecMap,
    packets: &BoundedQueue<Packet>,
    frames: &BoundedQueue<Frame>,
    config: &DecoderConfig,
    events: &EventSink,
    stats: &PipelineStats,
    token: &CancelToken,
) {
    info!("{} 🎬 解码线程启动", log_ctx());
    let mut decoded: u64 = 0;

    while !token.is_cancelled() {
        if frames.is_saturated() {
            if token.wait(config.backpressure_poll()) {
                break;
            }
            continue;
        }

        let packet = match packets.take(config.packet_take_timeout(), token) {
            Take::Item(packet) => packet,
            Take::TimedOut => continue,
            Take::Cancelled => break,
        };

        let Some(unit) = codecs.get_mut(&packet.stream_index()) else {
            // 没有解码单元的流（字幕、数据流或初始化失败）
            PipelineStats::add(&stats.packets_discarded, 1);
            continue;
        };

        let produced = unit.decode(&packet);
        decoded += 1;
        PipelineStats::add(&stats.packets_decoded, 1);
        drop(packet);

        PipelineStats::add(&stats.frames_decoded, produced.len() as u64);
        let mut produced = produced.into_iter();
        let mut cancelled = false;
        for frame in produced.by_ref() {
            let stream_index = frame.stream_index();
            let kind = frame.kind();
            match frames.offer(frame, config.frame_offer_timeout(), token) {
                Offer::Accepted => {}
                Offer::Full(frame) => {
                    drop(frame);
                    PipelineStats::add(&stats.frames_dropped, 1);
                    report_dropped(events, config.dropped_frames, stream_index, kind);
                }
                Offer::Cancelled(frame) => {
                    drop(frame);
                    PipelineStats::add(&stats.frames_discarded, 1);
                    cancelled = true;
                    break;
                }
            }
        }
        if cancelled {
            // 同一个包剩余的帧直接释放
            let remaining = produced.count();
            PipelineStats::add(&stats.frames_discarded, remaining as u64);
            break;
        }

        if decoded % 100 == 0 {
            debug!(
                "{} 已解码 {} 个包，帧队列 {}",
                log_ctx(),
                decoded,
                frames.len()
            );
        }
    }

    info!("{} 🛑 解码线程退出（共解码 {} 个包）", log_ctx(), decoded);
}

fn report_dropped(events: &EventSink, policy: DroppedFramePolicy, stream: usize, kind: MediaKind) {
    match policy {
        DroppedFramePolicy::Silent => {
            debug!("{} 帧队列已满，丢弃 {} 帧 (流 #{})", log_ctx(), kind, stream);
        }
        DroppedFramePolicy::Report => {
            warn!("{} ⚠️ 帧队列已满，丢弃 {} 帧 (流 #{})", log_ctx(), kind, stream);
            events.error(Stage::Decoder, PlayerError::FrameDropped(stream));
        }
    }
}
