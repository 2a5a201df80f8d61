// 测试工具：脚本化的媒体后端 + 资源计数
//
// 每个数据包、帧、容器、解码上下文和转换器都带一个计数守卫，
// 创建时 +1，drop 时 -1，用来检查停止/关闭之后没有泄漏

use crate::core::{
    AudioParams, CodecId, CodecInitError, ContainerInfo, Frame, MediaKind, Packet, PixelFormat,
    PlayerError, PlayerEvent, Rational, RawFrame, Result, SampleFormat, StreamDescriptor,
    VideoFormat, VideoParams,
};
use crate::player::backend::{
    Container, ContainerBackend, ConvertBackend, DecodeBackend, DecodeContext, MediaBackend,
    PixelConverter, Receive,
};
use crossbeam_channel::Receiver;
use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
enum Resource {
    Packet = 0,
    Frame,
    Container,
    Decoder,
    Converter,
}

const RESOURCE_KINDS: usize = 5;

/// 资源分配/释放计数
#[derive(Debug, Default)]
pub struct LeakCounter {
    allocated: [AtomicI64; RESOURCE_KINDS],
    freed: [AtomicI64; RESOURCE_KINDS],
}

impl LeakCounter {
    fn allocated(&self, kind: Resource) -> i64 {
        self.allocated[kind as usize].load(Ordering::SeqCst)
    }

    fn live(&self, kind: Resource) -> i64 {
        self.allocated(kind) - self.freed[kind as usize].load(Ordering::SeqCst)
    }

    pub fn packets_allocated(&self) -> u64 {
        self.allocated(Resource::Packet) as u64
    }

    pub fn packets_live(&self) -> i64 {
        self.live(Resource::Packet)
    }

    pub fn frames_live(&self) -> i64 {
        self.live(Resource::Frame)
    }

    pub fn containers_open(&self) -> i64 {
        self.live(Resource::Container)
    }

    pub fn decoders_open(&self) -> i64 {
        self.live(Resource::Decoder)
    }

    pub fn converters_live(&self) -> i64 {
        self.live(Resource::Converter)
    }
}

/// 计数守卫
struct Tracked {
    counter: Arc<LeakCounter>,
    kind: Resource,
}

impl Tracked {
    fn new(counter: &Arc<LeakCounter>, kind: Resource) -> Self {
        counter.allocated[kind as usize].fetch_add(1, Ordering::SeqCst);
        Self {
            counter: counter.clone(),
            kind,
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.counter.freed[self.kind as usize].fetch_add(1, Ordering::SeqCst);
    }
}

/// 单个流的脚本（时间基固定为 1/1000，PTS 以毫秒表示）
#[derive(Debug, Clone)]
pub struct StreamScript {
    index: usize,
    kind: MediaKind,
    codec: String,
    width: u32,
    height: u32,
    pts: Vec<i64>,
    start_time: Option<i64>,
    frames_per_packet: usize,
    corrupt: Vec<usize>,
    resize: Option<(usize, u32, u32)>,
}

impl StreamScript {
    fn new(index: usize, kind: MediaKind, codec: &str) -> Self {
        Self {
            index,
            kind,
            codec: codec.to_string(),
            width: 0,
            height: 0,
            pts: Vec::new(),
            start_time: None,
            frames_per_packet: 1,
            corrupt: Vec::new(),
            resize: None,
        }
    }

    pub fn video(index: usize, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::new(index, MediaKind::Video, "h264")
        }
    }

    pub fn audio(index: usize) -> Self {
        Self::new(index, MediaKind::Audio, "aac")
    }

    /// 字幕之类不需要解码的流
    pub fn other(index: usize) -> Self {
        Self::new(index, MediaKind::Other, "subrip")
    }

    /// n 个包，间隔 40ms
    pub fn packets(self, n: usize) -> Self {
        let pts: Vec<i64> = (0..n as i64).map(|i| i * 40).collect();
        self.pts_ms(&pts)
    }

    pub fn pts_ms(mut self, pts: &[i64]) -> Self {
        self.pts = pts.to_vec();
        self
    }

    /// 按给定间隔重新排列 PTS
    pub fn frame_interval_ms(mut self, interval: i64) -> Self {
        for (i, pts) in self.pts.iter_mut().enumerate() {
            *pts = i as i64 * interval;
        }
        self
    }

    pub fn codec(mut self, name: &str) -> Self {
        self.codec = name.to_string();
        self
    }

    pub fn start_time(mut self, ms: i64) -> Self {
        self.start_time = Some(ms);
        self
    }

    pub fn frames_per_packet(mut self, n: usize) -> Self {
        self.frames_per_packet = n;
        self
    }

    /// 第 `seq` 个包送入解码器时失败
    pub fn corrupt_packet(mut self, seq: usize) -> Self {
        self.corrupt.push(seq);
        self
    }

    /// 从第 `seq` 个包开始改变分辨率
    pub fn resize_at(mut self, seq: usize, width: u32, height: u32) -> Self {
        self.resize = Some((seq, width, height));
        self
    }

    fn descriptor(&self) -> StreamDescriptor {
        let mut stream = StreamDescriptor::new(
            self.index,
            self.kind,
            CodecId::new(self.codec.clone()),
            Rational::new(1, 1000),
        );
        stream.start_time = self.start_time;
        stream.duration = self.pts.last().copied();
        match self.kind {
            MediaKind::Video => {
                stream.video = Some(VideoParams {
                    width: self.width,
                    height: self.height,
                    pixel_format: PixelFormat::YUV420P,
                    frame_rate: Rational::new(25, 1),
                    sample_aspect_ratio: Rational::new(1, 1),
                })
            }
            MediaKind::Audio => {
                stream.audio = Some(AudioParams {
                    sample_rate: 48_000,
                    channels: 2,
                    channel_layout: 3,
                    sample_format: SampleFormat::F32,
                })
            }
            MediaKind::Other => {}
        }
        stream
    }

    fn video_format(&self, seq: usize) -> VideoFormat {
        let (width, height) = match self.resize {
            Some((from, w, h)) if seq >= from => (w, h),
            _ => (self.width, self.height),
        };
        VideoFormat {
            width,
            height,
            pixel_format: PixelFormat::YUV420P,
        }
    }
}

/// 包负载
struct ScriptedPacket {
    seq: usize,
    _guard: Tracked,
}

/// 帧负载
struct ScriptedPicture {
    fill: u8,
    _guard: Tracked,
}

/// 脚本化媒体：同时实现容器、解码和像素转换三种能力
#[derive(Clone, Default)]
pub struct ScriptedMedia {
    streams: Vec<StreamScript>,
    fail_read_after: Option<usize>,
    counters: Arc<LeakCounter>,
}

impl ScriptedMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(mut self, stream: StreamScript) -> Self {
        self.streams.push(stream);
        self
    }

    /// 读取 n 个包之后返回读取错误
    pub fn fail_read_after(mut self, n: usize) -> Self {
        self.fail_read_after = Some(n);
        self
    }

    pub fn counters(&self) -> &LeakCounter {
        &self.counters
    }

    pub fn backend(&self) -> MediaBackend {
        let shared = Arc::new(self.clone());
        MediaBackend::new(shared.clone(), shared.clone(), shared)
    }

    pub fn container_backend(&self) -> Arc<dyn ContainerBackend> {
        Arc::new(self.clone())
    }

    pub fn decode_backend(&self) -> Arc<dyn DecodeBackend> {
        Arc::new(self.clone())
    }

    pub fn convert_backend(&self) -> Arc<dyn ConvertBackend> {
        Arc::new(self.clone())
    }

    /// 一个真实存在的文件，供路径检查使用
    pub fn temp_file(&self) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".mp4")
            .tempfile()
            .expect("create temp file");
        file.write_all(b"scripted media").expect("write temp file");
        file
    }

    pub fn info(&self) -> ContainerInfo {
        self.info_at(PathBuf::from("scripted.mp4"))
    }

    fn info_at(&self, path: PathBuf) -> ContainerInfo {
        ContainerInfo {
            path,
            format_name: "scripted".to_string(),
            long_format_name: "Scripted test media".to_string(),
            duration_ms: self
                .streams
                .iter()
                .filter_map(|s| s.pts.last().copied())
                .max()
                .unwrap_or(0),
            bit_rate: 0,
            metadata: "title=scripted; ".to_string(),
            streams: self.streams.iter().map(StreamScript::descriptor).collect(),
        }
    }

    /// 按容器交错顺序排列的 (脚本下标, 包序号)
    fn read_order(&self) -> Vec<(usize, usize)> {
        let longest = self.streams.iter().map(|s| s.pts.len()).max().unwrap_or(0);
        let mut order = Vec::new();
        for seq in 0..longest {
            for (slot, stream) in self.streams.iter().enumerate() {
                if seq < stream.pts.len() {
                    order.push((slot, seq));
                }
            }
        }
        order
    }

    fn make_packet(&self, slot: usize, seq: usize) -> Packet {
        let stream = &self.streams[slot];
        Packet::new(
            stream.index,
            Some(stream.pts[seq]),
            16,
            Box::new(ScriptedPacket {
                seq,
                _guard: Tracked::new(&self.counters, Resource::Packet),
            }),
        )
    }

    /// 按读取顺序一次性生成全部数据包
    pub fn packets(&self) -> Vec<Packet> {
        self.read_order()
            .into_iter()
            .map(|(slot, seq)| self.make_packet(slot, seq))
            .collect()
    }

    fn script_for(&self, index: usize) -> Option<&StreamScript> {
        self.streams.iter().find(|s| s.index == index)
    }
}

struct ScriptedContainer {
    media: ScriptedMedia,
    info: ContainerInfo,
    order: Vec<(usize, usize)>,
    cursor: usize,
    _guard: Tracked,
}

impl ContainerBackend for ScriptedMedia {
    fn open(&self, path: &Path) -> Result<Box<dyn Container>> {
        Ok(Box::new(ScriptedContainer {
            media: self.clone(),
            info: self.info_at(path.to_path_buf()),
            order: self.read_order(),
            cursor: 0,
            _guard: Tracked::new(&self.counters, Resource::Container),
        }))
    }
}

impl Container for ScriptedContainer {
    fn info(&self) -> &ContainerInfo {
        &self.info
    }

    fn read_packet(&mut self) -> Result<Option<Packet>> {
        if self.media.fail_read_after == Some(self.cursor) {
            return Err(PlayerError::ReadError("scripted read failure".to_string()));
        }
        let Some(&(slot, seq)) = self.order.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        Ok(Some(self.media.make_packet(slot, seq)))
    }
}

struct ScriptedDecoder {
    script: StreamScript,
    counters: Arc<LeakCounter>,
    pending: VecDeque<RawFrame>,
    _guard: Tracked,
}

impl DecodeBackend for ScriptedMedia {
    fn open_decoder(
        &self,
        stream: &StreamDescriptor,
    ) -> std::result::Result<Box<dyn DecodeContext>, CodecInitError> {
        let script = self
            .script_for(stream.index)
            .filter(|s| matches!(s.codec.as_str(), "h264" | "hevc" | "aac"))
            .ok_or_else(|| CodecInitError::DecoderNotFound(stream.codec.clone()))?;
        Ok(Box::new(ScriptedDecoder {
            script: script.clone(),
            counters: self.counters.clone(),
            pending: VecDeque::new(),
            _guard: Tracked::new(&self.counters, Resource::Decoder),
        }))
    }
}

impl DecodeContext for ScriptedDecoder {
    fn send_packet(&mut self, packet: &Packet) -> std::result::Result<(), String> {
        let seq = packet
            .payload::<ScriptedPacket>()
            .map(|p| p.seq)
            .ok_or_else(|| "foreign packet".to_string())?;
        if self.script.corrupt.contains(&seq) {
            return Err(format!("invalid data in packet #{}", seq));
        }
        let video = match self.script.kind {
            MediaKind::Video => Some(self.script.video_format(seq)),
            _ => None,
        };
        for _ in 0..self.script.frames_per_packet {
            self.pending.push_back(RawFrame {
                pts: packet.pts(),
                video,
                payload: Box::new(ScriptedPicture {
                    fill: seq as u8,
                    _guard: Tracked::new(&self.counters, Resource::Frame),
                }),
            });
        }
        Ok(())
    }

    fn receive_frame(&mut self) -> Receive {
        match self.pending.pop_front() {
            Some(frame) => Receive::Frame(frame),
            None => Receive::NeedMoreInput,
        }
    }
}

struct ScriptedConverter {
    format: VideoFormat,
    _guard: Tracked,
}

impl ConvertBackend for ScriptedMedia {
    fn create(&self, frame: &Frame, _target: PixelFormat) -> Option<Box<dyn PixelConverter>> {
        let format = frame.video_format()?;
        Some(Box::new(ScriptedConverter {
            format,
            _guard: Tracked::new(&self.counters, Resource::Converter),
        }))
    }
}

impl PixelConverter for ScriptedConverter {
    fn stride(&self) -> usize {
        self.format.width as usize * 4
    }

    fn convert(&mut self, frame: &Frame, dst: &mut [u8]) -> bool {
        if frame.video_format() != Some(self.format) {
            return false;
        }
        let Some(picture) = frame.payload::<ScriptedPicture>() else {
            return false;
        };
        let needed = self.stride() * self.format.height as usize;
        if dst.len() < needed {
            return false;
        }
        dst[..needed].fill(picture.fill);
        true
    }
}

/// 取出通道里当前所有的错误事件
pub fn collect_errors(rx: &Receiver<PlayerEvent>) -> Vec<PlayerError> {
    rx.try_iter()
        .filter_map(|event| match event {
            PlayerEvent::Error { error, .. } => Some(error),
            _ => None,
        })
        .collect()
}

/// 等待满足条件的事件，超时返回 false
pub fn wait_for_event(
    rx: &Receiver<PlayerEvent>,
    timeout: Duration,
    pred: impl Fn(&PlayerEvent) -> bool,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        match rx.recv_timeout(remaining) {
            Ok(event) if pred(&event) => return true,
            Ok(_) => {}
            Err(_) => return false,
        }
    }
}

/// 轮询直到条件成立，超时返回 false
pub fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
