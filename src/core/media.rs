// 在线程之间按所有权传递的媒体单元：数据包、原始帧、可显示图像

use crate::core::{MediaKind, PixelFormat, Rational};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// 后端私有的负载（例如 ffmpeg::Packet / ffmpeg::frame::Video）
///
/// 负载随所属的 `Packet` / `Frame` 一起被 drop，由后端自己的 `Drop` 释放原生内存，
/// 因此每个负载恰好释放一次
pub type Payload = Box<dyn Any + Send>;

/// 压缩数据包
///
/// 由解封装器创建，入队后归队列所有，出队后归解码线程所有，用完即 drop
pub struct Packet {
    stream_index: usize,
    pts: Option<i64>,
    size: usize,
    payload: Payload,
}

impl Packet {
    pub fn new(stream_index: usize, pts: Option<i64>, size: usize, payload: Payload) -> Self {
        Self {
            stream_index,
            pts,
            size,
            payload,
        }
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    pub fn pts(&self) -> Option<i64> {
        self.pts
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// 按后端类型取出负载
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("stream_index", &self.stream_index)
            .field("pts", &self.pts)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// 视频帧的源格式，格式或尺寸变化时需要重建像素转换器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
}

/// 解码器直接产出的原始帧（还没有带上流的时间信息）
pub struct RawFrame {
    pub pts: Option<i64>,
    /// 仅视频帧有
    pub video: Option<VideoFormat>,
    pub payload: Payload,
}

/// 解码后的帧，携带媒体类型、PTS、时间基和流起始时间，自包含
pub struct Frame {
    kind: MediaKind,
    stream_index: usize,
    pts: Option<i64>,
    time_base: Rational,
    start_time: Option<i64>,
    video: Option<VideoFormat>,
    payload: Payload,
}

impl Frame {
    pub fn new(
        kind: MediaKind,
        stream_index: usize,
        time_base: Rational,
        start_time: Option<i64>,
        raw: RawFrame,
    ) -> Self {
        Self {
            kind,
            stream_index,
            pts: raw.pts,
            time_base,
            start_time,
            video: raw.video,
            payload: raw.payload,
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    pub fn pts(&self) -> Option<i64> {
        self.pts
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn start_time(&self) -> Option<i64> {
        self.start_time
    }

    pub fn video_format(&self) -> Option<VideoFormat> {
        self.video
    }

    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// 呈现时间（秒）：(pts - start_time) * time_base
    ///
    /// 没有 PTS 的帧按 0 处理；没有起始时间时按 0 处理
    pub fn presentation_seconds(&self) -> f64 {
        match self.pts {
            Some(pts) => pts.saturating_sub(self.start_time.unwrap_or(0)) as f64 * self.time_base.to_f64(),
            None => 0.0,
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("kind", &self.kind)
            .field("stream_index", &self.stream_index)
            .field("pts", &self.pts)
            .field("time_base", &self.time_base)
            .field("start_time", &self.start_time)
            .field("video", &self.video)
            .finish_non_exhaustive()
    }
}

/// 交给显示端的图像
#[derive(Clone)]
pub struct VideoImage {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// 每行字节数
    pub stride: usize,
    pub presentation_time: Duration,
    pub data: Arc<[u8]>,
}

impl fmt::Debug for VideoImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoImage")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("presentation_time", &self.presentation_time)
            .field("bytes", &self.data.len())
            .finish()
    }
}
