// 核心数据结构和类型定义

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// 媒体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    /// 字幕、数据流等，流水线不解码
    Other,
}

impl MediaKind {
    /// 是否需要解码（只有音视频流会建立解码单元）
    pub fn is_decodable(self) -> bool {
        matches!(self, MediaKind::Video | MediaKind::Audio)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Other => write!(f, "other"),
        }
    }
}

/// 有理数（时间基、帧率、采样宽高比）
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// 转换为 f64，分母为 0 时返回 0
    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::new(0, 1)
    }
}

impl fmt::Debug for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.num, self.den)
    }
}

/// 像素格式
///
/// 源格式由后端给出，`Other` 保存后端原始编号，只用于判断格式是否变化
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    RGBA,
    BGRA,
    RGB24,
    BGR24,
    YUV420P,
    NV12,
    Other(i32),
}

/// 音频采样格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleFormat {
    U8,
    I16,
    I32,
    F32,
    F64,
    /// 平面格式（每个声道一块缓冲）
    Planar(PlanarSample),
    Other(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanarSample {
    U8,
    I16,
    I32,
    F32,
    F64,
}

/// 编解码器标识（例如 "h264"、"aac"），后端按它查找解码器
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodecId(pub String);

impl CodecId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 视频流参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoParams {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub frame_rate: Rational,
    pub sample_aspect_ratio: Rational,
}

/// 音频流参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioParams {
    pub sample_rate: u32,
    pub channels: u16,
    /// 声道布局掩码（0 表示未知）
    pub channel_layout: u64,
    pub sample_format: SampleFormat,
}

/// 后端私有的编解码参数句柄（例如 FFmpeg 的 AVCodecParameters 副本）
///
/// 流水线不解读它，只在打开解码上下文时原样交还给解码后端
#[derive(Clone)]
pub struct CodecParameters(Arc<dyn Any + Send + Sync>);

impl CodecParameters {
    pub fn new<T: Any + Send + Sync>(params: T) -> Self {
        Self(Arc::new(params))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for CodecParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CodecParameters(..)")
    }
}

/// 单个基本流的描述（打开容器时探测得到，之后不可变）
#[derive(Debug, Clone)]
pub struct StreamDescriptor {
    /// 流索引，数据包按它路由到解码单元
    pub index: usize,
    pub kind: MediaKind,
    pub codec: CodecId,
    pub bit_rate: i64,
    /// 以时间基为单位的时长，未知时为 None
    pub duration: Option<i64>,
    /// 以时间基为单位的起始时间，未知时为 None
    pub start_time: Option<i64>,
    pub time_base: Rational,
    pub video: Option<VideoParams>,
    pub audio: Option<AudioParams>,
    pub parameters: Option<CodecParameters>,
}

impl StreamDescriptor {
    /// 创建只有基本字段的描述，其余参数按需填写
    pub fn new(index: usize, kind: MediaKind, codec: CodecId, time_base: Rational) -> Self {
        Self {
            index,
            kind,
            codec,
            bit_rate: 0,
            duration: None,
            start_time: None,
            time_base,
            video: None,
            audio: None,
            parameters: None,
        }
    }
}

impl fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\t{}: {} {} BitRate:{} Duration:{} StartTime:{}",
            self.index,
            self.kind,
            self.codec,
            self.bit_rate,
            self.duration.unwrap_or(0),
            self.start_time.unwrap_or(0)
        )?;
        if let Some(v) = &self.video {
            write!(
                f,
                "\n\tVideo {}x{} {:?} TimeBase {} FrameRate {} Ratio {}",
                v.width, v.height, v.pixel_format, self.time_base, v.frame_rate, v.sample_aspect_ratio
            )?;
        }
        if let Some(a) = &self.audio {
            write!(
                f,
                "\n\tAudio SampleRate:{} Channels:{} SampleFormat {:?}",
                a.sample_rate, a.channels, a.sample_format
            )?;
        }
        Ok(())
    }
}

/// 容器信息快照（打开成功时创建，关闭时丢弃）
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub path: PathBuf,
    pub format_name: String,
    pub long_format_name: String,
    pub duration_ms: i64,
    pub bit_rate: i64,
    /// `key=value; key=value` 形式的元数据
    pub metadata: String,
    pub streams: Vec<StreamDescriptor>,
}

impl ContainerInfo {
    pub fn stream(&self, index: usize) -> Option<&StreamDescriptor> {
        self.streams.iter().find(|s| s.index == index)
    }

    /// 第一个视频流
    pub fn video_stream(&self) -> Option<&StreamDescriptor> {
        self.streams.iter().find(|s| s.kind == MediaKind::Video)
    }

    /// 第一个音频流
    pub fn audio_stream(&self) -> Option<&StreamDescriptor> {
        self.streams.iter().find(|s| s.kind == MediaKind::Audio)
    }

    /// 检查流索引唯一（用于探测后的校验）
    pub fn has_unique_indices(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.streams.iter().all(|s| seen.insert(s.index))
    }
}

impl fmt::Display for ContainerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.duration_ms / 1000;
        write!(
            f,
            "Format: {} LongName: {} Duration: {:02}:{:02}:{:02}.{:03} BitRate: {} Streams: {}\nMetadata: {}",
            self.format_name,
            self.long_format_name,
            secs / 3600,
            (secs / 60) % 60,
            secs % 60,
            self.duration_ms % 1000,
            self.bit_rate,
            self.streams.len(),
            self.metadata
        )?;
        for s in &self.streams {
            write!(f, "\n{}", s)?;
        }
        Ok(())
    }
}

/// 播放状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// 没有打开的文件
    Idle,
    Opening,
    Playing,
    /// 已释放，不能再使用
    Disposed,
}
