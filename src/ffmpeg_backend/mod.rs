// FFmpeg 后端：libavformat 解封装、libavcodec 解码、libswscale 像素转换

mod container;
mod convert;
mod decode;

use crate::core::{
    log_ctx, CodecInitError, ContainerInfo, Frame, MediaKind, PixelFormat, PlanarSample,
    PlayerError, Rational, Result, SampleFormat, StreamDescriptor,
};
use crate::player::backend::{
    Container, ContainerBackend, ConvertBackend, DecodeBackend, DecodeContext, MediaBackend,
    PixelConverter,
};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::{sample, Pixel, Sample};
use log::info;
use std::path::Path;
use std::sync::Arc;

pub use container::FfmpegContainer;
pub use decode::{AudioSamples, VideoPicture};

/// FFmpeg 实现的三种能力
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    /// 初始化 FFmpeg（进程内调用一次即可）
    pub fn init() -> Result<Self> {
        ffmpeg::init().map_err(|e| PlayerError::OpenError(format!("FFmpeg 初始化失败: {}", e)))?;
        info!("{} ✅ FFmpeg 初始化成功", log_ctx());
        Ok(Self)
    }

    /// 组合成流水线需要的后端
    pub fn media_backend(self) -> MediaBackend {
        let shared = Arc::new(self);
        MediaBackend::new(shared.clone(), shared.clone(), shared)
    }
}

impl ContainerBackend for FfmpegBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn Container>> {
        let container = FfmpegContainer::open(path)?;
        Ok(Box::new(container))
    }
}

impl DecodeBackend for FfmpegBackend {
    fn open_decoder(
        &self,
        stream: &StreamDescriptor,
    ) -> std::result::Result<Box<dyn DecodeContext>, CodecInitError> {
        let context = decode::FfmpegDecoder::open(stream)?;
        Ok(Box::new(context))
    }
}

impl ConvertBackend for FfmpegBackend {
    fn create(&self, frame: &Frame, target: PixelFormat) -> Option<Box<dyn PixelConverter>> {
        let converter = convert::SwsConverter::new(frame, target)?;
        Some(Box::new(converter))
    }
}

/// 只读取容器信息（不启动流水线），用于打印媒体信息
pub fn probe(path: &Path) -> Result<ContainerInfo> {
    let container = FfmpegContainer::open(path)?;
    Ok(container.info().clone())
}

fn rational(r: ffmpeg::Rational) -> Rational {
    Rational::new(r.numerator(), r.denominator())
}

fn media_kind(medium: ffmpeg::media::Type) -> MediaKind {
    match medium {
        ffmpeg::media::Type::Video => MediaKind::Video,
        ffmpeg::media::Type::Audio => MediaKind::Audio,
        _ => MediaKind::Other,
    }
}

fn pixel_format(pixel: Pixel) -> PixelFormat {
    match pixel {
        Pixel::RGBA => PixelFormat::RGBA,
        Pixel::BGRA => PixelFormat::BGRA,
        Pixel::RGB24 => PixelFormat::RGB24,
        Pixel::BGR24 => PixelFormat::BGR24,
        Pixel::YUV420P => PixelFormat::YUV420P,
        Pixel::NV12 => PixelFormat::NV12,
        other => PixelFormat::Other(ffmpeg::ffi::AVPixelFormat::from(other) as i32),
    }
}

/// 输出格式只支持打包的 RGB 类格式
fn output_pixel(format: PixelFormat) -> Option<(Pixel, usize)> {
    match format {
        PixelFormat::RGBA => Some((Pixel::RGBA, 4)),
        PixelFormat::BGRA => Some((Pixel::BGRA, 4)),
        PixelFormat::RGB24 => Some((Pixel::RGB24, 3)),
        PixelFormat::BGR24 => Some((Pixel::BGR24, 3)),
        _ => None,
    }
}

fn sample_format(format: Sample) -> SampleFormat {
    match format {
        Sample::U8(sample::Type::Packed) => SampleFormat::U8,
        Sample::I16(sample::Type::Packed) => SampleFormat::I16,
        Sample::I32(sample::Type::Packed) => SampleFormat::I32,
        Sample::F32(sample::Type::Packed) => SampleFormat::F32,
        Sample::F64(sample::Type::Packed) => SampleFormat::F64,
        Sample::U8(sample::Type::Planar) => SampleFormat::Planar(PlanarSample::U8),
        Sample::I16(sample::Type::Planar) => SampleFormat::Planar(PlanarSample::I16),
        Sample::I32(sample::Type::Planar) => SampleFormat::Planar(PlanarSample::I32),
        Sample::F32(sample::Type::Planar) => SampleFormat::Planar(PlanarSample::F32),
        Sample::F64(sample::Type::Planar) => SampleFormat::Planar(PlanarSample::F64),
        other => SampleFormat::Other(ffmpeg::ffi::AVSampleFormat::from(other) as i32),
    }
}

/// FFmpeg 用 AV_NOPTS_VALUE 表示未知时间
fn known_time(value: i64) -> Option<i64> {
    if value == ffmpeg::ffi::AV_NOPTS_VALUE {
        None
    } else {
        Some(value)
    }
}
