use super::{known_time, media_kind, pixel_format, rational, sample_format};
use crate::core::{
    log_ctx, AudioParams, CodecId, CodecParameters, ContainerInfo, MediaKind, Packet, PlayerError,
    Result, StreamDescriptor, VideoParams,
};
use crate::player::backend::Container;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, format};
use log::{debug, info};
use std::path::Path;

/// AVCodecParameters 副本，解码端按流打开上下文时使用
pub(super) struct StreamParameters(pub(super) codec::Parameters);

// 克隆出的副本不再引用输入上下文，创建后只读
unsafe impl Send for StreamParameters {}
unsafe impl Sync for StreamParameters {}

/// 已打开的 FFmpeg 输入上下文
pub struct FfmpegContainer {
    input: format::context::Input,
    info: ContainerInfo,
}

// 输入上下文只被持有它的读取线程使用
unsafe impl Send for FfmpegContainer {}

impl FfmpegContainer {
    pub fn open(path: &Path) -> Result<Self> {
        info!("{} 正在打开文件: {}", log_ctx(), path.display());
        let input = format::input(path)
            .map_err(|e| PlayerError::OpenError(format!("无法打开文件: {}", e)))?;
        let info = probe(&input, path)?;
        debug!("{} 流数量: {}", log_ctx(), info.streams.len());
        Ok(Self { input, info })
    }
}

impl Container for FfmpegContainer {
    fn info(&self) -> &ContainerInfo {
        &self.info
    }

    fn read_packet(&mut self) -> Result<Option<Packet>> {
        let mut packet = ffmpeg::Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => {
                let stream_index = packet.stream();
                let pts = packet.pts();
                let size = packet.size();
                Ok(Some(Packet::new(stream_index, pts, size, Box::new(packet))))
            }
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(PlayerError::ReadError(e.to_string())),
        }
    }
}

fn probe(input: &format::context::Input, path: &Path) -> Result<ContainerInfo> {
    let format = input.format();
    let metadata: String = input
        .metadata()
        .iter()
        .map(|(key, value)| format!("{}={}; ", key, value))
        .collect();

    let mut streams = Vec::new();
    for stream in input.streams() {
        streams.push(describe(&stream)?);
    }

    // 容器时长以微秒为单位
    let duration = input.duration();
    Ok(ContainerInfo {
        path: path.to_path_buf(),
        format_name: format.name().to_string(),
        long_format_name: format.description().to_string(),
        duration_ms: if duration > 0 { duration / 1000 } else { 0 },
        bit_rate: input.bit_rate(),
        metadata,
        streams,
    })
}

fn describe(stream: &format::stream::Stream) -> Result<StreamDescriptor> {
    let parameters = stream.parameters();
    let kind = media_kind(parameters.medium());
    let mut descriptor = StreamDescriptor::new(
        stream.index(),
        kind,
        CodecId::new(parameters.id().name()),
        rational(stream.time_base()),
    );
    descriptor.duration = known_time(stream.duration());
    descriptor.start_time = known_time(stream.start_time());

    let probe_error =
        |e: ffmpeg::Error| PlayerError::OpenError(format!("流 #{} 探测失败: {}", stream.index(), e));

    match kind {
        MediaKind::Video => {
            let context =
                codec::context::Context::from_parameters(parameters.clone()).map_err(probe_error)?;
            let video = context.decoder().video().map_err(probe_error)?;
            descriptor.bit_rate = video.bit_rate() as i64;
            descriptor.video = Some(VideoParams {
                width: video.width(),
                height: video.height(),
                pixel_format: pixel_format(video.format()),
                frame_rate: rational(stream.avg_frame_rate()),
                sample_aspect_ratio: rational(video.aspect_ratio()),
            });
        }
        MediaKind::Audio => {
            let context =
                codec::context::Context::from_parameters(parameters.clone()).map_err(probe_error)?;
            let audio = context.decoder().audio().map_err(probe_error)?;
            descriptor.bit_rate = audio.bit_rate() as i64;
            descriptor.audio = Some(AudioParams {
                sample_rate: audio.rate(),
                channels: audio.channels(),
                channel_layout: audio.channel_layout().bits(),
                sample_format: sample_format(audio.format()),
            });
        }
        MediaKind::Other => {}
    }

    descriptor.parameters = Some(CodecParameters::new(StreamParameters(parameters.clone())));
    Ok(descriptor)
}
