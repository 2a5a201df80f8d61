use super::container::StreamParameters;
use crate::core::{
    log_ctx, CodecInitError, MediaKind, Packet, RawFrame, StreamDescriptor, VideoFormat,
};
use crate::player::backend::{DecodeContext, Receive};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, util};
use log::debug;

/// 解码后的视频帧负载
pub struct VideoPicture(pub util::frame::Video);

/// 解码后的音频帧负载
pub struct AudioSamples(pub util::frame::Audio);

/// 单个流的 libavcodec 解码上下文
pub(super) struct FfmpegDecoder {
    decoder: codec::decoder::Opened,
    kind: MediaKind,
}

// 解码上下文只在解码线程中使用
unsafe impl Send for FfmpegDecoder {}

impl FfmpegDecoder {
    /// 查找解码器 → 分配上下文 → 设置流参数 → 打开
    pub(super) fn open(stream: &StreamDescriptor) -> Result<Self, CodecInitError> {
        let id = codec_id(stream)?;
        let codec = codec::decoder::find(id)
            .ok_or_else(|| CodecInitError::DecoderNotFound(stream.codec.clone()))?;

        let parameters = stream
            .parameters
            .as_ref()
            .and_then(|p| p.downcast_ref::<StreamParameters>())
            .ok_or_else(|| CodecInitError::Parameters("缺少编解码参数".to_string()))?;

        let mut context = codec::context::Context::new();
        context
            .set_parameters(parameters.0.clone())
            .map_err(|e| CodecInitError::Parameters(e.to_string()))?;

        let decoder = context
            .decoder()
            .open_as(codec)
            .map_err(|e| CodecInitError::Open(e.to_string()))?;

        debug!(
            "{} 解码器已打开: {} (流 #{})",
            log_ctx(),
            codec.name(),
            stream.index
        );
        Ok(Self {
            decoder,
            kind: stream.kind,
        })
    }

    fn receive_video(&mut self) -> Receive {
        let mut frame = util::frame::Video::empty();
        match self.decoder.receive_frame(&mut frame) {
            Ok(()) => {
                let video = VideoFormat {
                    width: frame.width(),
                    height: frame.height(),
                    pixel_format: super::pixel_format(frame.format()),
                };
                Receive::Frame(RawFrame {
                    pts: frame.timestamp().or_else(|| frame.pts()),
                    video: Some(video),
                    payload: Box::new(VideoPicture(frame)),
                })
            }
            Err(e) => receive_error(e),
        }
    }

    fn receive_audio(&mut self) -> Receive {
        let mut frame = util::frame::Audio::empty();
        match self.decoder.receive_frame(&mut frame) {
            Ok(()) => Receive::Frame(RawFrame {
                pts: frame.timestamp().or_else(|| frame.pts()),
                video: None,
                payload: Box::new(AudioSamples(frame)),
            }),
            Err(e) => receive_error(e),
        }
    }
}

impl DecodeContext for FfmpegDecoder {
    fn send_packet(&mut self, packet: &Packet) -> Result<(), String> {
        let packet = packet
            .payload::<ffmpeg::Packet>()
            .ok_or_else(|| "数据包不是 FFmpeg 格式".to_string())?;
        match self.decoder.send_packet(packet) {
            Ok(()) => Ok(()),
            // 解码器已收到 EOF，这个包被忽略
            Err(ffmpeg::Error::Eof) => Ok(()),
            Err(e) => Err(e.to_string()),
        }
    }

    fn receive_frame(&mut self) -> Receive {
        match self.kind {
            MediaKind::Video => self.receive_video(),
            MediaKind::Audio => self.receive_audio(),
            MediaKind::Other => Receive::EndOfStream,
        }
    }
}

fn receive_error(e: ffmpeg::Error) -> Receive {
    match e {
        ffmpeg::Error::Other { errno: 11 } => Receive::NeedMoreInput, // EAGAIN
        ffmpeg::Error::Eof => Receive::EndOfStream,
        other => Receive::Error(other.to_string()),
    }
}

fn codec_id(stream: &StreamDescriptor) -> Result<codec::Id, CodecInitError> {
    stream
        .parameters
        .as_ref()
        .and_then(|p| p.downcast_ref::<StreamParameters>())
        .map(|p| p.0.id())
        .filter(|id| *id != codec::Id::None)
        .ok_or_else(|| CodecInitError::DecoderNotFound(stream.codec.clone()))
}
