use crate::core::{
    log_ctx, EventSink, Frame, PixelFormat, PlayerEvent, Stage, SurfaceInfo, VideoFormat,
    VideoImage,
};
use crate::player::backend::{ConvertBackend, PixelConverter};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// 视频输出 - 把解码帧转换为显示格式并通过事件交给显示端
///
/// 源尺寸或像素格式变化时重建转换器和缓冲区，并在该尺寸的第一帧之前发出 SurfaceChanged
pub struct VideoOutput {
    backend: Arc<dyn ConvertBackend>,
    target: PixelFormat,
    events: EventSink,
    converter: Option<Box<dyn PixelConverter>>,
    buffer: Vec<u8>,
    current: Option<VideoFormat>,
    frames_shown: u64,
}

impl VideoOutput {
    pub fn new(backend: Arc<dyn ConvertBackend>, target: PixelFormat, events: EventSink) -> Self {
        Self {
            backend,
            target,
            events,
            converter: None,
            buffer: Vec::new(),
            current: None,
            frames_shown: 0,
        }
    }

    /// 转换并显示一帧，成功返回 true
    pub fn render(&mut self, frame: &Frame) -> bool {
        let Some(format) = frame.video_format() else {
            return false;
        };
        if format.width == 0 || format.height == 0 {
            warn!("{} 视频帧尺寸无效: {}x{}", log_ctx(), format.width, format.height);
            return false;
        }

        let changed = self.current != Some(format) || self.converter.is_none();
        if changed && !self.reconfigure(frame, format) {
            return false;
        }

        let Some(converter) = self.converter.as_mut() else {
            return false;
        };
        if !converter.convert(frame, &mut self.buffer) {
            warn!("{} 像素转换失败", log_ctx());
            return false;
        }

        let stride = converter.stride();
        let seconds = frame.presentation_seconds().max(0.0);
        self.frames_shown += 1;
        self.events.emit(PlayerEvent::FrameReady(VideoImage {
            format: self.target,
            width: format.width,
            height: format.height,
            stride,
            presentation_time: Duration::try_from_secs_f64(seconds).unwrap_or_default(),
            data: Arc::from(self.buffer.as_slice()),
        }));
        true
    }

    /// 重建转换器和输出缓冲区
    fn reconfigure(&mut self, frame: &Frame, format: VideoFormat) -> bool {
        self.converter = None;
        self.current = None;

        let Some(converter) = self.backend.create(frame, self.target) else {
            warn!(
                "{} 无法创建像素转换器: {:?} {}x{} -> {:?}",
                log_ctx(),
                format.pixel_format,
                format.width,
                format.height,
                self.target
            );
            return false;
        };

        let size = converter.stride() * format.height as usize;
        self.buffer.clear();
        self.buffer.resize(size, 0);
        self.converter = Some(converter);
        self.current = Some(format);

        info!(
            "{} 🖼️ 输出尺寸: {}x{} {:?} -> {:?}",
            log_ctx(),
            format.width,
            format.height,
            format.pixel_format,
            self.target
        );
        self.events.info(
            Stage::Presenter,
            format!("Surface {}x{}", format.width, format.height),
        );
        self.events.emit(PlayerEvent::SurfaceChanged(SurfaceInfo {
            width: format.width,
            height: format.height,
            format: self.target,
        }));
        true
    }

    pub fn current_format(&self) -> Option<VideoFormat> {
        self.current
    }

    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }
}

impl Drop for VideoOutput {
    fn drop(&mut self) {
        if self.converter.is_some() {
            debug!("{} 释放视频输出（共显示 {} 帧）", log_ctx(), self.frames_shown);
        }
    }
}
