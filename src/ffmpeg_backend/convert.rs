use super::decode::VideoPicture;
use super::output_pixel;
use crate::core::{log_ctx, Frame, PixelFormat, VideoFormat};
use crate::player::backend::PixelConverter;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util;
use log::{debug, warn};

/// libswscale 转换上下文（源尺寸 → 同尺寸的打包 RGB 格式）
pub(super) struct SwsConverter {
    scaler: scaling::Context,
    output: util::frame::Video,
    format: VideoFormat,
    bytes_per_pixel: usize,
}

// SwsContext 本身不是 Send，但每个转换器只在渲染线程中使用
unsafe impl Send for SwsConverter {}

impl SwsConverter {
    pub(super) fn new(frame: &Frame, target: PixelFormat) -> Option<Self> {
        let format = frame.video_format()?;
        let picture = frame.payload::<VideoPicture>()?;
        let (pixel, bytes_per_pixel) = output_pixel(target)?;

        let scaler = match scaling::Context::get(
            picture.0.format(),
            format.width,
            format.height,
            pixel,
            format.width,
            format.height,
            scaling::Flags::BILINEAR,
        ) {
            Ok(scaler) => scaler,
            Err(e) => {
                warn!("{} 创建 SwsContext 失败: {}", log_ctx(), e);
                return None;
            }
        };

        debug!(
            "{} SwsContext: {}x{} {:?} -> {:?}",
            log_ctx(),
            format.width,
            format.height,
            picture.0.format(),
            pixel
        );
        Some(Self {
            scaler,
            output: util::frame::Video::empty(),
            format,
            bytes_per_pixel,
        })
    }
}

impl PixelConverter for SwsConverter {
    fn stride(&self) -> usize {
        self.format.width as usize * self.bytes_per_pixel
    }

    fn convert(&mut self, frame: &Frame, dst: &mut [u8]) -> bool {
        let Some(picture) = frame.payload::<VideoPicture>() else {
            return false;
        };
        if let Err(e) = self.scaler.run(&picture.0, &mut self.output) {
            warn!("{} 像素转换失败: {}", log_ctx(), e);
            return false;
        }

        // 按行复制，去掉 libswscale 的行对齐填充
        let row = self.stride();
        let height = self.format.height as usize;
        let src_stride = self.output.stride(0);
        let src = self.output.data(0);
        let needed = src_stride * height.saturating_sub(1) + row;
        if dst.len() < row * height || src_stride < row || src.len() < needed {
            return false;
        }
        for y in 0..height {
            let from = y * src_stride;
            dst[y * row..(y + 1) * row].copy_from_slice(&src[from..from + row]);
        }
        true
    }
}
