//! 分阶段的媒体播放流水线
//!
//! 解封装、解码、呈现各自运行在独立线程中，通过有界队列传递数据包和帧，
//! 所有状态和错误都以 [`core::PlayerEvent`] 事件的形式交给调用方。
//! FFmpeg 后端在 `ffmpeg` feature 下提供。

pub mod core;
pub mod player;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg_backend;

#[cfg(test)]
mod testing;

pub use crate::core::{
    ContainerInfo, EventSink, PlaybackState, PlayerConfig, PlayerError, PlayerEvent, Result,
};
pub use crate::player::{MediaBackend, Player};
