// 对外事件：状态/错误消息、显示回调

use crate::core::{PixelFormat, PlayerError, VideoImage};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::fmt;
use std::sync::Arc;

/// 事件来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Player,
    Demuxer,
    Decoder,
    Presenter,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Player => "player",
            Stage::Demuxer => "demuxer",
            Stage::Decoder => "decoder",
            Stage::Presenter => "presenter",
        };
        f.write_str(name)
    }
}

/// 显示表面变化（新的尺寸或格式），在该尺寸的第一帧之前发出
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// 流水线事件
#[derive(Debug)]
pub enum PlayerEvent {
    Info { stage: Stage, message: String },
    Error { stage: Stage, error: PlayerError },
    SurfaceChanged(SurfaceInfo),
    FrameReady(VideoImage),
}

/// 事件接收端
///
/// 回调在任意线程上被调用（通常是渲染线程），需要切换到 UI 线程由调用方自己处理
#[derive(Clone)]
pub struct EventSink {
    handler: Arc<dyn Fn(PlayerEvent) + Send + Sync>,
}

impl EventSink {
    /// 使用闭包接收事件
    pub fn from_fn<F>(handler: F) -> Self
    where
        F: Fn(PlayerEvent) + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// 把事件转发到 crossbeam 通道
    pub fn from_sender(tx: Sender<PlayerEvent>) -> Self {
        // 接收端已关闭时直接丢弃事件
        Self::from_fn(move |event| {
            let _ = tx.send(event);
        })
    }

    /// 创建一个无界通道，返回 (sink, receiver)
    pub fn channel() -> (Self, Receiver<PlayerEvent>) {
        let (tx, rx) = unbounded();
        (Self::from_sender(tx), rx)
    }

    /// 丢弃所有事件
    pub fn discard() -> Self {
        Self::from_fn(|_| {})
    }

    pub fn emit(&self, event: PlayerEvent) {
        (self.handler)(event);
    }

    pub fn info(&self, stage: Stage, message: impl Into<String>) {
        self.emit(PlayerEvent::Info {
            stage,
            message: message.into(),
        });
    }

    pub fn error(&self, stage: Stage, error: PlayerError) {
        self.emit(PlayerEvent::Error { stage, error });
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::discard()
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventSink(..)")
    }
}
