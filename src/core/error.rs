use crate::core::CodecId;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("无法打开文件: {0}")]
    OpenError(String),

    #[error("流 #{stream} 解码器初始化失败: {source}")]
    CodecInitError {
        stream: usize,
        #[source]
        source: CodecInitError,
    },

    #[error("没有可用的音视频解码器")]
    NoDecodableStream,

    #[error("解码错误: {0}")]
    DecodeError(String),

    #[error("读取数据包失败: {0}")]
    ReadError(String),

    #[error("渲染线程未能在 {0:?} 内停止")]
    RenderTimeoutError(Duration),

    #[error("丢弃视频帧（流 #{0}），帧队列已满")]
    FrameDropped(usize),

    #[error("线程异常退出: {0}")]
    ThreadPanicked(String),

    #[error(transparent)]
    ThreadSpawnError(#[from] SpawnError),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("播放器已释放")]
    Disposed,

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("配置解析错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// 解码单元初始化失败的具体原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecInitError {
    #[error("找不到解码器: {0}")]
    DecoderNotFound(CodecId),

    #[error("无法创建解码上下文: {0}")]
    ContextAllocation(String),

    #[error("设置解码参数失败: {0}")]
    Parameters(String),

    #[error("打开解码器失败: {0}")]
    Open(String),
}

/// 工作线程启动失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("无法启动线程 {thread}: {reason}")]
pub struct SpawnError {
    pub thread: String,
    pub reason: String,
}

pub type Result<T> = std::result::Result<T, PlayerError>;
