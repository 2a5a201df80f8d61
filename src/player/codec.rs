use crate::core::{log_ctx, EventSink, Frame, Packet, PlayerError, Stage, StreamDescriptor};
use crate::player::backend::{DecodeBackend, DecodeContext, Receive};
use log::{debug, error, info, warn};

/// 解码单元状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecState {
    /// 非音视频流，不创建解码器
    Uninitialized,
    Opening,
    Ready,
    Failed,
    Disposed,
}

/// 单个流的解码单元
///
/// 状态转换：Uninitialized → Opening → Ready / Failed，任意状态 → Disposed。
/// 只有 Ready 状态才会接受数据包
pub struct CodecUnit {
    stream: StreamDescriptor,
    state: CodecState,
    context: Option<Box<dyn DecodeContext>>,
    events: EventSink,
    frames_out: u64,
}

impl CodecUnit {
    /// 为一个流创建解码单元并尝试打开解码器
    ///
    /// 失败时单元停留在 Failed 状态并发出 CodecInitError 事件，不会留下半初始化的上下文
    pub fn new(stream: &StreamDescriptor, backend: &dyn DecodeBackend, events: EventSink) -> Self {
        let mut unit = Self {
            stream: stream.clone(),
            state: CodecState::Uninitialized,
            context: None,
            events,
            frames_out: 0,
        };

        if !stream.kind.is_decodable() {
            debug!(
                "{} 跳过流 #{} ({})，不需要解码",
                log_ctx(),
                stream.index,
                stream.kind
            );
            return unit;
        }

        unit.state = CodecState::Opening;
        match backend.open_decoder(stream) {
            Ok(context) => {
                info!(
                    "{} ✅ 流 #{} 解码器已打开: {} ({})",
                    log_ctx(),
                    stream.index,
                    stream.codec,
                    stream.kind
                );
                unit.context = Some(context);
                unit.state = CodecState::Ready;
            }
            Err(source) => {
                error!(
                    "{} ❌ 流 #{} 解码器初始化失败: {}",
                    log_ctx(),
                    stream.index,
                    source
                );
                unit.state = CodecState::Failed;
                unit.events.error(
                    Stage::Decoder,
                    PlayerError::CodecInitError {
                        stream: stream.index,
                        source,
                    },
                );
            }
        }
        unit
    }

    pub fn state(&self) -> CodecState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == CodecState::Ready
    }

    pub fn stream(&self) -> &StreamDescriptor {
        &self.stream
    }

    /// 解码一个数据包，返回产出的全部帧（可能为空）
    ///
    /// 发送失败或取帧出错时发出 DecodeError 事件，单元保持 Ready，下一个包照常处理
    pub fn decode(&mut self, packet: &Packet) -> Vec<Frame> {
        let mut frames = Vec::new();
        if self.state != CodecState::Ready {
            return frames;
        }
        let Some(context) = self.context.as_mut() else {
            return frames;
        };

        if let Err(e) = context.send_packet(packet) {
            warn!(
                "{} 发送数据包失败 (流 #{}): {}",
                log_ctx(),
                self.stream.index,
                e
            );
            self.events
                .error(Stage::Decoder, PlayerError::DecodeError(e));
            return frames;
        }

        loop {
            match context.receive_frame() {
                Receive::Frame(raw) => {
                    self.frames_out += 1;
                    frames.push(Frame::new(
                        self.stream.kind,
                        self.stream.index,
                        self.stream.time_base,
                        self.stream.start_time,
                        raw,
                    ));
                }
                Receive::NeedMoreInput | Receive::EndOfStream => break,
                Receive::Error(e) => {
                    warn!(
                        "{} 解码失败 (流 #{}): {}",
                        log_ctx(),
                        self.stream.index,
                        e
                    );
                    self.events
                        .error(Stage::Decoder, PlayerError::DecodeError(e));
                    break;
                }
            }
        }
        frames
    }

    /// 释放解码上下文（可重复调用）
    pub fn dispose(&mut self) {
        if self.state == CodecState::Disposed {
            return;
        }
        if self.context.take().is_some() {
            debug!(
                "{} 释放流 #{} 解码器（共输出 {} 帧）",
                log_ctx(),
                self.stream.index,
                self.frames_out
            );
        }
        self.state = CodecState::Disposed;
    }
}

impl Drop for CodecUnit {
    fn drop(&mut self) {
        self.dispose();
    }
}
