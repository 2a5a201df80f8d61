use crate::core::{PixelFormat, PlayerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 渲染等待期间被取消时，是否仍然显示这一帧
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelledFramePolicy {
    /// 跳过显示，只释放帧
    SkipDisplay,
    /// 仍然转换并显示
    DeliverAnyway,
}

/// 帧队列满、限时等待后仍无法投递时的处理
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DroppedFramePolicy {
    /// 只计数并写 debug 日志
    Silent,
    /// 额外发出 FrameDropped 错误事件
    Report,
}

/// 解封装配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemuxerConfig {
    /// 数据包队列容量
    pub packet_queue_capacity: usize,
    /// 队列长度超过该值时读取线程暂停
    pub packet_high_watermark: usize,
    /// 背压等待间隔（毫秒）
    pub backpressure_poll_ms: u64,
}

impl Default for DemuxerConfig {
    fn default() -> Self {
        Self {
            packet_queue_capacity: 64,
            packet_high_watermark: 50,
            backpressure_poll_ms: 100,
        }
    }
}

/// 解码配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub frame_queue_capacity: usize,
    pub frame_high_watermark: usize,
    pub backpressure_poll_ms: u64,
    /// 阻塞取数据包的最长等待（毫秒）
    pub packet_take_timeout_ms: u64,
    /// 投递帧的最长等待（毫秒），超时后丢弃该帧
    pub frame_offer_timeout_ms: u64,
    pub dropped_frames: DroppedFramePolicy,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            frame_queue_capacity: 32,
            frame_high_watermark: 25,
            backpressure_poll_ms: 100,
            packet_take_timeout_ms: 1000,
            frame_offer_timeout_ms: 200,
            dropped_frames: DroppedFramePolicy::Silent,
        }
    }
}

/// 呈现配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenterConfig {
    /// 阻塞取帧的最长等待（毫秒）
    pub frame_take_timeout_ms: u64,
    /// 停止渲染线程的最长等待（毫秒）
    pub stop_timeout_ms: u64,
    /// 输出像素格式
    pub output_format: PixelFormat,
    pub cancelled_frames: CancelledFramePolicy,
}

impl Default for PresenterConfig {
    fn default() -> Self {
        Self {
            frame_take_timeout_ms: 300,
            stop_timeout_ms: 5000,
            output_format: PixelFormat::BGRA,
            cancelled_frames: CancelledFramePolicy::SkipDisplay,
        }
    }
}

/// 流水线配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub demuxer: DemuxerConfig,
    pub decoder: DecoderConfig,
    pub presenter: PresenterConfig,
}

impl PlayerConfig {
    /// 从 JSON 字符串加载（缺省字段使用默认值）
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// 检查容量与高水位的关系
    pub fn validate(&self) -> Result<()> {
        check_queue(
            "packet",
            self.demuxer.packet_queue_capacity,
            self.demuxer.packet_high_watermark,
        )?;
        check_queue(
            "frame",
            self.decoder.frame_queue_capacity,
            self.decoder.frame_high_watermark,
        )?;
        if self.presenter.stop_timeout_ms == 0 {
            return Err(PlayerError::ConfigError(
                "presenter.stop_timeout_ms 必须大于 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_queue(name: &str, capacity: usize, high_watermark: usize) -> Result<()> {
    if capacity == 0 {
        return Err(PlayerError::ConfigError(format!("{} 队列容量不能为 0", name)));
    }
    // 生产者在长度 <= 高水位时才会写入，容量必须留出至少一个位置
    if high_watermark >= capacity {
        return Err(PlayerError::ConfigError(format!(
            "{} 队列高水位 ({}) 必须小于容量 ({})",
            name, high_watermark, capacity
        )));
    }
    Ok(())
}

impl DemuxerConfig {
    pub fn backpressure_poll(&self) -> Duration {
        Duration::from_millis(self.backpressure_poll_ms)
    }
}

impl DecoderConfig {
    pub fn backpressure_poll(&self) -> Duration {
        Duration::from_millis(self.backpressure_poll_ms)
    }

    pub fn packet_take_timeout(&self) -> Duration {
        Duration::from_millis(self.packet_take_timeout_ms)
    }

    pub fn frame_offer_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_offer_timeout_ms)
    }
}

impl PresenterConfig {
    pub fn frame_take_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_take_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PlayerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.demuxer.packet_high_watermark, 50);
        assert_eq!(config.presenter.stop_timeout(), Duration::from_secs(5));
        assert_eq!(config.presenter.cancelled_frames, CancelledFramePolicy::SkipDisplay);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = PlayerConfig::from_json_str(
            r#"{ "decoder": { "frame_offer_timeout_ms": 50, "dropped_frames": "report" } }"#,
        )
        .unwrap();
        assert_eq!(config.decoder.frame_offer_timeout(), Duration::from_millis(50));
        assert_eq!(config.decoder.dropped_frames, DroppedFramePolicy::Report);
        assert_eq!(config.decoder.packet_take_timeout_ms, 1000);
        assert_eq!(config.demuxer, DemuxerConfig::default());
    }

    #[test]
    fn rejects_watermark_at_capacity() {
        let err = PlayerConfig::from_json_str(
            r#"{ "demuxer": { "packet_queue_capacity": 10, "packet_high_watermark": 10 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, PlayerError::ConfigError(_)));

        let err = PlayerConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, PlayerError::JsonError(_)));
    }
}
