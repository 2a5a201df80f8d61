use crate::core::{
    log_ctx, ContainerInfo, EventSink, PipelineStats, PlaybackState, PlayerConfig, PlayerError,
    Result, Stage, StatsSnapshot,
};
use crate::player::backend::MediaBackend;
use crate::player::{Decoder, Demuxer, Presenter};
use log::{error, info, warn};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 播放管理器 - 组合 解封装 → 解码 → 呈现 三个阶段
///
/// 数据包队列归解封装器所有，帧队列归解码器所有，两个队列是阶段之间唯一共享的状态。
/// 所有生命周期操作在同一把会话锁下串行执行
pub struct Player {
    events: EventSink,
    stats: Arc<PipelineStats>,
    session: Mutex<Session>,
}

struct Session {
    stages: Option<Stages>,
    state: PlaybackState,
    path: Option<PathBuf>,
}

struct Stages {
    demuxer: Demuxer,
    decoder: Decoder,
    presenter: Presenter,
}

impl Player {
    pub fn new(backend: MediaBackend, config: PlayerConfig, events: EventSink) -> Result<Self> {
        info!("{} 🎮 创建播放管理器...", log_ctx());
        config.validate()?;

        let stats = Arc::new(PipelineStats::default());
        let demuxer = Demuxer::new(
            backend.container.clone(),
            config.demuxer.clone(),
            events.clone(),
            stats.clone(),
        );
        let decoder = Decoder::new(
            backend.decode.clone(),
            demuxer.packet_queue(),
            config.decoder.clone(),
            events.clone(),
            stats.clone(),
        );
        let presenter = Presenter::new(
            backend.convert.clone(),
            decoder.frame_queue(),
            config.presenter.clone(),
            events.clone(),
            stats.clone(),
        );

        info!("{} ✅ 播放管理器创建完成", log_ctx());
        Ok(Self {
            events,
            stats,
            session: Mutex::new(Session {
                stages: Some(Stages {
                    demuxer,
                    decoder,
                    presenter,
                }),
                state: PlaybackState::Idle,
                path: None,
            }),
        })
    }

    /// 打开媒体文件并开始播放
    ///
    /// 启动顺序：解码 → 呈现 → 读取，消费者先于生产者就绪。
    /// 任何一步失败都会回到关闭状态，错误同时以事件形式发出
    pub fn open_file(&self, path: &str) -> Result<ContainerInfo> {
        let mut guard = self.session.lock();
        // 直接借用字段，stages 与 state/path 可以同时使用
        let session = &mut *guard;
        let Some(stages) = session.stages.as_ref() else {
            warn!("{} 播放器已释放，忽略打开请求", log_ctx());
            self.events.error(Stage::Player, PlayerError::Disposed);
            return Err(PlayerError::Disposed);
        };

        let path = path.trim();
        if path.is_empty() {
            let message = "文件路径为空".to_string();
            error!("{} ❌ {}", log_ctx(), message);
            self.events
                .error(Stage::Player, PlayerError::OpenError(message.clone()));
            return Err(PlayerError::OpenError(message));
        }

        info!("{} 📂 打开文件: {}", log_ctx(), path);
        close_stages(stages);
        session.path = None;
        session.state = PlaybackState::Opening;

        match start_stages(stages, Path::new(path)) {
            Ok(info) => {
                session.state = PlaybackState::Playing;
                session.path = Some(PathBuf::from(path));
                self.events.info(Stage::Player, format!("Playing {}", path));
                info!("{} ▶️  开始播放", log_ctx());
                Ok(info)
            }
            Err(e) => {
                session.state = PlaybackState::Idle;
                Err(e)
            }
        }
    }

    /// 停止播放并关闭文件（可重复调用）
    pub fn close(&self) {
        let mut session = self.session.lock();
        if let Some(stages) = session.stages.as_ref() {
            close_stages(stages);
        }
        if session.state == PlaybackState::Playing {
            self.events.info(Stage::Player, "Closed");
        }
        if session.state != PlaybackState::Disposed {
            session.state = PlaybackState::Idle;
        }
        session.path = None;
    }

    /// 关闭并永久释放三个阶段（可重复调用）
    pub fn dispose(&self) {
        let mut session = self.session.lock();
        let Some(stages) = session.stages.take() else {
            return;
        };
        info!("{} 🧹 释放播放器", log_ctx());
        close_stages(&stages);
        drop(stages);
        session.state = PlaybackState::Disposed;
        session.path = None;
        self.events.info(Stage::Player, "Disposed");
    }

    pub fn state(&self) -> PlaybackState {
        self.session.lock().state
    }

    pub fn current_path(&self) -> Option<PathBuf> {
        self.session.lock().path.clone()
    }

    pub fn container_info(&self) -> Option<ContainerInfo> {
        self.session
            .lock()
            .stages
            .as_ref()
            .and_then(|stages| stages.demuxer.info())
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn start_stages(stages: &Stages, path: &Path) -> Result<ContainerInfo> {
    let info = stages.demuxer.open(path)?;

    if let Err(e) = stages.decoder.start_decoding(&info.streams) {
        stages.demuxer.close();
        return Err(e);
    }
    if let Err(e) = stages.presenter.start_rendering() {
        close_stages(stages);
        return Err(e);
    }
    if let Err(e) = stages.demuxer.start_reading() {
        close_stages(stages);
        return Err(e);
    }
    Ok(info)
}

/// 读取 → 解码 → 呈现 依次停止，最后释放容器
fn close_stages(stages: &Stages) {
    stages.demuxer.stop_reading();
    stages.decoder.stop_decoding();
    stages.presenter.stop_rendering();
    stages.demuxer.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PlayerEvent;
    use crate::testing::{collect_errors, wait_until, ScriptedMedia, StreamScript};
    use crossbeam_channel::Receiver;
    use std::time::{Duration, Instant};

    fn player_for(media: &ScriptedMedia) -> (Player, Receiver<PlayerEvent>) {
        let (events, rx) = EventSink::channel();
        let player = Player::new(media.backend(), PlayerConfig::default(), events).unwrap();
        (player, rx)
    }

    fn path_of(file: &tempfile::NamedTempFile) -> String {
        file.path().to_string_lossy().into_owned()
    }

    #[test]
    fn end_to_end_surface_then_frames() {
        let media = ScriptedMedia::new()
            .with_stream(StreamScript::video(0, 640, 480).packets(50))
            .with_stream(StreamScript::audio(1).packets(50));
        let file = media.temp_file();
        let (player, rx) = player_for(&media);

        let info = player.open_file(&path_of(&file)).unwrap();
        assert_eq!(info.streams.len(), 2);
        assert_eq!(player.state(), PlaybackState::Playing);

        let mut visual = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(e @ PlayerEvent::SurfaceChanged(_)) | Ok(e @ PlayerEvent::FrameReady(_)) => {
                    visual.push(e);
                    if visual.len() >= 4 {
                        break;
                    }
                }
                _ => {}
            }
        }
        assert!(visual.len() >= 4);
        match &visual[0] {
            PlayerEvent::SurfaceChanged(surface) => {
                assert_eq!((surface.width, surface.height), (640, 480));
            }
            other => panic!("surface must come first, got {:?}", other),
        }
        assert!(visual[1..]
            .iter()
            .all(|e| matches!(e, PlayerEvent::FrameReady(_))));

        let start = Instant::now();
        player.close();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(player.state(), PlaybackState::Idle);
        assert!(player.container_info().is_none());

        let counters = media.counters();
        assert_eq!(counters.packets_live(), 0);
        assert_eq!(counters.frames_live(), 0);
        assert_eq!(counters.containers_open(), 0);
        assert_eq!(counters.decoders_open(), 0);
        assert_eq!(counters.converters_live(), 0);
        assert!(collect_errors(&rx).is_empty());
    }

    #[test]
    fn missing_file_reports_once_and_recovers() {
        let media = ScriptedMedia::new().with_stream(StreamScript::video(0, 64, 48).packets(10));
        let (player, rx) = player_for(&media);

        assert!(player.open_file("missing.mp4").is_err());
        assert_eq!(player.state(), PlaybackState::Idle);
        let errors = collect_errors(&rx);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], PlayerError::OpenError(_)));
        assert_eq!(media.counters().containers_open(), 0);

        let file = media.temp_file();
        assert!(player.open_file(&path_of(&file)).is_ok());
        assert_eq!(player.state(), PlaybackState::Playing);
        assert_eq!(player.current_path(), Some(file.path().to_path_buf()));
        player.close();
    }

    #[test]
    fn empty_path_is_an_open_error() {
        let media = ScriptedMedia::new().with_stream(StreamScript::video(0, 64, 48).packets(1));
        let (player, rx) = player_for(&media);

        assert!(matches!(
            player.open_file("   "),
            Err(PlayerError::OpenError(_))
        ));
        assert_eq!(collect_errors(&rx).len(), 1);
        assert_eq!(player.state(), PlaybackState::Idle);
    }

    #[test]
    fn no_decodable_stream_closes_container() {
        let media = ScriptedMedia::new().with_stream(StreamScript::other(0).packets(5));
        let file = media.temp_file();
        let (player, rx) = player_for(&media);

        assert!(matches!(
            player.open_file(&path_of(&file)),
            Err(PlayerError::NoDecodableStream)
        ));
        assert_eq!(player.state(), PlaybackState::Idle);
        assert!(player.container_info().is_none());
        assert_eq!(media.counters().containers_open(), 0);
        assert!(collect_errors(&rx)
            .iter()
            .any(|e| matches!(e, PlayerError::NoDecodableStream)));
    }

    #[test]
    fn failed_stream_does_not_stop_the_others() {
        let media = ScriptedMedia::new()
            .with_stream(StreamScript::video(0, 64, 48).packets(10))
            .with_stream(StreamScript::audio(1).codec("no-such-codec").packets(10));
        let file = media.temp_file();
        let (player, rx) = player_for(&media);

        assert!(player.open_file(&path_of(&file)).is_ok());
        assert!(wait_until(Duration::from_secs(5), || {
            player.stats().frames_presented == 10
        }));
        player.close();

        let errors = collect_errors(&rx);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], PlayerError::CodecInitError { stream: 1, .. }));
        assert_eq!(media.counters().packets_live(), 0);

        // 每个读出的包要么被解码，要么被计入丢弃
        let stats = player.stats();
        assert!(stats.packets_discarded >= 10);
        assert_eq!(
            stats.packets_read,
            stats.packets_decoded + stats.packets_discarded
        );
    }

    #[test]
    fn stalled_presenter_bounds_memory() {
        // 帧间隔 10 秒：呈现端停在第二帧的定时等待上
        let media = ScriptedMedia::new()
            .with_stream(StreamScript::video(0, 16, 16).packets(1000).frame_interval_ms(10_000));
        let file = media.temp_file();
        let (player, _rx) = player_for(&media);
        player.open_file(&path_of(&file)).unwrap();

        let config = PlayerConfig::default();
        let frame_bound = (config.decoder.frame_queue_capacity + 2) as i64;
        let packet_bound = (config.demuxer.packet_high_watermark + 2) as i64;
        assert!(wait_until(Duration::from_secs(5), || {
            media.counters().packets_live() > config.demuxer.packet_high_watermark as i64
        }));
        std::thread::sleep(Duration::from_millis(300));

        let counters = media.counters();
        assert!(counters.packets_live() <= packet_bound, "{}", counters.packets_live());
        assert!(counters.frames_live() <= frame_bound, "{}", counters.frames_live());
        assert!(counters.packets_allocated() < 200);

        let start = Instant::now();
        player.close();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(counters.packets_live(), 0);
        assert_eq!(counters.frames_live(), 0);
    }

    #[test]
    fn reopen_switches_files_without_leaks() {
        let first = ScriptedMedia::new().with_stream(StreamScript::video(0, 64, 48).packets(500));
        let file = first.temp_file();
        let (player, _rx) = player_for(&first);

        player.open_file(&path_of(&file)).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        player.open_file(&path_of(&file)).unwrap();
        assert_eq!(first.counters().containers_open(), 1);
        player.close();
        assert_eq!(first.counters().containers_open(), 0);
        assert_eq!(first.counters().packets_live(), 0);
        assert_eq!(first.counters().frames_live(), 0);
    }

    #[test]
    fn close_and_dispose_are_idempotent() {
        let media = ScriptedMedia::new().with_stream(StreamScript::video(0, 64, 48).packets(20));
        let file = media.temp_file();
        let (player, rx) = player_for(&media);

        player.close();
        player.open_file(&path_of(&file)).unwrap();
        player.close();
        player.close();
        player.dispose();
        player.dispose();
        assert_eq!(player.state(), PlaybackState::Disposed);

        assert!(matches!(
            player.open_file(&path_of(&file)),
            Err(PlayerError::Disposed)
        ));
        player.close();
        assert_eq!(player.state(), PlaybackState::Disposed);
        assert_eq!(media.counters().packets_live(), 0);
        assert_eq!(media.counters().frames_live(), 0);
        assert_eq!(
            collect_errors(&rx)
                .iter()
                .filter(|e| matches!(e, PlayerError::Disposed))
                .count(),
            1
        );
    }

    #[test]
    fn invalid_config_is_rejected() {
        let media = ScriptedMedia::new();
        let mut config = PlayerConfig::default();
        config.decoder.frame_high_watermark = config.decoder.frame_queue_capacity;
        assert!(matches!(
            Player::new(media.backend(), config, EventSink::discard()),
            Err(PlayerError::ConfigError(_))
        ));
    }
}
