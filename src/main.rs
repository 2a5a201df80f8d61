use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use media_pipeline::core::{PlayerEvent, StatsSnapshot};
use media_pipeline::ffmpeg_backend::{self, FfmpegBackend};
use media_pipeline::{EventSink, Player, PlayerConfig};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "media-pipeline")]
#[command(about = "解封装 → 解码 → 呈现，打印流水线事件")]
struct Args {
    /// 媒体文件路径
    file: String,

    /// 播放时长（秒），之后关闭
    #[arg(short, long, default_value = "10")]
    seconds: u64,

    /// JSON 配置文件，缺省字段使用默认值
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 只打印容器信息，不播放
    #[arg(long)]
    probe: bool,
}

fn main() -> Result<()> {
    // 初始化日志
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();
    info!("🎬 media-pipeline 启动");

    let backend = FfmpegBackend::init()?;

    if args.probe {
        let info = ffmpeg_backend::probe(Path::new(&args.file))
            .with_context(|| format!("无法读取 {}", args.file))?;
        println!("{}", info);
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => PlayerConfig::from_json_file(path)
            .with_context(|| format!("配置文件 {} 无效", path.display()))?,
        None => PlayerConfig::default(),
    };

    let (events, rx) = EventSink::channel();
    let player = Player::new(backend.media_backend(), config, events)?;
    let info = player.open_file(&args.file)?;
    info!("📎 媒体信息:\n{}", info);

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let mut frames: u64 = 0;
    while Instant::now() < deadline {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(PlayerEvent::Info { stage, message }) => info!("[{}] {}", stage, message),
            Ok(PlayerEvent::Error { stage, error }) => error!("[{}] ❌ {}", stage, error),
            Ok(PlayerEvent::SurfaceChanged(surface)) => {
                info!(
                    "🖼️ 显示尺寸: {}x{} {:?}",
                    surface.width, surface.height, surface.format
                );
            }
            Ok(PlayerEvent::FrameReady(image)) => {
                frames += 1;
                if frames % 50 == 1 {
                    info!(
                        "帧 #{} @ {:.3}s ({} 字节)",
                        frames,
                        image.presentation_time.as_secs_f64(),
                        image.data.len()
                    );
                }
            }
            Err(_) => {}
        }
    }

    let started = Instant::now();
    player.dispose();
    info!("⏹️  已关闭，耗时 {:?}", started.elapsed());
    for event in rx.try_iter() {
        if let PlayerEvent::Error { stage, error } = event {
            warn!("[{}] {}", stage, error);
        }
    }
    print_stats(&player.stats());
    Ok(())
}

fn print_stats(stats: &StatsSnapshot) {
    info!(
        "📊 读取 {} 包，解码 {} 包 / {} 帧，显示 {} 帧，丢弃 {} 帧（队列满 {}），清理 {} 包",
        stats.packets_read,
        stats.packets_decoded,
        stats.frames_decoded,
        stats.frames_presented,
        stats.frames_discarded,
        stats.frames_dropped,
        stats.packets_discarded
    );
}
