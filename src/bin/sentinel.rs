/// 数字卫兵 (Digital Sentinel)
///
/// 检测事件监控
///
/// 系统架构:
/// 1. 采集线程: ffmpeg拉流解码, 断线自动重连
/// 2. 检测线程: 外部推理服务 (可选独立线程)
/// 3. 主线程:   序列判定 → 推送通知 + 预录录像
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::{error, info};
use mimalloc::MiMalloc;

use sentinel::config::{expand_home, Config, PushoverConfig};
use sentinel::detection::{DetectionFilter, DetectorBridge, FilteredDetector, RemoteDetector, COCO_CLASSES};
use sentinel::input::{FfmpegOpener, FrameSource, FrameSourceOptions, StreamEvent};
use sentinel::monitor::Monitor;
use sentinel::notify::{Notifier, Pushover};
use sentinel::pipeline::Pipeline;
use sentinel::recording::{FfmpegEncoderFactory, RecordingBuffer, RecordingOptions, SysinfoDisk};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const DEFAULT_CONFIG: &str = "~/.sentinel/config.json";

/// 数字卫兵参数
#[derive(Parser, Debug)]
#[command(author, version, about = "数字卫兵 - 检测事件监控", long_about = None)]
struct Args {
    /// 配置文件路径
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: String,

    /// 视频源: 摄像头序号 / RTSP地址 / 视频文件
    #[arg(long)]
    src: Option<String>,

    /// 采集宽度 (高度按比例缩放)
    #[arg(long)]
    width: Option<u32>,

    /// 在独立线程中运行检测
    #[arg(long)]
    threaded: bool,

    /// 不做检测, 只拉流
    #[arg(long)]
    no_detect: bool,

    /// 不做序列判定 (同时关闭推送与录像)
    #[arg(long)]
    no_monitor: bool,

    /// 不录像
    #[arg(long)]
    no_write: bool,

    /// 不推送
    #[arg(long)]
    no_push: bool,

    /// 只在终端打印推送消息
    #[arg(long)]
    mock_push: bool,
}

/// 命令行参数覆盖配置文件
fn apply_overrides(args: &Args, config: &mut Config) {
    if let Some(src) = &args.src {
        config.video.src = src.clone();
    }
    if let Some(width) = args.width {
        let height = (width as u64 * config.video.height as u64 / config.video.width.max(1) as u64) as u32;
        config.video.width = width;
        config.video.height = (height / 2 * 2).max(2); // 编码器要求偶数
    }
    if args.threaded {
        if let Some(detector) = config.detector.as_mut() {
            detector.threaded = true;
        }
    }
    if args.mock_push {
        config
            .pushover
            .get_or_insert_with(PushoverConfig::default)
            .mock = true;
    }
    if args.no_detect {
        config.detector = None;
    }
    if args.no_monitor {
        config.monitor = None;
    }
    if args.no_write {
        config.writer = None;
    }
    if args.no_push {
        config.pushover = None;
    }
}

fn build_source(config: &Config, pushover: Option<Pushover>) -> FrameSource {
    let video = &config.video;
    let options = FrameSourceOptions {
        reconnect: video.reconnect,
        stale_timeout: video.stale_timeout(),
        ..Default::default()
    };
    let opener = FfmpegOpener::new(&video.src, video.width, video.height);

    FrameSource::new(opener, options).on_event(move |event| {
        let StreamEvent::Broken { silent_for } = event else {
            return;
        };
        let message = format!("No frames for {} seconds. Likely no video feed.", silent_for.as_secs());
        error!(target: "sentinel::input", "❌ {}", message);
        if let Some(pushover) = &pushover {
            if let Err(e) = pushover.notify(&message, None) {
                error!(target: "sentinel::notify", "❌ 推送失败: {:#}", e);
            }
        }
    })
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config_path: PathBuf = expand_home(&args.config);
    let mut config = Config::load(&config_path).context("加载配置失败")?;
    apply_overrides(&args, &mut config);
    config.validate().context("配置校验失败")?;

    info!("🚀 数字卫兵系统启动 ({})", sentinel::gen_time_string("-"));
    config.print_summary();

    let pushover = config.pushover.clone().map(Pushover::new).transpose()?;

    // ========== 检测 ==========
    let bridge = match &config.detector {
        Some(detector) => {
            info!("🔍 加载检测器: {}", detector.endpoint);
            let filter = DetectionFilter::new(&COCO_CLASSES, &detector.classes, detector.min_confidence);
            let model = FilteredDetector::new(RemoteDetector::new(detector.endpoint.clone()), filter);
            Some(DetectorBridge::new(Box::new(model), detector.threaded).context("无法创建检测线程")?)
        }
        None => None,
    };

    // ========== 监控 ==========
    let monitor = match (&config.monitor, &config.detector) {
        (Some(monitor_config), Some(detector)) => {
            let mut monitor = Monitor::new(monitor_config.clone()).show_detections(detector.show_detections);
            if let Some(writer) = &config.writer {
                let recorder = RecordingBuffer::new(
                    RecordingOptions::from(writer),
                    Box::new(FfmpegEncoderFactory::new(writer.codec.clone())),
                    Box::new(SysinfoDisk),
                );
                monitor = monitor.with_recorder(Box::new(recorder));
            }
            if let Some(pushover) = pushover.clone() {
                monitor = monitor.with_notifier(Box::new(pushover));
            }
            Some(monitor)
        }
        _ => None,
    };

    // ========== Ctrl+C ==========
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("🛑 收到中断信号, 正在退出...");
        flag.store(true, Ordering::Release);
    })
    .context("无法注册Ctrl+C处理")?;

    let source = build_source(&config, pushover);
    let mut pipeline = Pipeline::new(source, bridge, monitor);
    let stats = pipeline.run(shutdown);

    info!("✅ 已退出, 共处理 {} 帧", stats.frames);
    Ok(())
}
