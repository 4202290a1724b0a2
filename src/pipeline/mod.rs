/// 主流水线 (Pipeline Driver)
///
/// 帧源 → 检测桥 → 监控器, 在调用线程上循环:
/// - 帧源: 后台采集, 单槽取最新帧
/// - 检测: 单线程或独立工作线程
/// - 监控: 序列判定、通知、录像
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::detection::{DetectionBatch, DetectorBridge};
use crate::input::FrameSource;
use crate::monitor::Monitor;

/// 没有新帧时的等待
pub const IDLE_POLL: Duration = Duration::from_millis(10);
/// FPS统计日志间隔
pub const STATS_INTERVAL: Duration = Duration::from_secs(30);

/// 一次运行的统计
#[derive(Clone, Debug, Default)]
pub struct RunStats {
    pub frames: u64,
    pub detections: u64, // 新的检测结果数 (不含重复投递)
    pub elapsed: Duration,
}

impl RunStats {
    pub fn fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }
}

/// 周期统计
struct Meter {
    frames: u64,
    detections: u64,
    last: Instant,
}

impl Meter {
    fn new(now: Instant) -> Self {
        Self {
            frames: 0,
            detections: 0,
            last: now,
        }
    }

    fn maybe_log(&mut self, now: Instant, interval: Duration) {
        let elapsed = now.saturating_duration_since(self.last);
        if elapsed < interval {
            return;
        }
        let secs = elapsed.as_secs_f64();
        info!(
            target: "sentinel::pipeline",
            "📊 采集 {:.1} FPS | 检测 {:.1} FPS",
            self.frames as f64 / secs,
            self.detections as f64 / secs
        );
        *self = Self::new(now);
    }
}

pub struct Pipeline {
    source: FrameSource,
    bridge: Option<DetectorBridge>,
    monitor: Option<Monitor>,
    idle_poll: Duration,
    stats_interval: Duration,
}

impl Pipeline {
    pub fn new(source: FrameSource, bridge: Option<DetectorBridge>, monitor: Option<Monitor>) -> Self {
        Self {
            source,
            bridge,
            monitor,
            idle_poll: IDLE_POLL,
            stats_interval: STATS_INTERVAL,
        }
    }

    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    /// 运行到 `shutdown` 被置位或视频流结束
    pub fn run(&mut self, shutdown: Arc<AtomicBool>) -> RunStats {
        if let Err(e) = self.source.start() {
            warn!(target: "sentinel::pipeline", "⚠️ 无法启动采集线程: {}", e);
            return RunStats::default();
        }
        info!(target: "sentinel::pipeline", "🚀 开始处理视频: {}", self.source.describe());
        if let Some(bridge) = &self.bridge {
            let mode = if bridge.is_threaded() { "独立线程" } else { "主线程" };
            info!(target: "sentinel::pipeline", "🔍 检测模式: {}", mode);
        }

        let started = Instant::now();
        let mut stats = RunStats::default();
        let mut meter = Meter::new(started);
        let mut last_seq: Option<u64> = None;

        while !shutdown.load(Ordering::Acquire) && self.source.is_streaming() {
            let Some(frame) = self.source.read() else {
                std::thread::sleep(self.idle_poll);
                continue;
            };
            stats.frames += 1;
            meter.frames += 1;

            if let Some(bridge) = self.bridge.as_mut() {
                let batch: DetectionBatch = bridge.process_frame(&frame);
                if last_seq != Some(batch.seq) {
                    last_seq = Some(batch.seq);
                    stats.detections += 1;
                    meter.detections += 1;
                }
                if let Some(monitor) = self.monitor.as_mut() {
                    monitor.handle_detections(&batch, &frame, Instant::now());
                }
            }

            meter.maybe_log(Instant::now(), self.stats_interval);
        }

        self.shutdown();
        stats.elapsed = started.elapsed();
        info!(target: "sentinel::pipeline", "⏱️ 运行时长: {:.2}s", stats.elapsed.as_secs_f64());
        info!(target: "sentinel::pipeline", "📈 平均 FPS: {:.2}", stats.fps());
        stats
    }

    fn shutdown(&mut self) {
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.finish_recording();
        }
        if let Some(bridge) = self.bridge.as_ref() {
            bridge.terminate();
        }
        self.source.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::detection::{BBox, Detection};
    use crate::error::{Result, SentinelError};
    use crate::frame::Frame;
    use crate::input::{CaptureOpener, FrameSourceOptions, VideoCapture};

    /// 读出固定数量的帧后断开
    struct FiniteCapture {
        left: u32,
    }

    impl VideoCapture for FiniteCapture {
        fn read(&mut self) -> Result<Frame> {
            if self.left == 0 {
                return Err(SentinelError::Capture {
                    src: "finite".into(),
                    reason: "end of stream".into(),
                });
            }
            self.left -= 1;
            std::thread::sleep(Duration::from_millis(3));
            Ok(Frame::solid(4, 4, [0, 0, 0], 0))
        }

        fn release(&mut self) {}
    }

    struct FiniteOpener(u32);

    impl CaptureOpener for FiniteOpener {
        fn open(&self) -> Result<Box<dyn VideoCapture>> {
            Ok(Box::new(FiniteCapture { left: self.0 }))
        }

        fn describe(&self) -> String {
            "finite".into()
        }
    }

    fn source(frames: u32) -> FrameSource {
        let options = FrameSourceOptions {
            reconnect: false,
            offline_poll: Duration::from_millis(5),
            ..Default::default()
        };
        FrameSource::new(FiniteOpener(frames), options)
    }

    #[test]
    fn test_run_ends_with_stream() {
        let bridge = DetectorBridge::inline(|_: &Frame| -> anyhow::Result<Vec<Detection>> {
            Ok(vec![Detection {
                label: "person".into(),
                confidence: 0.9,
                bbox: BBox::new(0, 0, 1, 1),
                color: [0, 0, 255],
            }])
        });
        let monitor = Monitor::new(MonitorConfig::default());
        let mut pipeline = Pipeline::new(source(20), Some(bridge), Some(monitor));

        let stats = pipeline.run(Arc::new(AtomicBool::new(false)));
        assert!(stats.frames > 0);
        assert!(stats.frames <= 20);
        // 单线程检测每帧都是新结果
        assert_eq!(stats.detections, stats.frames);
    }

    #[test]
    fn test_run_stops_on_shutdown_flag() {
        let shutdown = Arc::new(AtomicBool::new(true));
        let mut pipeline = Pipeline::new(source(1_000_000), None, None);
        let stats = pipeline.run(shutdown);
        assert_eq!(stats.frames, 0);
    }

    #[test]
    fn test_stats_fps() {
        let stats = RunStats {
            frames: 30,
            detections: 10,
            elapsed: Duration::from_secs(2),
        };
        assert_eq!(stats.fps(), 15.0);
        assert_eq!(RunStats::default().fps(), 0.0);
    }
}
