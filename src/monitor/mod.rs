/// 事件监控 (Detection Monitor)
///
/// 每帧接收检测结果, 维护检测序列:
/// - 序列激活时发送通知并开始录像 (每个序列只触发一次)
/// - 检测中断或达到最长时长时结束序列, 之后进入冷却期
pub mod series;

use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use log::{error, info, warn};

use crate::config::MonitorConfig;
use crate::detection::DetectionBatch;
use crate::frame::Frame;
use crate::notify::{annotate, compose_message, Notifier};
use crate::recording::Recorder;

pub use series::{BestDetection, DetectionSeries};

pub struct Monitor {
    config: MonitorConfig,
    recorder: Option<Box<dyn Recorder>>,
    notifier: Option<Box<dyn Notifier>>,
    show_detections: bool, // 通知图片上绘制检测框
    series: Option<DetectionSeries>,
    last_batch_seq: Option<u64>,
    last_series_ended_at: Option<Instant>,
}

impl Monitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            recorder: None,
            notifier: None,
            show_detections: false,
            series: None,
            last_batch_seq: None,
            last_series_ended_at: None,
        }
    }

    pub fn with_recorder(mut self, recorder: Box<dyn Recorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn show_detections(mut self, show: bool) -> Self {
        self.show_detections = show;
        self
    }

    /// 处理一帧及其检测结果
    pub fn handle_detections(&mut self, batch: &DetectionBatch, frame: &Frame, now: Instant) {
        // 录像缓冲总是接收每一帧
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.update(frame);
        }

        // 多线程检测时同一结果会被重复投递
        let stale = self.last_batch_seq == Some(batch.seq);
        if !stale {
            self.last_batch_seq = Some(batch.seq);
        }

        if self.in_debounce(now) {
            return;
        }

        if self.series.is_none() && !batch.is_empty() {
            info!(target: "sentinel::monitor", "👀 发现目标, 开始新的检测序列");
            self.series = Some(DetectionSeries::new(&self.config, now));
        }

        let Some(series) = self.series.as_mut() else {
            return;
        };

        // 只统计真正经过检测的帧
        if !stale {
            series.inc_frames_processed();
            if !batch.is_empty() {
                series.process_frame(frame, batch, now);
            }
        }

        if series.series_is_activating() {
            self.handle_activation();
            return;
        }

        let max_life_reached = series.max_life_reached(now);
        let lapse_exceeded = series.lapse_exceeded(now);
        if max_life_reached || lapse_exceeded {
            if lapse_exceeded {
                info!(
                    target: "sentinel::monitor",
                    "⏱️ 已有 {}s 没有检测到目标", self.config.detection_lapse_timeout
                );
            } else {
                info!(
                    target: "sentinel::monitor",
                    "⏱️ 检测序列达到最长时长 {}s", self.config.max_detection_duration
                );
            }
            self.terminate_series(now);
        }
    }

    fn handle_activation(&mut self) {
        info!(target: "sentinel::monitor", "🚨 检测已确认");

        if self.notifier.is_some() {
            self.send_first_notification();
        }

        if let Some(recorder) = self.recorder.as_mut() {
            match recorder.start() {
                Ok(Some(path)) => {
                    info!(target: "sentinel::monitor", "🎬 开始录像: {}", path.display())
                }
                Ok(None) => {}
                Err(e) => error!(target: "sentinel::monitor", "❌ 无法开始录像: {}", e),
            }
        }
    }

    fn send_first_notification(&self) {
        let (Some(notifier), Some(best)) = (
            self.notifier.as_ref(),
            self.series.as_ref().and_then(|s| s.best()),
        ) else {
            return;
        };

        let message = compose_message(&best.label, best.confidence);
        info!(target: "sentinel::monitor", "📨 发送推送通知: {}", message);

        let image = if self.show_detections {
            annotate(&best.frame, &best.detections)
        } else {
            best.frame.clone()
        };

        match panic::catch_unwind(AssertUnwindSafe(|| notifier.notify(&message, Some(&image)))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(target: "sentinel::monitor", "❌ 推送失败: {:#}", e),
            Err(_) => error!(target: "sentinel::monitor", "❌ 推送时发生panic"),
        }
    }

    fn terminate_series(&mut self, now: Instant) {
        let was_active = self.series.as_ref().map_or(false, |s| s.is_active());
        if was_active {
            self.last_series_ended_at = Some(now);
            info!(
                target: "sentinel::monitor",
                "💤 等待 {}s 后再开始新的检测序列", self.config.post_detection_debounce
            );
            self.finish_recording();
        }

        self.series = None;
        self.last_batch_seq = None;
    }

    /// 结束进行中的录像 (序列结束或程序退出时)
    pub fn finish_recording(&mut self) {
        let Some(recorder) = self.recorder.as_mut() else {
            return;
        };
        if !recorder.is_recording() {
            return;
        }
        match recorder.finish() {
            Ok(Some(path)) => info!(target: "sentinel::monitor", "💾 录像已保存: {}", path.display()),
            Ok(None) => {}
            Err(e) => warn!(target: "sentinel::monitor", "⚠️ 结束录像出错: {}", e),
        }
    }

    /// 上一个已激活序列结束后的冷却期内
    pub fn in_debounce(&self, now: Instant) -> bool {
        if self.series.is_some() {
            return false;
        }
        match self.last_series_ended_at {
            Some(ended) => now.saturating_duration_since(ended) < self.config.debounce(),
            None => false,
        }
    }

    pub fn series(&self) -> Option<&DetectionSeries> {
        self.series.as_ref()
    }
}
