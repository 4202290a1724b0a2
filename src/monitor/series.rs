//! 检测序列 (Detection Series)
//!
//! 一次候选事件: 从第一次检测到结束。
//! pending → active 只发生一次; 结束条件由监控器每帧查询。

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::MonitorConfig;
use crate::detection::{Detection, DetectionBatch};
use crate::frame::Frame;

/// 序列中置信度最高的一次检测, 用于通知
#[derive(Clone, Debug)]
pub struct BestDetection {
    pub frame: Frame,
    pub label: String,
    pub confidence: f32,
    pub detections: Arc<Vec<Detection>>, // 同一帧上的全部检测, 绘制用
}

#[derive(Debug)]
pub struct DetectionSeries {
    min_detection_frames: u32,
    min_detection_ratio: f64,
    lapse_timeout: Duration,
    max_duration: Duration,

    first_detection_at: Instant,
    last_detection_at: Instant,
    frames_processed: u32,
    detections_in_series: u32,
    active: bool,
    best: Option<BestDetection>,
}

impl DetectionSeries {
    pub fn new(config: &MonitorConfig, now: Instant) -> Self {
        Self {
            min_detection_frames: config.min_detection_frames,
            min_detection_ratio: config.min_detection_ratio,
            lapse_timeout: config.lapse_timeout(),
            max_duration: config.max_duration(),
            first_detection_at: now,
            last_detection_at: now,
            frames_processed: 0,
            detections_in_series: 0,
            active: false,
            best: None,
        }
    }

    pub fn inc_frames_processed(&mut self) {
        self.frames_processed += 1;
    }

    /// 记录一帧有效检测, 并更新最佳结果 (严格大于才替换)
    pub fn process_frame(&mut self, frame: &Frame, batch: &DetectionBatch, now: Instant) {
        self.detections_in_series += 1;
        self.last_detection_at = now;

        for detection in batch.iter() {
            let better = match &self.best {
                None => true,
                Some(best) => detection.confidence > best.confidence,
            };
            if better {
                self.best = Some(BestDetection {
                    frame: frame.clone(),
                    label: detection.label.clone(),
                    confidence: detection.confidence,
                    detections: Arc::clone(&batch.detections),
                });
            }
        }
    }

    fn detected_in_enough_frames(&self) -> bool {
        self.detections_in_series >= self.min_detection_frames
    }

    fn detection_ratio_is_high_enough(&self) -> bool {
        if self.frames_processed == 0 || self.frames_processed < self.min_detection_frames {
            return false;
        }
        let ratio = self.detections_in_series as f64 / self.frames_processed as f64;
        ratio >= self.min_detection_ratio
    }

    /// 满足激活条件时激活, 只在激活的那一次返回 true
    pub fn series_is_activating(&mut self) -> bool {
        if self.active {
            return false;
        }
        let activating = self.detected_in_enough_frames() && self.detection_ratio_is_high_enough();
        if activating {
            self.active = true;
        }
        activating
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn max_life_reached(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.first_detection_at) >= self.max_duration
    }

    pub fn lapse_exceeded(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_detection_at) >= self.lapse_timeout
    }

    pub fn frames_processed(&self) -> u32 {
        self.frames_processed
    }

    pub fn detections_in_series(&self) -> u32 {
        self.detections_in_series
    }

    pub fn best(&self) -> Option<&BestDetection> {
        self.best.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BBox;

    fn config(frames: u32, ratio: f64) -> MonitorConfig {
        MonitorConfig {
            min_detection_frames: frames,
            min_detection_ratio: ratio,
            detection_lapse_timeout: 5.0,
            max_detection_duration: 60.0,
            post_detection_debounce: 10.0,
        }
    }

    fn batch(seq: u64, confidences: &[f32]) -> DetectionBatch {
        let detections = confidences
            .iter()
            .map(|&confidence| Detection {
                label: format!("c{}", (confidence * 100.0) as i32),
                confidence,
                bbox: BBox::new(0, 0, 1, 1),
                color: [0, 255, 0],
            })
            .collect();
        DetectionBatch::new(seq, detections)
    }

    /// 按命中序列喂帧, 返回激活发生在第几帧 (从1开始)
    fn feed(series: &mut DetectionSeries, hits: &[bool], t0: Instant) -> Option<usize> {
        let frame = Frame::solid(2, 2, [0, 0, 0], 0);
        let mut activated_at = None;
        for (i, &hit) in hits.iter().enumerate() {
            series.inc_frames_processed();
            if hit {
                series.process_frame(&frame, &batch(i as u64 + 1, &[0.9]), t0);
            }
            if series.series_is_activating() {
                assert!(activated_at.is_none(), "activation fired twice");
                activated_at = Some(i + 1);
            }
        }
        activated_at
    }

    #[test]
    fn test_activates_on_fourth_frame() {
        let t0 = Instant::now();
        let mut series = DetectionSeries::new(&config(3, 0.6), t0);
        assert_eq!(feed(&mut series, &[true, true, false, true], t0), Some(4));
        assert!(series.is_active());
    }

    #[test]
    fn test_activation_fires_once() {
        let t0 = Instant::now();
        let mut series = DetectionSeries::new(&config(2, 0.5), t0);
        assert_eq!(feed(&mut series, &[true, true, true, true, true], t0), Some(2));
        assert!(!series.series_is_activating());
    }

    #[test]
    fn test_low_ratio_never_activates() {
        let t0 = Instant::now();
        let mut series = DetectionSeries::new(&config(2, 0.9), t0);
        assert_eq!(feed(&mut series, &[true, false, true, false, true, false], t0), None);
    }

    #[test]
    fn test_zero_frames_never_activates() {
        let t0 = Instant::now();
        let mut series = DetectionSeries::new(&config(1, 0.1), t0);
        // 检测计数达标但没有处理过任何帧
        series.process_frame(&Frame::solid(2, 2, [0, 0, 0], 0), &batch(1, &[0.9]), t0);
        assert_eq!(series.frames_processed(), 0);
        assert!(!series.series_is_activating());
    }

    #[test]
    fn test_best_detection_requires_strictly_higher() {
        let t0 = Instant::now();
        let mut series = DetectionSeries::new(&config(1, 0.1), t0);
        let first = Frame::solid(2, 2, [1, 1, 1], 1);
        let second = Frame::solid(2, 2, [2, 2, 2], 2);
        series.process_frame(&first, &batch(1, &[0.7, 0.4]), t0);
        series.process_frame(&second, &batch(2, &[0.7]), t0);
        let best = series.best().unwrap();
        assert_eq!(best.frame.seq(), 1);
        assert_eq!(best.confidence, 0.7);
        assert_eq!(best.detections.len(), 2);

        let third = Frame::solid(2, 2, [3, 3, 3], 3);
        series.process_frame(&third, &batch(3, &[0.71]), t0);
        assert_eq!(series.best().unwrap().frame.seq(), 3);
    }

    #[test]
    fn test_lapse_before_max_life() {
        let t0 = Instant::now();
        let mut series = DetectionSeries::new(&config(5, 0.5), t0);
        series.inc_frames_processed();
        series.process_frame(&Frame::solid(2, 2, [0, 0, 0], 0), &batch(1, &[0.8]), t0);

        let later = t0 + Duration::from_secs(6);
        assert!(series.lapse_exceeded(later));
        assert!(!series.max_life_reached(later));
        assert!(!series.lapse_exceeded(t0 + Duration::from_secs(4)));
    }

    #[test]
    fn test_max_life_counts_from_series_start() {
        let t0 = Instant::now();
        let mut series = DetectionSeries::new(&config(5, 0.5), t0);
        let frame = Frame::solid(2, 2, [0, 0, 0], 0);
        // 每秒都有检测, 不会中断, 60秒后到达最长时长
        for s in 0..=60 {
            series.process_frame(&frame, &batch(s + 1, &[0.8]), t0 + Duration::from_secs(s));
        }
        let now = t0 + Duration::from_secs(60);
        assert!(series.max_life_reached(now));
        assert!(!series.lapse_exceeded(now));
    }
}
