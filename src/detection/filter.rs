//! 检测过滤 - 置信度阈值 + 类别白名单, 并附上标签与绘制颜色

use std::collections::HashMap;

use log::warn;
use rand::Rng;

use super::detector::Detect;
use super::types::{BBox, Detection, RawDetection};
use crate::frame::Frame;

/// 输出原始检测 (类别序号) 的模型接口
pub trait DetectRaw: Send {
    fn detect_raw(&mut self, frame: &Frame) -> anyhow::Result<Vec<RawDetection>>;
}

pub struct DetectionFilter {
    all_classes: Vec<String>,
    colors: HashMap<String, [u8; 3]>, // 仅包含有效类别
    min_confidence: f32,
}

impl DetectionFilter {
    pub fn new<S: AsRef<str>>(all_classes: &[S], requested: &[String], min_confidence: f32) -> Self {
        let all_classes: Vec<String> = all_classes.iter().map(|c| c.as_ref().to_string()).collect();

        let mut rng = rand::thread_rng();
        let mut colors = HashMap::new();
        for class in requested {
            if all_classes.contains(class) {
                colors.insert(class.clone(), [rng.gen(), rng.gen(), rng.gen()]);
            } else {
                warn!(target: "sentinel::detector", "⚠️ 请求的类别 \"{}\" 不在模型类别中", class);
            }
        }

        Self {
            all_classes,
            colors,
            min_confidence,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_valid(&self, label: &str) -> bool {
        self.colors.contains_key(label)
    }

    #[cfg(test)]
    pub(crate) fn valid_class_count(&self) -> usize {
        self.colors.len()
    }

    pub fn color_of(&self, label: &str) -> Option<[u8; 3]> {
        self.colors.get(label).copied()
    }

    /// 过滤并补全检测结果
    pub fn hydrate(&self, raw: &[RawDetection]) -> Vec<Detection> {
        raw.iter()
            .filter(|d| d.confidence > self.min_confidence)
            .filter_map(|d| {
                let label = self.all_classes.get(d.class_index)?;
                let color = self.color_of(label)?;
                Some(Detection {
                    label: label.clone(),
                    confidence: d.confidence,
                    bbox: BBox::from_array(d.bbox),
                    color,
                })
            })
            .collect()
    }
}

/// 原始模型 + 过滤器 = 可直接交给检测桥的检测器
pub struct FilteredDetector<R> {
    model: R,
    filter: DetectionFilter,
}

impl<R: DetectRaw> FilteredDetector<R> {
    pub fn new(model: R, filter: DetectionFilter) -> Self {
        Self { model, filter }
    }
}

impl<R: DetectRaw> Detect for FilteredDetector<R> {
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<Vec<Detection>> {
        let raw = self.model.detect_raw(frame)?;
        Ok(self.filter.hydrate(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::COCO_CLASSES;

    fn raw(class_index: usize, confidence: f32) -> RawDetection {
        RawDetection {
            class_index,
            confidence,
            bbox: [1, 2, 3, 4],
        }
    }

    #[test]
    fn test_hydrate_filters_class_and_confidence() {
        let filter = DetectionFilter::new(&COCO_CLASSES, &["person".to_string(), "dog".to_string()], 0.5);
        assert_eq!(filter.valid_class_count(), 2);

        let out = filter.hydrate(&[raw(0, 0.9), raw(0, 0.5), raw(2, 0.99), raw(16, 0.6), raw(999, 0.9)]);
        let labels: Vec<_> = out.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["person", "dog"]);
        assert_eq!(out[0].bbox, BBox::new(1, 2, 3, 4));
        assert_eq!(Some(out[0].color), filter.color_of("person"));
    }

    #[test]
    fn test_unknown_requested_class_is_dropped() {
        let filter = DetectionFilter::new(&COCO_CLASSES, &["unicorn".to_string()], 0.1);
        assert_eq!(filter.valid_class_count(), 0);
        assert!(!filter.is_valid("unicorn"));
    }

    struct FixedModel(Vec<RawDetection>);

    impl DetectRaw for FixedModel {
        fn detect_raw(&mut self, _frame: &Frame) -> anyhow::Result<Vec<RawDetection>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_filtered_detector() {
        let filter = DetectionFilter::new(&COCO_CLASSES, &["person".to_string()], 0.3);
        let mut detector = FilteredDetector::new(FixedModel(vec![raw(0, 0.4), raw(1, 0.9)]), filter);
        let out = detector.detect(&Frame::solid(2, 2, [0, 0, 0], 0)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, "person");
    }
}
