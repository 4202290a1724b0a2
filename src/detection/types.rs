use std::sync::Arc;

use serde::Deserialize;

/// 检测系统数据结构定义
/// Data structures for detection system

// ========== 数据结构 ==========

/// 检测框 (像素坐标)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct BBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn from_array(b: [i32; 4]) -> Self {
        Self::new(b[0], b[1], b[2], b[3])
    }

    pub fn width(&self) -> i32 {
        (self.x2 - self.x1).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.y2 - self.y1).max(0)
    }
}

/// 过滤后的检测结果 (检测器 → 监控器)
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub label: String,
    pub confidence: f32, // (0, 1]
    pub bbox: BBox,
    pub color: [u8; 3], // 绘制颜色
}

/// 模型原始输出 (过滤前)
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RawDetection {
    pub class_index: usize,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: [i32; 4],
}

/// 一次检测器输出
///
/// `seq` 是检测桥为每个新结果分配的代数; 相同 `seq` 即同一个结果,
/// 监控器据此判断重复投递, 不比较内容。
#[derive(Clone, Debug)]
pub struct DetectionBatch {
    pub seq: u64,
    pub detections: Arc<Vec<Detection>>,
}

impl DetectionBatch {
    pub fn new(seq: u64, detections: Vec<Detection>) -> Self {
        Self {
            seq,
            detections: Arc::new(detections),
        }
    }

    /// 初始空结果 (seq = 0)
    pub fn initial() -> Self {
        Self::new(0, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }

    /// 是否是同一次检测的结果
    pub fn is_same(&self, other: &DetectionBatch) -> bool {
        self.seq == other.seq
    }
}

// ========== 公共常量 ==========

/// COCO 80类标签
pub const COCO_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];
