/// 检测系统 (Detection System)
///
/// - Detector: 检测桥, 单线程或独立工作线程推理
/// - Filter:   置信度/类别过滤, 补全标签与颜色
/// - Remote:   外部推理服务适配
pub mod detector;
pub mod filter;
pub mod remote;
pub mod types;

pub use detector::{Detect, DetectorBridge};
pub use filter::{DetectRaw, DetectionFilter, FilteredDetector};
pub use remote::RemoteDetector;
pub use types::{BBox, Detection, DetectionBatch, RawDetection, COCO_CLASSES};
