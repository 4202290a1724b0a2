// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 配置参数
pub mod detection; // 检测桥与过滤
pub mod error; // 错误类型
pub mod frame; // 视频帧
pub mod input; // 视频输入系统
pub mod monitor; // 检测序列与事件判定
pub mod notify; // 推送通知
pub mod pipeline; // 主流水线
pub mod recording; // 预录缓冲与录像
pub mod slot; // 单槽缓冲

pub use crate::config::Config;
pub use crate::detection::{Detect, Detection, DetectionBatch, DetectorBridge};
pub use crate::error::{Result, SentinelError};
pub use crate::frame::Frame;
pub use crate::input::{FrameSource, FrameSourceOptions, StreamEvent};
pub use crate::monitor::{DetectionSeries, Monitor};
pub use crate::notify::{Notifier, Pushover};
pub use crate::pipeline::{Pipeline, RunStats};
pub use crate::recording::{Recorder, RecordingBuffer, RecordingOptions};

/// 本地时间字符串, 各字段用 `delimiter` 分隔
pub fn gen_time_string(delimiter: &str) -> String {
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S",
        delimiter, delimiter, delimiter, delimiter, delimiter
    );
    chrono::Local::now().format(&fmt).to_string()
}
