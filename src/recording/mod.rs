/// 事件录像 (Event Recording)
///
/// - Buffer:  预录环形缓冲 + 写线程
/// - Encoder: 视频编码接口与ffmpeg实现
/// - Disk:    磁盘剩余空间检测
pub mod buffer;
pub mod disk;
pub mod encoder;

use std::path::PathBuf;

use crate::error::Result;
use crate::frame::Frame;

pub use buffer::{clip_path, RecordingBuffer, RecordingOptions};
pub use disk::{DiskSpace, SysinfoDisk};
pub use encoder::{EncoderFactory, FfmpegEncoderFactory, VideoEncoder};

/// 录像接口, 监控器通过它控制录像
pub trait Recorder: Send {
    /// 每帧调用
    fn update(&mut self, frame: &Frame);

    /// 开始录像; 未开始 (已在录像、磁盘不足) 时返回 `Ok(None)`
    fn start(&mut self) -> Result<Option<PathBuf>>;

    /// 结束录像, 返回保存的文件路径
    fn finish(&mut self) -> Result<Option<PathBuf>>;

    fn is_recording(&self) -> bool;
}
