/// 视频采集接口 (Capture interface)
///
/// FrameSource 只依赖这两个trait, 真实实现见 `decoder.rs`。
use crate::error::Result;
use crate::frame::Frame;

/// 打开的视频流句柄
pub trait VideoCapture: Send {
    /// 读取一帧; `Err` 表示流已损坏, 需要重连
    fn read(&mut self) -> Result<Frame>;

    /// 释放句柄, 可重复调用
    fn release(&mut self);
}

/// 连接视频源
pub trait CaptureOpener: Send + Sync {
    fn open(&self) -> Result<Box<dyn VideoCapture>>;

    /// 日志里显示的视频源名称
    fn describe(&self) -> String;
}
