/// 视频输入系统 (Video Input System)
///
/// 独立采集线程, 负责拉流、断线重连与断流检测
/// - Capture: 采集接口 (打开/读帧/释放)
/// - Decoder: FFmpeg子进程解码器 (RTSP / 本地摄像头 / 文件)
/// - Source:  帧源, 单槽只保留最新一帧
pub mod capture;
pub mod decoder;
pub mod source;

pub use capture::{CaptureOpener, VideoCapture};
pub use decoder::{FfmpegCapture, FfmpegOpener, InputSource};
pub use source::{EventCallback, FrameSource, FrameSourceOptions, StreamEvent};
