/// FFmpeg拉流解码器
/// FFmpeg subprocess decoder: RTSP / 本地摄像头 / 视频文件 → RGB24帧
///
/// ffmpeg 负责解码和缩放, 通过stdout输出rawvideo, 每帧固定 width*height*3 字节。
use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};

use log::{debug, info};

use super::capture::{CaptureOpener, VideoCapture};
use crate::error::{Result, SentinelError};
use crate::frame::{rgb_len, Frame};

/// 视频源类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Rtsp(String),
    Camera(usize),
    Other(String), // 文件或ffmpeg能识别的其他地址
}

impl InputSource {
    pub fn parse(src: &str) -> Self {
        let src = src.trim();
        if let Ok(index) = src.parse::<usize>() {
            InputSource::Camera(index)
        } else if src.starts_with("rtsp://") || src.starts_with("rtsps://") {
            InputSource::Rtsp(src.to_string())
        } else {
            InputSource::Other(src.to_string())
        }
    }
}

/// 根据平台格式化摄像头参数: (格式, 输入地址)
fn camera_input(index: usize) -> (&'static str, String) {
    if cfg!(target_os = "windows") {
        ("dshow", format!("video={}", index))
    } else if cfg!(target_os = "macos") {
        ("avfoundation", format!("{}", index))
    } else {
        ("v4l2", format!("/dev/video{}", index))
    }
}

/// 构建ffmpeg命令行参数
pub fn ffmpeg_args(source: &InputSource, width: u32, height: u32) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostdin"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    match source {
        InputSource::Rtsp(url) => {
            // RTSP传输优化 + 低延迟
            args.extend(
                ["-rtsp_transport", "tcp", "-fflags", "nobuffer", "-flags", "low_delay", "-i"]
                    .iter()
                    .map(|s| s.to_string()),
            );
            args.push(url.clone());
        }
        InputSource::Camera(index) => {
            let (format, input) = camera_input(*index);
            args.extend(["-f".to_string(), format.to_string(), "-i".to_string(), input]);
        }
        InputSource::Other(path) => {
            args.extend(["-re".to_string(), "-i".to_string(), path.clone()]);
        }
    }

    args.extend(
        [
            "-an".to_string(),
            "-vf".to_string(),
            format!("scale={}:{}", width, height),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-".to_string(),
        ],
    );
    args
}

pub struct FfmpegOpener {
    source: InputSource,
    width: u32,
    height: u32,
}

impl FfmpegOpener {
    pub fn new(src: &str, width: u32, height: u32) -> Self {
        Self {
            source: InputSource::parse(src),
            width,
            height,
        }
    }
}

impl CaptureOpener for FfmpegOpener {
    fn open(&self) -> Result<Box<dyn VideoCapture>> {
        let args = ffmpeg_args(&self.source, self.width, self.height);
        debug!(target: "sentinel::input", "ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| self.capture_error(format!("无法启动ffmpeg: {}", e)))?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(self.capture_error("无法获取ffmpeg输出".to_string()));
            }
        };

        let mut capture = FfmpegCapture {
            child: Some(child),
            stdout: Some(stdout),
            width: self.width,
            height: self.height,
            pending: None,
            label: self.describe(),
        };

        // 读到第一帧才算连接成功
        match capture.read() {
            Ok(first) => {
                capture.pending = Some(first);
                Ok(Box::new(capture))
            }
            Err(e) => {
                capture.release();
                Err(self.capture_error(format!("未读到首帧: {}", e)))
            }
        }
    }

    fn describe(&self) -> String {
        match &self.source {
            InputSource::Rtsp(url) => url.clone(),
            InputSource::Camera(index) => format!("camera #{}", index),
            InputSource::Other(path) => path.clone(),
        }
    }
}

impl FfmpegOpener {
    fn capture_error(&self, reason: String) -> SentinelError {
        SentinelError::Capture {
            src: self.describe(),
            reason,
        }
    }
}

pub struct FfmpegCapture {
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    width: u32,
    height: u32,
    pending: Option<Frame>, // 连接校验时读到的首帧
    label: String,
}

impl VideoCapture for FfmpegCapture {
    fn read(&mut self) -> Result<Frame> {
        if let Some(frame) = self.pending.take() {
            return Ok(frame);
        }

        let len = rgb_len(self.width, self.height).ok_or_else(|| SentinelError::Capture {
            src: self.label.clone(),
            reason: format!("frame size {}x{} overflows", self.width, self.height),
        })?;
        let stdout = self.stdout.as_mut().ok_or_else(|| SentinelError::Capture {
            src: self.label.clone(),
            reason: "stream released".to_string(),
        })?;

        let mut buffer = vec![0u8; len];
        stdout.read_exact(&mut buffer)?;

        Frame::from_rgb(self.width, self.height, buffer, 0).ok_or_else(|| SentinelError::Capture {
            src: self.label.clone(),
            reason: "frame size mismatch".to_string(),
        })
    }

    fn release(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            info!(target: "sentinel::input", "📹 已释放视频源: {}", self.label);
        }
    }
}

impl Drop for FfmpegCapture {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input_source() {
        assert_eq!(InputSource::parse("0"), InputSource::Camera(0));
        assert_eq!(InputSource::parse(" 2 "), InputSource::Camera(2));
        assert_eq!(
            InputSource::parse("rtsp://cam/stream"),
            InputSource::Rtsp("rtsp://cam/stream".into())
        );
        assert_eq!(
            InputSource::parse("/videos/porch.mp4"),
            InputSource::Other("/videos/porch.mp4".into())
        );
    }

    #[test]
    fn test_rtsp_args_use_tcp_and_scale() {
        let args = ffmpeg_args(&InputSource::Rtsp("rtsp://cam".into()), 640, 360);
        let joined = args.join(" ");
        assert!(joined.contains("-rtsp_transport tcp"));
        assert!(joined.contains("-i rtsp://cam"));
        assert!(joined.contains("scale=640:360"));
        assert!(joined.ends_with("-pix_fmt rgb24 -f rawvideo -"));
    }

    #[test]
    fn test_oversized_frame_is_a_capture_error() {
        let mut capture = FfmpegCapture {
            child: None,
            stdout: None,
            width: u32::MAX,
            height: u32::MAX,
            pending: None,
            label: "test".into(),
        };
        assert!(matches!(
            capture.read(),
            Err(SentinelError::Capture { reason, .. }) if reason.contains("overflows")
        ));
    }

    #[test]
    fn test_camera_args_name_a_device_format() {
        let args = ffmpeg_args(&InputSource::Camera(1), 320, 240);
        let f = args.iter().position(|a| a == "-f").unwrap();
        assert!(["dshow", "avfoundation", "v4l2"].contains(&args[f + 1].as_str()));
    }
}
