//! 视频编码器 (Video Encoder)
//!
//! 默认实现把RGB24帧通过stdin送给ffmpeg子进程编码。

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use log::debug;

use crate::error::{Result, SentinelError};
use crate::frame::Frame;

pub trait VideoEncoder: Send {
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// 写完剩余数据并关闭文件
    fn close(&mut self) -> Result<()>;
}

pub trait EncoderFactory: Send {
    fn open(&self, path: &Path, fps: u32, dimensions: (u32, u32)) -> Result<Box<dyn VideoEncoder>>;
}

pub struct FfmpegEncoderFactory {
    codec: String,
}

impl FfmpegEncoderFactory {
    pub fn new(codec: impl Into<String>) -> Self {
        Self {
            codec: codec.into(),
        }
    }
}

/// ffmpeg编码参数
pub fn encoder_args(codec: &str, path: &Path, fps: u32, (width, height): (u32, u32)) -> Vec<String> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-y",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgb24",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    args.extend([
        "-s".to_string(),
        format!("{}x{}", width, height),
        "-r".to_string(),
        fps.to_string(),
        "-i".to_string(),
        "-".to_string(),
        "-an".to_string(),
        "-c:v".to_string(),
        codec.to_string(),
    ]);
    if codec == "mjpeg" {
        args.extend(["-q:v".to_string(), "3".to_string()]);
    }
    args.push(path.to_string_lossy().into_owned());
    args
}

impl EncoderFactory for FfmpegEncoderFactory {
    fn open(&self, path: &Path, fps: u32, dimensions: (u32, u32)) -> Result<Box<dyn VideoEncoder>> {
        let args = encoder_args(&self.codec, path, fps, dimensions);
        debug!(target: "sentinel::recorder", "ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| SentinelError::Encoder(format!("无法启动ffmpeg: {}", e)))?;

        let Some(stdin) = child.stdin.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SentinelError::Encoder("无法打开ffmpeg输入".into()));
        };

        Ok(Box::new(FfmpegEncoder {
            child: Some(child),
            stdin: Some(stdin),
            dimensions,
            path: path.to_path_buf(),
        }))
    }
}

struct FfmpegEncoder {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    dimensions: (u32, u32),
    path: PathBuf,
}

impl VideoEncoder for FfmpegEncoder {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        if frame.dimensions() != self.dimensions {
            return Err(SentinelError::Encoder(format!(
                "帧尺寸 {:?} 与录像尺寸 {:?} 不一致",
                frame.dimensions(),
                self.dimensions
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| SentinelError::Encoder("encoder already closed".into()))?;
        stdin.write_all(frame.data())?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // 关闭stdin, ffmpeg收到EOF后写文件尾
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(SentinelError::Encoder(format!(
                "ffmpeg退出异常 ({}) : {}",
                status,
                self.path.display()
            )))
        }
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
