//! 预录缓冲 + 异步写文件 (Recording Buffer)
//!
//! 环形缓冲始终保存最近 `buffer_size` 帧; 开始录像时这些帧先入队,
//! 之后每一帧也直接入队, 预录与实时画面之间没有间隙。

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{error, info, warn};

use super::disk::DiskSpace;
use super::encoder::{EncoderFactory, VideoEncoder};
use super::Recorder;
use crate::config::WriterConfig;
use crate::error::{Result, SentinelError};
use crate::frame::Frame;

#[derive(Clone, Debug)]
pub struct RecordingOptions {
    pub buffer_size: usize,
    pub min_disk_space_gb: f64,
    pub fps: u32,
    pub output_dir: PathBuf,
    pub extension: String,
    pub writer_idle: Duration, // 队列为空时写线程的休眠
}

impl From<&WriterConfig> for RecordingOptions {
    fn from(config: &WriterConfig) -> Self {
        Self {
            buffer_size: config.buffer_size,
            min_disk_space_gb: config.min_disk_space_gb,
            fps: config.fps,
            output_dir: config.output_path(),
            extension: config.extension.clone(),
            writer_idle: Duration::from_millis(100),
        }
    }
}

/// 生成录像路径 `<dir>/<YYYY-MM-DD>/<HH-MM-SS.mmm>.<ext>`
///
/// 同名文件已存在时追加序号, 保证每段录像路径不同。
pub fn clip_path(output_dir: &Path, extension: &str, timestamp: DateTime<Local>) -> std::io::Result<PathBuf> {
    let date_dir = output_dir.join(timestamp.format("%Y-%m-%d").to_string());
    std::fs::create_dir_all(&date_dir)?;

    let stem = timestamp.format("%H-%M-%S%.3f").to_string();
    let mut path = date_dir.join(format!("{}.{}", stem, extension));
    let mut n = 1;
    while path.exists() {
        path = date_dir.join(format!("{}-{}.{}", stem, n, extension));
        n += 1;
    }
    Ok(path)
}

type FrameQueue = Arc<Mutex<VecDeque<Frame>>>;

fn lock(queue: &FrameQueue) -> MutexGuard<'_, VecDeque<Frame>> {
    queue.lock().unwrap_or_else(|e| e.into_inner())
}

/// 写一帧; 单帧失败只记录日志
fn write_frame(encoder: &mut dyn VideoEncoder, frame: &Frame) {
    if let Err(e) = encoder.write(frame) {
        warn!(target: "sentinel::recorder", "⚠️ 写入帧#{}失败: {}", frame.seq(), e);
    }
}

/// 进行中的录像
struct ActiveClip {
    path: PathBuf,
    handle: JoinHandle<Box<dyn VideoEncoder>>,
}

pub struct RecordingBuffer {
    options: RecordingOptions,
    factory: Box<dyn EncoderFactory>,
    disk: Box<dyn DiskSpace>,
    ring: VecDeque<Frame>,
    queue: FrameQueue,
    recording: Arc<AtomicBool>,
    clip: Option<ActiveClip>,
}

impl RecordingBuffer {
    pub fn new(options: RecordingOptions, factory: Box<dyn EncoderFactory>, disk: Box<dyn DiskSpace>) -> Self {
        Self {
            ring: VecDeque::with_capacity(options.buffer_size),
            options,
            factory,
            disk,
            queue: Arc::default(),
            recording: Arc::new(AtomicBool::new(false)),
            clip: None,
        }
    }

    /// 缓冲新帧; 录像中同时入队
    pub fn update(&mut self, frame: &Frame) {
        if self.ring.len() >= self.options.buffer_size {
            self.ring.pop_front();
        }
        self.ring.push_back(frame.clone());

        if self.is_recording() {
            lock(&self.queue).push_back(frame.clone());
        }
    }

    fn has_enough_disk(&self) -> bool {
        match self.disk.free_gb(&self.options.output_dir) {
            Some(free) if free < self.options.min_disk_space_gb => {
                warn!(
                    target: "sentinel::recorder",
                    "⚠️ 磁盘剩余空间不足, 不录像: {:.2}GB < {:.2}GB",
                    free, self.options.min_disk_space_gb
                );
                false
            }
            Some(_) => true,
            None => {
                warn!(
                    target: "sentinel::recorder",
                    "⚠️ 无法获取 {} 所在磁盘的剩余空间", self.options.output_dir.display()
                );
                true
            }
        }
    }

    /// 开始录像, 返回录像文件路径
    ///
    /// 已在录像或磁盘空间不足时返回 `Ok(None)`。
    pub fn start(&mut self) -> Result<Option<PathBuf>> {
        if self.is_recording() {
            return Ok(None);
        }
        if !self.has_enough_disk() {
            return Ok(None);
        }

        let dimensions = self
            .ring
            .back()
            .map(Frame::dimensions)
            .ok_or(SentinelError::EmptyBuffer)?;
        let path = clip_path(&self.options.output_dir, &self.options.extension, Local::now())?;
        let mut encoder = self.factory.open(&path, self.options.fps, dimensions)?;

        // 预录帧按从旧到新的顺序入队
        {
            let mut queue = lock(&self.queue);
            queue.clear();
            queue.extend(self.ring.iter().cloned());
        }
        self.recording.store(true, Ordering::Release);

        let (queue, recording, idle) = (self.queue.clone(), self.recording.clone(), self.options.writer_idle);
        let spawned = std::thread::Builder::new()
            .name("sentinel-writer".into())
            .spawn(move || {
                while recording.load(Ordering::Acquire) {
                    let next = lock(&queue).pop_front();
                    match next {
                        Some(frame) => write_frame(encoder.as_mut(), &frame),
                        None => std::thread::sleep(idle),
                    }
                }
                encoder
            });

        match spawned {
            Ok(handle) => {
                info!(target: "sentinel::recorder", "🔴 开始录像: {}", path.display());
                self.clip = Some(ActiveClip {
                    path: path.clone(),
                    handle,
                });
                Ok(Some(path))
            }
            Err(e) => {
                self.recording.store(false, Ordering::Release);
                lock(&self.queue).clear();
                Err(e.into())
            }
        }
    }

    /// 结束录像: 等写线程退出, 写完剩余帧, 关闭文件
    pub fn finish(&mut self) -> Result<Option<PathBuf>> {
        self.recording.store(false, Ordering::Release);
        let Some(clip) = self.clip.take() else {
            return Ok(None);
        };

        let mut encoder = match clip.handle.join() {
            Ok(encoder) => encoder,
            Err(_) => {
                lock(&self.queue).clear();
                error!(target: "sentinel::recorder", "❌ 写线程异常退出: {}", clip.path.display());
                return Err(SentinelError::Encoder(format!(
                    "writer thread panicked while recording {}",
                    clip.path.display()
                )));
            }
        };

        let remaining: Vec<Frame> = lock(&self.queue).drain(..).collect();
        for frame in &remaining {
            write_frame(encoder.as_mut(), frame);
        }
        encoder.close()?;

        info!(target: "sentinel::recorder", "💾 录像已保存: {}", clip.path.display());
        Ok(Some(clip.path))
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) fn buffered(&self) -> usize {
        self.ring.len()
    }
}

impl Recorder for RecordingBuffer {
    fn update(&mut self, frame: &Frame) {
        RecordingBuffer::update(self, frame)
    }

    fn start(&mut self) -> Result<Option<PathBuf>> {
        RecordingBuffer::start(self)
    }

    fn finish(&mut self) -> Result<Option<PathBuf>> {
        RecordingBuffer::finish(self)
    }

    fn is_recording(&self) -> bool {
        RecordingBuffer::is_recording(self)
    }
}

impl Drop for RecordingBuffer {
    fn drop(&mut self) {
        if self.clip.is_some() {
            if let Err(e) = self.finish() {
                error!(target: "sentinel::recorder", "❌ 退出时结束录像失败: {}", e);
            }
        }
    }
}
