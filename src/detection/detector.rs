//! 检测桥 (Detector Bridge)
//! 职责: 包装外部检测函数, 让慢速推理与采集帧率解耦
//!
//! - 单线程模式: 每帧同步调用检测器
//! - 多线程模式: inbox/outbox 两个单槽, 独立工作线程推理,
//!   主循环只投递帧、取最新结果, 永不阻塞

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{error, info, warn};

use super::types::{Detection, DetectionBatch};
use crate::frame::Frame;
use crate::slot::Slot;

/// 工作线程等待inbox的最长时间, 决定terminate的响应速度
const WORKER_POLL: Duration = Duration::from_millis(50);

/// 外部检测器接口
pub trait Detect: Send {
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<Vec<Detection>>;
}

impl<F> Detect for F
where
    F: FnMut(&Frame) -> anyhow::Result<Vec<Detection>> + Send,
{
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<Vec<Detection>> {
        self(frame)
    }
}

/// 调用检测器; 错误或panic都记录日志并返回空结果
fn run_detection(detector: &mut dyn Detect, frame: &Frame) -> Vec<Detection> {
    match panic::catch_unwind(AssertUnwindSafe(|| detector.detect(frame))) {
        Ok(Ok(detections)) => detections,
        Ok(Err(e)) => {
            error!(target: "sentinel::detector", "❌ 推理出错 (帧#{}): {:#}", frame.seq(), e);
            Vec::new()
        }
        Err(_) => {
            error!(target: "sentinel::detector", "❌ 检测器panic (帧#{}), 本帧按无检测处理", frame.seq());
            Vec::new()
        }
    }
}

/// 多线程模式的工作线程句柄
struct Worker {
    inbox: Slot<Frame>,
    outbox: Slot<DetectionBatch>,
    active: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(mut detector: Box<dyn Detect>) -> std::io::Result<Self> {
        let inbox: Slot<Frame> = Slot::new();
        let outbox: Slot<DetectionBatch> = Slot::new();
        let active = Arc::new(AtomicBool::new(true));

        let (rx_frames, tx_results, running) = (inbox.clone(), outbox.clone(), active.clone());
        let handle = std::thread::Builder::new()
            .name("sentinel-detector".into())
            .spawn(move || {
                info!(target: "sentinel::detector", "🔍 检测线程启动");
                let mut seq = 0u64;
                while running.load(Ordering::Acquire) {
                    let Some(frame) = rx_frames.take_timeout(WORKER_POLL) else {
                        continue;
                    };
                    let detections = run_detection(detector.as_mut(), &frame);
                    seq += 1;
                    tx_results.replace(DetectionBatch::new(seq, detections));
                }
                info!(target: "sentinel::detector", "✅ 检测线程退出");
            })?;

        Ok(Self {
            inbox,
            outbox,
            active,
            handle: Some(handle),
        })
    }
}

enum Mode {
    Inline(Box<dyn Detect>),
    Threaded(Worker),
}

pub struct DetectorBridge {
    mode: Mode,
    last_batch: DetectionBatch,
    next_seq: u64, // 单线程模式的结果代数
}

impl DetectorBridge {
    pub fn new(detector: Box<dyn Detect>, threaded: bool) -> std::io::Result<Self> {
        let mode = if threaded {
            Mode::Threaded(Worker::spawn(detector)?)
        } else {
            Mode::Inline(detector)
        };
        Ok(Self {
            mode,
            last_batch: DetectionBatch::initial(),
            next_seq: 1,
        })
    }

    pub fn inline(detector: impl Detect + 'static) -> Self {
        Self {
            mode: Mode::Inline(Box::new(detector)),
            last_batch: DetectionBatch::initial(),
            next_seq: 1,
        }
    }

    pub fn threaded(detector: impl Detect + 'static) -> std::io::Result<Self> {
        Self::new(Box::new(detector), true)
    }

    pub fn is_threaded(&self) -> bool {
        matches!(self.mode, Mode::Threaded(_))
    }

    /// 处理一帧, 返回当前可用的检测结果
    ///
    /// 多线程模式下结果可能是上一轮的缓存, 用 `DetectionBatch::is_same` 判断。
    pub fn process_frame(&mut self, frame: &Frame) -> DetectionBatch {
        match &mut self.mode {
            Mode::Inline(detector) => {
                let detections = run_detection(detector.as_mut(), frame);
                self.last_batch = DetectionBatch::new(self.next_seq, detections);
                self.next_seq += 1;
            }
            Mode::Threaded(worker) => {
                // 工作线程还没取走上一帧时丢弃本帧
                worker.inbox.offer(frame.clone());
                if let Some(batch) = worker.outbox.take() {
                    self.last_batch = batch;
                }
            }
        }
        self.last_batch.clone()
    }

    /// 通知工作线程在本轮结束后退出
    pub fn terminate(&self) {
        if let Mode::Threaded(worker) = &self.mode {
            if worker.active.swap(false, Ordering::AcqRel) {
                info!(target: "sentinel::detector", "🛑 通知检测线程退出");
            }
        }
    }
}

impl Drop for DetectorBridge {
    fn drop(&mut self) {
        self.terminate();
        if let Mode::Threaded(worker) = &mut self.mode {
            worker.inbox.clear();
            if let Some(handle) = worker.handle.take() {
                if handle.join().is_err() {
                    warn!(target: "sentinel::detector", "⚠️ 检测线程异常退出");
                }
            }
        }
    }
}
