//! 帧源 (Frame Source)
//!
//! 后台采集线程不停读流, 单槽里只保留最新一帧; 主循环 `read()` 最多等待一个短周期。
//! 断流后自动重连, 长时间无新帧时通过回调上报。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use super::capture::{CaptureOpener, VideoCapture};
use crate::frame::Frame;
use crate::slot::Slot;

/// 采集循环两轮之间的停顿
const LOOP_PAUSE: Duration = Duration::from_millis(1);
/// 长时间等待切成小段, 保证 stop() 很快生效
const SLEEP_TICK: Duration = Duration::from_millis(20);
/// Drop时等待采集线程退出的上限
const JOIN_GRACE: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
pub struct FrameSourceOptions {
    pub reconnect: bool,
    pub reconnect_backoff: Duration, // 发起重连后暂停
    pub offline_poll: Duration,      // 离线时 read() 的等待
    pub stale_timeout: Duration,     // 无新帧多久算断流
}

impl Default for FrameSourceOptions {
    fn default() -> Self {
        Self {
            reconnect: true,
            reconnect_backoff: Duration::from_secs(2),
            offline_poll: Duration::from_secs(1),
            stale_timeout: Duration::from_secs(60),
        }
    }
}

/// 流状态事件
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    Broken { silent_for: Duration },
    Recovered,
}

pub type EventCallback = Box<dyn Fn(StreamEvent) + Send>;

/// 采集线程和连接线程共享的状态
struct Shared {
    opener: Box<dyn CaptureOpener>,
    options: FrameSourceOptions,
    looping: AtomicBool,
    online: AtomicBool,
    connecting: AtomicBool,
    capture: Mutex<Option<Box<dyn VideoCapture>>>,
    slot: Slot<Frame>,
    next_seq: AtomicU64,
}

impl Shared {
    fn capture(&self) -> MutexGuard<'_, Option<Box<dyn VideoCapture>>> {
        self.capture.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Acquire)
    }

    fn release(&self) {
        if let Some(mut capture) = self.capture().take() {
            capture.release();
        }
    }

    /// 按小段睡眠, 期间 stop() 立即返回
    fn sleep_while_looping(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while self.is_looping() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(SLEEP_TICK.min(deadline - now));
        }
    }

    /// 在独立线程里连接视频源; 已有连接尝试时直接返回
    fn begin_connect(self: &Arc<Self>) {
        if self.connecting.swap(true, Ordering::AcqRel) {
            return;
        }

        let shared = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name("sentinel-connect".into())
            .spawn(move || {
                info!(target: "sentinel::input", "🔌 正在连接视频源: {}", shared.opener.describe());
                match shared.opener.open() {
                    Ok(capture) => {
                        *shared.capture() = Some(capture);
                        shared.online.store(true, Ordering::Release);
                        info!(target: "sentinel::input", "✅ 已连接视频源: {}", shared.opener.describe());
                    }
                    Err(e) => {
                        warn!(target: "sentinel::input", "⚠️ 无法连接视频源: {}", e);
                    }
                }
                shared.connecting.store(false, Ordering::Release);
            });

        if let Err(e) = spawned {
            error!(target: "sentinel::input", "❌ 无法创建连接线程: {}", e);
            self.connecting.store(false, Ordering::Release);
        }
    }

    /// 采集循环
    fn acquire(self: Arc<Self>) {
        info!(target: "sentinel::input", "📹 采集线程启动");

        while self.is_looping() {
            if self.online.load(Ordering::Acquire) {
                let result = match self.capture().as_mut() {
                    Some(capture) => Some(capture.read()),
                    None => None,
                };
                match result {
                    Some(Ok(frame)) => {
                        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                        self.slot.replace(frame.with_seq(seq));
                    }
                    Some(Err(e)) => {
                        warn!(target: "sentinel::input", "⚠️ 读帧失败, 断开连接: {}", e);
                        self.release();
                        self.online.store(false, Ordering::Release);
                    }
                    None => self.online.store(false, Ordering::Release),
                }
            } else if self.connecting.load(Ordering::Acquire) {
                // 等待进行中的连接
            } else if self.options.reconnect {
                info!(target: "sentinel::input", "🔄 连接断开, 尝试重连...");
                self.begin_connect();
                self.sleep_while_looping(self.options.reconnect_backoff);
            } else {
                info!(target: "sentinel::input", "📴 视频关闭");
                break;
            }

            std::thread::sleep(LOOP_PAUSE);
        }

        self.release();
        self.looping.store(false, Ordering::Release);
        self.online.store(false, Ordering::Release);
        info!(target: "sentinel::input", "✅ 采集线程退出");
    }
}

pub struct FrameSource {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
    last_frame_at: Option<Instant>,
    broken: bool,
    on_event: Option<EventCallback>,
}

impl FrameSource {
    pub fn new(opener: impl CaptureOpener + 'static, options: FrameSourceOptions) -> Self {
        Self::from_boxed(Box::new(opener), options)
    }

    pub fn from_boxed(opener: Box<dyn CaptureOpener>, options: FrameSourceOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                opener,
                options,
                looping: AtomicBool::new(false),
                online: AtomicBool::new(false),
                connecting: AtomicBool::new(false),
                capture: Mutex::new(None),
                slot: Slot::new(),
                next_seq: AtomicU64::new(1),
            }),
            handle: None,
            last_frame_at: None,
            broken: false,
            on_event: None,
        }
    }

    /// 注册断流/恢复回调
    pub fn on_event(mut self, callback: impl Fn(StreamEvent) + Send + 'static) -> Self {
        self.on_event = Some(Box::new(callback));
        self
    }

    /// 启动采集; 已在运行时什么都不做
    pub fn start(&mut self) -> std::io::Result<()> {
        if self.shared.is_looping() {
            return Ok(());
        }

        // 等上一轮采集线程彻底退出
        if let Some(old) = self.handle.take() {
            let _ = old.join();
        }

        self.shared.looping.store(true, Ordering::Release);
        self.shared.begin_connect();

        let shared = Arc::clone(&self.shared);
        match std::thread::Builder::new()
            .name("sentinel-capture".into())
            .spawn(move || shared.acquire())
        {
            Ok(handle) => {
                self.handle = Some(handle);
                self.last_frame_at = Some(Instant::now());
                self.broken = false;
                Ok(())
            }
            Err(e) => {
                self.shared.looping.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    /// 取最新一帧
    ///
    /// 离线时等待 `offline_poll` 后返回 `None`, 主循环不需要自己退避。
    pub fn read(&mut self) -> Option<Frame> {
        if !self.is_streaming() {
            return None;
        }
        if !self.is_online() {
            std::thread::sleep(self.shared.options.offline_poll);
            self.check_stale(Instant::now());
            return None;
        }

        match self.shared.slot.take() {
            Some(frame) => {
                self.last_frame_at = Some(Instant::now());
                if self.broken {
                    self.broken = false;
                    info!(target: "sentinel::input", "✅ 视频流恢复");
                    self.emit(StreamEvent::Recovered);
                }
                Some(frame)
            }
            None => {
                self.check_stale(Instant::now());
                None
            }
        }
    }

    /// 超过 stale_timeout 没有新帧时上报一次
    fn check_stale(&mut self, now: Instant) {
        if self.broken {
            return;
        }
        let Some(last) = self.last_frame_at else {
            return;
        };
        let silent_for = now.saturating_duration_since(last);
        if silent_for > self.shared.options.stale_timeout {
            self.broken = true;
            warn!(
                target: "sentinel::input",
                "⚠️ 视频流已 {:.0}s 没有新帧", silent_for.as_secs_f64()
            );
            self.emit(StreamEvent::Broken { silent_for });
        }
    }

    fn emit(&self, event: StreamEvent) {
        if let Some(callback) = &self.on_event {
            callback(event);
        }
    }

    /// 通知采集线程退出; 句柄在线程的下一次检查时释放
    pub fn stop(&self) {
        if self.shared.looping.swap(false, Ordering::AcqRel) {
            info!(target: "sentinel::input", "🛑 停止采集");
        }
    }

    pub fn is_online(&self) -> bool {
        self.shared.online.load(Ordering::Acquire)
    }

    pub fn is_streaming(&self) -> bool {
        self.shared.is_looping()
    }

    pub fn describe(&self) -> String {
        self.shared.opener.describe()
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            // 读帧可能卡在阻塞IO上, 超时后放手让线程自行结束
            let deadline = Instant::now() + JOIN_GRACE;
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(SLEEP_TICK);
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!(target: "sentinel::input", "⚠️ 采集线程未能及时退出");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SentinelError};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    /// 按脚本返回读帧结果; 脚本用完后一直返回成功
    struct ScriptedCapture {
        script: Arc<Mutex<VecDeque<bool>>>,
    }

    impl VideoCapture for ScriptedCapture {
        fn read(&mut self) -> Result<Frame> {
            let ok = self.script.lock().unwrap().pop_front().unwrap_or(true);
            std::thread::sleep(Duration::from_millis(2));
            if ok {
                Ok(Frame::solid(4, 4, [1, 2, 3], 0))
            } else {
                Err(SentinelError::Capture {
                    src: "fake".into(),
                    reason: "read failed".into(),
                })
            }
        }

        fn release(&mut self) {}
    }

    struct ScriptedOpener {
        script: Arc<Mutex<VecDeque<bool>>>,
        opens: Arc<AtomicUsize>,
        fail_opens: bool,
    }

    impl ScriptedOpener {
        fn new(reads: &[bool]) -> Self {
            Self {
                script: Arc::new(Mutex::new(reads.iter().copied().collect())),
                opens: Arc::new(AtomicUsize::new(0)),
                fail_opens: false,
            }
        }
    }

    impl CaptureOpener for ScriptedOpener {
        fn open(&self) -> Result<Box<dyn VideoCapture>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail_opens {
                return Err(SentinelError::Capture {
                    src: "fake".into(),
                    reason: "unreachable".into(),
                });
            }
            Ok(Box::new(ScriptedCapture {
                script: Arc::clone(&self.script),
            }))
        }

        fn describe(&self) -> String {
            "fake".into()
        }
    }

    fn fast_options() -> FrameSourceOptions {
        FrameSourceOptions {
            reconnect: true,
            reconnect_backoff: Duration::from_millis(10),
            offline_poll: Duration::from_millis(5),
            stale_timeout: Duration::from_secs(60),
        }
    }

    fn read_within(source: &mut FrameSource, limit: Duration) -> Option<Frame> {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if let Some(frame) = source.read() {
                return Some(frame);
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        None
    }

    #[test]
    fn test_read_before_start_is_none() {
        let mut source = FrameSource::new(ScriptedOpener::new(&[]), fast_options());
        assert!(source.read().is_none());
        assert!(!source.is_streaming());
    }

    #[test]
    fn test_reconnects_after_read_failures() {
        let opener = ScriptedOpener::new(&[false, false, false]);
        let opens = Arc::clone(&opener.opens);
        let mut source = FrameSource::new(opener, fast_options());
        source.start().unwrap();

        let frame = read_within(&mut source, Duration::from_secs(5));
        assert!(frame.is_some());
        assert!(source.is_online());
        // 首次连接 + 三次重连
        assert_eq!(opens.load(Ordering::SeqCst), 4);

        let next = read_within(&mut source, Duration::from_secs(2)).unwrap();
        assert!(next.seq() > frame.unwrap().seq());
    }

    #[test]
    fn test_no_reconnect_stops_loop() {
        let opener = ScriptedOpener::new(&[true, false]);
        let options = FrameSourceOptions {
            reconnect: false,
            ..fast_options()
        };
        let mut source = FrameSource::new(opener, options);
        source.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while source.is_streaming() && Instant::now() < deadline {
            let _ = source.read();
        }
        assert!(!source.is_streaming());
        assert!(source.read().is_none());
    }

    #[test]
    fn test_start_is_idempotent() {
        let opener = ScriptedOpener::new(&[]);
        let opens = Arc::clone(&opener.opens);
        let mut source = FrameSource::new(opener, fast_options());
        source.start().unwrap();
        source.start().unwrap();
        assert!(read_within(&mut source, Duration::from_secs(2)).is_some());
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        source.stop();
    }

    #[test]
    fn test_stale_stream_reports_broken_then_recovered() {
        let mut opener = ScriptedOpener::new(&[]);
        opener.fail_opens = true;
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let options = FrameSourceOptions {
            stale_timeout: Duration::from_millis(50),
            ..fast_options()
        };
        let mut source =
            FrameSource::new(opener, options).on_event(move |e| sink.lock().unwrap().push(e));
        source.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while events.lock().unwrap().is_empty() && Instant::now() < deadline {
            let _ = source.read();
        }
        {
            let events = events.lock().unwrap();
            assert_eq!(events.len(), 1);
            assert!(matches!(events[0], StreamEvent::Broken { silent_for } if silent_for > Duration::from_millis(50)));
        }
        // 只上报一次
        for _ in 0..5 {
            let _ = source.read();
        }
        assert_eq!(events.lock().unwrap().len(), 1);

        source.stop();
    }

    #[test]
    fn test_recovered_after_broken() {
        let opener = ScriptedOpener::new(&[]);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let options = FrameSourceOptions {
            stale_timeout: Duration::from_millis(500),
            ..fast_options()
        };
        let mut source =
            FrameSource::new(opener, options).on_event(move |e| sink.lock().unwrap().push(e));
        source.start().unwrap();
        assert!(read_within(&mut source, Duration::from_secs(2)).is_some());

        source.check_stale(Instant::now() + Duration::from_secs(5));
        assert!(read_within(&mut source, Duration::from_secs(2)).is_some());

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], StreamEvent::Recovered);
    }
}
