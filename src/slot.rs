/// 单槽缓冲 (Single-slot buffer)
///
/// crossbeam bounded(1) 通道: 一个写者, 一个读者, 双方都不阻塞。
/// 只关心最新数据, 不需要排队语义。
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

pub struct Slot<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Slot<T> {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    /// 覆盖写入: 槽里未读的旧值被丢弃
    pub fn replace(&self, value: T) {
        let mut value = value;
        loop {
            match self.tx.try_send(value) {
                Ok(()) => return,
                Err(TrySendError::Full(v)) => {
                    let _ = self.rx.try_recv();
                    value = v;
                }
                // 两端都由自己持有, 不会断开
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// 仅在槽为空时写入, 返回是否写入成功
    pub fn offer(&self, value: T) -> bool {
        self.tx.try_send(value).is_ok()
    }

    pub fn take(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// 最多等待 timeout
    pub fn take_timeout(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(v) => Some(v),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn clear(&self) {
        while self.rx.try_recv().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_keeps_only_newest() {
        let slot = Slot::new();
        slot.replace(1);
        slot.replace(2);
        slot.replace(3);
        assert_eq!(slot.take(), Some(3));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn test_offer_refuses_when_full() {
        let slot = Slot::new();
        assert!(slot.offer("a"));
        assert!(!slot.offer("b"));
        assert_eq!(slot.take(), Some("a"));
        assert!(slot.is_empty());
    }

    #[test]
    fn test_take_timeout_across_threads() {
        let slot = Slot::new();
        let writer = slot.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            writer.replace(42u32);
        });
        assert_eq!(slot.take_timeout(Duration::from_secs(2)), Some(42));
        handle.join().unwrap();
    }
}
