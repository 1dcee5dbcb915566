//! 进程中断广播
//!
//! `ctrlc` 在每个进程中只能安装一次处理函数；这里在第一次订阅时安装，
//! 之后把每一次中断广播给所有仍在等待的机器人和管理器。

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

struct Broadcaster {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(u64, Sender<()>)>>,
}

static BROADCASTER: OnceLock<Broadcaster> = OnceLock::new();

fn broadcaster() -> &'static Broadcaster {
    BROADCASTER.get_or_init(|| {
        if let Err(e) = ctrlc::set_handler(|| {
            info!("Received interrupt signal");
            raise();
        }) {
            // 宿主程序已安装了自己的处理函数：仍然可以通过 raise() 手动广播
            warn!("Failed to install interrupt handler: {}", e);
        }
        Broadcaster {
            next_id: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
        }
    })
}

/// 中断订阅；Drop 时从广播列表中移除
pub struct Interrupt {
    id: u64,
    rx: Receiver<()>,
}

impl Interrupt {
    /// 每次中断最多投递一条消息
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

impl Drop for Interrupt {
    fn drop(&mut self) {
        broadcaster().subscribers.lock().retain(|(id, _)| *id != self.id);
    }
}

/// 订阅中断
pub fn subscribe() -> Interrupt {
    let broadcaster = broadcaster();
    let id = broadcaster.next_id.fetch_add(1, Ordering::Relaxed);
    let (tx, rx) = bounded(1);
    broadcaster.subscribers.lock().push((id, tx));
    Interrupt { id, rx }
}

/// 向所有订阅者广播一次中断，返回收到通知的订阅者数量
pub fn raise() -> usize {
    let mut subscribers = broadcaster().subscribers.lock();
    subscribers.retain(|(_, tx)| !matches!(tx.try_send(()), Err(TrySendError::Disconnected(()))));
    subscribers.len()
}

#[cfg(test)]
pub(crate) fn subscriber_count() -> usize {
    broadcaster().subscribers.lock().len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::time::Duration;

    #[test]
    #[serial]
    fn test_raise_reaches_every_subscriber() {
        let a = subscribe();
        let b = subscribe();
        assert!(raise() >= 2);
        assert!(a.receiver().recv_timeout(Duration::from_millis(100)).is_ok());
        assert!(b.receiver().recv_timeout(Duration::from_millis(100)).is_ok());
    }

    #[test]
    #[serial]
    fn test_dropped_subscription_leaves_list() {
        let before = subscriber_count();
        let interrupts: Vec<_> = (0..5).map(|_| subscribe()).collect();
        assert_eq!(subscriber_count(), before + 5);
        drop(interrupts);
        assert_eq!(subscriber_count(), before);
    }

    #[test]
    #[serial]
    fn test_repeated_raise_does_not_block() {
        let interrupt = subscribe();
        raise();
        raise();
        assert!(interrupt.receiver().try_recv().is_ok());
        assert!(interrupt.receiver().try_recv().is_err());
    }
}
