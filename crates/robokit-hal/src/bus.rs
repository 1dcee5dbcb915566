//! 共享总线管理
//!
//! 每条 I²C / SPI 总线在第一次使用时由工厂函数打开，之后所有驱动通过
//! [`SharedBus`] 共用同一个后端实例。每次操作都在总线互斥锁内完成，
//! 等锁超过配置的超时时间返回 [`Error::BusBusy`]。

use parking_lot::Mutex;
use robokit_core::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// 默认等锁时间
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// 按总线号打开后端
pub type BusFactory<B> = Arc<dyn Fn(u32) -> Result<Box<B>> + Send + Sync>;

/// 一条已打开、带互斥锁的总线
pub struct SharedBus<B: ?Sized> {
    label: String,
    lock_timeout: Duration,
    bus: Mutex<Box<B>>,
}

impl<B: ?Sized> SharedBus<B> {
    pub fn new(label: impl Into<String>, bus: Box<B>, lock_timeout: Duration) -> Self {
        Self {
            label: label.into(),
            lock_timeout,
            bus: Mutex::new(bus),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// 持有总线锁执行 `f`
    ///
    /// # 错误
    ///
    /// 超时未拿到锁返回 [`Error::BusBusy`]；其余错误来自 `f`。
    pub fn with<R>(&self, f: impl FnOnce(&mut B) -> Result<R>) -> Result<R> {
        let mut guard = self
            .bus
            .try_lock_for(self.lock_timeout)
            .ok_or_else(|| Error::BusBusy(self.label.clone()))?;
        trace!("{} locked", self.label);
        f(&mut **guard)
    }
}

/// 一类总线（I²C 或 SPI）的集合
pub struct BusManager<B: ?Sized> {
    kind: &'static str,
    valid: Vec<u32>,
    factory: BusFactory<B>,
    lock_timeout: Duration,
    open: Mutex<BTreeMap<u32, Arc<SharedBus<B>>>>,
}

impl<B: ?Sized> BusManager<B> {
    pub fn new(
        kind: &'static str,
        valid: Vec<u32>,
        factory: BusFactory<B>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            kind,
            valid,
            factory,
            lock_timeout,
            open: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn buses(&self) -> &[u32] {
        &self.valid
    }

    pub fn is_empty(&self) -> bool {
        self.valid.is_empty()
    }

    fn label(&self, bus: u32) -> String {
        format!("{}-{}", self.kind, bus)
    }

    /// 获取（必要时打开）总线
    ///
    /// # 错误
    ///
    /// - 总线号不在允许列表中：[`Error::UnknownBus`]
    /// - 工厂打开失败：原样返回
    pub fn get(&self, bus: u32) -> Result<Arc<SharedBus<B>>> {
        if !self.valid.contains(&bus) {
            return Err(Error::UnknownBus(self.label(bus)));
        }

        let mut open = self.open.lock();
        if let Some(shared) = open.get(&bus) {
            return Ok(shared.clone());
        }

        let backend = (self.factory)(bus)?;
        let shared = Arc::new(SharedBus::new(self.label(bus), backend, self.lock_timeout));
        open.insert(bus, shared.clone());
        debug!("Opened {}", self.label(bus));
        Ok(shared)
    }

    /// 已打开的总线号
    pub fn open_buses(&self) -> Vec<u32> {
        self.open.lock().keys().copied().collect()
    }

    /// 关闭所有总线，返回关闭数量
    ///
    /// 仍被句柄引用的后端会在最后一个句柄释放时关闭。
    pub fn close_all(&self) -> usize {
        let mut open = self.open.lock();
        let count = open.len();
        open.clear();
        if count > 0 {
            debug!("Closed {} {} bus(es)", count, self.kind);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    trait Counter: Send {
        fn bump(&mut self) -> u32;
    }

    struct Simple(u32);

    impl Counter for Simple {
        fn bump(&mut self) -> u32 {
            self.0 += 1;
            self.0
        }
    }

    fn manager(opened: Arc<AtomicUsize>) -> BusManager<dyn Counter> {
        let factory: BusFactory<dyn Counter> = Arc::new(move |_bus| {
            opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Simple(0)) as Box<dyn Counter>)
        });
        BusManager::new("i2c", vec![0, 1], factory, Duration::from_millis(50))
    }

    #[test]
    fn test_unknown_bus() {
        let m = manager(Arc::new(AtomicUsize::new(0)));
        match m.get(7) {
            Err(Error::UnknownBus(label)) => assert_eq!(label, "i2c-7"),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_bus_opened_once() {
        let opened = Arc::new(AtomicUsize::new(0));
        let m = manager(opened.clone());
        let a = m.get(1).unwrap();
        let b = m.get(1).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(m.open_buses(), vec![1]);

        assert_eq!(a.with(|c| Ok(c.bump())).unwrap(), 1);
        assert_eq!(b.with(|c| Ok(c.bump())).unwrap(), 2);

        assert_eq!(m.close_all(), 1);
        assert!(m.open_buses().is_empty());
    }

    #[test]
    fn test_lock_timeout_reports_busy() {
        let m = manager(Arc::new(AtomicUsize::new(0)));
        let bus = m.get(0).unwrap();
        let holder = bus.clone();

        let (locked_tx, locked_rx) = crossbeam_channel::bounded(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);
        let t = thread::spawn(move || {
            holder
                .with(|_| {
                    locked_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Ok(())
                })
                .unwrap();
        });

        locked_rx.recv().unwrap();
        assert!(matches!(bus.with(|_| Ok(())), Err(Error::BusBusy(_))));
        release_tx.send(()).unwrap();
        t.join().unwrap();
        assert!(bus.with(|_| Ok(())).is_ok());
    }
}
