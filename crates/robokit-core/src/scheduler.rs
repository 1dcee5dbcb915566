//! 调度器
//!
//! 每个机器人持有一个 [`Scheduler`]，它拥有机器人创建的全部定时任务：
//!
//! - [`Scheduler::after`]：一次性定时器
//! - [`Scheduler::every`]：周期定时器，返回可取消的 [`TimerHandle`]
//! - [`Scheduler::debounce`]：防抖包装（前沿或后沿触发）
//!
//! 每个定时器运行在独立的命名线程上；等待使用 `crossbeam_channel::Receiver::recv_deadline`，
//! 取消信号可以立即唤醒等待中的线程。
//!
//! # 超时处理
//!
//! 处理函数超出周期时不补发：下一次触发在处理函数返回后立即进行，
//! 同一定时器的两次触发永不重叠。
//!
//! # 停止
//!
//! [`Scheduler::shutdown`] 取消所有定时器并在有限的宽限期内等待正在执行的处理函数返回。

use crate::error::{Error, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, select, unbounded};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{JoinHandle, spawn};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 带超时的线程 join
///
/// 超时返回 [`Error::Timeout`]，线程 panic 返回 [`Error::Io`]。
pub trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> Result<()> {
        let (tx, rx) = bounded(1);

        // 看门狗线程负责 join，主线程只在通道上等待
        spawn(move || {
            let result = self.join();
            let _ = tx.send(result.is_ok());
        });

        match rx.recv_timeout(timeout) {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::Io(std::io::Error::other("thread panicked during join"))),
            // 超时：看门狗线程继续等待，进程退出时由 OS 回收
            Err(RecvTimeoutError::Timeout) => Err(Error::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(Error::Io(std::io::Error::other(
                "join watchdog exited unexpectedly",
            ))),
        }
    }
}

/// 定时任务返回值
///
/// 处理函数可以返回 `()`，也可以返回 `Result<(), E>`；错误会被记录，定时器继续运行。
pub trait TaskOutcome {
    fn into_outcome(self) -> std::result::Result<(), String>;
}

impl TaskOutcome for () {
    fn into_outcome(self) -> std::result::Result<(), String> {
        Ok(())
    }
}

impl<E: fmt::Display> TaskOutcome for std::result::Result<(), E> {
    fn into_outcome(self) -> std::result::Result<(), String> {
        self.map_err(|e| e.to_string())
    }
}

fn run_task<F, R>(owner: &str, id: u64, f: F)
where
    F: FnOnce() -> R,
    R: TaskOutcome,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(outcome) => {
            if let Err(msg) = outcome.into_outcome() {
                error!("{}: timer #{} handler failed: {}", owner, id, msg);
            }
        },
        Err(_) => error!("{}: timer #{} handler panicked", owner, id),
    }
}

/// 定时器种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    After,
    Every,
    Debounce,
}

/// 防抖触发沿
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebounceEdge {
    /// 第一次调用立即触发，之后静默 `wait` 内的调用被忽略
    Leading,
    /// 最后一次调用后静默 `wait` 才触发
    #[default]
    Trailing,
}

/// 调度器配置
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 停止时等待正在执行的处理函数的宽限期
    pub stop_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            stop_grace: Duration::from_secs(1),
        }
    }
}

struct TimerControl {
    id: u64,
    kind: TimerKind,
    period: Duration,
    cancelled: AtomicBool,
    cancel_tx: Sender<()>,
    cancel_rx: Receiver<()>,
    ticks: AtomicU64,
    finished: AtomicBool,
}

impl TimerControl {
    fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            let _ = self.cancel_tx.try_send(());
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// 可取消的睡眠；到期返回 `true`，被取消返回 `false`
    fn sleep_until(&self, deadline: Instant) -> bool {
        if self.is_cancelled() {
            return false;
        }
        match self.cancel_rx.recv_deadline(deadline) {
            Err(RecvTimeoutError::Timeout) => !self.is_cancelled(),
            // 收到取消消息（包括通过 done 通道发送的）
            _ => {
                self.cancelled.store(true, Ordering::Release);
                false
            },
        }
    }
}

/// 定时器句柄
///
/// 取消是协作式且幂等的：已取消的一次性定时器不会触发；
/// 已取消的周期定时器在下一次触发前停止，但不会中断正在执行的处理函数。
#[derive(Clone)]
pub struct TimerHandle {
    control: Arc<TimerControl>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
    }

    /// 定时器线程已经退出
    pub fn is_finished(&self) -> bool {
        self.control.finished.load(Ordering::Acquire)
    }

    /// done 通道：向其发送 `()` 等价于 [`TimerHandle::cancel`]
    pub fn done(&self) -> Sender<()> {
        self.control.cancel_tx.clone()
    }

    pub fn id(&self) -> u64 {
        self.control.id
    }

    pub fn kind(&self) -> TimerKind {
        self.control.kind
    }

    pub fn period(&self) -> Duration {
        self.control.period
    }

    /// 处理函数已完成的次数
    pub fn tick_count(&self) -> u64 {
        self.control.ticks.load(Ordering::Acquire)
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("period", &self.period())
            .field("ticks", &self.tick_count())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

type LeadingFn = Box<dyn FnMut() + Send>;

struct LeadingState {
    f: LeadingFn,
    last_call: Option<Instant>,
}

#[derive(Clone)]
enum Trigger {
    Leading(Arc<Mutex<LeadingState>>),
    Trailing(Sender<()>),
}

/// 防抖包装后的函数
#[derive(Clone)]
pub struct Debounced {
    handle: TimerHandle,
    wait: Duration,
    trigger: Trigger,
}

impl Debounced {
    /// 触发一次调用
    pub fn call(&self) {
        if self.handle.is_cancelled() {
            return;
        }
        match &self.trigger {
            Trigger::Leading(state) => {
                let mut state = state.lock();
                let now = Instant::now();
                let quiet = state
                    .last_call
                    .is_none_or(|t| now.duration_since(t) >= self.wait);
                state.last_call = Some(now);
                if quiet {
                    (state.f)();
                    self.handle.control.ticks.fetch_add(1, Ordering::AcqRel);
                }
            },
            Trigger::Trailing(tx) => {
                let _ = tx.send(());
            },
        }
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub fn handle(&self) -> &TimerHandle {
        &self.handle
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Step {
    Call,
    Closed,
    Cancelled,
    Quiet,
}

struct TimerSlot {
    control: Arc<TimerControl>,
    thread: Option<JoinHandle<()>>,
}

struct SchedulerInner {
    owner: String,
    config: SchedulerConfig,
    timers: Mutex<BTreeMap<u64, TimerSlot>>,
    next_id: AtomicU64,
    accepting: AtomicBool,
}

/// 定时任务调度器（可廉价克隆）
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(owner: impl Into<String>) -> Self {
        Self::with_config(owner, SchedulerConfig::default())
    }

    pub fn with_config(owner: impl Into<String>, config: SchedulerConfig) -> Self {
        Self::build(owner.into(), config, true)
    }

    /// 创建处于关闭状态的调度器，[`Scheduler::reopen`] 之前拒绝新定时器
    pub fn closed(owner: impl Into<String>, config: SchedulerConfig) -> Self {
        Self::build(owner.into(), config, false)
    }

    fn build(owner: String, config: SchedulerConfig, accepting: bool) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                owner,
                config,
                timers: Mutex::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                accepting: AtomicBool::new(accepting),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// `delay` 之后执行一次 `f`
    pub fn after<F, R>(&self, delay: Duration, f: F) -> Result<TimerHandle>
    where
        F: FnOnce() -> R + Send + 'static,
        R: TaskOutcome,
    {
        let owner = self.inner.owner.clone();
        let deadline = Instant::now() + delay;
        self.spawn_timer(TimerKind::After, delay, move |ctl| {
            if ctl.sleep_until(deadline) {
                run_task(&owner, ctl.id, f);
                ctl.ticks.fetch_add(1, Ordering::AcqRel);
            }
        })
    }

    /// 每隔 `period` 执行一次 `f`
    ///
    /// # 错误
    ///
    /// `period` 为零时返回 [`Error::InvalidPeriod`]。
    pub fn every<F, R>(&self, period: Duration, mut f: F) -> Result<TimerHandle>
    where
        F: FnMut() -> R + Send + 'static,
        R: TaskOutcome,
    {
        if period.is_zero() {
            return Err(Error::InvalidPeriod);
        }
        let owner = self.inner.owner.clone();
        let start = Instant::now();
        self.spawn_timer(TimerKind::Every, period, move |ctl| {
            let mut next = start + period;
            while ctl.sleep_until(next) {
                run_task(&owner, ctl.id, &mut f);
                ctl.ticks.fetch_add(1, Ordering::AcqRel);

                next += period;
                let now = Instant::now();
                if next < now {
                    // 超时不补发
                    next = now;
                }
            }
        })
    }

    /// 防抖包装
    pub fn debounce<F, R>(&self, wait: Duration, edge: DebounceEdge, mut f: F) -> Result<Debounced>
    where
        F: FnMut() -> R + Send + 'static,
        R: TaskOutcome,
    {
        let owner = self.inner.owner.clone();
        match edge {
            DebounceEdge::Leading => {
                let control = self.register(TimerKind::Debounce, wait)?;
                let id = control.id;
                let state = LeadingState {
                    f: Box::new(move || run_task(&owner, id, &mut f)),
                    last_call: None,
                };
                Ok(Debounced {
                    handle: TimerHandle { control },
                    wait,
                    trigger: Trigger::Leading(Arc::new(Mutex::new(state))),
                })
            },
            DebounceEdge::Trailing => {
                let (tx, calls) = unbounded::<()>();
                let handle = self.spawn_timer(TimerKind::Debounce, wait, move |ctl| {
                    let fire = |f: &mut F| {
                        run_task(&owner, ctl.id, f);
                        ctl.ticks.fetch_add(1, Ordering::AcqRel);
                    };
                    loop {
                        // 空闲：等待第一次调用
                        let step = select! {
                            recv(calls) -> msg => if msg.is_ok() { Step::Call } else { Step::Closed },
                            recv(ctl.cancel_rx) -> _ => Step::Cancelled,
                        };
                        if step != Step::Call {
                            ctl.cancelled.store(true, Ordering::Release);
                            return;
                        }

                        let mut deadline = Instant::now() + wait;
                        loop {
                            let timeout = deadline.saturating_duration_since(Instant::now());
                            let step = select! {
                                recv(calls) -> msg => if msg.is_ok() { Step::Call } else { Step::Closed },
                                recv(ctl.cancel_rx) -> _ => Step::Cancelled,
                                default(timeout) => Step::Quiet,
                            };
                            match step {
                                Step::Call => deadline = Instant::now() + wait,
                                Step::Quiet if !ctl.is_cancelled() => {
                                    fire(&mut f);
                                    break;
                                },
                                Step::Closed => {
                                    // 包装函数已全部释放：保留已挂起的一次触发
                                    if ctl.sleep_until(deadline) {
                                        fire(&mut f);
                                    }
                                    return;
                                },
                                _ => {
                                    ctl.cancelled.store(true, Ordering::Release);
                                    return;
                                },
                            }
                        }
                    }
                })?;
                Ok(Debounced {
                    handle,
                    wait,
                    trigger: Trigger::Trailing(tx),
                })
            },
        }
    }

    /// 当前登记的定时器（包括尚未退出的已取消定时器）
    pub fn active(&self) -> Vec<TimerHandle> {
        self.inner
            .timers
            .lock()
            .values()
            .map(|slot| TimerHandle {
                control: slot.control.clone(),
            })
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.inner.timers.lock().len()
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::Acquire)
    }

    /// 停止后重新接受新的定时器（机器人重启时使用）
    pub fn reopen(&self) {
        self.inner.accepting.store(true, Ordering::Release);
    }

    /// 使用配置的宽限期停止
    pub fn shutdown(&self) -> usize {
        self.shutdown_with_grace(self.inner.config.stop_grace)
    }

    /// 取消全部定时器并等待其线程退出
    ///
    /// 返回在宽限期内未能退出的定时器数量。
    /// 从定时器自身的处理函数中调用时，不会等待调用者所在的线程。
    pub fn shutdown_with_grace(&self, grace: Duration) -> usize {
        self.inner.accepting.store(false, Ordering::Release);
        let slots: Vec<TimerSlot> = std::mem::take(&mut *self.inner.timers.lock())
            .into_values()
            .collect();

        for slot in &slots {
            slot.control.cancel();
        }

        let deadline = Instant::now() + grace;
        let current = std::thread::current().id();
        let mut overran = 0;
        let total = slots.len();
        for slot in slots {
            let Some(thread) = slot.thread else { continue };
            if thread.thread().id() == current {
                continue;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if let Err(e) = thread.join_timeout(remaining) {
                overran += 1;
                warn!(
                    "{}: timer #{} did not stop within {:?}: {}",
                    self.inner.owner, slot.control.id, grace, e
                );
            }
        }

        info!(
            "{}: scheduler stopped ({} timer(s) cancelled, {} overran)",
            self.inner.owner, total, overran
        );
        overran
    }

    /// 登记一个没有独立线程的定时器（前沿防抖）
    fn register(&self, kind: TimerKind, period: Duration) -> Result<Arc<TimerControl>> {
        let mut timers = self.inner.timers.lock();
        if !self.is_accepting() {
            return Err(Error::NotRunning(format!("scheduler of '{}'", self.inner.owner)));
        }
        let control = self.new_control(kind, period);
        timers.insert(
            control.id,
            TimerSlot {
                control: control.clone(),
                thread: None,
            },
        );
        Ok(control)
    }

    fn new_control(&self, kind: TimerKind, period: Duration) -> Arc<TimerControl> {
        let (cancel_tx, cancel_rx) = bounded(1);
        Arc::new(TimerControl {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            kind,
            period,
            cancelled: AtomicBool::new(false),
            cancel_tx,
            cancel_rx,
            ticks: AtomicU64::new(0),
            finished: AtomicBool::new(false),
        })
    }

    fn spawn_timer<B>(&self, kind: TimerKind, period: Duration, body: B) -> Result<TimerHandle>
    where
        B: FnOnce(Arc<TimerControl>) + Send + 'static,
    {
        // 持锁创建线程：线程退出时的自我注销一定发生在登记之后
        let mut timers = self.inner.timers.lock();
        if !self.is_accepting() {
            return Err(Error::NotRunning(format!("scheduler of '{}'", self.inner.owner)));
        }

        let control = self.new_control(kind, period);
        let ctl = control.clone();
        let weak: Weak<SchedulerInner> = Arc::downgrade(&self.inner);
        let thread = std::thread::Builder::new()
            .name(format!("robokit-timer-{}", control.id))
            .spawn(move || {
                let id = ctl.id;
                body(ctl.clone());
                ctl.finished.store(true, Ordering::Release);
                if let Some(inner) = weak.upgrade() {
                    inner.timers.lock().remove(&id);
                }
            })?;

        debug!(
            "{}: timer #{} ({:?}, {:?}) scheduled",
            self.inner.owner, control.id, kind, period
        );
        timers.insert(
            control.id,
            TimerSlot {
                control: control.clone(),
                thread: Some(thread),
            },
        );
        Ok(TimerHandle { control })
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("owner", &self.inner.owner)
            .field("active", &self.active_count())
            .field("accepting", &self.is_accepting())
            .finish()
    }
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        for slot in self.timers.get_mut().values() {
            slot.control.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread::sleep;

    fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let c = Arc::new(AtomicUsize::new(0));
        (c.clone(), c)
    }

    #[test]
    fn test_after_fires_once() {
        let s = Scheduler::new("test");
        let (count, c) = counter();
        let h = s
            .after(Duration::from_millis(20), move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(h.kind(), TimerKind::After);

        sleep(Duration::from_millis(150));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(h.tick_count(), 1);
        assert!(h.is_finished());
        assert_eq!(s.active_count(), 0);
    }

    #[test]
    fn test_cancelled_after_never_fires() {
        let s = Scheduler::new("test");
        let (count, c) = counter();
        let h = s
            .after(Duration::from_millis(50), move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        h.cancel();
        h.cancel();

        sleep(Duration::from_millis(120));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_every_zero_period_rejected() {
        let s = Scheduler::new("test");
        assert!(matches!(
            s.every(Duration::ZERO, || {}),
            Err(Error::InvalidPeriod)
        ));
    }

    #[test]
    fn test_every_fires_until_cancelled() {
        let s = Scheduler::new("test");
        let (count, c) = counter();
        let h = s
            .every(Duration::from_millis(20), move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        sleep(Duration::from_millis(130));
        h.cancel();
        sleep(Duration::from_millis(30));
        let after_cancel = count.load(Ordering::SeqCst);
        assert!(after_cancel >= 3, "fired {} times", after_cancel);

        sleep(Duration::from_millis(80));
        assert_eq!(count.load(Ordering::SeqCst), after_cancel);
    }

    #[test]
    fn test_done_channel_cancels() {
        let s = Scheduler::new("test");
        let (count, c) = counter();
        let h = s
            .every(Duration::from_millis(15), move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        sleep(Duration::from_millis(50));
        h.done().send(()).unwrap();
        sleep(Duration::from_millis(30));
        let n = count.load(Ordering::SeqCst);
        sleep(Duration::from_millis(60));
        assert_eq!(count.load(Ordering::SeqCst), n);
        assert!(h.is_cancelled());
    }

    #[test]
    fn test_overrunning_ticks_do_not_overlap() {
        let s = Scheduler::new("test");
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let (count, c) = counter();
        let (f, m) = (in_flight.clone(), max_seen.clone());
        let h = s
            .every(Duration::from_millis(5), move || {
                let now = f.fetch_add(1, Ordering::SeqCst) + 1;
                m.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(25));
                f.fetch_sub(1, Ordering::SeqCst);
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        sleep(Duration::from_millis(200));
        h.cancel();
        s.shutdown();

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        // 无补发：每次处理 25ms，200ms 内至多约 8 次
        let n = count.load(Ordering::SeqCst);
        assert!((3..=9).contains(&n), "fired {} times", n);
    }

    #[test]
    fn test_handler_errors_and_panics_do_not_stop_timer() {
        let s = Scheduler::new("test");
        let (count, c) = counter();
        let h = s
            .every(Duration::from_millis(10), move || -> std::result::Result<(), String> {
                let n = c.fetch_add(1, Ordering::SeqCst);
                match n {
                    0 => panic!("first tick"),
                    1 => Err("second tick".into()),
                    _ => Ok(()),
                }
            })
            .unwrap();

        sleep(Duration::from_millis(120));
        h.cancel();
        assert!(count.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn test_shutdown_cancels_all_and_rejects_new() {
        let s = Scheduler::new("test");
        let (count, c) = counter();
        for _ in 0..3 {
            let c = c.clone();
            s.every(Duration::from_millis(10), move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        sleep(Duration::from_millis(50));

        assert_eq!(s.shutdown(), 0);
        let n = count.load(Ordering::SeqCst);
        sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), n);
        assert_eq!(s.active_count(), 0);

        assert!(matches!(
            s.after(Duration::from_millis(1), || {}),
            Err(Error::NotRunning(_))
        ));

        s.reopen();
        assert!(s.after(Duration::from_millis(1), || {}).is_ok());
    }

    #[test]
    fn test_closed_scheduler_rejects_until_reopened() {
        let s = Scheduler::closed("closed", SchedulerConfig::default());
        assert!(!s.is_accepting());
        assert!(matches!(
            s.every(Duration::from_millis(10), || ()),
            Err(Error::NotRunning(_))
        ));
        assert!(s.after(Duration::from_millis(10), || ()).is_err());
        assert_eq!(s.active_count(), 0);

        s.reopen();
        let handle = s.after(Duration::from_millis(10), || ()).unwrap();
        assert_eq!(handle.kind(), TimerKind::After);
        s.shutdown();
    }

    #[test]
    fn test_shutdown_grace_reports_overrun() {
        let s = Scheduler::new("test");
        s.after(Duration::ZERO, || sleep(Duration::from_millis(300)))
            .unwrap();
        sleep(Duration::from_millis(30));
        assert_eq!(s.shutdown_with_grace(Duration::from_millis(20)), 1);
    }

    #[test]
    fn test_shutdown_from_inside_timer() {
        let s = Scheduler::new("test");
        let s2 = s.clone();
        let (done, d) = counter();
        s.after(Duration::from_millis(5), move || {
            s2.shutdown_with_grace(Duration::from_millis(50));
            d.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        sleep(Duration::from_millis(150));
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_debounce_trailing() {
        let s = Scheduler::new("test");
        let (count, c) = counter();
        let d = s
            .debounce(Duration::from_millis(40), DebounceEdge::Trailing, move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        for _ in 0..5 {
            d.call();
            sleep(Duration::from_millis(5));
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);
        sleep(Duration::from_millis(150));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        d.call();
        sleep(Duration::from_millis(150));
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(d.handle().tick_count(), 2);
    }

    #[test]
    fn test_debounce_leading() {
        let s = Scheduler::new("test");
        let (count, c) = counter();
        let d = s
            .debounce(Duration::from_millis(50), DebounceEdge::Leading, move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        d.call();
        d.call();
        d.call();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        sleep(Duration::from_millis(100));
        d.call();
        assert_eq!(count.load(Ordering::SeqCst), 2);

        d.cancel();
        sleep(Duration::from_millis(100));
        d.call();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_shutdown_cancels_debounce() {
        let s = Scheduler::new("test");
        let (count, c) = counter();
        let d = s
            .debounce(Duration::from_millis(30), DebounceEdge::Trailing, move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        d.call();
        s.shutdown();
        sleep(Duration::from_millis(80));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
