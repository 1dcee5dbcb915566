//! 事件总线
//!
//! 每个发射者（连接、设备、机器人、管理器）持有一个 [`Eventer`]：
//!
//! - 事件名需要先通过 [`Eventer::add_event`] 声明
//! - [`Eventer::publish`] 在调用者线程上**同步**、按注册顺序调用订阅者
//! - 订阅列表只在短临界区内加锁；回调在锁外执行，因此回调中可以订阅/取消订阅
//! - 回调 panic 会被捕获并记录，不影响后续订阅者
//! - [`Eventer::subscribe_channel`] 把事件投递到通道，由消费者在自己的线程上处理
//! - 没有订阅者时发布不分配内存
//!
//! # 示例
//!
//! ```
//! use robokit_core::{Eventer, Payload};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicI64, Ordering};
//!
//! let eventer = Eventer::new("button");
//! eventer.add_event("push");
//!
//! let last = Arc::new(AtomicI64::new(0));
//! let last_clone = last.clone();
//! let _sub = eventer
//!     .on("push", move |p: &Payload| {
//!         last_clone.store(p.as_int().unwrap_or(-1), Ordering::SeqCst);
//!     })
//!     .unwrap();
//!
//! eventer.publish("push", 7);
//! assert_eq!(last.load(Ordering::SeqCst), 7);
//! ```

use crate::error::{Error, Result};
use crate::value::Payload;
use crossbeam_channel::{Receiver, unbounded};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{error, trace, warn};

/// 事件回调
pub type Handler = Arc<dyn Fn(&Payload) + Send + Sync>;

/// 通配订阅回调，接收带来源信息的完整事件
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

/// 完整事件：`(发射者, 事件名, 负载)`
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub source: String,
    pub name: String,
    pub payload: Payload,
}

struct Slot<H> {
    id: u64,
    active: Arc<AtomicBool>,
    handler: H,
}

// 快照内联容量；超过时才会分配
type Snapshot<H> = SmallVec<[(Arc<AtomicBool>, H); 4]>;

struct EventerInner {
    source: String,
    events: Mutex<BTreeMap<String, Vec<Slot<Handler>>>>,
    wildcard: Mutex<Vec<Slot<EventHandler>>>,
    next_id: AtomicU64,
}

impl EventerInner {
    fn remove(&self, event: Option<&str>, id: u64) {
        match event {
            Some(name) => {
                if let Some(slots) = self.events.lock().get_mut(name) {
                    slots.retain(|s| s.id != id);
                }
            },
            None => self.wildcard.lock().retain(|s| s.id != id),
        }
    }
}

/// 事件发射者句柄（可廉价克隆，克隆共享同一订阅表）
#[derive(Clone)]
pub struct Eventer {
    inner: Arc<EventerInner>,
}

impl Eventer {
    /// 创建发射者，`source` 是通配订阅者看到的来源名称
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventerInner {
                source: source.into(),
                events: Mutex::new(BTreeMap::new()),
                wildcard: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn source(&self) -> &str {
        &self.inner.source
    }

    /// 声明事件；已存在时为空操作
    pub fn add_event(&self, name: &str) {
        self.inner.events.lock().entry(name.to_string()).or_default();
    }

    /// 删除事件声明及其全部订阅
    pub fn delete_event(&self, name: &str) {
        if let Some(slots) = self.inner.events.lock().remove(name) {
            for slot in slots {
                slot.active.store(false, Ordering::Release);
            }
        }
    }

    pub fn has_event(&self, name: &str) -> bool {
        self.inner.events.lock().contains_key(name)
    }

    /// 已声明的事件名（按字典序）
    pub fn events(&self) -> Vec<String> {
        self.inner.events.lock().keys().cloned().collect()
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.inner.events.lock().get(name).map_or(0, Vec::len)
    }

    /// 订阅事件
    ///
    /// # 错误
    ///
    /// 事件未声明时返回 [`Error::UnknownEvent`]。
    pub fn on<F>(&self, name: &str, handler: F) -> Result<Subscription>
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.insert(name, id, Arc::new(handler))
    }

    /// 一次性订阅：第一次投递后自动注销
    pub fn once<F>(&self, name: &str, handler: F) -> Result<Subscription>
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        let id = self.next_id();
        let fired = AtomicBool::new(false);
        let weak = Arc::downgrade(&self.inner);
        let event = name.to_string();
        let wrapped = move |payload: &Payload| {
            if fired.swap(true, Ordering::AcqRel) {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                inner.remove(Some(&event), id);
            }
            handler(payload);
        };
        self.insert(name, id, Arc::new(wrapped))
    }

    /// 通配订阅：接收该发射者发布的每一个已声明事件
    pub fn subscribe_all<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.next_id();
        let active = Arc::new(AtomicBool::new(true));
        self.inner.wildcard.lock().push(Slot {
            id,
            active: active.clone(),
            handler: Arc::new(handler),
        });
        Subscription {
            inner: Arc::downgrade(&self.inner),
            event: None,
            id,
            active,
        }
    }

    /// 通道订阅：每个事件的副本投递到返回的 [`Receiver`]
    ///
    /// 发布者不等待接收方；消费者可以在自己的线程上处理耗时逻辑。
    /// 取消订阅后发送端被释放，接收端在取完剩余事件后断开。
    ///
    /// # 示例
    ///
    /// ```
    /// use robokit_core::Eventer;
    ///
    /// let eventer = Eventer::new("sensor");
    /// eventer.add_event("reading");
    /// let (sub, events) = eventer.subscribe_channel();
    ///
    /// eventer.publish("reading", 21);
    /// let worker = std::thread::spawn(move || events.iter().count());
    /// sub.cancel();
    /// assert_eq!(worker.join().unwrap(), 1);
    /// ```
    pub fn subscribe_channel(&self) -> (Subscription, Receiver<Event>) {
        let (tx, rx) = unbounded();
        let sub = self.subscribe_all(move |event| {
            let _ = tx.send(event.clone());
        });
        (sub, rx)
    }

    /// 发布事件
    ///
    /// 先对订阅列表做快照，再在锁外按注册顺序同步调用。
    /// 未声明的事件只记录警告，不返回错误。
    pub fn publish(&self, name: &str, payload: impl Into<Payload>) {
        let payload = payload.into();

        let snapshot: Option<Snapshot<Handler>> = self.inner.events.lock().get(name).map(|slots| {
            slots
                .iter()
                .map(|s| (s.active.clone(), s.handler.clone()))
                .collect()
        });
        let Some(snapshot) = snapshot else {
            warn!("{}: publish of undeclared event '{}' ignored", self.source(), name);
            return;
        };

        for (active, handler) in snapshot {
            // 同一次发布中前面的回调可能已经取消了后面的订阅
            if !active.load(Ordering::Acquire) {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| handler(&payload))).is_err() {
                error!("{}: handler for event '{}' panicked", self.source(), name);
            }
        }

        let wildcard: Snapshot<EventHandler> = self
            .inner
            .wildcard
            .lock()
            .iter()
            .map(|s| (s.active.clone(), s.handler.clone()))
            .collect();
        if wildcard.is_empty() {
            return;
        }

        let event = Event {
            source: self.inner.source.clone(),
            name: name.to_string(),
            payload,
        };
        for (active, handler) in wildcard {
            if !active.load(Ordering::Acquire) {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                error!("{}: wildcard handler for event '{}' panicked", self.source(), name);
            }
        }
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn insert(&self, name: &str, id: u64, handler: Handler) -> Result<Subscription> {
        let active = Arc::new(AtomicBool::new(true));
        {
            let mut events = self.inner.events.lock();
            let slots = events
                .get_mut(name)
                .ok_or_else(|| Error::UnknownEvent(name.to_string()))?;
            slots.push(Slot {
                id,
                active: active.clone(),
                handler,
            });
        }
        trace!("{}: subscribed #{} to '{}'", self.source(), id, name);
        Ok(Subscription {
            inner: Arc::downgrade(&self.inner),
            event: Some(name.to_string()),
            id,
            active,
        })
    }
}

impl std::fmt::Debug for Eventer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Eventer")
            .field("source", &self.inner.source)
            .field("events", &self.events())
            .finish()
    }
}

/// 订阅句柄
///
/// Drop 时自动取消订阅；需要让订阅与发射者同生命周期时调用 [`Subscription::detach`]。
/// 取消是幂等的，取消后不会再有回调被调用。
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    inner: Weak<EventerInner>,
    event: Option<String>,
    id: u64,
    active: Arc<AtomicBool>,
}

impl Subscription {
    /// 取消订阅（幂等）
    pub fn cancel(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(inner) = self.inner.upgrade() {
            inner.remove(self.event.as_deref(), self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// 订阅的事件名；通配订阅返回 `None`
    pub fn event(&self) -> Option<&str> {
        self.event.as_deref()
    }

    /// 放弃句柄但保留订阅
    pub fn detach(self) {
        std::mem::forget(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// 一组订阅，作为整体取消
///
/// 跨多个发射者的通配订阅（机器人、管理器的 `on_all`）返回它。
/// Drop 时取消其中全部订阅。
#[must_use = "dropping a SubscriptionSet unsubscribes immediately"]
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subs: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sub: Subscription) {
        self.subs.push(sub);
    }

    /// 并入另一组订阅
    pub fn extend(&mut self, other: SubscriptionSet) {
        self.subs.extend(other.subs);
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }

    /// 取消全部订阅（幂等）
    pub fn cancel(&self) {
        for sub in &self.subs {
            sub.cancel();
        }
    }

    /// 放弃句柄但保留全部订阅
    pub fn detach(self) {
        for sub in self.subs {
            sub.detach();
        }
    }
}

impl FromIterator<Subscription> for SubscriptionSet {
    fn from_iter<I: IntoIterator<Item = Subscription>>(iter: I) -> Self {
        Self {
            subs: iter.into_iter().collect(),
        }
    }
}
