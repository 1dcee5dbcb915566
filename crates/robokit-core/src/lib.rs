//! # robokit-core
//!
//! robokit 的核心原语，不依赖任何硬件：
//!
//! - **名称与注册表**：默认名生成、作用域内唯一性检查
//! - **事件总线**：[`Eventer`]，同步扇出、订阅句柄、通配订阅
//! - **命令注册表**：[`Commander`]，名称 → 处理函数，参数和返回值为 [`Value`]
//! - **调度器**：[`Scheduler`]，`after` / `every` / `debounce`，随机器人一起停止
//! - **生命周期契约**：[`Connection`]、[`Device`]、[`Capability`]
//! - **错误类型**：[`Error`]、[`MultiError`]

pub mod commander;
pub mod error;
pub mod eventer;
pub mod lifecycle;
pub mod name;
pub mod scheduler;
pub mod util;
pub mod value;

pub use commander::{CommandHandler, Commander};
pub use error::{Error, ErrorCategory, MultiError, Result};
pub use eventer::{Event, EventHandler, Eventer, Handler, Subscription, SubscriptionSet};
pub use lifecycle::{Capability, Connection, Device};
pub use name::{Named, Registry, default_name};
pub use scheduler::{
    DebounceEdge, Debounced, JoinTimeout, Scheduler, SchedulerConfig, TaskOutcome, TimerHandle,
    TimerKind,
};
pub use util::{from_scale, rand, to_scale};
pub use value::{Params, Payload, Value, params};
