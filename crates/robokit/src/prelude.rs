//! 常用类型的便捷导入
//!
//! ```rust
//! use robokit::prelude::*;
//! ```

// 核心
pub use robokit_core::{
    Capability, Commander, Connection, DebounceEdge, Device, Error, Eventer, MultiError, Named,
    Params, Payload, Result, Scheduler, Subscription, SubscriptionSet, TimerHandle, Value, from_scale,
    params, to_scale,
};

// 能力 trait 和适配器
pub use robokit_hal::{
    AnalogReader, BleAdaptor, BleClient, BoardAdaptor, DigitalPinOptions, DigitalReader,
    DigitalWriter, I2cHandle, I2cOperator, PinMap, PwmWriter, SerialAdaptor, SerialOperator,
    SpiHandle, SpiMode, SpiOperator,
};

// 生命周期
pub use robokit_runtime::{Manager, ManagerConfig, Robot, RobotConfig, RobotState, StartPolicy};
