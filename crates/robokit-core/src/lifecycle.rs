//! 连接与设备的生命周期契约
//!
//! - [`Connection`]：硬件或网络传输的句柄（`connect` / `finalize`）
//! - [`Device`]：建立在某个连接之上的驱动（`start` / `halt`）
//!
//! 两者都以 `&self` 暴露操作，驱动内部自行使用原子量或锁保存可变状态，
//! 这样机器人、工作闭包和定时器可以通过 `Arc` 共享同一个实例。

use crate::commander::Commander;
use crate::error::Result;
use crate::eventer::Eventer;
use crate::name::Named;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 板级适配器可提供的硬件能力
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Capability {
    DigitalRead,
    DigitalWrite,
    AnalogRead,
    PwmWrite,
    I2c,
    Spi,
    Serial,
    Ble,
}

impl Capability {
    pub const ALL: [Capability; 8] = [
        Capability::DigitalRead,
        Capability::DigitalWrite,
        Capability::AnalogRead,
        Capability::PwmWrite,
        Capability::I2c,
        Capability::Spi,
        Capability::Serial,
        Capability::Ble,
    ];

    /// 对应的能力 trait 名称
    pub fn trait_name(self) -> &'static str {
        match self {
            Capability::DigitalRead => "DigitalReader",
            Capability::DigitalWrite => "DigitalWriter",
            Capability::AnalogRead => "AnalogReader",
            Capability::PwmWrite => "PwmWriter",
            Capability::I2c => "I2cOperator",
            Capability::Spi => "SpiOperator",
            Capability::Serial => "SerialOperator",
            Capability::Ble => "BleClient",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.trait_name())
    }
}

/// 连接（适配器）
pub trait Connection: Named + Send + Sync {
    /// 建立连接；机器人启动时按声明顺序调用
    fn connect(&self) -> Result<()>;

    /// 释放连接占用的全部资源；机器人停止或启动回滚时按逆序调用
    fn finalize(&self) -> Result<()>;

    /// 该连接实现的能力
    fn capabilities(&self) -> &[Capability] {
        &[]
    }

    fn provides(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// 连接自身的事件发射者（可选）
    fn eventer(&self) -> Option<&Eventer> {
        None
    }

    /// 类型名（不含路径和泛型参数），用于快照
    fn kind(&self) -> &str {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// 设备（驱动）
pub trait Device: Named + Send + Sync {
    /// 主连接的名称；纯软件设备返回 `None`
    fn connection_name(&self) -> Option<&str>;

    /// 启动设备；所有连接都成功建立后按声明顺序调用
    fn start(&self) -> Result<()>;

    /// 停止设备；按逆序调用，错误被收集而不中断拆除
    fn halt(&self) -> Result<()>;

    /// 设备需要其连接提供的能力；缺失时机器人启动失败并返回
    /// [`Error::CapabilityMissing`](crate::Error::CapabilityMissing)
    fn requires(&self) -> &[Capability] {
        &[]
    }

    fn eventer(&self) -> Option<&Eventer> {
        None
    }

    fn commander(&self) -> Option<&Commander> {
        None
    }

    fn kind(&self) -> &str {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// `a::b::Adaptor<c::Client>` → `Adaptor`
fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Gpio;

    impl Named for Gpio {
        fn name(&self) -> &str {
            "gpio"
        }
    }

    impl Connection for Gpio {
        fn connect(&self) -> Result<()> {
            Ok(())
        }

        fn finalize(&self) -> Result<()> {
            Ok(())
        }

        fn capabilities(&self) -> &[Capability] {
            &[Capability::DigitalRead, Capability::DigitalWrite]
        }
    }

    struct Wrapped<T>(T);

    impl<T: Send + Sync> Named for Wrapped<T> {
        fn name(&self) -> &str {
            "wrapped"
        }
    }

    impl<T: Send + Sync> Connection for Wrapped<T> {
        fn connect(&self) -> Result<()> {
            Ok(())
        }

        fn finalize(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_kind_strips_path_and_generics() {
        assert_eq!(Gpio.kind(), "Gpio");
        assert_eq!(Wrapped(Gpio).kind(), "Wrapped");
        assert_eq!(Wrapped(Vec::<std::string::String>::new()).kind(), "Wrapped");
        assert_eq!(short_type_name("core::Plain"), "Plain");
    }

    #[test]
    fn test_capability_display() {
        assert_eq!(Capability::PwmWrite.to_string(), "PwmWriter");
        assert_eq!(Capability::ALL.len(), 8);
    }

    #[test]
    fn test_connection_defaults() {
        let g = Gpio;
        assert!(g.provides(Capability::DigitalWrite));
        assert!(!g.provides(Capability::I2c));
        assert!(g.eventer().is_none());
        assert_eq!(g.kind(), "Gpio");
    }

    #[test]
    fn test_connection_kind_through_trait_object() {
        let g: std::sync::Arc<dyn Connection> = std::sync::Arc::new(Gpio);
        assert_eq!(g.kind(), "Gpio");
    }
}
