//! 硬件能力 trait
//!
//! 驱动只依赖这些 trait，不依赖具体板卡。一个适配器实现哪些 trait，
//! 就在 [`Connection::capabilities`](robokit_core::Connection::capabilities) 中声明对应的
//! [`Capability`](robokit_core::Capability)，机器人启动前据此检查驱动需求。
//!
//! | trait | 操作 |
//! |-------|------|
//! | [`DigitalReader`] | `digital_read` |
//! | [`DigitalWriter`] | `digital_write` |
//! | [`AnalogReader`] | `analog_read` |
//! | [`PwmWriter`] | `pwm_write`、`servo_write` |
//! | [`I2cOperator`] | `i2c_open` → [`I2cHandle`] |
//! | [`SpiOperator`] | `spi_open` → [`SpiHandle`] |
//! | [`SerialOperator`] | `serial_open`、`serial_read`、`serial_write`、`serial_close` |
//! | [`BleClient`](crate::BleClient) | 见 [`ble`](crate::ble) 模块 |

use crate::i2c::I2cHandle;
use crate::spi::{SpiHandle, SpiMode};
use robokit_core::Result;

pub trait DigitalReader: Send + Sync {
    /// 读取电平（0 或 1）
    fn digital_read(&self, pin: &str) -> Result<u8>;
}

pub trait DigitalWriter: Send + Sync {
    /// 写电平；`level` 只能是 0 或 1，否则返回 `OutOfRange`
    fn digital_write(&self, pin: &str, level: u8) -> Result<()>;
}

pub trait AnalogReader: Send + Sync {
    /// 读取 ADC 原始值
    fn analog_read(&self, pin: &str) -> Result<i32>;
}

pub trait PwmWriter: Send + Sync {
    /// 占空比 0..=255 映射到 0..=周期
    fn pwm_write(&self, pin: &str, duty: u8) -> Result<()>;

    /// 舵机角度 0..=180
    fn servo_write(&self, pin: &str, angle: u8) -> Result<()>;
}

pub trait I2cOperator: Send + Sync {
    /// 打开总线 `bus` 上地址为 `address` 的设备
    ///
    /// # 错误
    ///
    /// 总线不受支持返回 `UnknownBus`。
    fn i2c_open(&self, bus: u32, address: u16) -> Result<I2cHandle>;

    /// 板卡默认 I²C 总线号
    fn default_i2c_bus(&self) -> u32 {
        0
    }
}

pub trait SpiOperator: Send + Sync {
    fn spi_open(
        &self,
        bus: u32,
        chip_select: u32,
        mode: SpiMode,
        bits_per_word: u8,
        speed_hz: u32,
    ) -> Result<SpiHandle>;

    fn default_spi_bus(&self) -> u32 {
        0
    }
}

pub trait SerialOperator: Send + Sync {
    /// 以 `baud` 打开端口 `port`；同一端口已打开时为空操作
    ///
    /// # 错误
    ///
    /// 打开失败返回 `OpenFailed`。
    fn serial_open(&self, port: &str, baud: u32) -> Result<()>;

    fn serial_read(&self, buf: &mut [u8]) -> Result<usize>;

    fn serial_write(&self, data: &[u8]) -> Result<usize>;

    /// 关闭端口；未打开时为空操作
    fn serial_close(&self) -> Result<()>;
}
