//! # robokit-hal
//!
//! 硬件抽象层：
//!
//! - **能力 trait**：[`DigitalReader`]、[`DigitalWriter`]、[`AnalogReader`]、[`PwmWriter`]、
//!   [`I2cOperator`]、[`SpiOperator`]、[`SerialOperator`]、[`BleClient`]
//! - **引脚资源管理**：[`PinManager`]，按 [`PinMap`] 完成复用、电平转换、导出和逆序释放
//! - **总线共享**：[`BusManager`]，每条 I²C/SPI 总线一把锁
//! - **适配器**：[`BoardAdaptor`]（sysfs 板卡）、[`SerialAdaptor`]、[`BleAdaptor`]
//! - **Mock 后端**（`mock` feature）：内存 sysfs、EEPROM 风格 I²C、回环 SPI、内存串口和 BLE 外设
//!
//! # 示例
//!
//! ```ignore
//! use robokit_hal::{BoardAdaptor, DigitalWriter, pinmap};
//! use robokit_core::Connection;
//!
//! let board = BoardAdaptor::builder()
//!     .name("edison")
//!     .pin_map(pinmap::edison_arduino())
//!     .build();
//! board.connect()?;
//! board.digital_write("13", 1)?;
//! board.finalize()?;
//! ```

pub mod adaptor;
pub mod ble;
pub mod bus;
pub mod capability;
pub mod fs;
pub mod i2c;
pub mod pinmap;
pub mod pins;
pub mod serial;
pub mod spi;
pub mod sysfs;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use adaptor::{BoardAdaptor, BoardAdaptorBuilder};
pub use ble::{Advertisement, BleAdaptor, BleClient, NotifyHandler};
pub use bus::{BusFactory, BusManager, SharedBus};
pub use capability::{
    AnalogReader, DigitalReader, DigitalWriter, I2cOperator, PwmWriter, SerialOperator,
    SpiOperator,
};
pub use fs::{Filesystem, NativeFilesystem};
pub use i2c::{I2cBus, I2cFunctionality, I2cHandle, SmbusData};
pub use pinmap::{MuxSetting, PinDescriptor, PinMap, PwmChannel};
pub use pins::{Bias, DIGITAL_EDGE, DigitalPinOptions, PinManager, PinManagerConfig, ServoRange};
pub use serial::{SerialAdaptor, SerialOpener, SerialPort};
pub use spi::{SpiBus, SpiConfig, SpiHandle, SpiMode};
pub use sysfs::{Direction, Edge};

#[cfg(any(test, feature = "mock"))]
pub use fs::{FailMode, MockFilesystem};
