//! Linux 后端：`i2c-dev`、`spidev` 和 termios 串口

mod i2c;
mod serial;
mod spi;

pub use i2c::LinuxI2cBus;
pub use serial::LinuxSerialPort;
pub use spi::LinuxSpiBus;
