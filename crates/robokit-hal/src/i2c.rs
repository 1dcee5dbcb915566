//! I²C 总线访问
//!
//! [`I2cBus`] 是原始后端（Linux `i2c-dev` 或 mock），只负责“设地址 + 读/写/SMBus 事务”；
//! [`I2cHandle`] 是驱动拿到的句柄：绑定总线号和设备地址，
//! 每个操作都在总线锁内重新设置地址，保证多个驱动共用一条总线时不会交错。
//!
//! # 示例
//!
//! ```ignore
//! let eeprom = board.i2c_open(1, 0x50)?;
//! eeprom.write_register(0x00, &[0xde, 0xad])?;
//! let data = eeprom.read_registers(0x00, 2)?;
//! ```

use crate::bus::SharedBus;
use robokit_core::{Error, Result};
use std::sync::Arc;
use tracing::trace;

/// 单次块传输的最大字节数
pub const I2C_BLOCK_MAX: usize = 32;

/// SMBus 事务方向
pub const I2C_SMBUS_READ: u8 = 1;
pub const I2C_SMBUS_WRITE: u8 = 0;

/// SMBus 事务大小
pub const I2C_SMBUS_BYTE: u32 = 1;
pub const I2C_SMBUS_BYTE_DATA: u32 = 2;
pub const I2C_SMBUS_WORD_DATA: u32 = 3;
pub const I2C_SMBUS_BLOCK_DATA: u32 = 5;
pub const I2C_SMBUS_I2C_BLOCK_DATA: u32 = 8;

/// 适配器功能位（`I2C_FUNCS` 的返回值）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct I2cFunctionality(pub u64);

impl I2cFunctionality {
    pub const NONE: Self = Self(0);
    pub const SMBUS_READ_BYTE: u64 = 0x0002_0000;
    pub const SMBUS_WRITE_BYTE: u64 = 0x0004_0000;
    pub const SMBUS_READ_BYTE_DATA: u64 = 0x0008_0000;
    pub const SMBUS_WRITE_BYTE_DATA: u64 = 0x0010_0000;
    pub const SMBUS_READ_WORD_DATA: u64 = 0x0020_0000;
    pub const SMBUS_WRITE_WORD_DATA: u64 = 0x0040_0000;
    pub const SMBUS_READ_BLOCK_DATA: u64 = 0x0100_0000;
    pub const SMBUS_WRITE_BLOCK_DATA: u64 = 0x0200_0000;
    pub const SMBUS_READ_I2C_BLOCK: u64 = 0x0400_0000;
    pub const SMBUS_WRITE_I2C_BLOCK: u64 = 0x0800_0000;

    /// 所有 SMBus 功能位
    pub const SMBUS_ALL: Self = Self(
        Self::SMBUS_READ_BYTE
            | Self::SMBUS_WRITE_BYTE
            | Self::SMBUS_READ_BYTE_DATA
            | Self::SMBUS_WRITE_BYTE_DATA
            | Self::SMBUS_READ_WORD_DATA
            | Self::SMBUS_WRITE_WORD_DATA
            | Self::SMBUS_READ_BLOCK_DATA
            | Self::SMBUS_WRITE_BLOCK_DATA
            | Self::SMBUS_READ_I2C_BLOCK
            | Self::SMBUS_WRITE_I2C_BLOCK,
    );

    pub fn supports(self, bit: u64) -> bool {
        self.0 & bit == bit
    }
}

/// SMBus 数据区（内核 `union i2c_smbus_data`）
///
/// `block[0]` 是块长度，`block[1..]` 是数据；字节和字事务只使用前 1/2 字节。
#[repr(C, align(2))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmbusData {
    pub block: [u8; I2C_BLOCK_MAX + 2],
}

impl Default for SmbusData {
    fn default() -> Self {
        Self {
            block: [0; I2C_BLOCK_MAX + 2],
        }
    }
}

impl SmbusData {
    pub fn byte(&self) -> u8 {
        self.block[0]
    }

    pub fn word(&self) -> u16 {
        u16::from_le_bytes([self.block[0], self.block[1]])
    }

    pub fn from_byte(value: u8) -> Self {
        let mut data = Self::default();
        data.block[0] = value;
        data
    }

    pub fn from_word(value: u16) -> Self {
        let mut data = Self::default();
        data.block[..2].copy_from_slice(&value.to_le_bytes());
        data
    }

    /// 块数据：长度字节 + 数据
    pub fn from_block(bytes: &[u8]) -> Self {
        let mut data = Self::default();
        let len = bytes.len().min(I2C_BLOCK_MAX);
        data.block[0] = len as u8;
        data.block[1..=len].copy_from_slice(&bytes[..len]);
        data
    }
}

/// 原始 I²C 后端
pub trait I2cBus: Send {
    /// 设置后续操作的从机地址
    fn set_address(&mut self, address: u16) -> Result<()>;

    fn write(&mut self, data: &[u8]) -> Result<usize>;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// 适配器支持的 SMBus 功能；默认不支持任何 SMBus 事务
    fn functionality(&mut self) -> Result<I2cFunctionality> {
        Ok(I2cFunctionality::NONE)
    }

    /// 执行一次 SMBus 事务
    fn smbus_access(
        &mut self,
        read_write: u8,
        command: u8,
        size: u32,
        data: Option<&mut SmbusData>,
    ) -> Result<()> {
        let _ = (read_write, command, size, data);
        Err(Error::Unsupported("SMBus transactions".to_string()))
    }
}

/// 绑定到某条总线上某个设备地址的句柄
#[derive(Clone)]
pub struct I2cHandle {
    bus_number: u32,
    address: u16,
    bus: Arc<SharedBus<dyn I2cBus>>,
}

impl std::fmt::Debug for I2cHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("I2cHandle")
            .field("bus", &self.bus.label())
            .field("address", &format_args!("{:#04x}", self.address))
            .finish()
    }
}

impl I2cHandle {
    pub fn new(bus_number: u32, address: u16, bus: Arc<SharedBus<dyn I2cBus>>) -> Self {
        Self {
            bus_number,
            address,
            bus,
        }
    }

    pub fn bus_number(&self) -> u32 {
        self.bus_number
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    /// 在总线锁内设置地址后执行 `f`
    fn transaction<R>(&self, f: impl FnOnce(&mut dyn I2cBus) -> Result<R>) -> Result<R> {
        let address = self.address;
        self.bus.with(|bus| {
            bus.set_address(address)?;
            f(bus)
        })
    }

    pub fn write(&self, data: &[u8]) -> Result<usize> {
        trace!("i2c {:#04x} write {} byte(s)", self.address, data.len());
        self.transaction(|bus| bus.write(data))
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.transaction(|bus| bus.read(buf))
    }

    /// 写寄存器：`[reg, data...]` 作为一次写入
    pub fn write_register(&self, register: u8, data: &[u8]) -> Result<()> {
        let mut frame = Vec::with_capacity(data.len() + 1);
        frame.push(register);
        frame.extend_from_slice(data);
        self.transaction(|bus| write_all(bus, &frame))
    }

    pub fn read_register(&self, register: u8) -> Result<u8> {
        let data = self.read_registers(register, 1)?;
        Ok(data[0])
    }

    /// 从 `register` 开始读 `len` 个字节
    ///
    /// “写寄存器地址 + 读数据”在同一次持锁内完成，
    /// 其他驱动的操作不会插入到两步之间。
    pub fn read_registers(&self, register: u8, len: usize) -> Result<Vec<u8>> {
        self.transaction(|bus| {
            write_all(bus, &[register])?;
            let mut buf = vec![0u8; len];
            read_exact(bus, &mut buf)?;
            Ok(buf)
        })
    }

    /// 读一个字节（SMBus receive byte，或回退为单字节读）
    pub fn read_byte(&self) -> Result<u8> {
        self.transaction(|bus| {
            if bus.functionality()?.supports(I2cFunctionality::SMBUS_READ_BYTE) {
                let mut data = SmbusData::default();
                bus.smbus_access(I2C_SMBUS_READ, 0, I2C_SMBUS_BYTE, Some(&mut data))?;
                Ok(data.byte())
            } else {
                let mut buf = [0u8; 1];
                read_exact(bus, &mut buf)?;
                Ok(buf[0])
            }
        })
    }

    /// 写一个字节（SMBus send byte，或回退为单字节写）
    pub fn write_byte(&self, value: u8) -> Result<()> {
        self.transaction(|bus| {
            if bus.functionality()?.supports(I2cFunctionality::SMBUS_WRITE_BYTE) {
                bus.smbus_access(I2C_SMBUS_WRITE, value, I2C_SMBUS_BYTE, None)
            } else {
                write_all(bus, &[value])
            }
        })
    }

    pub fn read_byte_data(&self, register: u8) -> Result<u8> {
        self.transaction(|bus| {
            if bus.functionality()?.supports(I2cFunctionality::SMBUS_READ_BYTE_DATA) {
                let mut data = SmbusData::default();
                bus.smbus_access(I2C_SMBUS_READ, register, I2C_SMBUS_BYTE_DATA, Some(&mut data))?;
                Ok(data.byte())
            } else {
                write_all(bus, &[register])?;
                let mut buf = [0u8; 1];
                read_exact(bus, &mut buf)?;
                Ok(buf[0])
            }
        })
    }

    pub fn write_byte_data(&self, register: u8, value: u8) -> Result<()> {
        self.transaction(|bus| {
            if bus.functionality()?.supports(I2cFunctionality::SMBUS_WRITE_BYTE_DATA) {
                let mut data = SmbusData::from_byte(value);
                bus.smbus_access(I2C_SMBUS_WRITE, register, I2C_SMBUS_BYTE_DATA, Some(&mut data))
            } else {
                write_all(bus, &[register, value])
            }
        })
    }

    /// 读 16 位字（小端）
    pub fn read_word_data(&self, register: u8) -> Result<u16> {
        self.transaction(|bus| {
            if bus.functionality()?.supports(I2cFunctionality::SMBUS_READ_WORD_DATA) {
                let mut data = SmbusData::default();
                bus.smbus_access(I2C_SMBUS_READ, register, I2C_SMBUS_WORD_DATA, Some(&mut data))?;
                Ok(data.word())
            } else {
                write_all(bus, &[register])?;
                let mut buf = [0u8; 2];
                read_exact(bus, &mut buf)?;
                Ok(u16::from_le_bytes(buf))
            }
        })
    }

    pub fn write_word_data(&self, register: u8, value: u16) -> Result<()> {
        self.transaction(|bus| {
            if bus.functionality()?.supports(I2cFunctionality::SMBUS_WRITE_WORD_DATA) {
                let mut data = SmbusData::from_word(value);
                bus.smbus_access(I2C_SMBUS_WRITE, register, I2C_SMBUS_WORD_DATA, Some(&mut data))
            } else {
                let [lo, hi] = value.to_le_bytes();
                write_all(bus, &[register, lo, hi])
            }
        })
    }

    /// 从 `register` 读满 `buf`（I²C block read，最多 32 字节）
    ///
    /// # 错误
    ///
    /// `buf` 超过 32 字节返回 [`Error::OutOfRange`]。
    pub fn read_block_data(&self, register: u8, buf: &mut [u8]) -> Result<()> {
        check_block_len(buf.len())?;
        self.transaction(|bus| {
            if bus.functionality()?.supports(I2cFunctionality::SMBUS_READ_I2C_BLOCK) {
                let mut data = SmbusData::default();
                data.block[0] = buf.len() as u8;
                bus.smbus_access(
                    I2C_SMBUS_READ,
                    register,
                    I2C_SMBUS_I2C_BLOCK_DATA,
                    Some(&mut data),
                )?;
                let got = usize::from(data.block[0]);
                if got != buf.len() {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!("block read returned {} of {} byte(s)", got, buf.len()),
                    )));
                }
                buf.copy_from_slice(&data.block[1..=got]);
                Ok(())
            } else {
                write_all(bus, &[register])?;
                read_exact(bus, buf)
            }
        })
    }

    /// 从 `register` 开始写入 `data`（I²C block write，最多 32 字节）
    pub fn write_block_data(&self, register: u8, data: &[u8]) -> Result<()> {
        check_block_len(data.len())?;
        self.transaction(|bus| {
            if bus.functionality()?.supports(I2cFunctionality::SMBUS_WRITE_I2C_BLOCK) {
                let mut block = SmbusData::from_block(data);
                bus.smbus_access(
                    I2C_SMBUS_WRITE,
                    register,
                    I2C_SMBUS_I2C_BLOCK_DATA,
                    Some(&mut block),
                )
            } else {
                let mut frame = Vec::with_capacity(data.len() + 1);
                frame.push(register);
                frame.extend_from_slice(data);
                write_all(bus, &frame)
            }
        })
    }
}

fn check_block_len(len: usize) -> Result<()> {
    if len > I2C_BLOCK_MAX {
        return Err(Error::OutOfRange(format!(
            "I2C block of {} bytes exceeds {}",
            len, I2C_BLOCK_MAX
        )));
    }
    Ok(())
}

fn write_all(bus: &mut dyn I2cBus, data: &[u8]) -> Result<()> {
    let n = bus.write(data)?;
    if n != data.len() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::WriteZero,
            format!("short I2C write: {} of {} byte(s)", n, data.len()),
        )));
    }
    Ok(())
}

fn read_exact(bus: &mut dyn I2cBus, buf: &mut [u8]) -> Result<()> {
    let n = bus.read(buf)?;
    if n != buf.len() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("short I2C read: {} of {} byte(s)", n, buf.len()),
        )));
    }
    Ok(())
}
