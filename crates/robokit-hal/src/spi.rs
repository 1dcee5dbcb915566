//! SPI 总线访问
//!
//! 一条 SPI 总线上可以挂多个片选（chip select）。后端 [`SpiBus`] 在每次传输前
//! 按片选和参数重新配置，[`SpiHandle`] 把“配置 + 全双工传输”放在同一次持锁内完成。

use crate::bus::SharedBus;
use robokit_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

/// 默认时钟频率：500 kHz
pub const DEFAULT_SPEED_HZ: u32 = 500_000;

/// SPI 模式（CPOL/CPHA）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpiMode {
    #[default]
    Mode0,
    Mode1,
    Mode2,
    Mode3,
}

impl SpiMode {
    /// spidev 的模式位
    pub fn bits(self) -> u8 {
        match self {
            SpiMode::Mode0 => 0,
            SpiMode::Mode1 => 1,
            SpiMode::Mode2 => 2,
            SpiMode::Mode3 => 3,
        }
    }
}

impl TryFrom<u8> for SpiMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(SpiMode::Mode0),
            1 => Ok(SpiMode::Mode1),
            2 => Ok(SpiMode::Mode2),
            3 => Ok(SpiMode::Mode3),
            other => Err(Error::InvalidArgument(format!("SPI mode {}", other))),
        }
    }
}

/// 单个片选设备的传输参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpiConfig {
    pub mode: SpiMode,
    pub bits_per_word: u8,
    pub speed_hz: u32,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            mode: SpiMode::Mode0,
            bits_per_word: 8,
            speed_hz: DEFAULT_SPEED_HZ,
        }
    }
}

/// 原始 SPI 后端
pub trait SpiBus: Send {
    /// 选择片选并应用参数
    fn configure(&mut self, chip_select: u32, config: &SpiConfig) -> Result<()>;

    /// 全双工传输，返回与 `tx` 等长的接收数据
    fn transfer(&mut self, tx: &[u8]) -> Result<Vec<u8>>;
}

/// 绑定到某条总线上某个片选的句柄
#[derive(Clone)]
pub struct SpiHandle {
    bus_number: u32,
    chip_select: u32,
    config: SpiConfig,
    bus: Arc<SharedBus<dyn SpiBus>>,
}

impl std::fmt::Debug for SpiHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpiHandle")
            .field("bus", &self.bus.label())
            .field("chip_select", &self.chip_select)
            .field("config", &self.config)
            .finish()
    }
}

impl SpiHandle {
    pub fn new(
        bus_number: u32,
        chip_select: u32,
        config: SpiConfig,
        bus: Arc<SharedBus<dyn SpiBus>>,
    ) -> Self {
        Self {
            bus_number,
            chip_select,
            config,
            bus,
        }
    }

    pub fn bus_number(&self) -> u32 {
        self.bus_number
    }

    pub fn chip_select(&self) -> u32 {
        self.chip_select
    }

    pub fn config(&self) -> &SpiConfig {
        &self.config
    }

    /// 全双工传输
    pub fn transfer(&self, tx: &[u8]) -> Result<Vec<u8>> {
        trace!(
            "spi {}.{} transfer {} byte(s)",
            self.bus_number,
            self.chip_select,
            tx.len()
        );
        let (cs, config) = (self.chip_select, self.config);
        self.bus.with(|bus| {
            bus.configure(cs, &config)?;
            bus.transfer(tx)
        })
    }

    /// 只写，丢弃接收数据
    pub fn write(&self, data: &[u8]) -> Result<()> {
        self.transfer(data).map(|_| ())
    }

    /// 发送 `len` 个零字节并返回接收数据
    pub fn read(&self, len: usize) -> Result<Vec<u8>> {
        self.transfer(&vec![0u8; len])
    }
}
