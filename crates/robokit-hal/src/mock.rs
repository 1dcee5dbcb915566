//! Mock 后端（无硬件依赖）
//!
//! - [`MockI2cBus`]：每个地址一块 256 字节寄存器文件（EEPROM 风格自增指针），
//!   无设备的地址返回 NAK；记录事务日志并检测并发交错
//! - [`MockSpiBus`]：回环（接收 = 发送）
//! - [`MockSerial`]：内存双工串口
//! - [`MockBlePeripheral`]：内存 GATT 外设
//!
//! 所有 mock 都是 `Clone` 的共享句柄，测试可以把一份交给适配器，用另一份检查状态。

use crate::ble::{Advertisement, BleClient, NotifyHandler};
use crate::i2c::{
    I2C_SMBUS_BLOCK_DATA, I2C_SMBUS_BYTE, I2C_SMBUS_BYTE_DATA, I2C_SMBUS_I2C_BLOCK_DATA,
    I2C_SMBUS_READ, I2C_SMBUS_WORD_DATA, I2cBus, I2cFunctionality, SmbusData,
};
use crate::serial::SerialPort;
use crate::spi::{SpiBus, SpiConfig};
use bytes::Bytes;
use parking_lot::Mutex;
use robokit_core::{Error, Result};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// I²C 事务日志条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum I2cOp {
    Write(Vec<u8>),
    Read(usize),
    Smbus { read: bool, command: u8, size: u32 },
}

struct Registers {
    data: [u8; 256],
    pointer: u8,
}

impl Registers {
    fn new() -> Self {
        Self {
            data: [0; 256],
            pointer: 0,
        }
    }

    fn store(&mut self, start: u8, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.data[usize::from(start.wrapping_add(i as u8))] = *b;
        }
    }

    fn load(&self, start: u8, out: &mut [u8]) {
        for (i, b) in out.iter_mut().enumerate() {
            *b = self.data[usize::from(start.wrapping_add(i as u8))];
        }
    }
}

#[derive(Default)]
struct I2cState {
    devices: BTreeMap<u16, Registers>,
    address: Option<u16>,
    log: Vec<(u16, I2cOp)>,
}

/// EEPROM 风格的 I²C 总线
#[derive(Clone, Default)]
pub struct MockI2cBus {
    state: Arc<Mutex<I2cState>>,
    smbus: bool,
    latency: Duration,
    in_flight: Arc<AtomicBool>,
    overlaps: Arc<AtomicUsize>,
}

impl MockI2cBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在 `address` 挂一个设备
    pub fn with_device(self, address: u16) -> Self {
        self.state.lock().devices.insert(address, Registers::new());
        self
    }

    /// 声明支持全部 SMBus 事务
    pub fn with_smbus(mut self) -> Self {
        self.smbus = true;
        self
    }

    /// 每个操作的模拟耗时
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// 直接设置寄存器内容
    pub fn set_registers(&self, address: u16, start: u8, bytes: &[u8]) {
        self.state
            .lock()
            .devices
            .entry(address)
            .or_insert_with(Registers::new)
            .store(start, bytes);
    }

    pub fn registers(&self, address: u16, start: u8, len: usize) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let regs = state.devices.get(&address)?;
        let mut out = vec![0u8; len];
        regs.load(start, &mut out);
        Some(out)
    }

    /// `(地址, 操作)` 日志
    pub fn log(&self) -> Vec<(u16, I2cOp)> {
        self.state.lock().log.clone()
    }

    /// 检测到的并发重叠次数
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    /// 在“操作进行中”标志内执行 `f`；若标志已被占用说明总线锁失效
    fn op<R>(&self, f: impl FnOnce(&mut I2cState, u16) -> Result<R>) -> Result<R> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        let result = {
            let mut state = self.state.lock();
            match state.address {
                Some(address) if state.devices.contains_key(&address) => f(&mut state, address),
                Some(address) => Err(Error::Nak { address }),
                None => Err(Error::InvalidArgument("I2C address not set".to_string())),
            }
        };
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }
}

impl I2cBus for MockI2cBus {
    fn set_address(&mut self, address: u16) -> Result<()> {
        self.state.lock().address = Some(address);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.op(|state, address| {
            state.log.push((address, I2cOp::Write(data.to_vec())));
            if let Some((&first, rest)) = data.split_first() {
                if let Some(regs) = state.devices.get_mut(&address) {
                    regs.store(first, rest);
                    regs.pointer = first.wrapping_add(rest.len() as u8);
                }
            }
            Ok(data.len())
        })
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.op(|state, address| {
            state.log.push((address, I2cOp::Read(buf.len())));
            if let Some(regs) = state.devices.get_mut(&address) {
                regs.load(regs.pointer, buf);
                regs.pointer = regs.pointer.wrapping_add(buf.len() as u8);
            }
            Ok(buf.len())
        })
    }

    fn functionality(&mut self) -> Result<I2cFunctionality> {
        Ok(if self.smbus {
            I2cFunctionality::SMBUS_ALL
        } else {
            I2cFunctionality::NONE
        })
    }

    fn smbus_access(
        &mut self,
        read_write: u8,
        command: u8,
        size: u32,
        data: Option<&mut SmbusData>,
    ) -> Result<()> {
        if !self.smbus {
            return Err(Error::Unsupported("SMBus transactions".to_string()));
        }
        let read = read_write == I2C_SMBUS_READ;
        self.op(|state, address| {
            state.log.push((address, I2cOp::Smbus { read, command, size }));
            let Some(regs) = state.devices.get_mut(&address) else {
                return Err(Error::Nak { address });
            };

            let mut scratch = SmbusData::default();
            let data = data.unwrap_or(&mut scratch);
            match (size, read) {
                (I2C_SMBUS_BYTE, true) => {
                    data.block[0] = regs.data[usize::from(regs.pointer)];
                    regs.pointer = regs.pointer.wrapping_add(1);
                },
                (I2C_SMBUS_BYTE, false) => regs.pointer = command,
                (I2C_SMBUS_BYTE_DATA, true) => regs.load(command, &mut data.block[..1]),
                (I2C_SMBUS_BYTE_DATA, false) => regs.store(command, &data.block[..1]),
                (I2C_SMBUS_WORD_DATA, true) => regs.load(command, &mut data.block[..2]),
                (I2C_SMBUS_WORD_DATA, false) => regs.store(command, &data.block[..2]),
                (I2C_SMBUS_BLOCK_DATA | I2C_SMBUS_I2C_BLOCK_DATA, true) => {
                    let len = usize::from(data.block[0]).min(32);
                    regs.load(command, &mut data.block[1..=len]);
                },
                (I2C_SMBUS_BLOCK_DATA | I2C_SMBUS_I2C_BLOCK_DATA, false) => {
                    let len = usize::from(data.block[0]).min(32);
                    let bytes = data.block[1..=len].to_vec();
                    regs.store(command, &bytes);
                },
                (other, _) => {
                    return Err(Error::Unsupported(format!("SMBus size {}", other)));
                },
            }
            Ok(())
        })
    }
}

/// SPI 日志条目：`(片选, 参数, 发送数据)`
pub type SpiLogEntry = (u32, SpiConfig, Vec<u8>);

#[derive(Default)]
struct SpiState {
    selected: Option<(u32, SpiConfig)>,
    log: Vec<SpiLogEntry>,
}

/// 回环 SPI 总线
#[derive(Clone, Default)]
pub struct MockSpiBus {
    state: Arc<Mutex<SpiState>>,
}

impl MockSpiBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> Vec<SpiLogEntry> {
        self.state.lock().log.clone()
    }
}

impl SpiBus for MockSpiBus {
    fn configure(&mut self, chip_select: u32, config: &SpiConfig) -> Result<()> {
        self.state.lock().selected = Some((chip_select, *config));
        Ok(())
    }

    fn transfer(&mut self, tx: &[u8]) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        let (cs, config) = state
            .selected
            .ok_or_else(|| Error::InvalidArgument("SPI device not configured".to_string()))?;
        state.log.push((cs, config, tx.to_vec()));
        Ok(tx.to_vec())
    }
}

#[derive(Default)]
struct SerialState {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

/// 内存双工串口
#[derive(Clone, Default)]
pub struct MockSerial {
    state: Arc<Mutex<SerialState>>,
}

impl MockSerial {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟对端发来的数据
    pub fn push_input(&self, data: &[u8]) {
        self.state.lock().input.extend(data.iter().copied());
    }

    /// 已写出的全部数据
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().output.clone()
    }
}

impl SerialPort for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.state.lock();
        let n = buf.len().min(state.input.len());
        for (slot, byte) in buf.iter_mut().zip(state.input.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.state.lock().output.extend_from_slice(data);
        Ok(data.len())
    }
}

#[derive(Default)]
struct BleState {
    advertising: bool,
    connected: bool,
    characteristics: BTreeMap<String, Bytes>,
    subscribers: BTreeMap<String, Vec<NotifyHandler>>,
}

/// 内存 GATT 外设
#[derive(Clone)]
pub struct MockBlePeripheral {
    address: String,
    state: Arc<Mutex<BleState>>,
}

impl MockBlePeripheral {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            state: Arc::new(Mutex::new(BleState {
                advertising: true,
                ..BleState::default()
            })),
        }
    }

    pub fn set_advertising(&self, advertising: bool) {
        self.state.lock().advertising = advertising;
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn set_characteristic(&self, uuid: &str, value: &[u8]) {
        self.state
            .lock()
            .characteristics
            .insert(uuid.to_string(), Bytes::copy_from_slice(value));
    }

    /// 推送通知：更新特征值并回调订阅者（在锁外调用）
    pub fn notify(&self, uuid: &str, value: &[u8]) {
        let data = Bytes::copy_from_slice(value);
        let handlers = {
            let mut state = self.state.lock();
            state.characteristics.insert(uuid.to_string(), data.clone());
            state.subscribers.get(uuid).cloned().unwrap_or_default()
        };
        for handler in handlers {
            handler(data.clone());
        }
    }

    fn connected(&self) -> Result<parking_lot::MutexGuard<'_, BleState>> {
        let state = self.state.lock();
        if !state.connected {
            return Err(Error::Disconnected);
        }
        Ok(state)
    }
}

impl BleClient for MockBlePeripheral {
    fn scan(&self, _timeout: Duration) -> Result<Vec<Advertisement>> {
        let state = self.state.lock();
        Ok(if state.advertising {
            vec![Advertisement {
                address: self.address.clone(),
                local_name: Some("mock".to_string()),
                rssi: -40,
            }]
        } else {
            Vec::new()
        })
    }

    fn ble_connect(&self, address: &str) -> Result<()> {
        let mut state = self.state.lock();
        if !state.advertising || !address.eq_ignore_ascii_case(&self.address) {
            return Err(Error::NotFound(format!("BLE peripheral {}", address)));
        }
        state.connected = true;
        Ok(())
    }

    fn ble_disconnect(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(Error::Disconnected);
        }
        state.connected = false;
        state.subscribers.clear();
        Ok(())
    }

    fn read_characteristic(&self, uuid: &str) -> Result<Bytes> {
        self.connected()?
            .characteristics
            .get(uuid)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("characteristic {}", uuid)))
    }

    fn write_characteristic(&self, uuid: &str, data: &[u8]) -> Result<()> {
        let mut state = self.connected()?;
        let slot = state
            .characteristics
            .get_mut(uuid)
            .ok_or_else(|| Error::NotFound(format!("characteristic {}", uuid)))?;
        *slot = Bytes::copy_from_slice(data);
        Ok(())
    }

    fn subscribe(&self, uuid: &str, handler: NotifyHandler) -> Result<()> {
        let mut state = self.connected()?;
        if !state.characteristics.contains_key(uuid) {
            return Err(Error::NotFound(format!("characteristic {}", uuid)));
        }
        state
            .subscribers
            .entry(uuid.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }
}
