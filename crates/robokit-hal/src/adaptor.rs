//! 通用板卡适配器
//!
//! [`BoardAdaptor`] 是一个 [`Connection`]，按配置组合 [`PinManager`]（GPIO/PWM/ADC）
//! 和 I²C/SPI 总线，并实现对应的能力 trait。板级差异全部体现在 [`PinMap`] 和总线列表里。
//!
//! # 示例
//!
//! ```ignore
//! use robokit_hal::{BoardAdaptor, pinmap};
//!
//! let board = BoardAdaptor::builder()
//!     .name("edison")
//!     .pin_map(pinmap::edison_arduino())
//!     .i2c_buses([1, 6])
//!     .build();
//! ```

use crate::bus::{BusFactory, BusManager, DEFAULT_LOCK_TIMEOUT};
use crate::capability::{
    AnalogReader, DigitalReader, DigitalWriter, I2cOperator, PwmWriter, SpiOperator,
};
use crate::fs::{Filesystem, NativeFilesystem};
use crate::i2c::{I2cBus, I2cHandle};
use crate::pinmap::PinMap;
use crate::pins::{DigitalPinOptions, PinManager, PinManagerConfig, ServoRange};
use crate::spi::{SpiBus, SpiConfig, SpiHandle, SpiMode};
use crate::sysfs::read_thermal_zone;
use robokit_core::{
    Capability, Connection, Error, Eventer, MultiError, Named, Result, default_name,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// 板卡适配器
pub struct BoardAdaptor {
    name: String,
    eventer: Eventer,
    fs: Arc<dyn Filesystem>,
    pins: PinManager,
    i2c: BusManager<dyn I2cBus>,
    spi: BusManager<dyn SpiBus>,
    default_i2c_bus: u32,
    default_spi_bus: u32,
    capabilities: Vec<Capability>,
    connected: AtomicBool,
}

impl BoardAdaptor {
    pub fn builder() -> BoardAdaptorBuilder {
        BoardAdaptorBuilder::new()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn pins(&self) -> &PinManager {
        &self.pins
    }

    pub fn i2c_buses(&self) -> &[u32] {
        self.i2c.buses()
    }

    pub fn spi_buses(&self) -> &[u32] {
        self.spi.buses()
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::NotRunning(format!("adaptor '{}'", self.name)))
        }
    }

    /// 显式配置数字引脚（方向、初始电平、低电平有效、边沿检测等）
    pub fn digital_pin(&self, pin: &str, options: DigitalPinOptions) -> Result<()> {
        self.ensure_connected()?;
        self.pins.digital_pin(pin, options)
    }

    pub fn set_pwm_period(&self, pin: &str, period_ns: u32) -> Result<()> {
        self.ensure_connected()?;
        self.pins.set_pwm_period(pin, period_ns)
    }

    /// 读取温度区（°C），如 `thermal_zone0`
    pub fn read_temperature(&self, zone: &str) -> Result<f64> {
        self.ensure_connected()?;
        read_thermal_zone(self.fs.as_ref(), zone)
    }
}

impl Named for BoardAdaptor {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Connection for BoardAdaptor {
    fn connect(&self) -> Result<()> {
        if self.connected.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!(
            "Connected board adaptor '{}' ({} pin(s), i2c {:?}, spi {:?})",
            self.name,
            self.pins.map().len(),
            self.i2c.buses(),
            self.spi.buses()
        );
        Ok(())
    }

    /// 释放所有引脚并关闭总线；错误汇总后返回
    fn finalize(&self) -> Result<()> {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let mut errors = MultiError::new();
        if let Err(e) = self.pins.release_all() {
            match e {
                Error::Multi(inner) => errors.extend(inner),
                other => errors.push(self.name.clone(), other),
            }
        }
        let closed = self.i2c.close_all() + self.spi.close_all();
        debug!("Finalized board adaptor '{}' ({} bus(es) closed)", self.name, closed);
        errors.into_result()
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    fn eventer(&self) -> Option<&Eventer> {
        Some(&self.eventer)
    }
}

impl DigitalReader for BoardAdaptor {
    fn digital_read(&self, pin: &str) -> Result<u8> {
        self.ensure_connected()?;
        self.pins.digital_read(pin)
    }
}

impl DigitalWriter for BoardAdaptor {
    fn digital_write(&self, pin: &str, level: u8) -> Result<()> {
        self.ensure_connected()?;
        self.pins.digital_write(pin, level)
    }
}

impl AnalogReader for BoardAdaptor {
    fn analog_read(&self, pin: &str) -> Result<i32> {
        self.ensure_connected()?;
        self.pins.analog_read(pin)
    }
}

impl PwmWriter for BoardAdaptor {
    fn pwm_write(&self, pin: &str, duty: u8) -> Result<()> {
        self.ensure_connected()?;
        self.pins.pwm_write(pin, duty)
    }

    fn servo_write(&self, pin: &str, angle: u8) -> Result<()> {
        self.ensure_connected()?;
        self.pins.servo_write(pin, angle)
    }
}

impl I2cOperator for BoardAdaptor {
    fn i2c_open(&self, bus: u32, address: u16) -> Result<I2cHandle> {
        self.ensure_connected()?;
        let shared = self.i2c.get(bus)?;
        Ok(I2cHandle::new(bus, address, shared))
    }

    fn default_i2c_bus(&self) -> u32 {
        self.default_i2c_bus
    }
}

impl SpiOperator for BoardAdaptor {
    fn spi_open(
        &self,
        bus: u32,
        chip_select: u32,
        mode: SpiMode,
        bits_per_word: u8,
        speed_hz: u32,
    ) -> Result<SpiHandle> {
        self.ensure_connected()?;
        if bits_per_word == 0 || speed_hz == 0 {
            return Err(Error::InvalidArgument(format!(
                "SPI bits per word {} / speed {} Hz",
                bits_per_word, speed_hz
            )));
        }
        let shared = self.spi.get(bus)?;
        let config = SpiConfig {
            mode,
            bits_per_word,
            speed_hz,
        };
        Ok(SpiHandle::new(bus, chip_select, config, shared))
    }

    fn default_spi_bus(&self) -> u32 {
        self.default_spi_bus
    }
}

/// [`BoardAdaptor`] 构建器
///
/// 未指定文件系统时使用真实 sysfs（可用 [`sysfs_root`](Self::sysfs_root) 重定位）；
/// 未指定总线工厂时使用平台默认后端（Linux 上为 `/dev/i2c-N`、`/dev/spidevB.C`）。
pub struct BoardAdaptorBuilder {
    name: Option<String>,
    map: PinMap,
    fs: Option<Arc<dyn Filesystem>>,
    sysfs_root: Option<PathBuf>,
    pins: PinManagerConfig,
    i2c_buses: Vec<u32>,
    spi_buses: Vec<u32>,
    i2c_factory: Option<BusFactory<dyn I2cBus>>,
    spi_factory: Option<BusFactory<dyn SpiBus>>,
    default_i2c_bus: Option<u32>,
    default_spi_bus: Option<u32>,
    lock_timeout: Duration,
}

impl BoardAdaptorBuilder {
    pub fn new() -> Self {
        Self {
            name: None,
            map: PinMap::default(),
            fs: None,
            sysfs_root: None,
            pins: PinManagerConfig::default(),
            i2c_buses: Vec::new(),
            spi_buses: Vec::new(),
            i2c_factory: None,
            spi_factory: None,
            default_i2c_bus: None,
            default_spi_bus: None,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn pin_map(mut self, map: PinMap) -> Self {
        self.map = map;
        self
    }

    pub fn filesystem(mut self, fs: Arc<dyn Filesystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    /// 把 sysfs 路径重定位到 `root` 之下
    pub fn sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sysfs_root = Some(root.into());
        self
    }

    pub fn gpio_base(mut self, base: impl Into<String>) -> Self {
        self.pins.gpio_base = base.into();
        self
    }

    pub fn pwm_base(mut self, base: impl Into<String>) -> Self {
        self.pins.pwm_base = base.into();
        self
    }

    /// 所有 PWM 引脚的默认周期
    pub fn pwm_period(mut self, period_ns: u32) -> Self {
        self.pins.pwm_period_ns = period_ns;
        self
    }

    pub fn pwm_period_for_pin(mut self, pin: impl Into<String>, period_ns: u32) -> Self {
        self.pins.pin_periods.insert(pin.into(), period_ns);
        self
    }

    pub fn servo_range_for_pin(mut self, pin: impl Into<String>, range: ServoRange) -> Self {
        self.pins.servo_ranges.insert(pin.into(), range);
        self
    }

    pub fn i2c_buses(mut self, buses: impl IntoIterator<Item = u32>) -> Self {
        self.i2c_buses = buses.into_iter().collect();
        self
    }

    pub fn spi_buses(mut self, buses: impl IntoIterator<Item = u32>) -> Self {
        self.spi_buses = buses.into_iter().collect();
        self
    }

    pub fn default_i2c_bus(mut self, bus: u32) -> Self {
        self.default_i2c_bus = Some(bus);
        self
    }

    pub fn default_spi_bus(mut self, bus: u32) -> Self {
        self.default_spi_bus = Some(bus);
        self
    }

    pub fn i2c_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(u32) -> Result<Box<dyn I2cBus>> + Send + Sync + 'static,
    {
        self.i2c_factory = Some(Arc::new(factory));
        self
    }

    pub fn spi_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(u32) -> Result<Box<dyn SpiBus>> + Send + Sync + 'static,
    {
        self.spi_factory = Some(Arc::new(factory));
        self
    }

    /// 等待总线锁的最长时间
    pub fn bus_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn build(self) -> BoardAdaptor {
        let name = self.name.unwrap_or_else(|| default_name("Board"));
        let eventer = Eventer::new(name.clone());
        let fs: Arc<dyn Filesystem> = match (self.fs, self.sysfs_root) {
            (Some(fs), _) => fs,
            (None, Some(root)) => Arc::new(NativeFilesystem::with_root(root)),
            (None, None) => Arc::new(NativeFilesystem::new()),
        };

        let mut capabilities = Vec::new();
        if !self.map.is_empty() {
            capabilities.extend([Capability::DigitalRead, Capability::DigitalWrite]);
        }
        if self.map.has_analog() {
            capabilities.push(Capability::AnalogRead);
        }
        if self.map.has_pwm() {
            capabilities.push(Capability::PwmWrite);
        }
        if !self.i2c_buses.is_empty() {
            capabilities.push(Capability::I2c);
        }
        if !self.spi_buses.is_empty() {
            capabilities.push(Capability::Spi);
        }

        let default_i2c_bus = self
            .default_i2c_bus
            .or_else(|| self.i2c_buses.first().copied())
            .unwrap_or(0);
        let default_spi_bus = self
            .default_spi_bus
            .or_else(|| self.spi_buses.first().copied())
            .unwrap_or(0);
        let i2c = BusManager::new(
            "i2c",
            self.i2c_buses,
            self.i2c_factory.unwrap_or_else(default_i2c_factory),
            self.lock_timeout,
        );
        let spi = BusManager::new(
            "spi",
            self.spi_buses,
            self.spi_factory.unwrap_or_else(default_spi_factory),
            self.lock_timeout,
        );

        BoardAdaptor {
            pins: PinManager::new(fs.clone(), self.map, self.pins, eventer.clone()),
            name,
            eventer,
            fs,
            i2c,
            spi,
            default_i2c_bus,
            default_spi_bus,
            capabilities,
            connected: AtomicBool::new(false),
        }
    }
}

impl Default for BoardAdaptorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
fn default_i2c_factory() -> BusFactory<dyn I2cBus> {
    Arc::new(|bus| Ok(Box::new(crate::linux::LinuxI2cBus::open(bus)?) as Box<dyn I2cBus>))
}

#[cfg(target_os = "linux")]
fn default_spi_factory() -> BusFactory<dyn SpiBus> {
    Arc::new(|bus| Ok(Box::new(crate::linux::LinuxSpiBus::new(bus)) as Box<dyn SpiBus>))
}

#[cfg(not(target_os = "linux"))]
fn default_i2c_factory() -> BusFactory<dyn I2cBus> {
    Arc::new(|bus| Err(Error::UnknownBus(format!("i2c-{} (no platform backend)", bus))))
}

#[cfg(not(target_os = "linux"))]
fn default_spi_factory() -> BusFactory<dyn SpiBus> {
    Arc::new(|bus| Err(Error::UnknownBus(format!("spi-{} (no platform backend)", bus))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFilesystem;
    use crate::mock::{MockI2cBus, MockSpiBus};
    use crate::pinmap::PinDescriptor;

    fn board(fs: Arc<MockFilesystem>, i2c: MockI2cBus) -> BoardAdaptor {
        let spi = MockSpiBus::new();
        BoardAdaptor::builder()
            .name("board")
            .pin_map(PinMap::new(vec![
                PinDescriptor::gpio("13", 13).with_pwm(0, 0),
                PinDescriptor::gpio("7", 7),
            ]))
            .filesystem(fs)
            .i2c_buses([1])
            .i2c_factory(move |_| Ok(Box::new(i2c.clone()) as Box<dyn I2cBus>))
            .spi_buses([0])
            .spi_factory(move |_| Ok(Box::new(spi.clone()) as Box<dyn SpiBus>))
            .build()
    }

    #[test]
    fn test_capabilities_follow_configuration() {
        let b = board(Arc::new(MockFilesystem::new()), MockI2cBus::new());
        assert!(b.provides(Capability::DigitalWrite));
        assert!(b.provides(Capability::PwmWrite));
        assert!(b.provides(Capability::I2c));
        assert!(b.provides(Capability::Spi));
        assert!(!b.provides(Capability::AnalogRead));
        assert!(!b.provides(Capability::Serial));
        assert_eq!(b.default_i2c_bus(), 1);

        let bare = BoardAdaptor::builder().build();
        assert!(bare.capabilities().is_empty());
        assert!(bare.name().starts_with("Board"));
    }

    #[test]
    fn test_operations_require_connect() {
        let b = board(Arc::new(MockFilesystem::new()), MockI2cBus::new());
        assert!(matches!(b.digital_write("13", 1), Err(Error::NotRunning(_))));
        b.connect().unwrap();
        b.digital_write("13", 1).unwrap();
        b.finalize().unwrap();
        assert!(matches!(b.digital_write("13", 1), Err(Error::NotRunning(_))));
    }

    #[test]
    fn test_finalize_releases_pins() {
        let fs = Arc::new(MockFilesystem::new());
        let b = board(fs.clone(), MockI2cBus::new());
        b.connect().unwrap();
        b.digital_write("7", 1).unwrap();
        b.pwm_write("13", 100).unwrap();
        b.finalize().unwrap();
        assert_eq!(fs.writes_to("/sys/class/gpio/unexport"), vec!["7"]);
        assert_eq!(fs.writes_to("/sys/class/pwm/pwmchip0/unexport"), vec!["0"]);

        // 重复 finalize 为空操作
        b.finalize().unwrap();
    }

    #[test]
    fn test_i2c_and_spi_open() {
        let i2c = MockI2cBus::new().with_device(0x40);
        let b = board(Arc::new(MockFilesystem::new()), i2c.clone());
        b.connect().unwrap();

        let dev = b.i2c_open(1, 0x40).unwrap();
        dev.write_register(0x00, &[0x11]).unwrap();
        assert_eq!(i2c.registers(0x40, 0, 1), Some(vec![0x11]));
        assert!(matches!(b.i2c_open(2, 0x40), Err(Error::UnknownBus(_))));

        let spi = b.spi_open(0, 0, SpiMode::Mode0, 8, 1_000_000).unwrap();
        assert_eq!(spi.transfer(&[1, 2]).unwrap(), vec![1, 2]);
        assert!(b.spi_open(0, 0, SpiMode::Mode0, 0, 1).is_err());
        assert!(matches!(
            b.spi_open(3, 0, SpiMode::Mode0, 8, 1),
            Err(Error::UnknownBus(_))
        ));
        b.finalize().unwrap();
    }

    #[test]
    fn test_read_temperature() {
        let fs = Arc::new(MockFilesystem::new());
        fs.set("/sys/class/thermal/thermal_zone0/temp", "51000");
        let b = board(fs, MockI2cBus::new());
        b.connect().unwrap();
        assert!((b.read_temperature("thermal_zone0").unwrap() - 51.0).abs() < 1e-9);
    }
}
