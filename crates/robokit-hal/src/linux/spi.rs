//! `/dev/spidevB.C` 后端

use crate::spi::{SpiBus, SpiConfig};
use robokit_core::{Error, Result};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use tracing::debug;

/// 内核 `struct spi_ioc_transfer`
#[repr(C)]
#[derive(Default)]
struct SpiIocTransfer {
    tx_buf: u64,
    rx_buf: u64,
    len: u32,
    speed_hz: u32,
    delay_usecs: u16,
    bits_per_word: u8,
    cs_change: u8,
    tx_nbits: u8,
    rx_nbits: u8,
    word_delay_usecs: u8,
    pad: u8,
}

nix::ioctl_write_ptr!(spi_write_mode, b'k', 1, u8);
nix::ioctl_write_ptr!(spi_write_bits_per_word, b'k', 3, u8);
nix::ioctl_write_ptr!(spi_write_max_speed_hz, b'k', 4, u32);
nix::ioctl_write_buf!(spi_message, b'k', 0, SpiIocTransfer);

struct Device {
    file: File,
    applied: Option<SpiConfig>,
}

/// 一条 SPI 总线；每个片选对应一个 spidev 设备文件，按需打开
pub struct LinuxSpiBus {
    bus: u32,
    devices: BTreeMap<u32, Device>,
    selected: Option<(u32, SpiConfig)>,
}

impl LinuxSpiBus {
    pub fn new(bus: u32) -> Self {
        Self {
            bus,
            devices: BTreeMap::new(),
            selected: None,
        }
    }

    fn device(&mut self, chip_select: u32) -> Result<&mut Device> {
        if !self.devices.contains_key(&chip_select) {
            let path = format!("/dev/spidev{}.{}", self.bus, chip_select);
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&path)
                .map_err(|source| Error::OpenFailed {
                    port: path.clone(),
                    source,
                })?;
            debug!("Opened {}", path);
            self.devices.insert(chip_select, Device { file, applied: None });
        }
        self.devices
            .get_mut(&chip_select)
            .ok_or_else(|| Error::UnknownBus(format!("spi-{}.{}", self.bus, chip_select)))
    }
}

fn nix_err(e: nix::errno::Errno) -> Error {
    Error::Io(io::Error::from(e))
}

impl SpiBus for LinuxSpiBus {
    fn configure(&mut self, chip_select: u32, config: &SpiConfig) -> Result<()> {
        let device = self.device(chip_select)?;
        if device.applied.as_ref() != Some(config) {
            let fd = device.file.as_raw_fd();
            let mode = config.mode.bits();
            // SAFETY: fd 有效，参数指针在调用期间有效
            unsafe {
                spi_write_mode(fd, &mode).map_err(nix_err)?;
                spi_write_bits_per_word(fd, &config.bits_per_word).map_err(nix_err)?;
                spi_write_max_speed_hz(fd, &config.speed_hz).map_err(nix_err)?;
            }
            device.applied = Some(*config);
        }
        self.selected = Some((chip_select, *config));
        Ok(())
    }

    fn transfer(&mut self, tx: &[u8]) -> Result<Vec<u8>> {
        let (chip_select, config) = self
            .selected
            .ok_or_else(|| Error::InvalidArgument("SPI device not configured".to_string()))?;
        let device = self.device(chip_select)?;

        let mut rx = vec![0u8; tx.len()];
        let transfer = SpiIocTransfer {
            tx_buf: tx.as_ptr() as u64,
            rx_buf: rx.as_mut_ptr() as u64,
            len: tx.len() as u32,
            speed_hz: config.speed_hz,
            bits_per_word: config.bits_per_word,
            ..SpiIocTransfer::default()
        };
        // SAFETY: tx/rx 缓冲区在调用期间有效且长度一致
        unsafe { spi_message(device.file.as_raw_fd(), std::slice::from_ref(&transfer)) }
            .map_err(nix_err)?;
        Ok(rx)
    }
}
