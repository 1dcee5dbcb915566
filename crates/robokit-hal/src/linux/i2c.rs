//! `/dev/i2c-N` 后端

use crate::i2c::{I2cBus, I2cFunctionality, SmbusData};
use robokit_core::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;

const I2C_SLAVE: libc::c_ulong = 0x0703;
const I2C_FUNCS: libc::c_ulong = 0x0705;
const I2C_SMBUS: libc::c_ulong = 0x0720;

#[repr(C)]
struct I2cSmbusIoctlData {
    read_write: u8,
    command: u8,
    size: u32,
    data: *mut SmbusData,
}

nix::ioctl_write_int_bad!(i2c_set_slave, I2C_SLAVE);
nix::ioctl_read_bad!(i2c_funcs, I2C_FUNCS, libc::c_ulong);
nix::ioctl_write_ptr_bad!(i2c_smbus, I2C_SMBUS, I2cSmbusIoctlData);

/// 一条 `i2c-dev` 总线
pub struct LinuxI2cBus {
    file: File,
    path: String,
    address: u16,
    // 功能位属于适配器，只查询一次
    funcs: FunctionalityCache,
}

impl LinuxI2cBus {
    pub fn open(bus: u32) -> Result<Self> {
        let path = format!("/dev/i2c-{}", bus);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| Error::OpenFailed {
                port: path.clone(),
                source,
            })?;
        Ok(Self {
            file,
            path,
            address: 0,
            funcs: FunctionalityCache::default(),
        })
    }

    /// NAK 在 Linux 上表现为 `EREMOTEIO` 或 `ENXIO`
    fn map_err(&self, e: io::Error) -> Error {
        match e.raw_os_error() {
            Some(libc::EREMOTEIO) | Some(libc::ENXIO) => Error::Nak {
                address: self.address,
            },
            _ => Error::Io(e),
        }
    }
}

impl I2cBus for LinuxI2cBus {
    fn set_address(&mut self, address: u16) -> Result<()> {
        // SAFETY: fd 在 self.file 存活期间有效；I2C_SLAVE 以整数传参
        unsafe { i2c_set_slave(self.file.as_raw_fd(), libc::c_int::from(address)) }
            .map_err(|e| Error::Io(io::Error::from(e)))?;
        self.address = address;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.file.write(data).map_err(|e| self.map_err(e))
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.file.read(buf).map_err(|e| self.map_err(e))
    }

    fn functionality(&mut self) -> Result<I2cFunctionality> {
        let fd = self.file.as_raw_fd();
        self.funcs.get_or_query(|| {
            let mut funcs: libc::c_ulong = 0;
            // SAFETY: 内核向 funcs 写入一个 unsigned long
            unsafe { i2c_funcs(fd, &mut funcs) }.map_err(|e| Error::Io(io::Error::from(e)))?;
            Ok(I2cFunctionality(u64::from(funcs)))
        })
    }

    fn smbus_access(
        &mut self,
        read_write: u8,
        command: u8,
        size: u32,
        data: Option<&mut SmbusData>,
    ) -> Result<()> {
        let args = I2cSmbusIoctlData {
            read_write,
            command,
            size,
            data: data.map_or(std::ptr::null_mut(), |d| d as *mut SmbusData),
        };
        // SAFETY: args 和 data 在调用期间有效，SmbusData 与内核 union 布局一致
        unsafe { i2c_smbus(self.file.as_raw_fd(), &args) }.map_err(|e| self.map_err(io::Error::from(e)))?;
        Ok(())
    }
}

impl std::fmt::Debug for LinuxI2cBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinuxI2cBus")
            .field("path", &self.path)
            .field("address", &self.address)
            .finish()
    }
}

/// 第一次成功查询后缓存适配器功能位；查询失败不缓存
#[derive(Debug, Default)]
struct FunctionalityCache(Option<I2cFunctionality>);

impl FunctionalityCache {
    fn get_or_query(
        &mut self,
        query: impl FnOnce() -> Result<I2cFunctionality>,
    ) -> Result<I2cFunctionality> {
        if let Some(funcs) = self.0 {
            return Ok(funcs);
        }
        let funcs = query()?;
        self.0 = Some(funcs);
        Ok(funcs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_functionality_queried_once() {
        let mut cache = FunctionalityCache::default();
        let mut queries = 0;

        let failed = cache.get_or_query(|| {
            queries += 1;
            Err(Error::Io(io::Error::other("adapter busy")))
        });
        assert!(failed.is_err());

        for _ in 0..3 {
            let funcs = cache
                .get_or_query(|| {
                    queries += 1;
                    Ok(I2cFunctionality::SMBUS_ALL)
                })
                .unwrap();
            assert!(funcs.supports(I2cFunctionality::SMBUS_READ_BYTE_DATA));
        }
        assert_eq!(queries, 2);
    }
}
