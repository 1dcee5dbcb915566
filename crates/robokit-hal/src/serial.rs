//! 串口连接
//!
//! [`SerialPort`] 是原始端口（Linux termios 或 mock），[`SerialAdaptor`] 把它包装成
//! 一个 [`Connection`]：`connect` 时按配置打开端口，`finalize` 时关闭。
//! 驱动通过 [`SerialOperator`] 读写。

use crate::capability::SerialOperator;
use parking_lot::Mutex;
use robokit_core::{Capability, Connection, Error, Eventer, Named, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// 默认读超时
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// 已打开的串口
pub trait SerialPort: Send {
    /// 读取可用数据；超时内没有数据返回 `Ok(0)`
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn write(&mut self, data: &[u8]) -> Result<usize>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// 按端口名和波特率打开串口
pub type SerialOpener = Arc<dyn Fn(&str, u32) -> Result<Box<dyn SerialPort>> + Send + Sync>;

struct OpenPort {
    path: String,
    port: Box<dyn SerialPort>,
}

/// 串口连接
///
/// `connect` 打开构造时给定的端口，驱动也可以通过 [`SerialOperator::serial_open`] 改用其他端口。
pub struct SerialAdaptor {
    name: String,
    port: String,
    baud: u32,
    opener: SerialOpener,
    open: Mutex<Option<OpenPort>>,
    eventer: Eventer,
}

impl SerialAdaptor {
    /// 使用平台默认后端（Linux 上为 termios）
    pub fn new(name: impl Into<String>, port: impl Into<String>, baud: u32) -> Self {
        Self::with_opener(name, port, baud, default_opener())
    }

    pub fn with_opener(
        name: impl Into<String>,
        port: impl Into<String>,
        baud: u32,
        opener: SerialOpener,
    ) -> Self {
        let name = name.into();
        Self {
            eventer: Eventer::new(name.clone()),
            name,
            port: port.into(),
            baud,
            opener,
            open: Mutex::new(None),
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn baud(&self) -> u32 {
        self.baud
    }

    pub fn is_open(&self) -> bool {
        self.open.lock().is_some()
    }

    fn with_port<R>(&self, f: impl FnOnce(&mut dyn SerialPort) -> Result<R>) -> Result<R> {
        let mut open = self.open.lock();
        let open = open.as_mut().ok_or(Error::Disconnected)?;
        f(open.port.as_mut())
    }
}

impl Named for SerialAdaptor {
    fn name(&self) -> &str {
        &self.name
    }
}

impl SerialOperator for SerialAdaptor {
    fn serial_open(&self, port: &str, baud: u32) -> Result<()> {
        let mut open = self.open.lock();
        if let Some(current) = open.as_mut() {
            if current.path == port {
                return Ok(());
            }
            current.port.flush()?;
            debug!("Closing {} to reopen on {}", current.path, port);
        }
        *open = None;
        let opened = (self.opener)(port, baud)?;
        *open = Some(OpenPort {
            path: port.to_string(),
            port: opened,
        });
        debug!("Opened {} at {} baud", port, baud);
        Ok(())
    }

    fn serial_read(&self, buf: &mut [u8]) -> Result<usize> {
        self.with_port(|port| port.read(buf))
    }

    fn serial_write(&self, data: &[u8]) -> Result<usize> {
        self.with_port(|port| port.write(data))
    }

    fn serial_close(&self) -> Result<()> {
        let Some(mut open) = self.open.lock().take() else {
            return Ok(());
        };
        open.port.flush()?;
        debug!("Closed {}", open.path);
        Ok(())
    }
}

impl Connection for SerialAdaptor {
    fn connect(&self) -> Result<()> {
        info!("Connecting serial adaptor '{}' on {}", self.name, self.port);
        self.serial_open(&self.port, self.baud)
    }

    fn finalize(&self) -> Result<()> {
        self.serial_close()
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::Serial]
    }

    fn eventer(&self) -> Option<&Eventer> {
        Some(&self.eventer)
    }
}

#[cfg(target_os = "linux")]
fn default_opener() -> SerialOpener {
    Arc::new(|port, baud| {
        let serial = crate::linux::LinuxSerialPort::open(port, baud, DEFAULT_READ_TIMEOUT)?;
        Ok(Box::new(serial) as Box<dyn SerialPort>)
    })
}

#[cfg(not(target_os = "linux"))]
fn default_opener() -> SerialOpener {
    Arc::new(|port, _baud| {
        Err(Error::OpenFailed {
            port: port.to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "serial ports are only supported on Linux",
            ),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSerial;

    fn adaptor(serial: &MockSerial) -> SerialAdaptor {
        let serial = serial.clone();
        SerialAdaptor::with_opener(
            "uart",
            "/dev/ttyUSB0",
            115_200,
            Arc::new(move |_port, _baud| Ok(Box::new(serial.clone()) as Box<dyn SerialPort>)),
        )
    }

    #[test]
    fn test_connect_read_write() {
        let serial = MockSerial::new();
        let a = adaptor(&serial);
        assert!(matches!(a.serial_write(b"x"), Err(Error::Disconnected)));

        a.connect().unwrap();
        assert!(a.is_open());
        assert_eq!(a.serial_write(b"AT\r\n").unwrap(), 4);
        assert_eq!(serial.written(), b"AT\r\n".to_vec());

        serial.push_input(b"OK");
        let mut buf = [0u8; 8];
        assert_eq!(a.serial_read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"OK");
        assert_eq!(a.serial_read(&mut buf).unwrap(), 0);

        a.finalize().unwrap();
        assert!(!a.is_open());
        a.finalize().unwrap();
        assert!(a.provides(Capability::Serial));
    }

    #[test]
    fn test_reopen_other_port() {
        let serial = MockSerial::new();
        let a = adaptor(&serial);
        a.connect().unwrap();
        a.serial_open("/dev/ttyUSB0", 115_200).unwrap();
        a.serial_open("/dev/ttyACM0", 9600).unwrap();
        assert!(a.is_open());
        a.serial_close().unwrap();
        assert!(!a.is_open());
    }

    #[test]
    fn test_open_failure() {
        let a = SerialAdaptor::with_opener(
            "uart",
            "/dev/missing",
            9600,
            Arc::new(|port, _| {
                Err(Error::OpenFailed {
                    port: port.to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                })
            }),
        );
        assert!(matches!(a.connect(), Err(Error::OpenFailed { .. })));
        assert!(!a.is_open());
    }
}
