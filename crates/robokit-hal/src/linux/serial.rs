//! termios 串口

use crate::serial::SerialPort;
use nix::sys::termios::{self, BaudRate, SetArg, SpecialCharacterIndices};
use robokit_core::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::time::Duration;

fn baud_rate(baud: u32) -> Option<BaudRate> {
    Some(match baud {
        1200 => BaudRate::B1200,
        2400 => BaudRate::B2400,
        4800 => BaudRate::B4800,
        9600 => BaudRate::B9600,
        19200 => BaudRate::B19200,
        38400 => BaudRate::B38400,
        57600 => BaudRate::B57600,
        115200 => BaudRate::B115200,
        230400 => BaudRate::B230400,
        460800 => BaudRate::B460800,
        921600 => BaudRate::B921600,
        _ => return None,
    })
}

/// 原始模式串口（8N1，无流控）
pub struct LinuxSerialPort {
    file: File,
}

impl LinuxSerialPort {
    /// 打开并配置端口；`read_timeout` 以 0.1 s 为粒度，超时后 `read` 返回 0
    pub fn open(port: &str, baud: u32, read_timeout: Duration) -> Result<Self> {
        let open_failed = |source: io::Error| Error::OpenFailed {
            port: port.to_string(),
            source,
        };

        let rate = baud_rate(baud).ok_or_else(|| {
            open_failed(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported baud rate {}", baud),
            ))
        })?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(port)
            .map_err(open_failed)?;

        let mut tio = termios::tcgetattr(&file).map_err(|e| open_failed(io::Error::from(e)))?;
        termios::cfmakeraw(&mut tio);
        termios::cfsetspeed(&mut tio, rate).map_err(|e| open_failed(io::Error::from(e)))?;
        let deciseconds = (read_timeout.as_millis() / 100).clamp(0, 255) as u8;
        tio.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
        tio.control_chars[SpecialCharacterIndices::VTIME as usize] = deciseconds;
        termios::tcsetattr(&file, SetArg::TCSANOW, &tio)
            .map_err(|e| open_failed(io::Error::from(e)))?;

        Ok(Self { file })
    }
}

impl SerialPort for LinuxSerialPort {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.file.read(buf)?)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        Ok(self.file.write(data)?)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(self.file.flush()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baud_rate_table() {
        assert_eq!(baud_rate(115200), Some(BaudRate::B115200));
        assert!(baud_rate(12345).is_none());
    }

    #[test]
    fn test_open_missing_port() {
        let err = LinuxSerialPort::open("/dev/robokit-missing", 9600, Duration::from_millis(100))
            .err()
            .unwrap();
        assert!(matches!(err, Error::OpenFailed { .. }));
    }
}
