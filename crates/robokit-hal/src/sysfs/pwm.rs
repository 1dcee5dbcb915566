//! sysfs PWM 通道
//!
//! `/sys/class/pwm/pwmchipX/{export,unexport}` 和 `pwmN/{period,duty_cycle,enable,polarity}`，
//! 周期和占空比单位均为纳秒。

use crate::fs::Filesystem;
use robokit_core::{Error, Result};
use std::io;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;
use tracing::debug;

/// 默认 PWM sysfs 根目录
pub const PWM_PATH: &str = "/sys/class/pwm";

/// 默认周期：10 ms（100 Hz）
pub const DEFAULT_PERIOD_NS: u32 = 10_000_000;

/// 舵机期望的周期：20 ms（50 Hz）
pub const SERVO_PERIOD_NS: u32 = 20_000_000;

const EXPORT_RETRIES: u32 = 10;
const EXPORT_RETRY_DELAY: Duration = Duration::from_millis(10);

/// 单个 PWM 通道
pub struct PwmPin {
    fs: Arc<dyn Filesystem>,
    chip_path: String,
    channel: u32,
    exported: bool,
    enabled: Option<bool>,
}

impl PwmPin {
    pub fn new(fs: Arc<dyn Filesystem>, base: &str, chip: u32, channel: u32) -> Self {
        Self {
            fs,
            chip_path: format!("{}/pwmchip{}", base, chip),
            channel,
            exported: false,
            enabled: None,
        }
    }

    pub fn label(&self) -> String {
        format!("{}/pwm{}", self.chip_path, self.channel)
    }

    pub fn is_exported(&self) -> bool {
        self.exported
    }

    fn attr(&self, name: &str) -> String {
        format!("{}/pwm{}/{}", self.chip_path, self.channel, name)
    }

    /// 导出通道；已导出（`EBUSY`）按成功处理，重复调用幂等
    pub fn export(&mut self) -> Result<()> {
        if self.exported {
            return Ok(());
        }

        match self
            .fs
            .write(&format!("{}/export", self.chip_path), &self.channel.to_string())
        {
            Ok(()) => {},
            Err(e) if e.raw_os_error() == Some(libc::EBUSY) => {
                debug!("{} already exported", self.label());
            },
            Err(e) => return Err(e.into()),
        }

        // udev 可能还在调整新属性文件的权限
        let period = self.attr("period");
        let mut attempt = 0;
        while !self.fs.exists(&period) {
            attempt += 1;
            if attempt > EXPORT_RETRIES {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{} did not appear after export", period),
                )));
            }
            sleep(EXPORT_RETRY_DELAY);
        }

        self.exported = true;
        Ok(())
    }

    /// 取消导出；未导出时为空操作
    pub fn unexport(&mut self) -> Result<()> {
        if !self.exported {
            return Ok(());
        }
        self.exported = false;
        self.enabled = None;

        match self
            .fs
            .write(&format!("{}/unexport", self.chip_path), &self.channel.to_string())
        {
            Ok(()) => Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::EINVAL) => {
                Err(Error::ReservedByKernel(self.label()))
            },
            Err(e) => Err(e.into()),
        }
    }

    /// 使能/禁用；状态未变化时不写文件
    pub fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        if self.enabled == Some(enabled) {
            return Ok(());
        }
        self.fs
            .write(&self.attr("enable"), if enabled { "1" } else { "0" })?;
        self.enabled = Some(enabled);
        Ok(())
    }

    pub fn period(&self) -> Result<u32> {
        self.read_u32("period")
    }

    pub fn set_period(&self, period_ns: u32) -> Result<()> {
        self.fs.write(&self.attr("period"), &period_ns.to_string())?;
        Ok(())
    }

    pub fn duty_cycle(&self) -> Result<u32> {
        self.read_u32("duty_cycle")
    }

    pub fn set_duty_cycle(&self, duty_ns: u32) -> Result<()> {
        self.fs.write(&self.attr("duty_cycle"), &duty_ns.to_string())?;
        Ok(())
    }

    /// `true` 表示反相
    pub fn polarity_inverted(&self) -> Result<bool> {
        let content = self.fs.read_to_string(&self.attr("polarity"))?;
        Ok(content.trim() == "inversed")
    }

    pub fn set_polarity_inverted(&self, inverted: bool) -> Result<()> {
        self.fs.write(
            &self.attr("polarity"),
            if inverted { "inversed" } else { "normal" },
        )?;
        Ok(())
    }

    /// 修改周期并按比例调整占空比
    ///
    /// 内核要求任何时刻 `duty_cycle <= period`，因此写入顺序取决于周期是变大还是变小。
    pub fn change_period(&self, period_ns: u32) -> Result<()> {
        let old_duty = self.duty_cycle()?;
        if old_duty == 0 {
            return self.set_period(period_ns);
        }

        let old_period = self.period()?;
        let duty = if old_period == 0 {
            0
        } else {
            (u64::from(old_duty) * u64::from(period_ns) / u64::from(old_period)) as u32
        };

        if period_ns >= old_period {
            self.set_period(period_ns)?;
            self.set_duty_cycle(duty)
        } else {
            self.set_duty_cycle(duty)?;
            self.set_period(period_ns)
        }
    }

    fn read_u32(&self, attr: &str) -> Result<u32> {
        let path = self.attr(attr);
        let content = self.fs.read_to_string(&path)?;
        content.trim().parse::<u32>().map_err(|e| {
            Error::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{}: {}", path, e),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{FailMode, MockFilesystem};

    fn setup() -> (Arc<MockFilesystem>, PwmPin) {
        let fs = Arc::new(MockFilesystem::new());
        let pin = PwmPin::new(fs.clone(), PWM_PATH, 0, 1);
        (fs, pin)
    }

    #[test]
    fn test_export_and_configure() {
        let (fs, mut pin) = setup();
        pin.export().unwrap();
        pin.export().unwrap();
        assert_eq!(fs.writes_to("/sys/class/pwm/pwmchip0/export"), vec!["1"]);

        pin.set_period(DEFAULT_PERIOD_NS).unwrap();
        pin.set_duty_cycle(2_500_000).unwrap();
        assert_eq!(pin.period().unwrap(), 10_000_000);
        assert_eq!(pin.duty_cycle().unwrap(), 2_500_000);

        pin.set_polarity_inverted(true).unwrap();
        assert!(pin.polarity_inverted().unwrap());
    }

    #[test]
    fn test_enable_writes_only_on_change() {
        let (fs, mut pin) = setup();
        pin.export().unwrap();
        pin.set_enabled(true).unwrap();
        pin.set_enabled(true).unwrap();
        pin.set_enabled(false).unwrap();
        assert_eq!(
            fs.writes_to("/sys/class/pwm/pwmchip0/pwm1/enable"),
            vec!["1", "0"]
        );
    }

    #[test]
    fn test_export_tolerates_ebusy() {
        let (fs, mut pin) = setup();
        fs.set("/sys/class/pwm/pwmchip0/pwm1/period", "0");
        fs.fail_write("/sys/class/pwm/pwmchip0/export", libc::EBUSY, FailMode::Once);
        pin.export().unwrap();
    }

    #[test]
    fn test_change_period_scales_duty() {
        let (fs, mut pin) = setup();
        pin.export().unwrap();
        pin.set_period(10_000_000).unwrap();
        pin.set_duty_cycle(5_000_000).unwrap();
        fs.clear_writes();

        // 周期变小：先写占空比
        pin.change_period(4_000_000).unwrap();
        let writes = fs.writes();
        assert_eq!(writes[0].0, "/sys/class/pwm/pwmchip0/pwm1/duty_cycle");
        assert_eq!(writes[0].1, "2000000");
        assert_eq!(writes[1].1, "4000000");

        // 周期变大：先写周期
        fs.clear_writes();
        pin.change_period(8_000_000).unwrap();
        let writes = fs.writes();
        assert_eq!(writes[0].0, "/sys/class/pwm/pwmchip0/pwm1/period");
        assert_eq!(pin.duty_cycle().unwrap(), 4_000_000);
    }
}
