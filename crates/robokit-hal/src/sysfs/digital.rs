//! sysfs GPIO 引脚
//!
//! `/sys/class/gpio/{export,unexport}` 和 `/sys/class/gpio/gpioN/{direction,value,active_low,edge}`。

use crate::fs::Filesystem;
use robokit_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;
use tracing::debug;

/// 内核导出后 `direction` 文件出现前的最大检查次数
const EXPORT_RETRIES: u32 = 10;
const EXPORT_RETRY_DELAY: Duration = Duration::from_millis(10);

/// 默认 GPIO sysfs 根目录
pub const GPIO_PATH: &str = "/sys/class/gpio";

/// 引脚方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

/// 边沿检测
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    #[default]
    None,
    Rising,
    Falling,
    Both,
}

impl Edge {
    pub fn as_str(self) -> &'static str {
        match self {
            Edge::None => "none",
            Edge::Rising => "rising",
            Edge::Falling => "falling",
            Edge::Both => "both",
        }
    }

    /// 电平从 `from` 变到 `to` 时是否触发
    pub fn matches(self, from: u8, to: u8) -> bool {
        match self {
            Edge::None => false,
            Edge::Rising => from == 0 && to != 0,
            Edge::Falling => from != 0 && to == 0,
            Edge::Both => from != to,
        }
    }
}

/// 单条 sysfs GPIO 线
pub struct DigitalPin {
    fs: Arc<dyn Filesystem>,
    base: String,
    line: u32,
    label: String,
    exported: bool,
    direction: Option<Direction>,
}

impl DigitalPin {
    pub fn new(fs: Arc<dyn Filesystem>, base: impl Into<String>, line: u32) -> Self {
        Self {
            fs,
            base: base.into(),
            line,
            label: format!("gpio{}", line),
            exported: false,
            direction: None,
        }
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_exported(&self) -> bool {
        self.exported
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    fn attr(&self, name: &str) -> String {
        format!("{}/{}/{}", self.base, self.label, name)
    }

    /// 导出引脚
    ///
    /// 已被导出（`EBUSY`）按成功处理；之后等待 `direction` 文件出现（最多重试 10 次）。
    /// 重复调用是幂等的。
    pub fn export(&mut self) -> Result<()> {
        if self.exported {
            return Ok(());
        }

        match self.fs.write(&format!("{}/export", self.base), &self.line.to_string()) {
            Ok(()) => {},
            Err(e) if e.raw_os_error() == Some(libc::EBUSY) => {
                debug!("{} already exported", self.label);
            },
            Err(e) => return Err(e.into()),
        }

        let direction = self.attr("direction");
        let mut attempt = 0;
        while !self.fs.exists(&direction) {
            attempt += 1;
            if attempt > EXPORT_RETRIES {
                // 清理半导出状态；失败与否都以原始错误为准
                let _ = self.fs.write(&format!("{}/unexport", self.base), &self.line.to_string());
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{} did not appear after export", direction),
                )));
            }
            sleep(EXPORT_RETRY_DELAY);
        }

        self.exported = true;
        Ok(())
    }

    /// 取消导出
    ///
    /// 未导出时为空操作。内核保留的引脚（`EINVAL`）返回 [`Error::ReservedByKernel`]，
    /// 调用方通常按成功处理。
    pub fn unexport(&mut self) -> Result<()> {
        if !self.exported {
            return Ok(());
        }
        self.exported = false;
        self.direction = None;

        match self.fs.write(&format!("{}/unexport", self.base), &self.line.to_string()) {
            Ok(()) => Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::EINVAL) => {
                Err(Error::ReservedByKernel(self.label.clone()))
            },
            Err(e) => Err(e.into()),
        }
    }

    pub fn set_direction(&mut self, direction: Direction) -> Result<()> {
        self.fs.write(&self.attr("direction"), direction.as_str())?;
        self.direction = Some(direction);
        Ok(())
    }

    /// 设为输出并同时给定初始电平（内核的 `high` / `low` 方向值）
    pub fn set_output_with_level(&mut self, level: u8) -> Result<()> {
        let value = if level == 0 { "low" } else { "high" };
        self.fs.write(&self.attr("direction"), value)?;
        self.direction = Some(Direction::Out);
        Ok(())
    }

    pub fn set_active_low(&self, active_low: bool) -> Result<()> {
        self.fs
            .write(&self.attr("active_low"), if active_low { "1" } else { "0" })?;
        Ok(())
    }

    pub fn set_edge(&self, edge: Edge) -> Result<()> {
        self.fs.write(&self.attr("edge"), edge.as_str())?;
        Ok(())
    }

    pub fn write(&self, level: u8) -> Result<()> {
        self.fs
            .write(&self.attr("value"), if level == 0 { "0" } else { "1" })?;
        Ok(())
    }

    pub fn read(&self) -> Result<u8> {
        read_level(self.fs.as_ref(), &self.attr("value"))
    }

    /// `value` 文件路径（供轮询线程使用）
    pub fn value_path(&self) -> String {
        self.attr("value")
    }
}

/// 读取 `value` 文件中的电平
pub(crate) fn read_level(fs: &dyn Filesystem, path: &str) -> Result<u8> {
    let content = fs.read_to_string(path)?;
    match content.trim() {
        "0" => Ok(0),
        "1" => Ok(1),
        other => Err(Error::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected GPIO value '{}' in {}", other, path),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{FailMode, MockFilesystem};

    fn setup() -> (Arc<MockFilesystem>, DigitalPin) {
        let fs = Arc::new(MockFilesystem::new());
        let pin = DigitalPin::new(fs.clone(), GPIO_PATH, 13);
        (fs, pin)
    }

    #[test]
    fn test_export_is_idempotent() {
        let (fs, mut pin) = setup();
        pin.export().unwrap();
        pin.export().unwrap();
        assert_eq!(fs.writes_to("/sys/class/gpio/export"), vec!["13"]);
        assert!(pin.is_exported());
    }

    #[test]
    fn test_export_tolerates_ebusy() {
        let (fs, mut pin) = setup();
        // 引脚在本进程之外已被导出
        fs.set("/sys/class/gpio/gpio13/direction", "out");
        fs.fail_write("/sys/class/gpio/export", libc::EBUSY, FailMode::Once);
        pin.export().unwrap();
        assert!(pin.is_exported());
    }

    #[test]
    fn test_export_propagates_other_errors() {
        let (fs, mut pin) = setup();
        fs.fail_write("/sys/class/gpio/export", libc::EACCES, FailMode::Once);
        let err = pin.export().unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EACCES));
        assert!(!pin.is_exported());
    }

    #[test]
    fn test_export_waits_for_direction_file() {
        let (fs, mut pin) = setup();
        fs.hide("/sys/class/gpio/gpio13/direction", 3);
        pin.export().unwrap();
        assert!(pin.is_exported());
    }

    #[test]
    fn test_export_gives_up_after_retries() {
        let (fs, mut pin) = setup();
        fs.hide("/sys/class/gpio/gpio13/direction", 100);
        assert!(pin.export().is_err());
        assert_eq!(fs.writes_to("/sys/class/gpio/unexport"), vec!["13"]);
    }

    #[test]
    fn test_unexport_reserved_by_kernel() {
        let (fs, mut pin) = setup();
        pin.export().unwrap();
        fs.fail_write("/sys/class/gpio/unexport", libc::EINVAL, FailMode::Once);
        let err = pin.unexport().unwrap_err();
        assert!(err.is_recoverable());

        // 已释放：再次释放为空操作
        pin.unexport().unwrap();
    }

    #[test]
    fn test_direction_write_read() {
        let (fs, mut pin) = setup();
        pin.export().unwrap();
        pin.set_direction(Direction::Out).unwrap();
        pin.write(1).unwrap();
        assert_eq!(pin.read().unwrap(), 1);
        pin.write(0).unwrap();
        assert_eq!(
            fs.writes_to("/sys/class/gpio/gpio13/value"),
            vec!["1", "0"]
        );
        assert_eq!(pin.direction(), Some(Direction::Out));
    }

    #[test]
    fn test_read_invalid_value() {
        let (fs, mut pin) = setup();
        pin.export().unwrap();
        fs.set("/sys/class/gpio/gpio13/value", "x\n");
        assert!(pin.read().is_err());
    }

    #[test]
    fn test_edge_matches() {
        assert!(Edge::Rising.matches(0, 1));
        assert!(!Edge::Rising.matches(1, 0));
        assert!(Edge::Falling.matches(1, 0));
        assert!(Edge::Both.matches(1, 0));
        assert!(!Edge::Both.matches(1, 1));
        assert!(!Edge::None.matches(0, 1));
    }
}
