//! 模拟量与温度读取
//!
//! ADC 通道以整数文本暴露（如 `/sys/bus/iio/devices/iio:device0/in_voltage0_raw`），
//! 温度传感器以毫摄氏度暴露（`/sys/class/thermal/thermal_zoneN/temp`）。

use crate::fs::Filesystem;
use robokit_core::{Error, Result};
use std::io;

/// 读取整数属性文件
pub fn read_int(fs: &dyn Filesystem, path: &str) -> Result<i32> {
    let content = fs.read_to_string(path)?;
    content.trim().parse::<i32>().map_err(|e| {
        Error::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{}: {}", path, e),
        ))
    })
}

/// 温度区 `zone` 的 sysfs 路径
pub fn thermal_zone_path(zone: &str) -> String {
    format!("/sys/class/thermal/{}/temp", zone)
}

/// 读取温度（°C）
pub fn read_thermal_zone(fs: &dyn Filesystem, zone: &str) -> Result<f64> {
    let millidegrees = read_int(fs, &thermal_zone_path(zone))?;
    Ok(f64::from(millidegrees) / 1000.0)
}
