//! sysfs 文件访问抽象
//!
//! 引脚和总线代码只通过 [`Filesystem`] 读写 sysfs 属性文件，
//! 这样同一套导出/配置逻辑既可以跑在真实内核上（[`NativeFilesystem`]），
//! 也可以跑在内存模拟上（`MockFilesystem`，`mock` feature）。

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// sysfs 属性文件访问
pub trait Filesystem: Send + Sync {
    /// 写入整个属性值（不创建文件）
    fn write(&self, path: &str, data: &str) -> io::Result<()>;

    /// 读取整个属性值
    fn read_to_string(&self, path: &str) -> io::Result<String>;

    fn exists(&self, path: &str) -> bool;
}

/// 真实文件系统
///
/// `root` 用于把绝对 sysfs 路径重定位到其他目录（测试或 chroot 环境），默认 `/`。
#[derive(Debug, Clone)]
pub struct NativeFilesystem {
    root: PathBuf,
}

impl NativeFilesystem {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/"),
        }
    }

    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl Default for NativeFilesystem {
    fn default() -> Self {
        Self::new()
    }
}

impl Filesystem for NativeFilesystem {
    fn write(&self, path: &str, data: &str) -> io::Result<()> {
        // sysfs 属性需要一次 write 调用写完
        // 不创建缺失的文件
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(self.resolve(path))?;
        file.write_all(data.as_bytes())
    }

    fn read_to_string(&self, path: &str) -> io::Result<String> {
        std::fs::read_to_string(self.resolve(path))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }
}

#[cfg(any(test, feature = "mock"))]
pub use mock::{FailMode, MockFilesystem};

#[cfg(any(test, feature = "mock"))]
mod mock {
    use super::Filesystem;
    use parking_lot::Mutex;
    use std::collections::{BTreeMap, HashMap};
    use std::io;

    /// 注入错误的持续方式
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum FailMode {
        Once,
        Always,
    }

    #[derive(Default)]
    struct State {
        files: BTreeMap<String, String>,
        journal: Vec<(String, String)>,
        failures: HashMap<String, (i32, FailMode)>,
        hidden: HashMap<String, usize>,
    }

    /// 内存 sysfs
    ///
    /// 模拟内核行为：
    /// - 写 `.../gpio/export` 会创建 `gpioN/{direction,value,active_low,edge}`
    /// - 写 `.../pwmchipX/export` 会创建 `pwmN/{period,duty_cycle,enable,polarity}`
    /// - 对应的 `unexport` 删除这些文件
    /// - 写不存在的普通文件返回 `ENOENT`
    ///
    /// 所有成功的写入按顺序记录在日志中，可通过 [`MockFilesystem::writes`] 检查。
    #[derive(Default)]
    pub struct MockFilesystem {
        state: Mutex<State>,
    }

    impl MockFilesystem {
        pub fn new() -> Self {
            Self::default()
        }

        /// 创建或覆盖文件内容
        pub fn set(&self, path: &str, content: &str) {
            self.state
                .lock()
                .files
                .insert(path.to_string(), content.to_string());
        }

        pub fn get(&self, path: &str) -> Option<String> {
            self.state.lock().files.get(path).cloned()
        }

        pub fn remove(&self, path: &str) {
            self.state.lock().files.remove(path);
        }

        /// 让对 `path` 的写入失败并返回 `errno`
        pub fn fail_write(&self, path: &str, errno: i32, mode: FailMode) {
            self.state
                .lock()
                .failures
                .insert(path.to_string(), (errno, mode));
        }

        /// 让 `exists(path)` 在前 `times` 次查询中返回 `false`（模拟 udev 延迟）
        pub fn hide(&self, path: &str, times: usize) {
            self.state.lock().hidden.insert(path.to_string(), times);
        }

        /// 全部成功写入 `(路径, 内容)`
        pub fn writes(&self) -> Vec<(String, String)> {
            self.state.lock().journal.clone()
        }

        /// 写入 `path` 的内容序列
        pub fn writes_to(&self, path: &str) -> Vec<String> {
            self.state
                .lock()
                .journal
                .iter()
                .filter(|(p, _)| p == path)
                .map(|(_, d)| d.clone())
                .collect()
        }

        pub fn clear_writes(&self) {
            self.state.lock().journal.clear();
        }

        fn simulate_kernel(state: &mut State, path: &str, data: &str) {
            let Some((dir, action)) = path.rsplit_once('/') else {
                return;
            };
            let line = data.trim();
            let is_pwm = dir.rsplit('/').next().is_some_and(|d| d.starts_with("pwmchip"));
            let (prefix, defaults): (String, &[(&str, &str)]) = if is_pwm {
                (
                    format!("{}/pwm{}", dir, line),
                    &[
                        ("period", "0"),
                        ("duty_cycle", "0"),
                        ("enable", "0"),
                        ("polarity", "normal"),
                    ],
                )
            } else {
                (
                    format!("{}/gpio{}", dir, line),
                    &[
                        ("direction", "in"),
                        ("value", "0"),
                        ("active_low", "0"),
                        ("edge", "none"),
                    ],
                )
            };

            match action {
                "export" => {
                    for (attr, value) in defaults {
                        state
                            .files
                            .entry(format!("{}/{}", prefix, attr))
                            .or_insert_with(|| value.to_string());
                    }
                },
                "unexport" => {
                    let prefix = format!("{}/", prefix);
                    state.files.retain(|p, _| !p.starts_with(&prefix));
                },
                _ => {},
            }
        }
    }

    impl Filesystem for MockFilesystem {
        fn write(&self, path: &str, data: &str) -> io::Result<()> {
            let mut state = self.state.lock();

            if let Some(&(errno, mode)) = state.failures.get(path) {
                if mode == FailMode::Once {
                    state.failures.remove(path);
                }
                return Err(io::Error::from_raw_os_error(errno));
            }

            let is_control = path.ends_with("/export") || path.ends_with("/unexport");
            if is_control {
                Self::simulate_kernel(&mut state, path, data);
            } else if let Some(content) = state.files.get_mut(path) {
                *content = data.to_string();
            } else {
                return Err(io::Error::from_raw_os_error(libc::ENOENT));
            }

            state.journal.push((path.to_string(), data.to_string()));
            Ok(())
        }

        fn read_to_string(&self, path: &str) -> io::Result<String> {
            self.state
                .lock()
                .files
                .get(path)
                .cloned()
                .ok_or_else(|| io::Error::from_raw_os_error(libc::ENOENT))
        }

        fn exists(&self, path: &str) -> bool {
            let mut state = self.state.lock();
            if let Some(remaining) = state.hidden.get_mut(path) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return false;
                }
            }
            state.files.contains_key(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_filesystem_with_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sys/class/thermal/thermal_zone0")).unwrap();
        std::fs::write(dir.path().join("sys/class/thermal/thermal_zone0/temp"), "45000\n").unwrap();

        let fs = NativeFilesystem::with_root(dir.path());
        assert!(fs.exists("/sys/class/thermal/thermal_zone0/temp"));
        assert_eq!(
            fs.read_to_string("/sys/class/thermal/thermal_zone0/temp").unwrap(),
            "45000\n"
        );

        fs.write("/sys/class/thermal/thermal_zone0/temp", "1").unwrap();
        assert_eq!(
            fs.read_to_string("/sys/class/thermal/thermal_zone0/temp").unwrap(),
            "1"
        );
    }

    #[test]
    fn test_native_write_replaces_longer_value() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sys/class/pwm/pwmchip0/pwm0")).unwrap();
        let period = dir.path().join("sys/class/pwm/pwmchip0/pwm0/period");
        std::fs::write(&period, "").unwrap();

        let fs = NativeFilesystem::with_root(dir.path());
        fs.write("/sys/class/pwm/pwmchip0/pwm0/period", "10000000").unwrap();
        fs.write("/sys/class/pwm/pwmchip0/pwm0/period", "500").unwrap();
        assert_eq!(std::fs::read_to_string(&period).unwrap(), "500");
    }

    #[test]
    fn test_native_write_does_not_create() {
        let dir = tempfile::tempdir().unwrap();
        let fs = NativeFilesystem::with_root(dir.path());
        let err = fs.write("/missing", "1").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_mock_gpio_export_creates_attributes() {
        let fs = MockFilesystem::new();
        fs.write("/sys/class/gpio/export", "13").unwrap();
        assert_eq!(fs.get("/sys/class/gpio/gpio13/direction").as_deref(), Some("in"));
        assert!(fs.exists("/sys/class/gpio/gpio13/value"));

        fs.write("/sys/class/gpio/unexport", "13").unwrap();
        assert!(!fs.exists("/sys/class/gpio/gpio13/value"));
    }

    #[test]
    fn test_mock_pwm_export_creates_attributes() {
        let fs = MockFilesystem::new();
        fs.write("/sys/class/pwm/pwmchip0/export", "1").unwrap();
        assert_eq!(
            fs.get("/sys/class/pwm/pwmchip0/pwm1/polarity").as_deref(),
            Some("normal")
        );
    }

    #[test]
    fn test_mock_fail_once() {
        let fs = MockFilesystem::new();
        fs.fail_write("/sys/class/gpio/export", libc::EBUSY, FailMode::Once);
        let err = fs.write("/sys/class/gpio/export", "5").unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EBUSY));
        assert!(fs.write("/sys/class/gpio/export", "5").is_ok());
        assert_eq!(fs.writes_to("/sys/class/gpio/export"), vec!["5"]);
    }

    #[test]
    fn test_mock_write_missing_file() {
        let fs = MockFilesystem::new();
        let err = fs.write("/sys/class/gpio/gpio99/value", "1").unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }

    #[test]
    fn test_mock_hidden_path() {
        let fs = MockFilesystem::new();
        fs.set("/a", "x");
        fs.hide("/a", 2);
        assert!(!fs.exists("/a"));
        assert!(!fs.exists("/a"));
        assert!(fs.exists("/a"));
    }
}
