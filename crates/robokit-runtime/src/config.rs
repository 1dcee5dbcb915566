//! 机器人与管理器配置
//!
//! 两者都是 `serde` 结构体，缺省字段取 [`Default`]，可从 TOML 文本或文件加载。
//!
//! # 示例
//!
//! ```
//! use robokit_runtime::{ManagerConfig, StartPolicy};
//!
//! let config = ManagerConfig::from_toml_str(
//!     r#"
//!     start_policy = "abort"
//!
//!     [[robots]]
//!     name = "rover"
//!     stop_grace_ms = 250
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.start_policy, StartPolicy::AbortOnFailure);
//! assert_eq!(config.robot("rover").map(|r| r.stop_grace_ms), Some(250));
//! ```

use robokit_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_STOP_GRACE_MS: u64 = 1000;

/// 单个机器人的配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    /// 机器人名称；缺省时生成 `Robot`、`Robot-1` ...
    pub name: Option<String>,
    /// [`Robot::run`](crate::Robot::run) 启动后是否阻塞等待停止信号
    pub auto_run: bool,
    /// 停止时等待定时任务和 work 线程退出的宽限期（毫秒）
    pub stop_grace_ms: u64,
    /// `work` 在独立线程上执行；为 `false` 时在 `start` 的调用线程上执行
    pub work_on_thread: bool,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            name: None,
            auto_run: true,
            stop_grace_ms: DEFAULT_STOP_GRACE_MS,
            work_on_thread: true,
        }
    }
}

impl RobotConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        parse(text, "robot")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }
}

/// 管理器启动策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StartPolicy {
    /// 某个机器人启动失败时继续启动其余机器人，最后返回聚合错误
    #[default]
    #[serde(rename = "continue")]
    ContinueOnFailure,
    /// 第一个失败即停止已启动的机器人并返回该错误
    #[serde(rename = "abort")]
    AbortOnFailure,
}

/// 管理器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub name: Option<String>,
    pub auto_run: bool,
    pub start_policy: StartPolicy,
    pub stop_grace_ms: u64,
    /// 按名称预置的机器人配置，[`crate::Manager::robot_builder`] 据此创建机器人
    pub robots: Vec<RobotConfig>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            name: None,
            auto_run: true,
            start_policy: StartPolicy::default(),
            stop_grace_ms: DEFAULT_STOP_GRACE_MS,
            robots: Vec::new(),
        }
    }
}

impl ManagerConfig {
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// 查找预置的机器人配置
    pub fn robot(&self, name: &str) -> Option<&RobotConfig> {
        self.robots.iter().find(|r| r.name.as_deref() == Some(name))
    }

    /// # 错误
    ///
    /// TOML 语法错误或字段类型不匹配时返回 [`Error::InvalidArgument`]；
    /// 两个预置机器人同名时返回 [`Error::DuplicateName`]。
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = parse(text, "manager")?;
        let mut seen = Vec::new();
        for name in config.robots.iter().filter_map(|r| r.name.as_deref()) {
            if seen.contains(&name) {
                return Err(Error::DuplicateName {
                    scope: "manager config robots".to_string(),
                    name: name.to_string(),
                });
            }
            seen.push(name);
        }
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }
}

fn parse<T: for<'de> Deserialize<'de>>(text: &str, what: &str) -> Result<T> {
    toml::from_str(text).map_err(|e| Error::InvalidArgument(format!("invalid {} config: {}", what, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_robot_defaults() {
        let config = RobotConfig::from_toml_str("").unwrap();
        assert_eq!(config, RobotConfig::default());
        assert!(config.auto_run);
        assert!(config.work_on_thread);
        assert_eq!(config.stop_grace(), Duration::from_secs(1));
    }

    #[test]
    fn test_robot_partial_override() {
        let config = RobotConfig::from_toml_str("name = \"blinker\"\nauto_run = false").unwrap();
        assert_eq!(config.name.as_deref(), Some("blinker"));
        assert!(!config.auto_run);
        assert_eq!(config.stop_grace_ms, 1000);
    }

    #[test]
    fn test_bad_field_type() {
        let err = RobotConfig::from_toml_str("stop_grace_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(ref m) if m.starts_with("invalid robot config")));
    }

    #[test]
    fn test_start_policy_names() {
        let config = ManagerConfig::from_toml_str("start_policy = \"continue\"").unwrap();
        assert_eq!(config.start_policy, StartPolicy::ContinueOnFailure);
        assert!(ManagerConfig::from_toml_str("start_policy = \"retry\"").is_err());
    }

    #[test]
    fn test_duplicate_robot_names() {
        let text = "[[robots]]\nname = \"a\"\n[[robots]]\nname = \"a\"\n";
        assert!(matches!(
            ManagerConfig::from_toml_str(text),
            Err(Error::DuplicateName { ref name, .. }) if name == "a"
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "auto_run = false\n[[robots]]\nname = \"arm\"\nwork_on_thread = false").unwrap();

        let config = ManagerConfig::load(file.path()).unwrap();
        assert!(!config.auto_run);
        let arm = config.robot("arm").unwrap();
        assert!(!arm.work_on_thread);
        assert!(config.robot("legs").is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let err = RobotConfig::load("/nonexistent/robokit.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
