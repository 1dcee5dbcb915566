//! 框架统一错误类型
//!
//! 错误按四个类别划分：配置错误、资源错误、传输错误和生命周期错误。
//! 停止/释放路径上的多个错误通过 [`MultiError`] 聚合，拆除过程不会因单个失败中断。

use crate::lifecycle::Capability;
use std::fmt;
use thiserror::Error;

/// 框架统一 Result 别名
pub type Result<T> = std::result::Result<T, Error>;

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// 配置错误（名称、引脚、总线、事件或命令不存在等）
    Configuration,
    /// 资源错误（导出状态冲突、总线占用）
    Resource,
    /// 传输错误（IO、超时、断连、NAK）
    Transport,
    /// 生命周期错误（启动失败、重复启动、未运行、聚合错误）
    Lifecycle,
}

/// 框架统一错误类型
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown pin: {0}")]
    UnknownPin(String),

    #[error("Unsupported bus: {0}")]
    UnknownBus(String),

    #[error("Duplicate name '{name}' in {scope}")]
    DuplicateName { scope: String, name: String },

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Driver '{driver}' requires capability {capability} which its connection does not provide")]
    CapabilityMissing { driver: String, capability: Capability },

    #[error("Unknown connection: {0}")]
    UnknownConnection(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// `every` 的周期为零
    #[error("Timer period must be greater than zero")]
    InvalidPeriod,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// 引脚已被导出（EBUSY），通常按成功处理
    #[error("Pin already exported: {0}")]
    AlreadyExported(String),

    /// 引脚被内核保留（EINVAL），释放时按成功处理
    #[error("Pin reserved by kernel: {0}")]
    ReservedByKernel(String),

    #[error("Bus busy: {0}")]
    BusBusy(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation timeout")]
    Timeout,

    #[error("Disconnected")]
    Disconnected,

    #[error("No acknowledge from device at address {address:#04x}")]
    Nak { address: u16 },

    #[error("Value out of range: {0}")]
    OutOfRange(String),

    #[error("Failed to open {port}: {source}")]
    OpenFailed {
        port: String,
        #[source]
        source: std::io::Error,
    },

    /// 启动失败，回滚已完成；`cause` 是第一个致命错误
    #[error("Robot '{robot}' failed to start: {cause}")]
    StartFailed {
        robot: String,
        #[source]
        cause: Box<Error>,
    },

    #[error("'{0}' is already running")]
    AlreadyRunning(String),

    #[error("'{0}' is not running")]
    NotRunning(String),

    #[error(transparent)]
    Multi(#[from] MultiError),
}

impl Error {
    /// 返回错误所属类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::UnknownPin(_)
            | Error::UnknownBus(_)
            | Error::DuplicateName { .. }
            | Error::UnknownEvent(_)
            | Error::UnknownCommand(_)
            | Error::CapabilityMissing { .. }
            | Error::UnknownConnection(_)
            | Error::NotFound(_)
            | Error::InvalidPeriod
            | Error::InvalidArgument(_)
            | Error::Unsupported(_) => ErrorCategory::Configuration,
            Error::AlreadyExported(_) | Error::ReservedByKernel(_) | Error::BusBusy(_) => {
                ErrorCategory::Resource
            },
            Error::Io(_)
            | Error::Timeout
            | Error::Disconnected
            | Error::Nak { .. }
            | Error::OutOfRange(_)
            | Error::OpenFailed { .. } => ErrorCategory::Transport,
            Error::StartFailed { .. }
            | Error::AlreadyRunning(_)
            | Error::NotRunning(_)
            | Error::Multi(_) => ErrorCategory::Lifecycle,
        }
    }

    /// "已处于期望状态" 类错误，调用方通常按成功处理
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::AlreadyExported(_) | Error::ReservedByKernel(_))
    }

    /// 底层 errno（仅 IO 错误）
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::Io(e) | Error::OpenFailed { source: e, .. } => e.raw_os_error(),
            _ => None,
        }
    }

    /// 包装为启动失败
    pub fn start_failed(robot: impl Into<String>, cause: Error) -> Self {
        Error::StartFailed {
            robot: robot.into(),
            cause: Box::new(cause),
        }
    }
}

/// 聚合错误
///
/// 每一项记录出错的来源名称（设备、连接、引脚等）和对应的错误。
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<(String, Error)>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source: impl Into<String>, error: Error) {
        self.errors.push((source.into(), error));
    }

    /// 记录 `result` 中的错误（如果有）
    pub fn collect<T>(&mut self, source: impl Into<String>, result: Result<T>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.push(source, e);
                None
            },
        }
    }

    /// 合并另一个聚合错误
    pub fn extend(&mut self, other: MultiError) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.errors.iter().map(|(s, e)| (s.as_str(), e))
    }

    pub fn into_inner(self) -> Vec<(String, Error)> {
        self.errors
    }

    /// 空聚合转换为 `Ok(())`
    pub fn into_result(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Multi(self))
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.errors.len();
        write!(f, "{} error{} occurred:", n, if n == 1 { "" } else { "s" })?;
        for (source, error) in &self.errors {
            write!(f, "\n\t* {}: {}", source, error)?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}
