//! # robokit-runtime
//!
//! 生命周期引擎：
//!
//! - [`Robot`]：连接 + 设备 + `work`，按依赖顺序启动，失败时逆序回滚，停止时聚合错误
//! - [`Manager`]：在一个进程中托管多个机器人，按名称查找，整体启动/停止
//! - [`RobotConfig`] / [`ManagerConfig`]：TOML 配置
//! - [`signal`]：Ctrl-C 广播，`run()` 据此退出阻塞
//! - [`RobotSnapshot`] / [`ManagerSnapshot`]：供 RPC 前端使用的 JSON 快照

pub mod config;
pub mod manager;
pub mod robot;
pub mod signal;
pub mod snapshot;

#[cfg(test)]
mod testing;

pub use config::{ManagerConfig, RobotConfig, StartPolicy};
pub use manager::{Manager, ROBOT_ADDED};
pub use robot::{
    ROBOT_STARTED, ROBOT_STARTING, ROBOT_STOPPED, ROBOT_STOPPING, Robot, RobotBuilder, RobotState,
};
pub use snapshot::{ConnectionSnapshot, DeviceSnapshot, ManagerSnapshot, RobotSnapshot};
