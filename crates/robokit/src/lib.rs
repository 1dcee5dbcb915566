//! # robokit
//!
//! 用三类部件组装机器人的框架：
//!
//! - **连接**（[`Connection`]）：硬件或网络传输的句柄，如 [`hal::BoardAdaptor`]
//! - **设备**（[`Device`]）：基于连接能力 trait 编写的驱动
//! - **work**：设备全部启动后执行一次的用户闭包，通常注册订阅和定时任务
//!
//! # 分层
//!
//! - `robokit-core`：名称/注册表、事件总线、命令表、调度器、错误类型（在本 crate 顶层重新导出）
//! - [`hal`]：能力 trait、引脚资源管理、总线共享、板卡/串口/BLE 适配器
//! - [`runtime`]：[`Robot`] 生命周期和 [`Manager`]
//!
//! # 快速开始
//!
//! ```ignore
//! use robokit::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! robokit::init_logging();
//!
//! let board = Arc::new(BoardAdaptor::builder().name("edison").pin_map(robokit::hal::pinmap::edison_arduino()).build());
//! let robot = Robot::builder()
//!     .name("blinker")
//!     .connection(board.clone())
//!     .work(move |robot| {
//!         let board = board.clone();
//!         let mut level = 0;
//!         robot
//!             .every(Duration::from_secs(1), move || {
//!                 level ^= 1;
//!                 board.digital_write("13", level)
//!             })
//!             .ok();
//!     })
//!     .build()?;
//!
//! robot.run()?;
//! ```

pub use robokit_core::*;
pub use robokit_hal as hal;
pub use robokit_runtime as runtime;
pub use robokit_runtime::{Manager, ManagerConfig, Robot, RobotConfig, RobotState, StartPolicy};

mod logging;
pub mod prelude;

pub use logging::{init_logging, init_logging_with_filter};
