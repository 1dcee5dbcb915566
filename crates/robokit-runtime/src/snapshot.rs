//! 机器人和管理器的 JSON 快照
//!
//! 外部 RPC 前端通过这些表列出机器人、连接、设备和命令。

use crate::robot::RobotState;
use robokit_core::{Capability, Connection, Device, Error, Result};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    pub name: String,
    /// 适配器类型名
    pub adaptor: String,
    pub capabilities: Vec<Capability>,
}

impl ConnectionSnapshot {
    pub fn of(connection: &dyn Connection) -> Self {
        Self {
            name: connection.name().to_string(),
            adaptor: connection.kind().to_string(),
            capabilities: connection.capabilities().to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSnapshot {
    pub name: String,
    /// 驱动类型名
    pub driver: String,
    pub connection: Option<String>,
    pub commands: Vec<String>,
}

impl DeviceSnapshot {
    pub fn of(device: &dyn Device) -> Self {
        Self {
            name: device.name().to_string(),
            driver: device.kind().to_string(),
            connection: device.connection_name().map(str::to_string),
            commands: device.commander().map(|c| c.names()).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RobotSnapshot {
    pub name: String,
    pub state: RobotState,
    pub commands: Vec<String>,
    pub connections: Vec<ConnectionSnapshot>,
    pub devices: Vec<DeviceSnapshot>,
}

impl RobotSnapshot {
    pub fn to_json(&self) -> Result<String> {
        to_json(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagerSnapshot {
    pub name: String,
    pub running: bool,
    pub commands: Vec<String>,
    pub robots: Vec<RobotSnapshot>,
}

impl ManagerSnapshot {
    pub fn to_json(&self) -> Result<String> {
        to_json(self)
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::InvalidArgument(format!("snapshot: {}", e)))
}
