//! BLE 客户端
//!
//! [`BleClient`] 是对某个外设的 GATT 访问（扫描、连接、读写特征值、订阅通知）；
//! [`BleAdaptor`] 把客户端包装成 [`Connection`]：`connect` 时先扫描确认外设存在再连接。
//! 具体的蓝牙协议栈由调用方提供。

use bytes::Bytes;
use robokit_core::{Capability, Connection, Error, Eventer, Named, Payload, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// 默认扫描时长
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(5);

/// 特征值通知回调
pub type NotifyHandler = Arc<dyn Fn(Bytes) + Send + Sync>;

/// 通知事件名
pub const NOTIFICATION: &str = "Notification";

/// 扫描结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub address: String,
    pub local_name: Option<String>,
    pub rssi: i16,
}

/// GATT 客户端能力
pub trait BleClient: Send + Sync {
    fn scan(&self, timeout: Duration) -> Result<Vec<Advertisement>>;

    fn ble_connect(&self, address: &str) -> Result<()>;

    fn ble_disconnect(&self) -> Result<()>;

    /// # 错误
    ///
    /// 未连接返回 [`Error::Disconnected`]，特征值不存在返回 [`Error::NotFound`]。
    fn read_characteristic(&self, uuid: &str) -> Result<Bytes>;

    fn write_characteristic(&self, uuid: &str, data: &[u8]) -> Result<()>;

    fn subscribe(&self, uuid: &str, handler: NotifyHandler) -> Result<()>;
}

/// BLE 外设连接
///
/// 通知会同时以 `Notification` 事件发布到连接的事件总线上（载荷为字节）。
pub struct BleAdaptor<C: BleClient> {
    name: String,
    address: String,
    scan_timeout: Duration,
    client: C,
    eventer: Eventer,
}

impl<C: BleClient> BleAdaptor<C> {
    pub fn new(name: impl Into<String>, address: impl Into<String>, client: C) -> Self {
        let name = name.into();
        let eventer = Eventer::new(name.clone());
        eventer.add_event(NOTIFICATION);
        Self {
            name,
            address: address.into(),
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            client,
            eventer,
        }
    }

    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// 订阅通知并转发到事件总线
    pub fn subscribe_events(&self, uuid: &str) -> Result<()> {
        self.client.subscribe(uuid, forward_to(self.eventer.clone()))
    }
}

fn forward_to(eventer: Eventer) -> NotifyHandler {
    Arc::new(move |data| eventer.publish(NOTIFICATION, Payload::Bytes(data)))
}

impl<C: BleClient> Named for BleAdaptor<C> {
    fn name(&self) -> &str {
        &self.name
    }
}

impl<C: BleClient> Connection for BleAdaptor<C> {
    fn connect(&self) -> Result<()> {
        info!("Connecting BLE adaptor '{}' to {}", self.name, self.address);
        let found = self.client.scan(self.scan_timeout)?;
        if !found.iter().any(|ad| ad.address.eq_ignore_ascii_case(&self.address)) {
            return Err(Error::NotFound(format!("BLE peripheral {}", self.address)));
        }
        self.client.ble_connect(&self.address)
    }

    fn finalize(&self) -> Result<()> {
        debug!("Disconnecting BLE adaptor '{}'", self.name);
        match self.client.ble_disconnect() {
            Ok(()) | Err(Error::Disconnected) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::Ble]
    }

    fn eventer(&self) -> Option<&Eventer> {
        Some(&self.eventer)
    }
}

impl<C: BleClient> BleClient for BleAdaptor<C> {
    fn scan(&self, timeout: Duration) -> Result<Vec<Advertisement>> {
        self.client.scan(timeout)
    }

    fn ble_connect(&self, address: &str) -> Result<()> {
        self.client.ble_connect(address)
    }

    fn ble_disconnect(&self) -> Result<()> {
        self.client.ble_disconnect()
    }

    fn read_characteristic(&self, uuid: &str) -> Result<Bytes> {
        self.client.read_characteristic(uuid)
    }

    fn write_characteristic(&self, uuid: &str, data: &[u8]) -> Result<()> {
        self.client.write_characteristic(uuid, data)
    }

    fn subscribe(&self, uuid: &str, handler: NotifyHandler) -> Result<()> {
        self.client.subscribe(uuid, handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBlePeripheral;
    use parking_lot::Mutex;

    const BATTERY: &str = "2a19";

    #[test]
    fn test_connect_requires_advertisement() {
        let peripheral = MockBlePeripheral::new("AA:BB:CC:DD:EE:FF");
        peripheral.set_advertising(false);
        let adaptor = BleAdaptor::new("ble", "aa:bb:cc:dd:ee:ff", peripheral.clone());
        assert!(matches!(adaptor.connect(), Err(Error::NotFound(_))));

        peripheral.set_advertising(true);
        adaptor.connect().unwrap();
        assert!(peripheral.is_connected());
        adaptor.finalize().unwrap();
        adaptor.finalize().unwrap();
        assert_eq!(adaptor.kind(), "BleAdaptor");
    }

    #[test]
    fn test_read_write_and_notify() {
        let peripheral = MockBlePeripheral::new("AA:BB:CC:DD:EE:FF");
        peripheral.set_characteristic(BATTERY, &[87]);
        let adaptor = BleAdaptor::new("ble", "AA:BB:CC:DD:EE:FF", peripheral.clone());
        assert!(matches!(
            adaptor.read_characteristic(BATTERY),
            Err(Error::Disconnected)
        ));

        adaptor.connect().unwrap();
        assert_eq!(adaptor.read_characteristic(BATTERY).unwrap(), Bytes::from_static(&[87]));
        assert!(matches!(adaptor.read_characteristic("ffff"), Err(Error::NotFound(_))));

        adaptor.write_characteristic(BATTERY, &[50]).unwrap();
        assert_eq!(adaptor.read_characteristic(BATTERY).unwrap(), Bytes::from_static(&[50]));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let _sub = adaptor
            .eventer()
            .unwrap()
            .on(NOTIFICATION, move |p| {
                s.lock().push(p.as_bytes().map(|b| b.to_vec()));
            })
            .unwrap();
        adaptor.subscribe_events(BATTERY).unwrap();
        peripheral.notify(BATTERY, &[42]);
        assert_eq!(*seen.lock(), vec![Some(vec![42u8])]);
    }
}
