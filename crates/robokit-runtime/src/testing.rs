//! 单元测试用的假连接和假设备，所有生命周期调用记录到同一本 [`Journal`]

use parking_lot::Mutex;
use robokit_core::{Capability, Commander, Connection, Device, Error, Eventer, Named, Result};
use std::io;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: String) {
        self.0.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

fn injected(what: &str) -> Error {
    Error::Io(io::Error::other(format!("injected {} failure", what)))
}

pub struct FakeConnection {
    name: String,
    journal: Journal,
    capabilities: Vec<Capability>,
    fail_connect: bool,
    fail_finalize: bool,
}

impl FakeConnection {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            journal: journal.clone(),
            capabilities: Capability::ALL.to_vec(),
            fail_connect: false,
            fail_finalize: false,
        }
    }

    pub fn with_capabilities(mut self, capabilities: &[Capability]) -> Self {
        self.capabilities = capabilities.to_vec();
        self
    }

    pub fn fail_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn fail_finalize(mut self) -> Self {
        self.fail_finalize = true;
        self
    }
}

impl Named for FakeConnection {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Connection for FakeConnection {
    fn connect(&self) -> Result<()> {
        self.journal.record(format!("connect {}", self.name));
        if self.fail_connect { Err(injected("connect")) } else { Ok(()) }
    }

    fn finalize(&self) -> Result<()> {
        self.journal.record(format!("finalize {}", self.name));
        if self.fail_finalize { Err(injected("finalize")) } else { Ok(()) }
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }
}

pub struct FakeDevice {
    name: String,
    connection: String,
    journal: Journal,
    requires: Vec<Capability>,
    commander: Commander,
    eventer: Eventer,
    fail_start: bool,
    fail_halt: bool,
}

impl FakeDevice {
    pub fn new(name: &str, connection: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            connection: connection.to_string(),
            journal: journal.clone(),
            requires: Vec::new(),
            commander: Commander::new(name),
            eventer: Eventer::new(name),
            fail_start: false,
            fail_halt: false,
        }
    }

    pub fn with_requires(mut self, requires: &[Capability]) -> Self {
        self.requires = requires.to_vec();
        self
    }

    pub fn fail_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn fail_halt(mut self) -> Self {
        self.fail_halt = true;
        self
    }

    /// 声明并发布一个 `reading` 事件
    pub fn emit(&self, value: i64) {
        self.eventer.add_event("reading");
        self.eventer.publish("reading", value);
    }
}

impl Named for FakeDevice {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Device for FakeDevice {
    fn connection_name(&self) -> Option<&str> {
        Some(&self.connection)
    }

    fn start(&self) -> Result<()> {
        self.journal.record(format!("start {}", self.name));
        if self.fail_start { Err(injected("start")) } else { Ok(()) }
    }

    fn halt(&self) -> Result<()> {
        self.journal.record(format!("halt {}", self.name));
        if self.fail_halt { Err(injected("halt")) } else { Ok(()) }
    }

    fn requires(&self) -> &[Capability] {
        &self.requires
    }

    fn commander(&self) -> Option<&Commander> {
        Some(&self.commander)
    }

    fn eventer(&self) -> Option<&Eventer> {
        Some(&self.eventer)
    }
}
