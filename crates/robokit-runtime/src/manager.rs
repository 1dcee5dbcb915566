//! 管理器：在一个进程里托管多个机器人
//!
//! - `start` 按添加顺序启动机器人，失败处理由 [`StartPolicy`] 决定
//! - `stop` 按逆序停止全部机器人，错误聚合为 [`MultiError`]
//! - 按名称查找机器人，以及管理器级的命令表和 `RobotAdded` 事件

use crate::config::{ManagerConfig, RobotConfig, StartPolicy};
use crate::robot::{Robot, RobotBuilder};
use crate::signal;
use crate::snapshot::ManagerSnapshot;
use crossbeam_channel::{Receiver, Sender, bounded, select};
use parking_lot::{Mutex, RwLock};
use robokit_core::{
    Commander, Error, Event, Eventer, MultiError, Named, Params, Payload, Registry, Result,
    SubscriptionSet, Value, default_name,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub const ROBOT_ADDED: &str = "RobotAdded";

struct ManagerInner {
    name: String,
    config: ManagerConfig,
    robots: RwLock<Registry<Robot>>,
    eventer: Eventer,
    commander: Commander,
    running: AtomicBool,
    // 串行化 start/stop
    lifecycle: Mutex<()>,
    stopped_tx: Sender<()>,
    stopped_rx: Receiver<()>,
}

/// 管理器句柄（可廉价克隆）
#[derive(Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Manager {
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    pub fn with_config(config: ManagerConfig) -> Self {
        let name = config
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| default_name("Manager"));
        let eventer = Eventer::new(name.clone());
        eventer.add_event(ROBOT_ADDED);
        let (stopped_tx, stopped_rx) = bounded(1);
        Self {
            inner: Arc::new(ManagerInner {
                robots: RwLock::new(Registry::new(format!("manager '{}' robots", name))),
                commander: Commander::new(name.clone()),
                name,
                config,
                eventer,
                running: AtomicBool::new(false),
                lifecycle: Mutex::new(()),
                stopped_tx,
                stopped_rx,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub fn eventer(&self) -> &Eventer {
        &self.inner.eventer
    }

    pub fn commander(&self) -> &Commander {
        &self.inner.commander
    }

    /// 添加机器人并发布 `RobotAdded`（负载为机器人名称）
    ///
    /// # 错误
    ///
    /// 重名返回 [`Error::DuplicateName`]。
    pub fn add_robot(&self, robot: Robot) -> Result<()> {
        let name = robot.name().to_string();
        self.inner.robots.write().add(robot)?;
        debug!("{}: added robot '{}'", self.name(), name);
        self.inner
            .eventer
            .publish(ROBOT_ADDED, Payload::Record(Value::String(name)));
        Ok(())
    }

    /// 以 [`ManagerConfig::robots`] 中的同名预置创建机器人构建器
    ///
    /// 没有预置时只设置名称。构建出的机器人仍需 [`Manager::add_robot`]。
    pub fn robot_builder(&self, name: &str) -> RobotBuilder {
        let config = match self.inner.config.robot(name) {
            Some(preset) => preset.clone(),
            None => RobotConfig::named(name),
        };
        Robot::builder().config(config)
    }

    pub fn robot(&self, name: &str) -> Option<Robot> {
        self.inner.robots.read().get(name).cloned()
    }

    pub fn robots(&self) -> Vec<Robot> {
        self.inner.robots.read().iter().cloned().collect()
    }

    pub fn robot_names(&self) -> Vec<String> {
        self.inner.robots.read().names()
    }

    /// 通配订阅：管理器自身以及每个机器人（含其连接和设备）的全部事件
    ///
    /// 之后添加的机器人不会被挂接。
    pub fn on_all<F>(&self, handler: F) -> SubscriptionSet
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let handler: Arc<dyn Fn(&Event) + Send + Sync> = Arc::new(handler);
        let mut set = SubscriptionSet::new();
        let h = handler.clone();
        set.push(self.inner.eventer.subscribe_all(move |event| h(event)));
        for robot in self.inner.robots.read().iter() {
            let h = handler.clone();
            set.extend(robot.on_all(move |event| h(event)));
        }
        set
    }

    pub fn add_command<F>(&self, name: &str, handler: F) -> Result<()>
    where
        F: Fn(&Params) -> Value + Send + Sync + 'static,
    {
        self.inner.commander.add_command(name, handler)
    }

    pub fn invoke(&self, name: &str, params: &Params) -> Result<Value> {
        self.inner.commander.invoke(name, params)
    }

    /// 按添加顺序启动全部机器人，不阻塞
    ///
    /// # 错误
    ///
    /// - 已在运行时返回 [`Error::AlreadyRunning`]
    /// - [`StartPolicy::AbortOnFailure`]：逆序停止已启动的机器人后返回第一个错误
    /// - [`StartPolicy::ContinueOnFailure`]：其余机器人照常启动，失败的机器人聚合为 [`Error::Multi`]；
    ///   此时管理器仍处于运行状态
    pub fn start(&self) -> Result<()> {
        let _guard = self.inner.lifecycle.lock();
        if self.is_running() {
            return Err(Error::AlreadyRunning(format!("manager '{}'", self.name())));
        }
        info!("Starting Manager '{}'", self.name());
        while self.inner.stopped_rx.try_recv().is_ok() {}

        let robots = self.robots();
        let mut started: Vec<&Robot> = Vec::with_capacity(robots.len());
        let mut errors = MultiError::new();
        for robot in &robots {
            match robot.start() {
                Ok(()) => started.push(robot),
                Err(e) if self.inner.config.start_policy == StartPolicy::AbortOnFailure => {
                    error!("Manager '{}': robot '{}' failed, aborting", self.name(), robot.name());
                    for r in started.iter().rev() {
                        if let Err(stop_err) = r.stop() {
                            warn!(
                                "Manager '{}': rollback of '{}' failed: {}",
                                self.name(),
                                r.name(),
                                stop_err
                            );
                        }
                    }
                    return Err(e);
                },
                Err(e) => {
                    error!("Manager '{}': robot '{}' failed: {}", self.name(), robot.name(), e);
                    errors.push(robot.name(), e);
                },
            }
        }

        self.inner.running.store(true, Ordering::Release);
        info!(
            "Manager '{}' started {}/{} robot(s)",
            self.name(),
            started.len(),
            robots.len()
        );
        errors.into_result()
    }

    /// 逆序停止全部机器人；未运行时为空操作
    ///
    /// 所有机器人共享 `stop_grace_ms` 的总宽限期：每个机器人的宽限期取其自身配置与剩余预算中的较小者。
    pub fn stop(&self) -> Result<()> {
        let _guard = self.inner.lifecycle.lock();
        if !self.is_running() {
            return Ok(());
        }
        info!("Stopping Manager '{}'", self.name());

        let deadline = Instant::now() + self.inner.config.stop_grace();
        let mut errors = MultiError::new();
        for robot in self.robots().iter().rev() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let grace = robot.config().stop_grace().min(remaining);
            errors.collect(robot.name(), robot.stop_with_grace(grace));
        }
        self.inner.running.store(false, Ordering::Release);
        let _ = self.inner.stopped_tx.try_send(());
        errors.into_result()
    }

    /// 启动后阻塞，直到收到中断或被显式停止；`auto_run` 为 `false` 时等同于 [`Manager::start`]
    ///
    /// 在 [`StartPolicy::ContinueOnFailure`] 下启动失败不会阻止运行，
    /// 这些错误与停止时的错误一起返回。
    pub fn run(&self) -> Result<()> {
        let mut errors = MultiError::new();
        match self.start() {
            Ok(()) => {},
            Err(Error::Multi(failed))
                if self.inner.config.start_policy == StartPolicy::ContinueOnFailure =>
            {
                errors.extend(failed)
            },
            Err(e) => return Err(e),
        }
        if !self.inner.config.auto_run {
            return errors.into_result();
        }

        let interrupt = signal::subscribe();
        select! {
            recv(interrupt.receiver()) -> _ => {
                info!("Manager '{}' interrupted", self.name());
                if let Err(e) = self.stop() {
                    errors.push(self.name(), e);
                }
            },
            recv(self.inner.stopped_rx) -> _ => {},
        }
        errors.into_result()
    }

    pub fn snapshot(&self) -> ManagerSnapshot {
        ManagerSnapshot {
            name: self.name().to_string(),
            running: self.is_running(),
            commands: self.inner.commander.names(),
            robots: self.inner.robots.read().iter().map(Robot::snapshot).collect(),
        }
    }
}

impl Named for Manager {
    fn name(&self) -> &str {
        &self.inner.name
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("name", &self.inner.name)
            .field("running", &self.is_running())
            .field("robots", &self.robot_names())
            .finish()
    }
}
