//! 机器人
//!
//! [`Robot`] 把一组连接、一组设备和一个 `work` 闭包组合在一起，负责按依赖顺序启动和拆除：
//!
//! ```text
//!   Idle --start()--> Connecting --ok--> Starting --ok--> Running
//!                         |fail              |fail           | stop()
//!                         v                  v               v
//!                        Idle               Idle          Stopping --> Finalized
//! ```
//!
//! - 启动：能力检查 → `RobotStarting` → 按声明顺序 `connect` → 按声明顺序 `start` → `work` → `RobotStarted`
//! - 启动失败时逆序回滚（已启动的设备 `halt`，已连接的连接 `finalize`），状态回到 `Idle`
//! - 停止：`RobotStopping` → 取消定时任务 → 逆序 `halt` → 逆序 `finalize` → `RobotStopped`，
//!   拆除过程中的错误被收集为 [`MultiError`]
//!
//! [`Robot`] 是可廉价克隆的句柄，`work` 和定时任务可以持有它。
//!
//! # 示例
//!
//! ```ignore
//! let robot = Robot::builder()
//!     .name("blinker")
//!     .connection(board.clone())
//!     .device(led.clone())
//!     .work(move |robot| {
//!         let led = led.clone();
//!         robot.every(Duration::from_secs(1), move || led.toggle()).ok();
//!     })
//!     .build()?;
//!
//! robot.run()?;
//! ```

use crate::config::RobotConfig;
use crate::signal;
use crate::snapshot::{ConnectionSnapshot, DeviceSnapshot, RobotSnapshot};
use arc_swap::ArcSwapOption;
use crossbeam_channel::{Receiver, Sender, bounded, select};
use parking_lot::{Mutex, RwLock};
use robokit_core::{
    Commander, Connection, Device, Error, Eventer, JoinTimeout, MultiError, Named, Params, Payload,
    Event, Registry, Result, Scheduler, SchedulerConfig, Subscription, SubscriptionSet, TaskOutcome,
    TimerHandle, Value, default_name,
};
use serde::Serialize;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const ROBOT_STARTING: &str = "RobotStarting";
pub const ROBOT_STARTED: &str = "RobotStarted";
pub const ROBOT_STOPPING: &str = "RobotStopping";
pub const ROBOT_STOPPED: &str = "RobotStopped";

/// 机器人生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum RobotState {
    Idle = 0,
    Connecting = 1,
    Starting = 2,
    Running = 3,
    Stopping = 4,
    Finalized = 5,
}

impl RobotState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => RobotState::Connecting,
            2 => RobotState::Starting,
            3 => RobotState::Running,
            4 => RobotState::Stopping,
            5 => RobotState::Finalized,
            _ => RobotState::Idle,
        }
    }
}

impl fmt::Display for RobotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

struct Work(Box<dyn Fn(Robot) + Send + Sync>);

struct RobotInner {
    name: String,
    config: RobotConfig,
    state: AtomicU8,
    connections: RwLock<Registry<Arc<dyn Connection>>>,
    devices: RwLock<Registry<Arc<dyn Device>>>,
    work: ArcSwapOption<Work>,
    work_thread: Mutex<Option<JoinHandle<()>>>,
    eventer: Eventer,
    commander: Commander,
    scheduler: Scheduler,
    stopped_tx: Sender<()>,
    stopped_rx: Receiver<()>,
}

impl Drop for RobotInner {
    fn drop(&mut self) {
        if RobotState::from_u8(self.state.load(Ordering::Acquire)) == RobotState::Running {
            warn!("Robot '{}' dropped while running; cancelling its timers", self.name);
            self.scheduler.shutdown();
        }
    }
}

/// 机器人句柄（可廉价克隆，克隆共享同一个机器人）
#[derive(Clone)]
pub struct Robot {
    inner: Arc<RobotInner>,
}

impl Robot {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(RobotConfig::named(name))
    }

    pub fn with_config(config: RobotConfig) -> Self {
        let name = config
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| default_name("Robot"));
        let eventer = Eventer::new(name.clone());
        for event in [ROBOT_STARTING, ROBOT_STARTED, ROBOT_STOPPING, ROBOT_STOPPED] {
            eventer.add_event(event);
        }
        // 只在 start 成功连接并启动设备之后接受定时器
        let scheduler = Scheduler::closed(
            name.clone(),
            SchedulerConfig {
                stop_grace: config.stop_grace(),
            },
        );
        let (stopped_tx, stopped_rx) = bounded(1);

        debug!("Initializing Robot '{}'", name);
        Self {
            inner: Arc::new(RobotInner {
                connections: RwLock::new(Registry::new(format!("robot '{}' connections", name))),
                devices: RwLock::new(Registry::new(format!("robot '{}' devices", name))),
                commander: Commander::new(name.clone()),
                name,
                config,
                state: AtomicU8::new(RobotState::Idle as u8),
                work: ArcSwapOption::empty(),
                work_thread: Mutex::new(None),
                eventer,
                scheduler,
                stopped_tx,
                stopped_rx,
            }),
        }
    }

    pub fn builder() -> RobotBuilder {
        RobotBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &RobotConfig {
        &self.inner.config
    }

    pub fn state(&self) -> RobotState {
        RobotState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == RobotState::Running
    }

    /// 机器人级事件：`RobotStarting`、`RobotStarted`、`RobotStopping`、`RobotStopped`
    pub fn eventer(&self) -> &Eventer {
        &self.inner.eventer
    }

    pub fn commander(&self) -> &Commander {
        &self.inner.commander
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// 添加连接
    ///
    /// # 错误
    ///
    /// 运行期间调用返回 [`Error::AlreadyRunning`]；重名返回 [`Error::DuplicateName`]。
    pub fn add_connection(&self, connection: Arc<dyn Connection>) -> Result<()> {
        self.ensure_stopped()?;
        debug!("{}: adding connection '{}'", self.name(), connection.name());
        self.inner.connections.write().add(connection)
    }

    /// 添加设备，约束同 [`Robot::add_connection`]
    pub fn add_device(&self, device: Arc<dyn Device>) -> Result<()> {
        self.ensure_stopped()?;
        debug!("{}: adding device '{}'", self.name(), device.name());
        self.inner.devices.write().add(device)
    }

    /// 设置 `work`；下一次 `start` 生效
    pub fn set_work<F>(&self, work: F)
    where
        F: Fn(Robot) + Send + Sync + 'static,
    {
        self.inner.work.store(Some(Arc::new(Work(Box::new(work)))));
    }

    pub fn connection(&self, name: &str) -> Option<Arc<dyn Connection>> {
        self.inner.connections.read().get(name).cloned()
    }

    pub fn device(&self, name: &str) -> Option<Arc<dyn Device>> {
        self.inner.devices.read().get(name).cloned()
    }

    pub fn connection_names(&self) -> Vec<String> {
        self.inner.connections.read().names()
    }

    pub fn device_names(&self) -> Vec<String> {
        self.inner.devices.read().names()
    }

    pub fn on<F>(&self, event: &str, handler: F) -> Result<Subscription>
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.inner.eventer.on(event, handler)
    }

    /// 通配订阅：机器人自身、每个连接和每个设备发布的全部事件
    ///
    /// 只挂接调用时已注册的连接和设备。[`Event::source`] 标明事件来自哪个发射者。
    pub fn on_all<F>(&self, handler: F) -> SubscriptionSet
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let handler: Arc<dyn Fn(&Event) + Send + Sync> = Arc::new(handler);
        let hook = |eventer: &Eventer| {
            let handler = handler.clone();
            eventer.subscribe_all(move |event| handler(event))
        };

        let mut set = SubscriptionSet::new();
        set.push(hook(&self.inner.eventer));
        for connection in self.inner.connections.read().iter() {
            if let Some(eventer) = connection.eventer() {
                set.push(hook(eventer));
            }
        }
        for device in self.inner.devices.read().iter() {
            if let Some(eventer) = device.eventer() {
                set.push(hook(eventer));
            }
        }
        debug!("Robot '{}': wildcard subscription on {} emitters", self.name(), set.len());
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

    /// 调用设备自己的命令
    ///
    /// # 错误
    ///
    /// 设备不存在返回 [`Error::NotFound`]；设备没有命令表或命令不存在返回 [`Error::UnknownCommand`]。
    pub fn invoke_device(&self, device: &str, command: &str, params: &Params) -> Result<Value> {
        let found = self
            .device(device)
            .ok_or_else(|| Error::NotFound(format!("device '{}' in robot '{}'", device, self.name())))?;
        match found.commander() {
            Some(commander) => commander.invoke(command, params),
            None => Err(Error::UnknownCommand(format!("{}.{}", device, command))),
        }
    }

    /// 在机器人的调度器上注册周期任务；机器人停止时自动取消
    ///
    /// # 错误
    ///
    /// 机器人不在运行（调度器未打开）时返回 [`Error::NotRunning`]。
    pub fn every<F, R>(&self, period: Duration, f: F) -> Result<TimerHandle>
    where
        F: FnMut() -> R + Send + 'static,
        R: TaskOutcome,
    {
        self.inner.scheduler.every(period, f)
    }

    pub fn after<F, R>(&self, delay: Duration, f: F) -> Result<TimerHandle>
    where
        F: FnOnce() -> R + Send + 'static,
        R: TaskOutcome,
    {
        self.inner.scheduler.after(delay, f)
    }

    /// 启动机器人，不阻塞
    ///
    /// # 错误
    ///
    /// - 已在运行（或正在启动/停止）时返回 [`Error::AlreadyRunning`]
    /// - 其他失败返回 [`Error::StartFailed`]，`cause` 是第一个致命错误；
    ///   返回前已完成回滚，状态回到 [`RobotState::Idle`]
    pub fn start(&self) -> Result<()> {
        if let Err(state) =
            self.transition(&[RobotState::Idle, RobotState::Finalized], RobotState::Connecting)
        {
            return Err(Error::AlreadyRunning(format!("robot '{}' ({})", self.name(), state)));
        }
        info!("Starting Robot '{}'", self.name());

        // 丢弃上一轮运行遗留的停止通知
        while self.inner.stopped_rx.try_recv().is_ok() {}

        let connections: Vec<_> = self.inner.connections.read().iter().cloned().collect();
        let devices: Vec<_> = self.inner.devices.read().iter().cloned().collect();

        if let Err(cause) = self.bring_up(&connections, &devices) {
            self.set_state(RobotState::Idle);
            error!("Robot '{}' failed to start: {}", self.name(), cause);
            return Err(Error::start_failed(self.name(), cause));
        }

        self.set_state(RobotState::Running);
        self.inner.eventer.publish(ROBOT_STARTED, Payload::Empty);
        info!("Robot '{}' started", self.name());
        Ok(())
    }

    /// 启动后阻塞，直到收到中断或被显式停止
    ///
    /// `auto_run` 为 `false` 时等同于 [`Robot::start`]。
    pub fn run(&self) -> Result<()> {
        self.start()?;
        if !self.inner.config.auto_run {
            return Ok(());
        }

        let interrupt = signal::subscribe();
        select! {
            recv(interrupt.receiver()) -> _ => {
                info!("Robot '{}' interrupted", self.name());
                self.stop()
            },
            // 其他线程已完成停止并拿到了结果
            recv(self.inner.stopped_rx) -> _ => Ok(()),
        }
    }

    /// 停止机器人
    ///
    /// `Idle`/`Finalized` 状态下为空操作；另一个线程正在停止时立即返回 `Ok(())`。
    ///
    /// # 错误
    ///
    /// 正在启动时返回 [`Error::NotRunning`]；拆除过程中的错误聚合为 [`Error::Multi`]。
    pub fn stop(&self) -> Result<()> {
        self.stop_with_grace(self.inner.config.stop_grace())
    }

    /// 同 [`Robot::stop`]，定时任务和 `work` 的宽限期使用 `grace` 而不是配置值
    pub fn stop_with_grace(&self, grace: Duration) -> Result<()> {
        match self.transition(&[RobotState::Running], RobotState::Stopping) {
            Ok(()) => {},
            Err(RobotState::Idle | RobotState::Finalized | RobotState::Stopping) => return Ok(()),
            Err(state) => {
                return Err(Error::NotRunning(format!("robot '{}' ({})", self.name(), state)));
            },
        }
        info!("Stopping Robot '{}'", self.name());
        self.inner.eventer.publish(ROBOT_STOPPING, Payload::Empty);

        let overran = self.inner.scheduler.shutdown_with_grace(grace);
        if overran > 0 {
            warn!("Robot '{}': {} timer(s) still running after {:?}", self.name(), overran, grace);
        }
        self.join_work(grace);

        let connections: Vec<_> = self.inner.connections.read().iter().cloned().collect();
        let devices: Vec<_> = self.inner.devices.read().iter().cloned().collect();

        let mut errors = MultiError::new();
        errors.extend(halt_devices(&devices));
        errors.extend(finalize_connections(&connections));

        self.inner.eventer.publish(ROBOT_STOPPED, Payload::Empty);
        self.set_state(RobotState::Finalized);
        let _ = self.inner.stopped_tx.try_send(());

        if errors.is_empty() {
            info!("Robot '{}' stopped", self.name());
        } else {
            warn!("Robot '{}' stopped with {} error(s)", self.name(), errors.len());
        }
        errors.into_result()
    }

    pub fn snapshot(&self) -> RobotSnapshot {
        RobotSnapshot {
            name: self.name().to_string(),
            state: self.state(),
            commands: self.inner.commander.names(),
            connections: self
                .inner
                .connections
                .read()
                .iter()
                .map(|c| ConnectionSnapshot::of(c.as_ref()))
                .collect(),
            devices: self
                .inner
                .devices
                .read()
                .iter()
                .map(|d| DeviceSnapshot::of(d.as_ref()))
                .collect(),
        }
    }

    fn bring_up(&self, connections: &[Arc<dyn Connection>], devices: &[Arc<dyn Device>]) -> Result<()> {
        check_requirements(connections, devices)?;
        self.inner.eventer.publish(ROBOT_STARTING, Payload::Empty);

        for (i, connection) in connections.iter().enumerate() {
            debug!("{}: connecting '{}'", self.name(), connection.name());
            if let Err(e) = connection.connect() {
                log_rollback(self.name(), finalize_connections(&connections[..i]));
                return Err(e);
            }
        }

        self.set_state(RobotState::Starting);
        for (i, device) in devices.iter().enumerate() {
            debug!("{}: starting device '{}'", self.name(), device.name());
            if let Err(e) = device.start() {
                let mut rollback = halt_devices(&devices[..i]);
                rollback.extend(finalize_connections(connections));
                log_rollback(self.name(), rollback);
                return Err(e);
            }
        }

        self.inner.scheduler.reopen();
        if let Err(e) = self.spawn_work() {
            self.inner.scheduler.shutdown();
            let mut rollback = halt_devices(devices);
            rollback.extend(finalize_connections(connections));
            log_rollback(self.name(), rollback);
            return Err(e);
        }
        Ok(())
    }

    fn spawn_work(&self) -> Result<()> {
        let Some(work) = self.inner.work.load_full() else {
            return Ok(());
        };
        debug!("{}: starting work", self.name());

        if !self.inner.config.work_on_thread {
            run_work(&work, self.clone());
            return Ok(());
        }

        let robot = self.clone();
        let handle = std::thread::Builder::new()
            .name(format!("robokit-work-{}", self.name()))
            .spawn(move || run_work(&work, robot))?;
        *self.inner.work_thread.lock() = Some(handle);
        Ok(())
    }

    fn join_work(&self, grace: Duration) {
        let Some(handle) = self.inner.work_thread.lock().take() else {
            return;
        };
        // work 自己调用了 stop
        if handle.thread().id() == std::thread::current().id() {
            return;
        }
        match handle.join_timeout(grace) {
            Ok(()) => {},
            Err(Error::Timeout) => {
                warn!("Robot '{}': work still running after {:?}", self.name(), grace)
            },
            Err(e) => error!("Robot '{}': work thread failed: {}", self.name(), e),
        }
    }

    fn ensure_stopped(&self) -> Result<()> {
        match self.state() {
            RobotState::Idle | RobotState::Finalized => Ok(()),
            state => Err(Error::AlreadyRunning(format!("robot '{}' ({})", self.name(), state))),
        }
    }

    fn set_state(&self, state: RobotState) {
        self.inner.state.store(state as u8, Ordering::Release);
    }

    /// 仅当当前状态属于 `from` 时切换到 `to`；否则返回当前状态
    fn transition(&self, from: &[RobotState], to: RobotState) -> std::result::Result<(), RobotState> {
        let mut current = self.state();
        loop {
            if !from.contains(&current) {
                return Err(current);
            }
            match self.inner.state.compare_exchange(
                current as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = RobotState::from_u8(actual),
            }
        }
    }
}

impl Named for Robot {
    fn name(&self) -> &str {
        &self.inner.name
    }
}

impl fmt::Debug for Robot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Robot")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("connections", &self.connection_names())
            .field("devices", &self.device_names())
            .finish()
    }
}

fn run_work(work: &Work, robot: Robot) {
    let name = robot.name().to_string();
    if catch_unwind(AssertUnwindSafe(|| (work.0)(robot))).is_err() {
        error!("Robot '{}': work panicked", name);
    }
}

/// 设备要求的每一项能力都必须由它的连接提供
fn check_requirements(connections: &[Arc<dyn Connection>], devices: &[Arc<dyn Device>]) -> Result<()> {
    for device in devices {
        let Some(connection_name) = device.connection_name() else {
            if let Some(&capability) = device.requires().first() {
                return Err(Error::CapabilityMissing {
                    driver: device.name().to_string(),
                    capability,
                });
            }
            continue;
        };
        let connection = connections
            .iter()
            .find(|c| c.name() == connection_name)
            .ok_or_else(|| Error::UnknownConnection(connection_name.to_string()))?;
        if let Some(&capability) = device.requires().iter().find(|&&c| !connection.provides(c)) {
            return Err(Error::CapabilityMissing {
                driver: device.name().to_string(),
                capability,
            });
        }
    }
    Ok(())
}

fn halt_devices(devices: &[Arc<dyn Device>]) -> MultiError {
    let mut errors = MultiError::new();
    for device in devices.iter().rev() {
        debug!("Halting device '{}'", device.name());
        errors.collect(device.name(), device.halt());
    }
    errors
}

fn finalize_connections(connections: &[Arc<dyn Connection>]) -> MultiError {
    let mut errors = MultiError::new();
    for connection in connections.iter().rev() {
        debug!("Finalizing connection '{}'", connection.name());
        errors.collect(connection.name(), connection.finalize());
    }
    errors
}

fn log_rollback(robot: &str, errors: MultiError) {
    for (source, e) in errors.iter() {
        warn!("Robot '{}': rollback of '{}' failed: {}", robot, source, e);
    }
}

/// [`Robot`] 构建器
///
/// 连接和设备按添加顺序启动；名称冲突推迟到 [`RobotBuilder::build`] 时报告。
#[derive(Default)]
pub struct RobotBuilder {
    config: RobotConfig,
    connections: Vec<Arc<dyn Connection>>,
    devices: Vec<Arc<dyn Device>>,
    work: Option<Box<dyn Fn(Robot) + Send + Sync>>,
}

impl RobotBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    /// 整体替换配置；已设置的名称会被 `config.name` 覆盖（若有）
    pub fn config(mut self, config: RobotConfig) -> Self {
        let name = config.name.clone().or(self.config.name.take());
        self.config = RobotConfig { name, ..config };
        self
    }

    pub fn auto_run(mut self, auto_run: bool) -> Self {
        self.config.auto_run = auto_run;
        self
    }

    pub fn stop_grace(mut self, grace: Duration) -> Self {
        self.config.stop_grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn work_on_thread(mut self, on_thread: bool) -> Self {
        self.config.work_on_thread = on_thread;
        self
    }

    pub fn connection(mut self, connection: Arc<dyn Connection>) -> Self {
        self.connections.push(connection);
        self
    }

    pub fn device(mut self, device: Arc<dyn Device>) -> Self {
        self.devices.push(device);
        self
    }

    pub fn work<F>(mut self, work: F) -> Self
    where
        F: Fn(Robot) + Send + Sync + 'static,
    {
        self.work = Some(Box::new(work));
        self
    }

    /// # 错误
    ///
    /// 连接或设备重名时返回 [`Error::DuplicateName`]。
    pub fn build(self) -> Result<Robot> {
        let robot = Robot::with_config(self.config);
        for connection in self.connections {
            robot.add_connection(connection)?;
        }
        for device in self.devices {
            robot.add_device(device)?;
        }
        if let Some(work) = self.work {
            robot.inner.work.store(Some(Arc::new(Work(work))));
        }
        Ok(robot)
    }
}
