//! 引脚资源管理
//!
//! [`PinManager`] 负责 sysfs 引脚的完整生命周期：
//!
//! 1. 查表，未知引脚返回 [`Error::UnknownPin`]
//! 2. 驱动复用线（有三态控制线时先拉低、完成后拉高）
//! 3. 驱动电平转换线（输入 0 / 输出 1）
//! 4. 配置上下拉电阻线（输入时输出 0 / 输出时设为输入）
//! 5. 导出引脚（`EBUSY` 视为成功）
//! 6. 设置方向、低电平有效、边沿检测
//! 7. 缓存，后续调用直接使用
//!
//! 释放时按获取的逆序取消导出，内核保留的引脚视为成功，其余错误汇总为 [`MultiError`]。

use crate::fs::Filesystem;
use crate::pinmap::{PinDescriptor, PinMap, PwmChannel};
use crate::sysfs::digital::read_level;
use crate::sysfs::{
    DEFAULT_PERIOD_NS, DigitalPin, Direction, Edge, GPIO_PATH, PWM_PATH, PwmPin, SERVO_PERIOD_NS,
    read_int,
};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;
use robokit_core::{Error, Eventer, MultiError, Payload, Result, Value, from_scale, params, to_scale};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// 边沿事件名；载荷为 `{"pin": id, "level": 0|1}`
pub const DIGITAL_EDGE: &str = "DigitalEdge";

/// 边沿轮询默认间隔
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// 上下拉配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bias {
    AsIs,
    PullUp,
    PullDown,
    Disabled,
}

/// 数字引脚选项
#[derive(Debug, Clone, PartialEq)]
pub struct DigitalPinOptions {
    pub direction: Direction,
    /// 输出引脚的初始电平（原子地写入 `high` / `low` 方向）
    pub initial_level: Option<u8>,
    pub active_low: bool,
    pub edge: Edge,
    pub poll_interval: Duration,
    /// sysfs 不支持，仅记录
    pub debounce: Option<Duration>,
    /// sysfs 不支持，仅记录
    pub bias: Option<Bias>,
}

impl DigitalPinOptions {
    pub fn input() -> Self {
        Self {
            direction: Direction::In,
            initial_level: None,
            active_low: false,
            edge: Edge::None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            debounce: None,
            bias: None,
        }
    }

    pub fn output() -> Self {
        Self {
            direction: Direction::Out,
            ..Self::input()
        }
    }

    pub fn with_initial_level(mut self, level: u8) -> Self {
        self.initial_level = Some(level);
        self
    }

    pub fn with_active_low(mut self) -> Self {
        self.active_low = true;
        self
    }

    /// 边沿检测；sysfs 上通过轮询 `value` 实现，触发时发布 [`DIGITAL_EDGE`]
    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.edge = edge;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_debounce(mut self, period: Duration) -> Self {
        self.debounce = Some(period);
        self
    }

    pub fn with_bias(mut self, bias: Bias) -> Self {
        self.bias = Some(bias);
        self
    }
}

/// 舵机角度到占空比的映射
///
/// 默认 0°..180° 对应周期的 1/40 .. 1/8（50 Hz 时为 0.5 ms .. 2.5 ms）。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServoRange {
    pub min_duty_ns: u32,
    pub max_duty_ns: u32,
    pub min_degree: f64,
    pub max_degree: f64,
}

impl ServoRange {
    pub fn for_period(period_ns: u32) -> Self {
        Self {
            min_duty_ns: period_ns / 40,
            max_duty_ns: period_ns / 8,
            min_degree: 0.0,
            max_degree: 180.0,
        }
    }

    pub fn duty_for(&self, angle: f64) -> u32 {
        to_scale(
            from_scale(angle, self.min_degree, self.max_degree),
            f64::from(self.min_duty_ns),
            f64::from(self.max_duty_ns),
        ) as u32
    }
}

/// [`PinManager`] 配置
#[derive(Debug, Clone)]
pub struct PinManagerConfig {
    pub gpio_base: String,
    pub pwm_base: String,
    pub pwm_period_ns: u32,
    /// 按引脚覆盖默认周期
    pub pin_periods: BTreeMap<String, u32>,
    /// 按引脚覆盖舵机映射
    pub servo_ranges: BTreeMap<String, ServoRange>,
}

impl Default for PinManagerConfig {
    fn default() -> Self {
        Self {
            gpio_base: GPIO_PATH.to_string(),
            pwm_base: PWM_PATH.to_string(),
            pwm_period_ns: DEFAULT_PERIOD_NS,
            pin_periods: BTreeMap::new(),
            servo_ranges: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resource {
    Gpio(u32),
    Pwm(PwmChannel),
}

impl Resource {
    fn label(self) -> String {
        match self {
            Resource::Gpio(line) => format!("gpio{}", line),
            Resource::Pwm(ch) => format!("pwmchip{}/pwm{}", ch.chip, ch.channel),
        }
    }
}

struct PwmState {
    pin: PwmPin,
    period_ns: u32,
    servo: ServoRange,
}

struct Poller {
    stop: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct State {
    lines: BTreeMap<u32, DigitalPin>,
    order: Vec<Resource>,
    digital: HashMap<String, DigitalPinOptions>,
    pwm: BTreeMap<PwmChannel, PwmState>,
    pollers: HashMap<String, Poller>,
}

impl State {
    /// 取得（必要时导出）GPIO 线
    fn gpio(&mut self, fs: &Arc<dyn Filesystem>, base: &str, line: u32) -> Result<&mut DigitalPin> {
        match self.lines.entry(line) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(v) => {
                let mut pin = DigitalPin::new(fs.clone(), base, line);
                pin.export()?;
                trace!("Exported {}", pin.label());
                self.order.push(Resource::Gpio(line));
                Ok(v.insert(pin))
            },
        }
    }
}

/// 引脚资源管理器
pub struct PinManager {
    fs: Arc<dyn Filesystem>,
    map: PinMap,
    config: PinManagerConfig,
    eventer: Eventer,
    state: Mutex<State>,
}

impl PinManager {
    /// `eventer` 用于发布 [`DIGITAL_EDGE`] 事件
    pub fn new(
        fs: Arc<dyn Filesystem>,
        map: PinMap,
        config: PinManagerConfig,
        eventer: Eventer,
    ) -> Self {
        eventer.add_event(DIGITAL_EDGE);
        Self {
            fs,
            map,
            config,
            eventer,
            state: Mutex::new(State::default()),
        }
    }

    pub fn map(&self) -> &PinMap {
        &self.map
    }

    pub fn config(&self) -> &PinManagerConfig {
        &self.config
    }

    /// 当前持有的资源（按获取顺序）
    pub fn acquired(&self) -> Vec<String> {
        self.state.lock().order.iter().map(|r| r.label()).collect()
    }

    fn descriptor(&self, id: &str) -> Result<PinDescriptor> {
        self.map
            .get(id)
            .copied()
            .ok_or_else(|| Error::UnknownPin(id.to_string()))
    }

    /// 按选项（重新）配置数字引脚
    pub fn digital_pin(&self, id: &str, options: DigitalPinOptions) -> Result<()> {
        let mut state = self.state.lock();
        self.configure_digital(&mut state, id, options)
    }

    pub fn digital_write(&self, id: &str, level: u8) -> Result<()> {
        if level > 1 {
            return Err(Error::OutOfRange(format!(
                "digital level {} for pin {}",
                level, id
            )));
        }
        let mut state = self.state.lock();
        let is_output = state
            .digital
            .get(id)
            .is_some_and(|o| o.direction == Direction::Out);
        if !is_output {
            self.configure_digital(&mut state, id, DigitalPinOptions::output())?;
        }
        let desc = self.descriptor(id)?;
        state.gpio(&self.fs, &self.config.gpio_base, desc.gpio)?.write(level)
    }

    pub fn digital_read(&self, id: &str) -> Result<u8> {
        let mut state = self.state.lock();
        if !state.digital.contains_key(id) {
            self.configure_digital(&mut state, id, DigitalPinOptions::input())?;
        }
        let desc = self.descriptor(id)?;
        state.gpio(&self.fs, &self.config.gpio_base, desc.gpio)?.read()
    }

    fn drive_line(&self, state: &mut State, line: u32, level: u8) -> Result<()> {
        state
            .gpio(&self.fs, &self.config.gpio_base, line)?
            .set_output_with_level(level)
    }

    fn configure_digital(
        &self,
        state: &mut State,
        id: &str,
        options: DigitalPinOptions,
    ) -> Result<()> {
        let desc = self.descriptor(id)?;
        if let Some(poller) = state.pollers.remove(id) {
            // 不在持锁时 join：轮询线程里的事件处理函数可能会回调本管理器
            let _ = poller.stop.send(());
        }

        let tristate = if desc.mux.is_empty() {
            None
        } else {
            self.map.tristate()
        };
        if let Some(line) = tristate {
            self.drive_line(state, line, 0)?;
        }
        for mux in desc.mux {
            self.drive_line(state, mux.line, mux.level)?;
        }

        let is_output = options.direction == Direction::Out;
        if let Some(line) = desc.level_shifter {
            self.drive_line(state, line, u8::from(is_output))?;
        }
        if let Some(line) = desc.pull {
            if is_output {
                state
                    .gpio(&self.fs, &self.config.gpio_base, line)?
                    .set_direction(Direction::In)?;
            } else {
                self.drive_line(state, line, 0)?;
            }
        }

        let pin = state.gpio(&self.fs, &self.config.gpio_base, desc.gpio)?;
        match (options.direction, options.initial_level) {
            (Direction::Out, Some(level)) => pin.set_output_with_level(level)?,
            (direction, _) => pin.set_direction(direction)?,
        }
        pin.set_active_low(options.active_low)?;
        if options.edge != Edge::None {
            pin.set_edge(options.edge)?;
        }
        let value_path = pin.value_path();

        if let Some(period) = options.debounce {
            warn!("Debounce ({:?}) is not supported by sysfs GPIO, ignored for pin {}", period, id);
        }
        if let Some(bias) = options.bias {
            warn!("Bias {:?} is not supported by sysfs GPIO, ignored for pin {}", bias, id);
        }

        if let Some(line) = tristate {
            self.drive_line(state, line, 1)?;
        }

        if options.edge != Edge::None && !is_output {
            let poller = self.spawn_poller(id, value_path, options.edge, options.poll_interval)?;
            state.pollers.insert(id.to_string(), poller);
        }

        debug!("Configured pin {} as {:?}", id, options.direction);
        state.digital.insert(id.to_string(), options);
        Ok(())
    }

    fn spawn_poller(
        &self,
        id: &str,
        value_path: String,
        edge: Edge,
        interval: Duration,
    ) -> Result<Poller> {
        let (stop, stop_rx) = bounded(1);
        let fs = self.fs.clone();
        let eventer = self.eventer.clone();
        let pin = id.to_string();
        let initial = read_level(fs.as_ref(), &value_path).unwrap_or(0);

        let thread = thread::Builder::new()
            .name(format!("robokit-edge-{}", id))
            .spawn(move || poll_edges(fs, eventer, pin, value_path, edge, interval, initial, stop_rx))?;

        Ok(Poller {
            stop,
            thread: Some(thread),
        })
    }

    fn pwm_state<'a>(&self, state: &'a mut State, id: &str) -> Result<&'a mut PwmState> {
        let desc = self.descriptor(id)?;
        let channel = desc
            .pwm
            .ok_or_else(|| Error::UnknownPin(format!("{} (no PWM channel)", id)))?;

        if !state.pwm.contains_key(&channel) {
            if let Some(level) = self.map.pwm_gpio_level() {
                self.configure_digital(
                    state,
                    id,
                    DigitalPinOptions::output().with_initial_level(level),
                )?;
            }

            let mut pin = PwmPin::new(self.fs.clone(), &self.config.pwm_base, channel.chip, channel.channel);
            pin.export()?;
            let period_ns = self
                .config
                .pin_periods
                .get(id)
                .copied()
                .unwrap_or(self.config.pwm_period_ns);
            if let Err(e) = init_pwm(&mut pin, period_ns) {
                let _ = pin.unexport();
                return Err(e);
            }

            let servo = self
                .config
                .servo_ranges
                .get(id)
                .copied()
                .unwrap_or_else(|| ServoRange::for_period(period_ns));
            debug!("Initialised {} with period {} ns", pin.label(), period_ns);
            state.order.push(Resource::Pwm(channel));
            state.pwm.insert(
                channel,
                PwmState {
                    pin,
                    period_ns,
                    servo,
                },
            );
        }

        state
            .pwm
            .get_mut(&channel)
            .ok_or_else(|| Error::UnknownPin(id.to_string()))
    }

    /// 占空比 0..=255
    pub fn pwm_write(&self, id: &str, duty: u8) -> Result<()> {
        let mut state = self.state.lock();
        let pwm = self.pwm_state(&mut state, id)?;
        let duty_ns = f64::from(pwm.period_ns) * from_scale(f64::from(duty), 0.0, 255.0);
        set_duty(pwm, id, duty_ns as u32)
    }

    /// 舵机角度
    ///
    /// # 错误
    ///
    /// 角度超出舵机映射范围返回 [`Error::OutOfRange`]。
    pub fn servo_write(&self, id: &str, angle: u8) -> Result<()> {
        let mut state = self.state.lock();
        let pwm = self.pwm_state(&mut state, id)?;
        let angle = f64::from(angle);
        if angle < pwm.servo.min_degree || angle > pwm.servo.max_degree {
            return Err(Error::OutOfRange(format!(
                "servo angle {} for pin {} (allowed {}..={})",
                angle, id, pwm.servo.min_degree, pwm.servo.max_degree
            )));
        }
        if pwm.period_ns != SERVO_PERIOD_NS {
            warn!(
                "PWM pin {} runs with a period of {} ns, servos expect {} ns (50 Hz)",
                id, pwm.period_ns, SERVO_PERIOD_NS
            );
        }
        let duty_ns = pwm.servo.duty_for(angle);
        set_duty(pwm, id, duty_ns)
    }

    /// 修改周期，已设置的占空比按比例调整
    pub fn set_pwm_period(&self, id: &str, period_ns: u32) -> Result<()> {
        if period_ns == 0 {
            return Err(Error::InvalidArgument(format!("PWM period 0 for pin {}", id)));
        }
        let mut state = self.state.lock();
        let pwm = self.pwm_state(&mut state, id)?;
        pwm.pin.change_period(period_ns)?;
        pwm.period_ns = period_ns;
        if !self.config.servo_ranges.contains_key(id) {
            pwm.servo = ServoRange::for_period(period_ns);
        }
        Ok(())
    }

    pub fn pwm_period(&self, id: &str) -> Result<u32> {
        let mut state = self.state.lock();
        Ok(self.pwm_state(&mut state, id)?.period_ns)
    }

    pub fn analog_read(&self, id: &str) -> Result<i32> {
        let desc = self.descriptor(id)?;
        let path = desc
            .analog
            .ok_or_else(|| Error::UnknownPin(format!("{} (no analog input)", id)))?;
        read_int(self.fs.as_ref(), path)
    }

    /// 停止轮询并按获取的逆序释放所有资源
    ///
    /// # 错误
    ///
    /// 除内核保留外的释放失败汇总为 [`Error::Multi`]；释放过程不会因单个失败而中断。
    pub fn release_all(&self) -> Result<()> {
        let pollers: Vec<(String, Poller)> = self.state.lock().pollers.drain().collect();
        for (id, mut poller) in pollers {
            let _ = poller.stop.send(());
            if let Some(thread) = poller.thread.take() {
                if thread.join().is_err() {
                    error!("Edge poller for pin {} panicked", id);
                }
            }
        }

        let mut errors = MultiError::new();
        let mut state = self.state.lock();
        let order = std::mem::take(&mut state.order);
        for resource in order.into_iter().rev() {
            let label = resource.label();
            match resource {
                Resource::Gpio(line) => {
                    if let Some(mut pin) = state.lines.remove(&line) {
                        tolerate_reserved(&label, pin.unexport(), &mut errors);
                    }
                },
                Resource::Pwm(channel) => {
                    if let Some(mut pwm) = state.pwm.remove(&channel) {
                        errors.collect(label.clone(), pwm.pin.set_enabled(false));
                        tolerate_reserved(&label, pwm.pin.unexport(), &mut errors);
                    }
                },
            }
        }
        state.digital.clear();
        errors.into_result()
    }
}

impl Drop for PinManager {
    fn drop(&mut self) {
        for (_, poller) in self.state.get_mut().pollers.drain() {
            let _ = poller.stop.send(());
        }
    }
}

fn tolerate_reserved(label: &str, result: Result<()>, errors: &mut MultiError) {
    match result {
        Ok(()) => {},
        Err(Error::ReservedByKernel(pin)) => debug!("{} is reserved by the kernel, left as is", pin),
        Err(e) => errors.push(label, e),
    }
}

/// 导出后的初始化：先禁用（周期已设置时），再设周期、正常极性、使能
fn init_pwm(pin: &mut PwmPin, period_ns: u32) -> Result<()> {
    if pin.period()? > 0 {
        pin.set_enabled(false)?;
    }
    pin.change_period(period_ns)?;
    pin.set_polarity_inverted(false)?;
    pin.set_enabled(true)
}

fn set_duty(pwm: &mut PwmState, id: &str, duty_ns: u32) -> Result<()> {
    if duty_ns > pwm.period_ns {
        return Err(Error::OutOfRange(format!(
            "duty cycle {} ns exceeds period {} ns for pin {}",
            duty_ns, pwm.period_ns, id
        )));
    }
    pwm.pin.set_duty_cycle(duty_ns)
}

#[allow(clippy::too_many_arguments)]
fn poll_edges(
    fs: Arc<dyn Filesystem>,
    eventer: Eventer,
    pin: String,
    value_path: String,
    edge: Edge,
    interval: Duration,
    initial: u8,
    stop: Receiver<()>,
) {
    let mut last = initial;
    loop {
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {},
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        match read_level(fs.as_ref(), &value_path) {
            Ok(level) => {
                if edge.matches(last, level) {
                    let record = Value::from(params([
                        ("pin", Value::from(pin.as_str())),
                        ("level", Value::from(level)),
                    ]));
                    eventer.publish(DIGITAL_EDGE, Payload::Record(record));
                }
                last = level;
            },
            Err(e) => trace!("Edge poll of pin {} failed: {}", pin, e),
        }
    }
    trace!("Edge poller for pin {} stopped", pin);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{FailMode, MockFilesystem};
    use crate::pinmap::{MuxSetting, edison_arduino};

    const GPIO: &str = "/sys/class/gpio";

    fn manager(map: PinMap) -> (Arc<MockFilesystem>, PinManager) {
        let fs = Arc::new(MockFilesystem::new());
        let pins = PinManager::new(
            fs.clone(),
            map,
            PinManagerConfig::default(),
            Eventer::new("board"),
        );
        (fs, pins)
    }

    fn simple_map() -> PinMap {
        PinMap::new(vec![
            PinDescriptor::gpio("7", 7),
            PinDescriptor::gpio("13", 13).with_pwm(0, 1),
            PinDescriptor::gpio("A0", 50).with_analog("/sys/bus/iio/devices/iio:device0/in_voltage0_raw"),
        ])
    }

    #[test]
    fn test_unknown_pin() {
        let (_, pins) = manager(simple_map());
        assert!(matches!(pins.digital_write("99", 1), Err(Error::UnknownPin(_))));
        assert!(matches!(pins.digital_write("7", 2), Err(Error::OutOfRange(_))));
    }

    #[test]
    fn test_digital_write_exports_once() {
        let (fs, pins) = manager(simple_map());
        pins.digital_write("7", 1).unwrap();
        pins.digital_write("7", 0).unwrap();
        assert_eq!(fs.writes_to(&format!("{}/export", GPIO)), vec!["7"]);
        assert_eq!(fs.writes_to(&format!("{}/gpio7/direction", GPIO)), vec!["out"]);
        assert_eq!(fs.writes_to(&format!("{}/gpio7/value", GPIO)), vec!["1", "0"]);
    }

    #[test]
    fn test_digital_read() {
        let (fs, pins) = manager(simple_map());
        pins.digital_pin("7", DigitalPinOptions::input()).unwrap();
        fs.set(&format!("{}/gpio7/value", GPIO), "1\n");
        assert_eq!(pins.digital_read("7").unwrap(), 1);
    }

    #[test]
    fn test_edison_output_sequence() {
        let (fs, pins) = manager(edison_arduino());
        pins.digital_write("13", 1).unwrap();

        let exports = fs.writes_to(&format!("{}/export", GPIO));
        // 三态线 → 复用线 → 电平转换 → 上拉 → 引脚本身
        assert_eq!(exports, vec!["214", "243", "261", "229", "40"]);
        assert_eq!(fs.writes_to(&format!("{}/gpio243/direction", GPIO)), vec!["low"]);
        assert_eq!(fs.writes_to(&format!("{}/gpio261/direction", GPIO)), vec!["high"]);
        assert_eq!(fs.writes_to(&format!("{}/gpio229/direction", GPIO)), vec!["in"]);
        assert_eq!(fs.writes_to(&format!("{}/gpio214/direction", GPIO)), vec!["low", "high"]);
        assert_eq!(fs.writes_to(&format!("{}/gpio40/value", GPIO)), vec!["1"]);
    }

    #[test]
    fn test_edison_input_drives_pull_low() {
        let (fs, pins) = manager(edison_arduino());
        pins.digital_read("2").unwrap();
        assert_eq!(fs.writes_to(&format!("{}/gpio250/direction", GPIO)), vec!["low"]);
        assert_eq!(fs.writes_to(&format!("{}/gpio218/direction", GPIO)), vec!["low"]);
        assert_eq!(fs.writes_to(&format!("{}/gpio128/direction", GPIO)), vec!["in"]);
    }

    #[test]
    fn test_release_in_reverse_order() {
        let (fs, pins) = manager(edison_arduino());
        pins.digital_write("13", 1).unwrap();
        fs.clear_writes();

        pins.release_all().unwrap();
        assert_eq!(
            fs.writes_to(&format!("{}/unexport", GPIO)),
            vec!["40", "229", "261", "243", "214"]
        );
        assert!(pins.acquired().is_empty());
    }

    #[test]
    fn test_release_tolerates_reserved_and_collects_errors() {
        let (fs, pins) = manager(simple_map());
        pins.digital_write("7", 1).unwrap();
        pins.digital_pin("A0", DigitalPinOptions::input()).unwrap();

        fs.fail_write(&format!("{}/unexport", GPIO), libc::EINVAL, FailMode::Once);
        pins.release_all().unwrap();

        pins.digital_write("7", 1).unwrap();
        pins.digital_read("A0").unwrap();
        fs.fail_write(&format!("{}/unexport", GPIO), libc::EIO, FailMode::Always);
        match pins.release_all() {
            Err(Error::Multi(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_pwm_init_and_write() {
        let (fs, pins) = manager(simple_map());
        pins.pwm_write("13", 255).unwrap();
        pins.pwm_write("13", 0).unwrap();

        let base = "/sys/class/pwm/pwmchip0/pwm1";
        assert_eq!(fs.writes_to("/sys/class/pwm/pwmchip0/export"), vec!["1"]);
        assert_eq!(fs.writes_to(&format!("{}/period", base)), vec!["10000000"]);
        assert_eq!(fs.writes_to(&format!("{}/polarity", base)), vec!["normal"]);
        assert_eq!(fs.writes_to(&format!("{}/enable", base)), vec!["1"]);
        assert_eq!(
            fs.writes_to(&format!("{}/duty_cycle", base)),
            vec!["10000000", "0"]
        );
        assert!(matches!(pins.pwm_write("7", 1), Err(Error::UnknownPin(_))));
    }

    #[test]
    fn test_pwm_init_disables_running_channel() {
        let (fs, pins) = manager(simple_map());
        let base = "/sys/class/pwm/pwmchip0/pwm1";
        fs.set(&format!("{}/period", base), "5000");
        fs.set(&format!("{}/duty_cycle", base), "0");
        fs.set(&format!("{}/enable", base), "1");
        fs.set(&format!("{}/polarity", base), "inversed");
        pins.pwm_write("13", 10).unwrap();
        assert_eq!(fs.writes_to(&format!("{}/enable", base)), vec!["0", "1"]);
    }

    #[test]
    fn test_servo_write() {
        let (fs, pins) = manager(simple_map());
        pins.set_pwm_period("13", SERVO_PERIOD_NS).unwrap();
        pins.servo_write("13", 0).unwrap();
        pins.servo_write("13", 90).unwrap();
        pins.servo_write("13", 180).unwrap();
        assert_eq!(
            fs.writes_to("/sys/class/pwm/pwmchip0/pwm1/duty_cycle"),
            vec!["500000", "1500000", "2500000"]
        );
        assert!(matches!(pins.servo_write("13", 181), Err(Error::OutOfRange(_))));
        assert_eq!(pins.pwm_period("13").unwrap(), SERVO_PERIOD_NS);
    }

    #[test]
    fn test_release_pwm_disables_then_unexports() {
        let (fs, pins) = manager(simple_map());
        pins.pwm_write("13", 128).unwrap();
        fs.clear_writes();
        pins.release_all().unwrap();
        let writes = fs.writes();
        assert_eq!(writes[0], ("/sys/class/pwm/pwmchip0/pwm1/enable".to_string(), "0".to_string()));
        assert_eq!(writes[1], ("/sys/class/pwm/pwmchip0/unexport".to_string(), "1".to_string()));
    }

    #[test]
    fn test_analog_read() {
        let (fs, pins) = manager(simple_map());
        fs.set("/sys/bus/iio/devices/iio:device0/in_voltage0_raw", "512\n");
        assert_eq!(pins.analog_read("A0").unwrap(), 512);
        assert!(matches!(pins.analog_read("7"), Err(Error::UnknownPin(_))));
    }

    #[test]
    fn test_active_low_and_initial_level() {
        let (fs, pins) = manager(simple_map());
        pins.digital_pin(
            "7",
            DigitalPinOptions::output().with_initial_level(1).with_active_low(),
        )
        .unwrap();
        assert_eq!(fs.writes_to(&format!("{}/gpio7/direction", GPIO)), vec!["high"]);
        assert_eq!(fs.writes_to(&format!("{}/gpio7/active_low", GPIO)), vec!["1"]);
    }

    #[test]
    fn test_edge_polling_publishes_events() {
        let fs = Arc::new(MockFilesystem::new());
        let eventer = Eventer::new("board");
        let pins = PinManager::new(
            fs.clone(),
            simple_map(),
            PinManagerConfig::default(),
            eventer.clone(),
        );
        let (tx, rx) = crossbeam_channel::unbounded();
        let _sub = eventer
            .on(DIGITAL_EDGE, move |p| {
                let level = p.as_record().and_then(|r| r.get("level")).and_then(Value::as_i64);
                tx.send(level).unwrap();
            })
            .unwrap();

        pins.digital_pin(
            "7",
            DigitalPinOptions::input()
                .with_edge(Edge::Rising)
                .with_poll_interval(Duration::from_millis(2)),
        )
        .unwrap();
        fs.set(&format!("{}/gpio7/value", GPIO), "1");
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), Some(1));

        // 下降沿不触发
        fs.set(&format!("{}/gpio7/value", GPIO), "0");
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        pins.release_all().unwrap();
    }

    proptest::proptest! {
        #[test]
        fn prop_servo_duty_within_range(angle in 0u8..=180, period in 1_000_000u32..40_000_000) {
            let range = ServoRange::for_period(period);
            let duty = range.duty_for(f64::from(angle));
            proptest::prop_assert!(duty >= range.min_duty_ns);
            proptest::prop_assert!(duty <= range.max_duty_ns);
            proptest::prop_assert!(duty <= period);
        }
    }

    #[test]
    fn test_mux_only_pins_use_tristate() {
        const MUX: &[MuxSetting] = &[MuxSetting::new(100, 1)];
        let map = PinMap::new(vec![PinDescriptor::gpio("x", 5).with_mux(MUX)]).with_tristate(99);
        let (fs, pins) = manager(map);
        pins.digital_write("x", 1).unwrap();
        assert_eq!(fs.writes_to(&format!("{}/export", GPIO)), vec!["99", "100", "5"]);
        assert_eq!(fs.writes_to(&format!("{}/gpio100/direction", GPIO)), vec!["high"]);
    }
}
