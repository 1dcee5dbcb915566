//! 引脚映射表
//!
//! 板级支持是数据而不是代码：每个逻辑引脚描述其 GPIO 线、可选 PWM 通道、
//! 可选 ADC 文件、可选上下拉电阻线、可选电平转换线以及需要预先驱动的复用线。
//! [`PinManager`](crate::PinManager) 统一读取这张表完成引脚获取。

/// 复用线及其需要的电平
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxSetting {
    pub line: u32,
    pub level: u8,
}

impl MuxSetting {
    pub const fn new(line: u32, level: u8) -> Self {
        Self { line, level }
    }
}

/// PWM 控制器和通道号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PwmChannel {
    pub chip: u32,
    pub channel: u32,
}

/// 单个逻辑引脚
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinDescriptor {
    pub id: &'static str,
    pub gpio: u32,
    pub pwm: Option<PwmChannel>,
    /// ADC 原始值文件
    pub analog: Option<&'static str>,
    pub pull: Option<u32>,
    pub level_shifter: Option<u32>,
    pub mux: &'static [MuxSetting],
}

impl PinDescriptor {
    pub const fn gpio(id: &'static str, line: u32) -> Self {
        Self {
            id,
            gpio: line,
            pwm: None,
            analog: None,
            pull: None,
            level_shifter: None,
            mux: &[],
        }
    }

    pub const fn with_pwm(mut self, chip: u32, channel: u32) -> Self {
        self.pwm = Some(PwmChannel { chip, channel });
        self
    }

    pub const fn with_analog(mut self, path: &'static str) -> Self {
        self.analog = Some(path);
        self
    }

    pub const fn with_pull(mut self, line: u32) -> Self {
        self.pull = Some(line);
        self
    }

    pub const fn with_level_shifter(mut self, line: u32) -> Self {
        self.level_shifter = Some(line);
        self
    }

    pub const fn with_mux(mut self, mux: &'static [MuxSetting]) -> Self {
        self.mux = mux;
        self
    }
}

/// 有序引脚映射
#[derive(Debug, Clone, Default)]
pub struct PinMap {
    pins: Vec<PinDescriptor>,
    /// 复用切换期间需要拉低的三态控制线
    tristate: Option<u32>,
    /// 导出 PWM 通道前先把同一引脚的 GPIO 驱动到该电平
    pwm_gpio_level: Option<u8>,
}

impl PinMap {
    pub fn new(pins: impl Into<Vec<PinDescriptor>>) -> Self {
        Self {
            pins: pins.into(),
            tristate: None,
            pwm_gpio_level: None,
        }
    }

    /// 逻辑名与 GPIO 线号相同的简单映射（如 `"17"` → gpio17）
    pub fn identity(lines: impl IntoIterator<Item = u32>) -> Self {
        let pins = lines
            .into_iter()
            .map(|line| {
                // 逻辑名需要 'static：映射表在进程生命周期内只构造有限次
                let id: &'static str = Box::leak(line.to_string().into_boxed_str());
                PinDescriptor::gpio(id, line)
            })
            .collect::<Vec<_>>();
        Self::new(pins)
    }

    pub fn with_tristate(mut self, line: u32) -> Self {
        self.tristate = Some(line);
        self
    }

    pub fn with_pwm_gpio_level(mut self, level: u8) -> Self {
        self.pwm_gpio_level = Some(level);
        self
    }

    pub fn get(&self, id: &str) -> Option<&PinDescriptor> {
        self.pins.iter().find(|p| p.id == id)
    }

    pub fn tristate(&self) -> Option<u32> {
        self.tristate
    }

    pub fn pwm_gpio_level(&self) -> Option<u8> {
        self.pwm_gpio_level
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PinDescriptor> {
        self.pins.iter()
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub fn has_pwm(&self) -> bool {
        self.pins.iter().any(|p| p.pwm.is_some())
    }

    pub fn has_analog(&self) -> bool {
        self.pins.iter().any(|p| p.analog.is_some())
    }
}

const EDISON_MUX_10: &[MuxSetting] = &[MuxSetting::new(263, 1), MuxSetting::new(240, 0)];
const EDISON_MUX_11: &[MuxSetting] = &[MuxSetting::new(262, 1), MuxSetting::new(241, 0)];
const EDISON_MUX_12: &[MuxSetting] = &[MuxSetting::new(242, 0)];
const EDISON_MUX_13: &[MuxSetting] = &[MuxSetting::new(243, 0)];

const fn edison(id: &'static str, gpio: u32, index: u32) -> PinDescriptor {
    PinDescriptor::gpio(id, gpio)
        .with_pull(216 + index)
        .with_level_shifter(248 + index)
}

/// Intel Edison Arduino 扩展板数字引脚
pub const EDISON_ARDUINO: &[PinDescriptor] = &[
    edison("0", 130, 0),
    edison("1", 131, 1),
    edison("2", 128, 2),
    edison("3", 12, 3).with_pwm(0, 0),
    edison("4", 129, 4),
    edison("5", 13, 5).with_pwm(0, 1),
    edison("6", 182, 6).with_pwm(0, 2),
    edison("7", 48, 7),
    edison("8", 49, 8),
    edison("9", 183, 9).with_pwm(0, 3),
    edison("10", 41, 10).with_pwm(0, 4).with_mux(EDISON_MUX_10),
    edison("11", 43, 11).with_pwm(0, 5).with_mux(EDISON_MUX_11),
    edison("12", 42, 12).with_mux(EDISON_MUX_12),
    edison("13", 40, 13).with_mux(EDISON_MUX_13),
];

/// Edison 的三态控制线
pub const EDISON_TRISTATE: u32 = 214;

/// Edison Arduino 扩展板映射（含三态控制；PWM 引脚需先输出高电平）
pub fn edison_arduino() -> PinMap {
    PinMap::new(EDISON_ARDUINO)
        .with_tristate(EDISON_TRISTATE)
        .with_pwm_gpio_level(1)
}
