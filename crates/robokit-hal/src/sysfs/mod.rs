//! Linux sysfs 引脚访问（GPIO、PWM、ADC、温度）

pub mod analog;
pub mod digital;
pub mod pwm;

pub use analog::{read_int, read_thermal_zone, thermal_zone_path};
pub use digital::{DigitalPin, Direction, Edge, GPIO_PATH};
pub use pwm::{DEFAULT_PERIOD_NS, PWM_PATH, PwmPin, SERVO_PERIOD_NS};
