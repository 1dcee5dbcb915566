//! 数值缩放与随机数工具

use rand::Rng;

/// 把 `[min, max]` 中的值映射到 `[0, 1]`
///
/// 不做钳位：超出范围的输入会得到超出 `[0, 1]` 的结果。
///
/// # 示例
///
/// ```
/// use robokit_core::from_scale;
///
/// assert_eq!(from_scale(5.0, 0.0, 10.0), 0.5);
/// ```
pub fn from_scale(input: f64, min: f64, max: f64) -> f64 {
    (input - min) / (max - min)
}

/// 把 `[0, 1]` 中的值映射回 `[min, max]`，结果钳位在区间内
///
/// # 示例
///
/// ```
/// use robokit_core::to_scale;
///
/// assert_eq!(to_scale(0.5, 0.0, 10.0), 5.0);
/// assert_eq!(to_scale(2.0, 0.0, 10.0), 10.0);
/// ```
pub fn to_scale(input: f64, min: f64, max: f64) -> f64 {
    let value = input * (max - min) + min;
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

/// 进程级随机数，均匀分布于 `[0, n)`；`n == 0` 时返回 0
pub fn rand(n: u64) -> u64 {
    if n == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..n)
}
