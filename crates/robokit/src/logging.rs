//! 日志初始化

use tracing_subscriber::EnvFilter;

/// 安装 `tracing` 订阅者，默认级别 `info`
///
/// 设置了 `RUST_LOG` 时以它为准。已经安装过订阅者时不做任何事，返回 `false`。
pub fn init_logging() -> bool {
    init_logging_with_filter("info")
}

/// 同 [`init_logging`]，`RUST_LOG` 未设置时使用 `default_filter`（如 `"robokit_hal=debug,info"`）
pub fn init_logging_with_filter(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_logging_with_filter("debug");
        assert!(!init_logging());
    }
}
