use std::sync::Once;

static INIT: Once = Once::new();

/// 进程级日志初始化（只执行一次，从不销毁）
///
/// 宿主已安装 logger 时 `try_init` 失败，直接忽略。
pub fn init_once(default_filter: &str) {
    INIT.call_once(|| {
        let env = env_logger::Env::default().default_filter_or(default_filter);
        let _ = env_logger::Builder::from_env(env)
            .format_timestamp_millis()
            .try_init();
        log::debug!("日志系统初始化完成 (默认级别: {})", default_filter);
    });
}

/// 是否已经执行过初始化
pub fn is_initialized() -> bool {
    INIT.is_completed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_once("warn");
        init_once("debug");
        assert!(is_initialized());
    }
}
