//! 日志初始化
//!
//! 领域层只产生 span 与事件，从不安装 subscriber；由宿主程序在启动时调用
//! [`init_tracing`] 一次。`RUST_LOG` 优先于配置中的 `log_level`。
//!
use crate::config::DispatchConfig;
use crate::error::AppError;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// 安装全局 subscriber；重复安装返回错误而不是 panic
pub fn init_tracing(config: &DispatchConfig) -> Result<(), AppError> {
    let filter = filter_for(&config.log_level);

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| AppError::Infra(format!("failed to initialise tracing: {e}")))
}

fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "dispatch_domain={level},dispatch_application={level}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_initialisation_is_an_error() {
        let config = DispatchConfig::default();
        // 同一测试进程中可能已有其他测试安装过 subscriber，首次结果不做断言
        let _ = init_tracing(&config);
        let second = init_tracing(&config);

        assert!(matches!(second, Err(AppError::Infra(_))));
    }
}
