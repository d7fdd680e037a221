//! 分发配置（DispatchConfig）
//!
//! 所有字段均有默认值；可由 `DISPATCH_*` 环境变量或 JSON 文档加载，
//! 再通过 `retry_policy()` 校验为领域层的 `RetryPolicy`。
//!
//! | 环境变量 | 字段 |
//! |---|---|
//! | `DISPATCH_MAX_ATTEMPTS` | `max_attempts` |
//! | `DISPATCH_BACKOFF` | `backoff`（`none` / `fixed` / `exponential`） |
//! | `DISPATCH_BACKOFF_DELAY_MS` | 固定退避间隔 |
//! | `DISPATCH_BACKOFF_INITIAL_MS` / `DISPATCH_BACKOFF_MAX_MS` | 指数退避的起始值与上限 |
//! | `DISPATCH_HANDLER_TIMEOUT_MS` | `handler_timeout_ms` |
//! | `DISPATCH_DEAD_LETTER_ATTEMPTS` | `dead_letter_attempts` |
//! | `DISPATCH_TASK_QUEUE_CAPACITY` | `task_queue_capacity` |
//! | `DISPATCH_LOG_LEVEL` | `log_level` |
//!
use crate::error::AppError;
use dispatch_domain::eventing::{Backoff, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// 重试退避配置（毫秒）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffConfig {
    #[default]
    None,
    Fixed {
        delay_ms: u64,
    },
    Exponential {
        initial_ms: u64,
        max_ms: u64,
    },
}

impl From<&BackoffConfig> for Backoff {
    fn from(value: &BackoffConfig) -> Self {
        match *value {
            BackoffConfig::None => Backoff::None,
            BackoffConfig::Fixed { delay_ms } => Backoff::Fixed(Duration::from_millis(delay_ms)),
            BackoffConfig::Exponential { initial_ms, max_ms } => Backoff::Exponential {
                initial: Duration::from_millis(initial_ms),
                max: Duration::from_millis(max_ms),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// 每个处理器的最大投递次数（含首次），至少 1
    pub max_attempts: u32,
    pub backoff: BackoffConfig,
    /// 单次处理器调用的超时；为空表示不限制
    pub handler_timeout_ms: Option<u64>,
    /// 死信写入的尝试次数
    pub dead_letter_attempts: u32,
    /// 任务转交队列容量
    pub task_queue_capacity: usize,
    /// 未设置 `RUST_LOG` 时使用的日志级别
    pub log_level: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffConfig::None,
            handler_timeout_ms: None,
            dead_letter_attempts: 1,
            task_queue_capacity: 256,
            log_level: "info".to_string(),
        }
    }
}

impl DispatchConfig {
    /// 从 `DISPATCH_*` 环境变量加载，未设置的字段保持默认值
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从 JSON 文档加载，缺失字段使用默认值
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| AppError::Config(format!("invalid json: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// 以任意键值来源加载（环境变量加载的底层实现）
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let backoff = match lookup("DISPATCH_BACKOFF").as_deref().map(str::trim) {
            None | Some("") | Some("none") => BackoffConfig::None,
            Some("fixed") => BackoffConfig::Fixed {
                delay_ms: required(&lookup, "DISPATCH_BACKOFF_DELAY_MS")?,
            },
            Some("exponential") => BackoffConfig::Exponential {
                initial_ms: required(&lookup, "DISPATCH_BACKOFF_INITIAL_MS")?,
                max_ms: required(&lookup, "DISPATCH_BACKOFF_MAX_MS")?,
            },
            Some(other) => {
                return Err(AppError::Config(format!(
                    "DISPATCH_BACKOFF: unknown backoff '{other}'"
                )));
            }
        };

        let config = Self {
            max_attempts: optional(&lookup, "DISPATCH_MAX_ATTEMPTS")?
                .unwrap_or(defaults.max_attempts),
            backoff,
            handler_timeout_ms: optional(&lookup, "DISPATCH_HANDLER_TIMEOUT_MS")?,
            dead_letter_attempts: optional(&lookup, "DISPATCH_DEAD_LETTER_ATTEMPTS")?
                .unwrap_or(defaults.dead_letter_attempts),
            task_queue_capacity: optional(&lookup, "DISPATCH_TASK_QUEUE_CAPACITY")?
                .unwrap_or(defaults.task_queue_capacity),
            log_level: lookup("DISPATCH_LOG_LEVEL").unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// 转换为领域层重试策略（同时完成取值校验）
    pub fn retry_policy(&self) -> Result<RetryPolicy, AppError> {
        let policy = RetryPolicy::builder()
            .max_attempts(self.max_attempts)
            .backoff(Backoff::from(&self.backoff))
            .maybe_handler_timeout(self.handler_timeout_ms.map(Duration::from_millis))
            .build()?;
        Ok(policy)
    }

    fn validate(&self) -> Result<(), AppError> {
        self.retry_policy()?;
        if self.dead_letter_attempts == 0 {
            return Err(AppError::Config(
                "dead_letter_attempts must be at least 1".to_string(),
            ));
        }
        if self.task_queue_capacity == 0 {
            return Err(AppError::Config(
                "task_queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn optional<T, F>(lookup: &F, key: &str) -> Result<Option<T>, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| AppError::Config(format!("{key}: {e}"))),
    }
}

fn required<T, F>(lookup: &F, key: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, key)?.ok_or_else(|| AppError::Config(format!("{key} is required")))
}
