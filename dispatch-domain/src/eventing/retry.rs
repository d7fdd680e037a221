//! 重试策略（RetryPolicy）与单次投递状态机（DeliveryState）
//!
//! 针对一次 `publish` 中的每个 (事件, 处理器) 组合：
//! `Attempting(1)` 开始，成功进入 `Succeeded`；失败且未达上限进入
//! `Attempting(n + 1)`；最后一次尝试失败进入 `Exhausted`。
//!
//! 默认无退避、无超时；退避与超时均可配置且有上界。
//!
use crate::error::{DispatchError, DispatchResult};
use bon::bon;
use std::time::Duration;

/// 重试间隔策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// 立即重试
    #[default]
    None,
    /// 固定间隔
    Fixed(Duration),
    /// 指数退避：`initial * 2^(n-1)`，不超过 `max`
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// 第 `failed_attempt` 次失败后、下一次尝试前的等待时长
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(d) => d,
            Backoff::Exponential { initial, max } => {
                let exp = failed_attempt.saturating_sub(1).min(31);
                initial.saturating_mul(1u32 << exp).min(max)
            }
        }
    }
}

/// 处理器重试策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
    handler_timeout: Option<Duration>,
}

#[bon]
impl RetryPolicy {
    /// 构造并校验策略：`max_attempts` 至少为 1；指数退避要求 `initial <= max`
    #[builder]
    pub fn new(
        #[builder(default = 3)] max_attempts: u32,
        #[builder(default)] backoff: Backoff,
        handler_timeout: Option<Duration>,
    ) -> DispatchResult<Self> {
        if max_attempts == 0 {
            return Err(DispatchError::invalid_config("max_attempts must be >= 1"));
        }
        if let Backoff::Exponential { initial, max } = backoff {
            if initial > max {
                return Err(DispatchError::invalid_config(
                    "exponential backoff requires initial <= max",
                ));
            }
        }
        if handler_timeout == Some(Duration::ZERO) {
            return Err(DispatchError::invalid_config(
                "handler_timeout must be greater than zero",
            ));
        }

        Ok(Self {
            max_attempts,
            backoff,
            handler_timeout,
        })
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::None,
            handler_timeout: None,
        }
    }
}

/// 单个 (事件, 处理器) 投递的状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryState {
    Attempting(u32),
    Succeeded { attempts: u32 },
    Exhausted { attempts: u32, last_error: String },
}

impl DeliveryState {
    pub fn start() -> Self {
        DeliveryState::Attempting(1)
    }

    /// 本次尝试成功
    pub fn on_success(self) -> Self {
        match self {
            DeliveryState::Attempting(n) => DeliveryState::Succeeded { attempts: n },
            terminal => terminal,
        }
    }

    /// 本次尝试失败
    pub fn on_failure(self, policy: &RetryPolicy, error: impl Into<String>) -> Self {
        match self {
            DeliveryState::Attempting(n) if n < policy.max_attempts => {
                DeliveryState::Attempting(n + 1)
            }
            DeliveryState::Attempting(n) => DeliveryState::Exhausted {
                attempts: n,
                last_error: error.into(),
            },
            terminal => terminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeliveryState::Attempting(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_three_attempts_without_delay() {
        let policy = RetryPolicy::builder().build().unwrap();
        assert_eq!(policy, RetryPolicy::default());
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.backoff().delay_after(1), Duration::ZERO);
        assert!(policy.handler_timeout().is_none());
    }

    #[test]
    fn invalid_policies_are_rejected() {
        assert!(RetryPolicy::builder().max_attempts(0).build().is_err());
        assert!(
            RetryPolicy::builder()
                .backoff(Backoff::Exponential {
                    initial: Duration::from_secs(2),
                    max: Duration::from_secs(1),
                })
                .build()
                .is_err()
        );
        assert!(
            RetryPolicy::builder()
                .handler_timeout(Duration::ZERO)
                .build()
                .is_err()
        );
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let b = Backoff::Exponential {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(50),
        };
        assert_eq!(b.delay_after(1), Duration::from_millis(10));
        assert_eq!(b.delay_after(2), Duration::from_millis(20));
        assert_eq!(b.delay_after(3), Duration::from_millis(40));
        assert_eq!(b.delay_after(4), Duration::from_millis(50));
        assert_eq!(b.delay_after(u32::MAX), Duration::from_millis(50));
        assert_eq!(
            Backoff::Fixed(Duration::from_millis(7)).delay_after(9),
            Duration::from_millis(7)
        );
    }

    #[test]
    fn state_machine_follows_attempt_budget() {
        let policy = RetryPolicy::builder().max_attempts(3).build().unwrap();

        let s = DeliveryState::start();
        assert_eq!(s, DeliveryState::Attempting(1));
        let s = s.on_failure(&policy, "e1");
        assert_eq!(s, DeliveryState::Attempting(2));
        let s = s.on_failure(&policy, "e2");
        assert_eq!(s, DeliveryState::Attempting(3));
        let s = s.on_failure(&policy, "e3");
        assert_eq!(
            s,
            DeliveryState::Exhausted {
                attempts: 3,
                last_error: "e3".into()
            }
        );
        assert!(s.is_terminal());
        // 终态不再变化
        assert_eq!(s.clone().on_success(), s);
    }

    #[test]
    fn success_on_second_attempt() {
        let policy = RetryPolicy::default();
        let s = DeliveryState::start().on_failure(&policy, "flaky").on_success();
        assert_eq!(s, DeliveryState::Succeeded { attempts: 2 });
    }

    #[test]
    fn single_attempt_policy_exhausts_immediately() {
        let policy = RetryPolicy::builder().max_attempts(1).build().unwrap();
        let s = DeliveryState::start().on_failure(&policy, "boom");
        assert!(matches!(s, DeliveryState::Exhausted { attempts: 1, .. }));
    }
}
