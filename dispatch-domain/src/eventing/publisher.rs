//! 事件发布器（EventPublisher）
//!
//! 将事件按注册顺序依次交给该种类的全部处理器，在调用方任务上逐个等待执行：
//! - 每个处理器独立套用 `RetryPolicy`，失败不影响后续处理器；
//! - 重试耗尽后写入死信存储，写入失败只记录日志，不向调用方传播；
//! - 处理器在事件的关联标识作用域与 tracing span 内执行。
//!
//! 发布器本身不持久化事件。它应只在产生事件的工作单元提交成功后被调用，
//! 见 [`publish_on_commit`](super::publish_on_commit)。
//!
use super::handler::EventHandler;
use super::registry::EventRegistry;
use super::retry::{DeliveryState, RetryPolicy};
use crate::correlation::{CorrelationId, CorrelationScope};
use crate::domain_event::{DomainEvent, EventEnvelope};
use crate::error::{DispatchError, DispatchResult};
use crate::persist::{DeadLetterRecord, DeadLetterStore, SerializedEvent};
use bon::Builder;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::Instrument;

/// 单个处理器的投递结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered {
        attempts: u32,
    },
    DeadLettered {
        attempts: u32,
        error: String,
        /// 死信是否成功写入存储
        recorded: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerDelivery {
    pub handler: String,
    pub outcome: DeliveryOutcome,
}

/// 一次 `publish` 的结果汇总
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    event_id: String,
    event_kind: String,
    deliveries: Vec<HandlerDelivery>,
}

impl PublishReport {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn event_kind(&self) -> &str {
        &self.event_kind
    }

    pub fn deliveries(&self) -> &[HandlerDelivery] {
        &self.deliveries
    }

    /// 无订阅者时为 true
    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    pub fn all_delivered(&self) -> bool {
        self.deliveries
            .iter()
            .all(|d| matches!(d.outcome, DeliveryOutcome::Delivered { .. }))
    }

    pub fn dead_lettered(&self) -> impl Iterator<Item = &HandlerDelivery> {
        self.deliveries
            .iter()
            .filter(|d| matches!(d.outcome, DeliveryOutcome::DeadLettered { .. }))
    }
}

/// 事件发布器
#[derive(Builder)]
pub struct EventPublisher<E>
where
    E: DomainEvent,
{
    registry: Arc<EventRegistry<E>>,
    dead_letters: Arc<dyn DeadLetterStore>,
    #[builder(default)]
    policy: RetryPolicy,
    /// 死信写入的尝试次数（与处理器重试相互独立），至少 1 次
    #[builder(default = 1)]
    dead_letter_attempts: u32,
}

impl<E> EventPublisher<E>
where
    E: DomainEvent,
{
    pub fn registry(&self) -> &Arc<EventRegistry<E>> {
        &self.registry
    }

    pub fn dead_letters(&self) -> &Arc<dyn DeadLetterStore> {
        &self.dead_letters
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 发布事件
    ///
    /// 仅在事件种类为空（编程错误）时返回 `Err`；处理器失败只体现在报告、日志与死信中。
    pub async fn publish(&self, event: &EventEnvelope<E>) -> DispatchResult<PublishReport> {
        if event.event_kind().trim().is_empty() {
            return Err(DispatchError::InvalidEvent {
                reason: "event kind must not be empty".to_string(),
            });
        }

        let span = tracing::info_span!(
            "publish",
            event_kind = %event.event_kind(),
            event_id = %event.event_id(),
            correlation_id = event.correlation_id().map(CorrelationId::as_str),
        );

        let dispatch = async {
            let handlers = self.registry.handlers_for(event.event_kind());
            if handlers.is_empty() {
                tracing::trace!("no subscribers");
            }

            let mut deliveries = Vec::with_capacity(handlers.len());
            for handler in handlers {
                let outcome = self.deliver(handler.as_ref(), event).await;
                deliveries.push(HandlerDelivery {
                    handler: handler.handler_name().to_string(),
                    outcome,
                });
            }
            deliveries
        }
        .instrument(span);

        let deliveries = match event.correlation_id() {
            Some(id) => CorrelationScope::scope(id.clone(), dispatch).await,
            None => dispatch.await,
        };

        Ok(PublishReport {
            event_id: event.event_id().to_string(),
            event_kind: event.event_kind().to_string(),
            deliveries,
        })
    }

    async fn deliver(
        &self,
        handler: &dyn EventHandler<E>,
        event: &EventEnvelope<E>,
    ) -> DeliveryOutcome {
        match self.run_with_retry(handler, event).await {
            DeliveryState::Exhausted {
                attempts,
                last_error,
            } => {
                let recorded = self
                    .record_dead_letter(handler.handler_name(), event, attempts, &last_error)
                    .await;
                DeliveryOutcome::DeadLettered {
                    attempts,
                    error: last_error,
                    recorded,
                }
            }
            DeliveryState::Succeeded { attempts } => DeliveryOutcome::Delivered { attempts },
            // run_with_retry 只返回终态；非终态按未记录的失败处理，不视为成功
            DeliveryState::Attempting(attempts) => {
                tracing::error!(
                    handler = handler.handler_name(),
                    attempts,
                    "delivery stopped before reaching a terminal state"
                );
                DeliveryOutcome::DeadLettered {
                    attempts,
                    error: NON_TERMINAL.to_string(),
                    recorded: false,
                }
            }
        }
    }

    /// 按重试策略驱动单个处理器直至终态
    pub(crate) async fn run_with_retry(
        &self,
        handler: &dyn EventHandler<E>,
        event: &EventEnvelope<E>,
    ) -> DeliveryState {
        let name = handler.handler_name();
        let max_attempts = self.policy.max_attempts();
        let mut state = DeliveryState::start();

        while let DeliveryState::Attempting(attempt) = state {
            match self.attempt(handler, event).await {
                Ok(()) => {
                    tracing::debug!(handler = name, attempt, "event delivered");
                    state = state.on_success();
                }
                Err(err) => {
                    let message = format!("{err:#}");
                    tracing::warn!(
                        handler = name,
                        attempt,
                        max_attempts,
                        error = %message,
                        "event handler failed"
                    );
                    state = state.on_failure(&self.policy, message);

                    if !state.is_terminal() {
                        let delay = self.policy.backoff().delay_after(attempt);
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }

        state
    }

    async fn attempt(
        &self,
        handler: &dyn EventHandler<E>,
        event: &EventEnvelope<E>,
    ) -> anyhow::Result<()> {
        let call = AssertUnwindSafe(handler.handle(event)).catch_unwind();

        let outcome = match self.policy.handler_timeout() {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(DispatchError::HandlerTimeout {
                        handler: handler.handler_name().to_string(),
                        timeout_ms: limit.as_millis(),
                    }
                    .into());
                }
            },
            None => call.await,
        };

        match outcome {
            Ok(result) => result,
            Err(panic) => Err(anyhow::anyhow!(
                "handler panicked: {}",
                panic_message(panic.as_ref())
            )),
        }
    }

    async fn record_dead_letter(
        &self,
        handler_name: &str,
        event: &EventEnvelope<E>,
        attempts: u32,
        last_error: &str,
    ) -> bool {
        let serialized = match SerializedEvent::try_from(event) {
            Ok(s) => s,
            Err(err) => {
                tracing::error!(
                    handler = handler_name,
                    error = %err,
                    "failed to serialize event for dead letter"
                );
                return false;
            }
        };

        let record = DeadLetterRecord::builder()
            .handler_name(handler_name)
            .event_kind(event.event_kind())
            .event(serialized)
            .error_message(last_error)
            .attempt_count(attempts)
            .maybe_correlation_id(event.correlation_id().cloned())
            .build();

        let tries = self.dead_letter_attempts.max(1);
        for n in 1..=tries {
            let write = AssertUnwindSafe(self.dead_letters.record(record.clone())).catch_unwind();
            let result = match write.await {
                Ok(result) => result,
                Err(panic) => {
                    tracing::error!(
                        handler = handler_name,
                        persist_attempt = n,
                        panic = %panic_message(panic.as_ref()),
                        "dead letter store panicked"
                    );
                    continue;
                }
            };

            match result {
                Ok(()) => {
                    tracing::error!(
                        handler = handler_name,
                        attempts,
                        error = %last_error,
                        dead_letter_id = %record.id(),
                        "event delivery exhausted retries, dead letter recorded"
                    );
                    return true;
                }
                Err(err) => {
                    tracing::error!(
                        handler = handler_name,
                        persist_attempt = n,
                        error = %err,
                        "failed to persist dead letter"
                    );
                }
            }
        }

        false
    }
}

pub(crate) const NON_TERMINAL: &str = "delivery did not reach a terminal state";

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
