//! 事件持久化模型（SerializedEvent）
//!
//! 定义事件在持久化层（死信存储、任务载荷）的标准形态，
//! 以及与 `EventEnvelope` 之间的双向转换。
//!
use crate::{
    correlation::CorrelationId,
    domain_event::{DomainEvent, EventContext, EventEnvelope, Metadata},
};
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct SerializedEvent {
    /// 事件唯一标识符
    #[builder(into)]
    event_id: String,
    /// 事件种类，用于订阅路由
    #[builder(into)]
    event_kind: String,
    /// 事件载荷版本
    event_version: usize,
    /// 关联 ID，用于将多个事件关联到同一个业务操作
    correlation_id: Option<CorrelationId>,
    /// 因果 ID，用于表示事件的触发来源
    #[builder(into)]
    causation_id: Option<String>,
    /// 触发事件的主体类型（如用户、系统等）
    #[builder(into)]
    actor_type: Option<String>,
    /// 触发事件的主体 ID
    #[builder(into)]
    actor_id: Option<String>,
    /// 事件发生时间
    occurred_at: DateTime<Utc>,
    /// 事件负载，存储事件的具体数据
    payload: Value,
    /// 上下文信息（冗余存储，便于查询）
    context: Value,
}

impl SerializedEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn event_kind(&self) -> &str {
        &self.event_kind
    }

    pub fn event_version(&self) -> usize {
        self.event_version
    }

    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }

    pub fn causation_id(&self) -> Option<&str> {
        self.causation_id.as_deref()
    }

    pub fn actor_type(&self) -> Option<&str> {
        self.actor_type.as_deref()
    }

    pub fn actor_id(&self) -> Option<&str> {
        self.actor_id.as_deref()
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn context(&self) -> &Value {
        &self.context
    }
}

impl<E> TryFrom<&EventEnvelope<E>> for SerializedEvent
where
    E: DomainEvent,
{
    type Error = serde_json::Error;

    fn try_from(envelope: &EventEnvelope<E>) -> Result<Self, Self::Error> {
        let context = envelope.context();
        Ok(SerializedEvent {
            event_id: envelope.event_id().to_string(),
            event_kind: envelope.event_kind().to_string(),
            event_version: envelope.payload().event_version(),
            correlation_id: context.correlation_id().cloned(),
            causation_id: context.causation_id().map(|s| s.to_string()),
            actor_type: context.actor_type().map(|s| s.to_string()),
            actor_id: context.actor_id().map(|s| s.to_string()),
            occurred_at: *envelope.metadata().occurred_at(),
            payload: serde_json::to_value(envelope.payload())?,
            context: serde_json::to_value(context)?,
        })
    }
}

impl<E> TryFrom<&SerializedEvent> for EventEnvelope<E>
where
    E: DomainEvent,
{
    type Error = serde_json::Error;

    fn try_from(value: &SerializedEvent) -> Result<Self, Self::Error> {
        let metadata = Metadata::builder()
            .event_id(value.event_id.clone())
            .event_kind(value.event_kind.clone())
            .occurred_at(value.occurred_at)
            .build();

        let payload: E = serde_json::from_value(value.payload.clone())?;

        let context: EventContext = serde_json::from_value(value.context.clone())?;

        Ok(EventEnvelope::from_parts(metadata, payload, context))
    }
}
