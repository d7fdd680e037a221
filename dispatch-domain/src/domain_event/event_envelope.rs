use crate::correlation::{CorrelationId, CorrelationScope};
use chrono::Utc;

use super::domain_event_trait::DomainEvent;
use super::event_context::EventContext;
use super::metadata::Metadata;

/// 事件信封，包含事件载荷、元数据与业务上下文
///
/// 构造后不可变：字段私有，仅提供只读访问。关联标识在构造时确定：
/// 优先取 `context` 中显式给出的值，其次取当前 `CorrelationScope`，
/// 都没有时生成新值；之后不再改变。
#[derive(Debug, Clone)]
pub struct EventEnvelope<E>
where
    E: DomainEvent,
{
    metadata: Metadata,
    payload: E,
    context: EventContext,
}

impl<E> EventEnvelope<E>
where
    E: DomainEvent,
{
    pub fn new(payload: E, mut context: EventContext) -> Self {
        if context.correlation_id().is_none() {
            let id = CorrelationScope::current().unwrap_or_default();
            context.stamp_correlation(id);
        }

        let metadata = Metadata::builder()
            .event_id(uuid::Uuid::new_v4().to_string())
            .event_kind(payload.event_kind())
            .occurred_at(Utc::now())
            .build();

        Self {
            metadata,
            payload,
            context,
        }
    }

    /// 从已持久化的各部分还原信封（保留原事件ID与关联标识）
    pub(crate) fn from_parts(metadata: Metadata, payload: E, context: EventContext) -> Self {
        Self {
            metadata,
            payload,
            context,
        }
    }

    pub fn event_id(&self) -> &str {
        self.metadata.event_id()
    }

    pub fn event_kind(&self) -> &str {
        self.metadata.event_kind()
    }

    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.context.correlation_id()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn context(&self) -> &EventContext {
        &self.context
    }
}
