//! 死信（Dead Letter）
//!
//! 某个处理器对某个事件的投递在重试耗尽后，生成 `DeadLetterRecord`
//! 并写入 `DeadLetterStore`，供事后排查与补偿重放。记录只会被标记为已重放，
//! 不会被自动删除。
//!
use super::serialized_event::SerializedEvent;
use crate::{
    correlation::CorrelationId,
    error::{DispatchError, DispatchResult},
};
use async_trait::async_trait;
use bon::Builder;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 投递失败的持久化记录
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    #[builder(default = Uuid::new_v4())]
    id: Uuid,
    /// 失败的处理器名称
    #[builder(into)]
    handler_name: String,
    /// 事件种类（冗余存储，便于查询）
    #[builder(into)]
    event_kind: String,
    /// 序列化后的事件
    event: SerializedEvent,
    /// 最后一次失败的错误信息
    #[builder(into)]
    error_message: String,
    /// 已尝试次数
    attempt_count: u32,
    correlation_id: Option<CorrelationId>,
    #[builder(default = Utc::now())]
    failed_at: DateTime<Utc>,
    reprocessed_at: Option<DateTime<Utc>>,
}

impl DeadLetterRecord {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    pub fn event_kind(&self) -> &str {
        &self.event_kind
    }

    pub fn event(&self) -> &SerializedEvent {
        &self.event
    }

    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }

    pub fn failed_at(&self) -> DateTime<Utc> {
        self.failed_at
    }

    pub fn reprocessed_at(&self) -> Option<DateTime<Utc>> {
        self.reprocessed_at
    }

    pub fn is_reprocessed(&self) -> bool {
        self.reprocessed_at.is_some()
    }
}

/// 死信存储：持久化重试耗尽的投递
///
/// 实现方自身的失败通过 `Err` 返回即可，调用方（发布器）负责记录日志并吞掉错误，
/// 不会让其传播到发布调用链上。
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    /// 写入一条死信
    async fn record(&self, record: DeadLetterRecord) -> DispatchResult<()>;

    /// 按ID读取
    async fn fetch(&self, id: Uuid) -> DispatchResult<Option<DeadLetterRecord>>;

    /// 尚未重放的死信，按失败时间升序
    async fn pending(&self) -> DispatchResult<Vec<DeadLetterRecord>>;

    /// 标记死信已重放
    async fn mark_reprocessed(&self, id: Uuid, at: DateTime<Utc>) -> DispatchResult<()>;
}

/// 内存版死信存储，适用于测试、示例与本地开发
#[derive(Debug, Default)]
pub struct InMemoryDeadLetterStore {
    records: DashMap<Uuid, DeadLetterRecord>,
}

impl InMemoryDeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 全部死信（含已重放），按失败时间升序
    pub fn all(&self) -> Vec<DeadLetterRecord> {
        let mut out: Vec<DeadLetterRecord> =
            self.records.iter().map(|e| e.value().clone()).collect();
        out.sort_by_key(|r| r.failed_at);
        out
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryDeadLetterStore {
    async fn record(&self, record: DeadLetterRecord) -> DispatchResult<()> {
        self.records.insert(record.id, record);
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> DispatchResult<Option<DeadLetterRecord>> {
        Ok(self.records.get(&id).map(|r| r.value().clone()))
    }

    async fn pending(&self) -> DispatchResult<Vec<DeadLetterRecord>> {
        Ok(self
            .all()
            .into_iter()
            .filter(|r| !r.is_reprocessed())
            .collect())
    }

    async fn mark_reprocessed(&self, id: Uuid, at: DateTime<Utc>) -> DispatchResult<()> {
        let Some(mut entry) = self.records.get_mut(&id) else {
            return Err(DispatchError::DeadLetterNotFound { id: id.to_string() });
        };
        entry.reprocessed_at = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(handler: &str, failed_at: DateTime<Utc>) -> DeadLetterRecord {
        let event = SerializedEvent::builder()
            .event_id("e-1")
            .event_kind("OrderPlaced")
            .event_version(1)
            .occurred_at(failed_at)
            .payload(serde_json::json!({"order_id": "o-1"}))
            .context(serde_json::json!({}))
            .build();

        DeadLetterRecord::builder()
            .handler_name(handler)
            .event_kind("OrderPlaced")
            .event(event)
            .error_message("boom")
            .attempt_count(3)
            .correlation_id(CorrelationId::from("cor-1"))
            .failed_at(failed_at)
            .build()
    }

    #[tokio::test]
    async fn pending_is_ordered_and_excludes_reprocessed() {
        let store = InMemoryDeadLetterStore::new();
        let t0 = Utc::now();
        let later = record("b", t0 + chrono::Duration::seconds(5));
        let earlier = record("a", t0);

        store.record(later.clone()).await.unwrap();
        store.record(earlier.clone()).await.unwrap();

        let pending = store.pending().await.unwrap();
        let names: Vec<&str> = pending.iter().map(|r| r.handler_name()).collect();
        assert_eq!(names, vec!["a", "b"]);

        store.mark_reprocessed(earlier.id(), Utc::now()).await.unwrap();
        let pending = store.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id(), later.id());

        // 记录不会被删除
        assert_eq!(store.len(), 2);
        let fetched = store.fetch(earlier.id()).await.unwrap().unwrap();
        assert!(fetched.is_reprocessed());
    }

    #[tokio::test]
    async fn mark_unknown_record_fails() {
        let store = InMemoryDeadLetterStore::new();
        let err = store
            .mark_reprocessed(Uuid::new_v4(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::DeadLetterNotFound { .. }));
    }
}
