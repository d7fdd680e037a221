//! 死信重放（DeadLetterReprocessor）
//!
//! 将死信中保存的事件还原（保留原事件ID与关联标识），交给记录中指名的处理器，
//! 按同一重试策略重新投递；成功后标记为已重放，失败则保持待处理。
//!
//! 同一重放器内，针对同一条死信的并发重放会被拒绝（`ReprocessInProgress`）。
//! 多个进程共享同一存储时，需要存储实现自身提供领取语义。
//!
use super::handler::EventHandler;
use super::publisher::{EventPublisher, NON_TERMINAL};
use super::retry::DeliveryState;
use crate::correlation::{CorrelationId, CorrelationScope};
use crate::domain_event::{DomainEvent, EventEnvelope};
use crate::error::{DispatchError, DispatchResult};
use crate::persist::DeadLetterRecord;
use chrono::Utc;
use dashmap::DashSet;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

pub struct DeadLetterReprocessor<E>
where
    E: DomainEvent,
{
    publisher: Arc<EventPublisher<E>>,
    in_flight: DashSet<Uuid>,
}

/// 重放期间占用死信ID，离开作用域时释放
struct Claim<'a> {
    in_flight: &'a DashSet<Uuid>,
    id: Uuid,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.id);
    }
}

impl<E> DeadLetterReprocessor<E>
where
    E: DomainEvent,
{
    pub fn new(publisher: Arc<EventPublisher<E>>) -> Self {
        Self {
            publisher,
            in_flight: DashSet::new(),
        }
    }

    fn claim(&self, id: Uuid) -> DispatchResult<Claim<'_>> {
        if !self.in_flight.insert(id) {
            return Err(DispatchError::ReprocessInProgress { id: id.to_string() });
        }
        Ok(Claim {
            in_flight: &self.in_flight,
            id,
        })
    }

    /// 重放单条死信，返回本次重放的尝试次数
    pub async fn reprocess(&self, id: Uuid) -> DispatchResult<u32> {
        let _claim = self.claim(id)?;

        let record = self
            .publisher
            .dead_letters()
            .fetch(id)
            .await?
            .ok_or_else(|| DispatchError::DeadLetterNotFound { id: id.to_string() })?;

        if record.is_reprocessed() {
            return Err(DispatchError::AlreadyReprocessed { id: id.to_string() });
        }

        let event: EventEnvelope<E> = EventEnvelope::try_from(record.event())?;
        let handler = self
            .publisher
            .registry()
            .handler_named(record.event_kind(), record.handler_name())
            .ok_or_else(|| {
                DispatchError::registration(format!(
                    "no handler '{}' subscribed to '{}'",
                    record.handler_name(),
                    record.event_kind()
                ))
            })?;

        let span = tracing::info_span!(
            "reprocess",
            dead_letter_id = %id,
            event_kind = %record.event_kind(),
            correlation_id = event.correlation_id().map(CorrelationId::as_str),
        );

        self.replay(id, &record, &event, handler.as_ref())
            .instrument(span)
            .await
    }

    async fn replay(
        &self,
        id: Uuid,
        record: &DeadLetterRecord,
        event: &EventEnvelope<E>,
        handler: &dyn EventHandler<E>,
    ) -> DispatchResult<u32> {
        let run = self.publisher.run_with_retry(handler, event);
        let state = match event.correlation_id() {
            Some(cid) => CorrelationScope::scope(cid.clone(), run).await,
            None => run.await,
        };

        match state {
            DeliveryState::Succeeded { attempts } => {
                self.publisher
                    .dead_letters()
                    .mark_reprocessed(id, Utc::now())
                    .await?;
                tracing::info!(
                    handler = record.handler_name(),
                    attempts,
                    "dead letter reprocessed"
                );
                Ok(attempts)
            }
            DeliveryState::Exhausted { last_error, .. } => Err(DispatchError::HandlerFailed {
                handler: record.handler_name().to_string(),
                reason: last_error,
            }),
            DeliveryState::Attempting(_) => Err(DispatchError::HandlerFailed {
                handler: record.handler_name().to_string(),
                reason: NON_TERMINAL.to_string(),
            }),
        }
    }

    /// 重放全部待处理死信，返回 (记录, 结果) 列表；单条失败不影响其余记录
    pub async fn reprocess_pending(
        &self,
    ) -> DispatchResult<Vec<(DeadLetterRecord, DispatchResult<u32>)>> {
        let pending = self.publisher.dead_letters().pending().await?;
        let mut results = Vec::with_capacity(pending.len());
        for record in pending {
            let outcome = self.reprocess(record.id()).await;
            if let Err(err) = &outcome {
                tracing::warn!(
                    dead_letter_id = %record.id(),
                    correlation_id = record.correlation_id().map(CorrelationId::as_str),
                    error = %err,
                    "dead letter reprocessing failed"
                );
            }
            results.push((record, outcome));
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_event::EventContext;
    use crate::eventing::{EventRegistryBuilder, HandledEventKinds, RetryPolicy};
    use crate::persist::{DeadLetterStore, InMemoryDeadLetterStore};
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Notify;
    use tracing::Subscriber;
    use tracing::field::{Field, Visit};
    use tracing::span::{Attributes, Id};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Refunded {
        amount: u64,
    }

    impl DomainEvent for Refunded {
        fn event_kind(&self) -> &str {
            "Refunded"
        }
    }

    /// 首次发布失败；重放时阻塞直到被放行
    struct Ledger {
        calls: AtomicU32,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl EventHandler<Refunded> for Ledger {
        fn handler_name(&self) -> &str {
            "ledger"
        }
        fn handled_event_kinds(&self) -> HandledEventKinds {
            HandledEventKinds::One("Refunded".into())
        }
        async fn handle(&self, _event: &EventEnvelope<Refunded>) -> anyhow::Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("ledger offline");
            }
            self.entered.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    fn ledger() -> Arc<Ledger> {
        Arc::new(Ledger {
            calls: AtomicU32::new(0),
            entered: Notify::new(),
            release: Notify::new(),
        })
    }

    fn publisher(
        ledger: Arc<Ledger>,
        store: Arc<InMemoryDeadLetterStore>,
    ) -> Arc<EventPublisher<Refunded>> {
        let mut builder = EventRegistryBuilder::new();
        builder.register(ledger).unwrap();
        Arc::new(
            EventPublisher::builder()
                .registry(Arc::new(builder.build()))
                .dead_letters(store)
                .policy(RetryPolicy::builder().max_attempts(1).build().unwrap())
                .build(),
        )
    }

    /// 记录名为 `reprocess` 的 span 的字段
    #[derive(Clone, Default)]
    struct ReprocessSpans(Arc<Mutex<Vec<(String, String)>>>);

    struct Fields<'a>(&'a mut Vec<(String, String)>);

    impl Visit for Fields<'_> {
        fn record_str(&mut self, field: &Field, value: &str) {
            self.0.push((field.name().to_string(), value.to_string()));
        }

        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.0.push((field.name().to_string(), format!("{value:?}")));
        }
    }

    impl<S: Subscriber> Layer<S> for ReprocessSpans {
        fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
            if attrs.metadata().name() == "reprocess" {
                attrs.record(&mut Fields(&mut self.0.lock().unwrap()));
            }
        }
    }

    #[tokio::test]
    async fn reprocess_span_carries_correlation_id() {
        let spans = ReprocessSpans::default();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(spans.clone()));

        let ledger = ledger();
        let store = Arc::new(InMemoryDeadLetterStore::new());
        let publisher = publisher(ledger.clone(), store.clone());

        let ctx = EventContext::builder()
            .correlation_id(CorrelationId::from("refund-7"))
            .build();
        publisher
            .publish(&EventEnvelope::new(Refunded { amount: 9 }, ctx))
            .await
            .unwrap();
        let id = store.all()[0].id();

        ledger.release.notify_one();
        let reprocessor = DeadLetterReprocessor::new(publisher);
        assert_eq!(reprocessor.reprocess(id).await.unwrap(), 1);

        let fields = spans.0.lock().unwrap();
        assert!(fields.contains(&("correlation_id".to_string(), "refund-7".to_string())));
        assert!(fields.contains(&("dead_letter_id".to_string(), id.to_string())));
        assert!(fields.contains(&("event_kind".to_string(), "Refunded".to_string())));
    }

    #[tokio::test]
    async fn concurrent_reprocess_of_same_record_is_rejected() {
        let ledger = ledger();
        let store = Arc::new(InMemoryDeadLetterStore::new());
        let publisher = publisher(ledger.clone(), store.clone());

        let event = EventEnvelope::new(Refunded { amount: 5 }, EventContext::default());
        publisher.publish(&event).await.unwrap();
        let id = store.all()[0].id();

        let reprocessor = Arc::new(DeadLetterReprocessor::new(publisher));
        let first = tokio::spawn({
            let reprocessor = reprocessor.clone();
            async move { reprocessor.reprocess(id).await }
        });

        ledger.entered.notified().await;
        let second = reprocessor.reprocess(id).await.unwrap_err();
        assert!(matches!(second, DispatchError::ReprocessInProgress { .. }));

        ledger.release.notify_one();
        assert_eq!(first.await.unwrap().unwrap(), 1);
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 2);
        assert!(store.fetch(id).await.unwrap().unwrap().is_reprocessed());

        // 占用已释放：再次重放得到“已重放”而不是“进行中”
        let third = reprocessor.reprocess(id).await.unwrap_err();
        assert!(matches!(third, DispatchError::AlreadyReprocessed { .. }));
    }
}
