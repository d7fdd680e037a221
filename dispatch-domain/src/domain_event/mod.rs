//! 领域事件（Domain Event）
//!
//! 定义事件载荷需要实现的最小接口（`DomainEvent`），以及将事件与元数据/上下文
//! 封装后的不可变 `EventEnvelope`。

mod domain_event_trait;
mod event_context;
mod event_envelope;
mod metadata;

pub use domain_event_trait::DomainEvent;
pub use event_context::EventContext;
pub use event_envelope::EventEnvelope;
pub use metadata::Metadata;

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_macros::domain_event;

    #[domain_event]
    enum AccountEvent {
        #[event(kind = "AccountOpened")]
        Opened { account_id: String },
        Closed { account_id: String },
    }

    #[test]
    fn envelope_routes_by_variant_kind() {
        let opened = EventEnvelope::new(
            AccountEvent::Opened {
                account_id: "a-1".into(),
            },
            EventContext::default(),
        );
        let closed = EventEnvelope::new(
            AccountEvent::Closed {
                account_id: "a-1".into(),
            },
            EventContext::default(),
        );

        assert_eq!(opened.event_kind(), "AccountOpened");
        assert_eq!(closed.event_kind(), "AccountEvent.Closed");
        assert_eq!(opened.metadata().event_kind(), "AccountOpened");
        assert_eq!(closed.payload().event_version(), 1);
    }
}
