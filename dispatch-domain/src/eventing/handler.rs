//! 事件处理器（EventHandler）
//!
//! 定义消费某类/多类/全部事件的处理逻辑与元信息（名称、声明的事件种类）。
//!
use crate::domain_event::{DomainEvent, EventEnvelope};
use async_trait::async_trait;

/// 处理器声明可订阅的事件种类
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandledEventKinds {
    One(String),
    Many(Vec<String>),
    All,
}

impl HandledEventKinds {
    /// 该声明是否允许订阅 `kind`
    pub fn permits(&self, kind: &str) -> bool {
        match self {
            HandledEventKinds::One(k) => k == kind,
            HandledEventKinds::Many(ks) => ks.iter().any(|k| k == kind),
            HandledEventKinds::All => true,
        }
    }
}

/// 事件处理器：处理某一类型的事件
///
/// 处理器在发布方的任务上按顺序被等待执行；耗时的工作应转交给
/// `TaskRunner`（见 [`DeferredHandler`](super::DeferredHandler)），避免阻塞后续处理器。
#[async_trait]
pub trait EventHandler<E>: Send + Sync
where
    E: DomainEvent,
{
    /// 处理器名称（用于死信记录与审计，同一事件种类下需唯一）
    fn handler_name(&self) -> &str;
    /// 返回该处理器支持的事件种类
    fn handled_event_kinds(&self) -> HandledEventKinds;
    /// 处理事件
    async fn handle(&self, event: &EventEnvelope<E>) -> anyhow::Result<()>;
}
