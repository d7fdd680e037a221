//! 工作单元边界（UnitOfWork）与提交后发布
//!
//! 发布是可观测的（处理器可能查询共享存储），因此事件只能在产生它的工作单元
//! 成功提交之后发布。工作单元需要提供“仅在成功完成时执行回调”的原语；
//! 回调在提交时按注册顺序各执行一次，回滚或未提交即丢弃时一次也不执行。
//!
use super::publisher::EventPublisher;
use crate::domain_event::{DomainEvent, EventEnvelope};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::sync::{Arc, Mutex, PoisonError};

/// 提交成功后执行的回调
pub type CompletionCallback = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// 外部事务/工作单元边界
pub trait UnitOfWork: Send + Sync {
    /// 注册回调：当且仅当工作单元成功完成时执行一次
    fn on_successful_completion(&self, callback: CompletionCallback);
}

/// 内存版工作单元
///
/// `commit` 依次执行全部回调；`rollback` 或直接丢弃时回调不会执行。
#[derive(Default)]
pub struct TransactionScope {
    callbacks: Mutex<Vec<CompletionCallback>>,
}

impl TransactionScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已注册、尚未执行的回调数量
    pub fn pending(&self) -> usize {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// 提交：按注册顺序执行回调
    pub async fn commit(mut self) {
        let callbacks = self.take_callbacks();
        tracing::debug!(callbacks = callbacks.len(), "unit of work committed");

        for callback in callbacks {
            callback().await;
        }
    }

    /// 回滚：丢弃全部回调
    pub fn rollback(mut self) {
        let discarded = self.take_callbacks().len();
        tracing::debug!(discarded, "unit of work rolled back");
    }

    fn take_callbacks(&mut self) -> Vec<CompletionCallback> {
        std::mem::take(
            self.callbacks
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }
}

impl UnitOfWork for TransactionScope {
    fn on_successful_completion(&self, callback: CompletionCallback) {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        let discarded = self.take_callbacks().len();
        if discarded > 0 {
            tracing::debug!(discarded, "unit of work dropped without commit");
        }
    }
}

/// 在工作单元提交后发布事件
///
/// 事件在调用前已构造完毕，按值移入回调，提交前发生的任何状态变化都不会影响它。
pub fn publish_on_commit<U, E>(
    uow: &U,
    publisher: Arc<EventPublisher<E>>,
    event: EventEnvelope<E>,
) where
    U: UnitOfWork + ?Sized,
    E: DomainEvent,
{
    uow.on_successful_completion(Box::new(move || {
        async move {
            if let Err(err) = publisher.publish(&event).await {
                tracing::error!(
                    event_id = %event.event_id(),
                    error = %err,
                    "deferred publish rejected event"
                );
            }
        }
        .boxed()
    }));
}
