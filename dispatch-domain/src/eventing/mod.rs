//! 事件分发子系统（eventing）
//!
//! 提供进程内事件分发的协议与实现：
//! - `EventHandler`：对某类/多类/全部事件进行处理；
//! - `EventRegistryBuilder` / `EventRegistry`：启动期注册、运行期只读的订阅表；
//! - `EventPublisher`：按注册顺序逐个投递，套用 `RetryPolicy`，耗尽后写入死信；
//! - `UnitOfWork` / `publish_on_commit`：仅在工作单元成功提交后发布；
//! - `DeadLetterReprocessor`：死信补偿重放；
//! - `TaskRunner` / `DeferredHandler`：把慢速工作转交给独立工作者。
//!
pub mod handler;
pub mod publisher;
pub mod registry;
pub mod reprocessor;
pub mod retry;
pub mod task_runner;
pub mod unit_of_work;

pub use handler::{EventHandler, HandledEventKinds};
pub use publisher::{DeliveryOutcome, EventPublisher, HandlerDelivery, PublishReport};
pub use registry::{EventRegistry, EventRegistryBuilder};
pub use reprocessor::DeadLetterReprocessor;
pub use retry::{Backoff, DeliveryState, RetryPolicy};
pub use task_runner::{
    DeferredHandler, QueuedTaskRunner, RunnerHandle, TaskDescriptor, TaskExecutor, TaskRunner,
};
pub use unit_of_work::{CompletionCallback, TransactionScope, UnitOfWork, publish_on_commit};
