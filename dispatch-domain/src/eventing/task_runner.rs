//! 任务转交（TaskRunner）
//!
//! 处理器在发布方任务上顺序执行，慢处理器会拖慢其后的所有处理器。
//! 需要调用慢速外部服务的处理器应把工作描述为 `TaskDescriptor` 交给 `TaskRunner`，
//! 由独立的异步工作者执行：
//! - `TaskRunner`：入队协议；
//! - `QueuedTaskRunner`：基于有界 mpsc 通道与后台工作者的内存实现；
//! - `DeferredHandler`：把事件映射为任务并入队的处理器适配器。
//!
use super::handler::{EventHandler, HandledEventKinds};
use super::publisher::panic_message;
use crate::correlation::{CorrelationId, CorrelationScope};
use crate::domain_event::{DomainEvent, EventEnvelope};
use crate::error::{DispatchError, DispatchResult};
use crate::persist::SerializedEvent;
use async_trait::async_trait;
use bon::Builder;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 待执行任务的描述
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct TaskDescriptor {
    #[builder(into)]
    name: String,
    payload: Value,
    correlation_id: Option<CorrelationId>,
    #[builder(default = Utc::now())]
    enqueued_at: DateTime<Utc>,
}

impl TaskDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }

    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }
}

/// 任务入队协议
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn enqueue(&self, task: TaskDescriptor) -> DispatchResult<()>;
}

/// 任务执行者
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: TaskDescriptor) -> anyhow::Result<()>;
}

/// 有界队列 + 单个后台工作者
#[derive(Clone)]
pub struct QueuedTaskRunner {
    tx: mpsc::Sender<TaskDescriptor>,
}

impl QueuedTaskRunner {
    /// 启动后台工作者，返回入队端与运行句柄
    pub fn start(capacity: usize, executor: Arc<dyn TaskExecutor>) -> (Self, RunnerHandle) {
        let (tx, mut rx) = mpsc::channel::<TaskDescriptor>(capacity.max(1));
        let token = CancellationToken::new();
        let worker_token = token.clone();

        let worker = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = worker_token.cancelled() => {
                        // 停止接收新任务，执行完已入队的任务后退出
                        rx.close();
                        while let Some(task) = rx.recv().await {
                            Self::run(executor.as_ref(), task).await;
                        }
                        break;
                    }
                    maybe_task = rx.recv() => {
                        match maybe_task {
                            Some(task) => Self::run(executor.as_ref(), task).await,
                            None => break,
                        }
                    }
                }
            }
        });

        (
            Self { tx },
            RunnerHandle {
                token,
                worker: Some(worker),
            },
        )
    }

    async fn run(executor: &dyn TaskExecutor, task: TaskDescriptor) {
        let name = task.name.clone();
        let correlation_id = task.correlation_id.clone();

        let execution = AssertUnwindSafe(executor.execute(task)).catch_unwind();
        let outcome = match correlation_id.clone() {
            Some(cid) => CorrelationScope::scope(cid, execution).await,
            None => execution.await,
        };

        let error = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => format!("{err:#}"),
            Err(panic) => format!("task panicked: {}", panic_message(panic.as_ref())),
        };
        tracing::error!(
            task = %name,
            correlation_id = correlation_id.as_ref().map(CorrelationId::as_str),
            error = %error,
            "deferred task failed"
        );
    }
}

#[async_trait]
impl TaskRunner for QueuedTaskRunner {
    async fn enqueue(&self, task: TaskDescriptor) -> DispatchResult<()> {
        self.tx
            .send(task)
            .await
            .map_err(|_| DispatchError::task_runner("task runner is shut down"))
    }
}

/// 运行句柄：用于优雅关闭与等待工作者结束
pub struct RunnerHandle {
    token: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl RunnerHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub async fn join(mut self) {
        if let Some(worker) = self.worker.take() {
            if let Err(err) = worker.await {
                tracing::error!(error = %err, "task runner worker terminated abnormally");
            }
        }
    }
}

impl Drop for RunnerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

type TaskMapper<E> =
    Arc<dyn Fn(&EventEnvelope<E>) -> DispatchResult<TaskDescriptor> + Send + Sync>;

/// 把事件转交给 `TaskRunner` 的处理器
///
/// 默认映射：任务名为处理器名，载荷为序列化后的事件（`SerializedEvent`），
/// 并携带事件的关联标识。
pub struct DeferredHandler<E>
where
    E: DomainEvent,
{
    name: String,
    kinds: HandledEventKinds,
    runner: Arc<dyn TaskRunner>,
    mapper: TaskMapper<E>,
}

impl<E> DeferredHandler<E>
where
    E: DomainEvent,
{
    pub fn new(
        name: impl Into<String>,
        kinds: HandledEventKinds,
        runner: Arc<dyn TaskRunner>,
    ) -> Self {
        let name = name.into();
        let task_name = name.clone();
        let mapper: TaskMapper<E> = Arc::new(move |event: &EventEnvelope<E>| {
            let serialized = SerializedEvent::try_from(event)?;
            Ok(TaskDescriptor::builder()
                .name(task_name.clone())
                .payload(serde_json::to_value(serialized)?)
                .maybe_correlation_id(event.correlation_id().cloned())
                .build())
        });

        Self {
            name,
            kinds,
            runner,
            mapper,
        }
    }

    /// 自定义事件到任务的映射
    pub fn with_mapper<F>(mut self, mapper: F) -> Self
    where
        F: Fn(&EventEnvelope<E>) -> DispatchResult<TaskDescriptor> + Send + Sync + 'static,
    {
        self.mapper = Arc::new(mapper);
        self
    }
}

#[async_trait]
impl<E> EventHandler<E> for DeferredHandler<E>
where
    E: DomainEvent,
{
    fn handler_name(&self) -> &str {
        &self.name
    }

    fn handled_event_kinds(&self) -> HandledEventKinds {
        self.kinds.clone()
    }

    async fn handle(&self, event: &EventEnvelope<E>) -> anyhow::Result<()> {
        let task = (self.mapper)(event)?;
        self.runner.enqueue(task).await?;
        Ok(())
    }
}
