//! 启动编排（DispatchBootstrap）
//!
//! 启动阶段按固定顺序完成：加载配置 → 启动任务转交工作者（可选）→ 注册处理器 →
//! `start` 一次性构造注册表、重试策略、发布器与死信重放器。
//! `start` 消费 bootstrap，之后不存在任何注册入口。
//!
use crate::config::DispatchConfig;
use crate::error::AppError;
use dispatch_domain::domain_event::DomainEvent;
use dispatch_domain::eventing::{
    DeadLetterReprocessor, EventHandler, EventPublisher, EventRegistry, EventRegistryBuilder,
    QueuedTaskRunner, RunnerHandle, TaskExecutor, TaskRunner,
};
use dispatch_domain::persist::DeadLetterStore;
use std::sync::Arc;

pub struct DispatchBootstrap<E>
where
    E: DomainEvent,
{
    config: DispatchConfig,
    registry: EventRegistryBuilder<E>,
    tasks: Option<(QueuedTaskRunner, RunnerHandle)>,
}

impl<E> DispatchBootstrap<E>
where
    E: DomainEvent,
{
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            config,
            registry: EventRegistry::builder(),
            tasks: None,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// 启动任务转交工作者（需在 tokio 运行时内调用）
    pub fn with_task_executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        if let Some((_, handle)) = self.tasks.take() {
            handle.shutdown();
        }
        self.tasks = Some(QueuedTaskRunner::start(
            self.config.task_queue_capacity,
            executor,
        ));
        self
    }

    /// 供 `DeferredHandler` 使用的入队端
    pub fn task_runner(&self) -> Option<Arc<dyn TaskRunner>> {
        self.tasks
            .as_ref()
            .map(|(runner, _)| Arc::new(runner.clone()) as Arc<dyn TaskRunner>)
    }

    /// 按处理器声明的种类注册
    pub fn handler(mut self, handler: Arc<dyn EventHandler<E>>) -> Result<Self, AppError> {
        self.registry.register(handler)?;
        Ok(self)
    }

    /// 显式订阅到某一种类
    pub fn subscribe(
        mut self,
        kind: impl Into<String>,
        handler: Arc<dyn EventHandler<E>>,
    ) -> Result<Self, AppError> {
        self.registry.subscribe(kind, handler)?;
        Ok(self)
    }

    /// 结束注册阶段并构造运行期组件
    pub fn start(
        self,
        dead_letters: Arc<dyn DeadLetterStore>,
    ) -> Result<DispatchRuntime<E>, AppError> {
        let policy = self.config.retry_policy()?;
        let registry = Arc::new(self.registry.build());

        tracing::info!(
            subscriptions = registry.len(),
            max_attempts = policy.max_attempts(),
            dead_letter_attempts = self.config.dead_letter_attempts,
            task_runner = self.tasks.is_some(),
            "event dispatch started"
        );

        let publisher = Arc::new(
            EventPublisher::builder()
                .registry(registry)
                .dead_letters(dead_letters)
                .policy(policy)
                .dead_letter_attempts(self.config.dead_letter_attempts)
                .build(),
        );

        Ok(DispatchRuntime {
            reprocessor: DeadLetterReprocessor::new(publisher.clone()),
            publisher,
            tasks: self.tasks,
        })
    }
}

/// 运行期组件集合
pub struct DispatchRuntime<E>
where
    E: DomainEvent,
{
    publisher: Arc<EventPublisher<E>>,
    reprocessor: DeadLetterReprocessor<E>,
    tasks: Option<(QueuedTaskRunner, RunnerHandle)>,
}

impl<E> DispatchRuntime<E>
where
    E: DomainEvent,
{
    pub fn publisher(&self) -> Arc<EventPublisher<E>> {
        self.publisher.clone()
    }

    pub fn reprocessor(&self) -> &DeadLetterReprocessor<E> {
        &self.reprocessor
    }

    /// 关闭任务转交工作者，等待已入队任务执行完毕
    pub async fn shutdown(self) {
        if let Some((runner, handle)) = self.tasks {
            drop(runner);
            handle.shutdown();
            handle.join().await;
        }
        tracing::info!("event dispatch stopped");
    }
}
