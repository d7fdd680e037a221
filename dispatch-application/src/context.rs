use dispatch_domain::correlation::{CorrelationId, CorrelationScope};
use dispatch_domain::domain_event::EventContext;
use std::future::Future;

/// 应用层上下文（Application Context）
///
/// 承载一次应用层调用所需的横切信息，例如：
/// - 关联标识（`correlation_id`）：同一次外部请求/操作内产生的全部事件共享此标识；
/// - 因果链 `causation_id`、执行者类型/ID；
/// - 幂等键（`idempotency_key`）：用于在基础设施层实现请求幂等（如 API 层重复提交保护）。
///
/// 典型用法：
/// ```rust
/// use dispatch_application::context::AppContext;
///
/// let ctx = AppContext {
///     correlation_id: "cor-123".into(),
///     causation_id: Some("cau-abc".into()),
///     actor_type: Some("user".into()),
///     actor_id: Some("u-1".into()),
///     idempotency_key: Some("idem-xyz".into()),
/// };
/// assert_eq!(ctx.event_context().correlation_id().map(|c| c.as_str()), Some("cor-123"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct AppContext {
    /// 关联标识；`Default` 会生成一个新的标识
    pub correlation_id: CorrelationId,
    pub causation_id: Option<String>,
    pub actor_type: Option<String>,
    pub actor_id: Option<String>,
    /// 幂等键（可选）：为空则由上层或基础设施决定是否参与幂等
    pub idempotency_key: Option<String>,
}

impl AppContext {
    /// 以给定关联标识构造上下文（通常来自入站请求头）
    pub fn with_correlation(correlation_id: impl Into<CorrelationId>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            ..Self::default()
        }
    }

    /// 构造事件上下文，显式携带本次调用的关联标识与触发主体
    pub fn event_context(&self) -> EventContext {
        EventContext::builder()
            .correlation_id(self.correlation_id.clone())
            .maybe_causation_id(self.causation_id.clone())
            .maybe_actor_type(self.actor_type.clone())
            .maybe_actor_id(self.actor_id.clone())
            .build()
    }

    /// 在本上下文的关联作用域内执行 `fut`
    pub async fn scope<F>(&self, fut: F) -> F::Output
    where
        F: Future,
    {
        CorrelationScope::scope(self.correlation_id.clone(), fut).await
    }
}
