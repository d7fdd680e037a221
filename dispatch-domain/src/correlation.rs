//! 关联标识（Correlation）
//!
//! `CorrelationId` 在一次请求/操作中只生成一次，随后传播到其产生的事件、
//! 处理器日志与死信记录中，用于事后串联同一源头的全部副作用。
//!
//! 当前活动的关联标识通过 tokio 的 task-local 作用域承载：
//! 在 `CorrelationScope::scope` 内构造的事件会自动盖上该标识。
//!
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;

tokio::task_local! {
    static CURRENT_CORRELATION: CorrelationId;
}

/// 不透明的关联标识
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// 生成新的关联标识（UUID v4）
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CorrelationId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// 关联标识作用域
pub struct CorrelationScope;

impl CorrelationScope {
    /// 在给定关联标识的作用域内执行 future
    pub async fn scope<F>(id: CorrelationId, fut: F) -> F::Output
    where
        F: Future,
    {
        CURRENT_CORRELATION.scope(id, fut).await
    }

    /// 同步版本，用于非异步的构造代码
    pub fn sync_scope<R>(id: CorrelationId, f: impl FnOnce() -> R) -> R {
        CURRENT_CORRELATION.sync_scope(id, f)
    }

    /// 当前活动的关联标识；不在任何作用域内时返回 `None`
    pub fn current() -> Option<CorrelationId> {
        CURRENT_CORRELATION.try_with(|id| id.clone()).ok()
    }
}
