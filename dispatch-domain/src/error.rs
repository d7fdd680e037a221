//! 事件分发统一错误定义
//!
//! 覆盖事件校验、订阅注册、处理器失败、死信持久化、任务转交与配置校验，
//! 便于上层（应用层）统一转换为自身错误类型。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DispatchError {
    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    // --- 事件与订阅 ---
    #[error("invalid event: {reason}")]
    InvalidEvent { reason: String },
    #[error("registration error: {reason}")]
    Registration { reason: String },
    #[error("handler already subscribed: kind={kind}, handler={handler}")]
    DuplicateHandler { kind: String, handler: String },

    // --- 处理器 ---
    #[error("event handler error: handler={handler}, reason={reason}")]
    HandlerFailed { handler: String, reason: String },
    #[error("event handler timed out: handler={handler}, timeout_ms={timeout_ms}")]
    HandlerTimeout { handler: String, timeout_ms: u128 },

    // --- 死信 ---
    #[error("dead letter persistence error: {reason}")]
    DeadLetterPersistence { reason: String },
    #[error("dead letter not found: {id}")]
    DeadLetterNotFound { id: String },
    #[error("dead letter already reprocessed: {id}")]
    AlreadyReprocessed { id: String },
    #[error("dead letter is being reprocessed: {id}")]
    ReprocessInProgress { id: String },

    // --- 任务转交 ---
    #[error("task runner error: {reason}")]
    TaskRunner { reason: String },

    // --- 配置 ---
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },
}

impl DispatchError {
    pub fn registration(reason: impl Into<String>) -> Self {
        DispatchError::Registration {
            reason: reason.into(),
        }
    }

    pub fn dead_letter(reason: impl Into<String>) -> Self {
        DispatchError::DeadLetterPersistence {
            reason: reason.into(),
        }
    }

    pub fn task_runner(reason: impl Into<String>) -> Self {
        DispatchError::TaskRunner {
            reason: reason.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        DispatchError::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// 统一 Result 类型别名
pub type DispatchResult<T> = Result<T, DispatchError>;

impl From<uuid::Error> for DispatchError {
    fn from(err: uuid::Error) -> Self {
        DispatchError::InvalidEvent {
            reason: err.to_string(),
        }
    }
}
