use crate::correlation::CorrelationId;
use bon::Builder;
use serde::{Deserialize, Serialize};

/// 事件上下文：关联/因果链与触发主体
#[derive(Builder, Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
    /// 关联ID
    correlation_id: Option<CorrelationId>,
    /// 因果ID
    #[builder(into)]
    causation_id: Option<String>,
    /// 触发事件的主体类型（如用户、系统等）
    #[builder(into)]
    actor_type: Option<String>,
    /// 触发事件的主体ID
    #[builder(into)]
    actor_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    extensions: Option<serde_json::Value>,
}

impl EventContext {
    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }

    pub fn causation_id(&self) -> Option<&str> {
        self.causation_id.as_deref()
    }

    pub fn actor_type(&self) -> Option<&str> {
        self.actor_type.as_deref()
    }

    pub fn actor_id(&self) -> Option<&str> {
        self.actor_id.as_deref()
    }

    pub fn extensions(&self) -> Option<&serde_json::Value> {
        self.extensions.as_ref()
    }

    pub(crate) fn stamp_correlation(&mut self, id: CorrelationId) {
        self.correlation_id = Some(id);
    }
}
