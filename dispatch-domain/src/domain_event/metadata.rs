use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 元数据
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[builder(into)]
    event_id: String,
    #[builder(into)]
    event_kind: String,
    occurred_at: DateTime<Utc>,
}

impl Metadata {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn event_kind(&self) -> &str {
        &self.event_kind
    }

    pub fn occurred_at(&self) -> &DateTime<Utc> {
        &self.occurred_at
    }
}
