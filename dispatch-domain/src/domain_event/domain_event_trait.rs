use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

/// 领域事件载荷需要满足的通用能力边界
///
/// 事件表示“已经发生的事实”，构造后不可变；分发时处理器仅获得只读引用。
pub trait DomainEvent:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// 事件种类（订阅路由的判别值，形如 `OrderPlaced` 或 `OrderEvent.Placed`）
    fn event_kind(&self) -> &str;

    /// 事件载荷版本
    fn event_version(&self) -> usize {
        1
    }
}
