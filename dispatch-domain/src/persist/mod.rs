//! 持久化（persist）
//!
//! 事件的持久化形态（`SerializedEvent`）与死信存储协议（`DeadLetterStore`）。
//! 具体存储后端（如 Postgres）由上层提供实现并注入；`InMemoryDeadLetterStore`
//! 用于测试与本地开发。
//!
mod dead_letter;
mod serialized_event;

pub use dead_letter::{DeadLetterRecord, DeadLetterStore, InMemoryDeadLetterStore};
pub use serialized_event::SerializedEvent;
