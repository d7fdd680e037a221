//! 领域事件分发基础库（dispatch-domain）
//!
//! 提供进程内、以工作单元提交为闸门的领域事件分发：
//! - 领域事件（`domain_event`）：事件载荷接口与不可变信封；
//! - 关联标识（`correlation`）：一次操作内的关联标识及其 task-local 作用域；
//! - 事件分发（`eventing`）：订阅注册表、发布器、重试/死信策略、提交后发布与任务转交；
//! - 持久化（`persist`）：事件的序列化形态与死信存储协议。
//!
//! 本 crate 不绑定任何存储或传输实现，死信存储与工作单元边界均以 trait 形式定义，
//! 以便在不同基础设施上进行适配。
//!
//! 典型用法：
//! 1. 启动时构造 `EventRegistryBuilder`，按固定顺序完成全部订阅后 `build()`；
//! 2. 以注册表与死信存储构造 `EventPublisher`，并注入到需要发布事件的代码；
//! 3. 业务操作在持久化状态变化时构造 `EventEnvelope`，通过 `publish_on_commit`
//!    挂到工作单元上，提交成功后才真正发布。
//!
pub mod correlation;
pub mod domain_event;
pub mod error;
pub mod eventing;
pub mod persist;

// 允许在本 crate 内部通过 ::dispatch_domain 进行自引用，
// 以便过程宏在本 crate 的单元测试中也能解析到 ::dispatch_domain 路径。
extern crate self as dispatch_domain;
