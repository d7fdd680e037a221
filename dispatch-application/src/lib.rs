//! 应用层（dispatch-application）
//!
//! 在领域事件分发之上提供应用服务的外壳：
//! - `AppContext`：一次调用的关联标识、执行者与幂等键；
//! - `CommandBus` / `InMemoryCommandBus`：每个命令一个工作单元，成功提交后才发布事件；
//! - `DispatchConfig`：分发配置的加载与校验；
//! - `DispatchBootstrap`：启动期注册与运行期组件构造；
//! - `telemetry`：tracing subscriber 初始化。
//!
pub mod bootstrap;
pub mod command;
pub mod command_bus;
pub mod command_handler;
pub mod config;
pub mod context;
pub mod error;
pub mod inmemory_command_bus;
pub mod telemetry;

pub use bootstrap::{DispatchBootstrap, DispatchRuntime};
pub use config::{BackoffConfig, DispatchConfig};
pub use context::AppContext;
pub use error::AppError;
pub use inmemory_command_bus::InMemoryCommandBus;
