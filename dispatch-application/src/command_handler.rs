use crate::{command::Command, context::AppContext, error::AppError};
use async_trait::async_trait;
use dispatch_domain::eventing::UnitOfWork;

/// 命令处理器
///
/// `uow` 是本次命令所在的工作单元；需要对外发布的事件应通过
/// [`publish_on_commit`](dispatch_domain::eventing::publish_on_commit) 挂到其上。
#[async_trait]
pub trait CommandHandler<C>: Send + Sync
where
    C: Command,
{
    async fn handle(&self, ctx: &AppContext, uow: &dyn UnitOfWork, cmd: C) -> Result<(), AppError>;
}
