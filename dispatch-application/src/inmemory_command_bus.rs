use crate::{
    command::Command, command_bus::CommandBus, command_handler::CommandHandler,
    context::AppContext, error::AppError,
};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use dispatch_domain::eventing::{TransactionScope, UnitOfWork};
use std::any::{Any, TypeId};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type CmdHandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;

type CmdHandlerFn = Arc<
    dyn for<'a> Fn(Box<dyn Any + Send>, &'a AppContext, &'a dyn UnitOfWork) -> CmdHandlerFuture<'a>
        + Send
        + Sync,
>;

/// 基于内存的 CommandBus 实现
/// - 通过 TypeId 注册不同 Command 对应的 Handler
/// - 运行时以类型擦除（Any）方式进行调度
/// - 每次分发开启一个 `TransactionScope`：成功提交，失败回滚
pub struct InMemoryCommandBus {
    handlers: DashMap<TypeId, CmdHandlerFn>,
}

impl Default for InMemoryCommandBus {
    fn default() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }
}

impl InMemoryCommandBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册命令处理器；同一命令重复注册返回错误
    pub fn register<C, H>(&self, handler: Arc<H>) -> Result<(), AppError>
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        let f: CmdHandlerFn = Arc::new(move |boxed_cmd, ctx, uow| {
            let handler = handler.clone();

            Box::pin(async move {
                // 正常情况下这里的 downcast 永远不会失败（键与闭包同一泛型 C）
                match boxed_cmd.downcast::<C>() {
                    Ok(cmd) => handler.handle(ctx, uow, *cmd).await,
                    Err(_) => Err(AppError::TypeMismatch {
                        expected: C::NAME,
                        found: "unknown",
                    }),
                }
            })
        });

        match self.handlers.entry(TypeId::of::<C>()) {
            Entry::Occupied(_) => Err(AppError::AlreadyRegisteredCommand { command: C::NAME }),
            Entry::Vacant(slot) => {
                slot.insert(f);
                Ok(())
            }
        }
    }

    /// 已注册的命令数量
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[async_trait]
impl CommandBus for InMemoryCommandBus {
    async fn dispatch<C: Command>(&self, ctx: &AppContext, cmd: C) -> Result<(), AppError> {
        let Some(f) = self.handlers.get(&TypeId::of::<C>()).map(|h| h.clone()) else {
            return Err(AppError::HandlerNotFound(C::NAME));
        };

        let uow = TransactionScope::new();
        let scope: &dyn UnitOfWork = &uow;
        let result = ctx.scope((f)(Box::new(cmd), ctx, scope)).await;

        match result {
            Ok(()) => {
                let deferred = uow.pending();
                ctx.scope(uow.commit()).await;
                tracing::debug!(
                    command = C::NAME,
                    correlation_id = %ctx.correlation_id,
                    deferred,
                    "command committed"
                );
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    command = C::NAME,
                    correlation_id = %ctx.correlation_id,
                    discarded = uow.pending(),
                    error = %err,
                    "command failed, unit of work rolled back"
                );
                uow.rollback();
                Err(err)
            }
        }
    }
}
