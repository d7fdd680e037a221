use async_trait::async_trait;
use dispatch_application::command::Command;
use dispatch_application::command_bus::CommandBus;
use dispatch_application::command_handler::CommandHandler;
use dispatch_application::{AppContext, AppError, DispatchBootstrap, DispatchConfig, InMemoryCommandBus};
use dispatch_domain::correlation::CorrelationId;
use dispatch_domain::domain_event::EventEnvelope;
use dispatch_domain::eventing::{
    EventHandler, EventPublisher, HandledEventKinds, UnitOfWork, publish_on_commit,
};
use dispatch_domain::persist::InMemoryDeadLetterStore;
use dispatch_macros::domain_event;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[domain_event]
enum OrderEvent {
    #[event(kind = "OrderPlaced")]
    Placed { order_id: String, amount: u64 },
}

struct PlaceOrder {
    order_id: String,
    amount: u64,
}

impl Command for PlaceOrder {
    const NAME: &'static str = "PlaceOrder";
}

/// 内存“数据库”：只有提交的命令才写入
#[derive(Default)]
struct Orders {
    rows: Mutex<HashMap<String, u64>>,
}

struct PlaceOrderHandler {
    orders: Arc<Orders>,
    publisher: Arc<EventPublisher<OrderEvent>>,
}

#[async_trait]
impl CommandHandler<PlaceOrder> for PlaceOrderHandler {
    async fn handle(
        &self,
        ctx: &AppContext,
        uow: &dyn UnitOfWork,
        cmd: PlaceOrder,
    ) -> Result<(), AppError> {
        if cmd.amount == 0 {
            return Err(AppError::Validation("amount must be positive".into()));
        }

        let event = EventEnvelope::new(
            OrderEvent::Placed {
                order_id: cmd.order_id.clone(),
                amount: cmd.amount,
            },
            ctx.event_context(),
        );
        publish_on_commit(uow, self.publisher.clone(), event);

        self.orders
            .rows
            .lock()
            .unwrap()
            .insert(cmd.order_id, cmd.amount);
        Ok(())
    }
}

/// 读取共享状态的投影处理器：发布时订单必须已可见
struct Receipt {
    orders: Arc<Orders>,
    seen: Mutex<Vec<(String, Option<u64>, Option<CorrelationId>)>>,
}

#[async_trait]
impl EventHandler<OrderEvent> for Receipt {
    fn handler_name(&self) -> &str {
        "receipt"
    }

    fn handled_event_kinds(&self) -> HandledEventKinds {
        HandledEventKinds::One("OrderPlaced".into())
    }

    async fn handle(&self, event: &EventEnvelope<OrderEvent>) -> anyhow::Result<()> {
        let OrderEvent::Placed { order_id, .. } = event.payload();
        let stored = self.orders.rows.lock().unwrap().get(order_id).copied();
        self.seen.lock().unwrap().push((
            order_id.clone(),
            stored,
            event.correlation_id().cloned(),
        ));
        Ok(())
    }
}

struct Fixture {
    bus: InMemoryCommandBus,
    receipt: Arc<Receipt>,
    dead_letters: Arc<InMemoryDeadLetterStore>,
}

fn fixture() -> Fixture {
    let orders = Arc::new(Orders::default());
    let receipt = Arc::new(Receipt {
        orders: orders.clone(),
        seen: Mutex::new(Vec::new()),
    });
    let dead_letters = Arc::new(InMemoryDeadLetterStore::new());

    let runtime = DispatchBootstrap::<OrderEvent>::new(DispatchConfig::default())
        .handler(receipt.clone())
        .unwrap()
        .start(dead_letters.clone())
        .unwrap();

    let bus = InMemoryCommandBus::new();
    bus.register::<PlaceOrder, _>(Arc::new(PlaceOrderHandler {
        orders,
        publisher: runtime.publisher(),
    }))
    .unwrap();

    Fixture {
        bus,
        receipt,
        dead_letters,
    }
}

#[tokio::test]
async fn committed_command_publishes_after_state_is_visible() {
    let f = fixture();
    let ctx = AppContext::with_correlation("req-100");

    f.bus
        .dispatch(
            &ctx,
            PlaceOrder {
                order_id: "o-1".into(),
                amount: 30,
            },
        )
        .await
        .unwrap();

    let seen = f.receipt.seen.lock().unwrap();
    assert_eq!(
        seen.as_slice(),
        &[(
            "o-1".to_string(),
            Some(30),
            Some(CorrelationId::from("req-100"))
        )]
    );
    assert!(f.dead_letters.is_empty());
}

#[tokio::test]
async fn failed_command_publishes_nothing() {
    let f = fixture();

    let err = f
        .bus
        .dispatch(
            &AppContext::default(),
            PlaceOrder {
                order_id: "o-2".into(),
                amount: 0,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    assert!(f.receipt.seen.lock().unwrap().is_empty());
    assert!(f.dead_letters.is_empty());
}

#[tokio::test]
async fn each_command_keeps_its_own_correlation() {
    let f = fixture();

    for (i, order) in ["o-a", "o-b"].iter().enumerate() {
        let ctx = AppContext::with_correlation(format!("req-{i}"));
        f.bus
            .dispatch(
                &ctx,
                PlaceOrder {
                    order_id: order.to_string(),
                    amount: 1,
                },
            )
            .await
            .unwrap();
    }

    let seen = f.receipt.seen.lock().unwrap();
    let correlations: Vec<_> = seen.iter().map(|(_, _, c)| c.clone()).collect();
    assert_eq!(
        correlations,
        vec![
            Some(CorrelationId::from("req-0")),
            Some(CorrelationId::from("req-1"))
        ]
    );
}
