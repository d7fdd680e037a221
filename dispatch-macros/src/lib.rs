use proc_macro::TokenStream;

mod derives;
mod domain_event;

/// 领域事件宏
///
/// 为事件枚举或结构体生成 `::dispatch_domain::domain_event::DomainEvent` 实现，
/// 并追加 `Debug, Clone, Serialize, Deserialize` 派生（与已有派生去重合并）。
///
/// 枚举：每个变体对应一个事件种类，默认 `类型名.变体名`：
///
/// ```ignore
/// #[domain_event(version = 2)]
/// enum OrderEvent {
///     #[event(kind = "OrderPlaced")]
///     Placed { order_id: String, amount: u64 },
///     #[event(version = 1)]
///     Cancelled { order_id: String },
/// }
/// ```
///
/// 结构体：事件种类默认取类型名：
///
/// ```ignore
/// #[domain_event(kind = "PaymentCaptured")]
/// struct PaymentCaptured { payment_id: String }
/// ```
#[proc_macro_attribute]
pub fn domain_event(attr: TokenStream, item: TokenStream) -> TokenStream {
    domain_event::expand(attr, item)
}
