//! 订阅注册表（EventRegistry）
//!
//! 注册只发生在启动阶段的 `EventRegistryBuilder` 上；`build()` 之后得到的
//! `EventRegistry` 不再提供任何修改入口，可通过 `Arc` 在并发发布中无锁共享。
//!
use super::handler::{EventHandler, HandledEventKinds};
use crate::domain_event::DomainEvent;
use crate::error::{DispatchError, DispatchResult};
use std::collections::HashMap;
use std::sync::Arc;

enum KindFilter {
    Exact(String),
    Any,
}

struct Subscription<E: DomainEvent> {
    filter: KindFilter,
    handler: Arc<dyn EventHandler<E>>,
}

/// 启动期注册器：按调用顺序记录订阅
pub struct EventRegistryBuilder<E: DomainEvent> {
    subscriptions: Vec<Subscription<E>>,
}

impl<E: DomainEvent> Default for EventRegistryBuilder<E> {
    fn default() -> Self {
        Self {
            subscriptions: Vec::new(),
        }
    }
}

impl<E: DomainEvent> EventRegistryBuilder<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 将 `handler` 订阅到 `kind`
    ///
    /// - `kind` 不能为空；
    /// - `kind` 必须在处理器声明的种类之内；
    /// - 同一种类下处理器名称不可重复。
    pub fn subscribe(
        &mut self,
        kind: impl Into<String>,
        handler: Arc<dyn EventHandler<E>>,
    ) -> DispatchResult<()> {
        let kind = kind.into();
        if kind.trim().is_empty() {
            return Err(DispatchError::registration("event kind must not be empty"));
        }
        if !handler.handled_event_kinds().permits(&kind) {
            return Err(DispatchError::registration(format!(
                "handler '{}' does not declare kind '{}'",
                handler.handler_name(),
                kind
            )));
        }
        self.ensure_unique(Some(&kind), handler.handler_name())?;

        self.subscriptions.push(Subscription {
            filter: KindFilter::Exact(kind),
            handler,
        });
        Ok(())
    }

    /// 按处理器自身声明的种类注册（`All` 注册为通配订阅）
    pub fn register(&mut self, handler: Arc<dyn EventHandler<E>>) -> DispatchResult<()> {
        match handler.handled_event_kinds() {
            HandledEventKinds::One(kind) => self.subscribe(kind, handler),
            HandledEventKinds::Many(kinds) => {
                for kind in kinds {
                    self.subscribe(kind, handler.clone())?;
                }
                Ok(())
            }
            HandledEventKinds::All => {
                self.ensure_unique(None, handler.handler_name())?;
                self.subscriptions.push(Subscription {
                    filter: KindFilter::Any,
                    handler,
                });
                Ok(())
            }
        }
    }

    /// 冻结注册表
    pub fn build(self) -> EventRegistry<E> {
        let mut by_kind: HashMap<String, Vec<usize>> = HashMap::new();
        let mut wildcard: Vec<usize> = Vec::new();

        for (idx, sub) in self.subscriptions.iter().enumerate() {
            match &sub.filter {
                KindFilter::Exact(kind) => by_kind.entry(kind.clone()).or_default().push(idx),
                KindFilter::Any => wildcard.push(idx),
            }
        }

        EventRegistry {
            handlers: self.subscriptions.into_iter().map(|s| s.handler).collect(),
            by_kind,
            wildcard,
        }
    }

    // `kind == None` 表示通配订阅，与任何种类下的同名处理器冲突
    fn ensure_unique(&self, kind: Option<&str>, name: &str) -> DispatchResult<()> {
        let clash = self.subscriptions.iter().find(|s| {
            s.handler.handler_name() == name
                && match (&s.filter, kind) {
                    (KindFilter::Any, _) | (_, None) => true,
                    (KindFilter::Exact(k), Some(kind)) => k == kind,
                }
        });

        match clash {
            Some(s) => Err(DispatchError::DuplicateHandler {
                kind: match &s.filter {
                    KindFilter::Exact(k) => k.clone(),
                    KindFilter::Any => "*".to_string(),
                },
                handler: name.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// 已冻结的订阅注册表
pub struct EventRegistry<E: DomainEvent> {
    handlers: Vec<Arc<dyn EventHandler<E>>>,
    by_kind: HashMap<String, Vec<usize>>,
    wildcard: Vec<usize>,
}

impl<E: DomainEvent> EventRegistry<E> {
    pub fn builder() -> EventRegistryBuilder<E> {
        EventRegistryBuilder::new()
    }

    /// `kind` 的处理器列表，按注册顺序（通配订阅按其注册位置穿插）；
    /// 未知种类返回空列表。
    pub fn handlers_for(&self, kind: &str) -> Vec<Arc<dyn EventHandler<E>>> {
        let exact: &[usize] = self.by_kind.get(kind).map(Vec::as_slice).unwrap_or(&[]);

        let mut merged = Vec::with_capacity(exact.len() + self.wildcard.len());
        let (mut i, mut j) = (0, 0);
        while i < exact.len() || j < self.wildcard.len() {
            let take_exact = match (exact.get(i), self.wildcard.get(j)) {
                (Some(a), Some(b)) => a < b,
                (Some(_), None) => true,
                _ => false,
            };
            let idx = if take_exact {
                i += 1;
                exact[i - 1]
            } else {
                j += 1;
                self.wildcard[j - 1]
            };
            merged.push(self.handlers[idx].clone());
        }
        merged
    }

    /// 在 `kind` 的处理器中按名称查找
    pub fn handler_named(&self, kind: &str, name: &str) -> Option<Arc<dyn EventHandler<E>>> {
        self.handlers_for(kind)
            .into_iter()
            .find(|h| h.handler_name() == name)
    }

    /// 注册的订阅总数
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_event::EventEnvelope;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Ping;

    impl DomainEvent for Ping {
        fn event_kind(&self) -> &str {
            "Ping"
        }
    }

    struct Named {
        name: &'static str,
        kinds: HandledEventKinds,
    }

    #[async_trait]
    impl EventHandler<Ping> for Named {
        fn handler_name(&self) -> &str {
            self.name
        }
        fn handled_event_kinds(&self) -> HandledEventKinds {
            self.kinds.clone()
        }
        async fn handle(&self, _event: &EventEnvelope<Ping>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn one(name: &'static str, kind: &str) -> Arc<dyn EventHandler<Ping>> {
        Arc::new(Named {
            name,
            kinds: HandledEventKinds::One(kind.into()),
        })
    }

    fn all(name: &'static str) -> Arc<dyn EventHandler<Ping>> {
        Arc::new(Named {
            name,
            kinds: HandledEventKinds::All,
        })
    }

    fn names(list: Vec<Arc<dyn EventHandler<Ping>>>) -> Vec<String> {
        list.iter().map(|h| h.handler_name().to_string()).collect()
    }

    #[test]
    fn unknown_kind_yields_empty_list() {
        let registry = EventRegistry::<Ping>::builder().build();
        assert!(registry.handlers_for("Nope").is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn preserves_registration_order_with_wildcards() {
        let mut b = EventRegistry::<Ping>::builder();
        b.subscribe("Ping", one("a", "Ping")).unwrap();
        b.register(all("audit")).unwrap();
        b.subscribe("Ping", one("b", "Ping")).unwrap();
        b.subscribe("Pong", one("c", "Pong")).unwrap();
        let registry = b.build();

        assert_eq!(names(registry.handlers_for("Ping")), vec!["a", "audit", "b"]);
        assert_eq!(names(registry.handlers_for("Pong")), vec!["audit", "c"]);
        assert_eq!(names(registry.handlers_for("Other")), vec!["audit"]);
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn undeclared_or_empty_kind_is_rejected() {
        let mut b = EventRegistry::<Ping>::builder();
        let err = b.subscribe("Pong", one("a", "Ping")).unwrap_err();
        assert!(matches!(err, DispatchError::Registration { .. }));

        let err = b.subscribe("  ", all("x")).unwrap_err();
        assert!(matches!(err, DispatchError::Registration { .. }));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut b = EventRegistry::<Ping>::builder();
        b.subscribe("Ping", one("a", "Ping")).unwrap();
        let err = b.subscribe("Ping", one("a", "Ping")).unwrap_err();
        assert!(matches!(err, DispatchError::DuplicateHandler { .. }));

        // 不同种类下同名允许
        b.subscribe("Pong", one("a", "Pong")).unwrap();

        // 通配与已有同名冲突
        let err = b.register(all("a")).unwrap_err();
        assert!(matches!(err, DispatchError::DuplicateHandler { .. }));
    }

    #[test]
    fn register_many_subscribes_each_kind() {
        let mut b = EventRegistry::<Ping>::builder();
        b.register(Arc::new(Named {
            name: "multi",
            kinds: HandledEventKinds::Many(vec!["Ping".into(), "Pong".into()]),
        }))
        .unwrap();
        let registry = b.build();
        assert!(registry.handler_named("Ping", "multi").is_some());
        assert!(registry.handler_named("Pong", "multi").is_some());
        assert!(registry.handler_named("Pang", "multi").is_none());
    }
}
