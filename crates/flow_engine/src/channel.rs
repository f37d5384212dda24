use std::fmt;
use std::sync::{Arc, Mutex};

use crate::sync::lock_or_recover;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    next_id: u64,
    handlers: Vec<(SubscriptionId, Handler<E>)>,
}

/// Typed callback registry for one notification kind.
///
/// Handlers run synchronously on the publishing call, in subscription order.
/// The handler list is snapshotted before dispatch, so a handler may subscribe,
/// unsubscribe or publish again without deadlocking. There is no ordering
/// between distinct channels.
pub struct EventChannel<E> {
    name: &'static str,
    registry: Mutex<Registry<E>>,
}

impl<E> EventChannel<E> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            registry: Mutex::new(Registry {
                next_id: 1,
                handlers: Vec::new(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut registry = lock_or_recover(&self.registry, "channel.subscribe");
        let id = SubscriptionId(registry.next_id);
        registry.next_id = registry.next_id.saturating_add(1);
        registry.handlers.push((id, Arc::new(handler)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = lock_or_recover(&self.registry, "channel.unsubscribe");
        let before = registry.handlers.len();
        registry.handlers.retain(|(existing, _)| *existing != id);
        registry.handlers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        lock_or_recover(&self.registry, "channel.count").handlers.len()
    }

    pub fn publish(&self, event: &E) -> usize {
        let handlers = {
            let registry = lock_or_recover(&self.registry, "channel.publish");
            registry
                .handlers
                .iter()
                .map(|(_, handler)| Arc::clone(handler))
                .collect::<Vec<_>>()
        };
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }
}

impl<E> fmt::Debug for EventChannel<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("name", &self.name)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn publish_reaches_handlers_in_subscription_order() {
        let channel = EventChannel::<u32>::new("test");
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            channel.subscribe(move |value: &u32| {
                seen.lock().expect("seen").push(format!("{tag}:{value}"));
            });
        }

        assert_eq!(channel.publish(&5), 2);
        assert_eq!(
            *seen.lock().expect("seen"),
            vec!["first:5".to_string(), "second:5".to_string()]
        );
    }

    #[test]
    fn unsubscribed_handler_is_not_called() {
        let channel = EventChannel::<()>::new("test");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let id = channel.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(channel.unsubscribe(id));
        assert!(!channel.unsubscribe(id));
        channel.publish(&());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handler_may_publish_reentrantly() {
        let channel = Arc::new(EventChannel::<u32>::new("test"));
        let calls = Arc::new(AtomicUsize::new(0));
        let inner_channel = Arc::clone(&channel);
        let counter = Arc::clone(&calls);
        channel.subscribe(move |value: &u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            if *value > 0 {
                inner_channel.publish(&(value - 1));
            }
        });

        channel.publish(&2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
