//! `OrderCreated` notification and its in-process dispatcher.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::Serialize;
use store::Order;

/// Emitted once per successfully committed checkout.
#[derive(Debug, Clone, Serialize)]
pub struct OrderCreated {
    pub order: Order,
    pub occurred_at: DateTime<Utc>,
}

impl OrderCreated {
    pub fn new(order: Order) -> Self {
        Self {
            order,
            occurred_at: Utc::now(),
        }
    }
}

/// Error type subscribers may return. It is logged, never propagated.
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

/// Receives `OrderCreated` after the order is durable.
#[async_trait]
pub trait OrderCreatedSubscriber: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn on_order_created(&self, event: &OrderCreated) -> Result<(), SubscriberError>;
}

/// Delivers `OrderCreated` to every registered subscriber.
///
/// Delivery is sequential and best effort. A subscriber that fails or
/// panics is logged and counted; the remaining subscribers still run.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    subscribers: Vec<Arc<dyn OrderCreatedSubscriber>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn OrderCreatedSubscriber>) -> Self {
        self.subscribe(subscriber);
        self
    }

    pub fn subscribe(&mut self, subscriber: Arc<dyn OrderCreatedSubscriber>) {
        self.subscribers.push(subscriber);
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Delivers the event and returns how many subscribers accepted it.
    #[tracing::instrument(skip_all, fields(order_id = %event.order.id))]
    pub async fn dispatch(&self, event: &OrderCreated) -> usize {
        let mut delivered = 0;

        for subscriber in &self.subscribers {
            let outcome = AssertUnwindSafe(subscriber.on_order_created(event))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    metrics::counter!("order_created_delivery_failures_total").increment(1);
                    tracing::warn!(
                        subscriber = subscriber.name(),
                        error = %e,
                        "OrderCreated subscriber failed"
                    );
                }
                Err(_) => {
                    metrics::counter!("order_created_delivery_failures_total").increment(1);
                    tracing::warn!(
                        subscriber = subscriber.name(),
                        "OrderCreated subscriber panicked"
                    );
                }
            }
        }

        delivered
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.subscribers.iter().map(|s| s.name()).collect();
        f.debug_struct("EventDispatcher")
            .field("subscribers", &names)
            .finish()
    }
}

/// Writes every new order to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSubscriber;

#[async_trait]
impl OrderCreatedSubscriber for LoggingSubscriber {
    fn name(&self) -> &str {
        "logging"
    }

    async fn on_order_created(&self, event: &OrderCreated) -> Result<(), SubscriberError> {
        let order = &event.order;
        tracing::info!(
            order_id = %order.id,
            customer_id = %order.customer_id,
            items = order.items.len(),
            total = %order.total(),
            "order created"
        );
        let payload = serde_json::to_string(event)?;
        tracing::debug!(%payload, "order created payload");
        Ok(())
    }
}
