//! Checkout and order management.

use std::time::Instant;

use chrono::Utc;
use store::{CartId, Money, Order, OrderId, OrderItem, PaymentStatus, Store, UserId};

use crate::catalog::CatalogService;
use crate::customer::CustomerService;
use crate::error::DomainError;
use crate::events::{EventDispatcher, OrderCreated};
use crate::policy::{Action, Actor, Capability, authorize, is_admin};

/// Turns carts into orders.
///
/// A checkout reads the cart, prices every line from the live catalog and
/// hands the store one compare-and-delete unit: the order and its lines are
/// written and the cart removed only if the cart is still at the version
/// that was read. Subscribers hear about the order after it is durable.
#[derive(Clone)]
pub struct OrderPlacementService<S> {
    store: S,
    catalog: CatalogService<S>,
    customers: CustomerService<S>,
    events: EventDispatcher,
}

impl<S: Store + Clone> OrderPlacementService<S> {
    pub fn new(store: S, events: EventDispatcher) -> Self {
        Self {
            catalog: CatalogService::new(store.clone()),
            customers: CustomerService::new(store.clone()),
            store,
            events,
        }
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    #[tracing::instrument(skip(self))]
    pub async fn place_order(&self, cart_id: CartId, user_id: UserId) -> Result<Order, DomainError> {
        let start = Instant::now();
        let result = self.convert_cart(cart_id, user_id).await;
        metrics::histogram!("checkout_duration_seconds").record(start.elapsed().as_secs_f64());

        let order = match result {
            Ok(order) => order,
            Err(e) => {
                metrics::counter!("checkout_failures_total", "reason" => e.kind()).increment(1);
                tracing::warn!(error = %e, "checkout failed");
                return Err(e);
            }
        };

        metrics::counter!("orders_placed_total").increment(1);
        tracing::info!(
            order_id = %order.id,
            items = order.items.len(),
            total = %order.total(),
            "order placed"
        );

        self.events.dispatch(&OrderCreated::new(order.clone())).await;
        Ok(order)
    }

    async fn convert_cart(&self, cart_id: CartId, user_id: UserId) -> Result<Order, DomainError> {
        let cart = self
            .store
            .get_cart(cart_id)
            .await?
            .ok_or(DomainError::CartNotFound(cart_id))?;
        if cart.is_empty() {
            return Err(DomainError::EmptyCart(cart_id));
        }

        let customer = self
            .customers
            .find_or_create_customer(user_id)
            .await?
            .into_customer();

        let product_ids: Vec<_> = cart.items.iter().map(|i| i.product_id).collect();
        let prices = self.catalog.current_prices(&product_ids).await?;

        let mut items = Vec::with_capacity(cart.items.len());
        for line in &cart.items {
            let unit_price = prices
                .get(&line.product_id)
                .copied()
                .ok_or_else(|| DomainError::not_found("Product", line.product_id))?;
            items.push(OrderItem {
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price,
            });
        }

        items
            .iter()
            .try_fold(Money::zero(), |total, item| {
                item.unit_price
                    .checked_multiply(item.quantity)
                    .and_then(|line| total.checked_add(line))
            })
            .ok_or_else(|| DomainError::Validation("order total is out of range".to_string()))?;

        let order = Order {
            id: OrderId::new(),
            customer_id: customer.id,
            placed_at: Utc::now(),
            payment_status: PaymentStatus::Pending,
            items,
        };

        Ok(self.store.place_order(cart.id, cart.version, order).await?)
    }
}

/// Reads and administers placed orders.
#[derive(Clone)]
pub struct OrderService<S> {
    store: S,
    customers: CustomerService<S>,
}

impl<S: Store + Clone> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self {
            customers: CustomerService::new(store.clone()),
            store,
        }
    }

    /// Staff see every order; everyone else sees their own.
    pub async fn list_orders(&self, actor: &Actor) -> Result<Vec<Order>, DomainError> {
        let user_id = actor.require_user()?;
        if is_admin(actor) {
            return Ok(self.store.list_orders(None).await?);
        }

        let customer = self.customers.me(user_id).await?;
        Ok(self.store.list_orders(Some(customer.id)).await?)
    }

    /// Orders owned by someone else report `NotFound` to non-staff callers.
    pub async fn get_order(&self, actor: &Actor, id: OrderId) -> Result<Order, DomainError> {
        let user_id = actor.require_user()?;
        let order = self
            .store
            .get_order(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", id))?;

        if is_admin(actor) {
            return Ok(order);
        }

        let customer = self.customers.me(user_id).await?;
        if order.customer_id != customer.id {
            return Err(DomainError::not_found("Order", id));
        }
        Ok(order)
    }

    /// Sets any payment status. No transition rules are enforced.
    #[tracing::instrument(skip(self, capability))]
    pub async fn update_payment_status(
        &self,
        capability: &dyn Capability,
        id: OrderId,
        status: PaymentStatus,
    ) -> Result<Order, DomainError> {
        authorize(capability, Action::ManageOrders)?;
        let order = self.store.set_payment_status(id, status).await?;
        tracing::info!(order_id = %id, %status, "payment status updated");
        Ok(order)
    }

    /// Refused with `Protected` while the order still has lines.
    #[tracing::instrument(skip(self, capability))]
    pub async fn delete_order(
        &self,
        capability: &dyn Capability,
        id: OrderId,
    ) -> Result<(), DomainError> {
        authorize(capability, Action::ManageOrders)?;
        Ok(self.store.delete_order(id).await?)
    }
}
