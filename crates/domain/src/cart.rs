//! Cart store operations.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use store::{
    Cart, CartId, CartItem, CartStore, CatalogStore, MAX_ITEM_QUANTITY, Money, Product, ProductId,
};

use crate::error::DomainError;

/// Live product details shown next to a cart line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub title: String,
    pub unit_price: Money,
}

impl From<&Product> for ProductSnapshot {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id,
            title: product.title.clone(),
            unit_price: product.unit_price,
        }
    }
}

/// A cart line priced at the current catalog price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLineView {
    pub product: ProductSnapshot,
    pub quantity: u32,
    pub total_price: Money,
}

impl CartLineView {
    fn new(product: &Product, quantity: u32) -> Self {
        Self {
            product: ProductSnapshot::from(product),
            quantity,
            total_price: product.unit_price.multiply(quantity),
        }
    }
}

/// A cart resolved against the live catalog.
///
/// Prices here are for display only. Checkout reads prices again and
/// freezes them into the order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartView {
    pub id: CartId,
    pub created_at: DateTime<Utc>,
    pub items: Vec<CartLineView>,
    pub total_price: Money,
}

/// Checks a caller-supplied quantity and narrows it to the stored type.
pub fn validate_quantity(quantity: i64) -> Result<u32, DomainError> {
    if quantity <= 0 {
        return Err(DomainError::Validation(format!(
            "quantity must be positive, got {quantity}"
        )));
    }
    if quantity > i64::from(MAX_ITEM_QUANTITY) {
        return Err(DomainError::Validation(format!(
            "quantity must be at most {MAX_ITEM_QUANTITY}, got {quantity}"
        )));
    }
    Ok(quantity as u32)
}

#[derive(Clone)]
pub struct CartService<S> {
    store: S,
}

impl<S: CartStore + CatalogStore> CartService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_cart(&self) -> Result<Cart, DomainError> {
        let cart = self.store.insert_cart(Cart::new()).await?;
        tracing::debug!(cart_id = %cart.id, "cart created");
        Ok(cart)
    }

    /// Adds `quantity` of a product, incrementing an existing line.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<CartItem, DomainError> {
        let quantity = validate_quantity(quantity)?;
        let item = self
            .store
            .add_cart_item(cart_id, product_id, quantity)
            .await?;
        metrics::counter!("cart_items_added_total").increment(1);
        Ok(item)
    }

    /// Sets the quantity of an existing line.
    #[tracing::instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<CartItem, DomainError> {
        let quantity = validate_quantity(quantity)?;
        Ok(self
            .store
            .set_cart_item_quantity(cart_id, product_id, quantity)
            .await?)
    }

    /// Removes a line. A line that is already gone is not an error.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<(), DomainError> {
        let removed = self.store.remove_cart_item(cart_id, product_id).await?;
        if !removed {
            tracing::debug!("cart line already absent");
        }
        Ok(())
    }

    pub async fn get_cart(&self, cart_id: CartId) -> Result<CartView, DomainError> {
        let cart = self.load(cart_id).await?;
        let items = self.resolve_lines(&cart.items).await?;
        let total_price = items.iter().map(|line| line.total_price).sum();

        Ok(CartView {
            id: cart.id,
            created_at: cart.created_at,
            items,
            total_price,
        })
    }

    pub async fn list_items(&self, cart_id: CartId) -> Result<Vec<CartLineView>, DomainError> {
        let cart = self.load(cart_id).await?;
        self.resolve_lines(&cart.items).await
    }

    pub async fn get_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<CartLineView, DomainError> {
        let cart = self.load(cart_id).await?;
        let item = cart
            .item(product_id)
            .copied()
            .ok_or_else(|| DomainError::not_found("Cart item", product_id))?;

        self.resolve_lines(&[item])
            .await?
            .pop()
            .ok_or_else(|| DomainError::not_found("Product", product_id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_cart(&self, cart_id: CartId) -> Result<(), DomainError> {
        Ok(self.store.delete_cart(cart_id).await?)
    }

    async fn load(&self, cart_id: CartId) -> Result<Cart, DomainError> {
        self.store
            .get_cart(cart_id)
            .await?
            .ok_or(DomainError::CartNotFound(cart_id))
    }

    /// Joins lines with their products. Lines whose product vanished in the
    /// meantime are dropped, matching the cascade the store applies.
    async fn resolve_lines(&self, items: &[CartItem]) -> Result<Vec<CartLineView>, DomainError> {
        let ids: Vec<_> = items.iter().map(|i| i.product_id).collect();
        let products: HashMap<_, _> = self
            .store
            .get_products(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        Ok(items
            .iter()
            .filter_map(|item| {
                products
                    .get(&item.product_id)
                    .map(|product| CartLineView::new(product, item.quantity))
            })
            .collect())
    }
}
