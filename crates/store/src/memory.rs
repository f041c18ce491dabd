use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    Cart, CartId, CartItem, Collection, CollectionId, CollectionSummary, Customer, CustomerId,
    CustomerProfile, MAX_ITEM_QUANTITY, NewCollection, NewProduct, NewReview, Order, OrderId,
    PaymentStatus, Product, ProductId, ProductUpdate, Result, Review, ReviewId, StoreError,
    UserId, Version,
    store::{CartStore, CatalogStore, CustomerStore, OrderStore},
};

#[derive(Default)]
struct Tables {
    collections: BTreeMap<CollectionId, Collection>,
    products: BTreeMap<ProductId, Product>,
    reviews: BTreeMap<ReviewId, Review>,
    carts: HashMap<CartId, Cart>,
    customers: HashMap<CustomerId, Customer>,
    orders: HashMap<OrderId, Order>,
    /// Order ids in placement order.
    order_sequence: Vec<OrderId>,
    next_serial: i64,
}

impl Tables {
    fn next_serial(&mut self) -> i64 {
        self.next_serial += 1;
        self.next_serial
    }

    fn cart_mut(&mut self, id: CartId) -> Result<&mut Cart> {
        self.carts.get_mut(&id).ok_or(StoreError::CartNotFound(id))
    }

    fn summarize(&self, collection: &Collection) -> CollectionSummary {
        let products_count = self
            .products
            .values()
            .filter(|p| p.collection_id == collection.id)
            .count() as u64;
        CollectionSummary {
            collection: collection.clone(),
            products_count,
        }
    }
}

/// In-memory store for tests and local runs.
///
/// Every operation takes the single write lock for its whole
/// read-check-write sequence, which gives each call the same atomicity the
/// PostgreSQL implementation gets from a transaction.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of carts currently stored.
    pub async fn cart_count(&self) -> usize {
        self.tables.read().await.carts.len()
    }

    /// Returns the number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn insert_collection(&self, collection: NewCollection) -> Result<Collection> {
        let mut tables = self.tables.write().await;
        if let Some(product_id) = collection.featured_product
            && !tables.products.contains_key(&product_id)
        {
            return Err(StoreError::not_found("Product", product_id));
        }

        let id = CollectionId::new(tables.next_serial());
        let collection = Collection {
            id,
            title: collection.title,
            featured_product: collection.featured_product,
        };
        tables.collections.insert(id, collection.clone());
        Ok(collection)
    }

    async fn update_collection(&self, id: CollectionId, title: String) -> Result<Collection> {
        let mut tables = self.tables.write().await;
        let collection = tables
            .collections
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Collection", id))?;
        collection.title = title;
        Ok(collection.clone())
    }

    async fn get_collection(&self, id: CollectionId) -> Result<Option<CollectionSummary>> {
        let tables = self.tables.read().await;
        Ok(tables.collections.get(&id).map(|c| tables.summarize(c)))
    }

    async fn list_collections(&self) -> Result<Vec<CollectionSummary>> {
        let tables = self.tables.read().await;
        let mut summaries: Vec<_> = tables
            .collections
            .values()
            .map(|c| tables.summarize(c))
            .collect();
        summaries.sort_by(|a, b| {
            a.collection
                .title
                .cmp(&b.collection.title)
                .then(a.collection.id.cmp(&b.collection.id))
        });
        Ok(summaries)
    }

    async fn delete_collection(&self, id: CollectionId) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.collections.contains_key(&id) {
            return Err(StoreError::not_found("Collection", id));
        }
        if tables.products.values().any(|p| p.collection_id == id) {
            return Err(StoreError::protected(
                "Collection",
                id,
                "it still contains products",
            ));
        }
        tables.collections.remove(&id);
        Ok(())
    }

    async fn insert_product(&self, product: NewProduct) -> Result<Product> {
        let mut tables = self.tables.write().await;
        if !tables.collections.contains_key(&product.collection_id) {
            return Err(StoreError::not_found("Collection", product.collection_id));
        }

        let id = ProductId::new(tables.next_serial());
        let product = Product {
            id,
            title: product.title,
            slug: product.slug,
            description: product.description,
            unit_price: product.unit_price,
            inventory: product.inventory,
            last_update: Utc::now(),
            collection_id: product.collection_id,
        };
        tables.products.insert(id, product.clone());
        Ok(product)
    }

    async fn update_product(&self, id: ProductId, update: ProductUpdate) -> Result<Product> {
        let mut tables = self.tables.write().await;
        let product = tables
            .products
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Product", id))?;
        product.title = update.title;
        product.unit_price = update.unit_price;
        product.inventory = update.inventory;
        product.last_update = Utc::now();
        Ok(product.clone())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let tables = self.tables.read().await;
        Ok(tables.products.get(&id).cloned())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.products.get(id).cloned())
            .collect())
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let tables = self.tables.read().await;
        Ok(tables.products.values().cloned().collect())
    }

    async fn delete_product(&self, id: ProductId) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.products.contains_key(&id) {
            return Err(StoreError::not_found("Product", id));
        }
        let referenced = tables
            .orders
            .values()
            .any(|o| o.items.iter().any(|i| i.product_id == id));
        if referenced {
            return Err(StoreError::protected(
                "Product",
                id,
                "it is referenced by order items",
            ));
        }

        tables.products.remove(&id);
        tables.reviews.retain(|_, r| r.product_id != id);
        for cart in tables.carts.values_mut() {
            let before = cart.items.len();
            cart.items.retain(|i| i.product_id != id);
            if cart.items.len() != before {
                cart.version = cart.version.next();
            }
        }
        for collection in tables.collections.values_mut() {
            if collection.featured_product == Some(id) {
                collection.featured_product = None;
            }
        }
        Ok(())
    }

    async fn insert_review(&self, product_id: ProductId, review: NewReview) -> Result<Review> {
        let mut tables = self.tables.write().await;
        if !tables.products.contains_key(&product_id) {
            return Err(StoreError::not_found("Product", product_id));
        }
        let id = ReviewId::new(tables.next_serial());
        let review = Review {
            id,
            product_id,
            name: review.name,
            description: review.description,
            date: Utc::now(),
        };
        tables.reviews.insert(id, review.clone());
        Ok(review)
    }

    async fn list_reviews(&self, product_id: ProductId) -> Result<Vec<Review>> {
        let tables = self.tables.read().await;
        Ok(tables
            .reviews
            .values()
            .filter(|r| r.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn delete_review(&self, product_id: ProductId, review_id: ReviewId) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.reviews.get(&review_id) {
            Some(review) if review.product_id == product_id => {
                tables.reviews.remove(&review_id);
                Ok(())
            }
            _ => Err(StoreError::not_found("Review", review_id)),
        }
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn insert_cart(&self, cart: Cart) -> Result<Cart> {
        let mut tables = self.tables.write().await;
        tables.carts.insert(cart.id, cart.clone());
        Ok(cart)
    }

    async fn get_cart(&self, id: CartId) -> Result<Option<Cart>> {
        let tables = self.tables.read().await;
        Ok(tables.carts.get(&id).cloned())
    }

    async fn delete_cart(&self, id: CartId) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .carts
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::CartNotFound(id))
    }

    async fn add_cart_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartItem> {
        let mut tables = self.tables.write().await;
        if !tables.carts.contains_key(&cart_id) {
            return Err(StoreError::CartNotFound(cart_id));
        }
        if !tables.products.contains_key(&product_id) {
            return Err(StoreError::not_found("Product", product_id));
        }

        let cart = tables.cart_mut(cart_id)?;
        let item = match cart.items.iter_mut().find(|i| i.product_id == product_id) {
            Some(existing) => {
                if u64::from(existing.quantity) + u64::from(quantity) > u64::from(MAX_ITEM_QUANTITY)
                {
                    return Err(StoreError::QuantityLimitExceeded {
                        product_id,
                        requested: u64::from(quantity),
                    });
                }
                existing.quantity += quantity;
                *existing
            }
            None => {
                let item = CartItem {
                    product_id,
                    quantity,
                };
                cart.items.push(item);
                item
            }
        };
        cart.version = cart.version.next();
        Ok(item)
    }

    async fn set_cart_item_quantity(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartItem> {
        let mut tables = self.tables.write().await;
        let cart = tables.cart_mut(cart_id)?;
        let existing = cart
            .items
            .iter_mut()
            .find(|i| i.product_id == product_id)
            .ok_or_else(|| StoreError::not_found("Cart item", product_id))?;
        existing.quantity = quantity;
        let item = *existing;
        cart.version = cart.version.next();
        Ok(item)
    }

    async fn remove_cart_item(&self, cart_id: CartId, product_id: ProductId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let cart = tables.cart_mut(cart_id)?;
        let before = cart.items.len();
        cart.items.retain(|i| i.product_id != product_id);
        let removed = cart.items.len() != before;
        if removed {
            cart.version = cart.version.next();
        }
        Ok(removed)
    }
}

#[async_trait]
impl CustomerStore for InMemoryStore {
    async fn find_or_insert_customer(&self, user_id: UserId) -> Result<(Customer, bool)> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.customers.values().find(|c| c.user_id == user_id) {
            return Ok((existing.clone(), false));
        }
        let customer = Customer::provision(user_id);
        tables.customers.insert(customer.id, customer.clone());
        Ok((customer, true))
    }

    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>> {
        let tables = self.tables.read().await;
        Ok(tables.customers.get(&id).cloned())
    }

    async fn get_customer_by_user(&self, user_id: UserId) -> Result<Option<Customer>> {
        let tables = self.tables.read().await;
        Ok(tables
            .customers
            .values()
            .find(|c| c.user_id == user_id)
            .cloned())
    }

    async fn list_customers(&self) -> Result<Vec<Customer>> {
        let tables = self.tables.read().await;
        let mut customers: Vec<_> = tables.customers.values().cloned().collect();
        customers.sort_by_key(|c| c.user_id);
        Ok(customers)
    }

    async fn update_customer(&self, id: CustomerId, profile: CustomerProfile) -> Result<Customer> {
        let mut tables = self.tables.write().await;
        let customer = tables
            .customers
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Customer", id))?;
        customer.phone = profile.phone;
        customer.birth_date = profile.birth_date;
        customer.membership = profile.membership;
        Ok(customer.clone())
    }

    async fn delete_customer(&self, id: CustomerId) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.customers.contains_key(&id) {
            return Err(StoreError::not_found("Customer", id));
        }
        if tables.orders.values().any(|o| o.customer_id == id) {
            return Err(StoreError::protected("Customer", id, "it has placed orders"));
        }
        tables.customers.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn place_order(
        &self,
        cart_id: CartId,
        expected_version: Version,
        order: Order,
    ) -> Result<Order> {
        let mut tables = self.tables.write().await;

        // Compare-and-delete: the cart must still be exactly what was read
        let actual = tables
            .carts
            .get(&cart_id)
            .map(|c| c.version)
            .ok_or(StoreError::CartNotFound(cart_id))?;
        if actual != expected_version {
            return Err(StoreError::ConcurrencyConflict {
                cart_id,
                expected: expected_version,
                actual,
            });
        }

        if !tables.customers.contains_key(&order.customer_id) {
            return Err(StoreError::not_found("Customer", order.customer_id));
        }
        if let Some(missing) = order
            .items
            .iter()
            .find(|i| !tables.products.contains_key(&i.product_id))
        {
            return Err(StoreError::not_found("Product", missing.product_id));
        }

        tables.carts.remove(&cart_id);
        tables.order_sequence.push(order.id);
        tables.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables.orders.get(&id).cloned())
    }

    async fn list_orders(&self, customer_id: Option<CustomerId>) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .order_sequence
            .iter()
            .filter_map(|id| tables.orders.get(id))
            .filter(|o| customer_id.is_none_or(|c| o.customer_id == c))
            .cloned()
            .collect())
    }

    async fn set_payment_status(&self, id: OrderId, status: PaymentStatus) -> Result<Order> {
        let mut tables = self.tables.write().await;
        let order = tables
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Order", id))?;
        order.payment_status = status;
        Ok(order.clone())
    }

    async fn delete_order(&self, id: OrderId) -> Result<()> {
        let mut tables = self.tables.write().await;
        let order = tables
            .orders
            .get(&id)
            .ok_or_else(|| StoreError::not_found("Order", id))?;
        if !order.items.is_empty() {
            return Err(StoreError::protected("Order", id, "it still has order items"));
        }
        tables.orders.remove(&id);
        tables.order_sequence.retain(|o| *o != id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Money, OrderItem};

    async fn seed_product(store: &InMemoryStore, cents: i64) -> Product {
        let collection = store
            .insert_collection(NewCollection {
                title: "Tools".to_string(),
                featured_product: None,
            })
            .await
            .unwrap();
        store
            .insert_product(NewProduct {
                title: "Hammer".to_string(),
                slug: "hammer".to_string(),
                description: None,
                unit_price: Money::from_cents(cents),
                inventory: 10,
                collection_id: collection.id,
            })
            .await
            .unwrap()
    }

    fn order_for(customer_id: CustomerId, product_id: ProductId, quantity: u32) -> Order {
        Order {
            id: OrderId::new(),
            customer_id,
            placed_at: Utc::now(),
            payment_status: PaymentStatus::Pending,
            items: vec![OrderItem {
                product_id,
                quantity,
                unit_price: Money::from_cents(1000),
            }],
        }
    }

    #[tokio::test]
    async fn add_cart_item_increments_existing_line() {
        let store = InMemoryStore::new();
        let product = seed_product(&store, 1000).await;
        let cart = store.insert_cart(Cart::new()).await.unwrap();

        store.add_cart_item(cart.id, product.id, 2).await.unwrap();
        let item = store.add_cart_item(cart.id, product.id, 3).await.unwrap();
        assert_eq!(item.quantity, 5);

        let cart = store.get_cart(cart.id).await.unwrap().unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.version, Version::new(2));
    }

    #[tokio::test]
    async fn add_cart_item_rejects_unknown_cart_and_product() {
        let store = InMemoryStore::new();
        let product = seed_product(&store, 1000).await;
        let cart = store.insert_cart(Cart::new()).await.unwrap();

        let result = store.add_cart_item(CartId::new(), product.id, 1).await;
        assert!(matches!(result, Err(StoreError::CartNotFound(_))));

        let result = store.add_cart_item(cart.id, ProductId::new(999), 1).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn add_cart_item_enforces_quantity_limit() {
        let store = InMemoryStore::new();
        let product = seed_product(&store, 1000).await;
        let cart = store.insert_cart(Cart::new()).await.unwrap();

        store
            .add_cart_item(cart.id, product.id, MAX_ITEM_QUANTITY)
            .await
            .unwrap();
        let result = store.add_cart_item(cart.id, product.id, 1).await;
        assert!(matches!(
            result,
            Err(StoreError::QuantityLimitExceeded { requested: 1, .. })
        ));
    }

    #[tokio::test]
    async fn remove_cart_item_is_idempotent() {
        let store = InMemoryStore::new();
        let product = seed_product(&store, 1000).await;
        let cart = store.insert_cart(Cart::new()).await.unwrap();
        store.add_cart_item(cart.id, product.id, 1).await.unwrap();

        assert!(store.remove_cart_item(cart.id, product.id).await.unwrap());
        assert!(!store.remove_cart_item(cart.id, product.id).await.unwrap());
    }

    #[tokio::test]
    async fn place_order_deletes_cart_and_stores_order() {
        let store = InMemoryStore::new();
        let product = seed_product(&store, 1000).await;
        let (customer, _) = store.find_or_insert_customer(UserId::new(1)).await.unwrap();
        let cart = store.insert_cart(Cart::new()).await.unwrap();
        store.add_cart_item(cart.id, product.id, 2).await.unwrap();
        let cart = store.get_cart(cart.id).await.unwrap().unwrap();

        let order = order_for(customer.id, product.id, 2);
        store
            .place_order(cart.id, cart.version, order.clone())
            .await
            .unwrap();

        assert!(store.get_cart(cart.id).await.unwrap().is_none());
        assert_eq!(store.get_order(order.id).await.unwrap(), Some(order));
    }

    #[tokio::test]
    async fn place_order_detects_stale_cart_version() {
        let store = InMemoryStore::new();
        let product = seed_product(&store, 1000).await;
        let (customer, _) = store.find_or_insert_customer(UserId::new(1)).await.unwrap();
        let cart = store.insert_cart(Cart::new()).await.unwrap();
        store.add_cart_item(cart.id, product.id, 2).await.unwrap();
        let stale = store.get_cart(cart.id).await.unwrap().unwrap();

        store.add_cart_item(cart.id, product.id, 1).await.unwrap();

        let result = store
            .place_order(cart.id, stale.version, order_for(customer.id, product.id, 2))
            .await;
        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict { .. })
        ));
        assert!(store.get_cart(cart.id).await.unwrap().is_some());
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn delete_product_is_protected_by_order_lines() {
        let store = InMemoryStore::new();
        let product = seed_product(&store, 1000).await;
        let (customer, _) = store.find_or_insert_customer(UserId::new(1)).await.unwrap();
        let cart = store.insert_cart(Cart::new()).await.unwrap();
        store.add_cart_item(cart.id, product.id, 1).await.unwrap();
        let cart = store.get_cart(cart.id).await.unwrap().unwrap();
        store
            .place_order(cart.id, cart.version, order_for(customer.id, product.id, 1))
            .await
            .unwrap();

        let result = store.delete_product(product.id).await;
        assert!(matches!(result, Err(StoreError::Protected { .. })));
    }

    #[tokio::test]
    async fn delete_product_cascades_cart_lines_and_reviews() {
        let store = InMemoryStore::new();
        let product = seed_product(&store, 1000).await;
        let cart = store.insert_cart(Cart::new()).await.unwrap();
        store.add_cart_item(cart.id, product.id, 1).await.unwrap();
        store
            .insert_review(
                product.id,
                NewReview {
                    name: "Ann".to_string(),
                    description: "Solid".to_string(),
                },
            )
            .await
            .unwrap();

        store.delete_product(product.id).await.unwrap();

        let cart = store.get_cart(cart.id).await.unwrap().unwrap();
        assert!(cart.is_empty());
        assert!(store.list_reviews(product.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_collection_is_protected_by_products() {
        let store = InMemoryStore::new();
        let product = seed_product(&store, 1000).await;

        let result = store.delete_collection(product.collection_id).await;
        assert!(matches!(result, Err(StoreError::Protected { .. })));

        store.delete_product(product.id).await.unwrap();
        store.delete_collection(product.collection_id).await.unwrap();
    }

    #[tokio::test]
    async fn find_or_insert_customer_reports_creation_once() {
        let store = InMemoryStore::new();
        let (first, created) = store.find_or_insert_customer(UserId::new(7)).await.unwrap();
        assert!(created);
        let (second, created) = store.find_or_insert_customer(UserId::new(7)).await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn collections_are_listed_by_title_with_counts() {
        let store = InMemoryStore::new();
        seed_product(&store, 1000).await;
        store
            .insert_collection(NewCollection {
                title: "Garden".to_string(),
                featured_product: None,
            })
            .await
            .unwrap();

        let collections = store.list_collections().await.unwrap();
        let titles: Vec<_> = collections
            .iter()
            .map(|c| c.collection.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Garden", "Tools"]);
        assert_eq!(collections[0].products_count, 0);
        assert_eq!(collections[1].products_count, 1);
    }
}
