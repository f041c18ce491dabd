use async_trait::async_trait;

use crate::{
    Cart, CartId, CartItem, Collection, CollectionId, CollectionSummary, Customer, CustomerId,
    CustomerProfile, NewCollection, NewProduct, NewReview, Order, OrderId, PaymentStatus,
    Product, ProductId, ProductUpdate, Result, Review, ReviewId, UserId, Version,
};

/// Products, collections and reviews.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_collection(&self, collection: NewCollection) -> Result<Collection>;

    async fn update_collection(&self, id: CollectionId, title: String) -> Result<Collection>;

    async fn get_collection(&self, id: CollectionId) -> Result<Option<CollectionSummary>>;

    /// Lists collections ordered by title.
    async fn list_collections(&self) -> Result<Vec<CollectionSummary>>;

    /// Deletes a collection.
    ///
    /// Fails with `Protected` while any product belongs to it.
    async fn delete_collection(&self, id: CollectionId) -> Result<()>;

    async fn insert_product(&self, product: NewProduct) -> Result<Product>;

    async fn update_product(&self, id: ProductId, update: ProductUpdate) -> Result<Product>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Fetches several products at once. Missing ids are skipped.
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>>;

    async fn list_products(&self) -> Result<Vec<Product>>;

    /// Deletes a product, its cart lines and its reviews.
    ///
    /// Fails with `Protected` while any order line references the product.
    async fn delete_product(&self, id: ProductId) -> Result<()>;

    async fn insert_review(&self, product_id: ProductId, review: NewReview) -> Result<Review>;

    async fn list_reviews(&self, product_id: ProductId) -> Result<Vec<Review>>;

    async fn delete_review(&self, product_id: ProductId, review_id: ReviewId) -> Result<()>;
}

/// Shopping carts and their lines.
///
/// Every item mutation bumps the cart version.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn insert_cart(&self, cart: Cart) -> Result<Cart>;

    async fn get_cart(&self, id: CartId) -> Result<Option<Cart>>;

    /// Deletes a cart and all its lines.
    async fn delete_cart(&self, id: CartId) -> Result<()>;

    /// Adds `quantity` to the (cart, product) line, creating it if absent.
    ///
    /// The increment happens under the store's own lock or transaction so
    /// concurrent adds never lose an update.
    async fn add_cart_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartItem>;

    /// Overwrites the quantity of an existing line.
    async fn set_cart_item_quantity(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartItem>;

    /// Removes a line. Returns whether a line was present.
    async fn remove_cart_item(&self, cart_id: CartId, product_id: ProductId) -> Result<bool>;
}

/// Customer profiles.
#[async_trait]
pub trait CustomerStore: Send + Sync {
    /// Returns the customer linked to `user_id`, inserting a blank profile
    /// if none exists. The flag is true when a row was inserted.
    async fn find_or_insert_customer(&self, user_id: UserId) -> Result<(Customer, bool)>;

    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>>;

    async fn get_customer_by_user(&self, user_id: UserId) -> Result<Option<Customer>>;

    async fn list_customers(&self) -> Result<Vec<Customer>>;

    async fn update_customer(&self, id: CustomerId, profile: CustomerProfile) -> Result<Customer>;

    /// Fails with `Protected` while the customer owns orders.
    async fn delete_customer(&self, id: CustomerId) -> Result<()>;
}

/// Placed orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Converts a cart into `order` in one atomic step.
    ///
    /// The cart is deleted only if it still exists at `expected_version`;
    /// otherwise nothing is written and the call fails with `CartNotFound`
    /// or `ConcurrencyConflict`.
    async fn place_order(
        &self,
        cart_id: CartId,
        expected_version: Version,
        order: Order,
    ) -> Result<Order>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Lists orders oldest first, optionally restricted to one customer.
    async fn list_orders(&self, customer_id: Option<CustomerId>) -> Result<Vec<Order>>;

    async fn set_payment_status(&self, id: OrderId, status: PaymentStatus) -> Result<Order>;

    /// Fails with `Protected` while the order still has lines.
    async fn delete_order(&self, id: OrderId) -> Result<()>;
}

/// Everything the storefront services need from persistence.
pub trait Store: CatalogStore + CartStore + CustomerStore + OrderStore {}

// Blanket implementation for anything that provides all four stores
impl<T: CatalogStore + CartStore + CustomerStore + OrderStore + ?Sized> Store for T {}
