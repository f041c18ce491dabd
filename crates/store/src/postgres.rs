use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Cart, CartId, CartItem, Collection, CollectionId, CollectionSummary, Customer, CustomerId,
    CustomerProfile, Membership, Money, NewCollection, NewProduct, NewReview, Order, OrderId,
    OrderItem, PaymentStatus, Product, ProductId, ProductUpdate, Result, Review, ReviewId,
    StoreError, UserId, Version,
    store::{CartStore, CatalogStore, CustomerStore, OrderStore},
};

const PRODUCT_COLUMNS: &str =
    "id, title, slug, description, unit_price_cents, inventory, last_update, collection_id";

const COLLECTION_SUMMARY_SQL: &str = r#"
    SELECT c.id, c.title, c.featured_product_id,
           (SELECT COUNT(*) FROM products p WHERE p.collection_id = c.id) AS products_count
    FROM collections c
"#;

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    fn row_to_collection(row: &PgRow) -> Result<Collection> {
        Ok(Collection {
            id: CollectionId::new(row.try_get("id")?),
            title: row.try_get("title")?,
            featured_product: row
                .try_get::<Option<i64>, _>("featured_product_id")?
                .map(ProductId::new),
        })
    }

    fn row_to_summary(row: PgRow) -> Result<CollectionSummary> {
        let products_count: i64 = row.try_get("products_count")?;
        Ok(CollectionSummary {
            collection: Self::row_to_collection(&row)?,
            products_count: products_count.max(0) as u64,
        })
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::new(row.try_get("id")?),
            title: row.try_get("title")?,
            slug: row.try_get("slug")?,
            description: row.try_get("description")?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            inventory: row.try_get("inventory")?,
            last_update: row.try_get("last_update")?,
            collection_id: CollectionId::new(row.try_get("collection_id")?),
        })
    }

    fn row_to_review(row: PgRow) -> Result<Review> {
        Ok(Review {
            id: ReviewId::new(row.try_get("id")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            date: row.try_get("date")?,
        })
    }

    fn row_to_cart_item(row: &PgRow) -> Result<CartItem> {
        Ok(CartItem {
            product_id: ProductId::new(row.try_get("product_id")?),
            quantity: quantity_from_row(row.try_get("quantity")?)?,
        })
    }

    fn row_to_customer(row: PgRow) -> Result<Customer> {
        let membership: String = row.try_get("membership")?;
        Ok(Customer {
            id: CustomerId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::new(row.try_get("user_id")?),
            phone: row.try_get("phone")?,
            birth_date: row.try_get::<Option<NaiveDate>, _>("birth_date")?,
            membership: Membership::from_code(membership.trim()).ok_or_else(|| {
                StoreError::InvalidData(format!("unknown membership code '{membership}'"))
            })?,
        })
    }

    async fn load_order_items(
        executor: impl sqlx::PgExecutor<'_>,
        order_id: OrderId,
    ) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, quantity, unit_price_cents
            FROM order_items
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(executor)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(OrderItem {
                    product_id: ProductId::new(row.try_get("product_id")?),
                    quantity: quantity_from_row(row.try_get("quantity")?)?,
                    unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
                })
            })
            .collect()
    }

    async fn row_to_order(&self, row: PgRow) -> Result<Order> {
        let id = OrderId::from_uuid(row.try_get::<Uuid, _>("id")?);
        let status: String = row.try_get("payment_status")?;
        Ok(Order {
            id,
            customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
            placed_at: row.try_get::<DateTime<Utc>, _>("placed_at")?,
            payment_status: PaymentStatus::from_code(status.trim()).ok_or_else(|| {
                StoreError::InvalidData(format!("unknown payment status code '{status}'"))
            })?,
            items: Self::load_order_items(&self.pool, id).await?,
        })
    }

    /// Bumps the cart version, locking the cart row for the rest of the
    /// transaction.
    async fn touch_cart(tx: &mut Transaction<'_, Postgres>, cart_id: CartId) -> Result<Version> {
        let version: Option<i64> = sqlx::query_scalar(
            "UPDATE carts SET version = version + 1 WHERE id = $1 RETURNING version",
        )
        .bind(cart_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await?;

        version
            .map(Version::new)
            .ok_or(StoreError::CartNotFound(cart_id))
    }
}

fn quantity_from_row(value: i32) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("negative quantity {value}")))
}

fn is_constraint(e: &sqlx::Error, name: &str) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.constraint() == Some(name))
}

fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation())
}

#[async_trait]
impl CatalogStore for PostgresStore {
    async fn insert_collection(&self, collection: NewCollection) -> Result<Collection> {
        let row = sqlx::query(
            r#"
            INSERT INTO collections (title, featured_product_id)
            VALUES ($1, $2)
            RETURNING id, title, featured_product_id
            "#,
        )
        .bind(&collection.title)
        .bind(collection.featured_product.map(|p| p.as_i64()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match (is_foreign_key_violation(&e), collection.featured_product) {
            (true, Some(product_id)) => StoreError::not_found("Product", product_id),
            _ => StoreError::Database(e),
        })?;

        Self::row_to_collection(&row)
    }

    async fn update_collection(&self, id: CollectionId, title: String) -> Result<Collection> {
        let row = sqlx::query(
            r#"
            UPDATE collections SET title = $2
            WHERE id = $1
            RETURNING id, title, featured_product_id
            "#,
        )
        .bind(id.as_i64())
        .bind(&title)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("Collection", id))?;

        Self::row_to_collection(&row)
    }

    async fn get_collection(&self, id: CollectionId) -> Result<Option<CollectionSummary>> {
        let row = sqlx::query(&format!("{COLLECTION_SUMMARY_SQL} WHERE c.id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_summary).transpose()
    }

    async fn list_collections(&self) -> Result<Vec<CollectionSummary>> {
        let rows = sqlx::query(&format!("{COLLECTION_SUMMARY_SQL} ORDER BY c.title ASC, c.id ASC"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_summary).collect()
    }

    async fn delete_collection(&self, id: CollectionId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let has_products: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM products WHERE collection_id = $1)",
        )
        .bind(id.as_i64())
        .fetch_one(&mut *tx)
        .await?;
        if has_products {
            return Err(StoreError::protected(
                "Collection",
                id,
                "it still contains products",
            ));
        }

        let deleted = sqlx::query("DELETE FROM collections WHERE id = $1")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    return StoreError::protected("Collection", id, "it still contains products");
                }
                StoreError::Database(e)
            })?
            .rows_affected();
        if deleted == 0 {
            return Err(StoreError::not_found("Collection", id));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_product(&self, product: NewProduct) -> Result<Product> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO products (title, slug, description, unit_price_cents, inventory, collection_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(&product.title)
        .bind(&product.slug)
        .bind(&product.description)
        .bind(product.unit_price.cents())
        .bind(product.inventory)
        .bind(product.collection_id.as_i64())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                return StoreError::not_found("Collection", product.collection_id);
            }
            StoreError::Database(e)
        })?;

        Self::row_to_product(row)
    }

    async fn update_product(&self, id: ProductId, update: ProductUpdate) -> Result<Product> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE products
            SET title = $2, unit_price_cents = $3, inventory = $4, last_update = NOW()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id.as_i64())
        .bind(&update.title)
        .bind(update.unit_price.cents())
        .bind(update.inventory)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("Product", id))?;

        Self::row_to_product(row)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let raw_ids: Vec<i64> = ids.iter().map(ProductId::as_i64).collect();
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1) ORDER BY id ASC"
        ))
        .bind(raw_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn delete_product(&self, id: ProductId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let referenced: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM order_items WHERE product_id = $1)",
        )
        .bind(id.as_i64())
        .fetch_one(&mut *tx)
        .await?;
        if referenced {
            return Err(StoreError::protected(
                "Product",
                id,
                "it is referenced by order items",
            ));
        }

        // Carts losing a line change version so an in-flight checkout notices
        sqlx::query(
            r#"
            UPDATE carts SET version = version + 1
            WHERE id IN (SELECT cart_id FROM cart_items WHERE product_id = $1)
            "#,
        )
        .bind(id.as_i64())
        .execute(&mut *tx)
        .await?;

        let deleted = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    return StoreError::protected(
                        "Product",
                        id,
                        "it is referenced by order items",
                    );
                }
                StoreError::Database(e)
            })?
            .rows_affected();
        if deleted == 0 {
            return Err(StoreError::not_found("Product", id));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_review(&self, product_id: ProductId, review: NewReview) -> Result<Review> {
        let row = sqlx::query(
            r#"
            INSERT INTO reviews (product_id, name, description)
            VALUES ($1, $2, $3)
            RETURNING id, product_id, name, description, date
            "#,
        )
        .bind(product_id.as_i64())
        .bind(&review.name)
        .bind(&review.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                return StoreError::not_found("Product", product_id);
            }
            StoreError::Database(e)
        })?;

        Self::row_to_review(row)
    }

    async fn list_reviews(&self, product_id: ProductId) -> Result<Vec<Review>> {
        let rows = sqlx::query(
            r#"
            SELECT id, product_id, name, description, date
            FROM reviews
            WHERE product_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(product_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_review).collect()
    }

    async fn delete_review(&self, product_id: ProductId, review_id: ReviewId) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM reviews WHERE id = $1 AND product_id = $2")
            .bind(review_id.as_i64())
            .bind(product_id.as_i64())
            .execute(&self.pool)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Err(StoreError::not_found("Review", review_id));
        }
        Ok(())
    }
}

#[async_trait]
impl CartStore for PostgresStore {
    async fn insert_cart(&self, cart: Cart) -> Result<Cart> {
        sqlx::query("INSERT INTO carts (id, created_at, version) VALUES ($1, $2, $3)")
            .bind(cart.id.as_uuid())
            .bind(cart.created_at)
            .bind(cart.version.as_i64())
            .execute(&self.pool)
            .await?;

        Ok(cart)
    }

    async fn get_cart(&self, id: CartId) -> Result<Option<Cart>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT id, created_at, version FROM carts WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let item_rows = sqlx::query(
            "SELECT product_id, quantity FROM cart_items WHERE cart_id = $1 ORDER BY id ASC",
        )
        .bind(id.as_uuid())
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(Cart {
            id,
            created_at: row.try_get("created_at")?,
            version: Version::new(row.try_get("version")?),
            items: item_rows
                .iter()
                .map(Self::row_to_cart_item)
                .collect::<Result<_>>()?,
        }))
    }

    async fn delete_cart(&self, id: CartId) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Err(StoreError::CartNotFound(id));
        }
        Ok(())
    }

    async fn add_cart_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartItem> {
        let mut tx = self.pool.begin().await?;
        Self::touch_cart(&mut tx, cart_id).await?;

        let product_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
                .bind(product_id.as_i64())
                .fetch_one(&mut *tx)
                .await?;
        if !product_exists {
            return Err(StoreError::not_found("Product", product_id));
        }

        let row = sqlx::query(
            r#"
            INSERT INTO cart_items (cart_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT ON CONSTRAINT unique_cart_product
            DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity
            RETURNING product_id, quantity
            "#,
        )
        .bind(cart_id.as_uuid())
        .bind(product_id.as_i64())
        .bind(i64::from(quantity))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_constraint(&e, "cart_items_quantity_check") {
                return StoreError::QuantityLimitExceeded {
                    product_id,
                    requested: u64::from(quantity),
                };
            }
            StoreError::Database(e)
        })?;

        let item = Self::row_to_cart_item(&row)?;
        tx.commit().await?;
        Ok(item)
    }

    async fn set_cart_item_quantity(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartItem> {
        let mut tx = self.pool.begin().await?;
        Self::touch_cart(&mut tx, cart_id).await?;

        let row = sqlx::query(
            r#"
            UPDATE cart_items SET quantity = $3
            WHERE cart_id = $1 AND product_id = $2
            RETURNING product_id, quantity
            "#,
        )
        .bind(cart_id.as_uuid())
        .bind(product_id.as_i64())
        .bind(i64::from(quantity))
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            if is_constraint(&e, "cart_items_quantity_check") {
                return StoreError::QuantityLimitExceeded {
                    product_id,
                    requested: u64::from(quantity),
                };
            }
            StoreError::Database(e)
        })?
        .ok_or_else(|| StoreError::not_found("Cart item", product_id))?;

        let item = Self::row_to_cart_item(&row)?;
        tx.commit().await?;
        Ok(item)
    }

    async fn remove_cart_item(&self, cart_id: CartId, product_id: ProductId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM carts WHERE id = $1 FOR UPDATE")
                .bind(cart_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(StoreError::CartNotFound(cart_id));
        }

        let removed = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2")
            .bind(cart_id.as_uuid())
            .bind(product_id.as_i64())
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        if removed {
            Self::touch_cart(&mut tx, cart_id).await?;
        }

        tx.commit().await?;
        Ok(removed)
    }
}

#[async_trait]
impl CustomerStore for PostgresStore {
    async fn find_or_insert_customer(&self, user_id: UserId) -> Result<(Customer, bool)> {
        let fresh = Customer::provision(user_id);
        let inserted = sqlx::query(
            r#"
            INSERT INTO customers (id, user_id, phone, birth_date, membership)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT ON CONSTRAINT unique_customer_user DO NOTHING
            RETURNING id, user_id, phone, birth_date, membership
            "#,
        )
        .bind(fresh.id.as_uuid())
        .bind(user_id.as_i64())
        .bind(&fresh.phone)
        .bind(fresh.birth_date)
        .bind(fresh.membership.as_code())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok((Self::row_to_customer(row)?, true));
        }

        let existing = self
            .get_customer_by_user(user_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Customer", user_id))?;
        Ok((existing, false))
    }

    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>> {
        let row = sqlx::query(
            "SELECT id, user_id, phone, birth_date, membership FROM customers WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_customer).transpose()
    }

    async fn get_customer_by_user(&self, user_id: UserId) -> Result<Option<Customer>> {
        let row = sqlx::query(
            "SELECT id, user_id, phone, birth_date, membership FROM customers WHERE user_id = $1",
        )
        .bind(user_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_customer).transpose()
    }

    async fn list_customers(&self) -> Result<Vec<Customer>> {
        let rows = sqlx::query(
            "SELECT id, user_id, phone, birth_date, membership FROM customers ORDER BY user_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_customer).collect()
    }

    async fn update_customer(&self, id: CustomerId, profile: CustomerProfile) -> Result<Customer> {
        let row = sqlx::query(
            r#"
            UPDATE customers SET phone = $2, birth_date = $3, membership = $4
            WHERE id = $1
            RETURNING id, user_id, phone, birth_date, membership
            "#,
        )
        .bind(id.as_uuid())
        .bind(&profile.phone)
        .bind(profile.birth_date)
        .bind(profile.membership.as_code())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("Customer", id))?;

        Self::row_to_customer(row)
    }

    async fn delete_customer(&self, id: CustomerId) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM customers WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    return StoreError::protected("Customer", id, "it has placed orders");
                }
                StoreError::Database(e)
            })?
            .rows_affected();

        if deleted == 0 {
            return Err(StoreError::not_found("Customer", id));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn place_order(
        &self,
        cart_id: CartId,
        expected_version: Version,
        order: Order,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        // Compare-and-delete. A concurrent checkout blocks on the row lock and
        // then sees zero affected rows.
        let deleted = sqlx::query("DELETE FROM carts WHERE id = $1 AND version = $2")
            .bind(cart_id.as_uuid())
            .bind(expected_version.as_i64())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            tracing::debug!(%cart_id, expected = %expected_version, "checkout lost the cart version race");
            let actual: Option<i64> =
                sqlx::query_scalar("SELECT version FROM carts WHERE id = $1")
                    .bind(cart_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;

            return Err(match actual {
                Some(actual) => StoreError::ConcurrencyConflict {
                    cart_id,
                    expected: expected_version,
                    actual: Version::new(actual),
                },
                None => StoreError::CartNotFound(cart_id),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO orders (id, placed_at, payment_status, customer_id)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.placed_at)
        .bind(order.payment_status.as_code())
        .bind(order.customer_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                return StoreError::not_found("Customer", order.customer_id);
            }
            StoreError::Database(e)
        })?;

        for item in &order.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, product_id, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(item.product_id.as_i64())
            .bind(i64::from(item.quantity))
            .bind(item.unit_price.cents())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    return StoreError::not_found("Product", item.product_id);
                }
                StoreError::Database(e)
            })?;
        }

        tx.commit().await?;
        tracing::debug!(order_id = %order.id, %cart_id, items = order.items.len(), "order persisted");
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            "SELECT id, customer_id, placed_at, payment_status FROM orders WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.row_to_order(row).await?)),
            None => Ok(None),
        }
    }

    async fn list_orders(&self, customer_id: Option<CustomerId>) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT id, customer_id, placed_at, payment_status
            FROM orders
            WHERE $1::uuid IS NULL OR customer_id = $1
            ORDER BY placed_at ASC, id ASC
            "#,
        )
        .bind(customer_id.map(|c| c.as_uuid()))
        .fetch_all(&self.pool)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            orders.push(self.row_to_order(row).await?);
        }
        Ok(orders)
    }

    async fn set_payment_status(&self, id: OrderId, status: PaymentStatus) -> Result<Order> {
        let row = sqlx::query(
            r#"
            UPDATE orders SET payment_status = $2
            WHERE id = $1
            RETURNING id, customer_id, placed_at, payment_status
            "#,
        )
        .bind(id.as_uuid())
        .bind(status.as_code())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("Order", id))?;

        self.row_to_order(row).await
    }

    async fn delete_order(&self, id: OrderId) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    return StoreError::protected("Order", id, "it still has order items");
                }
                StoreError::Database(e)
            })?
            .rows_affected();

        if deleted == 0 {
            return Err(StoreError::not_found("Order", id));
        }
        Ok(())
    }
}
