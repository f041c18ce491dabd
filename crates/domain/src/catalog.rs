//! Catalog reference and catalog administration.

use std::collections::HashMap;

use store::{
    CatalogStore, Collection, CollectionId, CollectionSummary, Money, NewCollection, NewProduct,
    NewReview, Product, ProductId, ProductUpdate, Review, ReviewId,
};

use crate::error::DomainError;
use crate::policy::{Action, Capability, authorize};

/// Longest title, slug or reviewer name accepted.
pub const MAX_TITLE_LEN: usize = 255;

/// Lowest accepted unit price, in cents.
pub const MIN_UNIT_PRICE_CENTS: i64 = 100;

/// Highest accepted unit price, in cents.
pub const MAX_UNIT_PRICE_CENTS: i64 = 999_999;

/// Displayed price including tax, as a percentage of the unit price.
pub const TAX_RATE_PERCENT: i64 = 110;

/// Unit price plus tax, rounded half up to the cent.
pub fn price_with_tax(product: &Product) -> Money {
    product.unit_price.scale_percent(TAX_RATE_PERCENT)
}

/// Lowercase, hyphen-separated form of a title.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

fn validate_text(field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::Validation(format!("{field} must not be blank")));
    }
    if value.chars().count() > MAX_TITLE_LEN {
        return Err(DomainError::Validation(format!(
            "{field} must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_price(price: Money) -> Result<(), DomainError> {
    if !(MIN_UNIT_PRICE_CENTS..=MAX_UNIT_PRICE_CENTS).contains(&price.cents()) {
        return Err(DomainError::Validation(format!(
            "unit price {} must be between {} and {}",
            price.to_decimal_string(),
            Money::from_cents(MIN_UNIT_PRICE_CENTS).to_decimal_string(),
            Money::from_cents(MAX_UNIT_PRICE_CENTS).to_decimal_string(),
        )));
    }
    Ok(())
}

fn validate_inventory(inventory: i32) -> Result<(), DomainError> {
    if inventory < 0 {
        return Err(DomainError::Validation(
            "inventory must not be negative".to_string(),
        ));
    }
    Ok(())
}

/// Read access to products for carts and checkout, plus staff-only
/// administration of products, collections and reviews.
#[derive(Clone)]
pub struct CatalogService<S> {
    store: S,
}

impl<S: CatalogStore> CatalogService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn product_exists(&self, id: ProductId) -> Result<bool, DomainError> {
        Ok(self.store.get_product(id).await?.is_some())
    }

    /// The live unit price of a product.
    pub async fn current_price(&self, id: ProductId) -> Result<Money, DomainError> {
        Ok(self.get_product(id).await?.unit_price)
    }

    /// Live unit prices for several products. Any missing product is `NotFound`.
    pub async fn current_prices(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, Money>, DomainError> {
        let prices: HashMap<_, _> = self
            .store
            .get_products(ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p.unit_price))
            .collect();

        if let Some(missing) = ids.iter().find(|id| !prices.contains_key(*id)) {
            return Err(DomainError::not_found("Product", missing));
        }
        Ok(prices)
    }

    // -- Products --

    pub async fn list_products(&self) -> Result<Vec<Product>, DomainError> {
        Ok(self.store.list_products().await?)
    }

    pub async fn get_product(&self, id: ProductId) -> Result<Product, DomainError> {
        self.store
            .get_product(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Product", id))
    }

    /// Products by id. Missing ids are skipped.
    pub async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, DomainError> {
        Ok(self.store.get_products(ids).await?)
    }

    #[tracing::instrument(skip(self, capability, product), fields(title = %product.title))]
    pub async fn create_product(
        &self,
        capability: &dyn Capability,
        mut product: NewProduct,
    ) -> Result<Product, DomainError> {
        authorize(capability, Action::ManageCatalog)?;
        validate_text("title", &product.title)?;
        validate_price(product.unit_price)?;
        validate_inventory(product.inventory)?;

        if product.slug.trim().is_empty() {
            product.slug = slugify(&product.title);
        }
        validate_text("slug", &product.slug)?;

        let product = self.store.insert_product(product).await?;
        tracing::info!(product_id = %product.id, "product created");
        Ok(product)
    }

    #[tracing::instrument(skip(self, capability, update))]
    pub async fn update_product(
        &self,
        capability: &dyn Capability,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product, DomainError> {
        authorize(capability, Action::ManageCatalog)?;
        validate_text("title", &update.title)?;
        validate_price(update.unit_price)?;
        validate_inventory(update.inventory)?;

        Ok(self.store.update_product(id, update).await?)
    }

    /// Refused with `Protected` while any order line references the product.
    #[tracing::instrument(skip(self, capability))]
    pub async fn delete_product(
        &self,
        capability: &dyn Capability,
        id: ProductId,
    ) -> Result<(), DomainError> {
        authorize(capability, Action::ManageCatalog)?;
        self.store.delete_product(id).await?;
        tracing::info!(product_id = %id, "product deleted");
        Ok(())
    }

    // -- Collections --

    pub async fn list_collections(&self) -> Result<Vec<CollectionSummary>, DomainError> {
        Ok(self.store.list_collections().await?)
    }

    pub async fn get_collection(&self, id: CollectionId) -> Result<CollectionSummary, DomainError> {
        self.store
            .get_collection(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Collection", id))
    }

    #[tracing::instrument(skip(self, capability))]
    pub async fn create_collection(
        &self,
        capability: &dyn Capability,
        title: String,
        featured_product: Option<ProductId>,
    ) -> Result<Collection, DomainError> {
        authorize(capability, Action::ManageCatalog)?;
        validate_text("title", &title)?;

        Ok(self
            .store
            .insert_collection(NewCollection {
                title,
                featured_product,
            })
            .await?)
    }

    #[tracing::instrument(skip(self, capability))]
    pub async fn update_collection(
        &self,
        capability: &dyn Capability,
        id: CollectionId,
        title: String,
    ) -> Result<Collection, DomainError> {
        authorize(capability, Action::ManageCatalog)?;
        validate_text("title", &title)?;

        Ok(self.store.update_collection(id, title).await?)
    }

    /// Refused with `Protected` while the collection still has products.
    #[tracing::instrument(skip(self, capability))]
    pub async fn delete_collection(
        &self,
        capability: &dyn Capability,
        id: CollectionId,
    ) -> Result<(), DomainError> {
        authorize(capability, Action::ManageCatalog)?;
        Ok(self.store.delete_collection(id).await?)
    }

    // -- Reviews --

    pub async fn list_reviews(&self, product_id: ProductId) -> Result<Vec<Review>, DomainError> {
        self.get_product(product_id).await?;
        Ok(self.store.list_reviews(product_id).await?)
    }

    #[tracing::instrument(skip(self, description))]
    pub async fn add_review(
        &self,
        product_id: ProductId,
        name: String,
        description: String,
    ) -> Result<Review, DomainError> {
        validate_text("name", &name)?;
        if description.trim().is_empty() {
            return Err(DomainError::Validation(
                "description must not be blank".to_string(),
            ));
        }

        Ok(self
            .store
            .insert_review(product_id, NewReview { name, description })
            .await?)
    }

    pub async fn delete_review(
        &self,
        product_id: ProductId,
        review_id: ReviewId,
    ) -> Result<(), DomainError> {
        Ok(self.store.delete_review(product_id, review_id).await?)
    }
}
