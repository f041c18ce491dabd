//! Records persisted by the store.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{CartId, CollectionId, CustomerId, Money, OrderId, ProductId, ReviewId, UserId};

/// Largest quantity a cart or order line can hold.
pub const MAX_ITEM_QUANTITY: u32 = 32_767;

/// Version counter of a cart, bumped on every item mutation.
///
/// Checkout deletes the cart only if it is still at the version that was
/// read, so a cart edited mid-checkout is never half-converted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version of a freshly created cart.
    pub fn initial() -> Self {
        Self(0)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// -- Catalog --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: CollectionId,
    pub title: String,
    /// Cleared when the featured product is deleted.
    pub featured_product: Option<ProductId>,
}

/// A collection together with the number of products filed under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub collection: Collection,
    pub products_count: u64,
}

#[derive(Debug, Clone)]
pub struct NewCollection {
    pub title: String,
    pub featured_product: Option<ProductId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub unit_price: Money,
    pub inventory: i32,
    pub last_update: DateTime<Utc>,
    pub collection_id: CollectionId,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub unit_price: Money,
    pub inventory: i32,
    pub collection_id: CollectionId,
}

/// Fields an update may change on an existing product.
#[derive(Debug, Clone)]
pub struct ProductUpdate {
    pub title: String,
    pub unit_price: Money,
    pub inventory: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub product_id: ProductId,
    pub name: String,
    pub description: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub name: String,
    pub description: String,
}

// -- Carts --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub created_at: DateTime<Utc>,
    pub version: Version,
    /// Lines in the order they were first added.
    pub items: Vec<CartItem>,
}

impl Cart {
    /// Creates an empty cart with a fresh identifier.
    pub fn new() -> Self {
        Self {
            id: CartId::new(),
            created_at: Utc::now(),
            version: Version::initial(),
            items: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }
}

impl Default for Cart {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

// -- Customers --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Membership {
    #[default]
    Bronze,
    Silver,
    Gold,
}

impl Membership {
    /// Single-letter code used in storage.
    pub fn as_code(&self) -> &'static str {
        match self {
            Membership::Bronze => "B",
            Membership::Silver => "S",
            Membership::Gold => "G",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "B" => Some(Membership::Bronze),
            "S" => Some(Membership::Silver),
            "G" => Some(Membership::Gold),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub user_id: UserId,
    pub phone: String,
    pub birth_date: Option<NaiveDate>,
    pub membership: Membership,
}

impl Customer {
    /// Blank profile provisioned for a user on first access.
    pub fn provision(user_id: UserId) -> Self {
        Self {
            id: CustomerId::new(),
            user_id,
            phone: String::new(),
            birth_date: None,
            membership: Membership::default(),
        }
    }
}

/// Editable part of a customer profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerProfile {
    pub phone: String,
    pub birth_date: Option<NaiveDate>,
    pub membership: Membership,
}

// -- Orders --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    /// Single-letter code used in storage.
    pub fn as_code(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "P",
            PaymentStatus::Completed => "C",
            PaymentStatus::Failed => "F",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "P" => Some(PaymentStatus::Pending),
            "C" => Some(PaymentStatus::Completed),
            "F" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" | "p" => Ok(PaymentStatus::Pending),
            "completed" | "c" => Ok(PaymentStatus::Completed),
            "failed" | "f" => Ok(PaymentStatus::Failed),
            other => Err(format!("unknown payment status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub placed_at: DateTime<Utc>,
    pub payment_status: PaymentStatus,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Sum of every line's frozen price times quantity.
    pub fn total(&self) -> Money {
        self.items.iter().map(OrderItem::total_price).sum()
    }
}

/// A line of a placed order. The unit price is a copy taken at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderItem {
    pub fn total_price(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}
