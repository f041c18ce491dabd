//! Identifiers and value types shared by every storefront crate.

pub mod ids;
pub mod money;

pub use ids::{CartId, CollectionId, CustomerId, OrderId, ProductId, ReviewId, UserId};
pub use money::{Money, ParseMoneyError};
