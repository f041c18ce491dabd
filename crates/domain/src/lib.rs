//! Storefront domain layer.
//!
//! Services over the store traits:
//! - `CartService` for cart lines
//! - `CatalogService` for product lookups and catalog administration
//! - `CustomerService` for lazily provisioned customer profiles
//! - `OrderPlacementService` for checkout and `OrderCreated` dispatch
//! - `OrderService` for reading and administering orders

pub mod cart;
pub mod catalog;
pub mod customer;
pub mod error;
pub mod events;
pub mod order;
pub mod policy;

pub use cart::{CartLineView, CartService, CartView, ProductSnapshot, validate_quantity};
pub use catalog::{CatalogService, price_with_tax, slugify};
pub use customer::{CustomerLookup, CustomerService, ProfileChanges};
pub use error::DomainError;
pub use events::{
    EventDispatcher, LoggingSubscriber, OrderCreated, OrderCreatedSubscriber, SubscriberError,
};
pub use order::{OrderPlacementService, OrderService};
pub use policy::{Action, Actor, Capability, authorize};
