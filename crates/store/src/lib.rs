pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use common::{CartId, CollectionId, CustomerId, Money, OrderId, ProductId, ReviewId, UserId};
pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use model::{
    Cart, CartItem, Collection, CollectionSummary, Customer, CustomerProfile, MAX_ITEM_QUANTITY,
    Membership, NewCollection, NewProduct, NewReview, Order, OrderItem, PaymentStatus, Product,
    ProductUpdate, Review, Version,
};
pub use postgres::PostgresStore;
pub use store::{CartStore, CatalogStore, CustomerStore, OrderStore, Store};
