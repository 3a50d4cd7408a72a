//! Infrastructure layer: stores, change feed wiring and application services.

pub mod services;
pub mod store;


pub use services::{
    CreateOrderInput, DEFAULT_CODE_ATTEMPTS, ORDER_AGGREGATE, PaymentInput, PostMovementInput,
    STOCK_AGGREGATE, ServiceError, Stockbook,
};
pub use store::{
    CatalogEntry, ChangeSet, InMemoryStore, InventoryStore, MovementFilter, PostgresStore,
    StoreError,
};
