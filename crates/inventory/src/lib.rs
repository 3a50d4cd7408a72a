//! Inventory ledger domain module.
//!
//! Business rules for stock movements, implemented purely as deterministic
//! domain logic (no IO, no storage).

pub mod level;
pub mod movement;
pub mod projection;

pub use level::{
    MovementRecorded, MovementReversed, PostMovement, ReceiveStock, ReverseMovement,
    StockCommand, StockEvent, StockLevel, ensure_manual_movement_type,
};
pub use movement::{
    MovementId, MovementType, PURCHASE_ORDER_REFERENCE_PREFIX, StockMovement, StockTarget,
    is_purchase_order_reference,
};
pub use projection::{Reconciliation, StockProjection, project_all};
