//! Purchasing domain module (purchase orders and their payments).
//!
//! Business rules for the purchase order lifecycle and payment tracking,
//! implemented purely as deterministic domain logic (no IO, no storage).
//! Receipt only emits `GoodsReceived`; posting the stock is the ledger's job.

pub mod code;
pub mod order;
pub mod payment;

pub use code::{ORDER_CODE_PREFIX, generate_order_code, is_well_formed_order_code, new_order_code};
pub use order::{
    ChangeStatus, CreatePurchaseOrder, DeletePurchaseOrder, GoodsReceived, NewOrderLine,
    OrderItemId, OrderLine, OrderLineInput, PaymentRecorded, PurchaseOrder, PurchaseOrderCommand,
    PurchaseOrderCreated, PurchaseOrderDeleted, PurchaseOrderEvent, PurchaseOrderId,
    PurchaseOrderRecord, PurchaseOrderStatus, PurchaseOrderStatusChanged, PurchaseOrderView,
    RecordPayment,
};
pub use payment::{PaymentId, PaymentStatus, PurchasePayment};
