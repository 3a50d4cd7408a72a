//! Action boundary: every operation returns an [`ActionResult`] instead of an error.
//!
//! ```json
//! { "success": true, "data": { ... } }
//! { "success": false, "error": "insufficient stock: 5 on hand", "code": "insufficient_stock" }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::error;

use stockbook_core::ProductId;
use stockbook_events::{EventBus, EventEnvelope};
use stockbook_infra::{
    CreateOrderInput, InventoryStore, PaymentInput, PostMovementInput, ServiceError, Stockbook,
};
use stockbook_inventory::{MovementId, Reconciliation, StockMovement, StockTarget};
use stockbook_purchasing::{PurchaseOrderId, PurchaseOrderStatus, PurchaseOrderView, PurchasePayment};

/// Machine-readable failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    InsufficientStock,
    Conflict,
    StoreError,
}

impl From<&ServiceError> for ErrorCode {
    fn from(err: &ServiceError) -> Self {
        match err {
            ServiceError::Validation(_) => ErrorCode::ValidationError,
            ServiceError::NotFound(_) => ErrorCode::NotFound,
            ServiceError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            ServiceError::Conflict(_) => ErrorCode::Conflict,
            ServiceError::Store(_) => ErrorCode::StoreError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl<T> ActionResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    pub fn failure(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            code: Some(code),
        }
    }
}

impl<T> From<Result<T, ServiceError>> for ActionResult<T> {
    fn from(result: Result<T, ServiceError>) -> Self {
        match result {
            Ok(data) => ActionResult::ok(data),
            Err(err) => {
                let code = ErrorCode::from(&err);
                if code == ErrorCode::StoreError {
                    error!(error = %err, "action failed on the store");
                }
                ActionResult::failure(code, err.to_string())
            }
        }
    }
}

/// Count of orders removed by a bulk delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedCount {
    pub deleted: usize,
}

/// The operations exposed to callers, each wrapped in an [`ActionResult`].
pub struct Actions<S, B> {
    stockbook: Stockbook<S, B>,
}

impl<S, B> Actions<S, B> {
    pub fn new(stockbook: Stockbook<S, B>) -> Self {
        Self { stockbook }
    }

    pub fn stockbook(&self) -> &Stockbook<S, B> {
        &self.stockbook
    }
}

impl<S, B> Actions<S, B>
where
    S: InventoryStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub async fn create_stock_movement(&self, input: PostMovementInput) -> ActionResult<StockMovement> {
        self.stockbook.post_movement(input).await.into()
    }

    pub async fn delete_stock_movement(&self, movement_id: MovementId) -> ActionResult<StockMovement> {
        self.stockbook.reverse_movement(movement_id).await.into()
    }

    pub async fn list_stock_movements(&self) -> ActionResult<Vec<StockMovement>> {
        self.stockbook.list_movements().await.into()
    }

    pub async fn list_stock_movements_by_product(
        &self,
        product_id: ProductId,
    ) -> ActionResult<Vec<StockMovement>> {
        self.stockbook.list_movements_by_product(product_id).await.into()
    }

    pub async fn reconcile_stock(&self, target: StockTarget) -> ActionResult<Reconciliation> {
        self.stockbook.reconcile(target).await.into()
    }

    pub async fn create_purchase_order(&self, input: CreateOrderInput) -> ActionResult<PurchaseOrderView> {
        self.stockbook.create_order(input).await.into()
    }

    pub async fn update_purchase_order_status(
        &self,
        order_id: PurchaseOrderId,
        status: PurchaseOrderStatus,
    ) -> ActionResult<PurchaseOrderView> {
        self.stockbook.transition_status(order_id, status).await.into()
    }

    pub async fn delete_purchase_order(&self, order_id: PurchaseOrderId) -> ActionResult<()> {
        self.stockbook.delete_order(order_id).await.into()
    }

    pub async fn delete_purchase_orders(&self, order_ids: &[PurchaseOrderId]) -> ActionResult<DeletedCount> {
        self.stockbook
            .delete_orders(order_ids)
            .await
            .map(|deleted| DeletedCount { deleted })
            .into()
    }

    pub async fn get_purchase_order(&self, order_id: PurchaseOrderId) -> ActionResult<PurchaseOrderView> {
        self.stockbook.get_order(order_id).await.into()
    }

    pub async fn list_purchase_orders(&self) -> ActionResult<Vec<PurchaseOrderView>> {
        self.stockbook.list_orders().await.into()
    }

    pub async fn add_purchase_payment(
        &self,
        order_id: PurchaseOrderId,
        input: PaymentInput,
    ) -> ActionResult<PurchasePayment> {
        self.stockbook.add_payment(order_id, input).await.into()
    }
}
