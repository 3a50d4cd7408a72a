//! Application services: load, decide, commit, publish.
//!
//! ```text
//! Store (load) → Aggregate (handle/apply) → Store (commit ChangeSet) → EventBus (publish)
//! ```
//!
//! Each public operation is one request with exactly one commit. Domain rules
//! live in the aggregates; services only gather state, stage the resulting
//! writes and publish the committed events on the change feed.

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::warn;

use stockbook_core::AggregateId;
use stockbook_events::{Event, EventBus, EventEnvelope};
use stockbook_inventory::StockTarget;
use stockbook_purchasing::{PurchaseOrderId, PurchaseOrderRecord};

use crate::store::{CatalogEntry, InventoryStore};

pub mod error;
pub mod ledger;
pub mod orders;
pub mod payments;

pub use error::ServiceError;
pub use ledger::PostMovementInput;
pub use orders::CreateOrderInput;
pub use payments::PaymentInput;

/// Aggregate type tag of stock counter events on the change feed.
pub const STOCK_AGGREGATE: &str = "inventory.stock";
/// Aggregate type tag of purchase order events on the change feed.
pub const ORDER_AGGREGATE: &str = "purchasing.order";

/// Default number of purchase order codes tried before giving up.
pub const DEFAULT_CODE_ATTEMPTS: u32 = 5;

/// Entry point for every inventory, purchasing and payment operation.
#[derive(Debug)]
pub struct Stockbook<S, B> {
    store: S,
    bus: B,
    code_attempts: u32,
}

impl<S, B> Stockbook<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            code_attempts: DEFAULT_CODE_ATTEMPTS,
        }
    }

    /// How many codes `create_order` tries before reporting a conflict (at least one).
    pub fn with_code_attempts(mut self, attempts: u32) -> Self {
        self.code_attempts = attempts.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> Stockbook<S, B>
where
    S: InventoryStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    async fn catalog_entry(&self, target: StockTarget) -> Result<CatalogEntry, ServiceError> {
        self.store
            .stock_level(target)
            .await?
            .ok_or_else(|| ServiceError::NotFound(target.to_string()))
    }

    async fn load_order(&self, order_id: PurchaseOrderId) -> Result<PurchaseOrderRecord, ServiceError> {
        self.store
            .order(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("purchase order {order_id}")))
    }

    /// Publish committed events on the change feed.
    ///
    /// Best-effort: the commit already happened, so failures are logged and
    /// swallowed. `base_version` is the aggregate version before the first event.
    fn publish<E>(&self, aggregate_id: AggregateId, aggregate_type: &str, base_version: u64, events: &[E])
    where
        E: Event + Serialize,
    {
        for (idx, event) in events.iter().enumerate() {
            let version = base_version + idx as u64 + 1;
            let envelope = match EventEnvelope::from_typed(aggregate_id, aggregate_type, version, event) {
                Ok(envelope) => envelope,
                Err(err) => {
                    warn!(
                        error = %err,
                        event_type = event.event_type(),
                        "failed to serialize event for the change feed"
                    );
                    continue;
                }
            };

            if let Err(err) = self.bus.publish(envelope) {
                warn!(
                    error = ?err,
                    event_type = event.event_type(),
                    aggregate_id = %aggregate_id,
                    "change feed publication failed"
                );
            }
        }
    }
}
