use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument, warn};

use stockbook_core::{ExpectedVersion, SupplierId};
use stockbook_events::{EventBus, EventEnvelope, execute};
use stockbook_inventory::{
    MovementId, ReceiveStock, StockCommand, StockEvent, StockLevel, StockTarget,
};
use stockbook_purchasing::{
    ChangeStatus, CreatePurchaseOrder, DeletePurchaseOrder, GoodsReceived, NewOrderLine,
    OrderItemId, OrderLineInput, PurchaseOrder, PurchaseOrderCommand, PurchaseOrderEvent,
    PurchaseOrderId, PurchaseOrderStatus, PurchaseOrderView, new_order_code,
};

use super::ledger::recorded_movements;
use super::{ORDER_AGGREGATE, STOCK_AGGREGATE, ServiceError, Stockbook};
use crate::store::{ChangeSet, InventoryStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderInput {
    pub supplier_id: SupplierId,
    pub order_date: DateTime<Utc>,
    pub items: Vec<OrderLineInput>,
    /// Defaults to `DRAFT`.
    pub status: Option<PurchaseOrderStatus>,
    pub notes: Option<String>,
}

fn line_target(line: &OrderLineInput) -> StockTarget {
    StockTarget {
        product_id: line.product_id,
        variant_id: line.variant_id,
    }
}

/// Receipt staging for one target: the evolving level plus the version it was read at.
struct StagedStock {
    level: StockLevel,
    loaded_version: u64,
    events: Vec<StockEvent>,
}

impl<S, B> Stockbook<S, B>
where
    S: InventoryStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Create a purchase order with a freshly generated code.
    ///
    /// Codes are retried on collision, up to the configured number of attempts.
    #[instrument(
        skip(self, input),
        fields(supplier_id = %input.supplier_id, item_count = input.items.len()),
        err
    )]
    pub async fn create_order(&self, input: CreateOrderInput) -> Result<PurchaseOrderView, ServiceError> {
        if self.store.supplier_name(input.supplier_id).await?.is_none() {
            return Err(ServiceError::NotFound(format!("supplier {}", input.supplier_id)));
        }
        for line in &input.items {
            self.catalog_entry(line_target(line)).await?;
        }

        let lines: Vec<NewOrderLine> = input
            .items
            .iter()
            .map(|line| NewOrderLine {
                item_id: OrderItemId::generate(),
                line: line.clone(),
            })
            .collect();

        for attempt in 1..=self.code_attempts {
            let now = Utc::now();
            let code = new_order_code(now);
            if self.store.order_code_exists(&code).await? {
                debug!(attempt, code = %code, "purchase order code taken, retrying");
                continue;
            }

            let order_id = PurchaseOrderId::generate();
            let mut order = PurchaseOrder::empty(order_id);
            let command = PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
                order_id,
                code: code.clone(),
                supplier_id: input.supplier_id,
                order_date: input.order_date,
                lines: lines.clone(),
                status: input.status,
                notes: input.notes.clone(),
                occurred_at: now,
            });
            let events = execute(&mut order, &command)?;
            let record = order.to_record()?;

            let mut changes = ChangeSet::new();
            changes.save_order(record.clone(), ExpectedVersion::Exact(0));
            match self.store.commit(changes).await {
                Ok(()) => {
                    info!(
                        order_id = %order_id,
                        code = %record.code,
                        total_amount = %record.total_amount,
                        "purchase order created"
                    );
                    self.publish(order_id.0, ORDER_AGGREGATE, 0, &events);
                    return Ok(record.into());
                }
                Err(StoreError::DuplicateCode(code)) => {
                    debug!(attempt, code = %code, "purchase order code claimed concurrently, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!(attempts = self.code_attempts, "could not allocate a purchase order code");
        Err(ServiceError::Conflict(format!(
            "no free purchase order code after {} attempts",
            self.code_attempts
        )))
    }

    /// Move an order to `status`. Moving to `RECEIVED` posts one receipt movement per
    /// line, and the movements, counters and order are committed together.
    #[instrument(skip(self), fields(order_id = %order_id, status = %status), err)]
    pub async fn transition_status(
        &self,
        order_id: PurchaseOrderId,
        status: PurchaseOrderStatus,
    ) -> Result<PurchaseOrderView, ServiceError> {
        let record = self.load_order(order_id).await?;
        let loaded_version = record.version;
        let mut order = PurchaseOrder::from_record(record);

        let now = Utc::now();
        let command = PurchaseOrderCommand::ChangeStatus(ChangeStatus {
            order_id,
            status,
            occurred_at: now,
        });
        let events = execute(&mut order, &command)?;

        let mut changes = ChangeSet::new();
        let receipt = events.iter().find_map(|event| match event {
            PurchaseOrderEvent::GoodsReceived(e) => Some(e),
            _ => None,
        });
        let staged = match receipt {
            Some(receipt) => self.stage_receipt(receipt, &mut changes).await?,
            None => BTreeMap::new(),
        };

        changes.save_order(order.to_record()?, ExpectedVersion::Exact(loaded_version));
        let posted_movements = changes.inserted_movements().len();
        self.store.commit(changes).await?;

        info!(
            code = order.code(),
            to = %order.status(),
            posted_movements,
            "purchase order status changed"
        );
        self.publish(order_id.0, ORDER_AGGREGATE, loaded_version, &events);
        for (target, stock) in &staged {
            self.publish(target.aggregate_id(), STOCK_AGGREGATE, stock.loaded_version, &stock.events);
        }

        Ok(order.to_record()?.into())
    }

    /// Post one receipt movement per line into `changes`.
    ///
    /// Lines on the same target chain: each is decided against the level the
    /// previous line left behind, and the counter is written once with the
    /// version first read.
    async fn stage_receipt(
        &self,
        receipt: &GoodsReceived,
        changes: &mut ChangeSet,
    ) -> Result<BTreeMap<StockTarget, StagedStock>, ServiceError> {
        let supplier = self
            .store
            .supplier_name(receipt.supplier_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("supplier {}", receipt.supplier_id)))?;
        let notes = format!("Received from {supplier}");

        let mut staged: BTreeMap<StockTarget, StagedStock> = BTreeMap::new();
        for line in &receipt.lines {
            let target = StockTarget {
                product_id: line.product_id,
                variant_id: line.variant_id,
            };
            let stock = match staged.entry(target) {
                Entry::Occupied(slot) => slot.into_mut(),
                Entry::Vacant(slot) => {
                    let entry = self.catalog_entry(target).await?;
                    slot.insert(StagedStock {
                        level: StockLevel::new(target, entry.stock, entry.stock_version),
                        loaded_version: entry.stock_version,
                        events: Vec::new(),
                    })
                }
            };

            let command = StockCommand::ReceiveStock(ReceiveStock {
                movement_id: MovementId::generate(),
                target,
                quantity: line.received_qty,
                reference: receipt.code.clone(),
                notes: Some(notes.clone()),
                occurred_at: receipt.occurred_at,
            });
            let events = execute(&mut stock.level, &command)?;
            for movement in recorded_movements(&events) {
                changes.insert_movement(movement.clone());
            }
            stock.events.extend(events);
        }

        for (target, stock) in &staged {
            changes.write_stock(
                *target,
                ExpectedVersion::Exact(stock.loaded_version),
                stock.level.stock(),
            );
        }

        Ok(staged)
    }

    /// Delete an order with its items and payments. Stock already received stays.
    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub async fn delete_order(&self, order_id: PurchaseOrderId) -> Result<(), ServiceError> {
        let record = self.load_order(order_id).await?;
        let loaded_version = record.version;
        let mut order = PurchaseOrder::from_record(record);

        let command = PurchaseOrderCommand::DeletePurchaseOrder(DeletePurchaseOrder {
            order_id,
            occurred_at: Utc::now(),
        });
        let events = execute(&mut order, &command)?;

        if order.status() == PurchaseOrderStatus::Received {
            warn!(
                code = order.code(),
                "deleting a received purchase order; its stock movements are kept"
            );
        }

        let mut changes = ChangeSet::new();
        changes.delete_order(order_id);
        self.store.commit(changes).await?;

        info!(code = order.code(), "purchase order deleted");
        self.publish(order_id.0, ORDER_AGGREGATE, loaded_version, &events);

        Ok(())
    }

    /// Delete every existing order in `order_ids` in one commit.
    ///
    /// Unknown ids are skipped. Returns how many orders were deleted.
    #[instrument(skip(self, order_ids), fields(requested = order_ids.len()), err)]
    pub async fn delete_orders(&self, order_ids: &[PurchaseOrderId]) -> Result<usize, ServiceError> {
        let mut seen = Vec::with_capacity(order_ids.len());
        let mut deleted = Vec::new();
        let now = Utc::now();

        for &order_id in order_ids {
            if seen.contains(&order_id) {
                continue;
            }
            seen.push(order_id);

            let Some(record) = self.store.order(order_id).await? else {
                debug!(order_id = %order_id, "skipping unknown purchase order");
                continue;
            };
            let loaded_version = record.version;
            let mut order = PurchaseOrder::from_record(record);
            let command = PurchaseOrderCommand::DeletePurchaseOrder(DeletePurchaseOrder {
                order_id,
                occurred_at: now,
            });
            let events = execute(&mut order, &command)?;

            if order.status() == PurchaseOrderStatus::Received {
                warn!(
                    code = order.code(),
                    "deleting a received purchase order; its stock movements are kept"
                );
            }
            deleted.push((order_id, loaded_version, events));
        }

        if deleted.is_empty() {
            return Ok(0);
        }

        let mut changes = ChangeSet::new();
        for (order_id, _, _) in &deleted {
            changes.delete_order(*order_id);
        }
        self.store.commit(changes).await?;

        info!(deleted = deleted.len(), "purchase orders deleted");
        for (order_id, loaded_version, events) in &deleted {
            self.publish(order_id.0, ORDER_AGGREGATE, *loaded_version, events);
        }

        Ok(deleted.len())
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub async fn get_order(&self, order_id: PurchaseOrderId) -> Result<PurchaseOrderView, ServiceError> {
        Ok(self.load_order(order_id).await?.into())
    }

    /// Every order, newest first.
    #[instrument(skip(self), err)]
    pub async fn list_orders(&self) -> Result<Vec<PurchaseOrderView>, ServiceError> {
        let orders = self.store.orders().await?;
        Ok(orders.into_iter().map(PurchaseOrderView::from).collect())
    }
}
