use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, instrument, warn};

use stockbook_core::{DomainError, ExpectedVersion, ProductId, VariantId};
use stockbook_events::{EventBus, EventEnvelope, execute};
use stockbook_inventory::{
    MovementId, MovementType, PostMovement, Reconciliation, ReverseMovement, StockCommand,
    StockEvent, StockLevel, StockMovement, StockTarget, ensure_manual_movement_type,
};

use super::{STOCK_AGGREGATE, ServiceError, Stockbook};
use crate::store::{ChangeSet, InventoryStore, MovementFilter};

/// Manual stock movement (`OUT` or `ADJUSTMENT`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMovementInput {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub quantity: i64,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

impl PostMovementInput {
    pub fn target(&self) -> StockTarget {
        StockTarget {
            product_id: self.product_id,
            variant_id: self.variant_id,
        }
    }
}

/// Movements carried by `MovementRecorded` events, in order.
pub(crate) fn recorded_movements(events: &[StockEvent]) -> impl Iterator<Item = &StockMovement> {
    events.iter().filter_map(|event| match event {
        StockEvent::MovementRecorded(e) => Some(&e.movement),
        StockEvent::MovementReversed(_) => None,
    })
}

impl<S, B> Stockbook<S, B>
where
    S: InventoryStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Post a manual movement and write the new counter in the same commit.
    #[instrument(
        skip(self, input),
        fields(
            product_id = %input.product_id,
            movement_type = %input.movement_type,
            quantity = input.quantity
        ),
        err
    )]
    pub async fn post_movement(&self, input: PostMovementInput) -> Result<StockMovement, ServiceError> {
        // IN is refused before touching the catalog.
        ensure_manual_movement_type(input.movement_type)?;

        let target = input.target();
        let entry = self.catalog_entry(target).await?;
        let mut level = StockLevel::new(target, entry.stock, entry.stock_version);

        let command = StockCommand::PostMovement(PostMovement {
            movement_id: MovementId::generate(),
            target,
            movement_type: input.movement_type,
            quantity: input.quantity,
            reference: input.reference,
            notes: input.notes,
            occurred_at: Utc::now(),
        });
        let events = execute(&mut level, &command)?;

        let movement = recorded_movements(&events)
            .next()
            .cloned()
            .ok_or_else(|| DomainError::invariant("no movement was recorded"))?;

        let mut changes = ChangeSet::new();
        changes.write_stock(target, ExpectedVersion::Exact(entry.stock_version), level.stock());
        changes.insert_movement(movement.clone());
        self.store.commit(changes).await?;

        info!(
            movement_id = %movement.id,
            stock_before = movement.stock_before,
            stock_after = movement.stock_after,
            "stock movement posted"
        );
        self.publish(target.aggregate_id(), STOCK_AGGREGATE, entry.stock_version, &events);

        Ok(movement)
    }

    /// Delete a manual movement, restoring its target to the movement's `stock_before`.
    ///
    /// The restore is point-in-time: movements posted on the same target after
    /// this one are not replayed, so their effect is overwritten.
    #[instrument(skip(self), fields(movement_id = %movement_id), err)]
    pub async fn reverse_movement(&self, movement_id: MovementId) -> Result<StockMovement, ServiceError> {
        let movement = self
            .store
            .movement(movement_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("stock movement {movement_id}")))?;

        let target = movement.target();
        let entry = self.catalog_entry(target).await?;

        let mut level = StockLevel::new(target, entry.stock, entry.stock_version);
        let command = StockCommand::ReverseMovement(ReverseMovement {
            movement: movement.clone(),
            occurred_at: Utc::now(),
        });
        let events = execute(&mut level, &command)?;

        let history = self.store.movements(MovementFilter::Target(target)).await?;
        let later = history
            .iter()
            .position(|m| m.id == movement_id)
            .map(|idx| history.len() - idx - 1)
            .unwrap_or(0);
        if later > 0 {
            warn!(
                later_movements = later,
                restored_stock = movement.stock_before,
                current_stock = entry.stock,
                "reversing a movement that later movements built on; their effect is overwritten"
            );
        }

        let mut changes = ChangeSet::new();
        changes.write_stock(target, ExpectedVersion::Exact(entry.stock_version), level.stock());
        changes.delete_movement(movement_id);
        self.store.commit(changes).await?;

        info!(restored_stock = level.stock(), "stock movement reversed");
        self.publish(target.aggregate_id(), STOCK_AGGREGATE, entry.stock_version, &events);

        Ok(movement)
    }

    /// Every movement, newest first.
    #[instrument(skip(self), err)]
    pub async fn list_movements(&self) -> Result<Vec<StockMovement>, ServiceError> {
        let mut movements = self.store.movements(MovementFilter::All).await?;
        movements.reverse();
        Ok(movements)
    }

    /// Movements of one product and all its variants, newest first.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn list_movements_by_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<StockMovement>, ServiceError> {
        let mut movements = self
            .store
            .movements(MovementFilter::Product(product_id))
            .await?;
        movements.reverse();
        Ok(movements)
    }

    /// Compare a counter with the projection of its surviving movements.
    #[instrument(skip(self, target), fields(stock_target = %target), err)]
    pub async fn reconcile(&self, target: StockTarget) -> Result<Reconciliation, ServiceError> {
        let entry = self.catalog_entry(target).await?;
        let movements = self.store.movements(MovementFilter::Target(target)).await?;
        let reconciliation = Reconciliation::compute(target, entry.stock, &movements);

        if !reconciliation.is_consistent() {
            warn!(
                counter = reconciliation.counter,
                projected = reconciliation.projected,
                drift = reconciliation.drift(),
                "stock counter drifted from its movement log"
            );
        }

        Ok(reconciliation)
    }
}
