use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{Aggregate, AggregateRoot, DomainError};
use stockbook_events::Event;

use crate::movement::{
    MovementId, MovementType, StockMovement, StockTarget, is_purchase_order_reference,
};

/// Aggregate root: the on-hand stock of one product or variant.
///
/// The counter itself lives in the catalog; this aggregate is loaded from the
/// catalog's `(stock, version)` pair, decides movements, and hands the evolved
/// counter back to be written in the same commit as the movement rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLevel {
    target: StockTarget,
    stock: i64,
    version: u64,
}

impl StockLevel {
    /// Rehydrate from the catalog counter and its version.
    pub fn new(target: StockTarget, stock: i64, version: u64) -> Self {
        Self {
            target,
            stock,
            version,
        }
    }

    pub fn target(&self) -> StockTarget {
        self.target
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }
}

impl AggregateRoot for StockLevel {
    type Id = StockTarget;

    fn id(&self) -> &Self::Id {
        &self.target
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PostMovement (manual OUT or ADJUSTMENT).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostMovement {
    pub movement_id: MovementId,
    pub target: StockTarget,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveStock (IN posted by a purchase order receipt).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveStock {
    pub movement_id: MovementId,
    pub target: StockTarget,
    pub quantity: i64,
    /// Purchase order code.
    pub reference: String,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReverseMovement (restore `stock_before` and drop the movement).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseMovement {
    pub movement: StockMovement,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockCommand {
    PostMovement(PostMovement),
    ReceiveStock(ReceiveStock),
    ReverseMovement(ReverseMovement),
}

/// Event: MovementRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecorded {
    pub movement: StockMovement,
}

/// Event: MovementReversed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementReversed {
    pub movement_id: MovementId,
    pub target: StockTarget,
    pub stock_before_reversal: i64,
    pub restored_stock: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockEvent {
    MovementRecorded(MovementRecorded),
    MovementReversed(MovementReversed),
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::MovementRecorded(_) => "inventory.stock.movement_recorded",
            StockEvent::MovementReversed(_) => "inventory.stock.movement_reversed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::MovementRecorded(e) => e.movement.created_at,
            StockEvent::MovementReversed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for StockLevel {
    type Command = StockCommand;
    type Event = StockEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockEvent::MovementRecorded(e) => {
                self.stock = e.movement.stock_after;
            }
            StockEvent::MovementReversed(e) => {
                self.stock = e.restored_stock;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockCommand::PostMovement(cmd) => self.handle_post(cmd),
            StockCommand::ReceiveStock(cmd) => self.handle_receive(cmd),
            StockCommand::ReverseMovement(cmd) => self.handle_reverse(cmd),
        }
    }
}

const MANUAL_IN_REJECTED: &str =
    "manual IN movements are not allowed; receive a purchase order instead";

/// Manual postings may only take stock out or recount it; IN comes from receipts.
pub fn ensure_manual_movement_type(movement_type: MovementType) -> Result<(), DomainError> {
    if movement_type == MovementType::In {
        return Err(DomainError::validation(MANUAL_IN_REJECTED));
    }
    Ok(())
}

impl StockLevel {
    fn ensure_target(&self, target: StockTarget) -> Result<(), DomainError> {
        if self.target != target {
            return Err(DomainError::invariant("movement targets another stock record"));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn recorded(
        &self,
        movement_id: MovementId,
        movement_type: MovementType,
        quantity: i64,
        stock_after: i64,
        reference: Option<String>,
        notes: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> Vec<StockEvent> {
        vec![StockEvent::MovementRecorded(MovementRecorded {
            movement: StockMovement {
                id: movement_id,
                product_id: self.target.product_id,
                variant_id: self.target.variant_id,
                movement_type,
                quantity,
                stock_before: self.stock,
                stock_after,
                reference,
                notes,
                created_at: occurred_at,
            },
        })]
    }

    fn handle_post(&self, cmd: &PostMovement) -> Result<Vec<StockEvent>, DomainError> {
        ensure_manual_movement_type(cmd.movement_type)?;
        self.ensure_target(cmd.target)?;

        if let Some(reference) = cmd.reference.as_deref() {
            if is_purchase_order_reference(reference) {
                return Err(DomainError::validation(
                    "references starting with \"PO\" are reserved for purchase order receipts",
                ));
            }
        }

        let stock_after = match cmd.movement_type {
            MovementType::In => {
                return Err(DomainError::validation(MANUAL_IN_REJECTED));
            }
            MovementType::Out => {
                if cmd.quantity <= 0 {
                    return Err(DomainError::validation("quantity must be positive"));
                }
                if cmd.quantity > self.stock {
                    return Err(DomainError::insufficient_stock(self.stock));
                }
                self.stock - cmd.quantity
            }
            MovementType::Adjustment => {
                if cmd.quantity < 0 {
                    return Err(DomainError::validation("adjusted stock cannot be negative"));
                }
                cmd.quantity
            }
        };

        Ok(self.recorded(
            cmd.movement_id,
            cmd.movement_type,
            cmd.quantity,
            stock_after,
            cmd.reference.clone(),
            cmd.notes.clone(),
            cmd.occurred_at,
        ))
    }

    fn handle_receive(&self, cmd: &ReceiveStock) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_target(cmd.target)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("received quantity must be positive"));
        }
        if !is_purchase_order_reference(&cmd.reference) {
            return Err(DomainError::invariant(
                "receipt movements must reference a purchase order code",
            ));
        }

        let stock_after = self
            .stock
            .checked_add(cmd.quantity)
            .ok_or_else(|| DomainError::validation("stock overflow"))?;

        Ok(self.recorded(
            cmd.movement_id,
            MovementType::In,
            cmd.quantity,
            stock_after,
            Some(cmd.reference.clone()),
            cmd.notes.clone(),
            cmd.occurred_at,
        ))
    }

    fn handle_reverse(&self, cmd: &ReverseMovement) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_target(cmd.movement.target())?;

        if cmd.movement.is_purchase_order_receipt() {
            return Err(DomainError::validation(
                "movements posted by a purchase order cannot be deleted; delete the purchase order instead",
            ));
        }

        Ok(vec![StockEvent::MovementReversed(MovementReversed {
            movement_id: cmd.movement.id,
            target: self.target,
            stock_before_reversal: self.stock,
            restored_stock: cmd.movement.stock_before,
            occurred_at: cmd.occurred_at,
        })])
    }
}
