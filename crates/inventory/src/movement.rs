use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{AggregateId, DomainError, Entity, ProductId, VariantId};

/// Reference prefix carried by every movement posted by a purchase order receipt.
pub const PURCHASE_ORDER_REFERENCE_PREFIX: &str = "PO";

/// Whether a movement reference marks a purchase order receipt.
pub fn is_purchase_order_reference(reference: &str) -> bool {
    reference.starts_with(PURCHASE_ORDER_REFERENCE_PREFIX)
}

/// Stock movement identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementId(pub AggregateId);

impl MovementId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for MovementId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Kind of stock change.
///
/// For `In`/`Out` the movement quantity is a delta magnitude; for `Adjustment`
/// it is the absolute stock after a physical recount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    In,
    Out,
    Adjustment,
}

impl MovementType {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::In => "IN",
            MovementType::Out => "OUT",
            MovementType::Adjustment => "ADJUSTMENT",
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN" => Ok(MovementType::In),
            "OUT" => Ok(MovementType::Out),
            "ADJUSTMENT" => Ok(MovementType::Adjustment),
            other => Err(DomainError::validation(format!(
                "unknown movement type '{other}'"
            ))),
        }
    }
}

/// The stock counter a movement applies to: a simple product, or one of its variants.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockTarget {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
}

impl StockTarget {
    pub fn product(product_id: ProductId) -> Self {
        Self {
            product_id,
            variant_id: None,
        }
    }

    pub fn variant(product_id: ProductId, variant_id: VariantId) -> Self {
        Self {
            product_id,
            variant_id: Some(variant_id),
        }
    }

    /// Identifier of the record that owns the counter (variant if any, else product).
    pub fn aggregate_id(&self) -> AggregateId {
        match self.variant_id {
            Some(v) => AggregateId::from_uuid(*v.as_uuid()),
            None => AggregateId::from_uuid(*self.product_id.as_uuid()),
        }
    }
}

impl core::fmt::Display for StockTarget {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.variant_id {
            Some(v) => write!(f, "product {} / variant {}", self.product_id, v),
            None => write!(f, "product {}", self.product_id),
        }
    }
}

/// One immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub id: MovementId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub quantity: i64,
    pub stock_before: i64,
    pub stock_after: i64,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    pub fn target(&self) -> StockTarget {
        StockTarget {
            product_id: self.product_id,
            variant_id: self.variant_id,
        }
    }

    /// Posted by a purchase order receipt (and therefore only removable with the order).
    pub fn is_purchase_order_receipt(&self) -> bool {
        self.reference
            .as_deref()
            .is_some_and(is_purchase_order_reference)
    }

    /// Net change this movement made to the counter.
    pub fn delta(&self) -> i64 {
        self.stock_after - self.stock_before
    }
}

impl Entity for StockMovement {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
