use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{AggregateId, Entity, Money};

use crate::order::PurchaseOrderId;

/// Payment identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(pub AggregateId);

impl PaymentId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for PaymentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Settlement state of a purchase order, derived from its paid amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
}

impl PaymentStatus {
    /// `paid >= total` is paid (overpayment included), anything above zero is partial.
    pub fn derive(paid: Money, total: Money) -> Self {
        if paid >= total {
            PaymentStatus::Paid
        } else if paid.is_positive() {
            PaymentStatus::Partial
        } else {
            PaymentStatus::Unpaid
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "UNPAID",
            PaymentStatus::Partial => "PARTIAL",
            PaymentStatus::Paid => "PAID",
        }
    }
}

impl core::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for PaymentStatus {
    type Err = stockbook_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNPAID" => Ok(PaymentStatus::Unpaid),
            "PARTIAL" => Ok(PaymentStatus::Partial),
            "PAID" => Ok(PaymentStatus::Paid),
            other => Err(stockbook_core::DomainError::validation(format!(
                "unknown payment status '{other}'"
            ))),
        }
    }
}

/// A payment made against a purchase order. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasePayment {
    pub id: PaymentId,
    pub order_id: PurchaseOrderId,
    pub amount: Money,
    pub payment_date: DateTime<Utc>,
    pub method: Option<String>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Entity for PurchasePayment {
    type Id = PaymentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_paid_against_total() {
        let total = Money::new(1_000);
        assert_eq!(PaymentStatus::derive(Money::ZERO, total), PaymentStatus::Unpaid);
        assert_eq!(PaymentStatus::derive(Money::new(400), total), PaymentStatus::Partial);
        assert_eq!(PaymentStatus::derive(Money::new(1_000), total), PaymentStatus::Paid);
        assert_eq!(PaymentStatus::derive(Money::new(1_500), total), PaymentStatus::Paid);
    }

    #[test]
    fn free_order_counts_as_paid() {
        assert_eq!(PaymentStatus::derive(Money::ZERO, Money::ZERO), PaymentStatus::Paid);
    }

    #[test]
    fn wire_names_are_uppercase() {
        assert_eq!(PaymentStatus::Partial.to_string(), "PARTIAL");
        assert_eq!("PAID".parse::<PaymentStatus>().unwrap(), PaymentStatus::Paid);
        assert!("paid".parse::<PaymentStatus>().is_err());
    }
}
