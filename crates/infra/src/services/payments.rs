use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, instrument};

use stockbook_core::{DomainError, ExpectedVersion, Money};
use stockbook_events::{EventBus, EventEnvelope, execute};
use stockbook_purchasing::{
    PaymentId, PurchaseOrder, PurchaseOrderCommand, PurchaseOrderEvent, PurchaseOrderId,
    PurchasePayment, RecordPayment,
};

use super::{ORDER_AGGREGATE, ServiceError, Stockbook};
use crate::store::{ChangeSet, InventoryStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInput {
    pub amount: Money,
    pub payment_date: DateTime<Utc>,
    pub method: Option<String>,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

impl<S, B> Stockbook<S, B>
where
    S: InventoryStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Record a payment against an order and re-derive its payment status.
    ///
    /// Payments beyond the order total are accepted.
    #[instrument(skip(self, input), fields(order_id = %order_id, amount = %input.amount), err)]
    pub async fn add_payment(
        &self,
        order_id: PurchaseOrderId,
        input: PaymentInput,
    ) -> Result<PurchasePayment, ServiceError> {
        let record = self.load_order(order_id).await?;
        let loaded_version = record.version;
        let mut order = PurchaseOrder::from_record(record);

        let command = PurchaseOrderCommand::RecordPayment(RecordPayment {
            payment_id: PaymentId::generate(),
            order_id,
            amount: input.amount,
            payment_date: input.payment_date,
            method: input.method,
            reference: input.reference,
            notes: input.notes,
            occurred_at: Utc::now(),
        });
        let events = execute(&mut order, &command)?;

        let payment = events
            .iter()
            .find_map(|event| match event {
                PurchaseOrderEvent::PaymentRecorded(e) => Some(e.payment.clone()),
                _ => None,
            })
            .ok_or_else(|| DomainError::invariant("no payment was recorded"))?;

        let mut changes = ChangeSet::new();
        changes.save_order(order.to_record()?, ExpectedVersion::Exact(loaded_version));
        self.store.commit(changes).await?;

        info!(
            payment_id = %payment.id,
            paid_amount = %order.paid_amount(),
            payment_status = %order.payment_status(),
            "payment recorded"
        );
        self.publish(order_id.0, ORDER_AGGREGATE, loaded_version, &events);

        Ok(payment)
    }
}
