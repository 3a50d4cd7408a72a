use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult, Money, ProductId,
    SupplierId, VariantId,
};
use stockbook_events::Event;

use crate::payment::{PaymentId, PaymentStatus, PurchasePayment};

/// Purchase order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseOrderId(pub AggregateId);

impl PurchaseOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for PurchaseOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Purchase order line identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderItemId(pub AggregateId);

impl OrderItemId {
    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

/// Purchase order status lifecycle.
///
/// `Received` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseOrderStatus {
    Draft,
    Ordered,
    Received,
    Cancelled,
}

impl PurchaseOrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::Received | PurchaseOrderStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PurchaseOrderStatus::Draft => "DRAFT",
            PurchaseOrderStatus::Ordered => "ORDERED",
            PurchaseOrderStatus::Received => "RECEIVED",
            PurchaseOrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl core::fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for PurchaseOrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(PurchaseOrderStatus::Draft),
            "ORDERED" => Ok(PurchaseOrderStatus::Ordered),
            "RECEIVED" => Ok(PurchaseOrderStatus::Received),
            "CANCELLED" => Ok(PurchaseOrderStatus::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown purchase order status '{other}'"
            ))),
        }
    }
}

/// Caller-supplied line of a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineInput {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: i64,
    pub unit_price: Money,
}

/// Purchase order line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: i64,
    pub unit_price: Money,
    pub total_price: Money,
    /// 0 until the order is received, then `quantity`.
    pub received_qty: i64,
}

/// Persisted shape of a purchase order, items and payments included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrderRecord {
    pub id: PurchaseOrderId,
    pub code: String,
    pub supplier_id: SupplierId,
    pub status: PurchaseOrderStatus,
    pub payment_status: PaymentStatus,
    pub total_amount: Money,
    pub paid_amount: Money,
    pub order_date: DateTime<Utc>,
    pub received_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderLine>,
    pub payments: Vec<PurchasePayment>,
    pub version: u64,
}

impl PurchaseOrderRecord {
    /// Outstanding amount; negative when the supplier was overpaid.
    pub fn debt(&self) -> Money {
        Money::new(
            self.total_amount
                .minor_units()
                .saturating_sub(self.paid_amount.minor_units()),
        )
    }
}

/// Order as returned to callers: the record plus its outstanding debt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrderView {
    #[serde(flatten)]
    pub order: PurchaseOrderRecord,
    pub debt: Money,
}

impl From<PurchaseOrderRecord> for PurchaseOrderView {
    fn from(order: PurchaseOrderRecord) -> Self {
        let debt = order.debt();
        Self { order, debt }
    }
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    code: String,
    supplier_id: Option<SupplierId>,
    status: PurchaseOrderStatus,
    payment_status: PaymentStatus,
    total_amount: Money,
    paid_amount: Money,
    order_date: Option<DateTime<Utc>>,
    received_date: Option<DateTime<Utc>>,
    notes: Option<String>,
    created_at: Option<DateTime<Utc>>,
    items: Vec<OrderLine>,
    payments: Vec<PurchasePayment>,
    version: u64,
    created: bool,
    deleted: bool,
}

impl PurchaseOrder {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: PurchaseOrderId) -> Self {
        Self {
            id,
            code: String::new(),
            supplier_id: None,
            status: PurchaseOrderStatus::Draft,
            payment_status: PaymentStatus::Unpaid,
            total_amount: Money::ZERO,
            paid_amount: Money::ZERO,
            order_date: None,
            received_date: None,
            notes: None,
            created_at: None,
            items: Vec::new(),
            payments: Vec::new(),
            version: 0,
            created: false,
            deleted: false,
        }
    }

    /// Rehydrate from a stored record.
    pub fn from_record(record: PurchaseOrderRecord) -> Self {
        Self {
            id: record.id,
            code: record.code,
            supplier_id: Some(record.supplier_id),
            status: record.status,
            payment_status: record.payment_status,
            total_amount: record.total_amount,
            paid_amount: record.paid_amount,
            order_date: Some(record.order_date),
            received_date: record.received_date,
            notes: record.notes,
            created_at: Some(record.created_at),
            items: record.items,
            payments: record.payments,
            version: record.version,
            created: true,
            deleted: false,
        }
    }

    /// Snapshot for persistence.
    pub fn to_record(&self) -> DomainResult<PurchaseOrderRecord> {
        let (Some(supplier_id), Some(order_date), Some(created_at)) =
            (self.supplier_id, self.order_date, self.created_at)
        else {
            return Err(DomainError::invariant(
                "purchase order has not been created",
            ));
        };

        Ok(PurchaseOrderRecord {
            id: self.id,
            code: self.code.clone(),
            supplier_id,
            status: self.status,
            payment_status: self.payment_status,
            total_amount: self.total_amount,
            paid_amount: self.paid_amount,
            order_date,
            received_date: self.received_date,
            notes: self.notes.clone(),
            created_at,
            items: self.items.clone(),
            payments: self.payments.clone(),
            version: self.version,
        })
    }

    pub fn id_typed(&self) -> PurchaseOrderId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        self.supplier_id
    }

    pub fn status(&self) -> PurchaseOrderStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn paid_amount(&self) -> Money {
        self.paid_amount
    }

    pub fn received_date(&self) -> Option<DateTime<Utc>> {
        self.received_date
    }

    pub fn items(&self) -> &[OrderLine] {
        &self.items
    }

    pub fn payments(&self) -> &[PurchasePayment] {
        &self.payments
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// A line of a `CreatePurchaseOrder` command, with its pre-assigned id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub item_id: OrderItemId,
    pub line: OrderLineInput,
}

/// Command: CreatePurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchaseOrder {
    pub order_id: PurchaseOrderId,
    pub code: String,
    pub supplier_id: SupplierId,
    pub order_date: DateTime<Utc>,
    pub lines: Vec<NewOrderLine>,
    /// Initial status; `Draft` when absent.
    pub status: Option<PurchaseOrderStatus>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStatus {
    pub order_id: PurchaseOrderId,
    pub status: PurchaseOrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub payment_id: PaymentId,
    pub order_id: PurchaseOrderId,
    pub amount: Money,
    pub payment_date: DateTime<Utc>,
    pub method: Option<String>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeletePurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletePurchaseOrder {
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    CreatePurchaseOrder(CreatePurchaseOrder),
    ChangeStatus(ChangeStatus),
    RecordPayment(RecordPayment),
    DeletePurchaseOrder(DeletePurchaseOrder),
}

/// Event: PurchaseOrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCreated {
    pub order_id: PurchaseOrderId,
    pub code: String,
    pub supplier_id: SupplierId,
    pub status: PurchaseOrderStatus,
    pub order_date: DateTime<Utc>,
    pub items: Vec<OrderLine>,
    pub total_amount: Money,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderStatusChanged (any transition other than receipt).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderStatusChanged {
    pub order_id: PurchaseOrderId,
    pub from: PurchaseOrderStatus,
    pub to: PurchaseOrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GoodsReceived.
///
/// Carries every line so the ledger can post one `IN` movement per line,
/// referencing the order code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceived {
    pub order_id: PurchaseOrderId,
    pub code: String,
    pub supplier_id: SupplierId,
    pub from: PurchaseOrderStatus,
    pub lines: Vec<OrderLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub payment: PurchasePayment,
    pub paid_amount: Money,
    pub payment_status: PaymentStatus,
}

/// Event: PurchaseOrderDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderDeleted {
    pub order_id: PurchaseOrderId,
    pub code: String,
    pub status: PurchaseOrderStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    PurchaseOrderCreated(PurchaseOrderCreated),
    PurchaseOrderStatusChanged(PurchaseOrderStatusChanged),
    GoodsReceived(GoodsReceived),
    PaymentRecorded(PaymentRecorded),
    PurchaseOrderDeleted(PurchaseOrderDeleted),
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(_) => "purchasing.order.created",
            PurchaseOrderEvent::PurchaseOrderStatusChanged(_) => "purchasing.order.status_changed",
            PurchaseOrderEvent::GoodsReceived(_) => "purchasing.order.goods_received",
            PurchaseOrderEvent::PaymentRecorded(_) => "purchasing.order.payment_recorded",
            PurchaseOrderEvent::PurchaseOrderDeleted(_) => "purchasing.order.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderStatusChanged(e) => e.occurred_at,
            PurchaseOrderEvent::GoodsReceived(e) => e.occurred_at,
            PurchaseOrderEvent::PaymentRecorded(e) => e.payment.created_at,
            PurchaseOrderEvent::PurchaseOrderDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => {
                self.id = e.order_id;
                self.code = e.code.clone();
                self.supplier_id = Some(e.supplier_id);
                self.status = e.status;
                self.payment_status = PaymentStatus::Unpaid;
                self.total_amount = e.total_amount;
                self.paid_amount = Money::ZERO;
                self.order_date = Some(e.order_date);
                self.received_date = None;
                self.notes = e.notes.clone();
                self.created_at = Some(e.occurred_at);
                self.items = e.items.clone();
                self.payments.clear();
                self.created = true;
            }
            PurchaseOrderEvent::PurchaseOrderStatusChanged(e) => {
                self.status = e.to;
            }
            PurchaseOrderEvent::GoodsReceived(e) => {
                self.items = e.lines.clone();
                self.status = PurchaseOrderStatus::Received;
                self.received_date = Some(e.occurred_at);
            }
            PurchaseOrderEvent::PaymentRecorded(e) => {
                self.payments.push(e.payment.clone());
                self.paid_amount = e.paid_amount;
                self.payment_status = e.payment_status;
            }
            PurchaseOrderEvent::PurchaseOrderDeleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseOrderCommand::CreatePurchaseOrder(cmd) => self.handle_create(cmd),
            PurchaseOrderCommand::ChangeStatus(cmd) => self.handle_change_status(cmd),
            PurchaseOrderCommand::RecordPayment(cmd) => self.handle_record_payment(cmd),
            PurchaseOrderCommand::DeletePurchaseOrder(cmd) => self.handle_delete(cmd),
        }
    }
}

impl PurchaseOrder {
    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.created || self.deleted {
            return Err(DomainError::not_found("purchase order"));
        }
        Ok(())
    }

    fn ensure_order_id(&self, order_id: PurchaseOrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(
        &self,
        cmd: &CreatePurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("purchase order already exists"));
        }

        // Receipt only happens through a transition, so an order cannot be born received.
        let status = cmd.status.unwrap_or(PurchaseOrderStatus::Draft);
        if status == PurchaseOrderStatus::Received {
            return Err(DomainError::validation(format!(
                "a purchase order cannot be created as {status}"
            )));
        }

        if cmd.lines.is_empty() {
            return Err(DomainError::validation(
                "a purchase order needs at least one item",
            ));
        }

        let mut items = Vec::with_capacity(cmd.lines.len());
        let mut total_amount = Money::ZERO;
        for NewOrderLine { item_id, line } in &cmd.lines {
            if line.quantity <= 0 {
                return Err(DomainError::validation("quantity must be positive"));
            }
            if line.unit_price.is_negative() {
                return Err(DomainError::validation("unit price cannot be negative"));
            }

            let total_price = line.unit_price.checked_mul(line.quantity)?;
            total_amount = total_amount.checked_add(total_price)?;
            items.push(OrderLine {
                id: *item_id,
                product_id: line.product_id,
                variant_id: line.variant_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                total_price,
                received_qty: 0,
            });
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCreated(
            PurchaseOrderCreated {
                order_id: cmd.order_id,
                code: cmd.code.clone(),
                supplier_id: cmd.supplier_id,
                status,
                order_date: cmd.order_date,
                items,
                total_amount,
                notes: cmd.notes.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_change_status(
        &self,
        cmd: &ChangeStatus,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_order_id(cmd.order_id)?;

        // A terminal order never moves again, which is what keeps receipt at-most-once.
        if self.status.is_terminal() {
            return Err(DomainError::validation(format!(
                "purchase order {} is {} and can no longer change status",
                self.code, self.status
            )));
        }

        if cmd.status != PurchaseOrderStatus::Received {
            return Ok(vec![PurchaseOrderEvent::PurchaseOrderStatusChanged(
                PurchaseOrderStatusChanged {
                    order_id: self.id,
                    from: self.status,
                    to: cmd.status,
                    occurred_at: cmd.occurred_at,
                },
            )]);
        }

        let supplier_id = self
            .supplier_id
            .ok_or_else(|| DomainError::invariant("supplier must be set"))?;

        let lines = self
            .items
            .iter()
            .map(|line| OrderLine {
                received_qty: line.quantity,
                ..line.clone()
            })
            .collect();

        Ok(vec![PurchaseOrderEvent::GoodsReceived(GoodsReceived {
            order_id: self.id,
            code: self.code.clone(),
            supplier_id,
            from: self.status,
            lines,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_payment(
        &self,
        cmd: &RecordPayment,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_order_id(cmd.order_id)?;

        if !cmd.amount.is_positive() {
            return Err(DomainError::validation("payment amount must be positive"));
        }

        let paid_amount = self.paid_amount.checked_add(cmd.amount)?;

        Ok(vec![PurchaseOrderEvent::PaymentRecorded(PaymentRecorded {
            payment: PurchasePayment {
                id: cmd.payment_id,
                order_id: self.id,
                amount: cmd.amount,
                payment_date: cmd.payment_date,
                method: cmd.method.clone(),
                reference: cmd.reference.clone(),
                notes: cmd.notes.clone(),
                created_at: cmd.occurred_at,
            },
            paid_amount,
            payment_status: PaymentStatus::derive(paid_amount, self.total_amount),
        })])
    }

    fn handle_delete(
        &self,
        cmd: &DeletePurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_order_id(cmd.order_id)?;

        Ok(vec![PurchaseOrderEvent::PurchaseOrderDeleted(
            PurchaseOrderDeleted {
                order_id: self.id,
                code: self.code.clone(),
                status: self.status,
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use stockbook_events::execute;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn line(quantity: i64, unit_price: i64) -> NewOrderLine {
        NewOrderLine {
            item_id: OrderItemId::generate(),
            line: OrderLineInput {
                product_id: ProductId::new(),
                variant_id: None,
                quantity,
                unit_price: Money::new(unit_price),
            },
        }
    }

    fn create_cmd(order_id: PurchaseOrderId, lines: Vec<NewOrderLine>) -> PurchaseOrderCommand {
        PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
            order_id,
            code: "PO250101-0001".to_string(),
            supplier_id: SupplierId::new(),
            order_date: test_time(),
            lines,
            status: None,
            notes: None,
            occurred_at: test_time(),
        })
    }

    fn created_order(lines: Vec<NewOrderLine>) -> PurchaseOrder {
        let order_id = PurchaseOrderId::generate();
        let mut order = PurchaseOrder::empty(order_id);
        execute(&mut order, &create_cmd(order_id, lines)).unwrap();
        order
    }

    fn change_status(order: &PurchaseOrder, status: PurchaseOrderStatus) -> PurchaseOrderCommand {
        PurchaseOrderCommand::ChangeStatus(ChangeStatus {
            order_id: order.id_typed(),
            status,
            occurred_at: test_time(),
        })
    }

    fn pay(order: &PurchaseOrder, amount: i64) -> PurchaseOrderCommand {
        PurchaseOrderCommand::RecordPayment(RecordPayment {
            payment_id: PaymentId::generate(),
            order_id: order.id_typed(),
            amount: Money::new(amount),
            payment_date: test_time(),
            method: Some("bank transfer".to_string()),
            reference: None,
            notes: None,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn create_computes_totals_and_starts_unpaid_draft() {
        let order = created_order(vec![line(10, 100), line(3, 250)]);

        assert_eq!(order.status(), PurchaseOrderStatus::Draft);
        assert_eq!(order.payment_status(), PaymentStatus::Unpaid);
        assert_eq!(order.total_amount(), Money::new(1_750));
        assert_eq!(order.paid_amount(), Money::ZERO);
        assert_eq!(order.items()[0].total_price, Money::new(1_000));
        assert!(order.items().iter().all(|l| l.received_qty == 0));
        assert_eq!(order.version(), 1);
    }

    #[test]
    fn create_rejects_empty_and_invalid_lines() {
        let order_id = PurchaseOrderId::generate();
        let order = PurchaseOrder::empty(order_id);

        for lines in [vec![], vec![line(0, 100)], vec![line(5, -1)]] {
            let err = order.handle(&create_cmd(order_id, lines)).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[test]
    fn create_rejects_overflowing_totals() {
        let order_id = PurchaseOrderId::generate();
        let order = PurchaseOrder::empty(order_id);
        let err = order
            .handle(&create_cmd(order_id, vec![line(i64::MAX, 2)]))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    fn create_with_status(order_id: PurchaseOrderId, status: PurchaseOrderStatus) -> PurchaseOrderCommand {
        PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
            order_id,
            code: "PO250101-0002".to_string(),
            supplier_id: SupplierId::new(),
            order_date: test_time(),
            lines: vec![line(1, 1)],
            status: Some(status),
            notes: None,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn create_cannot_start_received() {
        let order_id = PurchaseOrderId::generate();
        let order = PurchaseOrder::empty(order_id);
        let cmd = create_with_status(order_id, PurchaseOrderStatus::Received);
        assert!(matches!(order.handle(&cmd), Err(DomainError::Validation(_))));
    }

    #[test]
    fn create_may_start_cancelled_and_then_never_moves() {
        let order_id = PurchaseOrderId::generate();
        let mut order = PurchaseOrder::empty(order_id);
        execute(&mut order, &create_with_status(order_id, PurchaseOrderStatus::Cancelled)).unwrap();
        assert_eq!(order.status(), PurchaseOrderStatus::Cancelled);

        let err = { let cmd = change_status(&order, PurchaseOrderStatus::Received); execute(&mut order, &cmd) }
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(order.received_date().is_none());
    }

    #[test]
    fn receiving_marks_every_line_received() {
        let mut order = created_order(vec![line(10, 100), line(4, 5)]);
        { let cmd = change_status(&order, PurchaseOrderStatus::Ordered); execute(&mut order, &cmd) }.unwrap();

        let events = { let cmd = change_status(&order, PurchaseOrderStatus::Received); execute(&mut order, &cmd) }
            .unwrap();

        match &events[0] {
            PurchaseOrderEvent::GoodsReceived(e) => {
                assert_eq!(e.code, "PO250101-0001");
                assert_eq!(e.from, PurchaseOrderStatus::Ordered);
                assert_eq!(e.lines.len(), 2);
            }
            _ => panic!("Expected GoodsReceived event"),
        }
        assert_eq!(order.status(), PurchaseOrderStatus::Received);
        assert!(order.received_date().is_some());
        assert!(order.items().iter().all(|l| l.received_qty == l.quantity));
    }

    #[test]
    fn draft_can_skip_straight_to_received() {
        let mut order = created_order(vec![line(1, 1)]);
        { let cmd = change_status(&order, PurchaseOrderStatus::Received); execute(&mut order, &cmd) }.unwrap();
        assert_eq!(order.status(), PurchaseOrderStatus::Received);
    }

    #[test]
    fn terminal_orders_reject_every_transition() {
        let mut received = created_order(vec![line(1, 1)]);
        { let cmd = change_status(&received, PurchaseOrderStatus::Received); execute(&mut received, &cmd) }.unwrap();

        let err = received
            .handle(&change_status(&received, PurchaseOrderStatus::Received))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let mut cancelled = created_order(vec![line(1, 1)]);
        { let cmd = change_status(&cancelled, PurchaseOrderStatus::Cancelled); execute(&mut cancelled, &cmd) }.unwrap();
        for status in [
            PurchaseOrderStatus::Draft,
            PurchaseOrderStatus::Ordered,
            PurchaseOrderStatus::Received,
        ] {
            assert!(cancelled.handle(&change_status(&cancelled, status)).is_err());
        }
    }

    #[test]
    fn payments_accumulate_and_drive_status() {
        let mut order = created_order(vec![line(10, 100)]);

        { let cmd = pay(&order, 400); execute(&mut order, &cmd) }.unwrap();
        assert_eq!(order.paid_amount(), Money::new(400));
        assert_eq!(order.payment_status(), PaymentStatus::Partial);

        { let cmd = pay(&order, 600); execute(&mut order, &cmd) }.unwrap();
        assert_eq!(order.paid_amount(), Money::new(1_000));
        assert_eq!(order.payment_status(), PaymentStatus::Paid);
        assert_eq!(order.payments().len(), 2);

        let record = order.to_record().unwrap();
        assert_eq!(record.debt(), Money::ZERO);
    }

    #[test]
    fn non_positive_payments_are_rejected() {
        let order = created_order(vec![line(1, 100)]);
        for amount in [0, -5] {
            assert!(matches!(
                order.handle(&pay(&order, amount)),
                Err(DomainError::Validation(_))
            ));
        }
    }

    #[test]
    fn overpayment_is_accepted() {
        let mut order = created_order(vec![line(1, 100)]);
        { let cmd = pay(&order, 150); execute(&mut order, &cmd) }.unwrap();
        assert_eq!(order.payment_status(), PaymentStatus::Paid);
        assert_eq!(order.to_record().unwrap().debt(), Money::new(-50));
    }

    #[test]
    fn deleted_order_behaves_as_missing() {
        let mut order = created_order(vec![line(1, 100)]);
        let delete = PurchaseOrderCommand::DeletePurchaseOrder(DeletePurchaseOrder {
            order_id: order.id_typed(),
            occurred_at: test_time(),
        });
        execute(&mut order, &delete).unwrap();

        assert!(order.is_deleted());
        assert!(matches!(
            order.handle(&pay(&order, 10)),
            Err(DomainError::NotFound(_))
        ));
    }

    #[test]
    fn record_round_trips_through_rehydration() {
        let mut order = created_order(vec![line(2, 30)]);
        { let cmd = pay(&order, 10); execute(&mut order, &cmd) }.unwrap();

        let record = order.to_record().unwrap();
        let rehydrated = PurchaseOrder::from_record(record.clone());
        assert_eq!(rehydrated.to_record().unwrap(), record);
        assert_eq!(rehydrated.version(), 2);
    }

    #[test]
    fn view_serializes_camel_case_with_debt() {
        let order = created_order(vec![line(2, 30)]);
        let view = PurchaseOrderView::from(order.to_record().unwrap());
        assert_eq!(view.debt, Money::new(60));
        assert_eq!(view.order.status.to_string(), "DRAFT");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: paid amount and status depend only on the multiset of
        /// payments, not on the order they were recorded in.
        #[test]
        fn payments_commute(total in 1i64..10_000, amounts in prop::collection::vec(1i64..5_000, 1..8)) {
            let lines = vec![line(1, total)];
            let mut forward = created_order(lines.clone());
            let mut backward = created_order(lines);

            for amount in &amounts {
                { let cmd = pay(&forward, *amount); execute(&mut forward, &cmd) }.unwrap();
            }
            for amount in amounts.iter().rev() {
                { let cmd = pay(&backward, *amount); execute(&mut backward, &cmd) }.unwrap();
            }

            let sum: i64 = amounts.iter().sum();
            prop_assert_eq!(forward.paid_amount(), Money::new(sum));
            prop_assert_eq!(backward.paid_amount(), Money::new(sum));
            prop_assert_eq!(forward.payment_status(), backward.payment_status());
            prop_assert_eq!(
                forward.payment_status(),
                PaymentStatus::derive(Money::new(sum), Money::new(total))
            );
        }
    }
}
