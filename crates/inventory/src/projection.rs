//! Stock derived purely from the movement log.
//!
//! The catalog counter is the operational source of truth; the projection is
//! the independent recomputation used to audit it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::movement::{MovementType, StockMovement, StockTarget};

/// Fold of one target's movements, in chronological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockProjection {
    opening: i64,
    stock: i64,
    applied: usize,
}

impl StockProjection {
    pub fn with_opening(opening: i64) -> Self {
        Self {
            opening,
            stock: opening,
            applied: 0,
        }
    }

    /// Replay a chronological movement sequence.
    ///
    /// The opening balance is the `stock_before` of the earliest movement, which
    /// accounts for stock that existed before the ledger started recording.
    pub fn replay<'a>(movements: impl IntoIterator<Item = &'a StockMovement>) -> Self {
        let mut iter = movements.into_iter().peekable();
        let opening = iter.peek().map(|m| m.stock_before).unwrap_or(0);
        let mut projection = Self::with_opening(opening);
        for movement in iter {
            projection.apply(movement);
        }
        projection
    }

    pub fn apply(&mut self, movement: &StockMovement) {
        self.stock = match movement.movement_type {
            MovementType::In => self.stock + movement.quantity,
            MovementType::Out => self.stock - movement.quantity,
            MovementType::Adjustment => movement.quantity,
        };
        self.applied += 1;
    }

    pub fn opening(&self) -> i64 {
        self.opening
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }

    pub fn applied(&self) -> usize {
        self.applied
    }
}

/// Project every target present in a chronological movement sequence.
pub fn project_all<'a>(
    movements: impl IntoIterator<Item = &'a StockMovement>,
) -> HashMap<StockTarget, StockProjection> {
    let mut out: HashMap<StockTarget, StockProjection> = HashMap::new();
    for movement in movements {
        out.entry(movement.target())
            .or_insert_with(|| StockProjection::with_opening(movement.stock_before))
            .apply(movement);
    }
    out
}

/// Counter vs. log comparison for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    pub target: StockTarget,
    pub counter: i64,
    pub projected: i64,
    pub movement_count: usize,
}

impl Reconciliation {
    /// Compare a catalog counter against its chronological movements.
    ///
    /// A target with no movements projects to its own counter.
    pub fn compute<'a>(
        target: StockTarget,
        counter: i64,
        movements: impl IntoIterator<Item = &'a StockMovement>,
    ) -> Self {
        let mut iter = movements.into_iter().peekable();
        let projected = if iter.peek().is_none() {
            StockProjection::with_opening(counter)
        } else {
            StockProjection::replay(iter)
        };
        Self {
            target,
            counter,
            projected: projected.stock(),
            movement_count: projected.applied(),
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.counter == self.projected
    }

    /// Counter minus projection; positive means the counter is inflated.
    pub fn drift(&self) -> i64 {
        self.counter - self.projected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::{PostMovement, ReceiveStock, StockCommand, StockEvent, StockLevel};
    use crate::movement::MovementId;
    use chrono::Utc;
    use proptest::prelude::*;
    use stockbook_core::ProductId;
    use stockbook_events::execute;

    fn movement(
        target: StockTarget,
        movement_type: MovementType,
        quantity: i64,
        before: i64,
        after: i64,
    ) -> StockMovement {
        StockMovement {
            id: MovementId::generate(),
            product_id: target.product_id,
            variant_id: target.variant_id,
            movement_type,
            quantity,
            stock_before: before,
            stock_after: after,
            reference: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn adjustment_resets_the_fold() {
        let target = StockTarget::product(ProductId::new());
        let log = vec![
            movement(target, MovementType::In, 10, 0, 10),
            movement(target, MovementType::Out, 3, 10, 7),
            movement(target, MovementType::Adjustment, 20, 7, 20),
            movement(target, MovementType::Out, 5, 20, 15),
        ];

        let projection = StockProjection::replay(&log);
        assert_eq!(projection.opening(), 0);
        assert_eq!(projection.stock(), 15);
        assert_eq!(projection.applied(), 4);
    }

    #[test]
    fn opening_balance_comes_from_first_snapshot() {
        let target = StockTarget::product(ProductId::new());
        let log = vec![movement(target, MovementType::Out, 2, 30, 28)];
        assert_eq!(StockProjection::replay(&log).stock(), 28);
    }

    #[test]
    fn project_all_keeps_targets_apart() {
        let a = StockTarget::product(ProductId::new());
        let b = StockTarget::product(ProductId::new());
        let log = vec![
            movement(a, MovementType::In, 4, 0, 4),
            movement(b, MovementType::Adjustment, 9, 1, 9),
            movement(a, MovementType::Out, 1, 4, 3),
        ];

        let all = project_all(&log);
        assert_eq!(all[&a].stock(), 3);
        assert_eq!(all[&b].stock(), 9);
    }

    #[test]
    fn reconciliation_flags_drift() {
        let target = StockTarget::product(ProductId::new());
        let log = vec![movement(target, MovementType::In, 10, 0, 10)];

        let ok = Reconciliation::compute(target, 10, &log);
        assert!(ok.is_consistent());

        let drifted = Reconciliation::compute(target, 14, &log);
        assert!(!drifted.is_consistent());
        assert_eq!(drifted.drift(), 4);

        let untouched = Reconciliation::compute(target, 6, &Vec::<StockMovement>::new());
        assert!(untouched.is_consistent());
        assert_eq!(untouched.movement_count, 0);
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Out(i64),
        Adjust(i64),
        Receive(i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..50).prop_map(Op::Out),
            (0i64..200).prop_map(Op::Adjust),
            (1i64..50).prop_map(Op::Receive),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: after any sequence of accepted movements, folding the log
        /// reproduces the counter the aggregate maintained.
        #[test]
        fn projection_matches_counter(opening in 0i64..100, ops in prop::collection::vec(op(), 1..40)) {
            let target = StockTarget::product(ProductId::new());
            let mut level = StockLevel::new(target, opening, 0);
            let mut log = Vec::new();

            for op in ops {
                let cmd = match op {
                    Op::Out(q) | Op::Adjust(q) => StockCommand::PostMovement(PostMovement {
                        movement_id: MovementId::generate(),
                        target,
                        movement_type: if matches!(op, Op::Out(_)) { MovementType::Out } else { MovementType::Adjustment },
                        quantity: q,
                        reference: None,
                        notes: None,
                        occurred_at: Utc::now(),
                    }),
                    Op::Receive(q) => StockCommand::ReceiveStock(ReceiveStock {
                        movement_id: MovementId::generate(),
                        target,
                        quantity: q,
                        reference: "PO250101-0001".to_string(),
                        notes: None,
                        occurred_at: Utc::now(),
                    }),
                };

                if let Ok(events) = execute(&mut level, &cmd) {
                    for e in events {
                        if let StockEvent::MovementRecorded(r) = e {
                            log.push(r.movement);
                        }
                    }
                }
            }

            let reconciliation = Reconciliation::compute(target, level.stock(), &log);
            prop_assert!(reconciliation.is_consistent());
        }
    }
}
