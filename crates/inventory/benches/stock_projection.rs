use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use stockbook_core::ProductId;
use stockbook_events::execute;
use stockbook_inventory::{
    MovementId, MovementType, PostMovement, ReceiveStock, Reconciliation, StockCommand, StockEvent,
    StockLevel, StockMovement, StockProjection, StockTarget,
};

/// Build a realistic log: receipts, sales and the occasional recount.
fn movement_log(target: StockTarget, len: usize) -> (i64, Vec<StockMovement>) {
    let mut level = StockLevel::new(target, 0, 0);
    let mut log = Vec::with_capacity(len);

    for i in 0..len {
        let cmd = match i % 10 {
            0 | 5 => StockCommand::ReceiveStock(ReceiveStock {
                movement_id: MovementId::generate(),
                target,
                quantity: 50,
                reference: "PO250101-0001".to_string(),
                notes: None,
                occurred_at: Utc::now(),
            }),
            9 => StockCommand::PostMovement(PostMovement {
                movement_id: MovementId::generate(),
                target,
                movement_type: MovementType::Adjustment,
                quantity: level.stock() - 1,
                reference: None,
                notes: Some("recount".to_string()),
                occurred_at: Utc::now(),
            }),
            _ => StockCommand::PostMovement(PostMovement {
                movement_id: MovementId::generate(),
                target,
                movement_type: MovementType::Out,
                quantity: 3,
                reference: None,
                notes: None,
                occurred_at: Utc::now(),
            }),
        };

        if let Ok(events) = execute(&mut level, &cmd) {
            for event in events {
                if let StockEvent::MovementRecorded(e) = event {
                    log.push(e.movement);
                }
            }
        }
    }

    (level.stock(), log)
}

fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("stock_projection");

    for size in [100usize, 1_000, 10_000] {
        let target = StockTarget::product(ProductId::new());
        let (counter, log) = movement_log(target, size);

        group.throughput(Throughput::Elements(log.len() as u64));
        group.bench_with_input(BenchmarkId::new("replay", size), &log, |b, log| {
            b.iter(|| StockProjection::replay(black_box(log)).stock());
        });
        group.bench_with_input(BenchmarkId::new("reconcile", size), &log, |b, log| {
            b.iter(|| Reconciliation::compute(target, black_box(counter), black_box(log)).is_consistent());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_replay);
criterion_main!(benches);
