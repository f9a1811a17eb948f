// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Deadlock detection tests using parking_lot's built-in deadlock detector.
//!
//! The engine's stock records, movements and borrows all sit behind
//! parking_lot mutexes, so with the `deadlock_detection` feature enabled in
//! dev-dependencies the detector sees the production lock graph directly.
//!
//! Every scenario here takes overlapping record locks from many threads in
//! conflicting business order (A→B and B→A transfers, multi-transaction
//! scopes, movements racing plain transactions).

use parking_lot::deadlock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use stock_ledger_rs::{
    Engine, EngineConfig, InMemoryCatalog, InventoryError, Location, MovementPipeline,
    MovementType, Product, ProductId, SegmentDraft, StockKey, TransactionDraft, WarehouseId,
    is_chained,
};

const ITEM: ProductId = ProductId(1);

fn engine_with(config: EngineConfig) -> Arc<Engine> {
    let catalog = InMemoryCatalog::new();
    catalog.add_product(Product::new(ITEM, "Item", "pcs"));
    Arc::new(Engine::with_config(Arc::new(catalog), config))
}

fn wh(id: u32) -> Location {
    Location::warehouse(WarehouseId(id))
}

fn seed(engine: &Engine, warehouses: u32, quantity: Decimal) {
    for id in 1..=warehouses {
        engine
            .submit(TransactionDraft::inbound(ITEM, quantity, "pcs", wh(id)), None)
            .unwrap();
    }
}

// === Deadlock Detector ===

fn start_deadlock_detector() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();

    thread::spawn(move || {
        while running_clone.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(100));
            let deadlocks = deadlock::check_deadlock();
            if !deadlocks.is_empty() {
                eprintln!("\n=== DEADLOCK DETECTED ===");
                for (i, threads) in deadlocks.iter().enumerate() {
                    eprintln!("\nDeadlock #{}", i + 1);
                    for t in threads {
                        eprintln!("Thread ID: {:?}", t.thread_id());
                        eprintln!("Backtrace:\n{:#?}", t.backtrace());
                    }
                }
                panic!("Deadlock detected! See output above for details.");
            }
        }
    });

    running
}

fn stop_deadlock_detector(running: Arc<AtomicBool>) {
    running.store(false, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(150)); // Let detector thread exit
}

// === Tests ===

#[test]
fn no_deadlock_opposite_direction_transfers() {
    let detector = start_deadlock_detector();
    let engine = engine_with(EngineConfig::default());
    seed(&engine, 2, dec!(1000));

    const NUM_THREADS: usize = 16;
    const OPS_PER_THREAD: usize = 200;

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|thread_id| {
            let engine = engine.clone();
            thread::spawn(move || {
                let (from, to) = if thread_id % 2 == 0 { (1, 2) } else { (2, 1) };
                for _ in 0..OPS_PER_THREAD {
                    let draft = TransactionDraft::transfer(ITEM, dec!(1), "pcs", wh(from), wh(to));
                    match engine.submit(draft, None) {
                        Ok(_) | Err(InventoryError::InsufficientStock { .. }) => {}
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    stop_deadlock_detector(detector);

    // Transfers only move stock around.
    assert_eq!(engine.stock().total_for_product(ITEM), dec!(2000));
    for id in 1..=2 {
        let entries = engine.ledger().entries_for(&StockKey::new(ITEM, wh(id)));
        assert!(is_chained(&entries));
    }
}

#[test]
fn no_deadlock_multi_record_scopes() {
    let detector = start_deadlock_detector();
    let engine = engine_with(EngineConfig::default());
    const WAREHOUSES: u32 = 6;
    seed(&engine, WAREHOUSES, dec!(500));

    const NUM_THREADS: usize = 12;
    const OPS_PER_THREAD: usize = 100;

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|thread_id| {
            let engine = engine.clone();
            thread::spawn(move || {
                for i in 0..OPS_PER_THREAD {
                    // Each scope touches three records, listed in a rotating order.
                    let a = ((thread_id + i) as u32 % WAREHOUSES) + 1;
                    let b = ((thread_id + i + 2) as u32 % WAREHOUSES) + 1;
                    let c = ((thread_id * 3 + i) as u32 % WAREHOUSES) + 1;
                    let mut drafts = vec![TransactionDraft::outbound(ITEM, dec!(1), "pcs", wh(a))];
                    drafts.push(TransactionDraft::inbound(ITEM, dec!(1), "pcs", wh(b)));
                    if c != a && c != b {
                        drafts.push(TransactionDraft::transfer(ITEM, dec!(1), "pcs", wh(c), wh(a)));
                    }
                    let _ = engine.execute(drafts, None);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    stop_deadlock_detector(detector);

    assert_eq!(
        engine.stock().total_for_product(ITEM),
        dec!(500) * Decimal::from(WAREHOUSES)
    );
    for snapshot in engine.stock().snapshots() {
        assert!(snapshot.quantity >= Decimal::ZERO);
    }
}

#[test]
fn no_deadlock_movements_racing_transactions() {
    let detector = start_deadlock_detector();
    let engine = engine_with(EngineConfig::default());
    seed(&engine, 3, dec!(1000));
    let pipeline = Arc::new(MovementPipeline::new(engine.clone()));

    const MOVEMENTS: usize = 20;
    let ids: Vec<_> = (0..MOVEMENTS)
        .map(|i| {
            let (from, to) = if i % 2 == 0 { (1, 3) } else { (3, 1) };
            let m = pipeline.create(
                MovementType::Transfer,
                Some(WarehouseId(from)),
                Some(WarehouseId(to)),
                None,
                None,
            );
            for _ in 0..5 {
                pipeline
                    .add_segment(m.id, SegmentDraft::new(ITEM, dec!(2), "pcs"))
                    .unwrap();
            }
            pipeline.approve(m.id, None, true).unwrap();
            m.id
        })
        .collect();

    let mut handles = Vec::new();
    for worker in 0..4 {
        let pipeline = pipeline.clone();
        let ids = ids.clone();
        handles.push(thread::spawn(move || {
            for id in ids.iter().skip(worker).chain(ids.iter()) {
                let _ = pipeline.process(*id);
            }
        }));
    }
    for thread_id in 0..4u32 {
        let engine = engine.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..100 {
                let (from, to) = if thread_id % 2 == 0 { (2, 3) } else { (1, 2) };
                let _ = engine.submit(
                    TransactionDraft::transfer(ITEM, dec!(1), "pcs", wh(from), wh(to)),
                    None,
                );
            }
        }));
    }

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    stop_deadlock_detector(detector);

    for id in ids {
        assert!(pipeline.get(id).unwrap().processed);
    }
    assert_eq!(engine.stock().total_for_product(ITEM), dec!(3000));
}

#[test]
fn lock_timeout_surfaces_as_error() {
    let engine = engine_with(EngineConfig::default().with_lock_timeout(Duration::from_millis(1)));
    seed(&engine, 2, dec!(1_000_000));

    const NUM_THREADS: usize = 8;
    let timeouts = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|thread_id| {
            let engine = engine.clone();
            let timeouts = timeouts.clone();
            thread::spawn(move || {
                let (from, to) = if thread_id % 2 == 0 { (1, 2) } else { (2, 1) };
                for _ in 0..500 {
                    match engine.submit(
                        TransactionDraft::transfer(ITEM, dec!(1), "pcs", wh(from), wh(to)),
                        None,
                    ) {
                        Ok(_) => {}
                        Err(InventoryError::LockTimeout) => {
                            timeouts.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    // Timed-out scopes roll back, so stock is conserved either way.
    assert_eq!(engine.stock().total_for_product(ITEM), dec!(2_000_000));
    println!(
        "Lock timeout test passed: {} timeouts",
        timeouts.load(Ordering::Relaxed)
    );
}
