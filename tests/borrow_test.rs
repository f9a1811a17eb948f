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

//! Borrow workflow integration tests.

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::thread;
use stock_ledger_rs::{
    ActorId, BorrowDesk, BorrowRequest, BorrowStatus, Engine, InMemoryCatalog, InventoryError,
    Location, Product, ProductId, SectionId, TransactionDraft, TransactionType, WarehouseId,
};

const LADDER: ProductId = ProductId(5);
const TECH: ActorId = ActorId(11);

fn desk_with_stock(quantity: rust_decimal::Decimal) -> BorrowDesk {
    let catalog = InMemoryCatalog::new();
    catalog.add_product(Product::new(LADDER, "Ladder", "pcs"));
    catalog.add_conversion(LADDER, "pair", "pcs", dec!(2)).unwrap();
    let engine = Engine::new(Arc::new(catalog));
    engine
        .submit(TransactionDraft::inbound(LADDER, quantity, "pcs", tool_room()), None)
        .unwrap();
    BorrowDesk::new(Arc::new(engine))
}

fn tool_room() -> Location {
    Location::warehouse(WarehouseId(1)).with_section(SectionId(2))
}

fn request(quantity: rust_decimal::Decimal) -> BorrowRequest {
    BorrowRequest::new(TECH, LADDER, quantity, "pcs", tool_room())
}

#[test]
fn issue_and_return_round_trip() {
    let desk = desk_with_stock(dec!(3));
    let b = desk.open(request(dec!(2)).created_by(ActorId(1))).unwrap();

    let out = desk.issue(b.id, None).unwrap();
    assert_eq!(out.kind, TransactionType::Out);
    assert_eq!(out.reference.as_deref(), Some(b.reference.as_str()));
    assert_eq!(out.created_by, Some(ActorId(1)));
    assert_eq!(desk.engine().quantity_at(LADDER, tool_room()), dec!(1));

    let back = desk.mark_returned(b.id, Some(TECH), None, None).unwrap();
    assert_eq!(back.kind, TransactionType::In);
    assert_eq!(back.destination, Some(tool_room()));
    assert_eq!(desk.engine().quantity_at(LADDER, tool_room()), dec!(3));

    let record = desk.get(b.id).unwrap();
    assert_eq!(record.status, BorrowStatus::Returned);
    assert_eq!(record.outgoing_transaction, Some(out.id));
    assert_eq!(record.return_transaction, Some(back.id));
    assert_eq!(record.return_location, Some(tool_room()));
    assert!(record.actual_returned_at.is_some());
}

#[test]
fn issue_is_idempotent() {
    let desk = desk_with_stock(dec!(5));
    let b = desk.open(request(dec!(2))).unwrap();
    let first = desk.issue(b.id, None).unwrap();
    let second = desk.issue(b.id, None).unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(desk.engine().quantity_at(LADDER, tool_room()), dec!(3));
    assert_eq!(desk.engine().transactions().by_reference(&b.reference).len(), 1);
}

#[test]
fn return_is_idempotent() {
    let desk = desk_with_stock(dec!(5));
    let b = desk.open(request(dec!(2))).unwrap();
    desk.issue(b.id, None).unwrap();
    let first = desk.mark_returned(b.id, None, None, None).unwrap();
    let second = desk.mark_returned(b.id, None, None, None).unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(desk.engine().quantity_at(LADDER, tool_room()), dec!(5));
}

#[test]
fn concurrent_issue_moves_stock_once() {
    let desk = Arc::new(desk_with_stock(dec!(10)));
    let b = desk.open(request(dec!(4))).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let desk = Arc::clone(&desk);
            thread::spawn(move || desk.issue(b.id, None).unwrap().id)
        })
        .collect();
    let ids: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("Thread panicked"))
        .collect();

    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(desk.engine().quantity_at(LADDER, tool_room()), dec!(6));
}

#[test]
fn return_to_override_location() {
    let desk = desk_with_stock(dec!(2));
    let b = desk.open(request(dec!(1))).unwrap();
    desk.issue(b.id, None).unwrap();

    let elsewhere = Location::warehouse(WarehouseId(9));
    let returned_at = Utc::now() - Duration::minutes(5);
    desk.mark_returned(b.id, None, Some(returned_at), Some(elsewhere))
        .unwrap();

    let engine = desk.engine();
    assert_eq!(engine.quantity_at(LADDER, tool_room()), dec!(1));
    assert_eq!(engine.quantity_at(LADDER, elsewhere), dec!(1));
    let record = desk.get(b.id).unwrap();
    assert_eq!(record.return_location, Some(elsewhere));
    assert_eq!(record.actual_returned_at, Some(returned_at));
}

#[test]
fn recorded_return_location_beats_source() {
    let desk = desk_with_stock(dec!(4));
    let depot = Location::warehouse(WarehouseId(7));
    let b = desk.open(request(dec!(1)).return_to(depot)).unwrap();
    assert_eq!(b.return_location, Some(depot));
    desk.issue(b.id, None).unwrap();

    let back = desk.mark_returned(b.id, None, None, None).unwrap();
    assert_eq!(back.destination, Some(depot));
    assert_eq!(desk.engine().quantity_at(LADDER, tool_room()), dec!(3));
    assert_eq!(desk.engine().quantity_at(LADDER, depot), dec!(1));
}

#[test]
fn explicit_destination_beats_recorded_location() {
    let desk = desk_with_stock(dec!(4));
    let depot = Location::warehouse(WarehouseId(7));
    let dock = Location::warehouse(WarehouseId(8));
    let b = desk.open(request(dec!(1))).unwrap();
    desk.issue(b.id, None).unwrap();
    let updated = desk.set_return_location(b.id, depot).unwrap();
    assert_eq!(updated.return_location, Some(depot));

    desk.mark_returned(b.id, None, None, Some(dock)).unwrap();
    let engine = desk.engine();
    assert_eq!(engine.quantity_at(LADDER, dock), dec!(1));
    assert_eq!(engine.quantity_at(LADDER, depot), dec!(0));
    assert_eq!(desk.get(b.id).unwrap().return_location, Some(dock));

    assert!(matches!(
        desk.set_return_location(b.id, depot),
        Err(InventoryError::InvalidStatus { current: "RETURNED", .. })
    ));
}

#[test]
fn issue_converts_units() {
    let desk = desk_with_stock(dec!(10));
    let b = desk
        .open(BorrowRequest::new(TECH, LADDER, dec!(2), "pair", tool_room()))
        .unwrap();
    let out = desk.issue(b.id, None).unwrap();
    assert_eq!(out.quantity, dec!(4));
    assert_eq!(desk.engine().quantity_at(LADDER, tool_room()), dec!(6));
}

#[test]
fn insufficient_stock_leaves_borrow_unissued() {
    let desk = desk_with_stock(dec!(1));
    let b = desk.open(request(dec!(2))).unwrap();
    assert!(matches!(
        desk.issue(b.id, None),
        Err(InventoryError::InsufficientStock { .. })
    ));
    let record = desk.get(b.id).unwrap();
    assert!(!record.is_issued());
    assert_eq!(record.status, BorrowStatus::Out);

    // Still cancellable because nothing went out.
    assert_eq!(desk.cancel(b.id, None).unwrap().status, BorrowStatus::Cancelled);
}

#[test]
fn cancel_after_issue_rejected() {
    let desk = desk_with_stock(dec!(3));
    let b = desk.open(request(dec!(1))).unwrap();
    desk.issue(b.id, None).unwrap();
    assert_eq!(desk.cancel(b.id, None), Err(InventoryError::AlreadyIssued));
    assert_eq!(desk.get(b.id).unwrap().status, BorrowStatus::Out);
}

#[test]
fn returned_borrow_is_not_overdue() {
    let desk = desk_with_stock(dec!(3));
    let due = Utc::now() - Duration::days(1);
    let b = desk.open(request(dec!(1)).due(due)).unwrap();
    desk.issue(b.id, None).unwrap();
    assert_eq!(desk.overdue(Utc::now()).len(), 1);

    desk.mark_returned(b.id, None, None, None).unwrap();
    assert!(desk.overdue(Utc::now()).is_empty());
    assert!(!desk.get(b.id).unwrap().is_overdue(Utc::now()));
}
