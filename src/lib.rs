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

//! # Stock Ledger
//!
//! This library provides an inventory engine that tracks product quantities per
//! storage location (warehouse, optional section, optional shelf) and records an
//! immutable ledger entry for every change.
//!
//! ## Core Components
//!
//! - [`Engine`]: Applies IN, OUT and TRANSFER transactions atomically
//! - [`QuantityStore`]: Locked, per-location quantity records
//! - [`LedgerRecorder`]: Append-only history of every quantity change
//! - [`TransactionLog`]: Logged transactions with at-most-once apply
//! - [`MovementPipeline`]: Multi-segment movement documents (receipts, dispatches, transfers)
//! - [`BorrowDesk`]: Issue and return of borrowed stock
//! - [`InventoryError`]: Error types for inventory processing failures
//!
//! ## Example
//!
//! ```
//! use stock_ledger_rs::{Engine, InMemoryCatalog, Location, Product, ProductId, TransactionDraft, WarehouseId};
//! use rust_decimal_macros::dec;
//! use std::sync::Arc;
//!
//! let catalog = InMemoryCatalog::new();
//! catalog.add_product(Product::new(ProductId(1), "Flour", "kg"));
//! catalog.add_conversion(ProductId(1), "box", "kg", dec!(12)).unwrap();
//! let engine = Engine::new(Arc::new(catalog));
//!
//! let north = Location::warehouse(WarehouseId(1));
//! let south = Location::warehouse(WarehouseId(2));
//!
//! // Receive two boxes, stored as 24 kg
//! engine.submit(TransactionDraft::inbound(ProductId(1), dec!(2), "box", north), None).unwrap();
//! engine.submit(TransactionDraft::transfer(ProductId(1), dec!(4), "kg", north, south), None).unwrap();
//!
//! assert_eq!(engine.quantity_at(ProductId(1), north), dec!(20));
//! assert_eq!(engine.quantity_at(ProductId(1), south), dec!(4));
//! assert_eq!(engine.ledger().len(), 3);
//! ```
//!
//! ## Thread Safety
//!
//! Each quantity record has its own lock. Operations lock every record they touch
//! in one global order, so transactions on disjoint records run in parallel and
//! overlapping ones serialize without deadlock.

mod base;
pub mod borrow;
mod catalog;
mod config;
mod engine;
pub mod error;
mod ledger;
pub mod movement;
mod sequence;
mod stock;
pub mod strategy;
mod transaction;
mod transaction_log;

pub use base::{
    ActorId, BorrowId, LedgerEntryId, Location, MovementId, ProductId, SectionId, SegmentId,
    ShelfId, TransactionId, WarehouseId,
};
pub use borrow::{BorrowDesk, BorrowRecord, BorrowRequest, BorrowStatus};
pub use catalog::{Catalog, InMemoryCatalog, MAX_QUANTITY, Product, QUANTITY_SCALE, to_base_unit};
pub use config::{EngineConfig, StockPolicy};
pub use engine::Engine;
pub use error::InventoryError;
pub use ledger::{LedgerEntry, LedgerRecorder, is_chained};
pub use movement::{
    CostType, Movement, MovementCost, MovementPipeline, MovementSegment, MovementStatus,
    MovementType, SegmentDraft, TransportInfo,
};
pub use sequence::ReferenceSequence;
pub use stock::{QuantityStore, StockKey, StockScope, StockSnapshot};
pub use transaction::{Transaction, TransactionDraft, TransactionType};
pub use transaction_log::TransactionLog;
