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

//! Quantity store.
//!
//! One record per `(product, warehouse, section, shelf)`, each behind its own
//! [`parking_lot::Mutex`]. All mutation goes through a [`StockScope`]: the scope
//! locks every record an operation touches, in key order, stages deltas and
//! ledger entries, and publishes them together on [`StockScope::commit`].
//! Dropping a scope without committing is a rollback.
//!
//! A record comes into existence with its first committed write. Cells created
//! for a scope that never commits stay invisible and are pruned afterwards.
//!
//! # Example
//!
//! ```
//! use stock_ledger_rs::{Location, ProductId, QuantityStore, StockKey, WarehouseId};
//!
//! let store = QuantityStore::new(None);
//! let key = StockKey::new(ProductId(1), Location::warehouse(WarehouseId(1)));
//! assert_eq!(store.quantity(&key), None);
//! ```

use crate::InventoryError;
use crate::base::{ActorId, Location, ProductId, SectionId, ShelfId, TransactionId, WarehouseId};
use crate::catalog::{MAX_QUANTITY, QUANTITY_SCALE};
use crate::ledger::{LedgerEntry, LedgerRecorder, PendingEntry};
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Identity of a quantity record.
///
/// The derived ordering (product, then location) is the global lock order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct StockKey {
    pub product: ProductId,
    pub location: Location,
}

impl StockKey {
    pub fn new(product: ProductId, location: Location) -> Self {
        Self { product, location }
    }
}

#[derive(Debug)]
struct StockData {
    quantity: Decimal,
    unit: String,
}

#[derive(Debug)]
pub(crate) struct StockCell {
    key: StockKey,
    // Set under the record lock by the first commit that writes the record.
    live: AtomicBool,
    inner: Mutex<StockData>,
}

impl StockCell {
    fn new(key: StockKey, unit: &str) -> Self {
        Self {
            key,
            live: AtomicBool::new(false),
            inner: Mutex::new(StockData {
                quantity: Decimal::ZERO,
                unit: unit.to_string(),
            }),
        }
    }

    pub(crate) fn key(&self) -> &StockKey {
        &self.key
    }

    pub(crate) fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    fn lock(&self, timeout: Option<Duration>) -> Result<MutexGuard<'_, StockData>, InventoryError> {
        match timeout {
            Some(timeout) => self
                .inner
                .try_lock_for(timeout)
                .ok_or(InventoryError::LockTimeout),
            None => Ok(self.inner.lock()),
        }
    }

    fn snapshot(&self) -> StockSnapshot {
        let data = self.inner.lock();
        StockSnapshot {
            product: self.key.product,
            warehouse: self.key.location.warehouse,
            section: self.key.location.section,
            shelf: self.key.location.shelf,
            quantity: data.quantity.round_dp(QUANTITY_SCALE),
            unit: data.unit.clone(),
        }
    }
}

/// Point-in-time copy of a quantity record, flat so it writes as a CSV row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub product: ProductId,
    pub warehouse: WarehouseId,
    pub section: Option<SectionId>,
    pub shelf: Option<ShelfId>,
    pub quantity: Decimal,
    pub unit: String,
}

/// Concurrent map of quantity records.
#[derive(Debug)]
pub struct QuantityStore {
    records: DashMap<StockKey, Arc<StockCell>>,
    lock_timeout: Option<Duration>,
}

impl QuantityStore {
    pub fn new(lock_timeout: Option<Duration>) -> Self {
        Self {
            records: DashMap::new(),
            lock_timeout,
        }
    }

    /// Committed quantity, or `None` if the record was never created.
    pub fn quantity(&self, key: &StockKey) -> Option<Decimal> {
        let cell = self.get(key).filter(|cell| cell.is_live())?;
        let quantity = cell.inner.lock().quantity;
        Some(quantity)
    }

    pub fn snapshot(&self, key: &StockKey) -> Option<StockSnapshot> {
        self.get(key)
            .filter(|cell| cell.is_live())
            .map(|cell| cell.snapshot())
    }

    /// All records, ordered by key.
    pub fn snapshots(&self) -> Vec<StockSnapshot> {
        let mut cells: Vec<Arc<StockCell>> = self
            .records
            .iter()
            .filter(|r| r.value().is_live())
            .map(|r| Arc::clone(r.value()))
            .collect();
        cells.sort_by_key(|cell| cell.key);
        cells.iter().map(|cell| cell.snapshot()).collect()
    }

    /// Sum of a product's quantity across every location.
    pub fn total_for_product(&self, product: ProductId) -> Decimal {
        self.snapshots()
            .into_iter()
            .filter(|s| s.product == product)
            .map(|s| s.quantity)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.records.iter().filter(|r| r.value().is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Clone the Arc out so the shard lock is released before the record lock is taken.
    pub(crate) fn get(&self, key: &StockKey) -> Option<Arc<StockCell>> {
        self.records.get(key).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn get_or_create(&self, key: StockKey, unit: &str) -> Arc<StockCell> {
        let cell = self
            .records
            .entry(key)
            .or_insert_with(|| Arc::new(StockCell::new(key, unit)));
        Arc::clone(cell.value())
    }

    /// Drops cells that no commit ever wrote and nobody else holds.
    ///
    /// The strong-count check runs under the shard write lock, and every other
    /// path clones the `Arc` under a shard lock, so a cell another scope is
    /// waiting on is never removed.
    pub(crate) fn prune_unwritten<'k>(&self, keys: impl IntoIterator<Item = &'k StockKey>) {
        for key in keys {
            self.records
                .remove_if(key, |_, cell| !cell.is_live() && Arc::strong_count(cell) == 1);
        }
    }

    pub(crate) fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout
    }
}

impl Default for QuantityStore {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Index of a locked record inside the [`StockScope`] that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StockHandle(usize);

struct Slot<'a> {
    cell: &'a StockCell,
    guard: MutexGuard<'a, StockData>,
    staged: Decimal,
    written: bool,
}

/// Atomic unit of work over a set of locked quantity records.
///
/// Only the engine opens scopes, and record access inside one is crate-private:
///
/// ```compile_fail
/// use stock_ledger_rs::StockHandle;
/// ```
pub struct StockScope<'a> {
    slots: Vec<Slot<'a>>,
    pending: Vec<PendingEntry>,
}

impl<'a> StockScope<'a> {
    /// Locks every cell in slice order.
    ///
    /// Callers pass cells sorted by key and without duplicates; that ordering is
    /// what keeps two scopes over overlapping records from deadlocking.
    ///
    /// # Errors
    ///
    /// [`InventoryError::LockTimeout`] if a lock is not obtained within `timeout`.
    /// Locks already taken are released.
    pub(crate) fn acquire(
        cells: &'a [Arc<StockCell>],
        timeout: Option<Duration>,
    ) -> Result<Self, InventoryError> {
        debug_assert!(cells.windows(2).all(|w| w[0].key < w[1].key));
        let mut slots = Vec::with_capacity(cells.len());
        for cell in cells {
            let guard = cell.lock(timeout).inspect_err(|_| {
                tracing::warn!(product = %cell.key.product, location = %cell.key.location, "stock lock wait timed out");
            })?;
            slots.push(Slot {
                cell: cell.as_ref(),
                guard,
                staged: Decimal::ZERO,
                written: false,
            });
        }
        Ok(Self {
            slots,
            pending: Vec::new(),
        })
    }

    pub(crate) fn handle(&self, key: &StockKey) -> Option<StockHandle> {
        self.slots
            .iter()
            .position(|slot| slot.cell.key == *key)
            .map(StockHandle)
    }

    /// Quantity as seen inside this scope, including staged deltas.
    pub(crate) fn quantity(&self, handle: StockHandle) -> Decimal {
        let slot = &self.slots[handle.0];
        slot.guard.quantity + slot.staged
    }

    /// Adds a signed amount to the record. No sign check happens here.
    ///
    /// # Errors
    ///
    /// [`InventoryError::Validation`] if the resulting quantity would leave the
    /// range a record can hold. Nothing is staged in that case.
    pub(crate) fn apply_delta(
        &mut self,
        handle: StockHandle,
        amount: Decimal,
    ) -> Result<(), InventoryError> {
        let slot = &mut self.slots[handle.0];
        let staged = slot
            .staged
            .checked_add(amount)
            .filter(|staged| {
                slot.guard
                    .quantity
                    .checked_add(*staged)
                    .is_some_and(|total| total.abs() <= MAX_QUANTITY)
            })
            .ok_or_else(|| {
                InventoryError::validation(format!(
                    "stock quantity would exceed {MAX_QUANTITY}"
                ))
            })?;
        slot.staged = staged;
        slot.written = true;
        Ok(())
    }

    /// Stages a ledger entry for a delta already applied with [`apply_delta`](Self::apply_delta).
    pub(crate) fn record(
        &mut self,
        handle: StockHandle,
        transaction: TransactionId,
        change: Decimal,
        actor: Option<ActorId>,
        note: &str,
    ) {
        let new_quantity = self.quantity(handle);
        self.pending.push(PendingEntry {
            key: self.slots[handle.0].cell.key,
            transaction: Some(transaction),
            change,
            prev_quantity: new_quantity - change,
            new_quantity,
            created_by: actor,
            note: Some(note.to_string()),
        });
    }

    /// Publishes staged quantities and ledger entries, then releases every lock.
    pub(crate) fn commit(mut self, ledger: &LedgerRecorder) -> Vec<LedgerEntry> {
        for slot in &mut self.slots {
            slot.guard.quantity += slot.staged;
            if slot.written {
                slot.cell.live.store(true, Ordering::Release);
            }
        }
        // Append while the records are still locked so per-record entries chain.
        let entries = ledger.append(std::mem::take(&mut self.pending));
        tracing::debug!(records = self.slots.len(), entries = entries.len(), "stock scope committed");
        entries
    }
}
