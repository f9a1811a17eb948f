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

//! Stock ledger.
//!
//! Append-only audit trail of every committed quantity change. Entries are only
//! appended from [`StockScope::commit`](crate::StockScope), while the affected
//! records are still locked, so entries for one record always chain:
//! each `prev_quantity` equals the previous entry's `new_quantity`.

use crate::base::{ActorId, LedgerEntryId, TransactionId};
use crate::stock::StockKey;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Immutable record of one quantity change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub stock: StockKey,
    pub transaction: Option<TransactionId>,
    pub change: Decimal,
    pub prev_quantity: Decimal,
    pub new_quantity: Decimal,
    pub note: Option<String>,
    pub created_by: Option<ActorId>,
    pub created_at: DateTime<Utc>,
}

/// Ledger entry staged inside a scope, not yet visible.
#[derive(Debug, Clone)]
pub(crate) struct PendingEntry {
    pub key: StockKey,
    pub transaction: Option<TransactionId>,
    pub change: Decimal,
    pub prev_quantity: Decimal,
    pub new_quantity: Decimal,
    pub created_by: Option<ActorId>,
    pub note: Option<String>,
}

/// Thread-safe ledger with per-record and per-transaction indexes.
#[derive(Debug)]
pub struct LedgerRecorder {
    next_id: AtomicU64,
    entries: DashMap<LedgerEntryId, Arc<LedgerEntry>>,
    by_stock: DashMap<StockKey, Vec<LedgerEntryId>>,
    by_transaction: DashMap<TransactionId, Vec<LedgerEntryId>>,
}

impl LedgerRecorder {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: DashMap::new(),
            by_stock: DashMap::new(),
            by_transaction: DashMap::new(),
        }
    }

    pub(crate) fn append(&self, pending: Vec<PendingEntry>) -> Vec<LedgerEntry> {
        let now = Utc::now();
        pending
            .into_iter()
            .map(|p| {
                debug_assert_eq!(p.prev_quantity + p.change, p.new_quantity);
                let id = LedgerEntryId(self.next_id.fetch_add(1, Ordering::SeqCst));
                let entry = LedgerEntry {
                    id,
                    stock: p.key,
                    transaction: p.transaction,
                    change: p.change,
                    prev_quantity: p.prev_quantity,
                    new_quantity: p.new_quantity,
                    note: p.note,
                    created_by: p.created_by,
                    created_at: now,
                };
                self.entries.insert(id, Arc::new(entry.clone()));
                self.by_stock.entry(p.key).or_default().push(id);
                if let Some(tx) = p.transaction {
                    self.by_transaction.entry(tx).or_default().push(id);
                }
                entry
            })
            .collect()
    }

    /// Entries for one quantity record, oldest first.
    pub fn entries_for(&self, key: &StockKey) -> Vec<LedgerEntry> {
        let ids = self
            .by_stock
            .get(key)
            .map(|ids| ids.clone())
            .unwrap_or_default();
        self.resolve(&ids)
    }

    /// Entries caused by one transaction, in the order they were written.
    pub fn entries_for_transaction(&self, transaction: TransactionId) -> Vec<LedgerEntry> {
        let ids = self
            .by_transaction
            .get(&transaction)
            .map(|ids| ids.clone())
            .unwrap_or_default();
        self.resolve(&ids)
    }

    /// Every entry in creation order.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        let mut all: Vec<LedgerEntry> = self.entries.iter().map(|e| (**e.value()).clone()).collect();
        all.sort_by_key(|e| e.id);
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn resolve(&self, ids: &[LedgerEntryId]) -> Vec<LedgerEntry> {
        ids.iter()
            .filter_map(|id| self.entries.get(id).map(|e| (**e.value()).clone()))
            .collect()
    }
}

impl Default for LedgerRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns true when `entries` (one record, oldest first) chain without gaps.
pub fn is_chained(entries: &[LedgerEntry]) -> bool {
    entries
        .iter()
        .all(|e| e.prev_quantity + e.change == e.new_quantity)
        && entries
            .windows(2)
            .all(|w| w[0].new_quantity == w[1].prev_quantity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{Location, ProductId, WarehouseId};
    use rust_decimal_macros::dec;

    fn key() -> StockKey {
        StockKey::new(ProductId(1), Location::warehouse(WarehouseId(1)))
    }

    fn pending(tx: u64, prev: Decimal, change: Decimal) -> PendingEntry {
        PendingEntry {
            key: key(),
            transaction: Some(TransactionId(tx)),
            change,
            prev_quantity: prev,
            new_quantity: prev + change,
            created_by: Some(ActorId(9)),
            note: Some("Inbound Transaction".into()),
        }
    }

    #[test]
    fn append_assigns_increasing_ids_and_indexes() {
        let ledger = LedgerRecorder::new();
        ledger.append(vec![pending(1, dec!(0), dec!(5))]);
        ledger.append(vec![pending(2, dec!(5), dec!(-2))]);

        let entries = ledger.entries_for(&key());
        assert_eq!(entries.len(), 2);
        assert!(entries[0].id < entries[1].id);
        assert!(is_chained(&entries));

        let for_tx = ledger.entries_for_transaction(TransactionId(2));
        assert_eq!(for_tx.len(), 1);
        assert_eq!(for_tx[0].change, dec!(-2));
        assert_eq!(for_tx[0].created_by, Some(ActorId(9)));
    }

    #[test]
    fn unknown_keys_have_no_entries() {
        let ledger = LedgerRecorder::new();
        assert!(ledger.entries_for(&key()).is_empty());
        assert!(ledger.entries_for_transaction(TransactionId(1)).is_empty());
    }

    #[test]
    fn broken_chain_is_detected() {
        let ledger = LedgerRecorder::new();
        ledger.append(vec![pending(1, dec!(0), dec!(5)), pending(2, dec!(4), dec!(1))]);
        assert!(!is_chained(&ledger.entries_for(&key())));
    }
}
