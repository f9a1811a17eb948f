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

//! Thread-safe transaction log.
//!
//! Holds every transaction the engine has accepted, in insertion order, along
//! with its apply state. The apply state is what makes
//! [`Engine::apply_recorded`](crate::Engine::apply_recorded) at-most-once:
//! a transaction is claimed before its stock effect runs and stamped processed
//! after it commits.

use crate::InventoryError;
use crate::base::TransactionId;
use crate::transaction::Transaction;
use chrono::{DateTime, Utc};
use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApplyState {
    Pending,
    Applying,
    Processed,
}

#[derive(Debug)]
struct LogEntry {
    transaction: Transaction,
    state: ApplyState,
}

/// A thread-safe transaction log with duplicate detection.
///
/// Combines a [`DashMap`] for O(1) lookup with an id list that preserves
/// insertion order. Pending transactions are also queued on a [`SegQueue`]
/// for [`Engine::apply_pending`](crate::Engine::apply_pending) to drain.
#[derive(Debug)]
pub struct TransactionLog {
    next_id: AtomicU64,
    transactions: DashMap<TransactionId, LogEntry>,
    order: RwLock<Vec<TransactionId>>,
    queue: SegQueue<TransactionId>,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            transactions: DashMap::new(),
            order: RwLock::new(Vec::new()),
            queue: SegQueue::new(),
        }
    }

    pub(crate) fn allocate_id(&self) -> TransactionId {
        TransactionId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Adds a transaction that has not been applied yet.
    pub(crate) fn push_pending(&self, transaction: Transaction) -> Result<(), InventoryError> {
        let id = transaction.id;
        self.push(transaction, ApplyState::Pending)?;
        self.queue.push(id);
        Ok(())
    }

    /// Puts a pending transaction back at the end of the apply queue.
    pub(crate) fn requeue(&self, id: TransactionId) {
        self.queue.push(id);
    }

    /// Takes up to `limit` ids off the apply queue, oldest first.
    pub(crate) fn take_queued(&self, limit: usize) -> Vec<TransactionId> {
        std::iter::from_fn(|| self.queue.pop()).take(limit).collect()
    }

    /// Number of ids waiting on the apply queue.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Adds a transaction whose stock effect already committed.
    pub(crate) fn push_processed(
        &self,
        mut transaction: Transaction,
        processed_at: DateTime<Utc>,
    ) -> Result<Transaction, InventoryError> {
        transaction.processed_at = Some(processed_at);
        self.push(transaction.clone(), ApplyState::Processed)?;
        Ok(transaction)
    }

    fn push(&self, transaction: Transaction, state: ApplyState) -> Result<(), InventoryError> {
        let id = transaction.id;
        // Entry API gives an atomic check-and-insert.
        match self.transactions.entry(id) {
            Entry::Occupied(_) => Err(InventoryError::validation(format!(
                "duplicate transaction id {id}"
            ))),
            Entry::Vacant(entry) => {
                entry.insert(LogEntry { transaction, state });
                self.order.write().push(id);
                Ok(())
            }
        }
    }

    /// Moves a pending transaction to in-flight and returns a copy of it.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::NotFound`] - Unknown transaction id.
    /// - [`InventoryError::AlreadyProcessed`] - Stock effect already committed.
    /// - [`InventoryError::ApplyInProgress`] - Another caller holds the claim.
    pub(crate) fn claim(&self, id: TransactionId) -> Result<Transaction, InventoryError> {
        let mut entry = self
            .transactions
            .get_mut(&id)
            .ok_or(InventoryError::NotFound("transaction"))?;
        match entry.state {
            ApplyState::Processed => Err(InventoryError::AlreadyProcessed),
            ApplyState::Applying => Err(InventoryError::ApplyInProgress),
            ApplyState::Pending => {
                entry.state = ApplyState::Applying;
                Ok(entry.transaction.clone())
            }
        }
    }

    /// Returns a claimed transaction to pending after a failed apply.
    pub(crate) fn release(&self, id: TransactionId) {
        if let Some(mut entry) = self.transactions.get_mut(&id) {
            if entry.state == ApplyState::Applying {
                entry.state = ApplyState::Pending;
            }
        }
    }

    pub(crate) fn mark_processed(
        &self,
        id: TransactionId,
        processed_at: DateTime<Utc>,
    ) -> Option<Transaction> {
        let mut entry = self.transactions.get_mut(&id)?;
        entry.state = ApplyState::Processed;
        entry.transaction.processed_at = Some(processed_at);
        Some(entry.transaction.clone())
    }

    pub fn get(&self, id: TransactionId) -> Option<Transaction> {
        self.transactions.get(&id).map(|e| e.transaction.clone())
    }

    /// Transactions carrying the given reference number, in insertion order.
    pub fn by_reference(&self, reference: &str) -> Vec<Transaction> {
        self.all()
            .into_iter()
            .filter(|tx| tx.reference.as_deref() == Some(reference))
            .collect()
    }

    /// Every transaction in insertion order.
    pub fn all(&self) -> Vec<Transaction> {
        let order = self.order.read().clone();
        order.iter().filter_map(|id| self.get(*id)).collect()
    }

    /// Transactions logged but never successfully applied.
    pub fn pending(&self) -> Vec<Transaction> {
        self.all().into_iter().filter(|tx| !tx.is_processed()).collect()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

impl Default for TransactionLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{Location, ProductId, WarehouseId};
    use crate::transaction::TransactionDraft;
    use rust_decimal_macros::dec;

    fn tx(log: &TransactionLog) -> Transaction {
        TransactionDraft::inbound(
            ProductId(1),
            dec!(1),
            "kg",
            Location::warehouse(WarehouseId(1)),
        )
        .with_reference("REF-1")
        .build(log.allocate_id(), "kg".into(), None, Utc::now())
    }

    #[test]
    fn pending_ids_are_queued_in_order() {
        let log = TransactionLog::new();
        let a = tx(&log);
        let b = tx(&log);
        let (a_id, b_id) = (a.id, b.id);
        log.push_pending(a).unwrap();
        log.push_pending(b).unwrap();
        log.push_processed(tx(&log), Utc::now()).unwrap();

        assert_eq!(log.queued(), 2);
        assert_eq!(log.take_queued(1), vec![a_id]);
        log.requeue(a_id);
        assert_eq!(log.take_queued(10), vec![b_id, a_id]);
        assert_eq!(log.queued(), 0);
    }

    #[test]
    fn claim_is_exclusive_until_released() {
        let log = TransactionLog::new();
        let t = tx(&log);
        let id = t.id;
        log.push_pending(t).unwrap();

        log.claim(id).unwrap();
        assert_eq!(log.claim(id), Err(InventoryError::ApplyInProgress));

        log.release(id);
        assert!(log.claim(id).is_ok());

        log.mark_processed(id, Utc::now());
        assert_eq!(log.claim(id), Err(InventoryError::AlreadyProcessed));
        assert!(log.get(id).unwrap().is_processed());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let log = TransactionLog::new();
        let t = tx(&log);
        log.push_pending(t.clone()).unwrap();
        assert!(log.push_pending(t).is_err());
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn preserves_insertion_order_and_filters() {
        let log = TransactionLog::new();
        let first = tx(&log);
        let second = tx(&log);
        let (first_id, second_id) = (first.id, second.id);
        log.push_processed(second, Utc::now()).unwrap();
        log.push_pending(first).unwrap();

        let ids: Vec<_> = log.all().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![second_id, first_id]);
        assert_eq!(log.by_reference("REF-1").len(), 2);
        assert_eq!(log.pending().len(), 1);
        assert_eq!(log.pending()[0].id, first_id);
        assert_eq!(log.claim(TransactionId(999)), Err(InventoryError::NotFound("transaction")));
    }
}
