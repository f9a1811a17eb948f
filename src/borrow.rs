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

//! Borrow workflow.
//!
//! A borrow takes stock out to a person and later brings it back. Issuing
//! produces one OUT transaction and returning produces one IN transaction; both
//! steps are idempotent and run under the borrow record's own mutex.

use crate::InventoryError;
use crate::base::{ActorId, BorrowId, Location, ProductId, TransactionId};
use crate::engine::Engine;
use crate::transaction::{Transaction, TransactionDraft};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

const REFERENCE_PREFIX: &str = "BORR";

/// Stored borrow status. Overdue is derived, see [`BorrowRecord::is_overdue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BorrowStatus {
    Out,
    Returned,
    Cancelled,
}

impl BorrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Out => "OUT",
            Self::Returned => "RETURNED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for BorrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input for [`BorrowDesk::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowRequest {
    pub borrower: ActorId,
    pub product: ProductId,
    pub quantity: Decimal,
    pub unit: String,
    pub source: Option<Location>,
    pub return_location: Option<Location>,
    pub expected_return_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
    pub created_by: Option<ActorId>,
}

impl BorrowRequest {
    pub fn new(
        borrower: ActorId,
        product: ProductId,
        quantity: Decimal,
        unit: impl Into<String>,
        source: Location,
    ) -> Self {
        Self {
            borrower,
            product,
            quantity,
            unit: unit.into(),
            source: Some(source),
            return_location: None,
            expected_return_at: None,
            note: None,
            created_by: None,
        }
    }

    /// Location the stock should come back to, when it is not the source.
    pub fn return_to(mut self, location: Location) -> Self {
        self.return_location = Some(location);
        self
    }

    pub fn due(mut self, at: DateTime<Utc>) -> Self {
        self.expected_return_at = Some(at);
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn created_by(mut self, actor: ActorId) -> Self {
        self.created_by = Some(actor);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowRecord {
    pub id: BorrowId,
    pub reference: String,
    pub borrower: ActorId,
    pub product: ProductId,
    pub quantity: Decimal,
    pub unit: String,
    pub source: Option<Location>,
    /// Where the stock goes back. Planned up front or on the way, and
    /// overwritten with the actual destination on return.
    pub return_location: Option<Location>,
    pub status: BorrowStatus,
    pub issued_at: Option<DateTime<Utc>>,
    pub expected_return_at: Option<DateTime<Utc>>,
    pub actual_returned_at: Option<DateTime<Utc>>,
    pub outgoing_transaction: Option<TransactionId>,
    pub return_transaction: Option<TransactionId>,
    pub note: Option<String>,
    pub created_by: Option<ActorId>,
    pub created_at: DateTime<Utc>,
}

impl BorrowRecord {
    /// Out past its expected return time and not yet returned.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == BorrowStatus::Out
            && self.actual_returned_at.is_none()
            && self.expected_return_at.is_some_and(|due| now > due)
    }

    pub fn is_issued(&self) -> bool {
        self.outgoing_transaction.is_some()
    }
}

/// Registry and state machine for borrow records.
pub struct BorrowDesk {
    engine: Arc<Engine>,
    records: DashMap<BorrowId, Arc<Mutex<BorrowRecord>>>,
    next_id: AtomicU64,
}

impl BorrowDesk {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            records: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Registers a borrow in status OUT. No stock moves until [`issue`](Self::issue).
    ///
    /// # Errors
    ///
    /// [`InventoryError::Validation`] for a non-positive quantity or a missing source.
    pub fn open(&self, request: BorrowRequest) -> Result<BorrowRecord, InventoryError> {
        if request.quantity <= Decimal::ZERO {
            return Err(InventoryError::validation("quantity must be positive"));
        }
        if request.source.is_none() {
            return Err(InventoryError::validation(
                "borrow requires a source warehouse",
            ));
        }
        self.engine.product(request.product)?;

        let id = BorrowId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let record = BorrowRecord {
            id,
            reference: self.engine.sequences().next_reference(REFERENCE_PREFIX),
            borrower: request.borrower,
            product: request.product,
            quantity: request.quantity,
            unit: request.unit,
            source: request.source,
            return_location: request.return_location,
            status: BorrowStatus::Out,
            issued_at: None,
            expected_return_at: request.expected_return_at,
            actual_returned_at: None,
            outgoing_transaction: None,
            return_transaction: None,
            note: request.note,
            created_by: request.created_by,
            created_at: Utc::now(),
        };
        self.records
            .insert(id, Arc::new(Mutex::new(record.clone())));
        Ok(record)
    }

    /// Takes the borrowed stock out of its source. Calling again returns the
    /// transaction created the first time.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::InvalidStatus`] - Borrow was cancelled or returned.
    /// - Any engine error; the borrow stays unissued.
    pub fn issue(&self, id: BorrowId, actor: Option<ActorId>) -> Result<Transaction, InventoryError> {
        let cell = self.cell(id)?;
        let mut record = cell.lock();
        if let Some(tx) = record.outgoing_transaction {
            return self
                .engine
                .transactions()
                .get(tx)
                .ok_or(InventoryError::NotFound("transaction"));
        }
        if record.status != BorrowStatus::Out {
            return Err(InventoryError::InvalidStatus {
                current: record.status.as_str(),
                action: "issue",
            });
        }
        let source = record
            .source
            .ok_or_else(|| InventoryError::validation("borrow requires a source warehouse"))?;

        let actor = actor.or(record.created_by);
        let draft = TransactionDraft::outbound(
            record.product,
            record.quantity,
            record.unit.clone(),
            source,
        )
        .with_reference(record.reference.clone())
        .with_note(format!("Borrow issued to {}", record.borrower));
        let tx = self.engine.submit(draft, actor)?;

        record.outgoing_transaction = Some(tx.id);
        record.issued_at = Some(tx.created_at);
        if record.created_by.is_none() {
            record.created_by = actor;
        }
        tracing::info!(borrow = %id, reference = %record.reference, transaction = %tx.id, "borrow issued");
        Ok(tx)
    }

    /// Brings the stock back and marks the borrow RETURNED.
    ///
    /// The destination is `destination` when given, else the recorded return
    /// location, else the original source. Calling again on a returned borrow
    /// returns the first return transaction.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::InvalidStatus`] - Borrow was cancelled or never issued.
    /// - Any engine error; the borrow stays OUT.
    pub fn mark_returned(
        &self,
        id: BorrowId,
        actor: Option<ActorId>,
        returned_at: Option<DateTime<Utc>>,
        destination: Option<Location>,
    ) -> Result<Transaction, InventoryError> {
        let cell = self.cell(id)?;
        let mut record = cell.lock();
        if let Some(tx) = record.return_transaction {
            return self
                .engine
                .transactions()
                .get(tx)
                .ok_or(InventoryError::NotFound("transaction"));
        }
        if record.status != BorrowStatus::Out {
            return Err(InventoryError::InvalidStatus {
                current: record.status.as_str(),
                action: "return",
            });
        }
        if !record.is_issued() {
            return Err(InventoryError::InvalidStatus {
                current: "NOT_ISSUED",
                action: "return",
            });
        }
        let target = destination
            .or(record.return_location)
            .or(record.source)
            .ok_or_else(|| InventoryError::validation("no return location"))?;

        let actor = actor.or(record.created_by);
        let draft = TransactionDraft::inbound(
            record.product,
            record.quantity,
            record.unit.clone(),
            target,
        )
        .with_reference(record.reference.clone())
        .with_note(format!("Borrow returned by {}", record.borrower));
        let tx = self.engine.submit(draft, actor)?;

        record.return_transaction = Some(tx.id);
        record.return_location = Some(target);
        record.status = BorrowStatus::Returned;
        record.actual_returned_at = Some(returned_at.unwrap_or(tx.created_at));
        tracing::info!(borrow = %id, reference = %record.reference, transaction = %tx.id, "borrow returned");
        Ok(tx)
    }

    /// Records where the stock should be returned to.
    ///
    /// # Errors
    ///
    /// [`InventoryError::InvalidStatus`] once the borrow is returned or cancelled.
    pub fn set_return_location(
        &self,
        id: BorrowId,
        location: Location,
    ) -> Result<BorrowRecord, InventoryError> {
        let cell = self.cell(id)?;
        let mut record = cell.lock();
        if record.status != BorrowStatus::Out {
            return Err(InventoryError::InvalidStatus {
                current: record.status.as_str(),
                action: "change return location",
            });
        }
        record.return_location = Some(location);
        Ok(record.clone())
    }

    /// Cancels a borrow that has not been issued. Cancelling twice is a no-op.
    ///
    /// # Errors
    ///
    /// [`InventoryError::AlreadyIssued`] once stock has gone out.
    pub fn cancel(&self, id: BorrowId, actor: Option<ActorId>) -> Result<BorrowRecord, InventoryError> {
        let cell = self.cell(id)?;
        let mut record = cell.lock();
        if record.is_issued() {
            return Err(InventoryError::AlreadyIssued);
        }
        if record.status != BorrowStatus::Cancelled {
            record.status = BorrowStatus::Cancelled;
            tracing::info!(borrow = %id, actor = ?actor, "borrow cancelled");
        }
        Ok(record.clone())
    }

    pub fn get(&self, id: BorrowId) -> Option<BorrowRecord> {
        self.records.get(&id).map(|cell| cell.lock().clone())
    }

    /// Borrows past due at `now`, ordered by id.
    pub fn overdue(&self, now: DateTime<Utc>) -> Vec<BorrowRecord> {
        let mut records: Vec<BorrowRecord> = self
            .records
            .iter()
            .filter_map(|entry| {
                let record = entry.value().lock();
                record.is_overdue(now).then(|| record.clone())
            })
            .collect();
        records.sort_by_key(|r| r.id);
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn cell(&self, id: BorrowId) -> Result<Arc<Mutex<BorrowRecord>>, InventoryError> {
        self.records
            .get(&id)
            .map(|cell| Arc::clone(&cell))
            .ok_or(InventoryError::NotFound("borrow"))
    }
}
