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

//! Inventory ledger engine.
//!
//! The [`Engine`] is the central component that turns transactions into locked,
//! all-or-nothing quantity changes plus ledger entries. Movement and borrow
//! workflows are built on top of it.
//!
//! # Transaction Processing
//!
//! - **IN**: Credits the destination record, creating it if needed.
//! - **OUT**: Debits an existing source record (fails if stock is insufficient).
//! - **TRANSFER**: Debits the source and credits the destination in one scope.
//!
//! # Thread Safety
//!
//! Records are locked per key, always in key order, so any number of callers
//! may apply transactions concurrently without deadlocking.

use crate::InventoryError;
use crate::base::{ActorId, Location, ProductId, TransactionId};
use crate::catalog::{Catalog, Product, to_base_unit};
use crate::config::EngineConfig;
use crate::ledger::{LedgerEntry, LedgerRecorder};
use crate::sequence::ReferenceSequence;
use crate::stock::{QuantityStore, StockKey, StockScope};
use crate::strategy::{TouchMode, strategy_for};
use crate::transaction::{Transaction, TransactionDraft};
use crate::transaction_log::TransactionLog;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Transaction processing engine that owns the quantity store, the ledger and
/// the transaction log.
///
/// # Invariants
///
/// - Transactions are stored in the product's base unit.
/// - A quantity record only changes inside a committed [`StockScope`].
/// - Under [`StockPolicy::ForbidNegative`](crate::StockPolicy) no OUT or TRANSFER
///   drives a record below zero.
pub struct Engine {
    catalog: Arc<dyn Catalog>,
    stock: QuantityStore,
    ledger: LedgerRecorder,
    transactions: TransactionLog,
    sequences: ReferenceSequence,
    config: EngineConfig,
}

impl Engine {
    /// Creates an engine with the default configuration.
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self::with_config(catalog, EngineConfig::default())
    }

    pub fn with_config(catalog: Arc<dyn Catalog>, config: EngineConfig) -> Self {
        Engine {
            catalog,
            stock: QuantityStore::new(config.lock_timeout),
            ledger: LedgerRecorder::new(),
            transactions: TransactionLog::new(),
            sequences: ReferenceSequence::new(),
            config,
        }
    }

    /// Validates a draft, converts it to the product's base unit and assigns an id.
    ///
    /// Nothing is stored; the result is a transaction ready for [`apply`](Self::apply).
    ///
    /// # Errors
    ///
    /// - [`InventoryError::Validation`] - Quantity or locations are invalid.
    /// - [`InventoryError::UnknownProduct`] - Catalog has no such product.
    /// - [`InventoryError::MissingUnitConversion`] - Draft unit cannot be converted.
    pub fn prepare(
        &self,
        mut draft: TransactionDraft,
        actor: Option<ActorId>,
    ) -> Result<Transaction, InventoryError> {
        draft.validate()?;
        let product = self.product(draft.product)?;
        draft.quantity = to_base_unit(self.catalog.as_ref(), &product, draft.quantity, &draft.unit)?;
        if draft.quantity <= Decimal::ZERO {
            return Err(InventoryError::validation(
                "quantity rounds to zero in the base unit",
            ));
        }
        Ok(draft.build(
            self.transactions.allocate_id(),
            product.base_unit,
            actor,
            Utc::now(),
        ))
    }

    /// Applies one transaction's stock effect atomically.
    ///
    /// Does not check or set the processed flag; see [`execute`](Self::execute)
    /// and [`apply_recorded`](Self::apply_recorded) for the idempotent entry points.
    pub fn apply(&self, transaction: &Transaction) -> Result<Vec<LedgerEntry>, InventoryError> {
        self.apply_all(std::slice::from_ref(transaction))
    }

    /// Applies several transactions, in order, inside a single atomic scope.
    ///
    /// Every record any of them touches is locked up front in key order. If one
    /// transaction fails, none of them take effect.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::InsufficientStock`] - OUT/TRANSFER exceeds on-hand quantity.
    /// - [`InventoryError::StockRecordNotFound`] - OUT source has no record.
    /// - [`InventoryError::LockTimeout`] - A record lock wait expired.
    pub fn apply_all(&self, transactions: &[Transaction]) -> Result<Vec<LedgerEntry>, InventoryError> {
        let mut wanted: BTreeMap<StockKey, (TouchMode, &str)> = BTreeMap::new();
        for tx in transactions {
            for touch in strategy_for(tx.kind).touches(tx, &self.config) {
                wanted
                    .entry(touch.key)
                    .and_modify(|(mode, _)| *mode = (*mode).max(touch.mode))
                    .or_insert((touch.mode, tx.unit.as_str()));
            }
        }

        let outcome = self.apply_locked(transactions, &wanted);
        if outcome.is_err() {
            // Cells created for this scope must not outlive it.
            self.stock.prune_unwritten(
                wanted
                    .iter()
                    .filter(|(_, (mode, _))| *mode == TouchMode::Create)
                    .map(|(key, _)| key),
            );
        }
        outcome
    }

    fn apply_locked(
        &self,
        transactions: &[Transaction],
        wanted: &BTreeMap<StockKey, (TouchMode, &str)>,
    ) -> Result<Vec<LedgerEntry>, InventoryError> {
        // BTreeMap iteration yields cells in lock order.
        let mut cells = Vec::with_capacity(wanted.len());
        for (key, (mode, unit)) in wanted {
            match mode {
                TouchMode::Create => cells.push(self.stock.get_or_create(*key, unit)),
                TouchMode::Require => cells.push(
                    self.stock
                        .get(key)
                        .ok_or(InventoryError::StockRecordNotFound)?,
                ),
                TouchMode::Optional => cells.extend(self.stock.get(key)),
            }
        }

        let mut scope = StockScope::acquire(&cells, self.stock.lock_timeout())?;
        // Liveness only changes under the record lock, so this check is stable
        // for the lifetime of the scope.
        let unwritten_required = cells.iter().any(|cell| {
            !cell.is_live()
                && matches!(wanted.get(cell.key()), Some((TouchMode::Require, _)))
        });
        if unwritten_required {
            return Err(InventoryError::StockRecordNotFound);
        }
        for tx in transactions {
            strategy_for(tx.kind).execute(tx, &mut scope, &self.config)?;
            tracing::debug!(
                transaction = %tx.id,
                kind = %tx.kind,
                product = %tx.product,
                quantity = %tx.quantity,
                "transaction applied"
            );
        }
        Ok(scope.commit(&self.ledger))
    }

    /// Prepares, applies and logs the drafts as processed transactions.
    ///
    /// All drafts share one atomic scope. On failure nothing is logged and no
    /// stock changes.
    pub fn execute(
        &self,
        drafts: Vec<TransactionDraft>,
        actor: Option<ActorId>,
    ) -> Result<Vec<Transaction>, InventoryError> {
        let prepared = drafts
            .into_iter()
            .map(|draft| self.prepare(draft, actor))
            .collect::<Result<Vec<_>, _>>()?;
        self.apply_all(&prepared)?;
        let processed_at = Utc::now();
        prepared
            .into_iter()
            .map(|tx| self.transactions.push_processed(tx, processed_at))
            .collect()
    }

    /// Single-draft form of [`execute`](Self::execute).
    pub fn submit(
        &self,
        draft: TransactionDraft,
        actor: Option<ActorId>,
    ) -> Result<Transaction, InventoryError> {
        self.execute(vec![draft], actor)?
            .into_iter()
            .next()
            .ok_or(InventoryError::NotFound("transaction"))
    }

    /// Logs a transaction without applying it.
    pub fn record(
        &self,
        draft: TransactionDraft,
        actor: Option<ActorId>,
    ) -> Result<Transaction, InventoryError> {
        let tx = self.prepare(draft, actor)?;
        self.transactions.push_pending(tx.clone())?;
        Ok(tx)
    }

    /// Applies a logged transaction at most once.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::AlreadyProcessed`] - Already applied; nothing changes.
    /// - [`InventoryError::ApplyInProgress`] - Another caller is applying it.
    /// - Any error from [`apply`](Self::apply); the transaction stays pending.
    pub fn apply_recorded(&self, id: TransactionId) -> Result<Transaction, InventoryError> {
        let tx = self.transactions.claim(id)?;
        match self.apply(&tx) {
            Ok(_) => self
                .transactions
                .mark_processed(id, Utc::now())
                .ok_or(InventoryError::NotFound("transaction")),
            Err(err) => {
                self.transactions.release(id);
                Err(err)
            }
        }
    }

    /// Drains the apply queue once, applying each recorded transaction.
    ///
    /// Transactions that fail for a stock reason go back on the queue for a
    /// later drain. Ones already processed or claimed elsewhere are dropped from
    /// the queue. Returns the outcome per transaction, oldest first.
    pub fn apply_pending(&self) -> Vec<(TransactionId, Result<Transaction, InventoryError>)> {
        let ids = self.transactions.take_queued(self.transactions.queued());
        ids.into_iter()
            .map(|id| {
                let outcome = self.apply_recorded(id);
                if let Err(err) = &outcome {
                    match err {
                        InventoryError::AlreadyProcessed
                        | InventoryError::ApplyInProgress
                        | InventoryError::NotFound(_) => {}
                        _ => {
                            tracing::warn!(transaction = %id, error = %err, "pending transaction requeued");
                            self.transactions.requeue(id);
                        }
                    }
                }
                (id, outcome)
            })
            .collect()
    }

    pub fn product(&self, id: ProductId) -> Result<Product, InventoryError> {
        self.catalog
            .product(id)
            .ok_or(InventoryError::UnknownProduct(id))
    }

    /// Committed quantity at a location; zero when no record exists.
    pub fn quantity_at(&self, product: ProductId, location: Location) -> Decimal {
        self.stock
            .quantity(&StockKey::new(product, location))
            .unwrap_or(Decimal::ZERO)
    }

    pub fn catalog(&self) -> &dyn Catalog {
        self.catalog.as_ref()
    }

    pub fn stock(&self) -> &QuantityStore {
        &self.stock
    }

    pub fn ledger(&self) -> &LedgerRecorder {
        &self.ledger
    }

    pub fn transactions(&self) -> &TransactionLog {
        &self.transactions
    }

    pub fn sequences(&self) -> &ReferenceSequence {
        &self.sequences
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
