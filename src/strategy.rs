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

//! Stock update strategies.
//!
//! One strategy per [`TransactionType`], selected by [`strategy_for`]. A strategy
//! declares which quantity records it needs ([`StockStrategy::touches`]) so the
//! engine can lock them all up front, then runs its quantity changes and ledger
//! entries against the locked [`StockScope`].
//!
//! Strategies do not detect re-application of a transaction. Callers apply each
//! transaction once and stamp it processed right after.

use crate::InventoryError;
use crate::config::EngineConfig;
use crate::stock::{StockHandle, StockKey, StockScope};
use crate::transaction::{Transaction, TransactionType};
use rust_decimal::Decimal;

/// How a strategy needs a record to be resolved before locking.
///
/// Ordered weakest to strongest; when several transactions in one scope touch the
/// same record, the strongest mode wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TouchMode {
    /// Use the record if it exists; absence means nothing on hand.
    Optional,
    /// Record must already exist.
    Require,
    /// Create the record with zero quantity if missing.
    Create,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Touch {
    pub key: StockKey,
    pub mode: TouchMode,
}

pub trait StockStrategy: Send + Sync {
    /// Records this transaction reads or writes.
    fn touches(&self, tx: &Transaction, config: &EngineConfig) -> Vec<Touch>;

    /// Applies the transaction inside the scope.
    ///
    /// # Errors
    ///
    /// Any error leaves the scope to be dropped uncommitted.
    fn execute(
        &self,
        tx: &Transaction,
        scope: &mut StockScope<'_>,
        config: &EngineConfig,
    ) -> Result<(), InventoryError>;
}

pub struct InboundStrategy;
pub struct OutboundStrategy;
pub struct TransferStrategy;

static INBOUND: InboundStrategy = InboundStrategy;
static OUTBOUND: OutboundStrategy = OutboundStrategy;
static TRANSFER: TransferStrategy = TransferStrategy;

pub fn strategy_for(kind: TransactionType) -> &'static dyn StockStrategy {
    match kind {
        TransactionType::In => &INBOUND,
        TransactionType::Out => &OUTBOUND,
        TransactionType::Transfer => &TRANSFER,
    }
}

fn source_key(tx: &Transaction) -> Result<StockKey, InventoryError> {
    tx.source
        .map(|loc| StockKey::new(tx.product, loc))
        .ok_or_else(|| InventoryError::validation(format!("{} transaction requires a source", tx.kind)))
}

fn destination_key(tx: &Transaction) -> Result<StockKey, InventoryError> {
    tx.destination
        .map(|loc| StockKey::new(tx.product, loc))
        .ok_or_else(|| {
            InventoryError::validation(format!("{} transaction requires a destination", tx.kind))
        })
}

fn deposit(
    scope: &mut StockScope<'_>,
    handle: StockHandle,
    tx: &Transaction,
    note: &str,
) -> Result<(), InventoryError> {
    scope.apply_delta(handle, tx.quantity)?;
    scope.record(handle, tx.id, tx.quantity, tx.created_by, note);
    Ok(())
}

fn withdraw(
    scope: &mut StockScope<'_>,
    handle: Option<StockHandle>,
    tx: &Transaction,
    config: &EngineConfig,
    note: &str,
) -> Result<(), InventoryError> {
    let available = handle.map(|h| scope.quantity(h)).unwrap_or(Decimal::ZERO);
    if !config.allows_negative() && available < tx.quantity {
        tracing::warn!(
            transaction = %tx.id,
            product = %tx.product,
            requested = %tx.quantity,
            %available,
            "rejecting {} for insufficient stock",
            tx.kind
        );
        return Err(InventoryError::InsufficientStock {
            requested: tx.quantity,
            available,
        });
    }
    // Under the default policy a missing record was rejected above.
    let handle = handle.ok_or(InventoryError::StockRecordNotFound)?;
    scope.apply_delta(handle, -tx.quantity)?;
    scope.record(handle, tx.id, -tx.quantity, tx.created_by, note);
    Ok(())
}

impl StockStrategy for InboundStrategy {
    fn touches(&self, tx: &Transaction, _config: &EngineConfig) -> Vec<Touch> {
        destination_key(tx)
            .map(|key| vec![Touch { key, mode: TouchMode::Create }])
            .unwrap_or_default()
    }

    fn execute(
        &self,
        tx: &Transaction,
        scope: &mut StockScope<'_>,
        _config: &EngineConfig,
    ) -> Result<(), InventoryError> {
        let key = destination_key(tx)?;
        let handle = scope.handle(&key).ok_or(InventoryError::StockRecordNotFound)?;
        deposit(scope, handle, tx, "Inbound Transaction")
    }
}

impl StockStrategy for OutboundStrategy {
    fn touches(&self, tx: &Transaction, _config: &EngineConfig) -> Vec<Touch> {
        source_key(tx)
            .map(|key| vec![Touch { key, mode: TouchMode::Require }])
            .unwrap_or_default()
    }

    fn execute(
        &self,
        tx: &Transaction,
        scope: &mut StockScope<'_>,
        config: &EngineConfig,
    ) -> Result<(), InventoryError> {
        let key = source_key(tx)?;
        let handle = scope.handle(&key).ok_or(InventoryError::StockRecordNotFound)?;
        withdraw(scope, Some(handle), tx, config, "Outbound Transaction")
    }
}

impl StockStrategy for TransferStrategy {
    fn touches(&self, tx: &Transaction, config: &EngineConfig) -> Vec<Touch> {
        let source_mode = if config.allows_negative() {
            TouchMode::Create
        } else {
            TouchMode::Optional
        };
        let mut touches = Vec::with_capacity(2);
        if let Ok(key) = source_key(tx) {
            touches.push(Touch { key, mode: source_mode });
        }
        if let Ok(key) = destination_key(tx) {
            touches.push(Touch { key, mode: TouchMode::Create });
        }
        touches
    }

    fn execute(
        &self,
        tx: &Transaction,
        scope: &mut StockScope<'_>,
        config: &EngineConfig,
    ) -> Result<(), InventoryError> {
        let source = source_key(tx)?;
        let destination = destination_key(tx)?;
        if source == destination {
            return Err(InventoryError::validation(
                "transfer source and destination must differ",
            ));
        }
        let source_handle = scope.handle(&source);
        let destination_handle = scope
            .handle(&destination)
            .ok_or(InventoryError::StockRecordNotFound)?;

        withdraw(scope, source_handle, tx, config, "Transfer OUT")?;
        deposit(scope, destination_handle, tx, "Transfer IN")
    }
}
