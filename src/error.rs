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

//! Error types for inventory processing.

use crate::base::ProductId;
use rust_decimal::Decimal;
use thiserror::Error;

/// Inventory processing errors.
///
/// Every mutation failure rolls back its atomic scope before the error is
/// returned, so callers never observe partial quantity or ledger writes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Malformed or contradictory input, rejected before any mutation
    #[error("validation failed: {0}")]
    Validation(String),

    /// Movement or segment violates its type/location rules
    #[error("invalid movement: {0}")]
    InvalidMovement(String),

    /// Outbound or transfer quantity exceeds what is on hand
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock {
        requested: Decimal,
        available: Decimal,
    },

    /// No registered conversion between the two units for the product
    #[error("no unit conversion from {from_unit} to {to_unit} for product {product}")]
    MissingUnitConversion {
        product: ProductId,
        from_unit: String,
        to_unit: String,
    },

    /// Transaction type name is not IN, OUT or TRANSFER
    #[error("unsupported transaction type: {0}")]
    UnsupportedTransactionType(String),

    /// A stock lock could not be acquired within the configured wait
    #[error("timed out waiting for stock lock")]
    LockTimeout,

    /// Outbound source has never held stock for the product
    #[error("stock record not found")]
    StockRecordNotFound,

    /// Catalog does not know the product
    #[error("unknown product {0}")]
    UnknownProduct(ProductId),

    /// Operation is not legal in the record's current status
    #[error("cannot {action} while {current}")]
    InvalidStatus {
        current: &'static str,
        action: &'static str,
    },

    /// Borrow already produced an outgoing transaction
    #[error("borrow already issued")]
    AlreadyIssued,

    /// Transaction has already been applied to stock
    #[error("transaction already processed")]
    AlreadyProcessed,

    /// Another caller is applying the same transaction right now
    #[error("transaction apply already in progress")]
    ApplyInProgress,

    /// Referenced record does not exist
    #[error("{0} not found")]
    NotFound(&'static str),
}

impl InventoryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_movement(msg: impl Into<String>) -> Self {
        Self::InvalidMovement(msg.into())
    }
}
