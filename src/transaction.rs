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

//! Inventory transactions.
//!
//! A transaction is one directional inventory fact. It is built from a
//! [`TransactionDraft`], validated, and then never changes except for the
//! processed stamp set right after its stock effect commits.
//!
//! | Type | Source | Destination |
//! |------|--------|-------------|
//! | `IN` | optional | required |
//! | `OUT` | required | optional |
//! | `TRANSFER` | required | required, must differ from source |

use crate::InventoryError;
use crate::base::{ActorId, Location, ProductId, TransactionId};
use crate::catalog::{MAX_QUANTITY, QUANTITY_SCALE};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    In,
    Out,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::Out => "OUT",
            Self::Transfer => "TRANSFER",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IN" | "INBOUND" => Ok(Self::In),
            "OUT" | "OUTBOUND" => Ok(Self::Out),
            "TRANSFER" => Ok(Self::Transfer),
            other => Err(InventoryError::UnsupportedTransactionType(other.to_string())),
        }
    }
}

/// Unvalidated intent to move stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDraft {
    pub kind: TransactionType,
    pub product: ProductId,
    pub quantity: Decimal,
    /// Empty means the product's base unit.
    pub unit: String,
    pub source: Option<Location>,
    pub destination: Option<Location>,
    pub reference: Option<String>,
    pub note: Option<String>,
}

impl TransactionDraft {
    pub fn inbound(
        product: ProductId,
        quantity: Decimal,
        unit: impl Into<String>,
        destination: Location,
    ) -> Self {
        Self::new(TransactionType::In, product, quantity, unit, None, Some(destination))
    }

    pub fn outbound(
        product: ProductId,
        quantity: Decimal,
        unit: impl Into<String>,
        source: Location,
    ) -> Self {
        Self::new(TransactionType::Out, product, quantity, unit, Some(source), None)
    }

    pub fn transfer(
        product: ProductId,
        quantity: Decimal,
        unit: impl Into<String>,
        source: Location,
        destination: Location,
    ) -> Self {
        Self::new(
            TransactionType::Transfer,
            product,
            quantity,
            unit,
            Some(source),
            Some(destination),
        )
    }

    fn new(
        kind: TransactionType,
        product: ProductId,
        quantity: Decimal,
        unit: impl Into<String>,
        source: Option<Location>,
        destination: Option<Location>,
    ) -> Self {
        Self {
            kind,
            product,
            quantity,
            unit: unit.into(),
            source,
            destination,
            reference: None,
            note: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Sets the informational counterpart location (source of an IN, destination of an OUT).
    pub fn with_counterpart(mut self, location: Location) -> Self {
        match self.kind {
            TransactionType::In => self.source = Some(location),
            TransactionType::Out => self.destination = Some(location),
            TransactionType::Transfer => {}
        }
        self
    }

    /// Checks quantity and location requirements for the transaction type.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Validation`] describing the first violated rule.
    pub fn validate(&self) -> Result<(), InventoryError> {
        if self.quantity <= Decimal::ZERO {
            return Err(InventoryError::validation("quantity must be positive"));
        }
        if self.quantity > MAX_QUANTITY {
            return Err(InventoryError::validation(format!(
                "quantity {} exceeds {MAX_QUANTITY}",
                self.quantity
            )));
        }
        if self.quantity.normalize().scale() > QUANTITY_SCALE {
            return Err(InventoryError::validation(format!(
                "quantity {} has more than {QUANTITY_SCALE} decimal places",
                self.quantity
            )));
        }
        match (self.kind, self.source, self.destination) {
            (TransactionType::In, _, None) => Err(InventoryError::validation(
                "inbound transaction requires a destination",
            )),
            (TransactionType::Out, None, _) => Err(InventoryError::validation(
                "outbound transaction requires a source",
            )),
            (TransactionType::Transfer, None, _) | (TransactionType::Transfer, _, None) => Err(
                InventoryError::validation("transfer requires both source and destination"),
            ),
            (TransactionType::Transfer, Some(src), Some(dst)) if src == dst => Err(
                InventoryError::validation("transfer source and destination must differ"),
            ),
            _ => Ok(()),
        }
    }

    pub(crate) fn build(
        self,
        id: TransactionId,
        unit: String,
        created_by: Option<ActorId>,
        created_at: DateTime<Utc>,
    ) -> Transaction {
        Transaction {
            id,
            kind: self.kind,
            product: self.product,
            quantity: self.quantity,
            unit,
            source: self.source,
            destination: self.destination,
            reference: self.reference,
            note: self.note,
            created_by,
            created_at,
            processed_at: None,
        }
    }
}

/// A validated, logged inventory transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub kind: TransactionType,
    pub product: ProductId,
    pub quantity: Decimal,
    pub unit: String,
    pub source: Option<Location>,
    pub destination: Option<Location>,
    pub reference: Option<String>,
    pub note: Option<String>,
    pub created_by: Option<ActorId>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::WarehouseId;
    use rust_decimal_macros::dec;

    fn wh(id: u32) -> Location {
        Location::warehouse(WarehouseId(id))
    }

    #[test]
    fn parses_type_names_case_insensitively() {
        assert_eq!("in".parse::<TransactionType>().unwrap(), TransactionType::In);
        assert_eq!(" Outbound ".parse::<TransactionType>().unwrap(), TransactionType::Out);
        assert_eq!("TRANSFER".parse::<TransactionType>().unwrap(), TransactionType::Transfer);
    }

    #[test]
    fn unknown_type_name_is_unsupported() {
        assert_eq!(
            "adjust".parse::<TransactionType>(),
            Err(InventoryError::UnsupportedTransactionType("ADJUST".into()))
        );
    }

    #[test]
    fn rejects_non_positive_quantity() {
        let draft = TransactionDraft::inbound(ProductId(1), dec!(0), "kg", wh(1));
        assert!(matches!(draft.validate(), Err(InventoryError::Validation(_))));
    }

    #[test]
    fn rejects_quantity_beyond_scale() {
        let draft = TransactionDraft::inbound(ProductId(1), dec!(1.00005), "kg", wh(1));
        assert!(draft.validate().is_err());

        let draft = TransactionDraft::inbound(ProductId(1), dec!(1.50000), "kg", wh(1));
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn rejects_quantity_beyond_record_capacity() {
        let draft = TransactionDraft::inbound(ProductId(1), MAX_QUANTITY, "kg", wh(1));
        assert!(draft.validate().is_ok());

        let draft = TransactionDraft::inbound(ProductId(1), Decimal::MAX, "kg", wh(1));
        assert!(matches!(draft.validate(), Err(InventoryError::Validation(_))));
    }

    #[test]
    fn location_requirements_follow_type() {
        let mut draft = TransactionDraft::inbound(ProductId(1), dec!(1), "kg", wh(1));
        draft.destination = None;
        assert!(draft.validate().is_err());

        let mut draft = TransactionDraft::outbound(ProductId(1), dec!(1), "kg", wh(1));
        draft.source = None;
        assert!(draft.validate().is_err());

        let draft = TransactionDraft::transfer(ProductId(1), dec!(1), "kg", wh(1), wh(1));
        assert_eq!(
            draft.validate(),
            Err(InventoryError::validation("transfer source and destination must differ"))
        );

        let draft = TransactionDraft::transfer(
            ProductId(1),
            dec!(1),
            "kg",
            wh(1),
            wh(1).with_section(crate::base::SectionId(2)),
        );
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn counterpart_is_informational() {
        let draft =
            TransactionDraft::outbound(ProductId(1), dec!(1), "kg", wh(1)).with_counterpart(wh(2));
        assert_eq!(draft.destination, Some(wh(2)));
        assert!(draft.validate().is_ok());
    }
}
