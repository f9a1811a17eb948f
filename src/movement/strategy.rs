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

//! Per-type segment processing.
//!
//! A movement strategy turns one segment into transaction drafts. Conversion to
//! the product's base unit and the atomic apply are shared through
//! [`MovementStrategy::process_segment`].

use crate::InventoryError;
use crate::base::Location;
use crate::catalog::to_base_unit;
use crate::engine::Engine;
use crate::movement::model::{Movement, MovementSegment, MovementType};
use crate::transaction::{Transaction, TransactionDraft};
use rust_decimal::Decimal;

pub trait MovementStrategy: Send + Sync {
    /// Drafts for one segment, quantity already in `base_unit`.
    fn transactions_for(
        &self,
        movement: &Movement,
        segment: &MovementSegment,
        quantity: Decimal,
        base_unit: &str,
    ) -> Result<Vec<TransactionDraft>, InventoryError>;

    /// Converts, builds and applies a segment's transactions in one atomic scope.
    ///
    /// # Errors
    ///
    /// [`InventoryError::MissingUnitConversion`] when the segment unit has no
    /// registered conversion, or any error from the engine. Nothing is applied
    /// on error.
    fn process_segment(
        &self,
        engine: &Engine,
        movement: &Movement,
        segment: &MovementSegment,
    ) -> Result<Vec<Transaction>, InventoryError> {
        let product = engine.product(segment.product)?;
        let quantity = to_base_unit(engine.catalog(), &product, segment.quantity, &segment.unit)?;
        let drafts = self
            .transactions_for(movement, segment, quantity, &product.base_unit)?
            .into_iter()
            .map(|draft| {
                draft
                    .with_reference(movement.reference.clone())
                    .with_note(format!("{} segment {}", movement.reference, segment.sequence))
            })
            .collect();
        engine.execute(drafts, movement.approved_by)
    }
}

pub struct InboundMovementStrategy;
pub struct OutboundMovementStrategy;
pub struct TransferMovementStrategy;

static INBOUND: InboundMovementStrategy = InboundMovementStrategy;
static OUTBOUND: OutboundMovementStrategy = OutboundMovementStrategy;
static TRANSFER: TransferMovementStrategy = TransferMovementStrategy;

pub fn movement_strategy_for(kind: MovementType) -> &'static dyn MovementStrategy {
    match kind {
        MovementType::In => &INBOUND,
        MovementType::Out => &OUTBOUND,
        MovementType::Transfer => &TRANSFER,
    }
}

fn resolved(
    movement: &Movement,
    segment: &MovementSegment,
) -> (Option<Location>, Option<Location>) {
    (
        movement.resolve_source(segment).map(Location::warehouse),
        movement.resolve_destination(segment).map(Location::warehouse),
    )
}

fn missing(side: &str) -> InventoryError {
    InventoryError::invalid_movement(format!("segment has no {side} warehouse"))
}

impl MovementStrategy for InboundMovementStrategy {
    fn transactions_for(
        &self,
        movement: &Movement,
        segment: &MovementSegment,
        quantity: Decimal,
        base_unit: &str,
    ) -> Result<Vec<TransactionDraft>, InventoryError> {
        let (_, destination) = resolved(movement, segment);
        let destination = destination.ok_or_else(|| missing("destination"))?;
        Ok(vec![TransactionDraft::inbound(
            segment.product,
            quantity,
            base_unit,
            destination,
        )])
    }
}

impl MovementStrategy for OutboundMovementStrategy {
    fn transactions_for(
        &self,
        movement: &Movement,
        segment: &MovementSegment,
        quantity: Decimal,
        base_unit: &str,
    ) -> Result<Vec<TransactionDraft>, InventoryError> {
        let (source, _) = resolved(movement, segment);
        let source = source.ok_or_else(|| missing("source"))?;
        Ok(vec![TransactionDraft::outbound(
            segment.product,
            quantity,
            base_unit,
            source,
        )])
    }
}

impl MovementStrategy for TransferMovementStrategy {
    /// OUT from the source, then IN to the destination.
    fn transactions_for(
        &self,
        movement: &Movement,
        segment: &MovementSegment,
        quantity: Decimal,
        base_unit: &str,
    ) -> Result<Vec<TransactionDraft>, InventoryError> {
        let (source, destination) = resolved(movement, segment);
        let source = source.ok_or_else(|| missing("source"))?;
        let destination = destination.ok_or_else(|| missing("destination"))?;
        Ok(vec![
            TransactionDraft::outbound(segment.product, quantity, base_unit, source)
                .with_counterpart(destination),
            TransactionDraft::inbound(segment.product, quantity, base_unit, destination)
                .with_counterpart(source),
        ])
    }
}
