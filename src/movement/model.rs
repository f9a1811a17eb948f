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

//! Movement, segment and cost records.
//!
//! ```text
//!  DRAFT ──approve──► APPROVED ──(all segments processed)──► COMPLETED
//!    │                   │                                      ▲
//!    └──cancel──► CANCELLED  └──mark_in_transit──► IN_TRANSIT ──┘
//! ```

use crate::InventoryError;
use crate::base::{ActorId, MovementId, ProductId, SegmentId, TransactionId, WarehouseId};
use crate::catalog::QUANTITY_SCALE;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Monetary amounts on cost lines carry cents.
pub const COST_SCALE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementType {
    In,
    Out,
    Transfer,
}

impl MovementType {
    /// Prefix used for the movement's reference number.
    pub fn reference_prefix(&self) -> &'static str {
        match self {
            Self::In => "MOV-IN",
            Self::Out => "MOV-OUT",
            Self::Transfer => "MOV-TRF",
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::In => "IN",
            Self::Out => "OUT",
            Self::Transfer => "TRANSFER",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementStatus {
    Draft,
    Approved,
    InTransit,
    Completed,
    Cancelled,
}

impl MovementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Approved => "APPROVED",
            Self::InTransit => "IN_TRANSIT",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for MovementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Informational transport details; never affect stock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportInfo {
    pub mode: Option<String>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub departure_time: Option<DateTime<Utc>>,
    pub arrival_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CostType {
    VehicleRent,
    DriverFee,
    Fuel,
    Insurance,
    Customs,
    Handling,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementCost {
    pub cost_type: CostType,
    pub amount: Decimal,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MovementCost {
    pub(crate) fn new(
        cost_type: CostType,
        amount: Decimal,
        description: Option<String>,
    ) -> Result<Self, InventoryError> {
        if amount < Decimal::ZERO {
            return Err(InventoryError::validation("cost amount cannot be negative"));
        }
        if amount.normalize().scale() > COST_SCALE {
            return Err(InventoryError::validation(format!(
                "cost amount {amount} has more than {COST_SCALE} decimal places"
            )));
        }
        Ok(Self {
            cost_type,
            amount,
            description,
            created_at: Utc::now(),
        })
    }
}

/// Line item to add to a draft movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentDraft {
    pub product: ProductId,
    pub quantity: Decimal,
    pub unit: String,
    pub from_warehouse: Option<WarehouseId>,
    pub to_warehouse: Option<WarehouseId>,
    /// Explicit position; `None` appends after the current last segment.
    pub sequence: Option<u32>,
    pub transport: TransportInfo,
}

impl SegmentDraft {
    pub fn new(product: ProductId, quantity: Decimal, unit: impl Into<String>) -> Self {
        Self {
            product,
            quantity,
            unit: unit.into(),
            from_warehouse: None,
            to_warehouse: None,
            sequence: None,
            transport: TransportInfo::default(),
        }
    }

    pub fn from_warehouse(mut self, warehouse: WarehouseId) -> Self {
        self.from_warehouse = Some(warehouse);
        self
    }

    pub fn to_warehouse(mut self, warehouse: WarehouseId) -> Self {
        self.to_warehouse = Some(warehouse);
        self
    }

    pub fn sequence(mut self, sequence: u32) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn transport(mut self, transport: TransportInfo) -> Self {
        self.transport = transport;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementSegment {
    pub id: SegmentId,
    pub sequence: u32,
    pub product: ProductId,
    pub quantity: Decimal,
    pub unit: String,
    pub from_warehouse: Option<WarehouseId>,
    pub to_warehouse: Option<WarehouseId>,
    pub transport: TransportInfo,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub transactions: Vec<TransactionId>,
    pub costs: Vec<MovementCost>,
}

impl MovementSegment {
    pub(crate) fn from_draft(id: SegmentId, sequence: u32, draft: SegmentDraft) -> Self {
        Self {
            id,
            sequence,
            product: draft.product,
            quantity: draft.quantity,
            unit: draft.unit,
            from_warehouse: draft.from_warehouse,
            to_warehouse: draft.to_warehouse,
            transport: draft.transport,
            processed: false,
            processed_at: None,
            transactions: Vec::new(),
            costs: Vec::new(),
        }
    }

    pub(crate) fn mark_processed(&mut self, transactions: &[TransactionId], at: DateTime<Utc>) {
        self.processed = true;
        self.processed_at = Some(at);
        self.transactions.extend_from_slice(transactions);
    }

    pub fn total_cost(&self) -> Decimal {
        self.costs.iter().map(|c| c.amount).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub reference: String,
    pub kind: MovementType,
    pub source: Option<WarehouseId>,
    pub destination: Option<WarehouseId>,
    pub status: MovementStatus,
    pub note: Option<String>,
    pub created_by: Option<ActorId>,
    pub approved_by: Option<ActorId>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// True only once every segment is processed.
    pub processed: bool,
    /// Kept sorted by `sequence`.
    pub segments: Vec<MovementSegment>,
}

impl Movement {
    /// Source warehouse for a segment, falling back to the movement's.
    pub fn resolve_source(&self, segment: &MovementSegment) -> Option<WarehouseId> {
        segment.from_warehouse.or(self.source)
    }

    /// Destination warehouse for a segment, falling back to the movement's.
    pub fn resolve_destination(&self, segment: &MovementSegment) -> Option<WarehouseId> {
        segment.to_warehouse.or(self.destination)
    }

    /// Movement-level type and location rules.
    pub fn validate(&self) -> Result<(), InventoryError> {
        match self.kind {
            MovementType::Transfer => match (self.source, self.destination) {
                (Some(src), Some(dst)) if src == dst => Err(InventoryError::invalid_movement(
                    "source and destination warehouses must differ for transfer",
                )),
                (Some(_), Some(_)) => Ok(()),
                _ => Err(InventoryError::invalid_movement(
                    "transfer must have both source and destination warehouses",
                )),
            },
            MovementType::In if self.destination.is_none() => Err(
                InventoryError::invalid_movement("inbound must have destination warehouse"),
            ),
            MovementType::Out if self.source.is_none() => Err(InventoryError::invalid_movement(
                "outbound must have source warehouse",
            )),
            _ => Ok(()),
        }
    }

    /// Segment rules, with locations resolved against this movement.
    pub fn validate_segment(&self, segment: &MovementSegment) -> Result<(), InventoryError> {
        if segment.quantity <= Decimal::ZERO {
            return Err(InventoryError::invalid_movement(
                "quantity must be a positive number",
            ));
        }
        if segment.quantity.normalize().scale() > QUANTITY_SCALE {
            return Err(InventoryError::invalid_movement(format!(
                "quantity {} has more than {QUANTITY_SCALE} decimal places",
                segment.quantity
            )));
        }
        let source = self.resolve_source(segment);
        let destination = self.resolve_destination(segment);
        match self.kind {
            MovementType::Out if source.is_none() => Err(InventoryError::invalid_movement(
                "outbound segment must have a source warehouse",
            )),
            MovementType::In if destination.is_none() => Err(InventoryError::invalid_movement(
                "inbound segment must have a destination warehouse",
            )),
            MovementType::Transfer => match (source, destination) {
                (Some(src), Some(dst)) if src == dst => Err(InventoryError::invalid_movement(
                    "source and destination warehouses must differ for transfer segments",
                )),
                (Some(_), Some(_)) => Ok(()),
                _ => Err(InventoryError::invalid_movement(
                    "transfer segment must have both source and destination warehouses",
                )),
            },
            _ => Ok(()),
        }
    }

    /// Everything `approve` checks: movement rules, at least one segment, every segment.
    pub(crate) fn validate_for_approval(&self) -> Result<(), InventoryError> {
        self.validate()?;
        if self.segments.is_empty() {
            return Err(InventoryError::invalid_movement("movement has no segments"));
        }
        self.segments
            .iter()
            .try_for_each(|segment| self.validate_segment(segment))
    }

    pub(crate) fn next_sequence(&self) -> u32 {
        self.segments.iter().map(|s| s.sequence).max().unwrap_or(0) + 1
    }

    pub(crate) fn insert_segment(&mut self, segment: MovementSegment) {
        let at = self
            .segments
            .partition_point(|s| s.sequence < segment.sequence);
        self.segments.insert(at, segment);
    }

    /// Index of the lowest-sequence segment still waiting to be processed.
    pub(crate) fn next_unprocessed(&self) -> Option<usize> {
        self.segments.iter().position(|s| !s.processed)
    }

    pub fn segment(&self, id: SegmentId) -> Option<&MovementSegment> {
        self.segments.iter().find(|s| s.id == id)
    }

    pub(crate) fn segment_mut(&mut self, id: SegmentId) -> Result<&mut MovementSegment, InventoryError> {
        self.segments
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(InventoryError::NotFound("segment"))
    }

    pub fn processed_segments(&self) -> usize {
        self.segments.iter().filter(|s| s.processed).count()
    }

    pub fn total_cost(&self) -> Decimal {
        self.segments.iter().map(|s| s.total_cost()).sum()
    }
}
