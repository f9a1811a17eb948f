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

//! Multi-segment movements.
//!
//! A movement is a business document (inbound receipt, outbound dispatch or
//! inter-warehouse transfer) made of ordered segments. Approving it turns each
//! segment into engine transactions, one atomic scope per segment.

mod model;
mod pipeline;
mod strategy;

pub use model::{
    COST_SCALE, CostType, Movement, MovementCost, MovementSegment, MovementStatus, MovementType,
    SegmentDraft, TransportInfo,
};
pub use pipeline::MovementPipeline;
pub use strategy::{
    InboundMovementStrategy, MovementStrategy, OutboundMovementStrategy, TransferMovementStrategy,
    movement_strategy_for,
};
