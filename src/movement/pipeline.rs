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

use crate::InventoryError;
use crate::base::{ActorId, MovementId, SegmentId, WarehouseId};
use crate::engine::Engine;
use crate::movement::model::{
    CostType, Movement, MovementCost, MovementSegment, MovementStatus, MovementType, SegmentDraft,
    TransportInfo,
};
use crate::movement::strategy::movement_strategy_for;
use crate::transaction::Transaction;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Drives movements from draft to completion.
///
/// Each movement sits behind its own mutex. Processing holds that mutex while a
/// segment's stock records are locked, never the other way round, so movement
/// and engine locks cannot deadlock.
pub struct MovementPipeline {
    engine: Arc<Engine>,
    movements: DashMap<MovementId, Arc<Mutex<Movement>>>,
    next_id: AtomicU64,
    next_segment_id: AtomicU64,
}

impl MovementPipeline {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            movements: DashMap::new(),
            next_id: AtomicU64::new(1),
            next_segment_id: AtomicU64::new(1),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Opens a draft movement with a fresh `MOV-*` reference.
    ///
    /// Location rules are checked when segments are added and on approval.
    pub fn create(
        &self,
        kind: MovementType,
        source: Option<WarehouseId>,
        destination: Option<WarehouseId>,
        note: Option<String>,
        actor: Option<ActorId>,
    ) -> Movement {
        let id = MovementId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let movement = Movement {
            id,
            reference: self
                .engine
                .sequences()
                .next_reference(kind.reference_prefix()),
            kind,
            source,
            destination,
            status: MovementStatus::Draft,
            note,
            created_by: actor,
            approved_by: None,
            created_at: Utc::now(),
            approved_at: None,
            completed_at: None,
            processed: false,
            segments: Vec::new(),
        };
        tracing::info!(movement = %id, reference = %movement.reference, %kind, "movement created");
        self.movements
            .insert(id, Arc::new(Mutex::new(movement.clone())));
        movement
    }

    /// Adds a line item to a draft movement.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::InvalidStatus`] - Movement is no longer a draft.
    /// - [`InventoryError::InvalidMovement`] - Duplicate sequence or bad locations.
    pub fn add_segment(
        &self,
        id: MovementId,
        draft: SegmentDraft,
    ) -> Result<MovementSegment, InventoryError> {
        let cell = self.cell(id)?;
        let mut movement = cell.lock();
        if movement.status != MovementStatus::Draft {
            return Err(InventoryError::InvalidStatus {
                current: movement.status.as_str(),
                action: "add a segment",
            });
        }
        let sequence = draft.sequence.unwrap_or_else(|| movement.next_sequence());
        if movement.segments.iter().any(|s| s.sequence == sequence) {
            return Err(InventoryError::invalid_movement(format!(
                "segment sequence {sequence} already used"
            )));
        }
        let segment_id = SegmentId(self.next_segment_id.fetch_add(1, Ordering::Relaxed));
        let segment = MovementSegment::from_draft(segment_id, sequence, draft);
        movement.validate_segment(&segment)?;
        movement.insert_segment(segment.clone());
        Ok(segment)
    }

    /// Replaces a segment's transport details. Allowed in any status.
    pub fn set_transport(
        &self,
        id: MovementId,
        segment: SegmentId,
        transport: TransportInfo,
    ) -> Result<(), InventoryError> {
        let cell = self.cell(id)?;
        let mut movement = cell.lock();
        movement.segment_mut(segment)?.transport = transport;
        Ok(())
    }

    /// Attaches a cost line to a segment. Costs never affect stock.
    pub fn add_cost(
        &self,
        id: MovementId,
        segment: SegmentId,
        cost_type: CostType,
        amount: Decimal,
        description: Option<String>,
    ) -> Result<MovementCost, InventoryError> {
        let cost = MovementCost::new(cost_type, amount, description)?;
        let cell = self.cell(id)?;
        let mut movement = cell.lock();
        movement.segment_mut(segment)?.costs.push(cost.clone());
        Ok(cost)
    }

    pub fn cancel(&self, id: MovementId, actor: Option<ActorId>) -> Result<Movement, InventoryError> {
        let cell = self.cell(id)?;
        let mut movement = cell.lock();
        if movement.status != MovementStatus::Draft {
            return Err(InventoryError::InvalidStatus {
                current: movement.status.as_str(),
                action: "cancel",
            });
        }
        movement.status = MovementStatus::Cancelled;
        tracing::info!(movement = %id, actor = ?actor, "movement cancelled");
        Ok(movement.clone())
    }

    pub fn mark_in_transit(&self, id: MovementId) -> Result<Movement, InventoryError> {
        let cell = self.cell(id)?;
        let mut movement = cell.lock();
        if movement.status != MovementStatus::Approved || movement.processed {
            return Err(InventoryError::InvalidStatus {
                current: movement.status.as_str(),
                action: "mark in transit",
            });
        }
        movement.status = MovementStatus::InTransit;
        Ok(movement.clone())
    }

    /// Approves a draft and, unless `run_async`, processes it right away.
    ///
    /// Approval sticks even if processing then fails; the movement can be
    /// retried with [`process`](Self::process) once the cause is fixed.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::InvalidStatus`] - Not a draft.
    /// - [`InventoryError::InvalidMovement`] - No segments or bad locations.
    /// - Any processing error when `run_async` is false.
    pub fn approve(
        &self,
        id: MovementId,
        actor: Option<ActorId>,
        run_async: bool,
    ) -> Result<Movement, InventoryError> {
        let cell = self.cell(id)?;
        {
            let mut movement = cell.lock();
            if movement.status != MovementStatus::Draft {
                return Err(InventoryError::InvalidStatus {
                    current: movement.status.as_str(),
                    action: "approve",
                });
            }
            movement.validate_for_approval()?;
            movement.status = MovementStatus::Approved;
            movement.approved_by = actor;
            movement.approved_at = Some(Utc::now());
            tracing::info!(movement = %id, reference = %movement.reference, "movement approved");
        }
        if !run_async {
            self.process(id)?;
        }
        Ok(cell.lock().clone())
    }

    /// Processes every unprocessed segment in sequence order.
    ///
    /// Each segment commits on its own. Processing stops at the first failing
    /// segment; earlier segments stay committed and a later call resumes from
    /// the failed one. Returns the transactions created by this call.
    pub fn process(&self, id: MovementId) -> Result<Vec<Transaction>, InventoryError> {
        let cell = self.cell(id)?;
        let strategy = {
            let movement = cell.lock();
            if movement.processed {
                return Ok(Vec::new());
            }
            if !matches!(
                movement.status,
                MovementStatus::Approved | MovementStatus::InTransit
            ) {
                return Err(InventoryError::InvalidStatus {
                    current: movement.status.as_str(),
                    action: "process",
                });
            }
            movement.validate()?;
            movement_strategy_for(movement.kind)
        };

        let mut created = Vec::new();
        loop {
            let mut movement = cell.lock();
            if movement.processed {
                break;
            }
            let Some(index) = movement.next_unprocessed() else {
                movement.processed = true;
                movement.status = MovementStatus::Completed;
                movement.completed_at = Some(Utc::now());
                tracing::info!(movement = %id, reference = %movement.reference, "movement completed");
                break;
            };

            let segment = movement.segments[index].clone();
            match strategy.process_segment(&self.engine, &movement, &segment) {
                Ok(transactions) => {
                    let ids: Vec<_> = transactions.iter().map(|tx| tx.id).collect();
                    movement.segments[index].mark_processed(&ids, Utc::now());
                    tracing::debug!(
                        movement = %id,
                        sequence = segment.sequence,
                        transactions = ids.len(),
                        "segment processed"
                    );
                    created.extend(transactions);
                }
                Err(err) => {
                    tracing::warn!(
                        movement = %id,
                        sequence = segment.sequence,
                        error = %err,
                        "segment processing failed"
                    );
                    return Err(err);
                }
            }
        }
        Ok(created)
    }

    pub fn get(&self, id: MovementId) -> Option<Movement> {
        self.movements.get(&id).map(|cell| cell.lock().clone())
    }

    pub fn by_reference(&self, reference: &str) -> Option<Movement> {
        self.movements.iter().find_map(|entry| {
            let movement = entry.value().lock();
            (movement.reference == reference).then(|| movement.clone())
        })
    }

    /// All movements, ordered by id.
    pub fn all(&self) -> Vec<Movement> {
        let mut movements: Vec<Movement> = self
            .movements
            .iter()
            .map(|entry| entry.value().lock().clone())
            .collect();
        movements.sort_by_key(|m| m.id);
        movements
    }

    pub fn len(&self) -> usize {
        self.movements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.movements.is_empty()
    }

    fn cell(&self, id: MovementId) -> Result<Arc<Mutex<Movement>>, InventoryError> {
        self.movements
            .get(&id)
            .map(|cell| Arc::clone(&cell))
            .ok_or(InventoryError::NotFound("movement"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{Location, ProductId};
    use crate::catalog::{InMemoryCatalog, Product};
    use rust_decimal_macros::dec;

    const WIDGET: ProductId = ProductId(1);
    const NORTH: WarehouseId = WarehouseId(1);
    const SOUTH: WarehouseId = WarehouseId(2);

    fn pipeline() -> MovementPipeline {
        let catalog = InMemoryCatalog::new();
        catalog.add_product(Product::new(WIDGET, "Widget", "pcs"));
        MovementPipeline::new(Arc::new(Engine::new(Arc::new(catalog))))
    }

    #[test]
    fn references_follow_type_prefix() {
        let p = pipeline();
        let a = p.create(MovementType::In, None, Some(NORTH), None, None);
        let b = p.create(MovementType::In, None, Some(NORTH), None, None);
        let c = p.create(MovementType::Transfer, Some(NORTH), Some(SOUTH), None, None);
        assert_eq!(a.reference, "MOV-IN-00001");
        assert_eq!(b.reference, "MOV-IN-00002");
        assert_eq!(c.reference, "MOV-TRF-00001");
        assert_eq!(p.by_reference("MOV-TRF-00001").map(|m| m.id), Some(c.id));
    }

    #[test]
    fn duplicate_sequence_rejected() {
        let p = pipeline();
        let m = p.create(MovementType::In, None, Some(NORTH), None, None);
        p.add_segment(m.id, SegmentDraft::new(WIDGET, dec!(1), "pcs").sequence(3))
            .unwrap();
        let err = p
            .add_segment(m.id, SegmentDraft::new(WIDGET, dec!(1), "pcs").sequence(3))
            .unwrap_err();
        assert!(matches!(err, InventoryError::InvalidMovement(_)));
        let next = p
            .add_segment(m.id, SegmentDraft::new(WIDGET, dec!(1), "pcs"))
            .unwrap();
        assert_eq!(next.sequence, 4);
    }

    #[test]
    fn segments_only_added_to_drafts() {
        let p = pipeline();
        let m = p.create(MovementType::In, None, Some(NORTH), None, None);
        p.add_segment(m.id, SegmentDraft::new(WIDGET, dec!(1), "pcs"))
            .unwrap();
        p.approve(m.id, None, true).unwrap();
        let err = p
            .add_segment(m.id, SegmentDraft::new(WIDGET, dec!(1), "pcs"))
            .unwrap_err();
        assert_eq!(
            err,
            InventoryError::InvalidStatus {
                current: "APPROVED",
                action: "add a segment"
            }
        );
    }

    #[test]
    fn approve_without_segments_fails() {
        let p = pipeline();
        let m = p.create(MovementType::In, None, Some(NORTH), None, None);
        assert!(matches!(
            p.approve(m.id, None, false),
            Err(InventoryError::InvalidMovement(_))
        ));
        assert_eq!(p.get(m.id).unwrap().status, MovementStatus::Draft);
    }

    #[test]
    fn cancel_only_from_draft() {
        let p = pipeline();
        let m = p.create(MovementType::In, None, Some(NORTH), None, None);
        assert_eq!(
            p.cancel(m.id, None).unwrap().status,
            MovementStatus::Cancelled
        );
        assert_eq!(
            p.cancel(m.id, None),
            Err(InventoryError::InvalidStatus {
                current: "CANCELLED",
                action: "cancel"
            })
        );
        assert!(matches!(
            p.process(m.id),
            Err(InventoryError::InvalidStatus { .. })
        ));
    }

    #[test]
    fn in_transit_then_process_completes() {
        let p = pipeline();
        let m = p.create(MovementType::In, None, Some(NORTH), None, None);
        p.add_segment(m.id, SegmentDraft::new(WIDGET, dec!(5), "pcs"))
            .unwrap();
        p.approve(m.id, Some(ActorId(9)), true).unwrap();
        assert_eq!(
            p.mark_in_transit(m.id).unwrap().status,
            MovementStatus::InTransit
        );

        let created = p.process(m.id).unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].created_by, Some(ActorId(9)));
        assert_eq!(created[0].reference.as_deref(), Some("MOV-IN-00001"));

        let done = p.get(m.id).unwrap();
        assert!(done.processed);
        assert_eq!(done.status, MovementStatus::Completed);
        assert!(done.completed_at.is_some());
        assert_eq!(
            p.engine().quantity_at(WIDGET, Location::warehouse(NORTH)),
            dec!(5)
        );

        // Already processed: nothing more happens.
        assert!(p.process(m.id).unwrap().is_empty());
        assert!(p.mark_in_transit(m.id).is_err());
    }

    #[test]
    fn costs_and_transport_do_not_touch_stock() {
        let p = pipeline();
        let m = p.create(MovementType::In, None, Some(NORTH), None, None);
        let s = p
            .add_segment(m.id, SegmentDraft::new(WIDGET, dec!(2), "pcs"))
            .unwrap();
        p.add_cost(m.id, s.id, CostType::Fuel, dec!(40.25), None)
            .unwrap();
        p.add_cost(m.id, s.id, CostType::DriverFee, dec!(60), Some("night shift".into()))
            .unwrap();
        p.set_transport(
            m.id,
            s.id,
            TransportInfo {
                mode: Some("truck".into()),
                carrier: Some("Acme Freight".into()),
                ..TransportInfo::default()
            },
        )
        .unwrap();

        let movement = p.get(m.id).unwrap();
        assert_eq!(movement.total_cost(), dec!(100.25));
        assert_eq!(movement.segments[0].transport.mode.as_deref(), Some("truck"));
        assert!(p.engine().stock().is_empty());
        assert_eq!(
            p.add_cost(m.id, SegmentId(999), CostType::Other, dec!(1), None),
            Err(InventoryError::NotFound("segment"))
        );
    }

    #[test]
    fn unknown_movement() {
        let p = pipeline();
        assert_eq!(
            p.process(MovementId(42)),
            Err(InventoryError::NotFound("movement"))
        );
    }
}
