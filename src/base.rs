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

//! Core identifier types for products, locations, actors, and ledger records.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Catalog product identifier.
    ProductId(u32)
);
id_type!(
    /// Warehouse identifier supplied by the location collaborator.
    WarehouseId(u32)
);
id_type!(
    /// Section identifier; a section belongs to exactly one warehouse.
    SectionId(u32)
);
id_type!(
    /// Shelf identifier; a shelf belongs to exactly one section.
    ShelfId(u32)
);
id_type!(
    /// Opaque reference to whoever performed an action.
    ///
    /// The engine records it on transactions, ledger entries and approvals but
    /// never inspects it.
    ActorId(u32)
);
id_type!(
    /// Unique identifier for an inventory transaction.
    ///
    /// Allocated by the [`TransactionLog`](crate::TransactionLog); never reused.
    TransactionId(u64)
);
id_type!(
    /// Unique identifier for a ledger entry.
    LedgerEntryId(u64)
);
id_type!(
    /// Unique identifier for a movement.
    MovementId(u64)
);
id_type!(
    /// Unique identifier for a movement segment.
    SegmentId(u64)
);
id_type!(
    /// Unique identifier for a borrow record.
    BorrowId(u64)
);

/// A physical place stock can live: a warehouse, optionally narrowed down to a
/// section and a shelf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct Location {
    pub warehouse: WarehouseId,
    pub section: Option<SectionId>,
    pub shelf: Option<ShelfId>,
}

impl Location {
    /// Warehouse-level location with no section or shelf.
    pub fn warehouse(warehouse: WarehouseId) -> Self {
        Self {
            warehouse,
            section: None,
            shelf: None,
        }
    }

    pub fn with_section(mut self, section: SectionId) -> Self {
        self.section = Some(section);
        self
    }

    pub fn with_shelf(mut self, shelf: ShelfId) -> Self {
        self.shelf = Some(shelf);
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wh:{}", self.warehouse)?;
        if let Some(section) = self.section {
            write!(f, "/sec:{section}")?;
        }
        if let Some(shelf) = self.shelf {
            write!(f, "/shelf:{shelf}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_display_includes_only_present_parts() {
        let loc = Location::warehouse(WarehouseId(3));
        assert_eq!(loc.to_string(), "wh:3");

        let loc = loc.with_section(SectionId(7)).with_shelf(ShelfId(2));
        assert_eq!(loc.to_string(), "wh:3/sec:7/shelf:2");
    }

    #[test]
    fn locations_order_by_warehouse_first() {
        let a = Location::warehouse(WarehouseId(1)).with_section(SectionId(9));
        let b = Location::warehouse(WarehouseId(2));
        assert!(a < b);
        assert!(Location::warehouse(WarehouseId(1)) < a);
    }
}
