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

//! Product catalog collaborator.
//!
//! The engine only needs two things from the catalog: a product's base unit and
//! the registered conversion factors between units. Catalog CRUD lives elsewhere;
//! [`InMemoryCatalog`] is a minimal implementation for tests and tooling.

use crate::InventoryError;
use crate::base::ProductId;
use dashmap::DashMap;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Number of decimal places carried by every stock quantity.
pub const QUANTITY_SCALE: u32 = 4;

/// Largest magnitude a quantity may have: 18 significant digits, 4 of them decimal.
pub const MAX_QUANTITY: Decimal = dec!(99999999999999.9999);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Unit every quantity record and ledger entry for this product is kept in.
    pub base_unit: String,
}

impl Product {
    pub fn new(id: ProductId, name: impl Into<String>, base_unit: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            base_unit: base_unit.into(),
        }
    }
}

/// Read-only catalog lookups used by the engine.
pub trait Catalog: Send + Sync {
    fn product(&self, id: ProductId) -> Option<Product>;

    /// Factor such that `quantity_in_from_unit * factor = quantity_in_to_unit`.
    fn conversion(&self, product: ProductId, from_unit: &str, to_unit: &str) -> Option<Decimal>;
}

/// Converts `quantity` of `unit` into the product's base unit.
///
/// Quantities already in the base unit pass through unchanged. Otherwise a direct
/// conversion must be registered; there is no implicit 1:1 fallback.
pub fn to_base_unit(
    catalog: &dyn Catalog,
    product: &Product,
    quantity: Decimal,
    unit: &str,
) -> Result<Decimal, InventoryError> {
    if unit.is_empty() || unit == product.base_unit {
        return Ok(quantity);
    }
    let factor = catalog
        .conversion(product.id, unit, &product.base_unit)
        .ok_or_else(|| InventoryError::MissingUnitConversion {
            product: product.id,
            from_unit: unit.to_string(),
            to_unit: product.base_unit.clone(),
        })?;
    quantity
        .checked_mul(factor)
        .map(|converted| converted.round_dp(QUANTITY_SCALE))
        .filter(|converted| converted.abs() <= MAX_QUANTITY)
        .ok_or_else(|| {
            InventoryError::validation(format!(
                "{quantity} {unit} exceeds {MAX_QUANTITY} {} once converted",
                product.base_unit
            ))
        })
}

/// Thread-safe in-memory catalog.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: DashMap<ProductId, Product>,
    conversions: DashMap<(ProductId, String, String), Decimal>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_product(&self, product: Product) {
        self.products.insert(product.id, product);
    }

    /// Registers `1 from_unit = factor to_unit` for the product.
    pub fn add_conversion(
        &self,
        product: ProductId,
        from_unit: impl Into<String>,
        to_unit: impl Into<String>,
        factor: Decimal,
    ) -> Result<(), InventoryError> {
        if factor <= Decimal::ZERO {
            return Err(InventoryError::validation("conversion factor must be positive"));
        }
        self.conversions
            .insert((product, from_unit.into(), to_unit.into()), factor);
        Ok(())
    }
}

impl Catalog for InMemoryCatalog {
    fn product(&self, id: ProductId) -> Option<Product> {
        self.products.get(&id).map(|p| p.clone())
    }

    fn conversion(&self, product: ProductId, from_unit: &str, to_unit: &str) -> Option<Decimal> {
        self.conversions
            .get(&(product, from_unit.to_string(), to_unit.to_string()))
            .map(|factor| *factor)
    }
}
