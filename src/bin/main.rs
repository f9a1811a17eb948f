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

use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use stock_ledger_rs::{
    Engine, EngineConfig, InMemoryCatalog, Location, Product, ProductId, QUANTITY_SCALE, SectionId,
    ShelfId, StockPolicy, TransactionDraft, TransactionType, WarehouseId,
};
use tracing_subscriber::EnvFilter;

/// Stock Ledger - Replay an inventory transaction journal
///
/// Reads IN/OUT/TRANSFER rows from a CSV journal, applies them in order and
/// writes the resulting quantity records to stdout.
#[derive(Parser, Debug)]
#[command(name = "stock-ledger-rs")]
#[command(about = "Replays an inventory journal CSV and prints stock levels", long_about = None)]
struct Args {
    /// Path to CSV journal
    ///
    /// Expected format: type,product,quantity,unit,source_warehouse,source_section,
    /// source_shelf,destination_warehouse,destination_section,destination_shelf,reference
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// CSV of products: id,name,base_unit
    ///
    /// Without it, each product is registered on first sight with that row's
    /// unit as its base unit.
    #[arg(long, value_name = "FILE")]
    products: Option<PathBuf>,

    /// CSV of unit conversions: product,from_unit,to_unit,factor
    #[arg(long, value_name = "FILE")]
    conversions: Option<PathBuf>,

    /// Give up on a stock lock after this many milliseconds
    #[arg(long, value_name = "MS")]
    lock_timeout_ms: Option<u64>,

    /// Let OUT and TRANSFER drive quantities below zero
    #[arg(long)]
    allow_negative: bool,
}

impl Args {
    fn config(&self) -> EngineConfig {
        let mut config = EngineConfig::default();
        if let Some(ms) = self.lock_timeout_ms {
            config = config.with_lock_timeout(Duration::from_millis(ms));
        }
        if self.allow_negative {
            config = config.with_stock_policy(StockPolicy::AllowNegative);
        }
        config
    }
}

/// Log filter used when `RUST_LOG` is unset or invalid.
const DEFAULT_LOG_FILTER: &str = "info";

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let catalog = Arc::new(InMemoryCatalog::new());
    if let Some(path) = &args.products {
        if let Err(e) = open(path).and_then(|f| load_products(&catalog, f)) {
            tracing::error!(path = %path.display(), error = %e, "failed to load products");
            process::exit(1);
        }
    }
    if let Some(path) = &args.conversions {
        if let Err(e) = open(path).and_then(|f| load_conversions(&catalog, f)) {
            tracing::error!(path = %path.display(), error = %e, "failed to load conversions");
            process::exit(1);
        }
    }

    let file = match open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            tracing::error!(path = %args.input.display(), error = %e, "failed to open journal");
            process::exit(1);
        }
    };

    let engine = match replay_journal(file, catalog, args.config(), args.products.is_none()) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!(error = %e, "failed to replay journal");
            process::exit(1);
        }
    };

    if let Err(e) = write_stock(&engine, std::io::stdout()) {
        tracing::error!(error = %e, "failed to write output");
        process::exit(1);
    }
}

fn open(path: &Path) -> Result<BufReader<File>, csv::Error> {
    Ok(BufReader::new(File::open(path)?))
}

fn reader<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader)
}

#[derive(Debug, Deserialize)]
struct ProductRow {
    id: u32,
    name: String,
    base_unit: String,
}

#[derive(Debug, Deserialize)]
struct ConversionRow {
    product: u32,
    from_unit: String,
    to_unit: String,
    factor: Decimal,
}

/// Loads `id,name,base_unit` rows into the catalog. Malformed rows are skipped.
fn load_products<R: Read>(catalog: &InMemoryCatalog, input: R) -> Result<(), csv::Error> {
    for result in reader(input).deserialize::<ProductRow>() {
        match result {
            Ok(row) => catalog.add_product(Product::new(ProductId(row.id), row.name, row.base_unit)),
            Err(e) => tracing::warn!(error = %e, "skipping malformed product row"),
        }
    }
    Ok(())
}

/// Loads `product,from_unit,to_unit,factor` rows. Malformed rows are skipped.
fn load_conversions<R: Read>(catalog: &InMemoryCatalog, input: R) -> Result<(), csv::Error> {
    for result in reader(input).deserialize::<ConversionRow>() {
        let outcome = result.map_err(|e| e.to_string()).and_then(|row| {
            catalog
                .add_conversion(ProductId(row.product), row.from_unit, row.to_unit, row.factor)
                .map_err(|e| e.to_string())
        });
        if let Err(e) = outcome {
            tracing::warn!(error = %e, "skipping conversion row");
        }
    }
    Ok(())
}

/// Raw journal row.
#[derive(Debug, Deserialize)]
struct JournalRow {
    #[serde(rename = "type")]
    tx_type: String,
    product: u32,
    #[serde(deserialize_with = "csv::invalid_option")]
    quantity: Option<Decimal>,
    #[serde(default)]
    unit: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    source_warehouse: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    source_section: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    source_shelf: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    destination_warehouse: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    destination_section: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    destination_shelf: Option<u32>,
    #[serde(default)]
    reference: Option<String>,
}

fn location(warehouse: Option<u32>, section: Option<u32>, shelf: Option<u32>) -> Option<Location> {
    let mut location = Location::warehouse(WarehouseId(warehouse?));
    if let Some(section) = section {
        location = location.with_section(SectionId(section));
    }
    if let Some(shelf) = shelf {
        location = location.with_shelf(ShelfId(shelf));
    }
    Some(location)
}

impl JournalRow {
    /// Converts the row into a draft.
    ///
    /// Returns `None` for an unknown type or a missing quantity or location.
    fn into_draft(self) -> Option<TransactionDraft> {
        let kind: TransactionType = self.tx_type.parse().ok()?;
        let product = ProductId(self.product);
        let quantity = self.quantity?;
        let source = location(self.source_warehouse, self.source_section, self.source_shelf);
        let destination = location(
            self.destination_warehouse,
            self.destination_section,
            self.destination_shelf,
        );

        let draft = match kind {
            TransactionType::In => {
                let mut draft = TransactionDraft::inbound(product, quantity, self.unit, destination?);
                if let Some(source) = source {
                    draft = draft.with_counterpart(source);
                }
                draft
            }
            TransactionType::Out => {
                let mut draft = TransactionDraft::outbound(product, quantity, self.unit, source?);
                if let Some(destination) = destination {
                    draft = draft.with_counterpart(destination);
                }
                draft
            }
            TransactionType::Transfer => {
                TransactionDraft::transfer(product, quantity, self.unit, source?, destination?)
            }
        };
        Some(match self.reference.filter(|r| !r.is_empty()) {
            Some(reference) => draft.with_reference(reference),
            None => draft,
        })
    }
}

/// Replays a journal against a fresh engine.
///
/// Rows are applied one at a time in file order. Malformed rows and rejected
/// transactions are logged and skipped. With `auto_register`, a product the
/// catalog does not know is added using the row's unit as its base unit.
///
/// # Errors
///
/// Returns a CSV error only if the reader itself fails.
pub fn replay_journal<R: Read>(
    input: R,
    catalog: Arc<InMemoryCatalog>,
    config: EngineConfig,
    auto_register: bool,
) -> Result<Engine, csv::Error> {
    let engine = Engine::with_config(catalog.clone(), config);

    for (line, result) in reader(input).deserialize::<JournalRow>().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(line = line + 2, error = %e, "skipping malformed row");
                continue;
            }
        };
        let Some(draft) = row.into_draft() else {
            tracing::warn!(line = line + 2, "skipping incomplete row");
            continue;
        };
        if auto_register && engine.product(draft.product).is_err() && !draft.unit.is_empty() {
            catalog.add_product(Product::new(
                draft.product,
                format!("product-{}", draft.product),
                draft.unit.clone(),
            ));
        }
        if let Err(e) = engine.submit(draft, None) {
            tracing::warn!(line = line + 2, error = %e, "skipping rejected transaction");
        }
    }

    Ok(engine)
}

/// Writes quantity records as CSV, ordered by product then location.
///
/// # CSV Format
///
/// Columns: `product, warehouse, section, shelf, quantity, unit`
///
/// ```csv
/// product,warehouse,section,shelf,quantity,unit
/// 1,1,,,20.0000,kg
/// 1,2,3,,4.0000,kg
/// ```
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_stock<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for mut snapshot in engine.stock().snapshots() {
        snapshot.quantity.rescale(QUANTITY_SCALE);
        wtr.serialize(&snapshot)?;
    }
    wtr.flush()?;
    Ok(())
}
