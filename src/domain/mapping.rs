// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Type Mapping Logic
//!
//! Direct Data declares columns loosely: a type word and an optional length.
//! This module turns a declaration into a Redshift `ColumnDefinition`.
//!
//! Length policy:
//! 1. Blank, zero or unparseable lengths get the maximum width.
//! 2. A length of exactly 2 (icon-code fields) also gets the maximum width.
//! 3. Anything else is doubled for headroom and capped at the maximum.

use std::collections::HashSet;

use crate::domain::entities::{ColumnDefinition, ColumnDescriptor, SqlType, TableDefinition};
use crate::domain::errors::{Result, SyncError};
use crate::domain::naming::{self, METADATA_EXTRACT, PICKLIST_TABLE};

/// Largest VARCHAR Redshift accepts.
pub const MAX_VARCHAR_WIDTH: u32 = 64000;

/// Declared width of icon-code fields, whose real values outgrow doubling.
pub const ICON_FIELD_WIDTH: u32 = 2;

/// Declared length of every column of the implicit metadata table.
pub const METADATA_COLUMN_LENGTH: u32 = 1000;

/// Parses a catalog length cell. Accepts "255" and "255.0".
pub fn parse_declared_length(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(n) = trimmed.parse::<u32>() {
        return Some(n);
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() && f >= 0.0 && f <= u32::MAX as f64 => Some(f as u32),
        _ => None,
    }
}

/// Width a declared length maps to.
pub fn effective_width(declared: Option<u32>) -> u32 {
    match declared {
        None | Some(0) | Some(ICON_FIELD_WIDTH) => MAX_VARCHAR_WIDTH,
        Some(len) => len.saturating_mul(2).min(MAX_VARCHAR_WIDTH),
    }
}

/// Maps one descriptor. Primary-key flags here are column-level only.
pub fn map_column(descriptor: &ColumnDescriptor) -> ColumnDefinition {
    let name = naming::column_name(&descriptor.column_name);
    let declared_type = descriptor.declared_type.trim().to_lowercase();
    let width = effective_width(descriptor.declared_length);
    let is_id = name == "id";

    match declared_type.as_str() {
        "id" => ColumnDefinition::new(name, SqlType::Varchar(width)).primary_key(),
        "string" if is_id => ColumnDefinition::new(name, SqlType::Varchar(width)).primary_key(),
        "datetime" | "timestamp with time zone" => ColumnDefinition::new(name, SqlType::TimestampTz),
        "boolean" => ColumnDefinition::new(name, SqlType::Boolean),
        "number" | "numeric" => {
            let col = ColumnDefinition::new(name, SqlType::Numeric);
            if is_id {
                col.primary_key()
            } else {
                col
            }
        }
        "date" => ColumnDefinition::new(name, SqlType::Date),
        _ => ColumnDefinition::new(name, SqlType::Varchar(width)),
    }
}

/// Builds the full column set of `table` in catalog order.
///
/// Repeated column names keep their first declaration. The picklist table
/// gets a composite key over its natural key instead of any column-level key.
pub fn build_table_definition(
    table: &str,
    descriptors: &[ColumnDescriptor],
) -> Result<TableDefinition> {
    if descriptors.is_empty() {
        return Err(SyncError::DescriptorError(format!(
            "No column descriptors found for table '{}'",
            table
        )));
    }

    let mut seen = HashSet::new();
    let mut columns: Vec<ColumnDefinition> = descriptors
        .iter()
        .map(map_column)
        .filter(|c| seen.insert(c.name.clone()))
        .collect();

    let composite_key = if table == PICKLIST_TABLE {
        for c in columns.iter_mut() {
            c.is_primary_key = false;
        }
        Some(
            naming::natural_key(table)
                .iter()
                .map(|k| k.to_string())
                .collect(),
        )
    } else {
        None
    };

    // Redshift allows one primary key per table.
    let mut has_key = false;
    for c in columns.iter_mut() {
        if c.is_primary_key {
            if has_key {
                c.is_primary_key = false;
            }
            has_key = true;
        }
    }

    Ok(TableDefinition {
        name: table.to_string(),
        columns,
        composite_key,
    })
}

/// Descriptors of the implicit metadata table, one string column per
/// catalog header cell.
pub fn metadata_table_descriptors(header: &[String]) -> Vec<ColumnDescriptor> {
    header
        .iter()
        .filter(|h| !h.trim().is_empty())
        .map(|h| ColumnDescriptor {
            extract: METADATA_EXTRACT.to_string(),
            column_name: h.trim().to_string(),
            declared_type: "string".to_string(),
            declared_length: Some(METADATA_COLUMN_LENGTH),
            related_extract: None,
        })
        .collect()
}

/// Reconstructs a type from `information_schema.columns`.
pub fn sql_type_from_catalog(data_type: &str, char_length: Option<u32>) -> SqlType {
    let normalized = data_type.trim().to_lowercase();
    match normalized.as_str() {
        "character varying" | "varchar" => {
            SqlType::Varchar(char_length.unwrap_or(MAX_VARCHAR_WIDTH))
        }
        "timestamp with time zone" | "timestamptz" => SqlType::TimestampTz,
        "boolean" => SqlType::Boolean,
        "numeric" => SqlType::Numeric,
        "date" => SqlType::Date,
        "character" | "char" => match char_length {
            Some(len) => SqlType::Other(format!("CHAR({})", len)),
            None => SqlType::Other("CHAR".to_string()),
        },
        _ => SqlType::Other(normalized.to_uppercase()),
    }
}
