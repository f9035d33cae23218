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

//! # Planning Rules
//!
//! Pure decisions made before and during the planning fan-out. Nothing here
//! touches the warehouse; the application layer feeds in catalog facts and
//! gets back plans.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::descriptors::DescriptorCatalog;
use crate::domain::entities::{
    CatalogColumn, ColumnDefinition, ColumnWidening, ExtractKind, ManifestRecord, OperationKind,
    PlanAction, SqlType, TableDefinition,
};
use crate::domain::errors::{Result, SyncError};
use crate::domain::naming::{self, METADATA_TABLE};

/// All manifest artifacts of one table that survived filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct TableManifest {
    pub extract: String,
    pub table: String,
    pub total_records: u64,
    /// Set when any `updates` row names the table, zero-record ones included.
    pub has_updates: bool,
    pub loads: Vec<ManifestRecord>,
    pub deletes: Vec<ManifestRecord>,
}

/// Groups manifest rows by warehouse table, in first-seen order.
///
/// Zero-record rows only take part in full extracts. Retired tables get no work.
pub fn group_manifest(
    records: &[ManifestRecord],
    kind: ExtractKind,
    retired: &BTreeSet<String>,
) -> Vec<TableManifest> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: BTreeMap<String, TableManifest> = BTreeMap::new();

    for record in records {
        if kind == ExtractKind::Incremental && record.records == 0 {
            continue;
        }
        let table = naming::table_name_from_extract(&record.extract);
        if retired.contains(&table) {
            continue;
        }
        let group = groups.entry(table.clone()).or_insert_with(|| {
            order.push(table.clone());
            TableManifest {
                extract: record.extract.clone(),
                table: table.clone(),
                total_records: 0,
                has_updates: false,
                loads: Vec::new(),
                deletes: Vec::new(),
            }
        });
        group.total_records += record.records;
        if record.operation == OperationKind::Updates {
            group.has_updates = true;
        }
        if record.records == 0 {
            continue;
        }
        match record.operation {
            OperationKind::Updates => group.loads.push(record.clone()),
            OperationKind::Deletes => group.deletes.push(record.clone()),
        }
    }

    order
        .into_iter()
        .filter_map(|t| groups.remove(&t))
        .collect()
}

/// Every table named by an `updates` row must be declared in the catalog.
/// Deletes-only tables are exempt. The metadata table is described by the
/// catalog's own header instead.
pub fn validate_coverage(groups: &[TableManifest], catalog: &DescriptorCatalog) -> Result<()> {
    let missing: Vec<&str> = groups
        .iter()
        .filter(|g| g.table != METADATA_TABLE)
        .filter(|g| g.has_updates && !catalog.contains(&g.extract))
        .map(|g| g.extract.as_str())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(SyncError::DescriptorError(format!(
            "Manifest references extracts with no column descriptors: {}",
            missing.join(", ")
        )))
    }
}

/// Action for a table given whether it exists.
pub fn decide_action(exists: bool, total_records: u64) -> PlanAction {
    match (exists, total_records) {
        (false, _) => PlanAction::Create,
        (true, 0) => PlanAction::Skip,
        (true, _) => PlanAction::Verify,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDiff {
    pub add: Vec<ColumnDefinition>,
    pub drop: Vec<String>,
    pub widen: Vec<ColumnWidening>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.drop.is_empty() && self.widen.is_empty()
    }
}

/// Diffs the live column set against the desired one.
///
/// Names compare case-insensitively. Drops only name columns that exist.
/// Additions never carry a key and never resurrect a dropped column.
/// Widening only applies to varchar columns and only grows.
pub fn diff_columns(
    current: &[CatalogColumn],
    desired: &TableDefinition,
    drops: &[String],
) -> SchemaDiff {
    let find_current = |name: &str| current.iter().find(|c| c.name.eq_ignore_ascii_case(name));
    let is_dropped = |name: &str| drops.iter().any(|d| d.eq_ignore_ascii_case(name));

    let mut diff = SchemaDiff::default();

    for name in drops {
        if let Some(c) = find_current(name) {
            if !diff.drop.iter().any(|d| d.eq_ignore_ascii_case(&c.name)) {
                diff.drop.push(c.name.clone());
            }
        }
    }

    for column in &desired.columns {
        if is_dropped(&column.name) {
            continue;
        }
        match find_current(&column.name) {
            None => {
                let mut added = column.clone();
                added.is_primary_key = false;
                diff.add.push(added);
            }
            Some(live) => {
                if let (SqlType::Varchar(to), Some(from)) = (&column.sql_type, live.char_length) {
                    let live_is_varchar = matches!(
                        live.data_type.to_lowercase().as_str(),
                        "character varying" | "varchar"
                    );
                    if live_is_varchar && *to > from {
                        diff.widen.push(ColumnWidening {
                            column: live.name.clone(),
                            from,
                            to: *to,
                        });
                    }
                }
            }
        }
    }

    diff
}
