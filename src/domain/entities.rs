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

//! # Domain Entities
//!
//! The nouns of a synchronization run: manifest rows, column descriptors,
//! warehouse column definitions, per-table plans and the final report.
//!
//! Everything here is plain data. `serde` is derived where a value is read
//! from a descriptor file or written into the run report.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::errors::SyncError;

/// Operation kind of one manifest artifact.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Updates,
    Deletes,
}

impl FromStr for OperationKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "updates" => Ok(OperationKind::Updates),
            "deletes" => Ok(OperationKind::Deletes),
            other => Err(SyncError::DescriptorError(format!(
                "Unknown manifest operation type '{}'",
                other
            ))),
        }
    }
}

/// Whether the extract re-establishes everything or only carries deltas.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractKind {
    #[default]
    Full,
    Incremental,
}

impl FromStr for ExtractKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(ExtractKind::Full),
            "incremental" => Ok(ExtractKind::Incremental),
            other => Err(SyncError::ConfigError(format!(
                "extract_kind must be 'full' or 'incremental', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ExtractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractKind::Full => write!(f, "full"),
            ExtractKind::Incremental => write!(f, "incremental"),
        }
    }
}

/// The load path picked once per run and handed to the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStrategy {
    /// Truncate and bulk-copy straight into the target.
    FullLoad,
    /// Stage, remove matching natural keys, insert distinct staged rows.
    IncrementalMergeLoad,
}

impl From<ExtractKind> for LoadStrategy {
    fn from(kind: ExtractKind) -> Self {
        match kind {
            ExtractKind::Full => LoadStrategy::FullLoad,
            ExtractKind::Incremental => LoadStrategy::IncrementalMergeLoad,
        }
    }
}

/// A file in object storage, addressed by bucket and key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// The `s3://bucket/key` form handed to COPY.
    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key.trim_start_matches('/'))
    }
}

/// Joins a directory key and a relative path with one `/`.
pub fn join_key(dir: &str, relative: &str) -> String {
    let dir = dir.trim_end_matches('/');
    let relative = relative.trim_start_matches('/');
    if dir.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", dir, relative)
    }
}

/// Where the descriptor files of one extract live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorLocations {
    pub manifest: ObjectLocation,
    pub metadata: ObjectLocation,
    pub metadata_deletes: Option<ObjectLocation>,
}

/// One row of the extract manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    /// Qualified extract name, e.g. "Object.account__v".
    pub extract: String,
    #[serde(rename = "type")]
    pub operation: OperationKind,
    pub records: u64,
    /// Staged file path, relative to the extract directory.
    pub file: String,
}

/// One declared column in the metadata catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub extract: String,
    pub column_name: String,
    pub declared_type: String,
    /// `None` when blank or not a number.
    pub declared_length: Option<u32>,
    pub related_extract: Option<String>,
}

/// Warehouse column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlType {
    Varchar(u32),
    TimestampTz,
    Boolean,
    Numeric,
    Date,
    /// A catalog type this engine never creates itself, kept verbatim so a
    /// rebuild can reproduce it.
    Other(String),
}

impl SqlType {
    pub fn width(&self) -> Option<u32> {
        match self {
            SqlType::Varchar(w) => Some(*w),
            _ => None,
        }
    }
}

/// Warehouse-native column layout built by the mapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    /// Normalized (lower-cased, digit-prefixed) column name.
    pub name: String,
    pub sql_type: SqlType,
    pub is_primary_key: bool,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            is_primary_key: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    pub fn width(&self) -> Option<u32> {
        self.sql_type.width()
    }
}

/// Full column layout of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    /// Table-level primary key, used instead of column-level keys.
    pub composite_key: Option<Vec<String>>,
}

impl TableDefinition {
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// A column as the warehouse catalog currently reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogColumn {
    pub name: String,
    pub data_type: String,
    pub char_length: Option<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanAction {
    Create,
    Verify,
    Skip,
    Drop,
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanAction::Create => write!(f, "CREATE"),
            PlanAction::Verify => write!(f, "VERIFY"),
            PlanAction::Skip => write!(f, "SKIP"),
            PlanAction::Drop => write!(f, "DROP"),
        }
    }
}

/// One column whose capacity must grow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnWidening {
    pub column: String,
    pub from: u32,
    pub to: u32,
}

/// The decided work for one table in one run.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSyncPlan {
    pub extract: String,
    pub table: String,
    pub action: PlanAction,
    /// Desired layout; `None` when the catalog does not describe the table.
    pub definition: Option<TableDefinition>,
    pub columns_to_add: Vec<ColumnDefinition>,
    pub columns_to_drop: Vec<String>,
    pub columns_to_widen: Vec<ColumnWidening>,
    /// `updates` artifacts with records.
    pub loads: Vec<ManifestRecord>,
    /// `deletes` artifacts with records.
    pub deletes: Vec<ManifestRecord>,
}

impl TableSyncPlan {
    pub fn new(extract: &str, table: &str, action: PlanAction) -> Self {
        Self {
            extract: extract.to_string(),
            table: table.to_string(),
            action,
            definition: None,
            columns_to_add: Vec::new(),
            columns_to_drop: Vec::new(),
            columns_to_widen: Vec::new(),
            loads: Vec::new(),
            deletes: Vec::new(),
        }
    }

    pub fn is_load_pending(&self) -> bool {
        !self.loads.is_empty()
    }

    pub fn is_delete_pending(&self) -> bool {
        !self.deletes.is_empty()
    }

    /// True when verify has nothing to change.
    pub fn is_schema_current(&self) -> bool {
        self.columns_to_add.is_empty()
            && self.columns_to_drop.is_empty()
            && self.columns_to_widen.is_empty()
    }
}

/// One inferred `column -> referenced_table(id)` relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyLink {
    pub table: String,
    pub column: String,
    pub referenced_table: String,
}

impl ForeignKeyLink {
    /// Deterministic so a re-run can detect the constraint.
    pub fn constraint_name(&self) -> String {
        format!("fk_constraint_{}_{}", self.table, self.column)
    }
}

/// A foreign key as it exists in the warehouse catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyConstraint {
    pub name: String,
    /// Referencing table and column.
    pub table: String,
    pub column: String,
    pub referenced_table: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableStatus {
    Success,
    Failed,
}

/// Outcome of one table in the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableResult {
    pub table: String,
    /// `None` when planning itself failed.
    pub action: Option<PlanAction>,
    pub status: TableStatus,
    pub rows_loaded: u64,
    pub rows_deleted: u64,
    /// Every failure seen for this table, in phase order.
    pub errors: Vec<String>,
}

impl TableResult {
    pub fn new(table: &str, action: Option<PlanAction>) -> Self {
        Self {
            table: table.to_string(),
            action,
            status: TableStatus::Success,
            rows_loaded: 0,
            rows_deleted: 0,
            errors: Vec::new(),
        }
    }

    pub fn record_failure(&mut self, error: &SyncError) {
        self.status = TableStatus::Failed;
        self.errors.push(error.to_string());
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Success,
    PartialFailure,
    Failed,
}

/// Everything a caller needs to decide whether to retry the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub schema: String,
    pub extract_kind: ExtractKind,
    pub status: RunStatus,
    pub started_at: String,
    pub finished_at: String,
    pub tables: Vec<TableResult>,
    /// Set when the run aborted before fan-out.
    pub fatal_error: Option<String>,
}

impl RunReport {
    /// Report for a run that aborted before any table was touched.
    pub fn fatal(schema: &str, extract_kind: ExtractKind, started_at: String, error: &SyncError) -> Self {
        Self {
            schema: schema.to_string(),
            extract_kind,
            status: RunStatus::Failed,
            finished_at: chrono::Local::now().to_rfc3339(),
            started_at,
            tables: Vec::new(),
            fatal_error: Some(error.to_string()),
        }
    }

    /// Derives the overall status from the per-table outcomes.
    pub fn summarize(tables: &[TableResult], fatal: bool) -> RunStatus {
        let failed = tables
            .iter()
            .filter(|t| t.status == TableStatus::Failed)
            .count();
        if fatal || (failed > 0 && failed == tables.len()) {
            RunStatus::Failed
        } else if failed > 0 {
            RunStatus::PartialFailure
        } else {
            RunStatus::Success
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &TableResult> {
        self.tables
            .iter()
            .filter(|t| t.status == TableStatus::Failed)
    }
}
