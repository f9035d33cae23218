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


//! # Warehouse Port
//!
//! The contract the application needs from the target warehouse.
//!
//! Work is done through a `WarehouseSession`: one live connection owned by
//! one worker for one unit of work. Temporary tables are visible only inside
//! the session that created them, so a lifecycle such as stage, copy, merge
//! must run on a single session from start to end.

use crate::domain::entities::{CatalogColumn, ForeignKeyConstraint};
use crate::domain::errors::Result;
use crate::domain::statements::{Statement, TableRef};

/// A single connection checked out for one unit of work.
///
/// Sessions are `Send` so a worker can own one, but they are never shared.
pub trait WarehouseSession: Send {
    fn schema_exists(&mut self, schema: &str) -> Result<bool>;

    fn table_exists(&mut self, schema: &str, table: &str) -> Result<bool>;

    /// Current columns of a table in ordinal order.
    fn table_columns(&mut self, schema: &str, table: &str) -> Result<Vec<CatalogColumn>>;

    fn constraint_exists(&mut self, schema: &str, table: &str, constraint: &str) -> Result<bool>;

    /// Foreign keys within `schema` that reference `table`.
    fn inbound_foreign_keys(&mut self, schema: &str, table: &str) -> Result<Vec<ForeignKeyConstraint>>;

    fn count_rows(&mut self, table: &TableRef) -> Result<u64>;

    /// Runs one statement and returns the affected row count.
    fn execute(&mut self, statement: &Statement) -> Result<u64>;

    /// Runs several statements in one round trip.
    fn execute_batch(&mut self, statements: &[Statement]) -> Result<()>;
}

/// `WarehousePort` hands out sessions. Implementations pool connections.
pub trait WarehousePort: Send + Sync {
    fn session(&self) -> Result<Box<dyn WarehouseSession + '_>>;
}
