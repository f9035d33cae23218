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


//! # Table Materializer
//!
//! Applies a plan's structural changes: CREATE TABLE, column drops and
//! additions, and the rebuild-and-swap used to widen varchar columns.
//! Every failure comes back as a structural error for the table.

use log::{debug, info};

use crate::domain::entities::{ColumnDefinition, ColumnWidening, SqlType, TableDefinition, TableSyncPlan};
use crate::domain::errors::{Result, SyncError};
use crate::domain::mapping::sql_type_from_catalog;
use crate::domain::statements::{Statement, TableRef};
use crate::ports::warehouse_port::WarehouseSession;

/// Suffix of the shadow table built during a widening rebuild.
pub const WIDEN_SUFFIX: &str = "__widen";

pub struct TableMaterializer<'a> {
    schema: &'a str,
}

impl<'a> TableMaterializer<'a> {
    pub fn new(schema: &'a str) -> Self {
        Self { schema }
    }

    fn table(&self, name: &str) -> TableRef {
        TableRef::new(self.schema, name)
    }

    pub fn create(&self, session: &mut dyn WarehouseSession, definition: &TableDefinition) -> Result<()> {
        let statement = Statement::CreateTable {
            table: self.table(&definition.name),
            columns: definition.columns.clone(),
            composite_key: definition.composite_key.clone(),
        };
        info!("Creating {}.{}", self.schema, definition.name);
        session
            .execute(&statement)
            .map(|_| ())
            .map_err(|e| SyncError::structural(&definition.name, e))
    }

    /// Drops, then widens, then adds.
    pub fn verify(&self, session: &mut dyn WarehouseSession, plan: &TableSyncPlan) -> Result<()> {
        if plan.is_schema_current() {
            debug!("{} is up to date", plan.table);
            return Ok(());
        }
        self.apply_changes(session, plan)
            .map_err(|e| SyncError::structural(&plan.table, e))
    }

    fn apply_changes(&self, session: &mut dyn WarehouseSession, plan: &TableSyncPlan) -> Result<()> {
        let table = self.table(&plan.table);

        if !plan.columns_to_drop.is_empty() {
            info!("Dropping {} column(s) from {}", plan.columns_to_drop.len(), plan.table);
            let drops: Vec<Statement> = plan
                .columns_to_drop
                .iter()
                .map(|c| Statement::DropColumn {
                    table: table.clone(),
                    column: c.clone(),
                })
                .collect();
            session.execute_batch(&drops)?;
        }

        if !plan.columns_to_widen.is_empty() {
            self.rebuild(session, plan)?;
        }

        if !plan.columns_to_add.is_empty() {
            info!("Adding {} column(s) to {}", plan.columns_to_add.len(), plan.table);
            let adds: Vec<Statement> = plan
                .columns_to_add
                .iter()
                .map(|c| Statement::AddColumn {
                    table: table.clone(),
                    column: c.clone(),
                })
                .collect();
            session.execute_batch(&adds)?;
        }
        Ok(())
    }

    /// Rebuilds the table with wider columns: shadow, copy, drop, rename.
    fn rebuild(&self, session: &mut dyn WarehouseSession, plan: &TableSyncPlan) -> Result<()> {
        let original = self.table(&plan.table);
        let shadow_name = format!("{}{}", plan.table, WIDEN_SUFFIX);
        let shadow = self.table(&shadow_name);

        let current = session.table_columns(self.schema, &plan.table)?;
        let columns = widened_columns(&current, &plan.columns_to_widen, plan.definition.as_ref());
        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let composite_key = plan
            .definition
            .as_ref()
            .and_then(|d| d.composite_key.clone())
            .filter(|keys| keys.iter().all(|k| names.iter().any(|n| n.eq_ignore_ascii_case(k))));

        info!(
            "Widening {} column(s) of {} via rebuild",
            plan.columns_to_widen.len(),
            plan.table
        );
        session.execute(&Statement::DropTable {
            table: shadow.clone(),
            if_exists: true,
            cascade: false,
        })?;
        session.execute(&Statement::CreateTable {
            table: shadow.clone(),
            columns,
            composite_key,
        })?;

        let before = session.count_rows(&original)?;
        session.execute(&Statement::InsertSelect {
            target: shadow.clone(),
            source: original.clone(),
            columns: names,
            distinct: false,
        })?;
        let copied = session.count_rows(&shadow)?;
        if copied != before {
            return Err(SyncError::WarehouseError(format!(
                "rebuild copied {} of {} rows",
                copied, before
            )));
        }

        // CASCADE removes foreign keys pointing at the table; put them back after the swap.
        let inbound = session.inbound_foreign_keys(self.schema, &plan.table)?;
        session.execute(&Statement::DropTable {
            table: original.clone(),
            if_exists: false,
            cascade: true,
        })?;
        session.execute(&Statement::RenameTable {
            table: shadow,
            new_name: plan.table.clone(),
        })?;
        for fk in inbound {
            debug!("Restoring {} on {}", fk.name, fk.table);
            session.execute(&Statement::AddForeignKey {
                table: self.table(&fk.table),
                constraint: fk.name,
                column: fk.column,
                referenced: original.clone(),
            })?;
        }
        Ok(())
    }

    /// Drops a table if present. Used for retired extracts.
    pub fn drop_table(&self, session: &mut dyn WarehouseSession, table: &str) -> Result<()> {
        info!("Dropping retired table {}.{}", self.schema, table);
        session
            .execute(&Statement::DropTable {
                table: self.table(table),
                if_exists: true,
                cascade: true,
            })
            .map(|_| ())
            .map_err(|e| SyncError::structural(table, e))
    }
}

/// Current columns in ordinal order with the widened widths applied and key
/// flags taken from the desired layout.
fn widened_columns(
    current: &[crate::domain::entities::CatalogColumn],
    widen: &[ColumnWidening],
    definition: Option<&TableDefinition>,
) -> Vec<ColumnDefinition> {
    let composite = definition.map(|d| d.composite_key.is_some()).unwrap_or(false);
    current
        .iter()
        .map(|c| {
            let sql_type = match widen.iter().find(|w| w.column.eq_ignore_ascii_case(&c.name)) {
                Some(w) => SqlType::Varchar(w.to),
                None => sql_type_from_catalog(&c.data_type, c.char_length),
            };
            let is_primary_key = !composite
                && definition
                    .and_then(|d| d.column(&c.name))
                    .map(|d| d.is_primary_key)
                    .unwrap_or(false);
            ColumnDefinition {
                name: c.name.clone(),
                sql_type,
                is_primary_key,
            }
        })
        .collect()
}
