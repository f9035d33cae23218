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


//! # Schema Planner
//!
//! Turns one grouped manifest entry into a `TableSyncPlan` by comparing it
//! with the warehouse catalog. Planning only reads; nothing is mutated.

use log::debug;

use crate::domain::descriptors::{DeleteCatalog, DescriptorCatalog};
use crate::domain::entities::{ExtractKind, PlanAction, TableDefinition, TableSyncPlan};
use crate::domain::errors::{Result, SyncError};
use crate::domain::mapping::{build_table_definition, metadata_table_descriptors};
use crate::domain::naming::METADATA_TABLE;
use crate::domain::planning::{decide_action, diff_columns, TableManifest};
use crate::ports::warehouse_port::WarehouseSession;

pub struct SchemaPlanner<'a> {
    schema: &'a str,
    catalog: &'a DescriptorCatalog,
    deletes: &'a DeleteCatalog,
    extract_kind: ExtractKind,
}

impl<'a> SchemaPlanner<'a> {
    pub fn new(
        schema: &'a str,
        catalog: &'a DescriptorCatalog,
        deletes: &'a DeleteCatalog,
        extract_kind: ExtractKind,
    ) -> Self {
        Self {
            schema,
            catalog,
            deletes,
            extract_kind,
        }
    }

    /// Desired layout of a table, or `None` when nothing describes it.
    pub fn definition_for(&self, extract: &str, table: &str) -> Result<Option<TableDefinition>> {
        let descriptors = if table == METADATA_TABLE {
            metadata_table_descriptors(&self.catalog.header)
        } else {
            self.catalog.columns_for(extract).to_vec()
        };
        if descriptors.is_empty() {
            return Ok(None);
        }
        build_table_definition(table, &descriptors).map(Some)
    }

    pub fn plan(&self, session: &mut dyn WarehouseSession, group: &TableManifest) -> Result<TableSyncPlan> {
        let exists = session.table_exists(self.schema, &group.table)?;
        let mut action = decide_action(exists, group.total_records);

        // On full runs the metadata table is always brought in line.
        if exists && group.table == METADATA_TABLE && self.extract_kind == ExtractKind::Full {
            action = PlanAction::Verify;
        }

        // A delete against an absent table is a no-op, so there is nothing to create.
        if !exists && !group.has_updates && group.table != METADATA_TABLE {
            debug!("{} does not exist and only has deletes, skipping", group.table);
            action = PlanAction::Skip;
        }

        let definition = self.definition_for(&group.extract, &group.table)?;
        if definition.is_none() && action == PlanAction::Create {
            return Err(SyncError::structural(&group.table, "no column descriptors"));
        }

        let mut plan = TableSyncPlan::new(&group.extract, &group.table, action);
        plan.loads = group.loads.clone();
        plan.deletes = group.deletes.clone();

        if action == PlanAction::Verify {
            let current = session.table_columns(self.schema, &group.table)?;
            let drops = self.deletes.dropped_columns(&group.extract);
            let desired = definition.clone().unwrap_or_else(|| TableDefinition {
                name: group.table.clone(),
                columns: Vec::new(),
                composite_key: None,
            });
            let diff = diff_columns(&current, &desired, drops);
            plan.columns_to_add = diff.add;
            plan.columns_to_drop = diff.drop;
            plan.columns_to_widen = diff.widen;
        }
        plan.definition = definition;

        debug!(
            "Planned {}: {} (+{} -{} ~{}, {} loads, {} deletes)",
            plan.table,
            plan.action,
            plan.columns_to_add.len(),
            plan.columns_to_drop.len(),
            plan.columns_to_widen.len(),
            plan.loads.len(),
            plan.deletes.len()
        );
        Ok(plan)
    }
}
