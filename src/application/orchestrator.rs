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


//! The core application logic that orchestrates one synchronization run.
//!
//! The run is a fixed sequence of phases. Descriptor loading and validation
//! come first and abort the run on any error. Every later phase fans out over
//! tables on the rayon pool, one warehouse session per unit of work, and the
//! outcomes are merged in one place after the pool drains:
//!
//! 1. ensure the target schema
//! 2. drop retired tables
//! 3. metadata table (full runs), then planning in `chunk_size` batches
//! 4. create, then verify, then foreign keys
//! 5. load, then delete
//!
//! A structural failure blocks that table's later phases. Data failures are
//! only reported.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use log::{error, info, warn};
use rayon::prelude::*;

use crate::application::executor::LoadExecutor;
use crate::application::materializer::TableMaterializer;
use crate::application::planner::SchemaPlanner;
use crate::domain::descriptors::{DeleteCatalog, DescriptorCatalog};
use crate::domain::entities::{
    DescriptorLocations, ExtractKind, LoadStrategy, ObjectLocation, PlanAction, RunReport,
    TableResult, TableSyncPlan,
};
use crate::domain::errors::{Result, SyncError};
use crate::domain::foreign_keys::derive_links;
use crate::domain::naming::{self, METADATA_EXTRACT, METADATA_TABLE};
use crate::domain::planning::{group_manifest, validate_coverage, TableManifest};
use crate::domain::statements::{Statement, TableRef};
use crate::ports::descriptor_port::DescriptorPort;
use crate::ports::warehouse_port::{WarehousePort, WarehouseSession};

/// Inputs of one "synchronize and load" call.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub bucket: String,
    /// Extract directory inside the bucket; staged file paths are relative to it.
    pub source_directory: String,
    /// Explicit descriptor keys. Located under `source_directory` when absent.
    pub manifest_key: Option<String>,
    pub metadata_key: Option<String>,
    pub metadata_deletes_key: Option<String>,
    /// Target schema. Derived from `source_directory` when absent.
    pub schema: Option<String>,
    pub extract_kind: ExtractKind,
    pub chunk_size: usize,
    pub iam_role: String,
}

impl SyncRequest {
    pub fn schema_name(&self) -> String {
        self.schema
            .clone()
            .unwrap_or_else(|| naming::schema_name_for_source(&self.source_directory))
    }
}

/// Everything read from the descriptor files before the warehouse is touched.
struct RunInputs {
    catalog: DescriptorCatalog,
    deletes: DeleteCatalog,
    retired: BTreeSet<String>,
    metadata: Option<TableManifest>,
    groups: Vec<TableManifest>,
}

/// Orchestrates one run against the warehouse.
pub struct SyncOrchestrator {
    warehouse: Arc<dyn WarehousePort>,
    descriptors: Arc<dyn DescriptorPort>,
    request: SyncRequest,
    schema: String,
}

/// Phase outcomes, keyed by table.
#[derive(Default)]
struct Ledger {
    results: BTreeMap<String, TableResult>,
    blocked: BTreeSet<String>,
}

impl Ledger {
    fn entry(&mut self, table: &str, action: Option<PlanAction>) -> &mut TableResult {
        self.results
            .entry(table.to_string())
            .or_insert_with(|| TableResult::new(table, action))
    }

    fn fail(&mut self, table: &str, action: Option<PlanAction>, err: &SyncError) {
        error!("{} failed: {}", table, err);
        self.entry(table, action).record_failure(err);
    }

    fn block(&mut self, table: &str, action: Option<PlanAction>, err: &SyncError) {
        self.fail(table, action, err);
        self.blocked.insert(table.to_string());
    }

    fn is_blocked(&self, table: &str) -> bool {
        self.blocked.contains(table)
    }
}

fn as_structural(table: &str, err: SyncError) -> SyncError {
    match err {
        SyncError::StructuralError { .. } => err,
        other => SyncError::structural(table, other),
    }
}

fn as_data(table: &str, artifact: &str, err: SyncError) -> SyncError {
    match err {
        SyncError::DataError { .. } => err,
        other => SyncError::data(table, artifact, other),
    }
}

impl SyncOrchestrator {
    pub fn new(warehouse: Arc<dyn WarehousePort>, descriptors: Arc<dyn DescriptorPort>, request: SyncRequest) -> Self {
        let schema = request.schema_name();
        Self {
            warehouse,
            descriptors,
            request,
            schema,
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Runs every phase. `Err` means the run aborted before any table work.
    pub fn run(&self) -> Result<RunReport> {
        let start_time = Instant::now();
        let started_at = chrono::Local::now().to_rfc3339();
        info!(
            "Starting {} sync of {}/{} into schema {}",
            self.request.extract_kind, self.request.bucket, self.request.source_directory, self.schema
        );

        let inputs = self.load_inputs()?;
        self.ensure_schema()?;

        let mut ledger = Ledger::default();
        self.drop_retired(&inputs.retired, &mut ledger);

        let catalog = &inputs.catalog;
        let planner = SchemaPlanner::new(&self.schema, catalog, &inputs.deletes, self.request.extract_kind);
        let materializer = TableMaterializer::new(&self.schema);

        let mut plans: Vec<TableSyncPlan> = Vec::new();
        if let Some(metadata) = &inputs.metadata {
            if let Some(plan) = self.prepare_metadata(&planner, &materializer, metadata, &mut ledger) {
                plans.push(plan);
            }
        }
        let metadata_planned = plans.len();

        for chunk in inputs.groups.chunks(self.request.chunk_size.max(1)) {
            let planned: Vec<(String, Result<TableSyncPlan>)> = chunk
                .par_iter()
                .map(|group| {
                    let outcome = self
                        .warehouse
                        .session()
                        .and_then(|mut session| planner.plan(session.as_mut(), group));
                    (group.table.clone(), outcome)
                })
                .collect();
            for (table, outcome) in planned {
                match outcome {
                    Ok(plan) => {
                        ledger.entry(&table, Some(plan.action));
                        plans.push(plan);
                    }
                    Err(e) => ledger.block(&table, None, &as_structural(&table, e)),
                }
            }
        }
        info!("Planned {} tables", plans.len());

        let fresh = &plans[metadata_planned..];
        self.structural_phase(fresh, PlanAction::Create, &mut ledger, |session, plan| {
            match &plan.definition {
                Some(definition) => materializer.create(session, definition),
                None => Err(SyncError::structural(&plan.table, "no column definition")),
            }
        });
        self.structural_phase(fresh, PlanAction::Verify, &mut ledger, |session, plan| {
            materializer.verify(session, plan)
        });
        self.foreign_key_phase(fresh, catalog, &mut ledger);

        let executor = LoadExecutor::new(
            &self.schema,
            &self.request.bucket,
            &self.request.source_directory,
            &self.request.iam_role,
            self.descriptors.as_ref(),
        );
        self.load_phase(&plans, &executor, &mut ledger);
        self.delete_phase(&plans, &executor, &mut ledger);

        let tables: Vec<TableResult> = ledger.results.into_values().collect();
        let report = RunReport {
            schema: self.schema.clone(),
            extract_kind: self.request.extract_kind,
            status: RunReport::summarize(&tables, false),
            started_at,
            finished_at: chrono::Local::now().to_rfc3339(),
            tables,
            fatal_error: None,
        };
        info!(
            "Sync finished in {:.1}s: {:?}, {} tables, {} failed",
            start_time.elapsed().as_secs_f64(),
            report.status,
            report.tables.len(),
            report.failures().count()
        );
        Ok(report)
    }

    fn locations(&self) -> Result<DescriptorLocations> {
        let request = &self.request;
        match (&request.manifest_key, &request.metadata_key) {
            (Some(manifest), Some(metadata)) => Ok(DescriptorLocations {
                manifest: ObjectLocation::new(request.bucket.clone(), manifest.clone()),
                metadata: ObjectLocation::new(request.bucket.clone(), metadata.clone()),
                metadata_deletes: request
                    .metadata_deletes_key
                    .as_ref()
                    .map(|k| ObjectLocation::new(request.bucket.clone(), k.clone())),
            }),
            _ => {
                let mut located = self.descriptors.locate(&request.bucket, &request.source_directory)?;
                if let Some(k) = &request.manifest_key {
                    located.manifest = ObjectLocation::new(request.bucket.clone(), k.clone());
                }
                if let Some(k) = &request.metadata_key {
                    located.metadata = ObjectLocation::new(request.bucket.clone(), k.clone());
                }
                if let Some(k) = &request.metadata_deletes_key {
                    located.metadata_deletes = Some(ObjectLocation::new(request.bucket.clone(), k.clone()));
                }
                Ok(located)
            }
        }
    }

    /// Reads and validates all descriptors. Every error here is fatal.
    fn load_inputs(&self) -> Result<RunInputs> {
        let fatal = |e: SyncError| {
            if e.is_fatal() {
                e
            } else {
                SyncError::DescriptorError(e.to_string())
            }
        };

        let locations = self.locations().map_err(fatal)?;
        let records = self
            .descriptors
            .read_manifest(&locations.manifest, self.request.chunk_size)
            .map_err(fatal)?;
        let catalog = self.descriptors.read_catalog(&locations.metadata).map_err(fatal)?;
        let deletes = match &locations.metadata_deletes {
            Some(location) => self.descriptors.read_delete_catalog(location).map_err(fatal)?,
            None => DeleteCatalog::default(),
        };

        let retired = deletes.retired_tables();
        let mut groups = group_manifest(&records, self.request.extract_kind, &retired);
        validate_coverage(&groups, &catalog)?;

        let mut metadata = groups
            .iter()
            .position(|g| g.table == METADATA_TABLE)
            .map(|idx| groups.remove(idx));
        if metadata.is_none() && self.request.extract_kind == ExtractKind::Full && !catalog.header.is_empty() {
            metadata = Some(TableManifest {
                extract: METADATA_EXTRACT.to_string(),
                table: METADATA_TABLE.to_string(),
                total_records: 0,
                has_updates: false,
                loads: Vec::new(),
                deletes: Vec::new(),
            });
        }

        info!(
            "Loaded {} manifest rows for {} tables, {} column descriptors, {} retired tables",
            records.len(),
            groups.len(),
            catalog.len(),
            retired.len()
        );
        Ok(RunInputs {
            catalog,
            deletes,
            retired,
            metadata,
            groups,
        })
    }

    fn ensure_schema(&self) -> Result<()> {
        let mut session = self.warehouse.session()?;
        if !session.schema_exists(&self.schema)? {
            info!("Creating schema {}", self.schema);
            session.execute(&Statement::CreateSchema {
                schema: self.schema.clone(),
            })?;
        }
        Ok(())
    }

    fn drop_retired(&self, retired: &BTreeSet<String>, ledger: &mut Ledger) {
        let materializer = TableMaterializer::new(&self.schema);
        let outcomes: Vec<(&String, Result<()>)> = retired
            .par_iter()
            .map(|table| {
                let outcome = self
                    .warehouse
                    .session()
                    .and_then(|mut session| materializer.drop_table(session.as_mut(), table));
                (table, outcome)
            })
            .collect();
        for (table, outcome) in outcomes {
            ledger.entry(table, Some(PlanAction::Drop));
            if let Err(e) = outcome {
                ledger.block(table, Some(PlanAction::Drop), &as_structural(table, e));
            }
        }
    }

    /// Plans and materializes the metadata table ahead of everything else.
    fn prepare_metadata(
        &self,
        planner: &SchemaPlanner<'_>,
        materializer: &TableMaterializer<'_>,
        group: &TableManifest,
        ledger: &mut Ledger,
    ) -> Option<TableSyncPlan> {
        let outcome = self.warehouse.session().and_then(|mut session| {
            let plan = planner.plan(session.as_mut(), group)?;
            match (plan.action, &plan.definition) {
                (PlanAction::Create, Some(definition)) => materializer.create(session.as_mut(), definition)?,
                (PlanAction::Verify, _) => materializer.verify(session.as_mut(), &plan)?,
                _ => {}
            }
            Ok(plan)
        });
        match outcome {
            Ok(plan) => {
                ledger.entry(&plan.table, Some(plan.action));
                Some(plan)
            }
            Err(e) => {
                ledger.block(&group.table, None, &as_structural(&group.table, e));
                None
            }
        }
    }

    /// Runs `apply` for every unblocked plan with `action` in parallel.
    fn structural_phase<F>(&self, plans: &[TableSyncPlan], action: PlanAction, ledger: &mut Ledger, apply: F)
    where
        F: Fn(&mut dyn WarehouseSession, &TableSyncPlan) -> Result<()> + Sync,
    {
        let pending: Vec<&TableSyncPlan> = plans
            .iter()
            .filter(|p| p.action == action && !ledger.is_blocked(&p.table))
            .collect();
        if pending.is_empty() {
            return;
        }
        info!("{} phase: {} tables", action, pending.len());

        let outcomes: Vec<(&TableSyncPlan, Result<()>)> = pending
            .into_par_iter()
            .map(|plan| {
                let outcome = self
                    .warehouse
                    .session()
                    .and_then(|mut session| apply(session.as_mut(), plan));
                (plan, outcome)
            })
            .collect();
        for (plan, outcome) in outcomes {
            if let Err(e) = outcome {
                ledger.block(&plan.table, Some(plan.action), &as_structural(&plan.table, e));
            }
        }
    }

    fn foreign_key_phase(&self, plans: &[TableSyncPlan], catalog: &DescriptorCatalog, ledger: &mut Ledger) {
        let pending: Vec<&TableSyncPlan> = plans
            .iter()
            .filter(|p| matches!(p.action, PlanAction::Create | PlanAction::Verify))
            .filter(|p| !ledger.is_blocked(&p.table))
            .collect();

        let outcomes: Vec<(&TableSyncPlan, Result<usize>)> = pending
            .into_par_iter()
            .map(|plan| {
                let outcome = self.warehouse.session().and_then(|mut session| {
                    self.apply_foreign_keys(session.as_mut(), plan, catalog)
                });
                (plan, outcome)
            })
            .collect();
        let mut added = 0;
        for (plan, outcome) in outcomes {
            match outcome {
                Ok(n) => added += n,
                Err(e) => ledger.block(&plan.table, Some(plan.action), &as_structural(&plan.table, e)),
            }
        }
        info!("Foreign key phase: {} constraints added", added);
    }

    fn apply_foreign_keys(
        &self,
        session: &mut dyn WarehouseSession,
        plan: &TableSyncPlan,
        catalog: &DescriptorCatalog,
    ) -> Result<usize> {
        let mut added = 0;
        for link in derive_links(&plan.table, catalog.columns_for(&plan.extract)) {
            let constraint = link.constraint_name();
            if !session.table_exists(&self.schema, &link.referenced_table)? {
                warn!(
                    "Skipping {}: referenced table {} does not exist",
                    constraint, link.referenced_table
                );
                continue;
            }
            if session.constraint_exists(&self.schema, &link.table, &constraint)? {
                continue;
            }
            session.execute(&Statement::AddForeignKey {
                table: TableRef::new(&self.schema, &link.table),
                constraint,
                column: link.column.clone(),
                referenced: TableRef::new(&self.schema, &link.referenced_table),
            })?;
            added += 1;
        }
        Ok(added)
    }

    fn load_phase(&self, plans: &[TableSyncPlan], executor: &LoadExecutor<'_>, ledger: &mut Ledger) {
        let strategy = LoadStrategy::from(self.request.extract_kind);
        let pending: Vec<&TableSyncPlan> = plans
            .iter()
            .filter(|p| matches!(p.action, PlanAction::Create | PlanAction::Verify))
            .filter(|p| p.is_load_pending() && !ledger.is_blocked(&p.table))
            .collect();
        info!("Load phase: {} tables ({:?})", pending.len(), strategy);

        let outcomes: Vec<(&TableSyncPlan, Result<u64>)> = pending
            .into_par_iter()
            .map(|plan| {
                let outcome = self
                    .warehouse
                    .session()
                    .and_then(|mut session| executor.load(session.as_mut(), plan, strategy));
                (plan, outcome)
            })
            .collect();
        for (plan, outcome) in outcomes {
            match outcome {
                Ok(rows) => ledger.entry(&plan.table, Some(plan.action)).rows_loaded = rows,
                Err(e) => ledger.fail(&plan.table, Some(plan.action), &as_data(&plan.table, "load", e)),
            }
        }
    }

    fn delete_phase(&self, plans: &[TableSyncPlan], executor: &LoadExecutor<'_>, ledger: &mut Ledger) {
        let pending: Vec<&TableSyncPlan> = plans
            .iter()
            .filter(|p| p.is_delete_pending() && !ledger.is_blocked(&p.table))
            .collect();
        info!("Delete phase: {} tables", pending.len());

        let outcomes: Vec<(&TableSyncPlan, Result<u64>)> = pending
            .into_par_iter()
            .map(|plan| {
                let outcome = self
                    .warehouse
                    .session()
                    .and_then(|mut session| executor.delete(session.as_mut(), plan));
                (plan, outcome)
            })
            .collect();
        for (plan, outcome) in outcomes {
            match outcome {
                Ok(rows) => ledger.entry(&plan.table, Some(plan.action)).rows_deleted = rows,
                Err(e) => ledger.fail(&plan.table, Some(plan.action), &as_data(&plan.table, "delete", e)),
            }
        }
    }
}
