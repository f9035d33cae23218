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


//! # Direct Data Sync
//!
//! Converges a Redshift schema to a Vault Direct Data extract and loads its
//! rows. The extract is described by a manifest (artifacts, operation kind,
//! record counts) and a metadata catalog (column types, lengths and
//! relationships); both are read from object storage next to the staged files.
//!
//! This crate follows the **Hexagonal Architecture** (Ports and Adapters):
//! `domain` holds pure types and rules, `ports` the traits at the I/O seams,
//! `infrastructure` the Redshift, object storage and CSV adapters, and
//! `application` the phased run itself.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod ports;

use std::sync::Arc;

use crate::application::orchestrator::{SyncOrchestrator, SyncRequest};
use crate::domain::entities::RunReport;
use crate::domain::errors::Result;
use crate::ports::descriptor_port::DescriptorPort;
use crate::ports::warehouse_port::WarehousePort;

/// Synchronizes the schema with the extract described by `request`, then
/// loads and deletes its rows.
///
/// `Err` is returned only when the run aborts before touching any table;
/// per-table failures are reported in the returned `RunReport`.
pub fn synchronize_and_load(
    warehouse: Arc<dyn WarehousePort>,
    descriptors: Arc<dyn DescriptorPort>,
    request: SyncRequest,
) -> Result<RunReport> {
    SyncOrchestrator::new(warehouse, descriptors, request).run()
}
