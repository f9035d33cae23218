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


use clap::Parser;
use direct_data_sync::application::orchestrator::SyncOrchestrator;
use direct_data_sync::application::report::write_report;
use direct_data_sync::application::runtime::RuntimeContext;
use direct_data_sync::config::{AppConfig, CliArgs, StorageBackend};
use direct_data_sync::domain::entities::{RunReport, RunStatus};
use direct_data_sync::infrastructure::descriptors::csv_descriptor_reader::CsvDescriptorReader;
use direct_data_sync::infrastructure::storage::local_object_store::LocalObjectStore;
use direct_data_sync::infrastructure::storage::s3_cli_object_store::S3CliObjectStore;
use direct_data_sync::ports::object_store_port::ObjectStorePort;
use log::{error, info, warn};
use std::process;
use std::sync::Arc;

fn main() {
    // 1. Initialize Logging
    env_logger::init();

    // 2. Parse Arguments
    let args = CliArgs::parse();

    // 3. Load Config
    let loaded = match &args.config {
        Some(config_path) => AppConfig::from_file(config_path).and_then(|mut c| {
            c.merge_cli(&args)?;
            Ok(c)
        }),
        None => AppConfig::from_cli(&args),
    };
    let config = match loaded {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load config: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        process::exit(1);
    }

    // 4. Setup Parallelism and Connection Pool
    let runtime = match RuntimeContext::init(&config) {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to initialize runtime: {}", e);
            process::exit(1);
        }
    };

    // 5. Initialize Hexagonal Components
    let store: Arc<dyn ObjectStorePort> = match config.storage.backend {
        StorageBackend::Local => Arc::new(LocalObjectStore::new(
            config.storage.local_root.clone().unwrap_or_default(),
        )),
        StorageBackend::S3 => match &config.storage.aws_cli {
            Some(program) => Arc::new(S3CliObjectStore::with_program(program)),
            None => Arc::new(S3CliObjectStore::new()),
        },
    };
    let descriptors = Arc::new(CsvDescriptorReader::new(store));
    let warehouse = Arc::new(runtime.warehouse(&config));

    // 6. Run Orchestrator
    let request = config.to_request();
    let started_at = chrono::Local::now().to_rfc3339();
    let orchestrator = SyncOrchestrator::new(warehouse, descriptors, request.clone());

    info!("Starting sync with {} workers...", runtime.num_threads);
    let report = match orchestrator.run() {
        Ok(report) => report,
        Err(e) => {
            error!("Sync aborted: {}", e);
            RunReport::fatal(orchestrator.schema(), request.extract_kind, started_at, &e)
        }
    };

    for failed in report.failures() {
        warn!("{}: {}", failed.table, failed.errors.join("; "));
    }
    if let Err(e) = write_report(&report, config.report_dir()) {
        error!("Failed to write run report: {}", e);
    }

    info!(
        "Sync finished with status {:?}. {}/{} tables successful.",
        report.status,
        report.tables.len() - report.failures().count(),
        report.tables.len()
    );
    if report.status != RunStatus::Success {
        process::exit(1);
    }
}
