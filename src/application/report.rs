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


//! Writes the run report as pretty JSON next to previous runs.

use crate::domain::entities::RunReport;
use crate::domain::errors::{Result, SyncError};
use log::info;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Writes `report_<timestamp>.json` under `dir` and returns its path.
pub fn write_report(report: &RunReport, dir: &str) -> Result<PathBuf> {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let report_path = Path::new(dir).join(format!("report_{}.json", timestamp));

    fs::create_dir_all(dir)?;
    let file = File::create(&report_path)?;
    serde_json::to_writer_pretty(file, report)
        .map_err(|e| SyncError::StorageError(format!("Cannot write report: {}", e)))?;

    info!("Run report written to {}", report_path.display());
    Ok(report_path)
}
