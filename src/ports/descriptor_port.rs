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


//! # Descriptor Port
//!
//! Parses the manifest and metadata catalogs of an extract. Any malformed
//! row fails the whole read; callers treat these errors as fatal.

use crate::domain::descriptors::{DeleteCatalog, DescriptorCatalog};
use crate::domain::entities::{DescriptorLocations, ManifestRecord, ObjectLocation};
use crate::domain::errors::Result;

pub trait DescriptorPort: Send + Sync {
    /// Finds the descriptor files of the extract under `source_directory`.
    fn locate(&self, bucket: &str, source_directory: &str) -> Result<DescriptorLocations>;

    /// Reads every manifest row, `chunk_size` rows at a time.
    fn read_manifest(&self, location: &ObjectLocation, chunk_size: usize) -> Result<Vec<ManifestRecord>>;

    /// Reads the metadata catalog with known source quirks corrected.
    fn read_catalog(&self, location: &ObjectLocation) -> Result<DescriptorCatalog>;

    fn read_delete_catalog(&self, location: &ObjectLocation) -> Result<DeleteCatalog>;

    /// Header row of a staged CSV file, normalized to warehouse column names.
    fn read_header(&self, location: &ObjectLocation) -> Result<Vec<String>>;
}
