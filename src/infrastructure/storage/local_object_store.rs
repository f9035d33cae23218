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


//! Object store backed by a local directory. Each bucket is a subdirectory
//! of the root; keys are `/`-separated paths inside it.

use crate::domain::entities::ObjectLocation;
use crate::domain::errors::{Result, SyncError};
use crate::ports::object_store_port::ObjectStorePort;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, location: &ObjectLocation) -> PathBuf {
        let mut path = self.root.join(&location.bucket);
        for part in location.key.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path
    }

    fn collect_keys(dir: &Path, base: &Path, keys: &mut Vec<String>) -> std::io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                Self::collect_keys(&path, base, keys)?;
            } else if let Ok(relative) = path.strip_prefix(base) {
                let key: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                keys.push(key.join("/"));
            }
        }
        Ok(())
    }
}

impl ObjectStorePort for LocalObjectStore {
    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let base = self.root.join(bucket);
        if !base.is_dir() {
            return Err(SyncError::StorageError(format!(
                "Bucket directory {} does not exist",
                base.display()
            )));
        }
        let mut keys = Vec::new();
        Self::collect_keys(&base, &base, &mut keys)?;
        let prefix = prefix.trim_start_matches('/');
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    fn open(&self, location: &ObjectLocation) -> Result<Box<dyn Read + Send>> {
        let path = self.path_for(location);
        let file = File::open(&path).map_err(|e| {
            SyncError::StorageError(format!("Cannot open {}: {}", path.display(), e))
        })?;
        Ok(Box::new(file))
    }
}
