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


//! # Object Store Port
//!
//! Read access to the bucket holding a staged extract.

use std::io::Read;

use crate::domain::entities::ObjectLocation;
use crate::domain::errors::Result;

pub trait ObjectStorePort: Send + Sync {
    /// Keys under `prefix`, in lexical order.
    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;

    /// Streams the object's bytes.
    fn open(&self, location: &ObjectLocation) -> Result<Box<dyn Read + Send>>;
}
