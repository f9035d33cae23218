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

//! Known mis-declarations in Direct Data metadata catalogs.
//!
//! Each entry forces one `(extract, column)` to a declared type and length.
//! New quirks are added to `METADATA_CORRECTIONS`; nothing else changes.

use log::debug;

use crate::domain::entities::ColumnDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataCorrection {
    pub extract: &'static str,
    pub column_name: &'static str,
    pub declared_type: &'static str,
    pub declared_length: u32,
}

pub const METADATA_CORRECTIONS: &[MetadataCorrection] = &[
    // Declared as a number, holds free text.
    MetadataCorrection {
        extract: "Document.document_version__sys",
        column_name: "document_number__v",
        declared_type: "String",
        declared_length: 255,
    },
    // Declared shorter than Vault allows.
    MetadataCorrection {
        extract: "Object.security_policy__sys",
        column_name: "description__sys",
        declared_type: "String",
        declared_length: 255,
    },
    MetadataCorrection {
        extract: "Object.edl_item__v",
        column_name: "progress_icon__v",
        declared_type: "String",
        declared_length: 32000,
    },
];

/// Applies `corrections` in place. Returns how many descriptors changed.
pub fn apply_corrections(
    descriptors: &mut [ColumnDescriptor],
    corrections: &[MetadataCorrection],
) -> usize {
    let mut applied = 0;
    for descriptor in descriptors.iter_mut() {
        let hit = corrections.iter().find(|c| {
            c.extract == descriptor.extract && c.column_name == descriptor.column_name
        });
        if let Some(correction) = hit {
            debug!(
                "Correcting {}.{} to {}({})",
                descriptor.extract,
                descriptor.column_name,
                correction.declared_type,
                correction.declared_length
            );
            descriptor.declared_type = correction.declared_type.to_string();
            descriptor.declared_length = Some(correction.declared_length);
            applied += 1;
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_quirks_are_corrected() {
        let mut descriptors = vec![
            ColumnDescriptor {
                extract: "Document.document_version__sys".into(),
                column_name: "document_number__v".into(),
                declared_type: "number".into(),
                declared_length: None,
                related_extract: None,
            },
            ColumnDescriptor {
                extract: "Object.account__v".into(),
                column_name: "document_number__v".into(),
                declared_type: "number".into(),
                declared_length: None,
                related_extract: None,
            },
        ];
        assert_eq!(apply_corrections(&mut descriptors, METADATA_CORRECTIONS), 1);
        assert_eq!(descriptors[0].declared_type, "String");
        assert_eq!(descriptors[0].declared_length, Some(255));
        assert_eq!(descriptors[1].declared_type, "number");
    }
}
