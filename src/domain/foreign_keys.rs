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

//! Foreign-key inference from `related_extract` declarations.

use crate::domain::entities::{ColumnDescriptor, ForeignKeyLink};
use crate::domain::naming;

/// Related extracts that are not real relational targets.
pub const NON_RELATIONAL_EXTRACTS: &[&str] = &[
    naming::PICKLIST_EXTRACT,
    "Object.media__sys",
    "Object.layoutprofile__sys",
    "Object.tabcollection__sys",
];

fn is_denied(related: &str) -> bool {
    NON_RELATIONAL_EXTRACTS
        .iter()
        .any(|d| d.eq_ignore_ascii_case(related))
}

/// One link per referencing column of `table`, deduplicated by constraint name.
pub fn derive_links(table: &str, descriptors: &[ColumnDescriptor]) -> Vec<ForeignKeyLink> {
    let mut links: Vec<ForeignKeyLink> = Vec::new();
    for descriptor in descriptors {
        let related = match descriptor.related_extract.as_deref().map(str::trim) {
            Some(r) if !r.is_empty() && !is_denied(r) => r,
            _ => continue,
        };
        let link = ForeignKeyLink {
            table: table.to_string(),
            column: naming::column_name(&descriptor.column_name),
            referenced_table: naming::table_name_from_extract(related),
        };
        if !links
            .iter()
            .any(|l| l.constraint_name() == link.constraint_name())
        {
            links.push(link);
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    fn related(column: &str, target: Option<&str>) -> ColumnDescriptor {
        ColumnDescriptor {
            extract: "Object.account__v".into(),
            column_name: column.into(),
            declared_type: "string".into(),
            declared_length: None,
            related_extract: target.map(String::from),
        }
    }

    #[test]
    fn test_links_skip_denylist_and_blanks() {
        let links = derive_links(
            "account__v",
            &[
                related("owner__v", Some("Object.User__sys")),
                related("status__v", Some("Picklist.picklist__sys")),
                related("media__v", Some("Object.media__sys")),
                related("name", None),
                related("blank", Some("  ")),
                related("territory__v", Some("Object.9th_region__c")),
            ],
        );
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].referenced_table, "user__sys");
        assert_eq!(links[1].referenced_table, "n_9th_region__c");
        assert_eq!(links[1].constraint_name(), "fk_constraint_account__v_territory__v");
    }
}
