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

//! # Warehouse Naming
//!
//! Every table and column name passes through this module before it reaches
//! a statement. Redshift folds identifiers to lower case and rejects bare
//! names that begin with a digit, so both rules are applied here and nowhere
//! else. Creation, alteration, foreign keys, loads and deletes all address the
//! same physical object as a result.

/// Prefix for names that would otherwise start with a digit.
pub const DIGIT_PREFIX: &str = "n_";

/// Extract name of the implicit table holding the metadata catalog itself.
pub const METADATA_EXTRACT: &str = "Metadata.metadata";
pub const METADATA_TABLE: &str = "metadata";

pub const PICKLIST_EXTRACT: &str = "Picklist.picklist__sys";
pub const PICKLIST_TABLE: &str = "picklist__sys";

const PICKLIST_KEY: [&str; 3] = ["object", "object_field", "picklist_value_name"];
const METADATA_KEY: [&str; 2] = ["extract", "column_name"];
const DEFAULT_KEY: [&str; 1] = ["id"];

/// Prefixes a name that starts with an ASCII digit. Idempotent.
pub fn rewrite_leading_digit(name: &str) -> String {
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("{}{}", DIGIT_PREFIX, name)
    } else {
        name.to_string()
    }
}

/// Normalized warehouse name for a catalog or header column.
pub fn column_name(raw: &str) -> String {
    rewrite_leading_digit(&raw.trim().to_lowercase())
}

/// "Object.account__v" -> "account__v". A name without a category is used whole.
pub fn table_name_from_extract(extract: &str) -> String {
    let trimmed = extract.trim();
    let bare = match trimmed.split_once('.') {
        Some((_, table)) => table,
        None => trimmed,
    };
    rewrite_leading_digit(&bare.to_lowercase())
}

/// Column tuple used to match rows during merge-load and delete.
pub fn natural_key(table: &str) -> &'static [&'static str] {
    match table {
        PICKLIST_TABLE => &PICKLIST_KEY,
        METADATA_TABLE => &METADATA_KEY,
        _ => &DEFAULT_KEY,
    }
}

/// `vault_<id>` where `<id>` is the first `-` token of the last path segment.
pub fn schema_name_for_source(source_directory: &str) -> String {
    let last = source_directory
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let id = last.split('-').next().unwrap_or_default();
    rewrite_leading_digit(&format!("vault_{}", id.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_digit_rewrite_is_idempotent() {
        let once = rewrite_leading_digit("3d_model__c");
        assert_eq!(once, "n_3d_model__c");
        assert_eq!(rewrite_leading_digit(&once), once);
        assert_eq!(rewrite_leading_digit("account__v"), "account__v");
        assert_eq!(rewrite_leading_digit(""), "");
    }

    #[test]
    fn test_table_name_from_extract() {
        assert_eq!(table_name_from_extract("Object.Account__v"), "account__v");
        assert_eq!(table_name_from_extract("Object.1st_party__c"), "n_1st_party__c");
        assert_eq!(table_name_from_extract("metadata"), "metadata");
        assert_eq!(table_name_from_extract(PICKLIST_EXTRACT), PICKLIST_TABLE);
    }

    #[test]
    fn test_column_name_normalization() {
        assert_eq!(column_name(" Name__v "), "name__v");
        assert_eq!(column_name("2nd_owner__c"), "n_2nd_owner__c");
    }

    #[test]
    fn test_natural_keys() {
        assert_eq!(natural_key("picklist__sys"), &["object", "object_field", "picklist_value_name"]);
        assert_eq!(natural_key("metadata"), &["extract", "column_name"]);
        assert_eq!(natural_key("account__v"), &["id"]);
    }

    #[test]
    fn test_schema_derivation() {
        assert_eq!(
            schema_name_for_source("direct-data/12345-20240101-0000-F/"),
            "vault_12345"
        );
        assert_eq!(schema_name_for_source("12345-20240101-N"), "vault_12345");
    }
}
