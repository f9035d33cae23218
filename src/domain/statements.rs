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

//! # Statement Builder
//!
//! Every statement the engine sends is a `Statement` value. Rendering is the
//! only place identifiers and literals are quoted, and it refuses anything it
//! cannot quote safely. Table and column names come from an external system,
//! so no caller ever formats SQL text by hand.

use crate::domain::entities::{ColumnDefinition, SqlType};
use crate::domain::errors::{Result, SyncError};

/// Redshift identifier limit, in bytes.
pub const MAX_IDENTIFIER_BYTES: usize = 127;

/// A table, optionally schema-qualified. Temp tables have no schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: &str, name: &str) -> Self {
        Self {
            schema: Some(schema.to_string()),
            name: name.to_string(),
        }
    }

    pub fn temp(name: &str) -> Self {
        Self {
            schema: None,
            name: name.to_string(),
        }
    }

    pub fn to_sql(&self) -> Result<String> {
        match &self.schema {
            Some(schema) => Ok(format!("{}.{}", quote_ident(schema)?, quote_ident(&self.name)?)),
            None => quote_ident(&self.name),
        }
    }

    /// Human-readable form for logs.
    pub fn display(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }
}

/// How the CSV being copied is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// Data artifacts: tolerate invalid characters and short rows.
    Data,
    /// Delete artifacts: strict parsing.
    Deletes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateSchema {
        schema: String,
    },
    CreateTable {
        table: TableRef,
        columns: Vec<ColumnDefinition>,
        composite_key: Option<Vec<String>>,
    },
    CreateTempTable {
        table: TableRef,
        columns: Vec<ColumnDefinition>,
    },
    /// Temp table with the same columns as `like`.
    CreateTempTableLike {
        table: TableRef,
        like: TableRef,
    },
    AddColumn {
        table: TableRef,
        column: ColumnDefinition,
    },
    DropColumn {
        table: TableRef,
        column: String,
    },
    DropTable {
        table: TableRef,
        if_exists: bool,
        cascade: bool,
    },
    RenameTable {
        table: TableRef,
        new_name: String,
    },
    AddForeignKey {
        table: TableRef,
        constraint: String,
        column: String,
        referenced: TableRef,
    },
    /// Bulk load from object storage.
    Copy {
        table: TableRef,
        columns: Option<Vec<String>>,
        source_uri: String,
        iam_role: String,
        mode: CopyMode,
    },
    InsertSelect {
        target: TableRef,
        source: TableRef,
        columns: Vec<String>,
        distinct: bool,
    },
    /// Deletes target rows whose `keys` tuple appears in `source`.
    DeleteMatching {
        target: TableRef,
        source: TableRef,
        keys: Vec<String>,
    },
    Truncate {
        table: TableRef,
    },
}

impl Statement {
    pub fn to_sql(&self) -> Result<String> {
        match self {
            Statement::CreateSchema { schema } => {
                Ok(format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema)?))
            }
            Statement::CreateTable {
                table,
                columns,
                composite_key,
            } => {
                let mut parts = column_list_ddl(columns)?;
                if let Some(keys) = composite_key {
                    parts.push(format!(
                        "CONSTRAINT {} PRIMARY KEY ({})",
                        quote_ident(&format!("{}_primary_key", table.name))?,
                        ident_list(keys)?
                    ));
                }
                Ok(format!("CREATE TABLE {} ({})", table.to_sql()?, parts.join(", ")))
            }
            Statement::CreateTempTable { table, columns } => Ok(format!(
                "CREATE TEMPORARY TABLE {} ({})",
                table.to_sql()?,
                column_list_ddl(columns)?.join(", ")
            )),
            Statement::CreateTempTableLike { table, like } => Ok(format!(
                "CREATE TEMPORARY TABLE {} (LIKE {})",
                table.to_sql()?,
                like.to_sql()?
            )),
            Statement::AddColumn { table, column } => Ok(format!(
                "ALTER TABLE {} ADD COLUMN {}",
                table.to_sql()?,
                column_ddl(column)?
            )),
            Statement::DropColumn { table, column } => Ok(format!(
                "ALTER TABLE {} DROP COLUMN {}",
                table.to_sql()?,
                quote_ident(column)?
            )),
            Statement::DropTable {
                table,
                if_exists,
                cascade,
            } => Ok(format!(
                "DROP TABLE {}{}{}",
                if *if_exists { "IF EXISTS " } else { "" },
                table.to_sql()?,
                if *cascade { " CASCADE" } else { "" }
            )),
            Statement::RenameTable { table, new_name } => Ok(format!(
                "ALTER TABLE {} RENAME TO {}",
                table.to_sql()?,
                quote_ident(new_name)?
            )),
            Statement::AddForeignKey {
                table,
                constraint,
                column,
                referenced,
            } => Ok(format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                table.to_sql()?,
                quote_ident(constraint)?,
                quote_ident(column)?,
                referenced.to_sql()?,
                quote_ident("id")?
            )),
            Statement::Copy {
                table,
                columns,
                source_uri,
                iam_role,
                mode,
            } => {
                let target = match columns {
                    Some(cols) => format!("{} ({})", table.to_sql()?, ident_list(cols)?),
                    None => table.to_sql()?,
                };
                let mut sql = format!(
                    "COPY {} FROM {} IAM_ROLE {} FORMAT AS CSV QUOTE '\"' IGNOREHEADER 1 TIMEFORMAT 'auto'",
                    target,
                    quote_literal(source_uri)?,
                    quote_literal(iam_role)?
                );
                if *mode == CopyMode::Data {
                    sql.push_str(" ACCEPTINVCHARS FILLRECORD");
                }
                Ok(sql)
            }
            Statement::InsertSelect {
                target,
                source,
                columns,
                distinct,
            } => {
                let cols = ident_list(columns)?;
                Ok(format!(
                    "INSERT INTO {} ({}) SELECT {}{} FROM {}",
                    target.to_sql()?,
                    cols,
                    if *distinct { "DISTINCT " } else { "" },
                    cols,
                    source.to_sql()?
                ))
            }
            Statement::DeleteMatching {
                target,
                source,
                keys,
            } => {
                if keys.is_empty() {
                    return Err(SyncError::InvalidIdentifier(format!(
                        "DELETE from {} needs at least one key column",
                        target.display()
                    )));
                }
                let t = target.to_sql()?;
                let s = source.to_sql()?;
                let predicate = keys
                    .iter()
                    .map(|k| {
                        let k = quote_ident(k)?;
                        Ok(format!("{}.{} = {}.{}", t, k, s, k))
                    })
                    .collect::<Result<Vec<_>>>()?
                    .join(" AND ");
                Ok(format!("DELETE FROM {} USING {} WHERE {}", t, s, predicate))
            }
            Statement::Truncate { table } => Ok(format!("TRUNCATE {}", table.to_sql()?)),
        }
    }
}

/// Double-quotes an identifier after validating it.
pub fn quote_ident(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(SyncError::InvalidIdentifier("empty identifier".to_string()));
    }
    if name.len() > MAX_IDENTIFIER_BYTES {
        return Err(SyncError::InvalidIdentifier(format!(
            "identifier longer than {} bytes: {}",
            MAX_IDENTIFIER_BYTES, name
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(SyncError::InvalidIdentifier(format!(
            "identifier contains control characters: {:?}",
            name
        )));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Single-quotes a literal. Backslashes and control characters are refused.
pub fn quote_literal(value: &str) -> Result<String> {
    if value.contains('\\') || value.chars().any(char::is_control) {
        return Err(SyncError::InvalidIdentifier(format!(
            "literal contains a backslash or control character: {:?}",
            value
        )));
    }
    Ok(format!("'{}'", value.replace('\'', "''")))
}

fn ident_list(names: &[String]) -> Result<String> {
    Ok(names
        .iter()
        .map(|n| quote_ident(n))
        .collect::<Result<Vec<_>>>()?
        .join(", "))
}

pub fn sql_type_token(sql_type: &SqlType) -> Result<String> {
    match sql_type {
        SqlType::Varchar(width) => Ok(format!("VARCHAR({})", width)),
        SqlType::TimestampTz => Ok("TIMESTAMPTZ".to_string()),
        SqlType::Boolean => Ok("BOOLEAN".to_string()),
        SqlType::Numeric => Ok("NUMERIC".to_string()),
        SqlType::Date => Ok("DATE".to_string()),
        SqlType::Other(token) => {
            let ok = !token.is_empty()
                && token
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '(' | ')' | ',' | '_'));
            if ok {
                Ok(token.clone())
            } else {
                Err(SyncError::InvalidIdentifier(format!(
                    "unsupported type token: {:?}",
                    token
                )))
            }
        }
    }
}

fn column_ddl(column: &ColumnDefinition) -> Result<String> {
    let mut ddl = format!("{} {}", quote_ident(&column.name)?, sql_type_token(&column.sql_type)?);
    if column.is_primary_key {
        ddl.push_str(" PRIMARY KEY");
    }
    Ok(ddl)
}

fn column_list_ddl(columns: &[ColumnDefinition]) -> Result<Vec<String>> {
    columns.iter().map(column_ddl).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> TableRef {
        TableRef::new("vault_1", "account__v")
    }

    #[test]
    fn test_identifier_quoting() {
        assert_eq!(quote_ident("name").unwrap(), "\"name\"");
        assert_eq!(quote_ident("we\"ird").unwrap(), "\"we\"\"ird\"");
        assert!(quote_ident("").is_err());
        assert!(quote_ident("bad\0name").is_err());
        assert!(quote_ident("line\nbreak").is_err());
        assert!(quote_ident(&"a".repeat(128)).is_err());
        assert!(quote_ident(&"a".repeat(127)).is_ok());
    }

    #[test]
    fn test_literal_quoting() {
        assert_eq!(quote_literal("s3://b/k.csv").unwrap(), "'s3://b/k.csv'");
        assert_eq!(quote_literal("it's").unwrap(), "'it''s'");
        assert!(quote_literal("a\\b").is_err());
        assert!(quote_literal("a\nb").is_err());
    }

    #[test]
    fn test_create_table_ddl() {
        let stmt = Statement::CreateTable {
            table: account(),
            columns: vec![
                ColumnDefinition::new("id", SqlType::Varchar(64000)).primary_key(),
                ColumnDefinition::new("name", SqlType::Varchar(160)),
            ],
            composite_key: None,
        };
        assert_eq!(
            stmt.to_sql().unwrap(),
            "CREATE TABLE \"vault_1\".\"account__v\" (\"id\" VARCHAR(64000) PRIMARY KEY, \"name\" VARCHAR(160))"
        );
    }

    #[test]
    fn test_composite_key_ddl() {
        let stmt = Statement::CreateTable {
            table: TableRef::new("vault_1", "picklist__sys"),
            columns: vec![ColumnDefinition::new("object", SqlType::Varchar(200))],
            composite_key: Some(vec!["object".into(), "object_field".into()]),
        };
        assert!(stmt
            .to_sql()
            .unwrap()
            .ends_with("CONSTRAINT \"picklist__sys_primary_key\" PRIMARY KEY (\"object\", \"object_field\"))"));
    }

    #[test]
    fn test_copy_options_per_mode() {
        let data = Statement::Copy {
            table: account(),
            columns: Some(vec!["id".into(), "name".into()]),
            source_uri: "s3://b/Object/account__v.csv".into(),
            iam_role: "arn:aws:iam::1:role/r".into(),
            mode: CopyMode::Data,
        }
        .to_sql()
        .unwrap();
        assert!(data.starts_with("COPY \"vault_1\".\"account__v\" (\"id\", \"name\") FROM 's3://b/Object/account__v.csv'"));
        assert!(data.ends_with("TIMEFORMAT 'auto' ACCEPTINVCHARS FILLRECORD"));

        let deletes = Statement::Copy {
            table: TableRef::temp("temp_account__v_deletes"),
            columns: None,
            source_uri: "s3://b/d.csv".into(),
            iam_role: "role".into(),
            mode: CopyMode::Deletes,
        }
        .to_sql()
        .unwrap();
        assert!(deletes.starts_with("COPY \"temp_account__v_deletes\" FROM"));
        assert!(!deletes.contains("FILLRECORD"));
    }

    #[test]
    fn test_delete_matching_on_tuple() {
        let sql = Statement::DeleteMatching {
            target: TableRef::new("s", "metadata"),
            source: TableRef::temp("stage"),
            keys: vec!["extract".into(), "column_name".into()],
        }
        .to_sql()
        .unwrap();
        assert_eq!(
            sql,
            "DELETE FROM \"s\".\"metadata\" USING \"stage\" WHERE \"s\".\"metadata\".\"extract\" = \"stage\".\"extract\" AND \"s\".\"metadata\".\"column_name\" = \"stage\".\"column_name\""
        );
    }

    #[test]
    fn test_other_type_tokens_are_checked() {
        assert_eq!(sql_type_token(&SqlType::Other("CHAR(4)".into())).unwrap(), "CHAR(4)");
        assert!(sql_type_token(&SqlType::Other("INT; DROP".into())).is_err());
    }

    #[test]
    fn test_drop_and_rename() {
        let drop = Statement::DropTable {
            table: account(),
            if_exists: true,
            cascade: true,
        };
        assert_eq!(drop.to_sql().unwrap(), "DROP TABLE IF EXISTS \"vault_1\".\"account__v\" CASCADE");
        let rename = Statement::RenameTable {
            table: TableRef::new("vault_1", "account__v__widen"),
            new_name: "account__v".into(),
        };
        assert_eq!(
            rename.to_sql().unwrap(),
            "ALTER TABLE \"vault_1\".\"account__v__widen\" RENAME TO \"account__v\""
        );
    }
}
