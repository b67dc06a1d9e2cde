//! Schema patch operations to PostgreSQL migration DDL.
//!
//! Handles additions and removals of whole tables, columns and indexes.
//! Identifiers are always double-quoted except in CREATE INDEX, which is
//! emitted as written.

use schemaforge_core::{Column, Constraint, DefaultValue, Index, ProcessError, Table};
use schemaforge_engine::patch::split_pointer;
use schemaforge_engine::Operation;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::Deparsed;

/// Schema object an operation path points at
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Table(String),
    Column { table: String, column: String },
    Index { table: String, index: String },
}

impl Target {
    fn from_path(path: &str) -> Option<Self> {
        let tokens = split_pointer(path).ok()?;
        match tokens.as_slice() {
            [tables, table] if tables == "tables" => Some(Self::Table(table.clone())),
            [tables, table, columns, column] if tables == "tables" && columns == "columns" => {
                Some(Self::Column {
                    table: table.clone(),
                    column: column.clone(),
                })
            }
            [tables, table, indexes, index] if tables == "tables" && indexes == "indexes" => {
                Some(Self::Index {
                    table: table.clone(),
                    index: index.clone(),
                })
            }
            _ => None,
        }
    }
}

/// Migration DDL for a list of operations.
///
/// Operations that cannot be expressed are reported and skipped.
pub fn deparse_operations(operations: &[Operation]) -> Deparsed {
    let mut deparsed = Deparsed::default();
    for operation in operations {
        match deparse_operation(operation) {
            Ok(sql) => deparsed.statements.push(sql),
            Err(error) => {
                debug!(path = operation.path(), "{error}");
                deparsed.errors.push(error);
            }
        }
    }
    deparsed
}

/// Migration DDL for one operation
pub fn deparse_operation(operation: &Operation) -> Result<String, ProcessError> {
    let target = Target::from_path(operation.path()).ok_or_else(|| unsupported(operation))?;

    match (operation, target) {
        (Operation::Add { value, .. }, Target::Table(_)) => {
            let table: Table = from_value(value, operation)?;
            Ok(create_table(&table))
        }
        (Operation::Remove { .. }, Target::Table(table)) => {
            Ok(format!("DROP TABLE {};", escape(&table)))
        }
        (Operation::Add { value, .. }, Target::Column { table, .. }) => {
            let column: Column = from_value(value, operation)?;
            Ok(add_column(&table, &column))
        }
        (Operation::Remove { .. }, Target::Column { table, column }) => Ok(format!(
            "ALTER TABLE {} DROP COLUMN {};",
            escape(&table),
            escape(&column)
        )),
        (Operation::Add { value, .. }, Target::Index { table, .. }) => {
            let index: Index = from_value(value, operation)?;
            Ok(create_index(&table, &index))
        }
        _ => Err(unsupported(operation)),
    }
}

fn unsupported(operation: &Operation) -> ProcessError {
    ProcessError::unsupported(format!(
        "Operation {} at {} is not supported",
        operation.kind(),
        operation.path()
    ))
}

fn from_value<T: DeserializeOwned>(value: &Value, operation: &Operation) -> Result<T, ProcessError> {
    serde_json::from_value(value.clone()).map_err(|e| {
        ProcessError::unexpected(format!("Invalid value at {}: {e}", operation.path()))
    })
}

fn escape(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn default_literal(value: &DefaultValue) -> String {
    match value {
        DefaultValue::Boolean(b) => b.to_string().to_uppercase(),
        other => other.to_sql_literal(),
    }
}

fn column_definition(column: &Column, unique: bool) -> String {
    let mut definition = format!("{} {}", escape(&column.name), column.data_type);

    if column.primary {
        definition.push_str(" PRIMARY KEY");
    } else {
        if unique {
            definition.push_str(" UNIQUE");
        }
        if column.not_null {
            definition.push_str(" NOT NULL");
        }
    }
    if let Some(default) = &column.default {
        definition.push_str(" DEFAULT ");
        definition.push_str(&default_literal(default));
    }
    definition
}

fn has_unique_constraint(table: &Table, column: &str) -> bool {
    table.constraints.values().any(|constraint| {
        matches!(constraint, Constraint::Unique { column_names, .. }
            if column_names.len() == 1 && column_names[0] == column)
    })
}

fn column_comment(table: &str, column: &Column) -> Option<String> {
    column.comment.as_ref().map(|comment| {
        format!(
            "COMMENT ON COLUMN {}.{} IS {};",
            escape(table),
            escape(&column.name),
            string_literal(comment)
        )
    })
}

fn create_table(table: &Table) -> String {
    let definitions: Vec<String> = table
        .columns
        .values()
        .map(|column| {
            let unique = column.unique || has_unique_constraint(table, &column.name);
            column_definition(column, unique)
        })
        .collect();

    let mut sql = format!(
        "CREATE TABLE {} (\n  {}\n);",
        escape(&table.name),
        definitions.join(",\n  ")
    );

    if let Some(comment) = &table.comment {
        sql.push_str(&format!(
            "\n\nCOMMENT ON TABLE {} IS {};",
            escape(&table.name),
            string_literal(comment)
        ));
    }

    let column_comments: Vec<String> = table
        .columns
        .values()
        .filter_map(|column| column_comment(&table.name, column))
        .collect();
    if !column_comments.is_empty() {
        sql.push('\n');
        sql.push_str(&column_comments.join("\n"));
    }
    sql
}

fn add_column(table: &str, column: &Column) -> String {
    let mut sql = format!(
        "ALTER TABLE {} ADD COLUMN {};",
        escape(table),
        column_definition(column, column.unique)
    );
    if let Some(comment) = column_comment(table, column) {
        sql.push_str("\n\n");
        sql.push_str(&comment);
    }
    sql
}

fn create_index(table: &str, index: &Index) -> String {
    let unique = if index.unique { " UNIQUE" } else { "" };
    let using = if index.index_type.is_empty() {
        String::new()
    } else {
        format!(" USING {}", index.index_type)
    };
    format!(
        "CREATE{unique} INDEX {} ON {table}{using} ({});",
        index.name,
        index.columns.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn added_table_becomes_create_table_with_comments() {
        let operation = Operation::add(
            "/tables/users",
            json!({
                "name": "users",
                "comment": "Application users",
                "columns": {
                    "id": {"name": "id", "type": "bigint", "primary": true, "notNull": true,
                           "comment": "Primary key"},
                    "email": {"name": "email", "type": "varchar(255)", "notNull": true},
                    "active": {"name": "active", "type": "boolean", "default": true},
                    "score": {"name": "score", "type": "numeric", "default": 0.0}
                },
                "constraints": {
                    "users_email_key": {"type": "UNIQUE", "name": "users_email_key",
                                        "columnNames": ["email"]}
                }
            }),
        );

        assert_eq!(
            deparse_operation(&operation).unwrap(),
            "CREATE TABLE \"users\" (\n  \"id\" bigint PRIMARY KEY,\n  \"email\" varchar(255) UNIQUE NOT NULL,\n  \"active\" boolean DEFAULT TRUE,\n  \"score\" numeric DEFAULT 0\n);\n\nCOMMENT ON TABLE \"users\" IS 'Application users';\nCOMMENT ON COLUMN \"users\".\"id\" IS 'Primary key';"
        );
    }

    #[test]
    fn column_comments_without_table_comment() {
        let operation = Operation::add(
            "/tables/notes",
            json!({
                "name": "notes",
                "columns": {
                    "body": {"name": "body", "type": "text", "comment": "It's markdown"}
                }
            }),
        );

        assert_eq!(
            deparse_operation(&operation).unwrap(),
            "CREATE TABLE \"notes\" (\n  \"body\" text\n);\nCOMMENT ON COLUMN \"notes\".\"body\" IS 'It''s markdown';"
        );
    }

    #[test]
    fn removals_drop_tables_and_columns() {
        assert_eq!(
            deparse_operation(&Operation::remove("/tables/users")).unwrap(),
            "DROP TABLE \"users\";"
        );
        assert_eq!(
            deparse_operation(&Operation::remove("/tables/users/columns/age")).unwrap(),
            "ALTER TABLE \"users\" DROP COLUMN \"age\";"
        );
    }

    #[test]
    fn added_column_with_comment() {
        let operation = Operation::add(
            "/tables/users/columns/age",
            json!({"name": "age", "type": "integer", "notNull": true, "default": 18,
                   "comment": "Age in years"}),
        );

        assert_eq!(
            deparse_operation(&operation).unwrap(),
            "ALTER TABLE \"users\" ADD COLUMN \"age\" integer NOT NULL DEFAULT 18;\n\nCOMMENT ON COLUMN \"users\".\"age\" IS 'Age in years';"
        );
    }

    #[test]
    fn string_defaults_are_quoted() {
        let operation = Operation::add(
            "/tables/users/columns/role",
            json!({"name": "role", "type": "text", "default": "o'neil"}),
        );

        assert_eq!(
            deparse_operation(&operation).unwrap(),
            "ALTER TABLE \"users\" ADD COLUMN \"role\" text DEFAULT 'o''neil';"
        );
    }

    #[test]
    fn added_index_with_and_without_method() {
        let btree = Operation::add(
            "/tables/users/indexes/idx_users_email",
            json!({"name": "idx_users_email", "unique": false, "columns": ["email"], "type": "BTREE"}),
        );
        let plain = Operation::add(
            "/tables/users/indexes/users_name_key",
            json!({"name": "users_name_key", "unique": true, "columns": ["first", "last"], "type": ""}),
        );

        assert_eq!(
            deparse_operation(&btree).unwrap(),
            "CREATE INDEX idx_users_email ON users USING BTREE (email);"
        );
        assert_eq!(
            deparse_operation(&plain).unwrap(),
            "CREATE UNIQUE INDEX users_name_key ON users (first, last);"
        );
    }

    #[test]
    fn escaped_path_tokens_are_decoded() {
        assert_eq!(
            deparse_operation(&Operation::remove("/tables/a~1b")).unwrap(),
            "DROP TABLE \"a/b\";"
        );
    }

    #[test]
    fn unsupported_operations_are_reported() {
        let operations = vec![
            Operation::replace("/tables/users/comment", json!("x")),
            Operation::remove("/tables/users/indexes/idx"),
            Operation::add("/tables/users/columns/age", json!({"name": "age"})),
            Operation::remove("/tables/users"),
        ];

        let deparsed = deparse_operations(&operations);

        assert_eq!(deparsed.statements, vec!["DROP TABLE \"users\";".to_string()]);
        assert_eq!(deparsed.errors.len(), 3);
        assert!(matches!(
            &deparsed.errors[0],
            ProcessError::UnsupportedToken { message } if message.contains("replace")
        ));
        assert!(matches!(&deparsed.errors[2], ProcessError::UnexpectedToken { .. }));
    }
}
