//! Schema override documents and the merger that applies them.
//!
//! Documents are applied strictly in order: each one sees the effects of
//! every document before it. Within a document the order is fixed:
//! added tables, table overrides, added relationships, table groups,
//! then `done` implementation requests.

use std::path::Path;

use indexmap::IndexMap;
use schemaforge_core::{
    Column, Diagnostic, DiagnosticCode, Relationship, Schema, Severity, Table, TableGroup,
    TableGroups,
};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

/// One override document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaOverride {
    #[serde(default)]
    pub overrides: Overrides,

    #[serde(default)]
    pub requests: Vec<ImplementationRequest>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overrides {
    #[serde(default)]
    pub add_tables: IndexMap<String, Table>,

    #[serde(default)]
    pub tables: IndexMap<String, TableOverride>,

    #[serde(default)]
    pub add_relationships: IndexMap<String, Relationship>,

    #[serde(default)]
    pub table_groups: IndexMap<String, TableGroup>,
}

/// Amendments to an existing table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableOverride {
    /// `None` leaves the comment alone, `Some(None)` clears it
    #[serde(default, deserialize_with = "present")]
    pub comment: Option<Option<String>>,

    #[serde(default)]
    pub columns: IndexMap<String, ColumnOverride>,

    #[serde(default)]
    pub add_columns: IndexMap<String, Column>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnOverride {
    #[serde(default, deserialize_with = "present")]
    pub comment: Option<Option<String>>,
}

/// Distinguish an explicit `null` from an absent key
fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Open,
    InProgress,
    Done,
    Wontfix,
}

/// A tracked request to change the schema. Only `done` requests are
/// applied; the rest are kept for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImplementationRequest {
    pub id: String,
    pub description: String,
    pub status: RequestStatus,

    #[serde(default)]
    pub tables: Option<RequestTables>,

    #[serde(default)]
    pub relationships: Option<RequestRelationships>,

    #[serde(default)]
    pub created_by: Option<String>,

    #[serde(default)]
    pub created_at: Option<String>,

    #[serde(default)]
    pub refs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestTables {
    #[serde(default)]
    pub add: IndexMap<String, TableDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub definition: Table,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestRelationships {
    #[serde(default)]
    pub add: IndexMap<String, RelationshipDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDefinition {
    pub definition: Relationship,
}

impl SchemaOverride {
    pub fn from_json(json: &str) -> Result<Self, OverrideError> {
        serde_json::from_str(json).map_err(|e| OverrideError::Parse(e.to_string()))
    }

    pub fn from_toml(toml: &str) -> Result<Self, OverrideError> {
        toml::from_str(toml).map_err(|e| OverrideError::Parse(e.to_string()))
    }

    /// Load a document, choosing TOML for `.toml` files and JSON otherwise
    pub fn from_file(path: &Path) -> Result<Self, OverrideError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| OverrideError::Io(format!("{}: {}", path.display(), e)))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&content),
            _ => Self::from_json(&content),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OverrideError {
    #[error("Table {0} already exists in the database structure")]
    TableExists(String),

    #[error("Cannot override non-existent table: {0}")]
    MissingTable(String),

    #[error("Cannot override non-existent column {column} in table {table}")]
    MissingColumn { table: String, column: String },

    #[error("Column {column} already exists in table {table}")]
    ColumnExists { table: String, column: String },

    #[error("Relationship {0} already exists in the database structure")]
    RelationshipExists(String),

    #[error("Primary table {table} does not exist for relationship {relationship}")]
    MissingPrimaryTable { table: String, relationship: String },

    #[error("Primary column {column} does not exist in table {table} for relationship {relationship}")]
    MissingPrimaryColumn {
        column: String,
        table: String,
        relationship: String,
    },

    #[error("Foreign table {table} does not exist for relationship {relationship}")]
    MissingForeignTable { table: String, relationship: String },

    #[error("Foreign column {column} does not exist in table {table} for relationship {relationship}")]
    MissingForeignColumn {
        column: String,
        table: String,
        relationship: String,
    },

    #[error("Cannot add non-existent table {table} to group {group}")]
    MissingGroupTable { table: String, group: String },

    #[error("Failed to read override document: {0}")]
    Io(String),

    #[error("Failed to parse override document: {0}")]
    Parse(String),
}

/// Result of merging overrides onto a base schema
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeOutcome {
    pub schema: Schema,
    pub table_groups: TableGroups,
    /// Every request from every document, in document order
    pub requests: Vec<ImplementationRequest>,
    pub warnings: Vec<Diagnostic>,
}

/// Apply `documents` to a copy of `base`, in order
pub fn apply_overrides(base: &Schema, documents: &[SchemaOverride]) -> Result<MergeOutcome, OverrideError> {
    let mut merger = Merger {
        schema: base.clone(),
        warnings: Vec::new(),
    };
    let mut requests = Vec::new();

    for (position, document) in documents.iter().enumerate() {
        debug!(document = position, "applying schema override");
        merger.apply(document)?;
        requests.extend(document.requests.iter().cloned());
    }

    Ok(MergeOutcome {
        table_groups: merger.schema.table_groups.clone(),
        schema: merger.schema,
        requests,
        warnings: merger.warnings,
    })
}

/// Working copy for a single merge pass
struct Merger {
    schema: Schema,
    warnings: Vec<Diagnostic>,
}

impl Merger {
    fn apply(&mut self, document: &SchemaOverride) -> Result<(), OverrideError> {
        let overrides = &document.overrides;

        for (name, table) in &overrides.add_tables {
            self.add_table(name, table)?;
        }
        for (name, table_override) in &overrides.tables {
            self.override_table(name, table_override)?;
        }
        for (name, relationship) in &overrides.add_relationships {
            self.add_relationship(name, relationship)?;
        }
        for (key, group) in &overrides.table_groups {
            self.add_table_group(key, group)?;
        }

        for request in document.requests.iter().filter(|r| r.status == RequestStatus::Done) {
            self.apply_request(request)?;
        }
        Ok(())
    }

    fn add_table(&mut self, name: &str, table: &Table) -> Result<(), OverrideError> {
        if self.schema.tables.contains_key(name) {
            return Err(OverrideError::TableExists(name.to_string()));
        }
        let mut table = table.clone();
        table.name = name.to_string();
        self.schema.tables.insert(name.to_string(), table);
        Ok(())
    }

    fn override_table(&mut self, name: &str, table_override: &TableOverride) -> Result<(), OverrideError> {
        let table = self
            .schema
            .tables
            .get_mut(name)
            .ok_or_else(|| OverrideError::MissingTable(name.to_string()))?;

        if let Some(comment) = &table_override.comment {
            table.comment = comment.clone();
        }

        for (column_name, column_override) in &table_override.columns {
            let column = table.columns.get_mut(column_name).ok_or_else(|| OverrideError::MissingColumn {
                table: name.to_string(),
                column: column_name.clone(),
            })?;
            if let Some(comment) = &column_override.comment {
                column.comment = comment.clone();
            }
        }

        for (column_name, column) in &table_override.add_columns {
            if table.columns.contains_key(column_name) {
                return Err(OverrideError::ColumnExists {
                    table: name.to_string(),
                    column: column_name.clone(),
                });
            }
            let mut column = column.clone();
            column.name = column_name.clone();
            table.columns.insert(column_name.clone(), column);
        }
        Ok(())
    }

    fn add_relationship(&mut self, name: &str, relationship: &Relationship) -> Result<(), OverrideError> {
        if self.schema.relationships.contains_key(name) {
            return Err(OverrideError::RelationshipExists(name.to_string()));
        }
        self.check_endpoints(name, relationship)?;

        let mut relationship = relationship.clone();
        relationship.name = name.to_string();
        self.schema.relationships.insert(name.to_string(), relationship);
        Ok(())
    }

    fn check_endpoints(&self, name: &str, relationship: &Relationship) -> Result<(), OverrideError> {
        let primary = self
            .schema
            .tables
            .get(&relationship.primary_table_name)
            .ok_or_else(|| OverrideError::MissingPrimaryTable {
                table: relationship.primary_table_name.clone(),
                relationship: name.to_string(),
            })?;
        if !primary.columns.contains_key(&relationship.primary_column_name) {
            return Err(OverrideError::MissingPrimaryColumn {
                column: relationship.primary_column_name.clone(),
                table: relationship.primary_table_name.clone(),
                relationship: name.to_string(),
            });
        }

        let foreign = self
            .schema
            .tables
            .get(&relationship.foreign_table_name)
            .ok_or_else(|| OverrideError::MissingForeignTable {
                table: relationship.foreign_table_name.clone(),
                relationship: name.to_string(),
            })?;
        if !foreign.columns.contains_key(&relationship.foreign_column_name) {
            return Err(OverrideError::MissingForeignColumn {
                column: relationship.foreign_column_name.clone(),
                table: relationship.foreign_table_name.clone(),
                relationship: name.to_string(),
            });
        }
        Ok(())
    }

    fn add_table_group(&mut self, key: &str, group: &TableGroup) -> Result<(), OverrideError> {
        if let Some(missing) = group.tables.iter().find(|t| !self.schema.tables.contains_key(*t)) {
            return Err(OverrideError::MissingGroupTable {
                table: missing.clone(),
                group: key.to_string(),
            });
        }
        self.schema.table_groups.insert(key.to_string(), group.clone());
        Ok(())
    }

    fn apply_request(&mut self, request: &ImplementationRequest) -> Result<(), OverrideError> {
        if let Some(tables) = &request.tables {
            for (name, definition) in &tables.add {
                if self.schema.tables.contains_key(name) {
                    self.skip(request, format!("table {} already exists", name));
                    continue;
                }
                self.add_table(name, &definition.definition)?;
            }
        }

        if let Some(relationships) = &request.relationships {
            for (name, definition) in &relationships.add {
                if self.schema.relationships.contains_key(name) {
                    self.skip(request, format!("relationship {} already exists", name));
                    continue;
                }
                self.add_relationship(name, &definition.definition)?;
            }
        }
        Ok(())
    }

    fn skip(&mut self, request: &ImplementationRequest, reason: String) {
        warn!(request = %request.id, "skipping request item: {}", reason);
        self.warnings.push(Diagnostic::new(
            DiagnosticCode::OverrideRequestSkipped,
            Severity::Warn,
            format!("Request {}: {}, skipped", request.id, reason),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn base() -> Schema {
        Schema::new()
            .with_table(Table::new("users").with_column(Column::new("id", "int4").with_primary(true)))
            .with_table(Table::new("posts").with_column(Column::new("user_id", "int4")))
    }

    #[test]
    fn comments_and_columns() {
        let document = SchemaOverride::from_json(
            r#"{
              "overrides": {
                "tables": {
                  "users": {
                    "comment": "Registered people",
                    "columns": { "id": { "comment": "Surrogate key" } },
                    "addColumns": { "email": { "name": "email", "type": "text", "notNull": true } }
                  }
                }
              }
            }"#,
        )
        .unwrap();
        let outcome = apply_overrides(&base(), &[document]).unwrap();
        let users = &outcome.schema.tables["users"];
        assert_eq!(users.comment.as_deref(), Some("Registered people"));
        assert_eq!(users.columns["id"].comment.as_deref(), Some("Surrogate key"));
        assert!(users.columns["email"].not_null);
        assert_eq!(base().tables["users"].comment, None);
    }

    #[test]
    fn null_comment_clears_and_absent_comment_keeps() {
        let mut schema = base();
        schema.tables["users"].comment = Some("keep".into());
        schema.tables["posts"].comment = Some("drop".into());

        let document = SchemaOverride::from_json(
            r#"{ "overrides": { "tables": { "users": {}, "posts": { "comment": null } } } }"#,
        )
        .unwrap();
        let outcome = apply_overrides(&schema, &[document]).unwrap();
        assert_eq!(outcome.schema.tables["users"].comment.as_deref(), Some("keep"));
        assert_eq!(outcome.schema.tables["posts"].comment, None);
    }

    #[test]
    fn structural_errors_use_exact_messages() {
        let cases = [
            (
                r#"{ "overrides": { "addTables": { "users": { "name": "users" } } } }"#,
                "Table users already exists in the database structure",
            ),
            (
                r#"{ "overrides": { "tables": { "ghosts": { "comment": "x" } } } }"#,
                "Cannot override non-existent table: ghosts",
            ),
            (
                r#"{ "overrides": { "tables": { "users": { "columns": { "age": { "comment": "x" } } } } } }"#,
                "Cannot override non-existent column age in table users",
            ),
            (
                r#"{ "overrides": { "tables": { "users": { "addColumns": { "id": { "name": "id", "type": "int4" } } } } } }"#,
                "Column id already exists in table users",
            ),
            (
                r#"{ "overrides": { "tableGroups": { "core": { "name": "Core", "tables": ["users", "teams"] } } } }"#,
                "Cannot add non-existent table teams to group core",
            ),
        ];
        for (json, message) in cases {
            let document = SchemaOverride::from_json(json).unwrap();
            let error = apply_overrides(&base(), &[document]).unwrap_err();
            assert_eq!(error.to_string(), message);
        }
    }

    #[test]
    fn relationship_endpoints_are_checked() {
        let relationship = |pt: &str, pc: &str, ft: &str, fc: &str| SchemaOverride {
            overrides: Overrides {
                add_relationships: IndexMap::from([(
                    "posts_user".to_string(),
                    Relationship::new("posts_user", (pt, pc), (ft, fc)),
                )]),
                ..Overrides::default()
            },
            requests: Vec::new(),
        };

        let error = |document| apply_overrides(&base(), &[document]).unwrap_err().to_string();
        assert_eq!(
            error(relationship("teams", "id", "posts", "user_id")),
            "Primary table teams does not exist for relationship posts_user"
        );
        assert_eq!(
            error(relationship("users", "uid", "posts", "user_id")),
            "Primary column uid does not exist in table users for relationship posts_user"
        );
        assert_eq!(
            error(relationship("users", "id", "comments", "user_id")),
            "Foreign table comments does not exist for relationship posts_user"
        );
        assert_eq!(
            error(relationship("users", "id", "posts", "author_id")),
            "Foreign column author_id does not exist in table posts for relationship posts_user"
        );

        let outcome = apply_overrides(&base(), &[relationship("users", "id", "posts", "user_id")]).unwrap();
        assert!(outcome.schema.validate_references().is_empty());
    }
}
