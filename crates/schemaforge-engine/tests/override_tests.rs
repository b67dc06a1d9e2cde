//! Multi-document override merges

use pretty_assertions::assert_eq;
use schemaforge_core::{Column, DiagnosticCode, Schema, Table};
use schemaforge_engine::{apply_overrides, OverrideError, RequestStatus, SchemaOverride};

fn base() -> Schema {
    Schema::new()
        .with_table(Table::new("users").with_column(Column::new("id", "int4").with_primary(true)))
}

#[test]
fn later_documents_see_earlier_effects() {
    let first = SchemaOverride::from_json(
        r#"{
          "overrides": {
            "addTables": {
              "posts": {
                "name": "posts",
                "columns": { "user_id": { "name": "user_id", "type": "int4" } }
              }
            },
            "tableGroups": { "core": { "name": "Core", "tables": ["users"] } }
          }
        }"#,
    )
    .unwrap();
    let second = SchemaOverride::from_json(
        r#"{
          "overrides": {
            "tables": { "posts": { "comment": "Written by users" } },
            "addRelationships": {
              "posts_author": {
                "name": "posts_author",
                "primaryTableName": "users",
                "primaryColumnName": "id",
                "foreignTableName": "posts",
                "foreignColumnName": "user_id",
                "cardinality": "ONE_TO_MANY"
              }
            },
            "tableGroups": { "core": { "name": "Core", "tables": ["users", "posts"] } }
          }
        }"#,
    )
    .unwrap();

    let outcome = apply_overrides(&base(), &[first, second]).unwrap();
    assert_eq!(outcome.schema.tables["posts"].comment.as_deref(), Some("Written by users"));
    assert!(outcome.schema.relationships.contains_key("posts_author"));
    assert_eq!(outcome.table_groups["core"].tables, vec!["users", "posts"]);
    assert_eq!(outcome.schema.table_groups, outcome.table_groups);
}

#[test]
fn order_matters_across_documents() {
    let comment = SchemaOverride::from_json(r#"{ "overrides": { "tables": { "posts": { "comment": "x" } } } }"#)
        .unwrap();
    let add = SchemaOverride::from_json(
        r#"{ "overrides": { "addTables": { "posts": { "name": "posts" } } } }"#,
    )
    .unwrap();

    assert!(apply_overrides(&base(), &[add.clone(), comment.clone()]).is_ok());
    assert_eq!(
        apply_overrides(&base(), &[comment, add]),
        Err(OverrideError::MissingTable("posts".into()))
    );
}

#[test]
fn only_done_requests_are_applied() {
    let document = SchemaOverride::from_json(
        r#"{
          "requests": [
            {
              "id": "req-1",
              "description": "Add teams",
              "status": "done",
              "tables": { "add": {
                "teams": { "definition": { "name": "teams", "columns": { "id": { "name": "id", "type": "int4" } } } },
                "users": { "definition": { "name": "users" } }
              } }
            },
            {
              "id": "req-2",
              "description": "Add projects",
              "status": "in_progress",
              "tables": { "add": { "projects": { "definition": { "name": "projects" } } } }
            }
          ]
        }"#,
    )
    .unwrap();

    let outcome = apply_overrides(&base(), &[document]).unwrap();
    assert!(outcome.schema.tables.contains_key("teams"));
    assert!(!outcome.schema.tables.contains_key("projects"));
    assert_eq!(outcome.schema.tables["users"].columns.len(), 1);

    assert_eq!(outcome.requests.len(), 2);
    assert_eq!(outcome.requests[1].status, RequestStatus::InProgress);
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].code, DiagnosticCode::OverrideRequestSkipped);
}

#[test]
fn toml_documents_load_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("overrides.toml");
    std::fs::write(
        &path,
        r#"
[overrides.tables.users]
comment = "Everyone who signs in"

[overrides.tables.users.columns.id]
comment = "Primary key"

[overrides.tableGroups.auth]
name = "Auth"
tables = ["users"]
"#,
    )
    .unwrap();

    let document = SchemaOverride::from_file(&path).unwrap();
    let outcome = apply_overrides(&base(), &[document]).unwrap();
    let users = &outcome.schema.tables["users"];
    assert_eq!(users.comment.as_deref(), Some("Everyone who signs in"));
    assert_eq!(users.columns["id"].comment.as_deref(), Some("Primary key"));
    assert_eq!(outcome.table_groups["auth"].name, "Auth");

    assert!(matches!(
        SchemaOverride::from_file(&dir.path().join("missing.json")),
        Err(OverrideError::Io(_))
    ));
}
