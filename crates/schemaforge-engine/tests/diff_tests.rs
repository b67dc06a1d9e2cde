//! Schema diff scenarios over whole schemas

use pretty_assertions::assert_eq;
use schemaforge_core::{Column, Constraint, Index, Relationship, Schema, Table};
use schemaforge_engine::{
    apply_patch, build_schema_diff, build_schema_diff_with_operations, compare, ChangeStatus,
    DiffItem, Operation,
};
use serde_json::json;

fn users() -> Table {
    Table::new("users")
        .with_column(Column::new("id", "int4").with_primary(true))
        .with_column(Column::new("email", "text").with_not_null(true))
        .with_index(Index::new("users_email_idx", vec!["email".into()]).with_type("btree"))
        .with_constraint(Constraint::check("users_email_check", "CHECK (email <> '')"))
}

fn posts() -> Table {
    Table::new("posts")
        .with_column(Column::new("id", "int4").with_primary(true))
        .with_column(Column::new("user_id", "int4"))
}

fn base() -> Schema {
    Schema::new().with_table(users()).with_table(posts()).with_relationship(Relationship::new(
        "users_id_to_posts_user_id",
        ("users", "id"),
        ("posts", "user_id"),
    ))
}

fn summary(items: &[DiffItem]) -> Vec<(&'static str, ChangeStatus)> {
    items.iter().map(|i| (i.kind(), i.status())).collect()
}

#[test]
fn identical_schemas_have_no_diff() {
    assert!(build_schema_diff(&base(), &base()).is_empty());
}

#[test]
fn added_table_is_reported_once() {
    let after = base().with_table(Table::new("teams").with_column(Column::new("id", "int4")));
    let items = build_schema_diff(&base(), &after);
    assert_eq!(summary(&items), vec![("table", ChangeStatus::Added)]);
    let DiffItem::Table { data, table_id, .. } = &items[0] else {
        panic!("expected a table item");
    };
    assert_eq!(table_id, "teams");
    assert_eq!(data.columns.len(), 1);
}

#[test]
fn removed_column_takes_data_from_before() {
    let mut after = base();
    after.tables["users"].columns.shift_remove("email");
    let items = build_schema_diff(&base(), &after);
    assert_eq!(
        items,
        vec![DiffItem::Column {
            status: ChangeStatus::Removed,
            data: Column::new("email", "text").with_not_null(true),
            table_id: "users".into(),
            column_id: "email".into(),
        }]
    );
}

#[test]
fn field_changes_are_scoped_to_their_entity() {
    let mut after = base();
    {
        let users = &mut after.tables["users"];
        users.comment = Some("People".into());
        users.columns["email"].data_type = "varchar".into();
        users.columns["email"].unique = true;
        users.indexes["users_email_idx"].index_type = "hash".into();
        users.constraints["users_email_check"] =
            Constraint::check("users_email_check", "CHECK (length(email) > 3)");
    }
    let items = build_schema_diff(&base(), &after);
    assert_eq!(
        summary(&items),
        vec![
            ("table-comment", ChangeStatus::Modified),
            ("column-type", ChangeStatus::Modified),
            ("column-unique", ChangeStatus::Modified),
            ("index-type", ChangeStatus::Modified),
            ("constraint-detail", ChangeStatus::Modified),
        ]
    );
}

#[test]
fn relationships_follow_tables() {
    let mut after = base();
    after.relationships.clear();
    let items = build_schema_diff(&base(), &after);
    assert_eq!(summary(&items), vec![("relationship", ChangeStatus::Removed)]);
}

#[test]
fn supplied_operations_drive_classification() {
    let before = base();
    let after = apply_patch(
        &before.to_value(),
        &[Operation::replace("/tables/posts/columns/user_id/notNull", json!(true))],
    )
    .unwrap();
    let after = Schema::from_value(after).unwrap();

    let operations = compare(&before.to_value(), &after.to_value());
    assert_eq!(
        build_schema_diff_with_operations(&before, &after, &operations),
        build_schema_diff(&before, &after)
    );

    let unrelated = [Operation::replace("/tables/posts/columns/user_id", json!({}))];
    let items = build_schema_diff_with_operations(&before, &after, &unrelated);
    assert_eq!(summary(&items), vec![("column", ChangeStatus::Modified)]);
}
