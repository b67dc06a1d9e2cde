//! Entity-scoped schema diffs.
//!
//! Every entity (a table, a column's type, an index's column list, ...)
//! is addressed by a stable pointer. Its change status is decided only by
//! operations whose path equals that pointer exactly; operations on
//! parent, sibling or nested paths do not count.

use indexmap::IndexSet;
use schemaforge_core::{Column, Constraint, DefaultValue, Index, Relationship, Schema, Table};
use serde::{Deserialize, Serialize};

use crate::patch::{compare, escape_token, Operation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Added,
    Removed,
    Modified,
    Unchanged,
}

/// One changed entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DiffItem {
    #[serde(rename_all = "camelCase")]
    Table { status: ChangeStatus, data: Table, table_id: String },
    #[serde(rename_all = "camelCase")]
    TableName { status: ChangeStatus, data: String, table_id: String },
    #[serde(rename_all = "camelCase")]
    TableComment { status: ChangeStatus, data: Option<String>, table_id: String },

    #[serde(rename_all = "camelCase")]
    Column { status: ChangeStatus, data: Column, table_id: String, column_id: String },
    #[serde(rename_all = "camelCase")]
    ColumnName { status: ChangeStatus, data: String, table_id: String, column_id: String },
    #[serde(rename_all = "camelCase")]
    ColumnType { status: ChangeStatus, data: String, table_id: String, column_id: String },
    #[serde(rename_all = "camelCase")]
    ColumnDefault {
        status: ChangeStatus,
        data: Option<DefaultValue>,
        table_id: String,
        column_id: String,
    },
    #[serde(rename_all = "camelCase")]
    ColumnCheck { status: ChangeStatus, data: Option<String>, table_id: String, column_id: String },
    #[serde(rename_all = "camelCase")]
    ColumnPrimary { status: ChangeStatus, data: bool, table_id: String, column_id: String },
    #[serde(rename_all = "camelCase")]
    ColumnUnique { status: ChangeStatus, data: bool, table_id: String, column_id: String },
    #[serde(rename_all = "camelCase")]
    ColumnNotNull { status: ChangeStatus, data: bool, table_id: String, column_id: String },
    #[serde(rename_all = "camelCase")]
    ColumnComment { status: ChangeStatus, data: Option<String>, table_id: String, column_id: String },

    #[serde(rename_all = "camelCase")]
    Index { status: ChangeStatus, data: Index, table_id: String, index_id: String },
    #[serde(rename_all = "camelCase")]
    IndexName { status: ChangeStatus, data: String, table_id: String, index_id: String },
    #[serde(rename_all = "camelCase")]
    IndexUnique { status: ChangeStatus, data: bool, table_id: String, index_id: String },
    #[serde(rename_all = "camelCase")]
    IndexColumns { status: ChangeStatus, data: Vec<String>, table_id: String, index_id: String },
    #[serde(rename_all = "camelCase")]
    IndexType { status: ChangeStatus, data: String, table_id: String, index_id: String },

    #[serde(rename_all = "camelCase")]
    Constraint {
        status: ChangeStatus,
        data: Constraint,
        table_id: String,
        constraint_id: String,
    },
    #[serde(rename_all = "camelCase")]
    ConstraintDetail {
        status: ChangeStatus,
        data: String,
        table_id: String,
        constraint_id: String,
    },

    #[serde(rename_all = "camelCase")]
    Relationship { status: ChangeStatus, data: Relationship, relationship_id: String },
}

impl DiffItem {
    pub fn status(&self) -> ChangeStatus {
        match self {
            Self::Table { status, .. }
            | Self::TableName { status, .. }
            | Self::TableComment { status, .. }
            | Self::Column { status, .. }
            | Self::ColumnName { status, .. }
            | Self::ColumnType { status, .. }
            | Self::ColumnDefault { status, .. }
            | Self::ColumnCheck { status, .. }
            | Self::ColumnPrimary { status, .. }
            | Self::ColumnUnique { status, .. }
            | Self::ColumnNotNull { status, .. }
            | Self::ColumnComment { status, .. }
            | Self::Index { status, .. }
            | Self::IndexName { status, .. }
            | Self::IndexUnique { status, .. }
            | Self::IndexColumns { status, .. }
            | Self::IndexType { status, .. }
            | Self::Constraint { status, .. }
            | Self::ConstraintDetail { status, .. }
            | Self::Relationship { status, .. } => *status,
        }
    }

    /// Serialized `kind` tag
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Table { .. } => "table",
            Self::TableName { .. } => "table-name",
            Self::TableComment { .. } => "table-comment",
            Self::Column { .. } => "column",
            Self::ColumnName { .. } => "column-name",
            Self::ColumnType { .. } => "column-type",
            Self::ColumnDefault { .. } => "column-default",
            Self::ColumnCheck { .. } => "column-check",
            Self::ColumnPrimary { .. } => "column-primary",
            Self::ColumnUnique { .. } => "column-unique",
            Self::ColumnNotNull { .. } => "column-not-null",
            Self::ColumnComment { .. } => "column-comment",
            Self::Index { .. } => "index",
            Self::IndexName { .. } => "index-name",
            Self::IndexUnique { .. } => "index-unique",
            Self::IndexColumns { .. } => "index-columns",
            Self::IndexType { .. } => "index-type",
            Self::Constraint { .. } => "constraint",
            Self::ConstraintDetail { .. } => "constraint-detail",
            Self::Relationship { .. } => "relationship",
        }
    }
}

/// Status of the entity at `path` from the operations addressing it exactly
pub fn change_status(operations: &[Operation], path: &str) -> ChangeStatus {
    let (mut added, mut removed, mut replaced) = (false, false, false);
    for operation in operations.iter().filter(|o| o.path() == path) {
        match operation {
            Operation::Add { .. } | Operation::Copy { .. } | Operation::Move { .. } => added = true,
            Operation::Remove { .. } => removed = true,
            Operation::Replace { .. } => replaced = true,
            Operation::Test { .. } => {}
        }
    }
    match (added, removed, replaced) {
        (_, _, true) | (true, true, _) => ChangeStatus::Modified,
        (true, false, false) => ChangeStatus::Added,
        (false, true, false) => ChangeStatus::Removed,
        (false, false, false) => ChangeStatus::Unchanged,
    }
}

/// Resolve the reported status and data of one entity.
///
/// Removals take their data from `before` and are dropped when the entity
/// never existed; everything else takes its data from `after`.
fn resolve<T>(status: ChangeStatus, before: Option<T>, after: Option<T>) -> Option<(ChangeStatus, T)> {
    match status {
        ChangeStatus::Unchanged => None,
        ChangeStatus::Added => match (before.is_some(), after) {
            (false, Some(data)) => Some((ChangeStatus::Added, data)),
            (true, Some(data)) => Some((ChangeStatus::Modified, data)),
            (_, None) => None,
        },
        ChangeStatus::Removed => match (before, after) {
            (Some(data), None) => Some((ChangeStatus::Removed, data)),
            (Some(_), Some(data)) => Some((ChangeStatus::Modified, data)),
            (None, _) => None,
        },
        ChangeStatus::Modified => after.map(|data| (ChangeStatus::Modified, data)),
    }
}

/// Diff two schemas with operations generated by [`compare`]
pub fn build_schema_diff(before: &Schema, after: &Schema) -> Vec<DiffItem> {
    let operations = compare(&before.to_value(), &after.to_value());
    build_schema_diff_with_operations(before, after, &operations)
}

/// Diff two schemas using caller-supplied operations between their
/// serialized forms
pub fn build_schema_diff_with_operations(
    before: &Schema,
    after: &Schema,
    operations: &[Operation],
) -> Vec<DiffItem> {
    let mut builder = DiffBuilder {
        operations,
        items: Vec::new(),
    };

    for table_id in union_keys(before.tables.keys(), after.tables.keys()) {
        builder.table(
            table_id,
            before.tables.get(table_id),
            after.tables.get(table_id),
        );
    }

    for relationship_id in union_keys(before.relationships.keys(), after.relationships.keys()) {
        let path = format!("/relationships/{}", escape_token(relationship_id));
        let status = change_status(operations, &path);
        if let Some((status, data)) = resolve(
            status,
            before.relationships.get(relationship_id).cloned(),
            after.relationships.get(relationship_id).cloned(),
        ) {
            builder.items.push(DiffItem::Relationship {
                status,
                data,
                relationship_id: relationship_id.clone(),
            });
        }
    }

    builder.items
}

/// Keys of `before` in order, then keys only in `after`
fn union_keys<'a>(
    before: impl Iterator<Item = &'a String>,
    after: impl Iterator<Item = &'a String>,
) -> IndexSet<&'a String> {
    before.chain(after).collect()
}

struct DiffBuilder<'a> {
    operations: &'a [Operation],
    items: Vec<DiffItem>,
}

impl DiffBuilder<'_> {
    fn entry<T>(&self, path: &str, before: Option<T>, after: Option<T>) -> Option<(ChangeStatus, T)> {
        resolve(change_status(self.operations, path), before, after)
    }

    fn table(&mut self, table_id: &String, before: Option<&Table>, after: Option<&Table>) {
        let base = format!("/tables/{}", escape_token(table_id));
        let id = || table_id.clone();

        if let Some((status, data)) = self.entry(&base, before.cloned(), after.cloned()) {
            self.items.push(DiffItem::Table { status, data, table_id: id() });
        }
        if let Some((status, data)) = self.entry(
            &format!("{}/name", base),
            before.map(|t| t.name.clone()),
            after.map(|t| t.name.clone()),
        ) {
            self.items.push(DiffItem::TableName { status, data, table_id: id() });
        }
        if let Some((status, data)) = self.entry(
            &format!("{}/comment", base),
            before.map(|t| t.comment.clone()),
            after.map(|t| t.comment.clone()),
        ) {
            self.items.push(DiffItem::TableComment { status, data, table_id: id() });
        }

        let empty = Table::new(table_id.as_str());
        let (old, new) = (before.unwrap_or(&empty), after.unwrap_or(&empty));

        for column_id in union_keys(old.columns.keys(), new.columns.keys()) {
            self.column(
                &base,
                table_id,
                column_id,
                old.columns.get(column_id),
                new.columns.get(column_id),
            );
        }
        for index_id in union_keys(old.indexes.keys(), new.indexes.keys()) {
            self.index(
                &base,
                table_id,
                index_id,
                old.indexes.get(index_id),
                new.indexes.get(index_id),
            );
        }
        for constraint_id in union_keys(old.constraints.keys(), new.constraints.keys()) {
            self.constraint(
                &base,
                table_id,
                constraint_id,
                old.constraints.get(constraint_id),
                new.constraints.get(constraint_id),
            );
        }
    }

    fn column(
        &mut self,
        table_path: &str,
        table_id: &str,
        column_id: &str,
        before: Option<&Column>,
        after: Option<&Column>,
    ) {
        let base = format!("{}/columns/{}", table_path, escape_token(column_id));
        let ids = || (table_id.to_string(), column_id.to_string());
        let field = |name: &str| format!("{}/{}", base, name);

        if let Some((status, data)) = self.entry(&base, before.cloned(), after.cloned()) {
            let (table_id, column_id) = ids();
            self.items.push(DiffItem::Column { status, data, table_id, column_id });
        }
        if let Some((status, data)) = self.entry(
            &field("name"),
            before.map(|c| c.name.clone()),
            after.map(|c| c.name.clone()),
        ) {
            let (table_id, column_id) = ids();
            self.items.push(DiffItem::ColumnName { status, data, table_id, column_id });
        }
        if let Some((status, data)) = self.entry(
            &field("type"),
            before.map(|c| c.data_type.clone()),
            after.map(|c| c.data_type.clone()),
        ) {
            let (table_id, column_id) = ids();
            self.items.push(DiffItem::ColumnType { status, data, table_id, column_id });
        }
        if let Some((status, data)) = self.entry(
            &field("default"),
            before.map(|c| c.default.clone()),
            after.map(|c| c.default.clone()),
        ) {
            let (table_id, column_id) = ids();
            self.items.push(DiffItem::ColumnDefault { status, data, table_id, column_id });
        }
        if let Some((status, data)) = self.entry(
            &field("check"),
            before.map(|c| c.check.clone()),
            after.map(|c| c.check.clone()),
        ) {
            let (table_id, column_id) = ids();
            self.items.push(DiffItem::ColumnCheck { status, data, table_id, column_id });
        }
        if let Some((status, data)) =
            self.entry(&field("primary"), before.map(|c| c.primary), after.map(|c| c.primary))
        {
            let (table_id, column_id) = ids();
            self.items.push(DiffItem::ColumnPrimary { status, data, table_id, column_id });
        }
        if let Some((status, data)) =
            self.entry(&field("unique"), before.map(|c| c.unique), after.map(|c| c.unique))
        {
            let (table_id, column_id) = ids();
            self.items.push(DiffItem::ColumnUnique { status, data, table_id, column_id });
        }
        if let Some((status, data)) =
            self.entry(&field("notNull"), before.map(|c| c.not_null), after.map(|c| c.not_null))
        {
            let (table_id, column_id) = ids();
            self.items.push(DiffItem::ColumnNotNull { status, data, table_id, column_id });
        }
        if let Some((status, data)) = self.entry(
            &field("comment"),
            before.map(|c| c.comment.clone()),
            after.map(|c| c.comment.clone()),
        ) {
            let (table_id, column_id) = ids();
            self.items.push(DiffItem::ColumnComment { status, data, table_id, column_id });
        }
    }

    fn index(
        &mut self,
        table_path: &str,
        table_id: &str,
        index_id: &str,
        before: Option<&Index>,
        after: Option<&Index>,
    ) {
        let base = format!("{}/indexes/{}", table_path, escape_token(index_id));
        let ids = || (table_id.to_string(), index_id.to_string());
        let field = |name: &str| format!("{}/{}", base, name);

        if let Some((status, data)) = self.entry(&base, before.cloned(), after.cloned()) {
            let (table_id, index_id) = ids();
            self.items.push(DiffItem::Index { status, data, table_id, index_id });
        }
        if let Some((status, data)) = self.entry(
            &field("name"),
            before.map(|i| i.name.clone()),
            after.map(|i| i.name.clone()),
        ) {
            let (table_id, index_id) = ids();
            self.items.push(DiffItem::IndexName { status, data, table_id, index_id });
        }
        if let Some((status, data)) =
            self.entry(&field("unique"), before.map(|i| i.unique), after.map(|i| i.unique))
        {
            let (table_id, index_id) = ids();
            self.items.push(DiffItem::IndexUnique { status, data, table_id, index_id });
        }
        if let Some((status, data)) = self.entry(
            &field("columns"),
            before.map(|i| i.columns.clone()),
            after.map(|i| i.columns.clone()),
        ) {
            let (table_id, index_id) = ids();
            self.items.push(DiffItem::IndexColumns { status, data, table_id, index_id });
        }
        if let Some((status, data)) = self.entry(
            &field("type"),
            before.map(|i| i.index_type.clone()),
            after.map(|i| i.index_type.clone()),
        ) {
            let (table_id, index_id) = ids();
            self.items.push(DiffItem::IndexType { status, data, table_id, index_id });
        }
    }

    fn constraint(
        &mut self,
        table_path: &str,
        table_id: &str,
        constraint_id: &str,
        before: Option<&Constraint>,
        after: Option<&Constraint>,
    ) {
        let base = format!("{}/constraints/{}", table_path, escape_token(constraint_id));
        let ids = || (table_id.to_string(), constraint_id.to_string());

        if let Some((status, data)) = self.entry(&base, before.cloned(), after.cloned()) {
            let (table_id, constraint_id) = ids();
            self.items.push(DiffItem::Constraint { status, data, table_id, constraint_id });
        }

        let detail = |constraint: Option<&Constraint>| match constraint {
            Some(Constraint::Check { detail, .. }) => Some(detail.clone()),
            _ => None,
        };
        if let Some((status, data)) = self.entry(&format!("{}/detail", base), detail(before), detail(after)) {
            let (table_id, constraint_id) = ids();
            self.items.push(DiffItem::ConstraintDetail { status, data, table_id, constraint_id });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn with_index(columns: &[&str]) -> Schema {
        Schema::new().with_table(
            Table::new("users").with_index(
                Index::new("idx_users_email", columns.iter().map(|c| c.to_string()).collect())
                    .with_type("btree"),
            ),
        )
    }

    #[test]
    fn status_from_exact_paths_only() {
        let operations = vec![
            Operation::add("/tables/users", json!({ "name": "users" })),
            Operation::replace("/tables/users/comment", json!("x")),
        ];
        assert_eq!(change_status(&operations, "/tables/users"), ChangeStatus::Added);
        assert_eq!(change_status(&operations, "/tables/user"), ChangeStatus::Unchanged);
        assert_eq!(change_status(&operations, "/tables/users/comment"), ChangeStatus::Modified);
        assert_eq!(change_status(&operations, "/tables"), ChangeStatus::Unchanged);

        let both = vec![Operation::remove("/tables/users"), Operation::add("/tables/users", json!({}))];
        assert_eq!(change_status(&both, "/tables/users"), ChangeStatus::Modified);
    }

    #[test]
    fn index_column_change_is_one_item() {
        let items = build_schema_diff(&with_index(&["email"]), &with_index(&["email", "name"]));
        assert_eq!(
            items,
            vec![DiffItem::IndexColumns {
                status: ChangeStatus::Modified,
                data: vec!["email".into(), "name".into()],
                table_id: "users".into(),
                index_id: "idx_users_email".into(),
            }]
        );
    }

    #[test]
    fn reorder_is_modified_with_full_data() {
        let items = build_schema_diff(&with_index(&["a", "b"]), &with_index(&["b", "a"]));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status(), ChangeStatus::Modified);
        assert_eq!(items[0].kind(), "index-columns");
    }

    #[test]
    fn removal_of_unknown_entity_is_suppressed() {
        let operations = vec![Operation::remove("/tables/ghost")];
        let items = build_schema_diff_with_operations(&Schema::new(), &Schema::new(), &operations);
        assert!(items.is_empty());
    }

    #[test]
    fn added_index_columns_take_data_from_after() {
        let operations = vec![Operation::add(
            "/tables/users/indexes/idx_users_email/columns",
            json!(["email"]),
        )];
        let items = build_schema_diff_with_operations(&Schema::new(), &with_index(&["email"]), &operations);
        assert_eq!(
            items,
            vec![DiffItem::IndexColumns {
                status: ChangeStatus::Added,
                data: vec!["email".into()],
                table_id: "users".into(),
                index_id: "idx_users_email".into(),
            }]
        );
    }

    #[test]
    fn serializes_with_kind_tag() {
        let item = DiffItem::ColumnNotNull {
            status: ChangeStatus::Modified,
            data: true,
            table_id: "users".into(),
            column_id: "email".into(),
        };
        assert_eq!(
            serde_json::to_value(&item).unwrap(),
            json!({
                "kind": "column-not-null",
                "status": "modified",
                "data": true,
                "tableId": "users",
                "columnId": "email"
            })
        );
    }
}
