//! tbls JSON introspection documents

pub mod document;

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use schemaforge_core::{
    default_relationship_name, Cardinality, Column, Constraint, DefaultValue, Enum, Index,
    ProcessError, ProcessResult, ReferenceOption, Relationship, Schema, Table,
};
use tracing::debug;

use document::{TblsConstraint, TblsDocument, TblsRelation, TblsTable};

/// Parse a tbls JSON document.
///
/// The document is validated first; an invalid document yields an empty
/// schema and a single error.
pub fn parse(input: &str) -> ProcessResult {
    let document: TblsDocument = match serde_json::from_str(input) {
        Ok(document) => document,
        Err(e) => {
            return ProcessResult::failed(ProcessError::invalid_document(format!(
                "Invalid schema format: {}",
                e
            )))
        }
    };
    convert(document)
}

pub fn convert(document: TblsDocument) -> ProcessResult {
    let mut schema = Schema::new();
    let mut errors = Vec::new();

    for tbls_table in &document.tables {
        debug!(table = %tbls_table.name, "converting tbls table");
        let (table, table_errors) = convert_table(tbls_table);
        errors.extend(table_errors);
        schema = schema.with_table(table);
    }

    for relation in &document.relations {
        match convert_relation(relation) {
            Some(relationship) => schema = schema.with_relationship(relationship),
            None => errors.push(ProcessError::unexpected(format!(
                "Relation between {} and {} has no columns",
                relation.parent_table, relation.table
            ))),
        }
    }

    for tbls_enum in &document.enums {
        let name = tbls_enum
            .name
            .rsplit('.')
            .next()
            .unwrap_or(&tbls_enum.name)
            .to_string();
        schema = schema.with_enum(Enum {
            name,
            values: tbls_enum.values.clone(),
            comment: None,
        });
    }

    ProcessResult::new(schema, errors)
}

fn convert_table(tbls_table: &TblsTable) -> (Table, Vec<ProcessError>) {
    let constraints = &tbls_table.constraints;

    let primary: HashSet<&str> = constraints
        .iter()
        .filter(|c| c.constraint_type == "PRIMARY KEY")
        .flat_map(|c| c.columns.iter().map(String::as_str))
        .collect();
    let unique: HashSet<&str> = constraints
        .iter()
        .filter(|c| c.constraint_type == "UNIQUE" && c.columns.len() == 1)
        .flat_map(|c| c.columns.iter().map(String::as_str))
        .collect();

    let mut table = Table::new(&tbls_table.name);
    table.comment = tbls_table.comment.clone();

    for tbls_column in &tbls_table.columns {
        let name = tbls_column.name.as_str();
        let mut column = Column::new(name, &tbls_column.column_type)
            .with_not_null(!tbls_column.nullable)
            .with_unique(unique.contains(name))
            .with_primary(primary.contains(name));
        column.default = tbls_column.default.as_deref().map(coerce_default);
        column.comment = tbls_column.comment.clone();
        table = table.with_column(column);
    }

    let mut errors = Vec::new();
    for constraint in constraints {
        match convert_constraint(constraint) {
            Ok(Some(c)) => table = table.with_constraint(c),
            Ok(None) => {}
            Err(e) => errors.push(e),
        }
    }

    for tbls_index in &tbls_table.indexes {
        let def = tbls_index.def.to_lowercase();
        let index_type = using_regex()
            .and_then(|re| re.captures(&def))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        table = table.with_index(
            Index::new(&tbls_index.name, tbls_index.columns.clone())
                .with_unique(def.contains("unique"))
                .with_type(index_type),
        );
    }

    (table, errors)
}

fn convert_constraint(constraint: &TblsConstraint) -> Result<Option<Constraint>, ProcessError> {
    let converted = match constraint.constraint_type.as_str() {
        "PRIMARY KEY" if !constraint.columns.is_empty() => {
            Constraint::primary_key(&constraint.name, constraint.columns.clone())
        }
        "UNIQUE" if !constraint.columns.is_empty() => {
            Constraint::unique(&constraint.name, constraint.columns.clone())
        }
        "CHECK" => Constraint::check(&constraint.name, &constraint.def),
        "FOREIGN KEY" => {
            let (Some(column), Some(target_table), Some(target_column)) = (
                constraint.columns.first(),
                constraint.referenced_table.as_ref(),
                constraint.referenced_columns.first(),
            ) else {
                return Err(ProcessError::unexpected(format!(
                    "Invalid foreign key constraint: {}",
                    constraint.name
                )));
            };
            let (update, delete) = foreign_key_actions(&constraint.def);
            Constraint::ForeignKey {
                name: constraint.name.clone(),
                column_name: column.clone(),
                target_table_name: target_table.clone(),
                target_column_name: target_column.clone(),
                update_constraint: update,
                delete_constraint: delete,
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(converted))
}

fn convert_relation(relation: &TblsRelation) -> Option<Relationship> {
    let parent_column = relation.parent_columns.first()?;
    let column = relation.columns.first()?;

    let cardinality = match relation.cardinality.as_deref() {
        Some("zero_or_one") => Cardinality::OneToOne,
        _ => Cardinality::OneToMany,
    };
    let (update, delete) = foreign_key_actions(&relation.def);

    Some(
        Relationship::new(
            default_relationship_name(&relation.parent_table, parent_column, &relation.table, column),
            (relation.parent_table.as_str(), parent_column.as_str()),
            (relation.table.as_str(), column.as_str()),
        )
        .with_cardinality(cardinality)
        .with_actions(update, delete),
    )
}

fn using_regex() -> Option<&'static Regex> {
    static USING: OnceLock<Option<Regex>> = OnceLock::new();
    USING.get_or_init(|| Regex::new(r"using\s+(\w+)").ok()).as_ref()
}

fn action_regex(kind: &'static str) -> Option<&'static Regex> {
    const FK_ACTIONS: &str = "SET NULL|SET DEFAULT|RESTRICT|CASCADE|NO ACTION";
    static UPDATE: OnceLock<Option<Regex>> = OnceLock::new();
    static DELETE: OnceLock<Option<Regex>> = OnceLock::new();
    let cell = if kind == "UPDATE" { &UPDATE } else { &DELETE };
    cell.get_or_init(|| Regex::new(&format!("ON {} ({})", kind, FK_ACTIONS)).ok())
        .as_ref()
}

/// ON UPDATE / ON DELETE actions from a constraint definition
pub fn foreign_key_actions(def: &str) -> (ReferenceOption, ReferenceOption) {
    let find = |kind| {
        action_regex(kind)
            .and_then(|re| re.captures(def))
            .and_then(|c| c.get(1))
            .and_then(|m| ReferenceOption::from_sql(m.as_str()))
            .unwrap_or_default()
    };
    (find("UPDATE"), find("DELETE"))
}

/// Numbers and booleans written as strings become typed defaults.
///
/// A blank default reads as the number 0.
fn coerce_default(value: &str) -> DefaultValue {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return DefaultValue::Integer(0);
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return DefaultValue::Integer(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if f.is_finite() {
            return DefaultValue::Float(f);
        }
    }
    match value.to_lowercase().as_str() {
        "true" => DefaultValue::Boolean(true),
        "false" => DefaultValue::Boolean(false),
        _ => DefaultValue::String(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn document() -> serde_json::Value {
        json!({
            "name": "app",
            "tables": [
                {
                    "name": "users",
                    "type": "BASE TABLE",
                    "comment": "All users",
                    "columns": [
                        {"name": "id", "type": "bigint", "nullable": false},
                        {"name": "email", "type": "varchar(255)", "nullable": false},
                        {"name": "age", "type": "int", "nullable": true, "default": "18"},
                        {"name": "active", "type": "boolean", "nullable": true, "default": "TRUE"},
                        {"name": "status", "type": "text", "nullable": true, "default": "'draft'::text"}
                    ],
                    "indexes": [
                        {"name": "users_email_key", "def": "CREATE UNIQUE INDEX users_email_key ON public.users USING btree (email)", "table": "users", "columns": ["email"]}
                    ],
                    "constraints": [
                        {"name": "users_pkey", "type": "PRIMARY KEY", "def": "PRIMARY KEY (id)", "table": "users", "columns": ["id"]},
                        {"name": "users_email_key", "type": "UNIQUE", "def": "UNIQUE (email)", "table": "users", "columns": ["email"]},
                        {"name": "users_age_check", "type": "CHECK", "def": "CHECK ((age >= 0))", "table": "users"}
                    ]
                },
                {
                    "name": "posts",
                    "type": "BASE TABLE",
                    "columns": [
                        {"name": "id", "type": "bigint", "nullable": false},
                        {"name": "user_id", "type": "bigint", "nullable": false}
                    ],
                    "constraints": [
                        {
                            "name": "posts_user_id_fkey",
                            "type": "FOREIGN KEY",
                            "def": "FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE",
                            "table": "posts",
                            "columns": ["user_id"],
                            "referenced_table": "users",
                            "referenced_columns": ["id"]
                        }
                    ]
                }
            ],
            "relations": [
                {
                    "table": "posts",
                    "columns": ["user_id"],
                    "parent_table": "users",
                    "parent_columns": ["id"],
                    "cardinality": "zero_or_more",
                    "parent_cardinality": "exactly_one",
                    "def": "FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE"
                }
            ],
            "enums": [{"name": "public.mood", "values": ["sad", "happy"]}]
        })
    }

    #[test]
    fn converts_tables_and_columns() {
        let result = parse(&document().to_string());
        assert!(result.is_clean(), "{:?}", result.errors);

        let users = &result.value.tables["users"];
        assert_eq!(users.comment.as_deref(), Some("All users"));
        assert!(users.columns["id"].primary && users.columns["id"].not_null);
        assert!(users.columns["email"].unique);
        assert_eq!(users.columns["age"].default, Some(DefaultValue::Integer(18)));
        assert_eq!(users.columns["active"].default, Some(DefaultValue::Boolean(true)));
        assert_eq!(
            users.columns["status"].default,
            Some(DefaultValue::String("'draft'::text".into()))
        );

        let index = &users.indexes["users_email_key"];
        assert!(index.unique);
        assert_eq!(index.index_type, "btree");
        assert_eq!(
            users.constraints["users_age_check"],
            Constraint::check("users_age_check", "CHECK ((age >= 0))")
        );
        assert_eq!(result.value.enums["mood"].values, vec!["sad", "happy"]);
    }

    #[test]
    fn foreign_key_actions_come_from_def() {
        let result = parse(&document().to_string());
        let relationship = &result.value.relationships["users_id_to_posts_user_id"];
        assert_eq!(relationship.delete_constraint, ReferenceOption::Cascade);
        assert_eq!(relationship.update_constraint, ReferenceOption::NoAction);
        assert_eq!(relationship.cardinality, Cardinality::OneToMany);

        match &result.value.tables["posts"].constraints["posts_user_id_fkey"] {
            Constraint::ForeignKey { delete_constraint, .. } => {
                assert_eq!(*delete_constraint, ReferenceOption::Cascade)
            }
            other => panic!("expected foreign key, got {:?}", other),
        }
    }

    #[test]
    fn action_extraction() {
        assert_eq!(
            foreign_key_actions("FOREIGN KEY (x) REFERENCES y(id) ON UPDATE SET NULL ON DELETE RESTRICT"),
            (ReferenceOption::SetNull, ReferenceOption::Restrict)
        );
        assert_eq!(
            foreign_key_actions("FOREIGN KEY (x) REFERENCES y(id)"),
            (ReferenceOption::NoAction, ReferenceOption::NoAction)
        );
    }

    #[test]
    fn invalid_document_fails_closed() {
        let result = parse(r#"{"tables": [{"name": "users"}]}"#);
        assert!(result.value.tables.is_empty());
        assert!(result.value.enums.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert!(matches!(result.errors[0], ProcessError::InvalidDocument { .. }));

        let result = parse("not json");
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn default_coercion() {
        assert_eq!(coerce_default("1.5"), DefaultValue::Float(1.5));
        assert_eq!(coerce_default("-3"), DefaultValue::Integer(-3));
        assert_eq!(coerce_default("false"), DefaultValue::Boolean(false));
        assert_eq!(coerce_default("now()"), DefaultValue::String("now()".into()));
        assert_eq!(coerce_default("inf"), DefaultValue::String("inf".into()));
        assert_eq!(coerce_default(""), DefaultValue::Integer(0));
        assert_eq!(coerce_default("  "), DefaultValue::Integer(0));
    }

    #[test]
    fn only_zero_or_one_is_one_to_one() {
        let relation = |cardinality: &str| TblsRelation {
            table: "posts".into(),
            columns: vec!["user_id".into()],
            parent_table: "users".into(),
            parent_columns: vec!["id".into()],
            cardinality: Some(cardinality.into()),
            parent_cardinality: None,
            def: String::new(),
        };
        let cardinality = |name: &str| convert_relation(&relation(name)).map(|r| r.cardinality);

        assert_eq!(cardinality("zero_or_one"), Some(Cardinality::OneToOne));
        assert_eq!(cardinality("exactly_one"), Some(Cardinality::OneToMany));
        assert_eq!(cardinality("zero_or_more"), Some(Cardinality::OneToMany));
        assert_eq!(cardinality("one_or_more"), Some(Cardinality::OneToMany));
    }
}
