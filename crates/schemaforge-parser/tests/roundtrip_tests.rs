//! Deparse/parse round trips and DDL validity

use pretty_assertions::assert_eq;
use schemaforge_core::{Cardinality, ReferenceOption, Schema};
use schemaforge_parser::{deparse, deparse_operations, postgres};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

const DDL: &str = r#"
CREATE TABLE users (
    id SERIAL PRIMARY KEY,
    email VARCHAR(255) NOT NULL UNIQUE,
    display_name TEXT DEFAULT 'anonymous',
    active BOOLEAN NOT NULL DEFAULT true,
    age INTEGER CHECK (age >= 0)
);

CREATE TABLE posts (
    id BIGINT NOT NULL,
    revision INTEGER NOT NULL,
    author_id INTEGER NOT NULL,
    title TEXT,
    CONSTRAINT posts_pkey PRIMARY KEY (id, revision),
    CONSTRAINT posts_author_fk FOREIGN KEY (author_id) REFERENCES users (id) ON DELETE CASCADE
);

CREATE INDEX posts_author_idx ON posts USING btree (author_id);
CREATE UNIQUE INDEX posts_title_key ON posts (title);

COMMENT ON TABLE users IS 'People who sign in';
COMMENT ON COLUMN users.display_name IS 'Shown in the owner''s profile';
"#;

fn parsed() -> Schema {
    let result = postgres::parse(DDL);
    assert!(result.is_clean(), "{:?}", result.errors);
    result.value
}

fn assert_same_structure(before: &Schema, after: &Schema) {
    assert_eq!(
        before.tables.keys().collect::<Vec<_>>(),
        after.tables.keys().collect::<Vec<_>>()
    );
    for (name, table) in &before.tables {
        let other = &after.tables[name];
        assert_eq!(table.columns.keys().collect::<Vec<_>>(), other.columns.keys().collect::<Vec<_>>());
        for (column_name, column) in &table.columns {
            let round_tripped = &other.columns[column_name];
            assert_eq!(column.data_type, round_tripped.data_type, "{}.{}", name, column_name);
            assert_eq!(column.not_null, round_tripped.not_null, "{}.{}", name, column_name);
            assert_eq!(column.unique, round_tripped.unique, "{}.{}", name, column_name);
            assert_eq!(column.primary, round_tripped.primary, "{}.{}", name, column_name);
        }
    }

    let endpoints = |schema: &Schema| {
        schema
            .relationships
            .values()
            .map(|r| {
                (
                    r.primary_table_name.clone(),
                    r.primary_column_name.clone(),
                    r.foreign_table_name.clone(),
                    r.foreign_column_name.clone(),
                )
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(endpoints(before), endpoints(after));
}

#[test]
fn deparse_then_parse_preserves_structure() {
    let schema = parsed();
    let sql = deparse(&schema).to_sql();

    let reparsed = postgres::parse(&sql);
    assert!(reparsed.is_clean(), "{:?}\n{}", reparsed.errors, sql);
    assert_same_structure(&schema, &reparsed.value);

    let relationship = reparsed.value.relationships.values().next().unwrap();
    assert_eq!(relationship.delete_constraint, ReferenceOption::Cascade);
    assert_eq!(relationship.cardinality, Cardinality::OneToMany);
    assert_eq!(
        reparsed.value.tables["users"].columns["display_name"].comment.as_deref(),
        Some("Shown in the owner's profile")
    );
}

#[test]
fn deparsed_ddl_is_valid_postgres() {
    let deparsed = deparse(&parsed());
    assert!(deparsed.errors.is_empty());

    for statement in &deparsed.statements {
        if let Err(e) = Parser::parse_sql(&PostgreSqlDialect {}, statement) {
            panic!("invalid statement: {}\n{}", e, statement);
        }
    }
}

#[test]
fn statement_order_is_tables_indexes_foreign_keys_comments() {
    let statements = deparse(&parsed()).statements;
    let kind = |s: &String| {
        if s.starts_with("CREATE TABLE") {
            0
        } else if s.starts_with("CREATE") {
            1
        } else if s.starts_with("ALTER TABLE") {
            2
        } else {
            3
        }
    };
    let kinds: Vec<u8> = statements.iter().map(kind).collect();
    let mut sorted = kinds.clone();
    sorted.sort();
    assert_eq!(kinds, sorted);
}

#[test]
fn second_round_trip_is_stable() {
    let once = deparse(&parsed()).to_sql();
    let twice = deparse(&postgres::parse(&once).value).to_sql();
    assert_eq!(once, twice);
}

#[test]
fn user_defined_and_mixed_case_types_survive_round_trip() {
    let ddl = r#"
CREATE TABLE accounts (
    id int8 PRIMARY KEY,
    role "Role" NOT NULL,
    mood mood,
    tags "Tag"[],
    created_at TIMESTAMP WITH TIME ZONE
);
"#;
    let schema = postgres::parse(ddl).value;
    let accounts = &schema.tables["accounts"];
    assert_eq!(accounts.columns["role"].data_type, "Role");
    assert_eq!(accounts.columns["mood"].data_type, "mood");
    assert_eq!(accounts.columns["tags"].data_type, "Tag");
    assert_eq!(accounts.columns["created_at"].data_type, "timestamptz");

    let sql = deparse(&schema).to_sql();
    assert!(sql.contains("role \"Role\" NOT NULL"), "{}", sql);
    assert!(sql.contains("mood mood"), "{}", sql);

    let reparsed = postgres::parse(&sql);
    assert!(reparsed.is_clean(), "{:?}\n{}", reparsed.errors, sql);
    assert_same_structure(&schema, &reparsed.value);
}

#[test]
fn uppercase_builtin_types_stay_unquoted() {
    let mut schema = parsed();
    if let Some(column) = schema
        .tables
        .get_mut("users")
        .and_then(|users| users.columns.get_mut("email"))
    {
        column.data_type = "VARCHAR(255)".to_string();
    }
    let sql = deparse(&schema).to_sql();
    assert!(sql.contains("email VARCHAR(255) NOT NULL UNIQUE"), "{}", sql);
    assert_eq!(postgres::parse(&sql).value.tables["users"].columns["email"].data_type, "varchar");
}

#[test]
fn schema_changes_become_migration_ddl() {
    let before = postgres::parse("CREATE TABLE users (id SERIAL PRIMARY KEY, nickname TEXT);").value;
    let after = postgres::parse(
        "CREATE TABLE users (id SERIAL PRIMARY KEY, age INTEGER NOT NULL DEFAULT 0);\n\
         CREATE TABLE tags (id SERIAL PRIMARY KEY, label TEXT);\n\
         COMMENT ON TABLE tags IS 'Free-form labels';",
    )
    .value;

    let operations = schemaforge_engine::compare(&before.to_value(), &after.to_value());
    let deparsed = deparse_operations(&operations);
    let sql = deparsed.to_sql();

    assert!(sql.contains("ALTER TABLE \"users\" DROP COLUMN \"nickname\";"), "{sql}");
    assert!(
        sql.contains("ALTER TABLE \"users\" ADD COLUMN \"age\" int4 NOT NULL DEFAULT 0;"),
        "{sql}"
    );
    assert!(sql.contains("CREATE TABLE \"tags\" ("), "{sql}");
    assert!(sql.contains("COMMENT ON TABLE \"tags\" IS 'Free-form labels';"), "{sql}");

    let statements = Parser::parse_sql(&PostgreSqlDialect {}, &sql).unwrap();
    assert_eq!(statements.len(), 4);
}
