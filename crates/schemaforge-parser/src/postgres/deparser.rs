//! Unified schema back to PostgreSQL DDL.
//!
//! Statement order: CREATE TABLE, CREATE INDEX, ALTER TABLE ADD
//! CONSTRAINT for foreign keys, then COMMENT ON.

use schemaforge_core::{Column, Constraint, DefaultValue, ProcessError, ReferenceOption, Relationship, Schema, Table};

/// Deparsed statements and the schema items that could not be rendered
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Deparsed {
    pub statements: Vec<String>,
    pub errors: Vec<ProcessError>,
}

impl Deparsed {
    /// All statements separated by blank lines
    pub fn to_sql(&self) -> String {
        self.statements.join("\n\n")
    }
}

const RESERVED: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric", "both", "case",
    "cast", "check", "collate", "column", "constraint", "create", "current_date", "current_role",
    "current_time", "current_timestamp", "current_user", "default", "deferrable", "desc",
    "distinct", "do", "else", "end", "except", "false", "fetch", "for", "foreign", "from", "grant",
    "group", "having", "in", "initially", "intersect", "into", "lateral", "leading", "limit",
    "localtime", "localtimestamp", "not", "null", "offset", "on", "only", "or", "order", "placing",
    "primary", "references", "returning", "select", "session_user", "some", "symmetric", "table",
    "then", "to", "trailing", "true", "union", "unique", "user", "using", "variadic", "when",
    "where", "window", "with",
];

/// Quote an identifier unless it is a plain lower-case, non-reserved name
pub fn quote_identifier(name: &str) -> String {
    let plain = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '$')
        && !RESERVED.contains(&name);

    if plain {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// Type names the server knows without quoting, in any letter case
const BUILTIN_TYPES: &[&str] = &[
    "bigint", "bigserial", "bit", "bool", "boolean", "bpchar", "bytea", "char", "character",
    "cidr", "date", "dec", "decimal", "double", "float", "float4", "float8", "inet", "int",
    "int2", "int4", "int8", "integer", "interval", "json", "jsonb", "macaddr", "money",
    "numeric", "real", "serial", "smallint", "smallserial", "text", "time", "timestamp",
    "timestamptz", "timetz", "tsquery", "tsvector", "uuid", "varbit", "varchar", "xml",
];

/// Column type as written, with user-defined type names quoted when they
/// would otherwise fold to lower case
fn render_type(data_type: &str) -> String {
    let split = data_type.find(['(', '[']).unwrap_or(data_type.len());
    let (name, suffix) = data_type.split_at(split);
    let name = name.trim_end();

    let first_word = name.split_whitespace().next().unwrap_or_default().to_ascii_lowercase();
    if !name.chars().any(|c| c.is_ascii_uppercase()) || BUILTIN_TYPES.contains(&first_word.as_str()) {
        return data_type.to_string();
    }

    let quoted: Vec<String> = name.split('.').map(quote_identifier).collect();
    format!("{}{}", quoted.join("."), suffix)
}

fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn default_literal(value: &DefaultValue) -> String {
    match value {
        DefaultValue::Boolean(b) => b.to_string().to_uppercase(),
        other => other.to_sql_literal(),
    }
}

/// Render a schema as DDL statements
pub fn deparse(schema: &Schema) -> Deparsed {
    let mut deparsed = Deparsed::default();

    for table in schema.tables.values() {
        deparsed.statements.push(create_table(table));
    }

    for table in schema.tables.values() {
        for index in table.indexes.values() {
            if index.columns.is_empty() {
                deparsed.errors.push(ProcessError::unexpected(format!(
                    "Index {} on table {} has no columns",
                    index.name, table.name
                )));
                continue;
            }
            let columns: Vec<String> = index.columns.iter().map(|c| quote_identifier(c)).collect();
            let using = if index.index_type.is_empty() {
                String::new()
            } else {
                format!(" USING {}", index.index_type)
            };
            deparsed.statements.push(format!(
                "CREATE {}INDEX {} ON {}{} ({});",
                if index.unique { "UNIQUE " } else { "" },
                quote_identifier(&index.name),
                quote_identifier(&table.name),
                using,
                columns.join(", ")
            ));
        }
    }

    for relationship in schema.relationships.values() {
        deparsed.statements.push(add_foreign_key(relationship));
    }

    for table in schema.tables.values() {
        if let Some(comment) = &table.comment {
            deparsed.statements.push(format!(
                "COMMENT ON TABLE {} IS {};",
                quote_identifier(&table.name),
                quote_literal(comment)
            ));
        }
        for column in table.columns.values() {
            if let Some(comment) = &column.comment {
                deparsed.statements.push(format!(
                    "COMMENT ON COLUMN {}.{} IS {};",
                    quote_identifier(&table.name),
                    quote_identifier(&column.name),
                    quote_literal(comment)
                ));
            }
        }
    }

    deparsed
}

fn create_table(table: &Table) -> String {
    let primary_columns: Vec<&Column> = table.columns.values().filter(|c| c.primary).collect();
    let composite_key = primary_columns.len() > 1;

    let mut lines: Vec<String> = table
        .columns
        .values()
        .map(|column| column_definition(table, column, composite_key))
        .collect();

    if composite_key {
        let name = table
            .constraints
            .values()
            .find_map(|c| match c {
                Constraint::PrimaryKey { name, column_names } if column_names.len() > 1 => Some(name.clone()),
                _ => None,
            })
            .unwrap_or_else(|| format!("{}_pkey", table.name));
        let columns: Vec<String> = primary_columns.iter().map(|c| quote_identifier(&c.name)).collect();
        lines.push(format!(
            "CONSTRAINT {} PRIMARY KEY ({})",
            quote_identifier(&name),
            columns.join(", ")
        ));
    }

    for constraint in table.constraints.values() {
        match constraint {
            Constraint::Unique { name, column_names } if column_names.len() > 1 => {
                let columns: Vec<String> = column_names.iter().map(|c| quote_identifier(c)).collect();
                lines.push(format!(
                    "CONSTRAINT {} UNIQUE ({})",
                    quote_identifier(name),
                    columns.join(", ")
                ));
            }
            Constraint::Check { name, detail } => {
                lines.push(format!("CONSTRAINT {} {}", quote_identifier(name), detail));
            }
            _ => {}
        }
    }

    format!(
        "CREATE TABLE {} (\n  {}\n);",
        quote_identifier(&table.name),
        lines.join(",\n  ")
    )
}

fn column_definition(table: &Table, column: &Column, composite_key: bool) -> String {
    let mut definition = format!("{} {}", quote_identifier(&column.name), render_type(&column.data_type));

    if let Some(default) = &column.default {
        definition.push_str(&format!(" DEFAULT {}", default_literal(default)));
    }

    let inline_primary = column.primary && !composite_key;
    if inline_primary {
        definition.push_str(" PRIMARY KEY");
    }
    if column.not_null && !inline_primary {
        definition.push_str(" NOT NULL");
    }
    if column.unique && !inline_primary {
        definition.push_str(" UNIQUE");
    }

    // A column-level check is only rendered when no named constraint carries it
    if let Some(check) = &column.check {
        let covered = table
            .constraints
            .values()
            .any(|c| matches!(c, Constraint::Check { detail, .. } if detail == check));
        if !covered {
            definition.push(' ');
            definition.push_str(check);
        }
    }

    definition
}

fn add_foreign_key(relationship: &Relationship) -> String {
    let mut statement = format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
        quote_identifier(&relationship.foreign_table_name),
        quote_identifier(&relationship.name),
        quote_identifier(&relationship.foreign_column_name),
        quote_identifier(&relationship.primary_table_name),
        quote_identifier(&relationship.primary_column_name),
    );
    if relationship.update_constraint != ReferenceOption::NoAction {
        statement.push_str(&format!(" ON UPDATE {}", relationship.update_constraint.as_sql()));
    }
    if relationship.delete_constraint != ReferenceOption::NoAction {
        statement.push_str(&format!(" ON DELETE {}", relationship.delete_constraint.as_sql()));
    }
    statement.push(';');
    statement
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use schemaforge_core::{Index, Relationship};

    fn sample() -> Schema {
        Schema::new()
            .with_table(
                Table::new("users")
                    .with_column(Column::new("id", "int8").with_primary(true))
                    .with_column(Column::new("email", "varchar").with_not_null(true).with_unique(true))
                    .with_column(Column::new("role", "text").with_default("member"))
                    .with_comment("Registered users"),
            )
            .with_table(
                Table::new("posts")
                    .with_column(Column::new("id", "int8").with_primary(true))
                    .with_column(Column::new("user_id", "int8").with_comment("Author's id"))
                    .with_index(Index::new("idx_posts_user", vec!["user_id".into()]).with_type("btree")),
            )
            .with_relationship(
                Relationship::new("posts_user_fk", ("users", "id"), ("posts", "user_id"))
                    .with_actions(ReferenceOption::NoAction, ReferenceOption::SetNull),
            )
    }

    #[test]
    fn statements_are_ordered_by_kind() {
        let deparsed = deparse(&sample());
        assert!(deparsed.errors.is_empty());
        let kinds: Vec<&str> = deparsed
            .statements
            .iter()
            .map(|s| s.split_whitespace().take(2).last().unwrap_or(""))
            .collect();
        assert_eq!(kinds, vec!["TABLE", "TABLE", "INDEX", "TABLE", "ON", "ON"]);
    }

    #[test]
    fn create_table_renders_column_flags() {
        let deparsed = deparse(&sample());
        assert_eq!(
            deparsed.statements[0],
            "CREATE TABLE users (\n  id int8 PRIMARY KEY,\n  email varchar NOT NULL UNIQUE,\n  role text DEFAULT 'member'\n);"
        );
    }

    #[test]
    fn foreign_keys_and_comments() {
        let deparsed = deparse(&sample());
        assert_eq!(
            deparsed.statements[3],
            "ALTER TABLE posts ADD CONSTRAINT posts_user_fk FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE SET NULL;"
        );
        assert_eq!(
            deparsed.statements[5],
            "COMMENT ON COLUMN posts.user_id IS 'Author''s id';"
        );
    }

    #[test]
    fn composite_primary_key_becomes_table_constraint() {
        let schema = Schema::new().with_table(
            Table::new("memberships")
                .with_column(Column::new("user_id", "int4").with_primary(true))
                .with_column(Column::new("org_id", "int4").with_primary(true))
                .with_constraint(Constraint::primary_key(
                    "memberships_pk",
                    vec!["user_id".into(), "org_id".into()],
                )),
        );
        let sql = deparse(&schema).to_sql();
        assert!(sql.contains("user_id int4 NOT NULL UNIQUE"));
        assert!(sql.contains("CONSTRAINT memberships_pk PRIMARY KEY (user_id, org_id)"));
    }

    #[test]
    fn types_are_rendered_as_written() {
        assert_eq!(render_type("int8"), "int8");
        assert_eq!(render_type("varchar(255)"), "varchar(255)");
        assert_eq!(render_type("VARCHAR(255)"), "VARCHAR(255)");
        assert_eq!(render_type("TIMESTAMP WITH TIME ZONE"), "TIMESTAMP WITH TIME ZONE");
        assert_eq!(render_type("mood"), "mood");
        assert_eq!(render_type("Role"), "\"Role\"");
        assert_eq!(render_type("Role[]"), "\"Role\"[]");
        assert_eq!(render_type("public.Role"), "public.\"Role\"");
    }

    #[test]
    fn identifiers_are_quoted_when_needed() {
        assert_eq!(quote_identifier("users"), "users");
        assert_eq!(quote_identifier("user"), "\"user\"");
        assert_eq!(quote_identifier("CamelCase"), "\"CamelCase\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }
}
