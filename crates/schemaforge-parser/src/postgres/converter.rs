//! Statement AST to unified schema.
//!
//! Conversion runs in three passes over the parsed statements:
//! 1. CREATE TABLE and CREATE INDEX, in document order
//! 2. ALTER TABLE, attaching constraints and columns to known tables
//! 3. COMMENT ON
//!
//! Each pass folds statements into a [`Partial`] value; the passes are
//! joined in order and one-to-one relationships are promoted last.

use schemaforge_core::{
    default_relationship_name, handle_one_to_one_relationships, Column, Constraint, DefaultValue,
    Index, ProcessError, ProcessResult, ReferenceOption, Relationship, Relationships, Schema, Table,
    Tables,
};
use sqlparser::ast::{
    AlterTableOperation, ArrayElemTypeDef, ColumnDef, ColumnOption, CommentObject, CreateIndex,
    CreateTable, DataType, Expr, Ident, ObjectName, ReferentialAction, Statement, TableConstraint,
    UnaryOperator, Value,
};
use tracing::{debug, warn};

use super::check::check_detail;
use super::statements::{CheckSites, ParsedStatement};

/// Schema state accumulated by a conversion pass
#[derive(Debug, Default)]
struct Partial {
    tables: Tables,
    relationships: Relationships,
    errors: Vec<ProcessError>,
}

impl Partial {
    fn with_error(mut self, error: ProcessError) -> Self {
        self.errors.push(error);
        self
    }

    fn with_errors(mut self, errors: Vec<ProcessError>) -> Self {
        self.errors.extend(errors);
        self
    }

    fn with_relationships(mut self, relationships: Vec<Relationship>) -> Self {
        for relationship in relationships {
            self.relationships
                .insert(relationship.name.clone(), relationship);
        }
        self
    }

    /// Apply `f` to the named table, creating it first when `create` is set
    fn update_table(mut self, name: &str, create: bool, f: impl FnOnce(&mut Table)) -> Self {
        if create && !self.tables.contains_key(name) {
            self.tables.insert(name.to_string(), Table::new(name));
        }
        if let Some(table) = self.tables.get_mut(name) {
            f(table);
        }
        self
    }
}

/// Convert parsed statements into a schema.
///
/// `source` must be the exact text the statements were parsed from.
pub fn convert(source: &str, statements: &[ParsedStatement]) -> ProcessResult {
    let definitions = statements
        .iter()
        .fold(Partial::default(), |partial, parsed| match &parsed.statement {
            Statement::CreateTable(create) => apply_create(source, partial, create, &parsed.checks),
            Statement::CreateIndex(index) => apply_index(partial, index),
            _ => partial,
        });

    let altered = statements
        .iter()
        .fold(definitions, |partial, parsed| match &parsed.statement {
            Statement::AlterTable {
                name, operations, ..
            } => apply_alter(source, partial, name, operations, &parsed.checks),
            _ => partial,
        });

    let commented = statements
        .iter()
        .fold(altered, |partial, parsed| match &parsed.statement {
            Statement::Comment {
                object_type,
                object_name,
                comment,
                ..
            } => apply_comment(partial, object_type, object_name, comment.clone()),
            _ => partial,
        });

    let Partial {
        tables,
        relationships,
        errors,
    } = commented;

    let relationships = handle_one_to_one_relationships(&tables, relationships);
    let schema = Schema {
        tables,
        relationships,
        ..Schema::default()
    };
    ProcessResult::new(schema, errors)
}

/// Columns, constraints and relationships produced by one definition
#[derive(Debug, Default)]
struct Converted {
    columns: Vec<Column>,
    constraints: Vec<Constraint>,
    relationships: Vec<Relationship>,
    errors: Vec<ProcessError>,
}

impl Converted {
    fn absorb(&mut self, other: Converted) {
        self.columns.extend(other.columns);
        self.constraints.extend(other.constraints);
        self.relationships.extend(other.relationships);
        self.errors.extend(other.errors);
    }
}

/// Identifier as the catalog stores it: unquoted names fold to lower case
fn ident_name(ident: &Ident) -> String {
    match ident.quote_style {
        Some(_) => ident.value.clone(),
        None => ident.value.to_lowercase(),
    }
}

/// Unqualified relation name
fn relation_name(name: &ObjectName) -> String {
    name.0.last().map(ident_name).unwrap_or_default()
}

/// `(LIKE other)` inside the element list reads as a column named LIKE
fn is_like_clause(def: &ColumnDef) -> bool {
    def.name.quote_style.is_none() && def.name.value.eq_ignore_ascii_case("like")
}

fn apply_create(source: &str, partial: Partial, stmt: &CreateTable, checks: &CheckSites) -> Partial {
    let table_name = relation_name(&stmt.name);
    debug!(table = %table_name, "converting CREATE TABLE");

    let mut table = Table::new(&table_name);
    let mut converted = Converted::default();

    let like_sources = stmt
        .like
        .iter()
        .map(relation_name)
        .chain(stmt.columns.iter().filter(|def| is_like_clause(def)).map(|def| type_name(&def.data_type)));
    for like in like_sources {
        converted.errors.push(ProcessError::unsupported(format!(
            "LIKE {} in table {} is not supported",
            like, table_name
        )));
    }

    for (index, def) in stmt.columns.iter().enumerate() {
        if !is_like_clause(def) {
            converted.absorb(convert_column(source, &table_name, def, checks.column(index)));
        }
    }

    for column in converted.columns.drain(..) {
        table.columns.insert(column.name.clone(), column);
    }

    // Table-level constraints may reference any column, so they run last
    for (index, constraint) in stmt.constraints.iter().enumerate() {
        let result = convert_table_constraint(source, &mut table, constraint, checks.constraint(index));
        converted.absorb(result);
    }

    for constraint in converted.constraints {
        table = table.with_constraint(constraint);
    }

    let mut partial = partial
        .with_relationships(converted.relationships)
        .with_errors(converted.errors);
    partial.tables.insert(table_name, table);
    partial
}

fn apply_index(partial: Partial, stmt: &CreateIndex) -> Partial {
    let table_name = relation_name(&stmt.table_name);

    let Some(name) = stmt.name.as_ref().map(relation_name) else {
        return partial.with_error(ProcessError::unexpected(format!(
            "Index name is required for index on table {}",
            table_name
        )));
    };

    let mut columns = Vec::with_capacity(stmt.columns.len());
    for param in &stmt.columns {
        match &param.expr {
            Expr::Identifier(ident) => columns.push(ident_name(ident)),
            expr => {
                warn!(index = %name, table = %table_name, %expr, "skipping expression index");
                return partial.with_error(ProcessError::unsupported(format!(
                    "Expression {} in index {} on table {} is not supported",
                    expr, name, table_name
                )));
            }
        }
    }

    debug!(index = %name, table = %table_name, "converting CREATE INDEX");
    let index = Index::new(name, columns)
        .with_unique(stmt.unique)
        .with_type(stmt.using.as_ref().map(ident_name).unwrap_or_default());

    partial.update_table(&table_name, true, |table| {
        table.indexes.insert(index.name.clone(), index);
    })
}

fn apply_alter(
    source: &str,
    partial: Partial,
    name: &ObjectName,
    operations: &[AlterTableOperation],
    checks: &CheckSites,
) -> Partial {
    let table_name = relation_name(name);
    let mut added_columns = 0;
    let mut added_constraints = 0;

    operations.iter().fold(partial, |partial, operation| match operation {
        // Foreign keys are recorded even when the table is unknown
        AlterTableOperation::AddConstraint(constraint @ TableConstraint::ForeignKey { .. }) => {
            added_constraints += 1;
            let converted = convert_table_foreign_key(&table_name, constraint);
            let constraints = converted.constraints;
            partial
                .with_relationships(converted.relationships)
                .with_errors(converted.errors)
                .update_table(&table_name, false, |table| {
                    for c in constraints {
                        table.constraints.insert(c.name().to_string(), c);
                    }
                })
        }
        AlterTableOperation::AddConstraint(constraint) => {
            let sites = checks.constraint(added_constraints);
            added_constraints += 1;

            let mut converted = Converted::default();
            let partial = partial.update_table(&table_name, false, |table| {
                converted = convert_table_constraint(source, table, constraint, sites);
                for c in converted.constraints.drain(..) {
                    table.constraints.insert(c.name().to_string(), c);
                }
            });
            partial
                .with_relationships(converted.relationships)
                .with_errors(converted.errors)
        }
        AlterTableOperation::AddColumn { column_def, .. } => {
            let sites = checks.column(added_columns);
            added_columns += 1;
            if !partial.tables.contains_key(&table_name) {
                return partial;
            }
            let converted = convert_column(source, &table_name, column_def, sites);
            let (columns, constraints) = (converted.columns, converted.constraints);
            partial
                .with_relationships(converted.relationships)
                .with_errors(converted.errors)
                .update_table(&table_name, false, |table| {
                    for column in columns {
                        table.columns.insert(column.name.clone(), column);
                    }
                    for c in constraints {
                        table.constraints.insert(c.name().to_string(), c);
                    }
                })
        }
        _ => partial,
    })
}

/// Attach a comment; the addressed name is read from the end
fn apply_comment(
    partial: Partial,
    object_type: &CommentObject,
    object_name: &ObjectName,
    comment: Option<String>,
) -> Partial {
    let names: Vec<String> = object_name.0.iter().map(ident_name).collect();
    match object_type {
        CommentObject::Table => {
            let Some(table_name) = names.last() else {
                return partial;
            };
            partial.update_table(table_name, false, |table| table.comment = comment)
        }
        CommentObject::Column => {
            let [.., table_name, column_name] = names.as_slice() else {
                return partial;
            };
            partial.update_table(table_name, false, |table| {
                if let Some(column) = table.columns.get_mut(column_name) {
                    column.comment = comment;
                }
            })
        }
        _ => partial,
    }
}

/// Canonical catalog name of a built-in type, as the server reports it
fn canonical_type(words: &str) -> Option<&'static str> {
    let name = match words {
        "int" | "integer" | "int4" => "int4",
        "bigint" | "int8" => "int8",
        "smallint" | "int2" => "int2",
        "real" | "float4" => "float4",
        "double precision" | "float8" | "float" => "float8",
        "boolean" | "bool" => "bool",
        "character varying" | "char varying" | "varchar" => "varchar",
        "character" | "char" | "bpchar" => "bpchar",
        "decimal" | "numeric" | "dec" => "numeric",
        "timestamp" | "timestamp without time zone" => "timestamp",
        "timestamp with time zone" | "timestamptz" => "timestamptz",
        "time" | "time without time zone" => "time",
        "time with time zone" | "timetz" => "timetz",
        "interval" => "interval",
        "bit" => "bit",
        "bit varying" | "varbit" => "varbit",
        _ => return None,
    };
    Some(name)
}

/// Column type without modifiers or array bounds. Built-in types use
/// their catalog name; user types keep their (folded) name with any
/// schema other than `pg_catalog` joined on.
fn type_name(data_type: &DataType) -> String {
    match data_type {
        DataType::Array(
            ArrayElemTypeDef::SquareBracket(inner, _)
            | ArrayElemTypeDef::AngleBracket(inner)
            | ArrayElemTypeDef::Parenthesis(inner),
        ) => type_name(inner),
        DataType::Custom(name, _) => {
            let parts: Vec<String> = name
                .0
                .iter()
                .map(ident_name)
                .filter(|part| part != "pg_catalog")
                .collect();
            let joined = parts.join("");
            match canonical_type(&joined) {
                Some(canonical) if parts.len() == 1 => canonical.to_string(),
                _ => joined,
            }
        }
        other => {
            let words = strip_modifiers(&other.to_string());
            canonical_type(&words).map_or(words, str::to_string)
        }
    }
}

/// Lower-cased type words with parenthesized and bracketed parts removed
fn strip_modifiers(text: &str) -> String {
    let mut depth = 0usize;
    let mut words = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => words.push(c),
            _ => {}
        }
    }
    words
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn number(text: &str) -> Option<DefaultValue> {
    text.parse::<i64>()
        .map(DefaultValue::Integer)
        .ok()
        .or_else(|| text.parse::<f64>().ok().map(DefaultValue::Float))
}

/// Literal defaults, looking through casts; anything else has no value
fn default_value(expr: &Expr) -> Option<DefaultValue> {
    match expr {
        Expr::Value(Value::SingleQuotedString(s) | Value::EscapedStringLiteral(s)) => {
            Some(DefaultValue::String(s.clone()))
        }
        Expr::Value(Value::Number(n, _)) => number(n),
        Expr::Value(Value::Boolean(b)) => Some(DefaultValue::Boolean(*b)),
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => match expr.as_ref() {
            Expr::Value(Value::Number(n, _)) => number(&format!("-{}", n)),
            _ => None,
        },
        Expr::Cast { expr, .. } | Expr::Nested(expr) => default_value(expr),
        _ => None,
    }
}

/// Catalog action code (`confupdtype`/`confdeltype`) of a referential action
fn action_code(action: ReferentialAction) -> char {
    match action {
        ReferentialAction::Restrict => 'r',
        ReferentialAction::Cascade => 'c',
        ReferentialAction::SetNull => 'n',
        ReferentialAction::SetDefault => 'd',
        ReferentialAction::NoAction => 'a',
    }
}

fn convert_column(source: &str, table_name: &str, def: &ColumnDef, checks: &[usize]) -> Converted {
    let name = ident_name(&def.name);
    let has = |pred: fn(&ColumnOption) -> bool| def.options.iter().any(|o| pred(&o.option));

    let primary = has(|o| matches!(o, ColumnOption::Unique { is_primary: true, .. }));
    let unique = primary || has(|o| matches!(o, ColumnOption::Unique { .. }));
    let not_null = primary || has(|o| matches!(o, ColumnOption::NotNull));

    let mut column = Column::new(&name, type_name(&def.data_type))
        .with_not_null(not_null)
        .with_unique(unique);
    column.primary = primary;
    column.default = def.options.iter().find_map(|o| match &o.option {
        ColumnOption::Default(expr) => default_value(expr),
        _ => None,
    });

    let mut converted = Converted::default();
    if primary {
        converted
            .constraints
            .push(Constraint::primary_key(format!("PRIMARY_{}", name), vec![name.clone()]));
    } else if unique {
        converted
            .constraints
            .push(Constraint::unique(format!("UNIQUE_{}", name), vec![name.clone()]));
    }

    let mut check_sites = checks.iter();
    for option in &def.options {
        match &option.option {
            ColumnOption::ForeignKey {
                foreign_table,
                referred_columns,
                on_delete,
                on_update,
                ..
            } => converted.absorb(convert_foreign_key(ForeignKeyClause {
                table_name,
                name: option.name.as_ref(),
                column: Some(name.clone()),
                foreign_table,
                referred_columns,
                on_delete: *on_delete,
                on_update: *on_update,
            })),
            ColumnOption::Check(_) => match check_sites.next().and_then(|at| check_detail(source, *at)) {
                Some(detail) => {
                    let check_name = option
                        .name
                        .as_ref()
                        .map(ident_name)
                        .unwrap_or_else(|| format!("CHECK_{}", name));
                    column.check = Some(detail.clone());
                    converted.constraints.push(Constraint::check(check_name, detail));
                }
                None => converted.errors.push(ProcessError::unexpected(format!(
                    "Invalid check constraint on column {}.{}",
                    table_name, name
                ))),
            },
            _ => {}
        }
    }

    converted.columns.push(column);
    converted
}

/// Foreign key clause shared by column options and table constraints
struct ForeignKeyClause<'a> {
    table_name: &'a str,
    name: Option<&'a Ident>,
    /// Referencing column; a table constraint passes its first column
    column: Option<String>,
    foreign_table: &'a ObjectName,
    referred_columns: &'a [Ident],
    on_delete: Option<ReferentialAction>,
    on_update: Option<ReferentialAction>,
}

fn convert_foreign_key(clause: ForeignKeyClause<'_>) -> Converted {
    let mut converted = Converted::default();
    let table_name = clause.table_name;

    let (Some(foreign_column), Some(primary_column)) =
        (clause.column, clause.referred_columns.first().map(ident_name))
    else {
        converted.errors.push(ProcessError::unexpected(format!(
            "Invalid foreign key constraint on table {}",
            table_name
        )));
        return converted;
    };

    let primary_table = relation_name(clause.foreign_table);
    let name = clause.name.map(ident_name).unwrap_or_else(|| {
        default_relationship_name(&primary_table, &primary_column, table_name, &foreign_column)
    });

    let relationship = Relationship::new(
        name,
        (primary_table.as_str(), primary_column.as_str()),
        (table_name, foreign_column.as_str()),
    )
    .with_actions(
        ReferenceOption::from_action_code(clause.on_update.map(action_code)),
        ReferenceOption::from_action_code(clause.on_delete.map(action_code)),
    );

    converted
        .constraints
        .push(Constraint::from_relationship(&relationship));
    converted.relationships.push(relationship);
    converted
}

fn convert_table_foreign_key(table_name: &str, constraint: &TableConstraint) -> Converted {
    match constraint {
        TableConstraint::ForeignKey {
            name,
            columns,
            foreign_table,
            referred_columns,
            on_delete,
            on_update,
            ..
        } => convert_foreign_key(ForeignKeyClause {
            table_name,
            name: name.as_ref(),
            column: columns.first().map(ident_name),
            foreign_table,
            referred_columns,
            on_delete: *on_delete,
            on_update: *on_update,
        }),
        _ => Converted::default(),
    }
}

/// Table-level constraint; column flags are updated on `table` in place
fn convert_table_constraint(
    source: &str,
    table: &mut Table,
    constraint: &TableConstraint,
    checks: &[usize],
) -> Converted {
    let mut converted = Converted::default();
    let table_name = table.name.clone();

    match constraint {
        TableConstraint::PrimaryKey { name, columns, .. } => {
            let keys: Vec<String> = columns.iter().map(ident_name).collect();
            let single = keys.len() == 1;
            for key in &keys {
                if let Some(column) = table.columns.get_mut(key) {
                    column.primary = true;
                    column.not_null = true;
                    column.unique |= single;
                }
            }
            let name = name
                .as_ref()
                .map(ident_name)
                .unwrap_or_else(|| format!("{}_pkey", table_name));
            converted.constraints.push(Constraint::primary_key(name, keys));
        }
        TableConstraint::Unique { name, columns, .. } => {
            let keys: Vec<String> = columns.iter().map(ident_name).collect();
            if let [only] = keys.as_slice() {
                if let Some(column) = table.columns.get_mut(only) {
                    column.unique = true;
                }
            }
            let name = name
                .as_ref()
                .map(ident_name)
                .unwrap_or_else(|| format!("{}_{}_key", table_name, keys.join("_")));
            converted.constraints.push(Constraint::unique(name, keys));
        }
        TableConstraint::ForeignKey { .. } => {
            converted = convert_table_foreign_key(&table_name, constraint);
        }
        TableConstraint::Check { name, .. } => {
            match checks.first().and_then(|at| check_detail(source, *at)) {
                Some(detail) => {
                    let name = name
                        .as_ref()
                        .map(ident_name)
                        .unwrap_or_else(|| format!("{}_check", table_name));
                    converted.constraints.push(Constraint::check(name, detail));
                }
                None => converted.errors.push(ProcessError::unexpected(format!(
                    "Invalid check constraint on table {}",
                    table_name
                ))),
            }
        }
        _ => converted.errors.push(ProcessError::unsupported(format!(
            "Constraint {} on table {} is not supported",
            constraint, table_name
        ))),
    }

    converted
}
