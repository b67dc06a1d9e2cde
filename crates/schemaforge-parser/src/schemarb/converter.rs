//! Rails schema calls to unified schema.
//!
//! `create_table` blocks become tables; `add_foreign_key` and
//! `add_check_constraint` attach to tables created earlier in the file.

use schemaforge_core::{
    default_relationship_name, handle_one_to_one_relationships, Column, Constraint, DefaultValue,
    Enum, Extension, Index, ProcessError, ProcessResult, ReferenceOption, Relationship,
    Relationships, Schema, Table,
};
use tracing::warn;

use super::ast::{Call, Value};

/// Rails column type to PostgreSQL type name
pub fn column_type(rails_type: &str) -> String {
    match rails_type {
        "string" => "varchar",
        "datetime" => "timestamp",
        "binary" => "bytea",
        "bit_varying" => "bit varying",
        other => other,
    }
    .to_string()
}

/// Rails `on_delete`/`on_update` symbol to a reference option
fn reference_option(value: Option<&Value>) -> ReferenceOption {
    match value {
        Some(Value::Sym(action)) => match action.as_str() {
            "cascade" => ReferenceOption::Cascade,
            "restrict" => ReferenceOption::Restrict,
            "nullify" => ReferenceOption::SetNull,
            _ => ReferenceOption::NoAction,
        },
        _ => ReferenceOption::NoAction,
    }
}

/// Singular form of a table name, following the common Rails inflections
pub fn singularize(word: &str) -> String {
    const UNCOUNTABLE: &[&str] = &[
        "equipment", "information", "rice", "money", "species", "series", "fish", "sheep",
        "jeans", "police",
    ];
    const IRREGULAR: &[(&str, &str)] = &[
        ("people", "person"),
        ("men", "man"),
        ("children", "child"),
        ("sexes", "sex"),
        ("moves", "move"),
        ("zombies", "zombie"),
        ("movies", "movie"),
    ];

    if UNCOUNTABLE.iter().any(|u| word.ends_with(u)) {
        return word.to_string();
    }
    for (plural, singular) in IRREGULAR {
        if let Some(stem) = word.strip_suffix(plural) {
            if stem.is_empty() || stem.ends_with('_') {
                return format!("{stem}{singular}");
            }
        }
    }
    for suffix in ["aliases", "statuses"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if let Some(stem) = word.strip_suffix("ies") {
        let consonant = stem
            .chars()
            .last()
            .is_some_and(|c| !"aeiouy".contains(c));
        if consonant || stem.ends_with("qu") {
            return format!("{stem}y");
        }
    }
    for suffix in ["xes", "ches", "sses", "shes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if word.ends_with("ss") {
        return word.to_string();
    }
    word.strip_suffix('s').unwrap_or(word).to_string()
}

/// Convert the top-level calls of a schema file
pub fn convert(calls: &[Call]) -> ProcessResult {
    let mut converter = Converter::default();
    converter.visit(calls);

    let Converter {
        mut schema,
        relationships,
        errors,
    } = converter;
    schema.relationships = handle_one_to_one_relationships(&schema.tables, relationships);
    ProcessResult::new(schema, errors)
}

#[derive(Default)]
struct Converter {
    schema: Schema,
    relationships: Relationships,
    errors: Vec<ProcessError>,
}

impl Converter {
    fn visit(&mut self, calls: &[Call]) {
        for call in calls {
            let result = match call.name.as_str() {
                "create_table" => self.create_table(call),
                "add_foreign_key" => self.add_foreign_key(call),
                "add_check_constraint" => self.add_check_constraint(call),
                "enable_extension" => {
                    for name in call.strings() {
                        self.schema.extensions.insert(
                            name.to_string(),
                            Extension {
                                name: name.to_string(),
                            },
                        );
                    }
                    Ok(())
                }
                "create_enum" => self.create_enum(call),
                _ => {
                    if let Some(block) = &call.block {
                        self.visit(&block.body);
                    }
                    Ok(())
                }
            };
            if let Err(error) = result {
                warn!(offset = call.start, "{error}");
                self.errors.push(error);
            }
        }
    }

    fn create_table(&mut self, call: &Call) -> Result<(), ProcessError> {
        let Some(Value::Str(table_name)) = call.args.first() else {
            return Err(ProcessError::unsupported(
                "Expected a string for the table name, but received different data",
            ));
        };

        let mut table = Table::new(table_name);
        table.comment = call.option("comment").and_then(Value::as_text).map(str::to_string);

        if let Some(column) = primary_key_column(call) {
            table = table
                .with_constraint(Constraint::primary_key(
                    format!("PRIMARY_{}", column.name),
                    vec![column.name.clone()],
                ))
                .with_column(column);
        }

        let receiver = call
            .block
            .as_ref()
            .and_then(|b| b.params.first())
            .map(String::as_str)
            .unwrap_or("t");
        let body = call.block.as_ref().map(|b| b.body.as_slice()).unwrap_or_default();

        let mut unique_columns = Vec::new();
        for definition in body {
            if definition.receiver.as_deref() != Some(receiver) {
                continue;
            }
            match definition.name.as_str() {
                "index" => match index(table_name, definition) {
                    Ok(index) => {
                        if index.unique {
                            if let [column] = index.columns.as_slice() {
                                unique_columns.push(column.clone());
                            }
                            if let Some(first) = index.columns.first() {
                                table = table.with_constraint(Constraint::unique(
                                    format!("UNIQUE_{first}"),
                                    index.columns.clone(),
                                ));
                            }
                        }
                        table = table.with_index(index);
                    }
                    Err(error) => {
                        warn!(offset = definition.start, "{error}");
                        self.errors.push(error);
                    }
                },
                "check_constraint" => {
                    let details: Vec<&str> = definition.strings().collect();
                    let [detail] = details.as_slice() else {
                        self.errors.push(ProcessError::unexpected(
                            "Check constraint must have one string of its detail",
                        ));
                        continue;
                    };
                    let name = constraint_name(definition)
                        .unwrap_or_else(|| format!("chk_{}_{}", table_name, table.constraints.len()));
                    table = table.with_constraint(Constraint::check(name, *detail));
                }
                _ => {
                    if let Some(column) = column(definition) {
                        table = table.with_column(column);
                    }
                }
            }
        }

        for name in unique_columns {
            if let Some(column) = table.columns.get_mut(&name) {
                column.unique = true;
            }
        }

        self.schema.tables.insert(table.name.clone(), table);
        Ok(())
    }

    fn add_foreign_key(&mut self, call: &Call) -> Result<(), ProcessError> {
        let names: Vec<&str> = call.strings().collect();
        let [foreign_table, primary_table] = names.as_slice() else {
            return Err(ProcessError::unexpected(
                "Foreign key relationship must have two table names",
            ));
        };

        let primary_column = call
            .option("primary_key")
            .and_then(Value::as_text)
            .unwrap_or("id");
        let foreign_column = call
            .option("column")
            .and_then(Value::as_text)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_id", singularize(primary_table)));
        let explicit_name = constraint_name(call);

        let relationship_name = explicit_name.clone().unwrap_or_else(|| {
            default_relationship_name(primary_table, primary_column, foreign_table, &foreign_column)
        });
        let constraint_name =
            explicit_name.unwrap_or_else(|| format!("fk_{}_{}", foreign_table, foreign_column));
        let update = reference_option(call.option("on_update"));
        let delete = reference_option(call.option("on_delete"));

        let relationship = Relationship::new(
            relationship_name,
            (*primary_table, primary_column),
            (*foreign_table, foreign_column.as_str()),
        )
        .with_actions(update, delete);
        self.relationships
            .insert(relationship.name.clone(), relationship);

        if let Some(table) = self.schema.tables.get_mut(*foreign_table) {
            table.constraints.insert(
                constraint_name.clone(),
                Constraint::ForeignKey {
                    name: constraint_name,
                    column_name: foreign_column,
                    target_table_name: primary_table.to_string(),
                    target_column_name: primary_column.to_string(),
                    update_constraint: update,
                    delete_constraint: delete,
                },
            );
        }
        Ok(())
    }

    fn add_check_constraint(&mut self, call: &Call) -> Result<(), ProcessError> {
        let strings: Vec<&str> = call.strings().collect();
        let [table_name, detail] = strings.as_slice() else {
            return Err(ProcessError::unexpected(
                "Check constraint must have one table name and its detail",
            ));
        };

        if let Some(table) = self.schema.tables.get_mut(*table_name) {
            let name = constraint_name(call)
                .unwrap_or_else(|| format!("chk_{}_{}", table_name, table.constraints.len()));
            table
                .constraints
                .insert(name.clone(), Constraint::check(name, *detail));
        }
        Ok(())
    }

    fn create_enum(&mut self, call: &Call) -> Result<(), ProcessError> {
        let (Some(Value::Str(name)), Some(Value::Array(items))) = (call.args.first(), call.args.get(1))
        else {
            return Err(ProcessError::unexpected(
                "Enum must have a name and a list of values",
            ));
        };
        let values = items
            .iter()
            .filter_map(Value::as_text)
            .map(str::to_string)
            .collect();
        self.schema.enums.insert(
            name.clone(),
            Enum {
                name: name.clone(),
                values,
                comment: None,
            },
        );
        Ok(())
    }
}

/// `name:` option as a string
fn constraint_name(call: &Call) -> Option<String> {
    call.option("name")
        .and_then(Value::as_text)
        .map(str::to_string)
}

/// Implicit primary key of a `create_table`, absent with `id: false`
fn primary_key_column(call: &Call) -> Option<Column> {
    let data_type = match call.option("id") {
        Some(Value::Bool(false)) => return None,
        Some(Value::Str(t)) | Some(Value::Sym(t)) => t.clone(),
        Some(_) => String::new(),
        // Rails' PostgreSQL adapter default since 5.1
        None => "bigserial".to_string(),
    };
    let name = call
        .option("primary_key")
        .and_then(Value::as_text)
        .unwrap_or("id");

    Some(
        Column::new(name, data_type)
            .with_not_null(true)
            .with_primary(true)
            .with_unique(true),
    )
}

fn column(call: &Call) -> Option<Column> {
    let name = call.strings().next()?;
    let data_type = match call.option("enum_type").and_then(Value::as_text) {
        Some(enum_type) => enum_type.to_string(),
        None => column_type(&call.name),
    };
    let mut column = Column::new(name, data_type);

    for (key, value) in &call.options {
        match key.as_str() {
            "null" => column.not_null = *value == Value::Bool(false),
            "default" => {
                column.default = match value {
                    Value::Bool(b) => Some(DefaultValue::Boolean(*b)),
                    Value::Str(s) => Some(DefaultValue::String(s.clone())),
                    Value::Int(i) => Some(DefaultValue::Integer(*i)),
                    Value::Float(f) => Some(DefaultValue::Float(*f)),
                    _ => None,
                }
            }
            "unique" => column.unique = *value == Value::Bool(true),
            "comment" => column.comment = value.as_text().map(str::to_string),
            _ => {}
        }
    }
    Some(column)
}

fn index(table_name: &str, call: &Call) -> Result<Index, ProcessError> {
    let columns: Vec<String> = match call.args.first() {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_text)
            .map(str::to_string)
            .collect(),
        Some(Value::Str(expression)) => {
            return Err(ProcessError::unsupported(format!(
                "Expression {expression} in index on table {table_name} is not supported"
            )))
        }
        _ => Vec::new(),
    };

    let name = call
        .option("name")
        .and_then(Value::as_text)
        .map(str::to_string)
        .unwrap_or_else(|| format!("index_{}_on_{}", table_name, columns.join("_and_")));
    let unique = call.option("unique") == Some(&Value::Bool(true));
    let index_type = call
        .option("using")
        .and_then(Value::as_text)
        .unwrap_or_default();

    Ok(Index::new(name, columns)
        .with_unique(unique)
        .with_type(index_type))
}
