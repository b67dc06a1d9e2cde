//! Drizzle definitions to unified schema

use schemaforge_core::{
    handle_one_to_one_relationships, Cardinality, Column, Constraint, Enum, Index, ProcessResult,
    Relationship, Relationships, Schema, Table,
};

use super::table::{ColumnDef, Dialect, DrizzleModule, TableDef};
use super::types::{column_type, reference_option};

/// Convert extracted definitions into a schema.
///
/// Foreign key targets are resolved against every table in the module,
/// so declaration order does not matter.
pub fn convert(module: &DrizzleModule, dialect: Dialect) -> ProcessResult {
    let mut schema = Schema::new();
    let mut relationships = Relationships::new();

    for definition in module.tables.values() {
        let (table, table_relationships) = convert_table(definition, module, dialect);
        schema = schema.with_table(table);
        relationships.extend(table_relationships.into_iter().map(|r| (r.name.clone(), r)));
    }

    schema.relationships = handle_one_to_one_relationships(&schema.tables, relationships);

    for definition in module.enums.values() {
        if schema.enums.contains_key(&definition.name) {
            continue;
        }
        schema = schema.with_enum(Enum {
            name: definition.name.clone(),
            values: definition.values.clone(),
            comment: None,
        });
    }

    ProcessResult::new(schema, Vec::new())
}

/// Resolve enum builders (`roleEnum('role')`) to the enum's database name
fn resolved_type(column: &ColumnDef, module: &DrizzleModule, dialect: Dialect) -> String {
    if let Some(definition) = module.enums.get(&column.type_name) {
        return definition.name.clone();
    }
    if module.enums.values().any(|e| e.name == column.type_name) {
        return column.type_name.clone();
    }
    column_type(dialect, &column.type_name, column.options.as_ref())
}

fn convert_table(definition: &TableDef, module: &DrizzleModule, dialect: Dialect) -> (Table, Vec<Relationship>) {
    let table_name = definition.name.as_str();
    let mut table = Table::new(table_name);
    table.comment = definition.comment.clone();
    let mut relationships = Vec::new();

    for column_def in definition.columns.values() {
        let mut column = Column::new(&column_def.name, resolved_type(column_def, module, dialect))
            .with_not_null(column_def.not_null)
            .with_unique(column_def.unique)
            .with_primary(column_def.primary_key);
        column.default = column_def.default.clone();
        column.comment = column_def.comment.clone();
        table = table.with_column(column);

        if column_def.primary_key {
            table = table
                .with_constraint(Constraint::primary_key(
                    format!("PRIMARY_{}", column_def.name),
                    vec![column_def.name.clone()],
                ))
                .with_index(Index::new(format!("{}_pkey", table_name), vec![column_def.name.clone()]).with_unique(true));
        } else if column_def.unique {
            table = table.with_constraint(Constraint::unique(
                format!("UNIQUE_{}", column_def.name),
                vec![column_def.name.clone()],
            ));
        }

        if let Some(reference) = &column_def.references {
            let name = format!(
                "{}_{}_{}_{}_fk",
                table_name, column_def.name, reference.table, reference.column
            );
            let target_column = module
                .tables
                .get(&reference.table)
                .map(|t| t.column_name(&reference.column))
                .unwrap_or(reference.column.as_str());
            let relationship = Relationship::new(
                name,
                (module.table_name(&reference.table), target_column),
                (table_name, column_def.name.as_str()),
            )
            .with_cardinality(Cardinality::OneToMany)
            .with_actions(
                reference_option(reference.on_update.as_deref()),
                reference_option(reference.on_delete.as_deref()),
            );
            table = table.with_constraint(Constraint::from_relationship(&relationship));
            relationships.push(relationship);
        }
    }

    if let Some(properties) = &definition.composite_primary_key {
        let columns: Vec<String> = properties
            .iter()
            .map(|p| definition.column_name(p).to_string())
            .filter(|name| !name.is_empty())
            .collect();
        for name in &columns {
            if let Some(column) = table.columns.get_mut(name) {
                column.primary = true;
                column.not_null = true;
            }
        }
        let name = format!("{}_pkey", table_name);
        table = table
            .with_constraint(Constraint::primary_key(&name, columns.clone()))
            .with_index(Index::new(&name, columns).with_unique(true));
    }

    for index in &definition.indexes {
        let columns = index
            .columns
            .iter()
            .map(|p| definition.column_name(p).to_string())
            .collect();
        table = table.with_index(
            Index::new(&index.name, columns)
                .with_unique(index.unique)
                .with_type(&index.index_type),
        );
    }

    for constraint in &definition.constraints {
        table = table.with_constraint(constraint.clone());
    }

    (table, relationships)
}
