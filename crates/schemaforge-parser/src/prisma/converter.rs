//! DMMF to unified schema

use std::collections::HashMap;

use indexmap::IndexMap;
use schemaforge_core::{
    default_relationship_name, Cardinality, Column, Constraint, DefaultValue, Enum, Index,
    ProcessError, ProcessResult, ReferenceOption, Relationship, Schema, Table,
};
use tracing::debug;

use super::dmmf::{Datamodel, Field, FieldDefault, FieldKind, IndexKind, Model};

/// Per-model field name to database column name
type FieldMap = HashMap<String, HashMap<String, String>>;

fn build_field_map(datamodel: &Datamodel) -> FieldMap {
    datamodel
        .models
        .iter()
        .map(|model| {
            let fields = model
                .fields
                .iter()
                .map(|f| (f.name.clone(), f.db_name.clone().unwrap_or_else(|| f.name.clone())))
                .collect();
            (model.name.clone(), fields)
        })
        .collect()
}

fn column_name(map: &FieldMap, model: &str, field: &str) -> String {
    map.get(model)
        .and_then(|fields| fields.get(field))
        .cloned()
        .unwrap_or_else(|| field.to_string())
}

/// PostgreSQL spelling of a Prisma native type attribute
fn native_type_name(name: &str, args: &[String]) -> String {
    let base = match name {
        "DoublePrecision" => "double precision".to_string(),
        "VarBit" => "varbit".to_string(),
        other => other.to_lowercase(),
    };
    if args.is_empty() {
        base
    } else {
        format!("{}({})", base, args.join(","))
    }
}

fn scalar_type_name(scalar: &str) -> String {
    match scalar {
        "String" => "text",
        "Int" => "integer",
        "BigInt" => "bigint",
        "Boolean" => "boolean",
        "DateTime" => "timestamp(3)",
        "Float" => "double precision",
        "Decimal" => "decimal(65,30)",
        "Json" => "jsonb",
        "Bytes" => "bytea",
        other => return other.to_string(),
    }
    .to_string()
}

fn column_type(field: &Field, enum_names: &HashMap<&str, &str>) -> String {
    let base = match (&field.native_type, field.kind) {
        (Some((name, args)), _) => native_type_name(name, args),
        (None, FieldKind::Enum) => enum_names
            .get(field.field_type.as_str())
            .map(|n| n.to_string())
            .unwrap_or_else(|| field.field_type.clone()),
        (None, _) => scalar_type_name(&field.field_type),
    };
    if field.is_list {
        format!("{}[]", base)
    } else {
        base
    }
}

fn default_value(default: &FieldDefault) -> Option<DefaultValue> {
    match default {
        FieldDefault::Function { name, .. } => Some(DefaultValue::String(format!("{}()", name))),
        FieldDefault::Value(serde_json::Value::String(s)) => Some(DefaultValue::String(s.clone())),
        FieldDefault::Value(serde_json::Value::Bool(b)) => Some(DefaultValue::Boolean(*b)),
        FieldDefault::Value(serde_json::Value::Number(n)) => n
            .as_i64()
            .map(DefaultValue::Integer)
            .or_else(|| n.as_f64().map(DefaultValue::Float)),
        FieldDefault::Value(_) => None,
    }
}

fn reference_option(action: Option<&str>) -> ReferenceOption {
    match action {
        Some("Cascade") => ReferenceOption::Cascade,
        Some("Restrict") => ReferenceOption::Restrict,
        Some("SetNull") => ReferenceOption::SetNull,
        Some("SetDefault") => ReferenceOption::SetDefault,
        _ => ReferenceOption::NoAction,
    }
}

/// Convert a datamodel into a schema
pub fn convert(datamodel: &Datamodel) -> ProcessResult {
    let field_map = build_field_map(datamodel);
    let enum_names: HashMap<&str, &str> = datamodel
        .enums
        .iter()
        .map(|e| (e.name.as_str(), e.db_name.as_deref().unwrap_or(&e.name)))
        .collect();
    let table_names: HashMap<&str, &str> = datamodel
        .models
        .iter()
        .map(|m| (m.name.as_str(), m.table_name()))
        .collect();

    let mut schema = Schema::new();
    let mut errors = Vec::new();

    for model in &datamodel.models {
        debug!(model = %model.name, "converting prisma model");
        schema = schema.with_table(convert_model(model, &field_map, &enum_names));
    }

    apply_indexes(datamodel, &field_map, &mut schema);

    let (relationships, relation_errors) = convert_relationships(datamodel, &field_map);
    errors.extend(relation_errors);

    for (name, relationship) in relationships {
        if let Some(table) = schema.tables.get_mut(&relationship.foreign_table_name) {
            let constraint_name = format!(
                "{}_{}_fkey",
                relationship.foreign_table_name, relationship.foreign_column_name
            );
            let mut constraint = Constraint::from_relationship(&relationship);
            if let Constraint::ForeignKey { name, .. } = &mut constraint {
                *name = constraint_name.clone();
            }
            table.constraints.insert(constraint_name, constraint);
        }
        schema.relationships.insert(name, relationship);
    }

    let many_to_many = many_to_many_pairs(datamodel);
    for (relation_name, (left, right)) in many_to_many {
        let (junction, junction_relationships) = junction_table(
            &relation_name,
            &schema,
            (&left.0, &left.1),
            (&right.0, &right.1),
            &table_names,
        );
        for relationship in junction_relationships {
            schema.relationships.insert(relationship.name.clone(), relationship);
        }
        schema.tables.insert(junction.name.clone(), junction);
    }

    for value in &datamodel.enums {
        schema = schema.with_enum(Enum {
            name: value.db_name.clone().unwrap_or_else(|| value.name.clone()),
            values: value.values.iter().map(|v| v.db_name.clone().unwrap_or_else(|| v.name.clone())).collect(),
            comment: value.documentation.clone(),
        });
    }

    ProcessResult::new(schema, errors)
}

fn convert_model(model: &Model, field_map: &FieldMap, enum_names: &HashMap<&str, &str>) -> Table {
    let table_name = model.table_name().to_string();
    let mut table = Table::new(&table_name);
    table.comment = model.documentation.clone();

    for field in model.fields.iter().filter(|f| f.kind != FieldKind::Object) {
        let name = column_name(field_map, &model.name, &field.name);
        let mut column = Column::new(&name, column_type(field, enum_names))
            .with_not_null(field.is_required)
            .with_unique(field.is_unique)
            .with_primary(field.is_id);
        column.default = field.default.as_ref().and_then(default_value);
        column.comment = field.documentation.clone();
        table = table.with_column(column);
    }

    if let Some(primary_key) = &model.primary_key {
        let columns: Vec<String> = primary_key
            .fields
            .iter()
            .map(|f| column_name(field_map, &model.name, f))
            .collect();
        for name in &columns {
            if let Some(column) = table.columns.get_mut(name) {
                column.primary = true;
                column.not_null = true;
            }
        }
        let name = primary_key.name.clone().unwrap_or_else(|| format!("{}_pkey", table_name));
        table = table.with_constraint(Constraint::primary_key(name, columns));
    }

    for field in model.fields.iter().filter(|f| f.is_id) {
        let name = column_name(field_map, &model.name, &field.name);
        table = table.with_constraint(Constraint::primary_key(format!("{}_pkey", table_name), vec![name]));
    }

    for unique in &model.unique_indexes {
        let columns: Vec<String> = unique
            .fields
            .iter()
            .map(|f| column_name(field_map, &model.name, f))
            .collect();
        let name = unique
            .name
            .clone()
            .unwrap_or_else(|| format!("{}_{}_key", table_name, columns.join("_")));
        table = table.with_constraint(Constraint::unique(name, columns));
    }

    table
}

fn apply_indexes(datamodel: &Datamodel, field_map: &FieldMap, schema: &mut Schema) {
    for index in &datamodel.indexes {
        let Some(model) = datamodel.model(&index.model) else {
            continue;
        };
        let table_name = model.table_name().to_string();
        let columns: Vec<String> = index
            .fields
            .iter()
            .map(|f| column_name(field_map, &model.name, &f.name))
            .collect();

        let default_name = match index.kind {
            IndexKind::Id => format!("{}_pkey", table_name),
            IndexKind::Unique => format!("{}_{}_key", table_name, columns.join("_")),
            IndexKind::Normal | IndexKind::Fulltext => format!("{}_{}_idx", table_name, columns.join("_")),
        };
        let name = index.db_name.clone().or_else(|| index.name.clone()).unwrap_or(default_name);
        let unique = matches!(index.kind, IndexKind::Id | IndexKind::Unique);
        let index_type = index.algorithm.as_deref().map(str::to_lowercase).unwrap_or_default();

        if let Some(table) = schema.tables.get_mut(&table_name) {
            if index.kind == IndexKind::Unique {
                if let [only] = columns.as_slice() {
                    table
                        .constraints
                        .entry(name.clone())
                        .or_insert_with(|| Constraint::unique(name.clone(), vec![only.clone()]));
                }
            }
            table.indexes.insert(
                name.clone(),
                Index::new(name, columns).with_unique(unique).with_type(index_type),
            );
        }
    }
}

/// Relation fields grouped by relation name, in declaration order
fn relation_groups(datamodel: &Datamodel) -> IndexMap<&str, Vec<(&Model, &Field)>> {
    let mut groups: IndexMap<&str, Vec<(&Model, &Field)>> = IndexMap::new();
    for model in &datamodel.models {
        for field in model.fields.iter().filter(|f| f.kind == FieldKind::Object) {
            if let Some(name) = field.relation_name.as_deref() {
                groups.entry(name).or_default().push((model, field));
            }
        }
    }
    groups
}

/// Resolve relation groups into relationships.
///
/// The side carrying `fields`/`references` holds the foreign key. The
/// relation is ONE_TO_MANY when the opposite side is a list, otherwise
/// ONE_TO_ONE. Groups where every side is a list are implicit
/// many-to-many relations and are left to junction synthesis.
///
/// Deciding per group gives the same result as visiting the fields one by
/// one and promoting on a list side, independent of field order; a
/// self-relation is two fields of one model and groups the same way.
fn convert_relationships(datamodel: &Datamodel, field_map: &FieldMap) -> (IndexMap<String, Relationship>, Vec<ProcessError>) {
    let mut relationships = IndexMap::new();
    let mut errors = Vec::new();

    for (name, sides) in relation_groups(datamodel) {
        let holder = sides
            .iter()
            .find(|(_, f)| !f.relation_from_fields.is_empty() && !f.relation_to_fields.is_empty());

        let Some((model, field)) = holder else {
            if !sides.iter().all(|(_, f)| f.is_list) {
                errors.push(ProcessError::unexpected(format!(
                    "Relation {} has no foreign key fields",
                    name
                )));
            }
            continue;
        };

        let Some(primary_model) = datamodel.model(&field.field_type) else {
            errors.push(ProcessError::unexpected(format!(
                "Relation {} references unknown model {}",
                name, field.field_type
            )));
            continue;
        };

        let other_is_list = sides
            .iter()
            .any(|(_, other)| !std::ptr::eq(*other, *field) && other.is_list);
        let cardinality = if other_is_list {
            Cardinality::OneToMany
        } else {
            Cardinality::OneToOne
        };

        let primary_column = column_name(field_map, &primary_model.name, &field.relation_to_fields[0]);
        let foreign_column = column_name(field_map, &model.name, &field.relation_from_fields[0]);
        let relationship = Relationship::new(
            name,
            (primary_model.table_name(), primary_column.as_str()),
            (model.table_name(), foreign_column.as_str()),
        )
        .with_cardinality(cardinality)
        .with_actions(
            reference_option(field.relation_on_update.as_deref()),
            reference_option(field.relation_on_delete.as_deref()),
        );
        relationships.insert(name.to_string(), relationship);
    }

    (relationships, errors)
}

/// Model pairs of implicit many-to-many relations: `(model, field on the other side)`
fn many_to_many_pairs(datamodel: &Datamodel) -> Vec<(String, ((String, String), (String, String)))> {
    relation_groups(datamodel)
        .into_iter()
        .filter(|(_, sides)| sides.len() == 2 && sides.iter().all(|(_, f)| f.is_list && f.relation_from_fields.is_empty()))
        .map(|(name, sides)| {
            let (left_model, left_field) = sides[0];
            let (right_model, right_field) = sides[1];
            (
                name.to_string(),
                (
                    (left_model.name.clone(), right_field.name.clone()),
                    (right_model.name.clone(), left_field.name.clone()),
                ),
            )
        })
        .collect()
}

/// Junction table `_<relation>` with one column per side named
/// `<table><column>`, pointing at that side's `id` column. A side without
/// an `id` column contributes an untyped column named after its relation
/// field.
fn junction_table(
    relation_name: &str,
    schema: &Schema,
    left: (&str, &str),
    right: (&str, &str),
    table_names: &HashMap<&str, &str>,
) -> (Table, Vec<Relationship>) {
    let junction_name = format!("_{}", relation_name);
    let mut table = Table::new(&junction_name);
    let mut relationships = Vec::new();
    let mut key_columns = Vec::new();

    for (model, fallback_field) in [left, right] {
        let table_name = table_names.get(model).copied().unwrap_or(model);
        let (source_column, data_type) = schema
            .table(table_name)
            .and_then(|t| t.columns.get("id"))
            .map(|c| (c.name.clone(), c.data_type.clone()))
            .unwrap_or_else(|| (fallback_field.to_string(), String::new()));

        let name = format!("{}{}", table_name, source_column);
        table = table.with_column(Column::new(&name, data_type).with_not_null(true));
        key_columns.push(name.clone());

        let relationship = Relationship::new(
            default_relationship_name(table_name, &source_column, &junction_name, &name),
            (table_name, source_column.as_str()),
            (junction_name.as_str(), name.as_str()),
        );
        table = table.with_constraint(Constraint::from_relationship(&relationship));
        relationships.push(relationship);
    }

    let key_name = format!("{}_pkey", junction_name);
    table = table.with_index(Index::new(&key_name, key_columns).with_unique(true));
    (table, relationships)
}
