//! DMMF-shaped intermediate model.
//!
//! Mirrors the JSON Prisma emits for `getDMMF()`, so a DMMF document can
//! be deserialized directly as well as built from PSL source.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::psl::{PslAttribute, PslField, PslModel, PslSchema, PslValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Scalar,
    Object,
    Enum,
    Unsupported,
}

/// `@default(...)` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldDefault {
    Function { name: String, args: Vec<serde_json::Value> },
    Value(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    pub is_list: bool,
    pub is_required: bool,
    #[serde(default)]
    pub is_id: bool,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(rename = "type")]
    pub field_type: String,
    /// `[name, args]`, e.g. `["VarChar", ["255"]]`
    #[serde(default)]
    pub native_type: Option<(String, Vec<String>)>,
    #[serde(default)]
    pub default: Option<FieldDefault>,
    #[serde(default)]
    pub relation_name: Option<String>,
    #[serde(default)]
    pub relation_from_fields: Vec<String>,
    #[serde(default)]
    pub relation_to_fields: Vec<String>,
    #[serde(default)]
    pub relation_on_delete: Option<String>,
    #[serde(default)]
    pub relation_on_update: Option<String>,
    #[serde(default)]
    pub db_name: Option<String>,
    #[serde(default)]
    pub documentation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKey {
    #[serde(default)]
    pub name: Option<String>,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueIndex {
    #[serde(default)]
    pub name: Option<String>,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub name: String,
    #[serde(default)]
    pub db_name: Option<String>,
    pub fields: Vec<Field>,
    #[serde(default)]
    pub primary_key: Option<PrimaryKey>,
    #[serde(default)]
    pub unique_fields: Vec<Vec<String>>,
    #[serde(default)]
    pub unique_indexes: Vec<UniqueIndex>,
    #[serde(default)]
    pub documentation: Option<String>,
}

impl Model {
    /// Database table name
    pub fn table_name(&self) -> &str {
        self.db_name.as_deref().unwrap_or(&self.name)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Id,
    Unique,
    Normal,
    Fulltext,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexField {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelIndex {
    pub model: String,
    #[serde(rename = "type")]
    pub kind: IndexKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub db_name: Option<String>,
    #[serde(default)]
    pub algorithm: Option<String>,
    pub fields: Vec<IndexField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumValue {
    pub name: String,
    #[serde(default)]
    pub db_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DmmfEnum {
    pub name: String,
    pub values: Vec<EnumValue>,
    #[serde(default)]
    pub db_name: Option<String>,
    #[serde(default)]
    pub documentation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Datamodel {
    pub models: Vec<Model>,
    #[serde(default)]
    pub enums: Vec<DmmfEnum>,
    #[serde(default)]
    pub indexes: Vec<ModelIndex>,
}

impl Datamodel {
    pub fn model(&self, name: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.name == name)
    }
}

fn string_arg(attribute: &PslAttribute, name: &str) -> Option<String> {
    attribute
        .arg(name)
        .or_else(|| attribute.positional(0))
        .and_then(PslValue::as_str)
        .map(str::to_string)
}

fn value_to_json(value: &PslValue) -> serde_json::Value {
    match value {
        PslValue::String(s) | PslValue::Ident(s) => serde_json::Value::String(s.clone()),
        PslValue::Number(n) => n
            .parse::<i64>()
            .map(serde_json::Value::from)
            .or_else(|_| n.parse::<f64>().map(serde_json::Value::from))
            .unwrap_or_else(|_| serde_json::Value::String(n.clone())),
        PslValue::Boolean(b) => serde_json::Value::Bool(*b),
        PslValue::Function { name, .. } => serde_json::Value::String(format!("{}()", name)),
        PslValue::Array(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
    }
}

fn field_default(value: &PslValue) -> FieldDefault {
    match value {
        PslValue::Function { name, args } => FieldDefault::Function {
            name: name.clone(),
            args: args.iter().map(|a| value_to_json(&a.value)).collect(),
        },
        other => FieldDefault::Value(value_to_json(other)),
    }
}

fn native_type(attribute: &PslAttribute) -> (String, Vec<String>) {
    let name = attribute.name.trim_start_matches("db.").to_string();
    let args = attribute
        .args
        .iter()
        .map(|a| match &a.value {
            PslValue::Number(n) => n.clone(),
            other => other.as_str().unwrap_or_default().to_string(),
        })
        .collect();
    (name, args)
}

/// Relation name Prisma assigns when none is given: model names sorted
/// and joined with `To`
pub fn implicit_relation_name(a: &str, b: &str) -> String {
    if a <= b {
        format!("{}To{}", a, b)
    } else {
        format!("{}To{}", b, a)
    }
}

fn build_field(model: &PslModel, field: &PslField, models: &HashSet<&str>, enums: &HashSet<&str>) -> Field {
    let kind = if models.contains(field.type_name.as_str()) {
        FieldKind::Object
    } else if enums.contains(field.type_name.as_str()) {
        FieldKind::Enum
    } else if field.type_name == "Unsupported" {
        FieldKind::Unsupported
    } else {
        FieldKind::Scalar
    };

    let mut built = Field {
        name: field.name.clone(),
        kind,
        is_list: field.list,
        is_required: !field.optional,
        is_id: field.attribute("id").is_some(),
        is_unique: field.attribute("unique").is_some(),
        field_type: field.type_name.clone(),
        native_type: field
            .attributes
            .iter()
            .find(|a| a.name.starts_with("db."))
            .map(native_type),
        default: field
            .attribute("default")
            .and_then(|a| a.positional(0))
            .map(field_default),
        relation_name: None,
        relation_from_fields: Vec::new(),
        relation_to_fields: Vec::new(),
        relation_on_delete: None,
        relation_on_update: None,
        db_name: field.attribute("map").and_then(|a| string_arg(a, "name")),
        documentation: field.documentation.clone(),
    };

    if kind == FieldKind::Object {
        let relation = field.attribute("relation");
        built.relation_name = Some(
            relation
                .and_then(|a| string_arg(a, "name"))
                .unwrap_or_else(|| implicit_relation_name(&model.name, &field.type_name)),
        );
        if let Some(relation) = relation {
            built.relation_from_fields = relation.arg("fields").map(PslValue::names).unwrap_or_default();
            built.relation_to_fields = relation.arg("references").map(PslValue::names).unwrap_or_default();
            built.relation_on_delete = relation.arg("onDelete").and_then(PslValue::as_str).map(str::to_string);
            built.relation_on_update = relation.arg("onUpdate").and_then(PslValue::as_str).map(str::to_string);
        }
    }

    built
}

impl From<&PslSchema> for Datamodel {
    fn from(schema: &PslSchema) -> Self {
        let model_names: HashSet<&str> = schema.models.iter().map(|m| m.name.as_str()).collect();
        let enum_names: HashSet<&str> = schema.enums.iter().map(|e| e.name.as_str()).collect();

        let mut datamodel = Datamodel::default();

        for model in &schema.models {
            let fields: Vec<Field> = model
                .fields
                .iter()
                .map(|f| build_field(model, f, &model_names, &enum_names))
                .collect();

            let mut built = Model {
                name: model.name.clone(),
                db_name: None,
                fields,
                primary_key: None,
                unique_fields: Vec::new(),
                unique_indexes: Vec::new(),
                documentation: model.documentation.clone(),
            };

            for field in model.fields.iter().filter(|f| f.attribute("id").is_some()) {
                datamodel.indexes.push(ModelIndex {
                    model: model.name.clone(),
                    kind: IndexKind::Id,
                    name: None,
                    db_name: field.attribute("id").and_then(|a| a.arg("map")).and_then(PslValue::as_str).map(str::to_string),
                    algorithm: None,
                    fields: vec![IndexField { name: field.name.clone() }],
                });
            }
            for field in model.fields.iter().filter(|f| f.attribute("unique").is_some()) {
                datamodel.indexes.push(ModelIndex {
                    model: model.name.clone(),
                    kind: IndexKind::Unique,
                    name: None,
                    db_name: field.attribute("unique").and_then(|a| a.arg("map")).and_then(PslValue::as_str).map(str::to_string),
                    algorithm: None,
                    fields: vec![IndexField { name: field.name.clone() }],
                });
            }

            for attribute in &model.attributes {
                let fields = attribute
                    .arg("fields")
                    .or_else(|| attribute.positional(0))
                    .map(PslValue::names)
                    .unwrap_or_default();
                let name = attribute.arg("name").and_then(PslValue::as_str).map(str::to_string);
                let db_name = attribute.arg("map").and_then(PslValue::as_str).map(str::to_string);
                let index = |kind| ModelIndex {
                    model: model.name.clone(),
                    kind,
                    name: name.clone(),
                    db_name: db_name.clone(),
                    algorithm: attribute.arg("type").and_then(PslValue::as_str).map(str::to_string),
                    fields: fields.iter().map(|f| IndexField { name: f.clone() }).collect(),
                };

                match attribute.name.as_str() {
                    "map" => built.db_name = string_arg(attribute, "name"),
                    "id" => {
                        built.primary_key = Some(PrimaryKey {
                            name: name.clone(),
                            fields: fields.clone(),
                        });
                        datamodel.indexes.push(index(IndexKind::Id));
                    }
                    "unique" => {
                        built.unique_fields.push(fields.clone());
                        built.unique_indexes.push(UniqueIndex {
                            name: name.clone(),
                            fields: fields.clone(),
                        });
                        datamodel.indexes.push(index(IndexKind::Unique));
                    }
                    "index" => datamodel.indexes.push(index(IndexKind::Normal)),
                    "fulltext" => datamodel.indexes.push(index(IndexKind::Fulltext)),
                    _ => {}
                }
            }

            datamodel.models.push(built);
        }

        datamodel.enums = schema
            .enums
            .iter()
            .map(|e| DmmfEnum {
                name: e.name.clone(),
                values: e
                    .values
                    .iter()
                    .map(|v| EnumValue {
                        name: v.clone(),
                        db_name: None,
                    })
                    .collect(),
                db_name: e.db_name.clone(),
                documentation: e.documentation.clone(),
            })
            .collect();

        datamodel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prisma::psl::parse_schema;
    use pretty_assertions::assert_eq;

    #[test]
    fn builds_fields_and_relations() {
        let psl = parse_schema(
            r#"
            model User {
              id    Int    @id @default(autoincrement())
              posts Post[]
            }
            model Post {
              id       Int  @id
              author   User @relation(fields: [authorId], references: [id], onDelete: Cascade)
              authorId Int  @map("author_id")
              @@unique([id, authorId])
            }
            "#,
        )
        .unwrap();
        let datamodel = Datamodel::from(&psl);

        let user = datamodel.model("User").unwrap();
        let posts = user.field("posts").unwrap();
        assert_eq!(posts.kind, FieldKind::Object);
        assert_eq!(posts.relation_name.as_deref(), Some("PostToUser"));
        assert_eq!(
            user.field("id").unwrap().default,
            Some(FieldDefault::Function {
                name: "autoincrement".into(),
                args: vec![]
            })
        );

        let post = datamodel.model("Post").unwrap();
        let author = post.field("author").unwrap();
        assert_eq!(author.relation_from_fields, vec!["authorId"]);
        assert_eq!(author.relation_to_fields, vec!["id"]);
        assert_eq!(author.relation_on_delete.as_deref(), Some("Cascade"));
        assert_eq!(post.field("authorId").unwrap().db_name.as_deref(), Some("author_id"));
        assert_eq!(post.unique_fields, vec![vec!["id".to_string(), "authorId".to_string()]]);

        let kinds: Vec<IndexKind> = datamodel.indexes.iter().map(|i| i.kind).collect();
        assert_eq!(kinds, vec![IndexKind::Id, IndexKind::Id, IndexKind::Unique]);
    }

    #[test]
    fn dmmf_json_deserializes() {
        let datamodel: Datamodel = serde_json::from_value(serde_json::json!({
            "models": [{
                "name": "User",
                "fields": [{
                    "name": "id", "kind": "scalar", "isList": false, "isRequired": true,
                    "isId": true, "type": "Int",
                    "default": {"name": "autoincrement", "args": []}
                }]
            }]
        }))
        .unwrap();
        assert!(datamodel.models[0].fields[0].is_id);
        assert!(matches!(
            datamodel.models[0].fields[0].default,
            Some(FieldDefault::Function { .. })
        ));
    }
}
