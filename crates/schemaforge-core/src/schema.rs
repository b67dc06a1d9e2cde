//! Unified schema model
//!
//! Every source format converges on these types. Maps are insertion-ordered
//! so that serialized output follows source order and stays deterministic.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::diagnostic::{Diagnostic, DiagnosticCode, Severity};

pub type Columns = IndexMap<String, Column>;
pub type Indexes = IndexMap<String, Index>;
pub type Constraints = IndexMap<String, Constraint>;
pub type Tables = IndexMap<String, Table>;
pub type Relationships = IndexMap<String, Relationship>;
pub type Enums = IndexMap<String, Enum>;
pub type Extensions = IndexMap<String, Extension>;
pub type TableGroups = IndexMap<String, TableGroup>;

/// Literal default value of a column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl DefaultValue {
    /// Render as a SQL literal (strings quoted, quotes doubled)
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Boolean(b) => b.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }
}

impl From<&str> for DefaultValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for DefaultValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for DefaultValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for DefaultValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl std::fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
            Self::String(s) => write!(f, "{}", s),
        }
    }
}

/// A column of a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,

    /// Dialect-specific type name
    #[serde(rename = "type")]
    pub data_type: String,

    #[serde(default)]
    pub default: Option<DefaultValue>,

    #[serde(default)]
    pub check: Option<String>,

    #[serde(default)]
    pub primary: bool,

    #[serde(default)]
    pub unique: bool,

    #[serde(default)]
    pub not_null: bool,

    #[serde(default)]
    pub comment: Option<String>,
}

impl Column {
    /// Create a nullable, unconstrained column
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            default: None,
            check: None,
            primary: false,
            unique: false,
            not_null: false,
            comment: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<DefaultValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_not_null(mut self, not_null: bool) -> Self {
        self.not_null = not_null;
        self
    }

    pub fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Mark as primary key (implies unique and not null)
    pub fn with_primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        if primary {
            self.unique = true;
            self.not_null = true;
        }
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_check(mut self, check: impl Into<String>) -> Self {
        self.check = Some(check.into());
        self
    }
}

/// An index on a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,

    #[serde(default)]
    pub unique: bool,

    /// Ordered column list
    pub columns: Vec<String>,

    /// Access method (btree, hash, gin, ...), empty when unspecified
    #[serde(rename = "type", default)]
    pub index_type: String,
}

impl Index {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            unique: false,
            columns,
            index_type: String::new(),
        }
    }

    pub fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn with_type(mut self, index_type: impl Into<String>) -> Self {
        self.index_type = index_type.into();
        self
    }
}

/// Referential action for ON UPDATE / ON DELETE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceOption {
    Cascade,
    Restrict,
    SetNull,
    SetDefault,
    #[default]
    NoAction,
}

impl ReferenceOption {
    /// SQL spelling of the action
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::Restrict => "RESTRICT",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
            Self::NoAction => "NO ACTION",
        }
    }

    /// Map a PostgreSQL catalog action code (`r`, `c`, `n`, `d`, `a`)
    ///
    /// Unknown or missing codes map to `NoAction`.
    pub fn from_action_code(code: Option<char>) -> Self {
        match code.map(|c| c.to_ascii_lowercase()) {
            Some('r') => Self::Restrict,
            Some('c') => Self::Cascade,
            Some('n') => Self::SetNull,
            Some('d') => Self::SetDefault,
            _ => Self::NoAction,
        }
    }

    /// Parse an SQL phrase such as `SET NULL` or `cascade`
    pub fn from_sql(phrase: &str) -> Option<Self> {
        let normalized = phrase
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase();
        match normalized.as_str() {
            "CASCADE" => Some(Self::Cascade),
            "RESTRICT" => Some(Self::Restrict),
            "SET NULL" => Some(Self::SetNull),
            "SET DEFAULT" => Some(Self::SetDefault),
            "NO ACTION" => Some(Self::NoAction),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReferenceOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// Table constraint, tagged by kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Constraint {
    #[serde(rename = "PRIMARY KEY", rename_all = "camelCase")]
    PrimaryKey { name: String, column_names: Vec<String> },

    #[serde(rename = "FOREIGN KEY", rename_all = "camelCase")]
    ForeignKey {
        name: String,
        column_name: String,
        target_table_name: String,
        target_column_name: String,
        #[serde(default)]
        update_constraint: ReferenceOption,
        #[serde(default)]
        delete_constraint: ReferenceOption,
    },

    #[serde(rename = "UNIQUE", rename_all = "camelCase")]
    Unique { name: String, column_names: Vec<String> },

    #[serde(rename = "CHECK")]
    Check { name: String, detail: String },
}

impl Constraint {
    pub fn name(&self) -> &str {
        match self {
            Self::PrimaryKey { name, .. }
            | Self::ForeignKey { name, .. }
            | Self::Unique { name, .. }
            | Self::Check { name, .. } => name,
        }
    }

    /// The serialized `type` tag
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PrimaryKey { .. } => "PRIMARY KEY",
            Self::ForeignKey { .. } => "FOREIGN KEY",
            Self::Unique { .. } => "UNIQUE",
            Self::Check { .. } => "CHECK",
        }
    }

    pub fn primary_key(name: impl Into<String>, column_names: Vec<String>) -> Self {
        Self::PrimaryKey {
            name: name.into(),
            column_names,
        }
    }

    pub fn unique(name: impl Into<String>, column_names: Vec<String>) -> Self {
        Self::Unique {
            name: name.into(),
            column_names,
        }
    }

    pub fn check(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Check {
            name: name.into(),
            detail: detail.into(),
        }
    }

    /// Foreign key constraint mirroring a relationship
    pub fn from_relationship(relationship: &Relationship) -> Self {
        Self::ForeignKey {
            name: relationship.name.clone(),
            column_name: relationship.foreign_column_name.clone(),
            target_table_name: relationship.primary_table_name.clone(),
            target_column_name: relationship.primary_column_name.clone(),
            update_constraint: relationship.update_constraint,
            delete_constraint: relationship.delete_constraint,
        }
    }
}

/// A table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,

    #[serde(default)]
    pub columns: Columns,

    #[serde(default)]
    pub comment: Option<String>,

    #[serde(default)]
    pub indexes: Indexes,

    #[serde(default)]
    pub constraints: Constraints,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Columns::new(),
            comment: None,
            indexes: Indexes::new(),
            constraints: Constraints::new(),
        }
    }

    /// Add a column keyed by its name
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.insert(column.name.clone(), column);
        self
    }

    pub fn with_index(mut self, index: Index) -> Self {
        self.indexes.insert(index.name.clone(), index);
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints
            .insert(constraint.name().to_string(), constraint);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Relationship shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    /// Intermediate only; resolved into a junction table before output
    ManyToMany,
}

/// A foreign-key relationship between two tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub name: String,
    pub primary_table_name: String,
    pub primary_column_name: String,
    pub foreign_table_name: String,
    pub foreign_column_name: String,
    pub cardinality: Cardinality,
    #[serde(default)]
    pub update_constraint: ReferenceOption,
    #[serde(default)]
    pub delete_constraint: ReferenceOption,
}

impl Relationship {
    /// ONE_TO_MANY relationship with NO_ACTION on both sides
    pub fn new(
        name: impl Into<String>,
        primary: (&str, &str),
        foreign: (&str, &str),
    ) -> Self {
        Self {
            name: name.into(),
            primary_table_name: primary.0.to_string(),
            primary_column_name: primary.1.to_string(),
            foreign_table_name: foreign.0.to_string(),
            foreign_column_name: foreign.1.to_string(),
            cardinality: Cardinality::OneToMany,
            update_constraint: ReferenceOption::NoAction,
            delete_constraint: ReferenceOption::NoAction,
        }
    }

    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    pub fn with_actions(mut self, update: ReferenceOption, delete: ReferenceOption) -> Self {
        self.update_constraint = update;
        self.delete_constraint = delete;
        self
    }
}

/// Enumerated type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enum {
    pub name: String,
    pub values: Vec<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Database extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    pub name: String,
}

/// Named grouping of tables, used for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableGroup {
    pub name: String,
    pub tables: Vec<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// The unified, format-agnostic schema
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(default)]
    pub tables: Tables,

    #[serde(default)]
    pub relationships: Relationships,

    #[serde(default)]
    pub enums: Enums,

    #[serde(default)]
    pub extensions: Extensions,

    #[serde(default)]
    pub table_groups: TableGroups,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationships
            .insert(relationship.name.clone(), relationship);
        self
    }

    pub fn with_enum(mut self, value: Enum) -> Self {
        self.enums.insert(value.name.clone(), value);
        self
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn column(&self, table: &str, column: &str) -> Option<&Column> {
        self.tables.get(table).and_then(|t| t.columns.get(column))
    }

    /// Serialize to a JSON value
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Deserialize from a JSON value
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Hex SHA-256 of the canonical JSON serialization
    pub fn fingerprint(&self) -> String {
        fingerprint_value(&self.to_value())
    }

    /// Check that every relationship and foreign key points at an
    /// existing table and column
    pub fn validate_references(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        let mut check = |table: &str, column: &str, context: String| {
            if self.column(table, column).is_none() {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticCode::SchemaDanglingReference,
                        Severity::Error,
                        format!("{} references missing column {}.{}", context, table, column),
                    )
                    .with_comparison(format!("{}.{}", table, column), "missing"),
                );
            }
        };

        for relationship in self.relationships.values() {
            check(
                &relationship.primary_table_name,
                &relationship.primary_column_name,
                format!("Relationship {}", relationship.name),
            );
            check(
                &relationship.foreign_table_name,
                &relationship.foreign_column_name,
                format!("Relationship {}", relationship.name),
            );
        }

        for table in self.tables.values() {
            for constraint in table.constraints.values() {
                if let Constraint::ForeignKey {
                    name,
                    column_name,
                    target_table_name,
                    target_column_name,
                    ..
                } = constraint
                {
                    check(&table.name, column_name, format!("Foreign key {}", name));
                    check(
                        target_table_name,
                        target_column_name,
                        format!("Foreign key {}", name),
                    );
                }
            }
        }

        diagnostics
    }
}

/// Hex SHA-256 of a JSON value's serialization
pub fn fingerprint_value(value: &serde_json::Value) -> String {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

/// Name given to a relationship when the source does not name it
pub fn default_relationship_name(
    primary_table: &str,
    primary_column: &str,
    foreign_table: &str,
    foreign_column: &str,
) -> String {
    format!(
        "{}_{}_to_{}_{}",
        primary_table, primary_column, foreign_table, foreign_column
    )
}

/// Promote ONE_TO_MANY relationships to ONE_TO_ONE when the foreign
/// column is unique on its table
pub fn handle_one_to_one_relationships(tables: &Tables, relationships: Relationships) -> Relationships {
    relationships
        .into_iter()
        .map(|(key, mut relationship)| {
            let unique = tables
                .get(&relationship.foreign_table_name)
                .and_then(|t| t.columns.get(&relationship.foreign_column_name))
                .map(|c| c.unique)
                .unwrap_or(false);

            if unique && relationship.cardinality == Cardinality::OneToMany {
                relationship.cardinality = Cardinality::OneToOne;
            }
            (key, relationship)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn users_and_posts() -> Schema {
        Schema::new()
            .with_table(
                Table::new("users")
                    .with_column(Column::new("id", "int4").with_primary(true)),
            )
            .with_table(
                Table::new("posts")
                    .with_column(Column::new("id", "int4").with_primary(true))
                    .with_column(Column::new("user_id", "int4")),
            )
            .with_relationship(Relationship::new(
                "users_id_to_posts_user_id",
                ("users", "id"),
                ("posts", "user_id"),
            ))
    }

    #[test]
    fn column_serializes_with_camel_case_keys() {
        let column = Column::new("id", "int4").with_primary(true);
        let value = serde_json::to_value(&column).unwrap();

        assert_eq!(
            value,
            json!({
                "name": "id",
                "type": "int4",
                "default": null,
                "check": null,
                "primary": true,
                "unique": true,
                "notNull": true,
                "comment": null
            })
        );
    }

    #[test]
    fn constraint_is_tagged_by_kind() {
        let fk = Constraint::ForeignKey {
            name: "fk_user".into(),
            column_name: "user_id".into(),
            target_table_name: "users".into(),
            target_column_name: "id".into(),
            update_constraint: ReferenceOption::NoAction,
            delete_constraint: ReferenceOption::SetNull,
        };
        let value = serde_json::to_value(&fk).unwrap();

        assert_eq!(value["type"], "FOREIGN KEY");
        assert_eq!(value["targetTableName"], "users");
        assert_eq!(value["deleteConstraint"], "SET_NULL");

        let back: Constraint = serde_json::from_value(value).unwrap();
        assert_eq!(back, fk);
    }

    #[test]
    fn default_value_keeps_json_type() {
        let column: Column = serde_json::from_value(json!({
            "name": "age", "type": "int4", "default": 30, "notNull": false
        }))
        .unwrap();
        assert_eq!(column.default, Some(DefaultValue::Integer(30)));

        let column: Column = serde_json::from_value(json!({
            "name": "active", "type": "bool", "default": true
        }))
        .unwrap();
        assert_eq!(column.default, Some(DefaultValue::Boolean(true)));
    }

    #[test]
    fn schema_round_trips_through_json() {
        let schema = users_and_posts();
        let back = Schema::from_value(schema.to_value()).unwrap();
        assert_eq!(back, schema);
    }

    #[test]
    fn reference_option_parsing() {
        assert_eq!(ReferenceOption::from_action_code(Some('c')), ReferenceOption::Cascade);
        assert_eq!(ReferenceOption::from_action_code(Some('x')), ReferenceOption::NoAction);
        assert_eq!(ReferenceOption::from_action_code(None), ReferenceOption::NoAction);
        assert_eq!(ReferenceOption::from_sql("set  null"), Some(ReferenceOption::SetNull));
        assert_eq!(ReferenceOption::SetDefault.as_sql(), "SET DEFAULT");
    }

    #[test]
    fn one_to_one_promotion_requires_unique_foreign_column() {
        let mut schema = users_and_posts();
        let relationships = handle_one_to_one_relationships(&schema.tables, schema.relationships.clone());
        assert_eq!(
            relationships["users_id_to_posts_user_id"].cardinality,
            Cardinality::OneToMany
        );

        schema.tables["posts"].columns["user_id"].unique = true;
        let relationships = handle_one_to_one_relationships(&schema.tables, schema.relationships);
        assert_eq!(
            relationships["users_id_to_posts_user_id"].cardinality,
            Cardinality::OneToOne
        );
    }

    #[test]
    fn dangling_references_are_reported() {
        let schema = users_and_posts();
        assert!(schema.validate_references().is_empty());

        let schema = schema.with_relationship(Relationship::new(
            "broken",
            ("accounts", "id"),
            ("posts", "user_id"),
        ));
        let diagnostics = schema.validate_references();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, DiagnosticCode::SchemaDanglingReference);
    }

    #[test]
    fn fingerprint_is_stable() {
        let a = users_and_posts();
        let b = users_and_posts();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
        assert_ne!(a.fingerprint(), Schema::new().fingerprint());
    }
}
