//! tbls JSON document shape.
//!
//! Deserialization doubles as validation: a document that does not match
//! these types is rejected before any conversion happens.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct TblsDocument {
    #[serde(default)]
    pub name: Option<String>,
    pub tables: Vec<TblsTable>,
    #[serde(default)]
    pub relations: Vec<TblsRelation>,
    #[serde(default)]
    pub enums: Vec<TblsEnum>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TblsTable {
    pub name: String,
    #[serde(rename = "type")]
    pub table_type: String,
    #[serde(default)]
    pub comment: Option<String>,
    pub columns: Vec<TblsColumn>,
    #[serde(default)]
    pub indexes: Vec<TblsIndex>,
    #[serde(default)]
    pub constraints: Vec<TblsConstraint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TblsColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TblsIndex {
    pub name: String,
    pub def: String,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TblsConstraint {
    pub name: String,
    #[serde(rename = "type")]
    pub constraint_type: String,
    pub def: String,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub referenced_table: Option<String>,
    #[serde(default)]
    pub referenced_columns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TblsRelation {
    pub table: String,
    pub columns: Vec<String>,
    pub parent_table: String,
    pub parent_columns: Vec<String>,
    #[serde(default)]
    pub cardinality: Option<String>,
    #[serde(default)]
    pub parent_cardinality: Option<String>,
    #[serde(default)]
    pub def: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TblsEnum {
    pub name: String,
    pub values: Vec<String>,
}
