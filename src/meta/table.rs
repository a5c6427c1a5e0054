// src/meta/table.rs

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::{collections::HashSet, path::Path};
use tracing::debug;

use super::{
    database::DatabaseMeta,
    glue::{column_descriptor, table_template, DataFormat},
    types::translate,
};
use crate::{
    error::{EtlError, Result},
    utils::{dict_merge, end_with_slash, join_path, read_json, validate_string},
};

/// A single column as stored in the agnostic metadata.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub description: String,
}

impl Column {
    pub fn new(name: &str, ty: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            ty: ty.to_string(),
            description: description.to_string(),
        }
    }
}

/// Keyword-style construction of a table, and its on-disk JSON shape.
///
/// Defaults when a field is absent:
/// - `description`: `""`
/// - `data_format`: `csv`
/// - `location`: `""`
/// - `columns`, `partitions`: empty
/// - `glue_specific`: `{}`
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct TableConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub data_format: DataFormat,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub partitions: Vec<String>,
    #[serde(default)]
    pub glue_specific: Map<String, Value>,
}

/// Partial change to a column. Fields left as `None` are kept.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ColumnUpdate {
    pub name: Option<String>,
    pub ty: Option<String>,
    pub description: Option<String>,
}

impl ColumnUpdate {
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn ty(mut self, ty: &str) -> Self {
        self.ty = Some(ty.to_string());
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.ty.is_none() && self.description.is_none()
    }
}

/// What a table knows about the database that owns it: enough to resolve its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseRef {
    pub name: String,
    pub s3_database_path: String,
}

/// One table's agnostic schema.
///
/// Invariants: column names are unique, partitions are a subset of the
/// column names, and `name` passes `validate_string(.., "_")`.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMeta {
    name: String,
    description: String,
    data_format: DataFormat,
    location: String,
    columns: Vec<Column>,
    partitions: Vec<String>,
    glue_specific: Map<String, Value>,
    database: Option<DatabaseRef>,
}

impl TableMeta {
    pub fn new(name: &str, location: &str) -> Result<Self> {
        Self::from_config(TableConfig {
            name: name.to_string(),
            location: location.to_string(),
            ..Default::default()
        })
    }

    pub fn from_config(config: TableConfig) -> Result<Self> {
        validate_string(&config.name, "_")?;

        let mut seen = HashSet::new();
        for col in &config.columns {
            validate_string(&col.name, "")?;
            if !seen.insert(col.name.as_str()) {
                return Err(EtlError::validation(format!(
                    "duplicate column `{}` in table `{}`",
                    col.name, config.name
                )));
            }
        }

        let mut table = Self {
            name: config.name,
            description: config.description,
            data_format: config.data_format,
            location: config.location,
            columns: config.columns,
            partitions: Vec::new(),
            glue_specific: config.glue_specific,
            database: None,
        };
        table.set_partitions(config.partitions)?;
        Ok(table)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the table. Fails if the new name is not a valid identifier.
    ///
    /// Owned tables are only reachable mutably through
    /// `DatabaseMeta::update_table`, which re-keys them after a rename.
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        validate_string(name, "_")?;
        self.name = name.to_string();
        Ok(())
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: &str) {
        self.description = description.to_string();
    }

    pub fn data_format(&self) -> DataFormat {
        self.data_format
    }

    pub fn set_data_format(&mut self, data_format: DataFormat) {
        self.data_format = data_format;
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn set_location(&mut self, location: &str) {
        self.location = location.to_string();
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| self.missing_column(name))
    }

    pub fn partitions(&self) -> &[String] {
        &self.partitions
    }

    /// Replace the partition keys, outermost first. Each must be an existing column.
    pub fn set_partitions(&mut self, partitions: Vec<String>) -> Result<()> {
        let mut seen = HashSet::new();
        for p in &partitions {
            if !self.has_column(p) {
                return Err(EtlError::validation(format!(
                    "partition `{}` is not a column of table `{}`",
                    p, self.name
                )));
            }
            if !seen.insert(p.as_str()) {
                return Err(EtlError::validation(format!(
                    "partition `{}` listed twice in table `{}`",
                    p, self.name
                )));
            }
        }
        self.partitions = partitions;
        Ok(())
    }

    pub fn glue_specific(&self) -> &Map<String, Value> {
        &self.glue_specific
    }

    pub fn set_glue_specific(&mut self, glue_specific: Map<String, Value>) {
        self.glue_specific = glue_specific;
    }

    pub fn database(&self) -> Option<&DatabaseRef> {
        self.database.as_ref()
    }

    /// Point this table at `database` for location resolution.
    pub fn set_database(&mut self, database: &DatabaseMeta) {
        self.database = Some(database.reference());
    }

    pub fn clear_database(&mut self) {
        self.database = None;
    }

    pub(crate) fn link(&mut self, reference: DatabaseRef) {
        self.database = Some(reference);
    }

    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    fn missing_column(&self, name: &str) -> EtlError {
        EtlError::not_found(format!("column `{}` in table `{}`", name, self.name))
    }

    /// Append a column. Declaration order is physical column order.
    pub fn add_column(&mut self, name: &str, ty: &str, description: &str) -> Result<()> {
        validate_string(name, "")?;
        if self.has_column(name) {
            return Err(EtlError::validation(format!(
                "column `{}` already exists in table `{}`",
                name, self.name
            )));
        }
        self.columns.push(Column::new(name, ty, description));
        debug!(table = %self.name, column = %name, "added column");
        Ok(())
    }

    /// Drop a column, and its partition key if it was one.
    pub fn remove_column(&mut self, name: &str) -> Result<()> {
        let idx = self
            .columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| self.missing_column(name))?;
        self.columns.remove(idx);
        self.partitions.retain(|p| p != name);
        debug!(table = %self.name, column = %name, "removed column");
        Ok(())
    }

    /// Change some of a column's fields in place; its position is kept.
    pub fn update_column(&mut self, name: &str, update: ColumnUpdate) -> Result<()> {
        if update.is_empty() {
            return Err(EtlError::validation(format!(
                "update of column `{}` needs a new name, type or description",
                name
            )));
        }
        let idx = self
            .columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| self.missing_column(name))?;

        if let Some(new_name) = &update.name {
            validate_string(new_name, "")?;
            if new_name != name && self.has_column(new_name) {
                return Err(EtlError::validation(format!(
                    "cannot rename `{}` to `{}`: column already exists",
                    name, new_name
                )));
            }
        }

        let col = &mut self.columns[idx];
        if let Some(ty) = update.ty {
            col.ty = ty;
        }
        if let Some(description) = update.description {
            col.description = description;
        }
        if let Some(new_name) = update.name {
            col.name = new_name.clone();
            for p in self.partitions.iter_mut().filter(|p| p.as_str() == name) {
                *p = new_name.clone();
            }
        }
        Ok(())
    }

    pub fn to_config(&self) -> TableConfig {
        TableConfig {
            name: self.name.clone(),
            description: self.description.clone(),
            data_format: self.data_format,
            location: self.location.clone(),
            columns: self.columns.clone(),
            partitions: self.partitions.clone(),
            glue_specific: self.glue_specific.clone(),
        }
    }

    /// Canonical JSON document; every key is present even when empty.
    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "data_format": self.data_format,
            "location": self.location,
            "columns": self.columns,
            "partitions": self.partitions,
            "glue_specific": self.glue_specific,
        })
    }

    /// Build the catalog's table definition.
    ///
    /// The location is `database_path` (or the owning database's s3 path)
    /// joined with this table's location, always ending in `/`. Partition
    /// columns stay in the column list and are also emitted as partition keys.
    pub fn glue_table_definition(&self, database_path: Option<&str>) -> Result<Value> {
        let base = match (database_path, &self.database) {
            (Some(path), _) => path.to_string(),
            (None, Some(db)) => db.s3_database_path.clone(),
            (None, None) => {
                return Err(EtlError::validation(format!(
                    "table `{}` has no database; pass a database path",
                    self.name
                )))
            }
        };

        let mut columns = Vec::with_capacity(self.columns.len());
        for col in &self.columns {
            columns.push(column_descriptor(
                &col.name,
                translate(&col.ty)?,
                &col.description,
            ));
        }

        let mut partition_keys = Vec::with_capacity(self.partitions.len());
        for p in &self.partitions {
            let col = self.column(p)?;
            partition_keys.push(column_descriptor(
                &col.name,
                translate(&col.ty)?,
                &col.description,
            ));
        }

        let mut def = table_template(self.data_format, &self.column_names());
        def["Name"] = json!(self.name);
        def["Description"] = json!(self.description);
        def["PartitionKeys"] = Value::Array(partition_keys);
        def["StorageDescriptor"]["Columns"] = Value::Array(columns);
        def["StorageDescriptor"]["Location"] =
            json!(end_with_slash(&join_path(&base, &self.location)));

        dict_merge(&mut def, &Value::Object(self.glue_specific.clone()));
        Ok(def)
    }
}

/// Read a single table document with no owning database.
pub fn read_table_json(path: impl AsRef<Path>) -> Result<TableMeta> {
    let config: TableConfig = read_json(path)?;
    TableMeta::from_config(config)
}
