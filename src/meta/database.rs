// src/meta/database.rs

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

use super::table::{read_table_json, DatabaseRef, TableMeta};
use crate::{
    clients::{CatalogClient, DeleteOutcome},
    error::{EtlError, Result},
    utils::{join_path, read_json, remove_final_slash, validate_string, write_json},
};

pub const DATABASE_FILE: &str = "database.json";

/// Keyword-style construction of a database, and the shape of `database.json`.
///
/// `description` and `base_folder` default to `""`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Default)]
pub struct DatabaseConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub bucket: String,
    #[serde(default)]
    pub base_folder: String,
}

/// A named set of tables living under one object-store prefix.
///
/// Every owned table's back-reference is refreshed whenever the name,
/// bucket or base folder changes. Not meant for concurrent mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseMeta {
    name: String,
    description: String,
    bucket: String,
    base_folder: String,
    tables: BTreeMap<String, TableMeta>,
}

impl DatabaseMeta {
    pub fn new(config: DatabaseConfig) -> Result<Self> {
        validate_string(&config.name, "_")?;
        validate_string(&config.bucket, "-.")?;
        Ok(Self {
            name: config.name,
            description: config.description,
            bucket: config.bucket,
            base_folder: config.base_folder,
            tables: BTreeMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) -> Result<()> {
        validate_string(name, "_")?;
        self.name = name.to_string();
        self.relink();
        Ok(())
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: &str) {
        self.description = description.to_string();
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn set_bucket(&mut self, bucket: &str) -> Result<()> {
        validate_string(bucket, "-.")?;
        self.bucket = bucket.to_string();
        self.relink();
        Ok(())
    }

    pub fn base_folder(&self) -> &str {
        &self.base_folder
    }

    pub fn set_base_folder(&mut self, base_folder: &str) {
        self.base_folder = base_folder.to_string();
        self.relink();
    }

    /// `s3://{bucket}/{base_folder}`, without a trailing slash.
    pub fn s3_database_path(&self) -> String {
        let root = format!("s3://{}", self.bucket);
        remove_final_slash(&join_path(&root, &self.base_folder)).to_string()
    }

    pub fn reference(&self) -> DatabaseRef {
        DatabaseRef {
            name: self.name.clone(),
            s3_database_path: self.s3_database_path(),
        }
    }

    fn relink(&mut self) {
        let reference = self.reference();
        for table in self.tables.values_mut() {
            table.link(reference.clone());
        }
    }

    /// Take ownership of `table` and point it back at this database.
    pub fn add_table(&mut self, mut table: TableMeta) -> Result<()> {
        if self.tables.contains_key(table.name()) {
            return Err(EtlError::validation(format!(
                "table `{}` already exists in database `{}`",
                table.name(),
                self.name
            )));
        }
        table.link(self.reference());
        debug!(database = %self.name, table = %table.name(), "added table");
        self.tables.insert(table.name().to_string(), table);
        Ok(())
    }

    /// Remove and return a table; the returned table no longer has a database.
    pub fn remove_table(&mut self, name: &str) -> Result<TableMeta> {
        let mut table = self
            .tables
            .remove(name)
            .ok_or_else(|| self.missing_table(name))?;
        table.clear_database();
        debug!(database = %self.name, table = %name, "removed table");
        Ok(table)
    }

    pub fn rename_table(&mut self, name: &str, new_name: &str) -> Result<()> {
        self.update_table(name, |t| t.set_name(new_name))
    }

    pub fn table(&self, name: &str) -> Result<&TableMeta> {
        self.tables.get(name).ok_or_else(|| self.missing_table(name))
    }

    /// Edit an owned table through `edit`.
    ///
    /// The edit runs on a copy that replaces the stored table only if it
    /// succeeds. A renamed table is re-keyed and must not collide with
    /// another table; the back-reference is reset to this database either way.
    pub fn update_table<F>(&mut self, name: &str, edit: F) -> Result<()>
    where
        F: FnOnce(&mut TableMeta) -> Result<()>,
    {
        let mut table = self.table(name)?.clone();
        edit(&mut table)?;

        let new_name = table.name().to_string();
        if new_name != name && self.tables.contains_key(&new_name) {
            return Err(EtlError::validation(format!(
                "table `{}` already exists in database `{}`",
                new_name, self.name
            )));
        }
        table.link(self.reference());
        self.tables.remove(name);
        self.tables.insert(new_name, table);
        debug!(database = %self.name, table = %name, "updated table");
        Ok(())
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableMeta> {
        self.tables.values()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    fn missing_table(&self, name: &str) -> EtlError {
        EtlError::not_found(format!("table `{}` in database `{}`", name, self.name))
    }

    pub fn to_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            name: self.name.clone(),
            description: self.description.clone(),
            bucket: self.bucket.clone(),
            base_folder: self.base_folder.clone(),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "bucket": self.bucket,
            "base_folder": self.base_folder,
        })
    }

    /// Write `database.json` into `dir` (created if missing) and, if
    /// `write_tables`, one `<table>.json` per table.
    pub fn write_to_json(&self, dir: impl AsRef<Path>, write_tables: bool) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        write_json(&self.to_json(), dir.join(DATABASE_FILE))?;

        let mut written = 0;
        if write_tables {
            for table in self.tables.values() {
                write_json(&table.to_json(), dir.join(format!("{}.json", table.name())))?;
                written += 1;
            }
        }
        info!(
            database = %self.name,
            dir = %dir.display(),
            tables = written,
            "wrote database metadata"
        );
        Ok(())
    }

    /// Register the database and every table's definition with the catalog.
    ///
    /// All definitions are built first, so a bad column type fails before
    /// anything is created remotely.
    pub fn create_glue_database(&self, catalog: &dyn CatalogClient) -> Result<()> {
        let mut definitions = Vec::with_capacity(self.tables.len());
        for table in self.tables.values() {
            definitions.push(table.glue_table_definition(None)?);
        }

        catalog.create_database(&self.name, &self.description)?;
        for def in &definitions {
            catalog.create_table(&self.name, def)?;
        }
        info!(database = %self.name, tables = definitions.len(), "created catalog database");
        Ok(())
    }

    /// Remove the database from the catalog. A missing database is reported, not raised.
    pub fn delete_glue_database(&self, catalog: &dyn CatalogClient) -> Result<DeleteOutcome> {
        let outcome = catalog.delete_database(&self.name)?;
        info!(database = %self.name, outcome = %outcome, "delete catalog database");
        Ok(outcome)
    }
}

/// Load `database.json` plus every other `*.json` in `dir` as a table.
pub fn read_database_folder(dir: impl AsRef<Path>) -> Result<DatabaseMeta> {
    let dir = dir.as_ref();
    let config: DatabaseConfig = read_json(dir.join(DATABASE_FILE))?;
    let mut db = DatabaseMeta::new(config)?;

    let mut table_files: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_json = path
            .extension()
            .and_then(|s| s.to_str())
            .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
        let is_database = path.file_name().map_or(false, |n| n == DATABASE_FILE);
        if path.is_file() && is_json && !is_database {
            table_files.push(path);
        }
    }
    table_files.sort();

    for path in table_files {
        db.add_table(read_table_json(&path)?)?;
    }
    debug!(database = %db.name, tables = db.tables.len(), "read database folder");
    Ok(db)
}
