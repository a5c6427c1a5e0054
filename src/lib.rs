//! Table metadata in engine-agnostic form, translated to native catalog
//! definitions, plus packaging and running of remote batch jobs.

pub mod clients;
pub mod config;
pub mod error;
pub mod job;
pub mod meta;
pub mod utils;

pub use config::JobConfig;
pub use error::{EtlError, Result};
pub use job::{GlueJob, GlueJobOptions, GlueServices, JobState};
pub use meta::{
    read_database_folder, read_table_json, Column, ColumnUpdate, DataFormat, DatabaseConfig,
    DatabaseMeta, TableConfig, TableMeta,
};
