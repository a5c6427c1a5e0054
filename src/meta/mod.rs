pub mod database;
pub mod glue;
pub mod table;
pub mod types;

pub use database::{read_database_folder, DatabaseConfig, DatabaseMeta};
pub use glue::DataFormat;
pub use table::{read_table_json, Column, ColumnUpdate, DatabaseRef, TableConfig, TableMeta};
pub use types::{translate, translate_spark};
