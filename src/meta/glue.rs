// src/meta/glue.rs

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{fmt, str::FromStr};

use crate::error::EtlError;

/// Physical format of a table's files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    #[default]
    Csv,
    Json,
    Parquet,
    Avro,
}

impl DataFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::Csv => "csv",
            DataFormat::Json => "json",
            DataFormat::Parquet => "parquet",
            DataFormat::Avro => "avro",
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataFormat {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(DataFormat::Csv),
            "json" => Ok(DataFormat::Json),
            "parquet" => Ok(DataFormat::Parquet),
            "avro" => Ok(DataFormat::Avro),
            other => Err(EtlError::validation(format!(
                "unknown data_format `{}`",
                other
            ))),
        }
    }
}

const TEXT_INPUT: &str = "org.apache.hadoop.mapred.TextInputFormat";
const TEXT_OUTPUT: &str = "org.apache.hadoop.hive.ql.io.HiveIgnoreKeyTextOutputFormat";

/// Catalog table definition skeleton for `format`, before names, columns
/// and location are filled in.
///
/// `column_names` feeds the JSON serde's `paths` parameter; other formats ignore it.
pub fn table_template(format: DataFormat, column_names: &[String]) -> Value {
    let (input, output, serde_lib, serde_params, table_params) = match format {
        DataFormat::Csv => (
            TEXT_INPUT,
            TEXT_OUTPUT,
            "org.apache.hadoop.hive.serde2.lazy.LazySimpleSerDe",
            json!({ "field.delim": "," }),
            json!({
                "classification": "csv",
                "delimiter": ",",
                "skip.header.line.count": "0",
            }),
        ),
        DataFormat::Json => (
            TEXT_INPUT,
            TEXT_OUTPUT,
            "org.openx.data.jsonserde.JsonSerDe",
            json!({ "paths": column_names.join(",") }),
            json!({ "classification": "json" }),
        ),
        DataFormat::Parquet => (
            "org.apache.hadoop.hive.ql.io.parquet.MapredParquetInputFormat",
            "org.apache.hadoop.hive.ql.io.parquet.MapredParquetOutputFormat",
            "org.apache.hadoop.hive.ql.io.parquet.serde.ParquetHiveSerDe",
            json!({ "serialization.format": "1" }),
            json!({ "classification": "parquet" }),
        ),
        DataFormat::Avro => (
            "org.apache.hadoop.hive.ql.io.avro.AvroContainerInputFormat",
            "org.apache.hadoop.hive.ql.io.avro.AvroContainerOutputFormat",
            "org.apache.hadoop.hive.serde2.avro.AvroSerDe",
            json!({}),
            json!({ "classification": "avro" }),
        ),
    };

    json!({
        "Name": "",
        "Description": "",
        "Owner": "owner",
        "Retention": 0,
        "TableType": "EXTERNAL_TABLE",
        "Parameters": table_params,
        "PartitionKeys": [],
        "StorageDescriptor": {
            "Columns": [],
            "Location": "",
            "InputFormat": input,
            "OutputFormat": output,
            "Compressed": false,
            "NumberOfBuckets": -1,
            "SerdeInfo": {
                "SerializationLibrary": serde_lib,
                "Parameters": serde_params,
            },
            "BucketColumns": [],
            "SortColumns": [],
            "StoredAsSubDirectories": false,
        },
    })
}

/// A `{Name, Type, Comment}` descriptor as used for both columns and partition keys.
pub fn column_descriptor(name: &str, native_type: &str, comment: &str) -> Value {
    json!({ "Name": name, "Type": native_type, "Comment": comment })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_formats_case_insensitively() {
        assert_eq!("CSV".parse::<DataFormat>().unwrap(), DataFormat::Csv);
        assert_eq!(" parquet ".parse::<DataFormat>().unwrap(), DataFormat::Parquet);
        assert!("xml".parse::<DataFormat>().is_err());
    }

    #[test]
    fn csv_template_has_delimiter_and_header_skip() {
        let t = table_template(DataFormat::Csv, &[]);
        assert_eq!(t["Parameters"]["skip.header.line.count"], "0");
        assert_eq!(
            t["StorageDescriptor"]["SerdeInfo"]["Parameters"]["field.delim"],
            ","
        );
    }

    #[test]
    fn json_template_lists_paths() {
        let cols = vec!["a".to_string(), "b".to_string()];
        let t = table_template(DataFormat::Json, &cols);
        assert_eq!(t["StorageDescriptor"]["SerdeInfo"]["Parameters"]["paths"], "a,b");
        assert_eq!(t["Parameters"]["classification"], "json");
    }
}
