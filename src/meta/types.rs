// src/meta/types.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{EtlError, Result};

/// Agnostic type → (catalog type, Spark type).
///
/// Must stay identical to `data/data_type_conversion.json`:
/// - character → string    / StringType
/// - int       → int       / IntegerType
/// - long      → bigint    / LongType
/// - float     → float     / FloatType
/// - double    → double    / DoubleType
/// - date      → date      / DateType
/// - datetime  → timestamp / TimestampType
/// - boolean   → boolean   / BooleanType
pub const AGNOSTIC_TYPES: &[(&str, &str, &str)] = &[
    ("character", "string", "StringType"),
    ("int", "int", "IntegerType"),
    ("long", "bigint", "LongType"),
    ("float", "float", "FloatType"),
    ("double", "double", "DoubleType"),
    ("date", "date", "DateType"),
    ("datetime", "timestamp", "TimestampType"),
    ("boolean", "boolean", "BooleanType"),
];

/// One row of the conversion table, in the reference file's shape.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct TypeConversion {
    pub glue: String,
    pub spark: String,
}

fn lookup(agnostic: &str) -> Result<&'static (&'static str, &'static str, &'static str)> {
    AGNOSTIC_TYPES
        .iter()
        .find(|(name, _, _)| *name == agnostic)
        .ok_or_else(|| EtlError::UnsupportedType(agnostic.to_string()))
}

/// Map an agnostic column type onto the catalog's type name.
pub fn translate(agnostic: &str) -> Result<&'static str> {
    lookup(agnostic).map(|(_, glue, _)| *glue)
}

/// Map an agnostic column type onto the Spark SQL type name.
pub fn translate_spark(agnostic: &str) -> Result<&'static str> {
    lookup(agnostic).map(|(_, _, spark)| *spark)
}

pub fn is_agnostic_type(agnostic: &str) -> bool {
    lookup(agnostic).is_ok()
}

/// The whole table keyed by agnostic type.
pub fn conversion_table() -> BTreeMap<String, TypeConversion> {
    AGNOSTIC_TYPES
        .iter()
        .map(|(name, glue, spark)| {
            (
                name.to_string(),
                TypeConversion {
                    glue: glue.to_string(),
                    spark: spark.to_string(),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REFERENCE: &str = include_str!("../../data/data_type_conversion.json");

    #[test]
    fn table_matches_reference_file() {
        let reference: BTreeMap<String, TypeConversion> =
            serde_json::from_str(REFERENCE).unwrap();
        assert_eq!(conversion_table(), reference);
    }

    #[test]
    fn every_agnostic_type_translates() {
        let native: Vec<&str> = AGNOSTIC_TYPES.iter().map(|(_, g, _)| *g).collect();
        for (name, _, _) in AGNOSTIC_TYPES {
            let out = translate(name).unwrap();
            assert!(native.contains(&out));
        }
        assert_eq!(translate("datetime").unwrap(), "timestamp");
        assert_eq!(translate_spark("long").unwrap(), "LongType");
    }

    #[test]
    fn unknown_type_is_unsupported() {
        assert!(matches!(
            translate("varchar"),
            Err(EtlError::UnsupportedType(t)) if t == "varchar"
        ));
        assert!(translate("Character").is_err());
        assert!(!is_agnostic_type(""));
    }
}
