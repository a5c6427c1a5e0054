// src/utils.rs

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::error::{EtlError, Result};

/// Check an identifier: lowercase ASCII letters, digits, `_`, plus anything in `allowed_chars`.
///
/// Uppercase letters get their own message since they are the usual mistake.
pub fn validate_string(s: &str, allowed_chars: &str) -> Result<()> {
    if s.is_empty() {
        return Err(EtlError::validation("identifier must not be empty"));
    }
    if s.chars().any(|c| c.is_uppercase()) {
        return Err(EtlError::validation(format!(
            "`{}` contains uppercase characters",
            s
        )));
    }
    let ok = |c: char| {
        c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || allowed_chars.contains(c)
    };
    if let Some(bad) = s.chars().find(|&c| !ok(c)) {
        return Err(EtlError::validation(format!(
            "`{}` contains `{}`; only lowercase letters, digits, `_` and `{}` are allowed",
            s, bad, allowed_chars
        )));
    }
    Ok(())
}

pub fn end_with_slash(s: &str) -> String {
    if s.ends_with('/') {
        s.to_string()
    } else {
        format!("{}/", s)
    }
}

pub fn remove_final_slash(s: &str) -> &str {
    s.strip_suffix('/').unwrap_or(s)
}

/// Join object-store path segments with exactly one `/` between them.
pub fn join_path(base: &str, rest: &str) -> String {
    if base.is_empty() {
        return rest.to_string();
    }
    if rest.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", remove_final_slash(base), rest.trim_start_matches('/'))
}

/// Final path component as a string, or the whole path if there is none.
pub fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

/// Recursively merge `overrides` into `target`.
///
/// Objects merge key by key; any other value in `overrides` replaces the target's.
pub fn dict_merge(target: &mut Value, overrides: &Value) {
    match (target, overrides) {
        (Value::Object(t), Value::Object(o)) => {
            for (k, v) in o {
                let nested = v.is_object() && t.get(k).map_or(false, Value::is_object);
                if nested {
                    if let Some(existing) = t.get_mut(k) {
                        dict_merge(existing, v);
                    }
                } else {
                    t.insert(k.clone(), v.clone());
                }
            }
        }
        (t, o) => *t = o.clone(),
    }
}

pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|source| EtlError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Pretty-print `value` to `path`, writing a tmp file first and renaming it over.
pub fn write_json<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file_name = base_name(path);
    let tmp_path: PathBuf = path.with_file_name(format!(".{}.tmp", file_name));

    let mut tmp = fs::File::create(&tmp_path)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n")?;
    drop(tmp);

    fs::rename(&tmp_path, path)?;
    Ok(())
}
