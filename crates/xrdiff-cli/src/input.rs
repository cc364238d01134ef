//! Input manifest loading
//!
//! Reads XR manifests from files or stdin (`-`), splitting multi-document
//! YAML and skipping empty or comment-only documents. Every document must be
//! a well-formed object with apiVersion, kind and a name; anything else is
//! an input error naming the offending file and document.

use std::io::Read;

use kube::api::DynamicObject;

use crate::error::{CliError, Result};

/// Load every XR from the given paths, `-` meaning stdin
pub fn load_inputs(paths: &[std::path::PathBuf]) -> Result<Vec<DynamicObject>> {
    let mut inputs = Vec::new();
    let mut stdin_used = false;

    for path in paths {
        if path.as_os_str() == "-" {
            if stdin_used {
                return Err(CliError::input("stdin (-) may only be given once"));
            }
            stdin_used = true;
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .map_err(|e| CliError::input(format!("failed to read stdin: {}", e)))?;
            parse_documents(&content, "<stdin>", &mut inputs)?;
        } else {
            let content = std::fs::read_to_string(path).map_err(|e| {
                CliError::input(format!("failed to read {}: {}", path.display(), e))
            })?;
            parse_documents(&content, &path.display().to_string(), &mut inputs)?;
        }
    }

    Ok(inputs)
}

/// Parse one file's content into dynamic objects
fn parse_documents(content: &str, source: &str, out: &mut Vec<DynamicObject>) -> Result<()> {
    for (index, doc) in content.split("---").enumerate() {
        let doc = doc.trim();
        if doc.is_empty()
            || doc
                .lines()
                .all(|l| l.trim().is_empty() || l.trim().starts_with('#'))
        {
            continue;
        }

        let obj: DynamicObject = serde_yaml::from_str(doc).map_err(|e| {
            CliError::input(format!("{}: document {}: {}", source, index, e))
        })?;

        if obj.types.is_none() {
            return Err(CliError::input(format!(
                "{}: document {} is missing apiVersion or kind",
                source, index
            )));
        }
        if obj.metadata.name.is_none() {
            return Err(CliError::input_with_help(
                format!("{}: document {} is missing metadata.name", source, index),
                "xrdiff diffs named resources; generateName-only inputs cannot be matched against the cluster",
            ));
        }

        out.push(obj);
    }
    Ok(())
}

/// Parse a human duration like `45s`, `2m` or `1h`; a bare number is seconds
pub fn parse_duration(value: &str) -> Result<std::time::Duration> {
    let value = value.trim();
    let err = || CliError::input(format!("invalid duration '{}'; use forms like 30s, 5m, 1h", value));

    let (digits, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(split) => value.split_at(split),
        None => (value, "s"),
    };
    let quantity: u64 = digits.parse().map_err(|_| err())?;
    let seconds = match unit {
        "s" => quantity,
        "m" => quantity * 60,
        "h" => quantity * 3600,
        _ => return Err(err()),
    };
    Ok(std::time::Duration::from_secs(seconds))
}
