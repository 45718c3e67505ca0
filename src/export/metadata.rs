use md5::{Digest, Md5};
use rand::RngExt;
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;

use crate::analytics::unix_now;

use super::request::{ExportFilters, ExportFormat, ExportGranularity};

/// Bumped whenever the exported data layout changes shape.
pub const FORMAT_VERSION: &str = "1.0";

/// Metadata returned with every export. The checksum is computed over the
/// canonicalized data object, so a consumer can re-serialize and verify that
/// what they received matches what was generated.
#[derive(Debug, Clone, Serialize)]
pub struct ExportMetadata {
    pub export_id: String,
    pub poll_id: String,
    pub format: ExportFormat,
    pub granularity: ExportGranularity,
    pub generated_at: i64,
    pub record_count: u64,
    pub checksum: String,
    pub format_version: String,
}

impl ExportMetadata {
    pub fn new(
        poll_id: &str,
        format: ExportFormat,
        granularity: ExportGranularity,
        record_count: u64,
        checksum: String,
    ) -> Self {
        ExportMetadata {
            export_id: generate_export_id(),
            poll_id: poll_id.to_string(),
            format,
            granularity,
            generated_at: unix_now(),
            record_count,
            checksum,
            format_version: FORMAT_VERSION.to_string(),
        }
    }
}

pub fn create_export_metadata<T: Serialize>(
    data: &T,
    poll_id: &str,
    format: ExportFormat,
    granularity: ExportGranularity,
    record_count: u64,
) -> anyhow::Result<ExportMetadata> {
    let checksum = generate_checksum(data)?;
    Ok(ExportMetadata::new(
        poll_id,
        format,
        granularity,
        record_count,
        checksum,
    ))
}

/// Serialize with object keys in sorted order at every nesting level, so two
/// deep-equal objects produce identical bytes regardless of how their keys
/// were inserted.
pub fn canonical_json<T: Serialize>(data: &T) -> anyhow::Result<String> {
    let value = serde_json::to_value(data)?;
    Ok(sort_keys(value).to_string())
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map
                .into_iter()
                .map(|(k, v)| (k, sort_keys(v)))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = serde_json::Map::new();
            for (k, v) in entries {
                sorted.insert(k, v);
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// MD5 hex digest over the canonical JSON form of `data`.
pub fn generate_checksum<T: Serialize>(data: &T) -> anyhow::Result<String> {
    let canonical = canonical_json(data)?;
    Ok(hex::encode(Md5::digest(canonical.as_bytes())))
}

/// Cache key for a serialized export. Filters are canonicalized first so the
/// key does not depend on how the filter object was assembled.
pub fn cache_key(
    poll_id: &str,
    format: ExportFormat,
    granularity: ExportGranularity,
    filters: &ExportFilters,
) -> anyhow::Result<String> {
    let filter_json = canonical_json(filters)?;
    let input = format!(
        "{}:{}:{}:{}",
        poll_id,
        format.as_str(),
        granularity.as_str(),
        filter_json
    );
    Ok(hex::encode(Sha256::digest(input.as_bytes())))
}

fn generate_export_id() -> String {
    let suffix: String = rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("exp_{}_{}", unix_now(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_json_sorts_nested_keys() {
        let value = serde_json::json!({
            "b": 1,
            "a": { "d": 2, "c": [ { "z": 3, "y": 4 } ] },
        });
        assert_eq!(
            canonical_json(&value).unwrap(),
            r#"{"a":{"c":[{"y":4,"z":3}],"d":2},"b":1}"#
        );
    }

    #[test]
    fn checksum_ignores_field_declaration_order() {
        #[derive(Serialize)]
        struct Forward {
            views: i64,
            votes: i64,
        }
        #[derive(Serialize)]
        struct Backward {
            votes: i64,
            views: i64,
        }

        let a = generate_checksum(&Forward { views: 10, votes: 3 }).unwrap();
        let b = generate_checksum(&Backward { votes: 3, views: 10 }).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn checksum_changes_with_data() {
        let a = generate_checksum(&serde_json::json!({ "views": 10 })).unwrap();
        let b = generate_checksum(&serde_json::json!({ "views": 11 })).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn cache_keys_separate_granularities() {
        let filters = ExportFilters::default();
        let summary =
            cache_key("p1", ExportFormat::Csv, ExportGranularity::Summary, &filters).unwrap();
        let detailed =
            cache_key("p1", ExportFormat::Csv, ExportGranularity::Detailed, &filters).unwrap();
        assert_ne!(summary, detailed);

        let again =
            cache_key("p1", ExportFormat::Csv, ExportGranularity::Summary, &filters).unwrap();
        assert_eq!(summary, again);
    }

    #[test]
    fn export_ids_do_not_repeat() {
        assert_ne!(generate_export_id(), generate_export_id());
    }
}
