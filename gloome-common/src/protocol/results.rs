//! Successful job results
//!
//! A finished job's `result` is an object carrying `title`, `form_data`, and
//! either `data` (single-kind jobs) or one key per action (combined jobs):
//! `draw_tree`, `compute_likelihood_of_tree`, `create_all_file_types`.

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

use super::tree::{Scalar, TreePayload};
use super::JobKind;
use crate::{Error, FormValues, Result};

/// Likelihood result: `[value]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LikelihoodPayload {
    pub values: Vec<Scalar>,
}

/// One downloadable output file
#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    pub label: String,
    pub url: String,
    pub display_name: String,
}

/// File-list result: `{label: [downloadURL, displayName], ...}` in service order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FileListPayload {
    pub entries: Vec<FileEntry>,
}

impl<'de> Deserialize<'de> for FileListPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = FileListPayload;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of label to [url, display name]")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some((label, (url, display_name))) = map.next_entry::<String, (String, String)>()? {
                    entries.push(FileEntry {
                        label,
                        url,
                        display_name,
                    });
                }
                Ok(FileListPayload { entries })
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

impl Serialize for FileListPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.label, &(&entry.url, &entry.display_name))?;
        }
        map.end()
    }
}

/// One result kind, routed to its renderer
#[derive(Debug, Clone, PartialEq)]
pub enum ResultOutput {
    Tree(TreePayload),
    Likelihood(LikelihoodPayload),
    FileList(FileListPayload),
}

impl ResultOutput {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ResultOutput::Tree(_) => "tree",
            ResultOutput::Likelihood(_) => "likelihood",
            ResultOutput::FileList(_) => "file-list",
        }
    }
}

/// Parsed result of a finished job
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    /// Title issued by the service (usually the process id)
    pub title: String,
    /// Parameters the computation actually used
    pub form_data: FormValues,
    /// In dispatch order: tree, likelihood, file list
    pub outputs: Vec<ResultOutput>,
}

const TREE_KEY: &str = "draw_tree";
const LIKELIHOOD_KEY: &str = "compute_likelihood_of_tree";
const FILES_KEY: &str = "create_all_file_types";

impl JobResult {
    /// Parse a finished job's `result` for the expected kind
    ///
    /// A bare array is accepted for tree and likelihood jobs (no envelope).
    pub fn from_value(kind: JobKind, value: Value) -> Result<Self> {
        let mut envelope = match value {
            Value::Object(map) => map,
            Value::Array(_) if matches!(kind, JobKind::TreeOnly | JobKind::LikelihoodOnly) => {
                let mut map = Map::new();
                map.insert("data".to_string(), value);
                map
            }
            other => {
                return Err(Error::Protocol(format!(
                    "expected a result object for {} job, got {}",
                    kind,
                    json_type(&other)
                )))
            }
        };

        let title = match envelope.remove("title") {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let form_data = match envelope.remove("form_data") {
            Some(Value::Null) | None => FormValues::new(),
            Some(v) => serde_json::from_value(v)
                .map_err(|e| Error::Protocol(format!("form_data: {}", e)))?,
        };

        let outputs = match kind {
            JobKind::Combined => {
                // Some revisions nest the three sections under `data`
                let mut sections = match envelope.remove("data") {
                    Some(Value::Object(inner)) => inner,
                    _ => envelope,
                };
                vec![
                    parse_tree(take(&mut sections, TREE_KEY)?)?,
                    parse_likelihood(take(&mut sections, LIKELIHOOD_KEY)?)?,
                    parse_files(take(&mut sections, FILES_KEY)?)?,
                ]
            }
            single => {
                let data = take(&mut envelope, "data")?;
                vec![match single {
                    JobKind::TreeOnly => parse_tree(data)?,
                    JobKind::LikelihoodOnly => parse_likelihood(data)?,
                    _ => parse_files(data)?,
                }]
            }
        };

        Ok(JobResult {
            title,
            form_data,
            outputs,
        })
    }
}

fn take(map: &mut Map<String, Value>, key: &str) -> Result<Value> {
    map.remove(key)
        .ok_or_else(|| Error::Protocol(format!("result is missing `{}`", key)))
}

fn parse_tree(value: Value) -> Result<ResultOutput> {
    serde_json::from_value(value)
        .map(ResultOutput::Tree)
        .map_err(|e| Error::Protocol(format!("tree payload: {}", e)))
}

fn parse_likelihood(value: Value) -> Result<ResultOutput> {
    serde_json::from_value(value)
        .map(ResultOutput::Likelihood)
        .map_err(|e| Error::Protocol(format!("likelihood payload: {}", e)))
}

fn parse_files(value: Value) -> Result<ResultOutput> {
    serde_json::from_value(value)
        .map(ResultOutput::FileList)
        .map_err(|e| Error::Protocol(format!("file-list payload: {}", e)))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_file_list_keeps_service_order() {
        let payload: FileListPayload = serde_json::from_value(json!({
            "Tree (newick)": ["/download/1/tree.tree", "tree.tree"],
            "Attributes (tsv)": ["/download/1/attr.tsv", "attr.tsv"],
            "Branches (tsv)": ["/download/1/branches.tsv", "branches.tsv"]
        }))
        .unwrap();
        let labels: Vec<_> = payload.entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["Tree (newick)", "Attributes (tsv)", "Branches (tsv)"]);
        assert_eq!(payload.entries[1].display_name, "attr.tsv");
    }

    #[test]
    fn test_likelihood_single_kind() {
        let result = JobResult::from_value(
            JobKind::LikelihoodOnly,
            json!({"title": "17", "form_data": {"alpha": 0.5}, "data": [-123.45]}),
        )
        .unwrap();
        assert_eq!(result.title, "17");
        assert_eq!(result.outputs.len(), 1);
        assert_eq!(
            result.outputs[0],
            ResultOutput::Likelihood(LikelihoodPayload {
                values: vec![Scalar::Number(-123.45)]
            })
        );
    }

    #[test]
    fn test_single_kind_without_data_is_protocol_error() {
        let err = JobResult::from_value(JobKind::FileListOnly, json!({"title": "x"})).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_numeric_title_is_stringified() {
        let result =
            JobResult::from_value(JobKind::LikelihoodOnly, json!({"title": 99, "data": [1.0]})).unwrap();
        assert_eq!(result.title, "99");
        assert!(result.form_data.is_empty());
    }
}
