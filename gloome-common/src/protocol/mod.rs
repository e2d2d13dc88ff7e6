//! Wire types for the remote GLOOME analysis service
//!
//! The service exposes three operations:
//! - `POST /{route}`: submit a job, answered by [`SubmitAck`]
//! - `GET /job_status/{processID}`: poll a job, answered by [`PollResponse`]
//! - `GET /get_exemple?mode=N`: example inputs, answered by [`ExampleResponse`]
//!
//! Result payloads are described in [`results`] and [`tree`].

pub mod results;
pub mod tree;

pub use results::{FileEntry, FileListPayload, JobResult, LikelihoodPayload, ResultOutput};
pub use tree::{AnnotationRecord, AnnotationTable, AnnotationValue, Scalar, TreeNode, TreePayload};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Which result kinds a job is expected to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// Tree, likelihood and file list in one job
    Combined,
    TreeOnly,
    LikelihoodOnly,
    FileListOnly,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::Combined,
        JobKind::TreeOnly,
        JobKind::LikelihoodOnly,
        JobKind::FileListOnly,
    ];

    /// Service route that accepts this kind of submission
    pub fn route(&self) -> &'static str {
        match self {
            JobKind::Combined => "execute_all_actions",
            JobKind::TreeOnly => "draw_tree",
            JobKind::LikelihoodOnly => "compute_likelihood_of_tree",
            JobKind::FileListOnly => "create_all_file_types",
        }
    }

    /// Name used in logs and in the glue API
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Combined => "combined",
            JobKind::TreeOnly => "tree-only",
            JobKind::LikelihoodOnly => "likelihood-only",
            JobKind::FileListOnly => "file-list-only",
        }
    }

    /// Numeric mode used by the service's page (0 = combined)
    pub fn from_mode(mode: u8) -> Option<Self> {
        Self::ALL.get(mode as usize).copied()
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = Error;

    /// Accepts the kebab-case name, a short alias, or the service route
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "combined" | "all" | "execute_all_actions" => Ok(JobKind::Combined),
            "tree-only" | "tree" | "draw_tree" => Ok(JobKind::TreeOnly),
            "likelihood-only" | "likelihood" | "compute_likelihood_of_tree" => {
                Ok(JobKind::LikelihoodOnly)
            }
            "file-list-only" | "files" | "create_all_file_types" => Ok(JobKind::FileListOnly),
            other => Err(Error::InvalidInput(format!("unknown job kind: {}", other))),
        }
    }
}

/// Opaque job identifier issued by the service
///
/// The service sends either a string or a number; both are kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ProcessId(String);

impl ProcessId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ProcessId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Int(i64),
            Float(f64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => ProcessId(s),
            RawId::Int(n) => ProcessId(n.to_string()),
            RawId::Float(f) => ProcessId(f.to_string()),
        })
    }
}

/// Remote job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Finished,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }
}

/// Acknowledgement of a job submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitAck {
    pub success: bool,
    #[serde(rename = "processID", default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<ProcessId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl SubmitAck {
    /// Accepted process id, or the rejection message
    ///
    /// An acknowledgement that claims success but carries no process id is a
    /// rejection too: there is nothing to poll.
    pub fn into_process_id(self) -> Result<ProcessId, String> {
        if !self.success {
            return Err(self
                .error
                .as_ref()
                .map(describe_error)
                .unwrap_or_else(|| "submission rejected".to_string()));
        }
        self.process_id
            .ok_or_else(|| "acknowledgement carries no process id".to_string())
    }
}

/// Answer to a status check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResponse {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl PollResponse {
    pub fn pending() -> Self {
        Self {
            status: JobStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub fn finished(result: Value) -> Self {
        Self {
            status: JobStatus::Finished,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            result: None,
            error: Some(Value::String(error.into())),
        }
    }

    /// Message describing a failed job
    pub fn failure_message(&self) -> String {
        self.error
            .as_ref()
            .or(self.result.as_ref())
            .map(describe_error)
            .unwrap_or_else(|| "job failed".to_string())
    }
}

/// Example inputs: `[alignmentText, topologyText]`
///
/// The service wraps the pair in `{"message": [...]}`; a bare pair is accepted too.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ExampleResponse {
    Wrapped { message: (String, String) },
    Bare((String, String)),
}

impl ExampleResponse {
    pub fn alignment(&self) -> &str {
        match self {
            ExampleResponse::Wrapped { message } | ExampleResponse::Bare(message) => &message.0,
        }
    }

    pub fn topology(&self) -> &str {
        match self {
            ExampleResponse::Wrapped { message } | ExampleResponse::Bare(message) => &message.1,
        }
    }
}

/// Human-readable message from an error payload
///
/// Strings are used as-is; objects contribute their `error` or `message` field.
pub fn describe_error(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("error")
            .or_else(|| map.get("message"))
            .map(describe_error)
            .unwrap_or_else(|| value.to_string()),
        Value::Null => "unknown error".to_string(),
        other => other.to_string(),
    }
}
