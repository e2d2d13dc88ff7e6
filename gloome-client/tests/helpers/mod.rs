//! Test Helper Utilities
//!
//! Shared fixtures for gloome-client integration tests: a scripted remote
//! service and canned service payloads.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gloome_client::error::ClientError;
use gloome_client::form::{ALIGNMENT_FIELD, TREE_FIELD};
use gloome_client::remote::RemoteService;
use gloome_client::runner::JobRunner;
use gloome_client::session::Session;
use gloome_client::surface::PageSurface;
use gloome_common::config::FormDependencyConfig;
use gloome_common::protocol::{ExampleResponse, JobKind, PollResponse, ProcessId, SubmitAck};
use serde_json::{json, Value};

pub const POLL_INTERVAL: Duration = Duration::from_secs(10);

pub const NEWICK: &str = "((C:0.25,(E:1,D:2)N3:0.1)N2:0.5,A:0.3,B:0)N1;";
pub const FASTA: &str = ">A\n01\n>B\n11\n>C\n10\n>D\n00\n>E\n01\n";

/// Remote whose answers are queued by the test
///
/// Submissions are accepted with process ids "1", "2", ... unless a response
/// was queued. Polls answer `pending` once their queue runs dry.
#[derive(Default)]
pub struct ScriptedRemote {
    submits: Mutex<VecDeque<Result<SubmitAck, ClientError>>>,
    polls: Mutex<HashMap<String, VecDeque<Result<PollResponse, ClientError>>>>,
    poll_delay: Mutex<HashMap<String, Duration>>,
    submit_calls: AtomicUsize,
    poll_calls: Mutex<HashMap<String, usize>>,
    submitted: Mutex<Vec<(JobKind, Vec<(String, String)>)>>,
}

impl ScriptedRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn queue_submit(&self, ack: Result<SubmitAck, ClientError>) {
        self.submits.lock().unwrap().push_back(ack);
    }

    pub fn queue_poll(&self, process_id: &str, response: Result<PollResponse, ClientError>) {
        self.polls
            .lock()
            .unwrap()
            .entry(process_id.to_string())
            .or_default()
            .push_back(response);
    }

    /// Make every poll for `process_id` take `delay` to answer
    pub fn delay_polls(&self, process_id: &str, delay: Duration) {
        self.poll_delay.lock().unwrap().insert(process_id.to_string(), delay);
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self, process_id: &str) -> usize {
        self.poll_calls.lock().unwrap().get(process_id).copied().unwrap_or(0)
    }

    pub fn submitted(&self) -> Vec<(JobKind, Vec<(String, String)>)> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteService for ScriptedRemote {
    async fn submit_job(&self, kind: JobKind, parameters: &[(String, String)]) -> Result<SubmitAck, ClientError> {
        let n = self.submit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.submitted.lock().unwrap().push((kind, parameters.to_vec()));
        let queued = self.submits.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| Ok(accepted(&n.to_string())))
    }

    async fn poll_job(&self, process_id: &ProcessId) -> Result<PollResponse, ClientError> {
        let id = process_id.as_str().to_string();
        *self.poll_calls.lock().unwrap().entry(id.clone()).or_default() += 1;
        let delay = self.poll_delay.lock().unwrap().get(&id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let queued = self.polls.lock().unwrap().get_mut(&id).and_then(VecDeque::pop_front);
        queued.unwrap_or_else(|| Ok(PollResponse::pending()))
    }

    async fn fetch_example(&self, _mode: u8) -> Result<ExampleResponse, ClientError> {
        Ok(serde_json::from_value(json!({"message": [FASTA, NEWICK]})).unwrap())
    }
}

pub fn accepted(process_id: &str) -> SubmitAck {
    serde_json::from_value(json!({"success": true, "processID": process_id})).unwrap()
}

pub fn rejected(message: &str) -> SubmitAck {
    serde_json::from_value(json!({"success": false, "error": message})).unwrap()
}

fn record(name: &str) -> Value {
    json!({"Name": name, "Probability coefficient": [0.2, 0.9]})
}

/// Tree payload in the service's positional layout
pub fn tree_payload() -> Value {
    let names = ["N1", "N2", "C", "N3", "E", "D", "A", "B"];
    let nodes: serde_json::Map<String, Value> = names.iter().map(|n| (n.to_string(), record(n))).collect();
    let branches: serde_json::Map<String, Value> = names
        .iter()
        .filter(|n| **n != "N1")
        .map(|n| (n.to_string(), record(n)))
        .collect();
    json!([
        {
            "name": "N1",
            "distance": 0.0,
            "children": [
                {"name": "N2", "distance": 0.5, "children": [
                    {"name": "C", "distance": 0.25},
                    {"name": "N3", "distance": 0.1, "children": [
                        {"name": "E", "distance": 1.0},
                        {"name": "D", "distance": 2.0}
                    ]}
                ]},
                {"name": "A", "distance": 0.3},
                {"name": "B", "distance": 0.0}
            ]
        },
        nodes,
        {"List for sorting": ["Name", "Probability coefficient"]},
        {"Size factor": 1.0},
        branches,
        {"List for sorting": ["Name"]},
        {"Sequence length": 2}
    ])
}

pub fn file_list_payload() -> Value {
    json!({
        "Tree (newick)": ["/download/7/tree.tree", "tree.tree"],
        "Branches (tsv)": ["/download/7/branches.tsv", "branches.tsv"]
    })
}

pub fn tree_result(title: &str) -> PollResponse {
    PollResponse::finished(json!({
        "title": title,
        "form_data": {"is_optimize_alpha": false, "alpha": 0.5},
        "data": tree_payload()
    }))
}

pub fn combined_result(title: &str) -> PollResponse {
    PollResponse::finished(json!({
        "title": title,
        "form_data": {"is_optimize_alpha": true},
        "draw_tree": tree_payload(),
        "compute_likelihood_of_tree": [-1234.5],
        "create_all_file_types": file_list_payload()
    }))
}

/// Session with a valid tree and alignment already entered
pub fn filled_session(max_attempts: u32) -> Session<PageSurface> {
    let mut session = Session::new(PageSurface::new(), &FormDependencyConfig::gloome_default(), max_attempts).unwrap();
    session.on_value_changed(TREE_FIELD, NEWICK.into()).unwrap();
    session.on_value_changed(ALIGNMENT_FIELD, FASTA.into()).unwrap();
    session
}

pub fn runner(remote: Arc<ScriptedRemote>, max_attempts: u32) -> JobRunner<PageSurface> {
    JobRunner::new(
        Arc::new(tokio::sync::Mutex::new(filled_session(max_attempts))),
        remote,
        POLL_INTERVAL,
    )
}
