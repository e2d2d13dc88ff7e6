//! Job lifecycle state machine
//!
//! `Idle → Submitting → Polling → {Succeeded, Failed} → Idle`
//!
//! The controller is synchronous. It is told about acknowledgements and poll
//! responses by whoever performs the I/O, each tagged with the [`JobTicket`]
//! issued at submission. A response whose ticket is not the live one is
//! ignored, which is how superseded jobs are discarded.

use chrono::{DateTime, Utc};
use gloome_common::protocol::{JobKind, JobResult, JobStatus, PollResponse, ProcessId, SubmitAck};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::ClientError;

pub const POLLING_TIMED_OUT: &str = "polling timed out";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Submitting,
    Polling,
    Succeeded,
    Failed,
}

impl JobState {
    /// Submitting or polling
    pub fn is_busy(&self) -> bool {
        matches!(self, JobState::Submitting | JobState::Polling)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Idle => "idle",
            JobState::Submitting => "submitting",
            JobState::Polling => "polling",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Handle of one submission; strictly increasing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct JobTicket(u64);

impl JobTicket {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The live job
#[derive(Debug, Clone, Serialize)]
pub struct JobDescriptor {
    pub ticket: JobTicket,
    pub kind: JobKind,
    pub process_id: Option<ProcessId>,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    pub polls: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateTransition {
    pub ticket: Option<JobTicket>,
    pub old_state: JobState,
    pub new_state: JobState,
    pub transitioned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum JobError {
    #[error("a job is already {0}")]
    Busy(JobState),
}

/// What an acknowledgement did
#[derive(Debug, Clone, PartialEq)]
pub enum AckOutcome {
    /// Stale ticket or wrong state
    Ignored,
    /// Accepted; polling should start
    Polling(ProcessId),
    /// Submission failed; no polling
    Rejected(String),
}

/// What a poll response did
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Ignored,
    Pending { attempt: u32 },
    Finished(Box<JobResult>),
    Failed(String),
}

impl PollOutcome {
    /// Polling should stop
    pub fn is_final(&self) -> bool {
        !matches!(self, PollOutcome::Pending { .. })
    }
}

#[derive(Debug)]
pub struct JobController {
    state: JobState,
    live: Option<JobDescriptor>,
    next_ticket: u64,
    max_attempts: u32,
    last_transition: Option<StateTransition>,
}

impl JobController {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: JobState::Idle,
            live: None,
            next_ticket: 1,
            max_attempts: max_attempts.max(1),
            last_transition: None,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn live(&self) -> Option<&JobDescriptor> {
        self.live.as_ref()
    }

    pub fn is_live(&self, ticket: JobTicket) -> bool {
        self.live.as_ref().is_some_and(|j| j.ticket == ticket)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn last_transition(&self) -> Option<&StateTransition> {
        self.last_transition.as_ref()
    }

    fn transition_to(&mut self, new_state: JobState) {
        let transition = StateTransition {
            ticket: self.live.as_ref().map(|j| j.ticket),
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        info!(
            ticket = ?transition.ticket.map(|t| t.value()),
            from = %transition.old_state,
            to = %transition.new_state,
            "Job state transition"
        );
        self.state = new_state;
        self.last_transition = Some(transition);
    }

    /// Start a job; rejected while another job is submitting or polling
    pub fn begin(&mut self, kind: JobKind) -> Result<JobTicket, JobError> {
        if self.state.is_busy() {
            return Err(JobError::Busy(self.state));
        }
        let ticket = JobTicket(self.next_ticket);
        self.next_ticket += 1;
        self.live = Some(JobDescriptor {
            ticket,
            kind,
            process_id: None,
            status: JobStatus::Pending,
            submitted_at: Utc::now(),
            polls: 0,
        });
        self.transition_to(JobState::Submitting);
        Ok(ticket)
    }

    /// Attach to a job the service already accepted, skipping submission
    ///
    /// Issues a fresh ticket and enters Polling directly. Same busy rule as
    /// [`begin`](Self::begin).
    pub fn resume(&mut self, kind: JobKind, process_id: ProcessId) -> Result<JobTicket, JobError> {
        if self.state.is_busy() {
            return Err(JobError::Busy(self.state));
        }
        let ticket = JobTicket(self.next_ticket);
        self.next_ticket += 1;
        info!(ticket = ticket.value(), process_id = %process_id, kind = %kind, "Resuming job");
        self.live = Some(JobDescriptor {
            ticket,
            kind,
            process_id: Some(process_id),
            status: JobStatus::Pending,
            submitted_at: Utc::now(),
            polls: 0,
        });
        self.transition_to(JobState::Polling);
        Ok(ticket)
    }

    /// Discard the live job, if any; its later responses are ignored
    pub fn supersede(&mut self) -> Option<JobTicket> {
        if !self.state.is_busy() {
            return None;
        }
        let ticket = self.live.as_ref().map(|j| j.ticket);
        self.transition_to(JobState::Idle);
        self.live = None;
        if let Some(ticket) = ticket {
            info!(ticket = ticket.value(), "Superseded live job");
        }
        ticket
    }

    /// Return to idle after a terminal state
    pub fn reset(&mut self) {
        if self.state.is_terminal() {
            self.transition_to(JobState::Idle);
        }
    }

    fn accepts(&self, ticket: JobTicket, expected: JobState) -> bool {
        if self.state == expected && self.is_live(ticket) {
            return true;
        }
        warn!(
            ticket = ticket.value(),
            state = %self.state,
            "Ignoring response for a job that is not live"
        );
        false
    }

    fn fail(&mut self, message: String) -> String {
        if let Some(job) = self.live.as_mut() {
            job.status = JobStatus::Failed;
        }
        self.transition_to(JobState::Failed);
        self.live = None;
        message
    }

    pub fn on_submit_ack(&mut self, ticket: JobTicket, ack: Result<SubmitAck, ClientError>) -> AckOutcome {
        if !self.accepts(ticket, JobState::Submitting) {
            return AckOutcome::Ignored;
        }
        let accepted = ack.map_err(|e| e.to_string()).and_then(SubmitAck::into_process_id);
        match accepted {
            Ok(process_id) => {
                if let Some(job) = self.live.as_mut() {
                    job.process_id = Some(process_id.clone());
                    info!(ticket = ticket.value(), process_id = %process_id, kind = %job.kind, "Job accepted");
                }
                self.transition_to(JobState::Polling);
                AckOutcome::Polling(process_id)
            }
            Err(message) => AckOutcome::Rejected(self.fail(message)),
        }
    }

    pub fn on_poll(&mut self, ticket: JobTicket, response: Result<PollResponse, ClientError>) -> PollOutcome {
        if !self.accepts(ticket, JobState::Polling) {
            return PollOutcome::Ignored;
        }
        let Some(job) = self.live.as_mut() else {
            return PollOutcome::Ignored;
        };
        job.polls += 1;
        let (attempt, kind) = (job.polls, job.kind);
        debug!(ticket = ticket.value(), attempt, "Poll response");

        let response = match response {
            Ok(response) => response,
            Err(err) => return PollOutcome::Failed(self.fail(err.to_string())),
        };

        match response.status {
            JobStatus::Pending if attempt >= self.max_attempts => {
                PollOutcome::Failed(self.fail(POLLING_TIMED_OUT.to_string()))
            }
            JobStatus::Pending => PollOutcome::Pending { attempt },
            JobStatus::Failed => PollOutcome::Failed(self.fail(response.failure_message())),
            JobStatus::Finished => {
                let Some(value) = response.result else {
                    return PollOutcome::Failed(self.fail("finished job carries no result".to_string()));
                };
                match JobResult::from_value(kind, value) {
                    Ok(result) => {
                        if let Some(job) = self.live.as_mut() {
                            job.status = JobStatus::Finished;
                        }
                        self.transition_to(JobState::Succeeded);
                        self.live = None;
                        PollOutcome::Finished(Box::new(result))
                    }
                    Err(err) => PollOutcome::Failed(self.fail(err.to_string())),
                }
            }
        }
    }
}
