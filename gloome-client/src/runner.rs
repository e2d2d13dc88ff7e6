//! Async job driver
//!
//! Performs the remote I/O for a [`Session`]: submits, then polls on a fixed
//! interval until the session reports a final outcome. Each job runs in its
//! own task with a `CancellationToken`; starting a superseding job cancels the
//! previous token, so at most one poll loop is ever active. Tokens are swapped
//! while the session is still locked, in ticket order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gloome_common::protocol::{JobKind, ProcessId};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::job::{AckOutcome, JobError, JobTicket};
use crate::remote::RemoteService;
use crate::session::{JobProgress, ResumeRequest, Session, SubmitRequest};
use crate::surface::RenderSurface;

pub type SharedSession<S> = Arc<Mutex<Session<S>>>;

/// A running job
pub struct JobHandle {
    pub ticket: JobTicket,
    join: JoinHandle<JobProgress>,
}

impl JobHandle {
    /// Wait for the job's poll loop to end
    pub async fn wait(self) -> Result<JobProgress, tokio::task::JoinError> {
        self.join.await
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Counts live poll loops for as long as it is held
struct ActivePoll(Arc<AtomicUsize>);

impl ActivePoll {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActivePoll {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Cancellation token of the newest launched job
#[derive(Default)]
struct LiveToken(Option<(JobTicket, CancellationToken)>);

impl LiveToken {
    /// Store `token` for `ticket` and cancel the one it replaces
    ///
    /// A ticket older than the stored one has already been superseded, so its
    /// own token is cancelled instead and false is returned.
    fn install(&mut self, ticket: JobTicket, token: &CancellationToken) -> bool {
        if self.0.as_ref().is_some_and(|(live, _)| *live > ticket) {
            token.cancel();
            return false;
        }
        if let Some((_, previous)) = self.0.replace((ticket, token.clone())) {
            previous.cancel();
        }
        true
    }
}

pub struct JobRunner<S: RenderSurface + 'static> {
    session: SharedSession<S>,
    remote: Arc<dyn RemoteService>,
    poll_interval: Duration,
    current: Mutex<LiveToken>,
    active_polls: Arc<AtomicUsize>,
}

impl<S: RenderSurface + 'static> JobRunner<S> {
    pub fn new(session: SharedSession<S>, remote: Arc<dyn RemoteService>, poll_interval: Duration) -> Self {
        Self {
            session,
            remote,
            poll_interval,
            current: Mutex::new(LiveToken::default()),
            active_polls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn session(&self) -> &SharedSession<S> {
        &self.session
    }

    pub fn remote(&self) -> &Arc<dyn RemoteService> {
        &self.remote
    }

    /// Poll loops currently waiting on their timer or a poll response
    pub fn active_polls(&self) -> usize {
        self.active_polls.load(Ordering::SeqCst)
    }

    /// Submit; fails while another job is live
    pub async fn submit(&self, kind: JobKind) -> Result<JobHandle, JobError> {
        let mut session = self.session.lock().await;
        let request = session.on_submit(kind)?;
        let token = self.take_over(request.ticket, request.superseded).await;
        Ok(self.launch(request, token))
    }

    /// Supersede any live job, then submit
    pub async fn submit_superseding(&self, kind: JobKind) -> Result<JobHandle, JobError> {
        let mut session = self.session.lock().await;
        let request = session.on_new_submission(kind)?;
        let token = self.take_over(request.ticket, request.superseded).await;
        Ok(self.launch(request, token))
    }

    /// Supersede any live job, then poll an already accepted one
    pub async fn resume(&self, kind: JobKind, process_id: ProcessId) -> Result<JobHandle, JobError> {
        let mut session = self.session.lock().await;
        let ResumeRequest {
            ticket,
            process_id,
            superseded,
        } = session.on_resume(kind, process_id)?;
        let token = self.take_over(ticket, superseded).await;

        let shared = Arc::clone(&self.session);
        let remote = Arc::clone(&self.remote);
        let period = self.poll_interval;
        let active_polls = Arc::clone(&self.active_polls);
        let join = tokio::spawn(async move {
            poll_until_final(&shared, remote.as_ref(), ticket, &process_id, &token, period, &active_polls).await
        });
        Ok(JobHandle { ticket, join })
    }

    /// Make `ticket`'s token the live one; callers hold the session lock
    async fn take_over(&self, ticket: JobTicket, superseded: Option<JobTicket>) -> CancellationToken {
        let token = CancellationToken::new();
        if !self.current.lock().await.install(ticket, &token) {
            debug!(ticket = ticket.value(), "Newer job already launched");
        }
        if let Some(superseded) = superseded {
            info!(ticket = superseded.value(), "Cancelled superseded poll loop");
        }
        token
    }

    fn launch(&self, request: SubmitRequest, token: CancellationToken) -> JobHandle {
        let ticket = request.ticket;
        let join = tokio::spawn(drive(
            Arc::clone(&self.session),
            Arc::clone(&self.remote),
            request,
            token,
            self.poll_interval,
            Arc::clone(&self.active_polls),
        ));
        JobHandle { ticket, join }
    }

    /// Close the reveal region once `deadline` passes
    pub fn schedule_reveal_close(&self, deadline: std::time::Instant) {
        let session = Arc::clone(&self.session);
        tokio::spawn(async move {
            tokio::time::sleep_until(Instant::from_std(deadline)).await;
            session.lock().await.tick(deadline);
        });
    }
}

async fn drive<S: RenderSurface + 'static>(
    session: SharedSession<S>,
    remote: Arc<dyn RemoteService>,
    request: SubmitRequest,
    token: CancellationToken,
    period: Duration,
    active_polls: Arc<AtomicUsize>,
) -> JobProgress {
    let SubmitRequest {
        ticket, kind, parameters, ..
    } = request;

    let ack = tokio::select! {
        biased;
        _ = token.cancelled() => return JobProgress::Ignored,
        ack = remote.submit_job(kind, &parameters) => ack,
    };
    let process_id = match session.lock().await.on_submit_ack(ticket, ack) {
        AckOutcome::Polling(process_id) => process_id,
        AckOutcome::Rejected(_) => return JobProgress::Failed,
        AckOutcome::Ignored => return JobProgress::Ignored,
    };

    poll_until_final(&session, remote.as_ref(), ticket, &process_id, &token, period, &active_polls).await
}

async fn poll_until_final<S: RenderSurface + 'static>(
    session: &SharedSession<S>,
    remote: &dyn RemoteService,
    ticket: JobTicket,
    process_id: &ProcessId,
    token: &CancellationToken,
    period: Duration,
    active_polls: &Arc<AtomicUsize>,
) -> JobProgress {
    let _active = ActivePoll::enter(active_polls);
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return JobProgress::Ignored,
            _ = ticker.tick() => {}
        }
        // The response is awaited in full before its status is inspected
        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return JobProgress::Ignored,
            response = remote.poll_job(process_id) => response,
        };
        let progress = session.lock().await.on_poll_result(ticket, response);
        debug!(ticket = ticket.value(), process_id = %process_id, ?progress, "Poll handled");
        if progress.is_final() {
            return progress;
        }
    }
}
