//! Page session
//!
//! One [`Session`] per page. It owns the job controller, the form manager,
//! the response router (and through it the retained tree) and the render
//! surface. Every method runs to completion; the async driver serializes
//! calls through a mutex.

use gloome_common::config::FormDependencyConfig;
use gloome_common::protocol::{ExampleResponse, JobKind, PollResponse, ProcessId, SubmitAck};
use gloome_common::FieldValue;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::error::{ClientError, RenderError};
use crate::form::{ControlKind, ControlState, FormError, FormManager, ALIGNMENT_FIELD, DISTANCE_TOGGLE, RADIAL_TOGGLE, TREE_FIELD};
use crate::job::{AckOutcome, JobController, JobDescriptor, JobError, JobState, JobTicket, PollOutcome};
use crate::layout::{DepthScale, Point};
use crate::router::ResponseRouter;
use crate::surface::{BannerLevel, PageSurface, RenderSurface, RenderTarget};
use crate::view::{HitTarget, TreeView};

/// What the driver has to send to the remote
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitRequest {
    pub ticket: JobTicket,
    pub kind: JobKind,
    pub parameters: Vec<(String, String)>,
    /// Job discarded to make room for this one
    pub superseded: Option<JobTicket>,
}

/// An accepted job to reattach to; polling starts without a submission
#[derive(Debug, Clone, PartialEq)]
pub struct ResumeRequest {
    pub ticket: JobTicket,
    pub process_id: ProcessId,
    pub superseded: Option<JobTicket>,
}

/// Effect of one poll response on the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobProgress {
    /// Response belonged to a job that is no longer live
    Ignored,
    Pending,
    Succeeded,
    Failed,
}

impl JobProgress {
    /// The poll loop for this ticket should stop
    pub fn is_final(&self) -> bool {
        !matches!(self, JobProgress::Pending)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: JobState,
    pub job: Option<JobDescriptor>,
    pub controls: Vec<ControlState>,
    pub depth_scale: DepthScale,
    pub panels: HashMap<RenderTarget, String>,
}

pub struct Session<S: RenderSurface> {
    controller: JobController,
    form: FormManager,
    router: ResponseRouter,
    surface: S,
}

impl<S: RenderSurface> Session<S> {
    pub fn new(surface: S, form_config: &FormDependencyConfig, max_poll_attempts: u32) -> Result<Self, FormError> {
        Ok(Self {
            controller: JobController::new(max_poll_attempts),
            form: FormManager::with_dependencies(form_config)?,
            router: ResponseRouter::new(),
            surface,
        })
    }

    pub fn controller(&self) -> &JobController {
        &self.controller
    }

    pub fn form(&self) -> &FormManager {
        &self.form
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn tree_view(&self) -> Option<&TreeView> {
        self.router.tree.view()
    }

    pub fn state(&self) -> JobState {
        self.controller.state()
    }

    fn clear_results(&mut self) {
        self.router.tree.discard();
        self.surface.clear(RenderTarget::TreeCanvas);
        self.surface.clear(RenderTarget::Tooltip);
        for target in RenderTarget::RESULT_PANELS {
            self.surface.clear(target);
        }
    }

    /// Submit a job of `kind` with the current form values
    ///
    /// Rejected while another job is submitting or polling; nothing changes
    /// in that case.
    pub fn on_submit(&mut self, kind: JobKind) -> Result<SubmitRequest, JobError> {
        let ticket = self.controller.begin(kind)?;
        self.clear_results();
        self.surface.show_banner(BannerLevel::Secondary, &format!("Submitting {} job", kind));
        self.form.lock();
        Ok(SubmitRequest {
            ticket,
            kind,
            parameters: self.form.submission_parameters(),
            superseded: None,
        })
    }

    /// Discard any live job, then submit
    pub fn on_new_submission(&mut self, kind: JobKind) -> Result<SubmitRequest, JobError> {
        let superseded = self.controller.supersede();
        if superseded.is_some() {
            self.form.unlock();
        }
        let mut request = self.on_submit(kind)?;
        request.superseded = superseded;
        Ok(request)
    }

    /// Discard any live job, then poll `process_id` for a `kind` result
    pub fn on_resume(&mut self, kind: JobKind, process_id: ProcessId) -> Result<ResumeRequest, JobError> {
        let superseded = self.controller.supersede();
        if superseded.is_some() {
            self.form.unlock();
        }
        let ticket = self.controller.resume(kind, process_id.clone())?;
        self.clear_results();
        self.surface
            .show_banner(BannerLevel::Info, &format!("Job {} is running", process_id));
        self.form.lock();
        Ok(ResumeRequest {
            ticket,
            process_id,
            superseded,
        })
    }

    pub fn on_submit_ack(&mut self, ticket: JobTicket, ack: Result<SubmitAck, ClientError>) -> AckOutcome {
        let outcome = self.controller.on_submit_ack(ticket, ack);
        match &outcome {
            AckOutcome::Polling(process_id) => {
                self.surface
                    .show_banner(BannerLevel::Info, &format!("Job {} is running", process_id));
            }
            AckOutcome::Rejected(message) => {
                self.form.unlock();
                self.surface.show_banner(BannerLevel::Danger, message);
            }
            AckOutcome::Ignored => {}
        }
        outcome
    }

    pub fn on_poll_result(&mut self, ticket: JobTicket, response: Result<PollResponse, ClientError>) -> JobProgress {
        match self.controller.on_poll(ticket, response) {
            PollOutcome::Ignored => JobProgress::Ignored,
            PollOutcome::Pending { .. } => JobProgress::Pending,
            PollOutcome::Failed(message) => {
                self.form.unlock();
                self.surface.show_banner(BannerLevel::Danger, &message);
                JobProgress::Failed
            }
            PollOutcome::Finished(result) => {
                self.form.unlock();
                let title = result.title.clone();
                match self.router.dispatch(*result, &mut self.form, &mut self.surface) {
                    Ok(rendered) => {
                        info!(ticket = ticket.value(), rendered, "Job finished");
                        self.surface
                            .show_banner(BannerLevel::Success, &format!("Job {} finished", title));
                    }
                    Err(err) => self.report_render_error(&err),
                }
                JobProgress::Succeeded
            }
        }
    }

    fn report_render_error(&mut self, err: &RenderError) {
        error!(error = %err, "Result could not be rendered");
        self.surface
            .show_banner(BannerLevel::Danger, &format!("Result could not be rendered: {}", err));
    }

    fn require_enabled(&self, id: &str) -> Result<(), FormError> {
        if self.form.is_enabled(id) {
            Ok(())
        } else {
            Err(FormError::Invalid(format!("control `{}` is disabled", id)))
        }
    }

    /// A toggle changed; display toggles re-lay out the retained tree
    pub fn on_toggle_changed(&mut self, id: &str, value: bool) -> Result<(), FormError> {
        self.require_enabled(id)?;
        self.form.on_toggle(id, value)?;
        if id == RADIAL_TOGGLE || id == DISTANCE_TOGGLE {
            if let Err(e) = self.on_display_option_changed() {
                debug!(toggle = id, error = %e, "Tree not re-rendered");
            }
        }
        Ok(())
    }

    /// A number or text control changed
    pub fn on_value_changed(&mut self, id: &str, value: FieldValue) -> Result<(), FormError> {
        self.require_enabled(id)?;
        self.form.set_value(id, value)
    }

    pub fn set_depth_scale(&mut self, scale: DepthScale) -> Result<(), RenderError> {
        self.router.set_depth_scale(scale);
        self.on_display_option_changed()
    }

    /// Re-lay out the retained tree with the current display options
    pub fn on_display_option_changed(&mut self) -> Result<(), RenderError> {
        let options = self.router.display_options(&self.form);
        self.router.tree.set_options(options);
        let Some(view) = self.router.tree.view_mut() else {
            return Ok(());
        };
        match view.set_options(options) {
            Ok(()) => {
                view.render(&mut self.surface);
                Ok(())
            }
            Err(err) => {
                self.report_render_error(&err);
                Err(err)
            }
        }
    }

    pub fn pointer_move(&mut self, point: Point) -> Option<HitTarget> {
        let view = self.router.tree.view_mut()?;
        view.pointer_move(point);
        view.render(&mut self.surface);
        view.hovered().cloned()
    }

    pub fn pointer_leave(&mut self) {
        if let Some(view) = self.router.tree.view_mut() {
            view.pointer_leave();
            view.render(&mut self.surface);
        }
    }

    /// Zoom by `factor` about a frame point; false without a tree
    pub fn zoom(&mut self, factor: f64, anchor: Point) -> bool {
        let Some(view) = self.router.tree.view_mut() else {
            return false;
        };
        view.zoom_by(factor, anchor);
        view.render(&mut self.surface);
        true
    }

    pub fn pan(&mut self, dx: f64, dy: f64) -> bool {
        let Some(view) = self.router.tree.view_mut() else {
            return false;
        };
        view.pan(dx, dy);
        view.render(&mut self.surface);
        true
    }

    pub fn reset_zoom(&mut self) -> bool {
        let Some(view) = self.router.tree.view_mut() else {
            return false;
        };
        view.reset_zoom();
        view.render(&mut self.surface);
        true
    }

    pub fn click(&mut self, point: Point, now: Instant) -> Option<HitTarget> {
        let view = self.router.tree.view_mut()?;
        view.click(point, now, &mut self.surface)
    }

    /// Next time the reveal region needs closing
    pub fn reveal_deadline(&self) -> Option<Instant> {
        self.router.tree.view().and_then(TreeView::reveal_deadline)
    }

    pub fn tick(&mut self, now: Instant) {
        if let Some(view) = self.router.tree.view_mut() {
            view.tick(now, &mut self.surface);
        }
    }

    /// Reset the tree and alignment inputs and empty every panel
    pub fn clear_form(&mut self) {
        self.form.clear_inputs();
        self.clear_results();
        self.surface.clear(RenderTarget::Banner);
    }

    pub fn prefill_example(&mut self, example: &ExampleResponse) {
        self.form.add_control(TREE_FIELD, ControlKind::Text, example.topology().trim());
        self.form.add_control(ALIGNMENT_FIELD, ControlKind::Text, example.alignment().trim());
    }

    /// Reject obviously invalid input before `on_submit`
    pub fn validate(&self) -> Result<(), FormError> {
        self.form.validate()
    }
}

impl Session<PageSurface> {
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.controller.state(),
            job: self.controller.live().cloned(),
            controls: self.form.control_states(),
            depth_scale: self.router.depth_scale(),
            panels: self.surface.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::tests::{payload_for, sample_tree};
    use serde_json::json;

    fn session() -> Session<PageSurface> {
        Session::new(PageSurface::new(), &FormDependencyConfig::gloome_default(), 100).unwrap()
    }

    fn accepted(id: &str) -> Result<SubmitAck, ClientError> {
        Ok(serde_json::from_value(json!({"success": true, "processID": id})).unwrap())
    }

    fn tree_result() -> PollResponse {
        let payload = serde_json::to_value(payload_for(sample_tree())).unwrap();
        PollResponse::finished(json!({"title": "5", "form_data": {"is_optimize_alpha": false}, "data": payload}))
    }

    #[test]
    fn test_submit_locks_until_terminal() {
        let mut s = session();
        let request = s.on_submit(JobKind::TreeOnly).unwrap();
        assert!(s.form().is_locked());
        assert!(request.parameters.iter().any(|(k, _)| k == TREE_FIELD));
        s.on_submit_ack(request.ticket, accepted("5"));
        assert!(s.form().is_locked());
        assert_eq!(s.on_poll_result(request.ticket, Ok(PollResponse::pending())), JobProgress::Pending);
        assert!(s.form().is_locked());
        assert_eq!(s.on_poll_result(request.ticket, Ok(tree_result())), JobProgress::Succeeded);
        assert!(!s.form().is_locked());
        assert!(s.tree_view().is_some());
        assert!(s.form().is_enabled("alpha"));
    }

    #[test]
    fn test_submit_while_busy_changes_nothing() {
        let mut s = session();
        let request = s.on_submit(JobKind::TreeOnly).unwrap();
        let before = s.snapshot().panels;
        assert!(matches!(s.on_submit(JobKind::TreeOnly), Err(JobError::Busy(_))));
        assert_eq!(s.snapshot().panels, before);
        assert!(s.controller().is_live(request.ticket));
    }

    #[test]
    fn test_new_submission_clears_previous_tree() {
        let mut s = session();
        let first = s.on_submit(JobKind::TreeOnly).unwrap();
        s.on_submit_ack(first.ticket, accepted("1"));
        s.on_poll_result(first.ticket, Ok(tree_result()));
        assert!(s.surface().get(RenderTarget::TreeCanvas).is_some());

        let second = s.on_new_submission(JobKind::TreeOnly).unwrap();
        assert_eq!(second.superseded, None);
        assert!(s.surface().get(RenderTarget::TreeCanvas).is_none());
        assert!(s.tree_view().is_none());
    }

    #[test]
    fn test_new_submission_supersedes_live_job() {
        let mut s = session();
        let first = s.on_submit(JobKind::TreeOnly).unwrap();
        s.on_submit_ack(first.ticket, accepted("1"));
        let second = s.on_new_submission(JobKind::LikelihoodOnly).unwrap();
        assert_eq!(second.superseded, Some(first.ticket));
        assert_eq!(s.on_poll_result(first.ticket, Ok(tree_result())), JobProgress::Ignored);
        assert!(s.tree_view().is_none());
        assert!(s.form().is_locked());
    }

    #[test]
    fn test_rejection_unlocks_and_shows_banner() {
        let mut s = session();
        let request = s.on_submit(JobKind::TreeOnly).unwrap();
        let rejected = Ok(serde_json::from_value(json!({"success": false, "error": "bad topology"})).unwrap());
        assert_eq!(
            s.on_submit_ack(request.ticket, rejected),
            AckOutcome::Rejected("bad topology".into())
        );
        assert!(!s.form().is_locked());
        assert!(s.surface().banner().unwrap().contains("bad topology"));
        assert_eq!(s.state(), JobState::Failed);
    }

    #[test]
    fn test_render_failure_reaches_the_banner() {
        let mut s = session();
        let request = s.on_submit(JobKind::TreeOnly).unwrap();
        s.on_submit_ack(request.ticket, accepted("2"));
        let mut payload = payload_for(sample_tree());
        payload.branch_annotations.remove("C");
        let response = PollResponse::finished(json!({"title": "2", "data": serde_json::to_value(payload).unwrap()}));
        assert_eq!(s.on_poll_result(request.ticket, Ok(response)), JobProgress::Succeeded);
        assert!(s.surface().banner().unwrap().contains("branch to `C`"));
        assert!(s.surface().get(RenderTarget::TreeCanvas).is_none());
        assert!(!s.form().is_locked());
    }

    #[test]
    fn test_display_toggle_relayouts_tree() {
        let mut s = session();
        let request = s.on_submit(JobKind::TreeOnly).unwrap();
        s.on_submit_ack(request.ticket, accepted("3"));
        s.on_poll_result(request.ticket, Ok(tree_result()));
        let renders = s.surface().render_count(RenderTarget::TreeCanvas);

        s.on_toggle_changed(RADIAL_TOGGLE, true).unwrap();
        assert!(s.tree_view().unwrap().scene().options.radial);
        assert_eq!(s.surface().render_count(RenderTarget::TreeCanvas), renders + 1);
        assert!(s
            .surface()
            .get(RenderTarget::TreeCanvas)
            .unwrap()
            .contains("viewBox=\"-300 -200 600 400\""));
    }

    #[test]
    fn test_resume_supersedes_and_polls_known_job() {
        let mut s = session();
        let first = s.on_submit(JobKind::TreeOnly).unwrap();
        s.on_submit_ack(first.ticket, accepted("1"));

        let resumed = s.on_resume(JobKind::TreeOnly, ProcessId::new("77")).unwrap();
        assert_eq!(resumed.superseded, Some(first.ticket));
        assert_eq!(s.state(), JobState::Polling);
        assert!(s.form().is_locked());
        assert!(s.surface().banner().unwrap().contains("77"));
        assert_eq!(s.on_poll_result(first.ticket, Ok(tree_result())), JobProgress::Ignored);
        assert_eq!(s.on_poll_result(resumed.ticket, Ok(tree_result())), JobProgress::Succeeded);
        assert!(s.tree_view().is_some());
        assert!(!s.form().is_locked());
    }

    #[test]
    fn test_zoom_and_pan_rerender_the_tree() {
        let mut s = session();
        assert!(!s.zoom(2.0, Point::new(0.0, 0.0)));

        let request = s.on_submit(JobKind::TreeOnly).unwrap();
        s.on_submit_ack(request.ticket, accepted("6"));
        s.on_poll_result(request.ticket, Ok(tree_result()));
        let renders = s.surface().render_count(RenderTarget::TreeCanvas);

        assert!(s.zoom(2.0, Point::new(0.0, 0.0)));
        assert!(s.pan(10.0, -5.0));
        assert_eq!(s.surface().render_count(RenderTarget::TreeCanvas), renders + 2);
        let canvas = s.surface().get(RenderTarget::TreeCanvas).unwrap();
        assert!(canvas.contains("translate(10,-5) scale(2)"));

        assert!(s.reset_zoom());
        let canvas = s.surface().get(RenderTarget::TreeCanvas).unwrap();
        assert!(canvas.contains("translate(0,0) scale(1)"));
    }

    #[test]
    fn test_disabled_controls_reject_changes() {
        let mut s = session();
        assert!(s.on_value_changed("alpha", FieldValue::Number(2.0)).is_err());
        s.on_submit(JobKind::TreeOnly).unwrap();
        assert!(s.on_toggle_changed("is_optimize_alpha", false).is_err());
    }

    #[test]
    fn test_clear_form_empties_inputs_and_panels() {
        let mut s = session();
        s.on_value_changed(TREE_FIELD, "(A,B);".into()).unwrap();
        let request = s.on_submit(JobKind::TreeOnly).unwrap();
        s.on_submit_ack(request.ticket, accepted("4"));
        s.on_poll_result(request.ticket, Ok(tree_result()));
        s.clear_form();
        assert_eq!(s.form().value(TREE_FIELD), Some(&FieldValue::Text(String::new())));
        assert!(s.snapshot().panels.is_empty());
    }

    #[test]
    fn test_prefill_example() {
        let mut s = session();
        let example: ExampleResponse =
            serde_json::from_value(json!({"message": [">A\n01\n", "(A:1,B:2);\n"]})).unwrap();
        s.prefill_example(&example);
        assert_eq!(s.form().value(TREE_FIELD), Some(&FieldValue::Text("(A:1,B:2);".into())));
        assert_eq!(s.form().value(ALIGNMENT_FIELD), Some(&FieldValue::Text(">A\n01".into())));
    }

    #[test]
    fn test_snapshot_reports_live_job() {
        let mut s = session();
        let request = s.on_submit(JobKind::FileListOnly).unwrap();
        s.on_submit_ack(request.ticket, accepted("99"));
        let snapshot = s.snapshot();
        assert_eq!(snapshot.state, JobState::Polling);
        assert_eq!(snapshot.job.unwrap().process_id, Some(ProcessId::new("99")));
    }
}
