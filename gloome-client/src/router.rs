//! Response router
//!
//! Hands each output of a finished job to its renderer. Echoed form values
//! are written back into the controls first so display toggles echoed by the
//! service apply to the tree being drawn.

use gloome_common::protocol::{FileListPayload, JobResult, LikelihoodPayload, ResultOutput, TreePayload};
use tracing::{debug, error};

use crate::annotation::{render_file_list, render_likelihood};
use crate::error::RenderError;
use crate::form::{FormManager, DISTANCE_TOGGLE, RADIAL_TOGGLE};
use crate::layout::{DepthScale, DisplayOptions};
use crate::surface::{RenderSurface, RenderTarget};
use crate::view::TreeView;

/// One result kind to one render target
pub trait ResultRenderer {
    type Payload;

    fn target(&self) -> RenderTarget;

    fn render(&mut self, payload: Self::Payload, surface: &mut dyn RenderSurface) -> Result<(), RenderError>;
}

/// Draws the tree and retains it for re-layout and pointer events
#[derive(Debug, Default)]
pub struct TreeRenderer {
    options: DisplayOptions,
    view: Option<TreeView>,
}

impl TreeRenderer {
    pub fn options(&self) -> DisplayOptions {
        self.options
    }

    pub fn set_options(&mut self, options: DisplayOptions) {
        self.options = options;
    }

    pub fn view(&self) -> Option<&TreeView> {
        self.view.as_ref()
    }

    pub fn view_mut(&mut self) -> Option<&mut TreeView> {
        self.view.as_mut()
    }

    /// Drop the retained tree
    pub fn discard(&mut self) {
        self.view = None;
    }
}

impl ResultRenderer for TreeRenderer {
    type Payload = TreePayload;

    fn target(&self) -> RenderTarget {
        RenderTarget::TreeCanvas
    }

    fn render(&mut self, payload: TreePayload, surface: &mut dyn RenderSurface) -> Result<(), RenderError> {
        match TreeView::new(payload, self.options) {
            Ok(view) => {
                view.render(surface);
                self.view = Some(view);
                Ok(())
            }
            Err(err) => {
                self.view = None;
                surface.clear(self.target());
                Err(err)
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct LikelihoodRenderer;

impl ResultRenderer for LikelihoodRenderer {
    type Payload = LikelihoodPayload;

    fn target(&self) -> RenderTarget {
        RenderTarget::LikelihoodPanel
    }

    fn render(&mut self, payload: LikelihoodPayload, surface: &mut dyn RenderSurface) -> Result<(), RenderError> {
        surface.set(self.target(), render_likelihood(&payload));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FileListRenderer;

impl ResultRenderer for FileListRenderer {
    type Payload = FileListPayload;

    fn target(&self) -> RenderTarget {
        RenderTarget::FileListPanel
    }

    fn render(&mut self, payload: FileListPayload, surface: &mut dyn RenderSurface) -> Result<(), RenderError> {
        surface.set(self.target(), render_file_list(&payload));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ResponseRouter {
    pub tree: TreeRenderer,
    pub likelihood: LikelihoodRenderer,
    pub files: FileListRenderer,
    depth_scale: DepthScale,
}

impl ResponseRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth_scale(&self) -> DepthScale {
        self.depth_scale
    }

    pub fn set_depth_scale(&mut self, scale: DepthScale) {
        self.depth_scale = scale;
    }

    /// Display options as currently set in the form
    pub fn display_options(&self, form: &FormManager) -> DisplayOptions {
        DisplayOptions {
            radial: form.toggle(RADIAL_TOGGLE),
            show_distance: form.toggle(DISTANCE_TOGGLE),
            depth_scale: self.depth_scale,
        }
    }

    /// Render every output of `result`
    ///
    /// Outputs are independent: a failing tree does not stop the likelihood
    /// or file list from rendering. The first failure is returned.
    pub fn dispatch(
        &mut self,
        result: JobResult,
        form: &mut FormManager,
        surface: &mut dyn RenderSurface,
    ) -> Result<usize, RenderError> {
        form.refill(&result.form_data);
        self.tree.set_options(self.display_options(form));

        let mut rendered = 0;
        let mut first_error = None;
        for output in result.outputs {
            let kind = output.kind_name();
            let outcome = match output {
                ResultOutput::Tree(payload) => self.tree.render(payload, surface),
                ResultOutput::Likelihood(payload) => self.likelihood.render(payload, surface),
                ResultOutput::FileList(payload) => self.files.render(payload, surface),
            };
            match outcome {
                Ok(()) => {
                    rendered += 1;
                    debug!(kind, title = %result.title, "Rendered result");
                }
                Err(err) => {
                    error!(kind, title = %result.title, error = %err, "Failed to render result");
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(rendered),
        }
    }
}
