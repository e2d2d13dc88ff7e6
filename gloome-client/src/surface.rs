//! Render surfaces
//!
//! The client never touches a document directly. Every visible change is a
//! `set` or `clear` on a named [`RenderTarget`], which keeps the session
//! testable and lets the HTTP glue expose the same state as JSON.

use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderTarget {
    /// SVG of the current tree
    TreeCanvas,
    /// Pinned node summary
    NodePanel,
    /// Pinned branch summary
    BranchPanel,
    LikelihoodPanel,
    FileListPanel,
    /// Status / error message
    Banner,
    /// Hover preview
    Tooltip,
    /// Transient panel opened by clicking a branch
    Reveal,
}

impl RenderTarget {
    pub const ALL: [RenderTarget; 8] = [
        RenderTarget::TreeCanvas,
        RenderTarget::NodePanel,
        RenderTarget::BranchPanel,
        RenderTarget::LikelihoodPanel,
        RenderTarget::FileListPanel,
        RenderTarget::Banner,
        RenderTarget::Tooltip,
        RenderTarget::Reveal,
    ];

    /// Panels emptied when a new job starts
    pub const RESULT_PANELS: [RenderTarget; 5] = [
        RenderTarget::NodePanel,
        RenderTarget::BranchPanel,
        RenderTarget::LikelihoodPanel,
        RenderTarget::FileListPanel,
        RenderTarget::Reveal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RenderTarget::TreeCanvas => "tree_canvas",
            RenderTarget::NodePanel => "node_panel",
            RenderTarget::BranchPanel => "branch_panel",
            RenderTarget::LikelihoodPanel => "likelihood_panel",
            RenderTarget::FileListPanel => "file_list_panel",
            RenderTarget::Banner => "banner",
            RenderTarget::Tooltip => "tooltip",
            RenderTarget::Reveal => "reveal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BannerLevel {
    Info,
    Success,
    Warning,
    Danger,
    Secondary,
}

impl BannerLevel {
    pub fn css_class(&self) -> &'static str {
        match self {
            BannerLevel::Info => "alert alert-info",
            BannerLevel::Success => "alert alert-success",
            BannerLevel::Warning => "alert alert-warning",
            BannerLevel::Danger => "alert alert-danger",
            BannerLevel::Secondary => "alert alert-secondary",
        }
    }
}

/// Something that can display content in named regions
pub trait RenderSurface: Send {
    fn set(&mut self, target: RenderTarget, html: String);

    fn clear(&mut self, target: RenderTarget);

    fn show_banner(&mut self, level: BannerLevel, message: &str) {
        self.set(
            RenderTarget::Banner,
            format!(
                "<div class=\"{}\" role=\"alert\">{}</div>",
                level.css_class(),
                crate::annotation::escape_html(message)
            ),
        );
    }
}

/// In-memory surface backing the web page and the tests
#[derive(Debug, Default, Clone)]
pub struct PageSurface {
    content: HashMap<RenderTarget, String>,
    renders: HashMap<RenderTarget, usize>,
}

impl PageSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, target: RenderTarget) -> Option<&str> {
        self.content.get(&target).map(String::as_str)
    }

    /// Number of `set` calls on `target` so far
    pub fn render_count(&self, target: RenderTarget) -> usize {
        self.renders.get(&target).copied().unwrap_or(0)
    }

    pub fn banner(&self) -> Option<&str> {
        self.get(RenderTarget::Banner)
    }

    /// Current content of every non-empty region
    pub fn snapshot(&self) -> HashMap<RenderTarget, String> {
        self.content.clone()
    }
}

impl RenderSurface for PageSurface {
    fn set(&mut self, target: RenderTarget, html: String) {
        *self.renders.entry(target).or_insert(0) += 1;
        self.content.insert(target, html);
    }

    fn clear(&mut self, target: RenderTarget) {
        self.content.remove(&target);
    }
}
