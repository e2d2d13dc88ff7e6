//! Interactive tree view
//!
//! Owns the retained payload, the current scene, the zoom and the pointer
//! state. All interaction arrives as explicit events with frame coordinates;
//! output goes to a [`RenderSurface`].

use gloome_common::protocol::TreePayload;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::RenderError;
use crate::layout::{layout_tree, svg_export, DisplayOptions, Point, TreeScene, ZoomTransform};
use crate::surface::{RenderSurface, RenderTarget};

/// How long the reveal region stays open after a branch click
pub const REVEAL_DURATION: Duration = Duration::from_millis(7500);

/// Pointer to tooltip offset
pub const TOOLTIP_OFFSET: (f64, f64) = (10.0, -20.0);

/// Edge pick tolerance in group units
pub const EDGE_TOLERANCE: f64 = 4.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "lowercase")]
pub enum HitTarget {
    Node(String),
    /// Identified by the child node's name
    Edge(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tooltip {
    pub html: String,
    pub at: Point,
}

#[derive(Debug)]
pub struct TreeView {
    payload: TreePayload,
    scene: TreeScene,
    zoom: ZoomTransform,
    hovered: Option<HitTarget>,
    tooltip: Option<Tooltip>,
    reveal_until: Option<Instant>,
}

impl TreeView {
    pub fn new(payload: TreePayload, options: DisplayOptions) -> Result<Self, RenderError> {
        let scene = layout_tree(&payload, options)?;
        Ok(Self {
            payload,
            scene,
            zoom: ZoomTransform::IDENTITY,
            hovered: None,
            tooltip: None,
            reveal_until: None,
        })
    }

    pub fn scene(&self) -> &TreeScene {
        &self.scene
    }

    pub fn payload(&self) -> &TreePayload {
        &self.payload
    }

    pub fn zoom(&self) -> &ZoomTransform {
        &self.zoom
    }

    pub fn hovered(&self) -> Option<&HitTarget> {
        self.hovered.as_ref()
    }

    pub fn tooltip(&self) -> Option<&Tooltip> {
        self.tooltip.as_ref()
    }

    pub fn reveal_deadline(&self) -> Option<Instant> {
        self.reveal_until
    }

    /// Re-layout from scratch against the retained payload
    ///
    /// Zoom, hover and tooltip state is dropped since positions move.
    pub fn set_options(&mut self, options: DisplayOptions) -> Result<(), RenderError> {
        self.scene = layout_tree(&self.payload, options)?;
        self.zoom = ZoomTransform::IDENTITY;
        self.hovered = None;
        self.tooltip = None;
        Ok(())
    }

    /// Wheel zoom about a frame point
    pub fn zoom_by(&mut self, factor: f64, anchor: Point) {
        self.zoom = self.zoom.scaled_about(factor, anchor);
        debug!(scale = self.zoom.scale, x = self.zoom.x, y = self.zoom.y, "Zoomed");
    }

    /// Drag by a frame-unit offset
    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.zoom = self.zoom.translated(dx, dy);
    }

    pub fn reset_zoom(&mut self) {
        self.zoom = ZoomTransform::IDENTITY;
    }

    /// Node whose circle contains the point, else the nearest edge within tolerance
    pub fn hit_test(&self, frame_point: Point) -> Option<HitTarget> {
        let p = self.scene.to_group(self.zoom.invert(frame_point));

        // Later nodes are drawn on top
        if let Some(node) = self
            .scene
            .nodes
            .iter()
            .rev()
            .find(|n| n.position.distance_to(p) <= n.base.radius)
        {
            return Some(HitTarget::Node(node.name.clone()));
        }

        self.scene
            .edges
            .iter()
            .map(|e| (e.distance_to(p), e))
            .filter(|(d, _)| *d <= EDGE_TOLERANCE)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, e)| HitTarget::Edge(e.child_name.clone()))
    }

    fn preview_html(&self, target: &HitTarget) -> Option<String> {
        match target {
            HitTarget::Node(name) => self.scene.node(name).map(|n| n.preview_html.clone()),
            HitTarget::Edge(name) => self.scene.edge_to(name).map(|e| e.preview_html.clone()),
        }
    }

    /// Pointer moved; returns true when the hover target changed
    pub fn pointer_move(&mut self, frame_point: Point) -> bool {
        let target = self.hit_test(frame_point);
        let at = Point::new(frame_point.x + TOOLTIP_OFFSET.0, frame_point.y + TOOLTIP_OFFSET.1);
        let changed = target != self.hovered;
        self.tooltip = target
            .as_ref()
            .and_then(|t| self.preview_html(t))
            .map(|html| Tooltip { html, at });
        self.hovered = target;
        changed
    }

    pub fn pointer_leave(&mut self) {
        self.hovered = None;
        self.tooltip = None;
    }

    /// Click at a point; pins the matching summary
    pub fn click<S: RenderSurface + ?Sized>(&mut self, frame_point: Point, now: Instant, surface: &mut S) -> Option<HitTarget> {
        let target = self.hit_test(frame_point)?;
        match &target {
            HitTarget::Node(name) => {
                if let Some(node) = self.scene.node(name) {
                    surface.set(RenderTarget::NodePanel, node.summary_html.clone());
                }
            }
            HitTarget::Edge(name) => {
                if let Some(edge) = self.scene.edge_to(name) {
                    surface.set(RenderTarget::BranchPanel, edge.summary_html.clone());
                    surface.set(RenderTarget::Reveal, edge.summary_html.clone());
                    self.reveal_until = Some(now + REVEAL_DURATION);
                }
            }
        }
        debug!(target = ?target, "Pinned summary");
        Some(target)
    }

    /// Close the reveal region once its deadline has passed
    pub fn tick<S: RenderSurface + ?Sized>(&mut self, now: Instant, surface: &mut S) {
        if let Some(deadline) = self.reveal_until {
            if now >= deadline {
                self.reveal_until = None;
                surface.clear(RenderTarget::Reveal);
            }
        }
    }

    pub fn svg(&self) -> String {
        svg_export::export_svg(&self.scene, &self.zoom, self.hovered.as_ref())
    }

    /// Push the canvas and tooltip to the surface
    pub fn render<S: RenderSurface + ?Sized>(&self, surface: &mut S) {
        surface.set(RenderTarget::TreeCanvas, self.svg());
        match &self.tooltip {
            Some(t) => surface.set(
                RenderTarget::Tooltip,
                format!(
                    "<div class=\"tooltip\" style=\"left: {}px; top: {}px\">{}</div>",
                    t.at.x, t.at.y, t.html
                ),
            ),
            None => surface.clear(RenderTarget::Tooltip),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::tests::{payload_for, sample_tree};
    use crate::surface::PageSurface;

    fn view() -> TreeView {
        TreeView::new(payload_for(sample_tree()), DisplayOptions::default()).unwrap()
    }

    fn frame_point_of(view: &TreeView, name: &str) -> Point {
        let node = view.scene().node(name).unwrap();
        view.scene().to_frame(node.position)
    }

    #[test]
    fn test_hit_test_finds_nodes() {
        let v = view();
        for node in &v.scene().nodes {
            let p = frame_point_of(&v, &node.name);
            assert_eq!(v.hit_test(p), Some(HitTarget::Node(node.name.clone())));
        }
    }

    #[test]
    fn test_hit_test_finds_edge_midpoint() {
        let v = view();
        let edge = v.scene().edge_to("N3").unwrap();
        let mid = v.scene().to_frame(edge.point_at(0.5));
        assert_eq!(v.hit_test(mid), Some(HitTarget::Edge("N3".into())));
    }

    #[test]
    fn test_hit_test_misses_empty_space() {
        let v = view();
        assert_eq!(v.hit_test(Point::new(-500.0, -500.0)), None);
    }

    #[test]
    fn test_hit_test_follows_zoom_and_pan() {
        let mut v = view();
        let unzoomed = frame_point_of(&v, "D");
        v.zoom_by(3.0, Point::new(100.0, 50.0));
        v.pan(-40.0, 25.0);

        let on_screen = v.zoom().apply(unzoomed);
        assert_eq!(v.hit_test(on_screen), Some(HitTarget::Node("D".into())));
        assert_ne!(v.hit_test(unzoomed), Some(HitTarget::Node("D".into())));

        v.reset_zoom();
        assert_eq!(v.hit_test(unzoomed), Some(HitTarget::Node("D".into())));
    }

    #[test]
    fn test_option_change_resets_zoom() {
        let mut v = view();
        v.zoom_by(2.0, Point::new(0.0, 0.0));
        v.set_options(DisplayOptions {
            radial: true,
            ..DisplayOptions::default()
        })
        .unwrap();
        assert_eq!(*v.zoom(), ZoomTransform::IDENTITY);
    }

    #[test]
    fn test_hover_previews_and_leave_closes() {
        let mut v = view();
        let p = frame_point_of(&v, "A");
        assert!(v.pointer_move(p));
        let tooltip = v.tooltip().unwrap();
        assert_eq!(tooltip.at, Point::new(p.x + 10.0, p.y - 20.0));
        assert!(!tooltip.html.contains("<details"));
        assert!(!v.pointer_move(p));
        v.pointer_leave();
        assert!(v.tooltip().is_none());
        assert!(v.hovered().is_none());
    }

    #[test]
    fn test_node_click_pins_summary() {
        let mut v = view();
        let mut page = PageSurface::new();
        let p = frame_point_of(&v, "C");
        assert_eq!(v.click(p, Instant::now(), &mut page), Some(HitTarget::Node("C".into())));
        let panel = page.get(RenderTarget::NodePanel).unwrap();
        assert!(panel.contains("Node information"));
        assert!(page.get(RenderTarget::Reveal).is_none());
    }

    #[test]
    fn test_edge_click_opens_reveal_until_deadline() {
        let mut v = view();
        let mut page = PageSurface::new();
        let edge = v.scene().edge_to("E").unwrap();
        let p = v.scene().to_frame(edge.point_at(0.5));
        let start = Instant::now();
        assert_eq!(v.click(p, start, &mut page), Some(HitTarget::Edge("E".into())));
        assert!(page.get(RenderTarget::BranchPanel).unwrap().contains("Branch information"));
        assert!(page.get(RenderTarget::Reveal).is_some());

        v.tick(start + Duration::from_millis(7000), &mut page);
        assert!(page.get(RenderTarget::Reveal).is_some());
        v.tick(start + REVEAL_DURATION, &mut page);
        assert!(page.get(RenderTarget::Reveal).is_none());
        assert!(page.get(RenderTarget::BranchPanel).is_some());
    }

    #[test]
    fn test_option_change_matches_fresh_render() {
        let mut v = view();
        let radial = DisplayOptions {
            radial: true,
            show_distance: true,
            ..DisplayOptions::default()
        };
        v.set_options(radial).unwrap();
        let fresh = TreeView::new(payload_for(sample_tree()), radial).unwrap();
        assert_eq!(v.scene(), fresh.scene());
        assert_eq!(v.svg(), fresh.svg());
    }
}
