//! Tree layout engine
//!
//! Converts a [`TreePayload`] plus [`DisplayOptions`] into a [`TreeScene`]:
//! node positions, role-based styles, label placement, edge paths and the
//! pre-rendered annotation tables shown on hover and click.
//!
//! Layout is pure. The same payload and options always give the same scene,
//! so display toggles re-run [`layout_tree`] from scratch against the retained
//! payload.
//!
//! Geometry follows the page the service ships with: a 600×400 frame with
//! 20/40/20/40 margins, the drawing group translated by the top-left margin
//! and scaled by 0.9. Linear trees grow left to right over 520×360; radial
//! trees have radius `min(260, 180)` around the origin.

pub mod svg_export;
pub mod tidy;

use gloome_common::protocol::{TreeNode, TreePayload};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::f64::consts::PI;

use crate::annotation::{render_table, TableMode, BRANCH_SUMMARY_TITLE, NODE_SUMMARY_TITLE};
use crate::error::RenderError;
use tidy::{Separation, Shape};

pub const FRAME_WIDTH: f64 = 600.0;
pub const FRAME_HEIGHT: f64 = 400.0;
pub const MARGIN_TOP: f64 = 20.0;
pub const MARGIN_RIGHT: f64 = 40.0;
pub const MARGIN_BOTTOM: f64 = 20.0;
pub const MARGIN_LEFT: f64 = 40.0;
pub const INNER_WIDTH: f64 = FRAME_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
pub const INNER_HEIGHT: f64 = FRAME_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
pub const GROUP_SCALE: f64 = 0.9;

pub const MIN_ZOOM: f64 = 0.125;
pub const MAX_ZOOM: f64 = 32.0;

pub const NODE_STROKE: &str = "steelblue";
pub const NODE_STROKE_WIDTH: f64 = 2.0;
pub const EDGE_STROKE: &str = "silver";
pub const EDGE_HOVER_STROKE: &str = "steelblue";
pub const EDGE_STROKE_WIDTH: f64 = 1.5;

/// How the depth axis is scaled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DepthScale {
    /// Fixed step per level (edge count from the root)
    #[default]
    Levels,
    /// Cumulative branch length from the root
    BranchLength,
}

/// Display flags that only affect drawing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DisplayOptions {
    #[serde(default)]
    pub radial: bool,
    #[serde(default)]
    pub show_distance: bool,
    #[serde(default)]
    pub depth_scale: DepthScale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Root,
    Internal,
    Leaf,
}

impl NodeRole {
    fn classify(is_root: bool, has_children: bool) -> Self {
        match (is_root, has_children) {
            (true, _) => NodeRole::Root,
            (false, true) => NodeRole::Internal,
            (false, false) => NodeRole::Leaf,
        }
    }

    pub fn base_color(&self) -> &'static str {
        match self {
            NodeRole::Root => "crimson",
            NodeRole::Internal => "darkorange",
            NodeRole::Leaf => "forestgreen",
        }
    }

    pub fn hover_color(&self) -> &'static str {
        match self {
            NodeRole::Root => "coral",
            NodeRole::Internal => "gold",
            NodeRole::Leaf => "limegreen",
        }
    }

    fn base_radius(&self) -> f64 {
        match self {
            NodeRole::Root => 20.0,
            NodeRole::Internal => 15.0,
            NodeRole::Leaf => 10.0,
        }
    }

    fn label_fill(&self) -> &'static str {
        match self {
            NodeRole::Root => "maroon",
            NodeRole::Internal => "navy",
            NodeRole::Leaf => "black",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// User zoom and pan, applied around the drawing group in frame units
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZoomTransform {
    pub scale: f64,
    pub x: f64,
    pub y: f64,
}

impl Default for ZoomTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl ZoomTransform {
    pub const IDENTITY: Self = Self { scale: 1.0, x: 0.0, y: 0.0 };

    pub fn apply(&self, point: Point) -> Point {
        Point::new(point.x * self.scale + self.x, point.y * self.scale + self.y)
    }

    /// Frame point on screen to the same point before zooming
    pub fn invert(&self, point: Point) -> Point {
        Point::new((point.x - self.x) / self.scale, (point.y - self.y) / self.scale)
    }

    /// Multiply the scale by `factor`, keeping `anchor` fixed on screen
    ///
    /// The scale is clamped to `MIN_ZOOM..=MAX_ZOOM`; a non-positive or
    /// non-finite factor leaves the transform unchanged.
    pub fn scaled_about(self, factor: f64, anchor: Point) -> Self {
        if !(factor.is_finite() && factor > 0.0) {
            return self;
        }
        let scale = (self.scale * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        let fixed = self.invert(anchor);
        Self {
            scale,
            x: anchor.x - fixed.x * scale,
            y: anchor.y - fixed.y * scale,
        }
    }

    pub fn translated(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..self
        }
    }

    pub fn svg_transform(&self) -> String {
        format!("translate({},{}) scale({})", fmt(self.x), fmt(self.y), fmt(self.scale))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeStyle {
    pub radius: f64,
    pub fill: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub text: String,
    pub dx: f64,
    pub dy: f64,
    pub font_size: f64,
    pub font_family: &'static str,
    pub font_weight: &'static str,
    pub fill: &'static str,
    pub anchor: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub name: String,
    pub role: NodeRole,
    pub depth: usize,
    pub parent: Option<usize>,
    /// Spread-axis coordinate: vertical offset (linear) or angle in radians (radial)
    pub breadth: f64,
    /// Depth-axis coordinate: horizontal offset (linear) or radius (radial)
    pub reach: f64,
    /// Position inside the drawing group
    pub position: Point,
    pub base: NodeStyle,
    pub hover: NodeStyle,
    pub label: Label,
    pub distance_label: Option<Label>,
    /// Pinned into the node panel on click
    pub summary_html: String,
    /// Shown in the tooltip on hover
    pub preview_html: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneEdge {
    pub parent: usize,
    pub child: usize,
    pub child_name: String,
    pub curve: [Point; 4],
    /// SVG path data
    pub path: String,
    pub summary_html: String,
    pub preview_html: String,
}

impl SceneEdge {
    const SAMPLES: usize = 32;

    pub fn point_at(&self, t: f64) -> Point {
        let [p0, c0, c1, p1] = self.curve;
        let u = 1.0 - t;
        let (a, b, c, d) = (u * u * u, 3.0 * u * u * t, 3.0 * u * t * t, t * t * t);
        Point::new(
            a * p0.x + b * c0.x + c * c1.x + d * p1.x,
            a * p0.y + b * c0.y + c * c1.y + d * p1.y,
        )
    }

    /// Approximate distance from `point` to the curve
    pub fn distance_to(&self, point: Point) -> f64 {
        let samples: Vec<Point> = (0..=Self::SAMPLES)
            .map(|i| self.point_at(i as f64 / Self::SAMPLES as f64))
            .collect();
        samples
            .windows(2)
            .map(|w| segment_distance(point, w[0], w[1]))
            .fold(f64::INFINITY, f64::min)
    }
}

fn segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return p.distance_to(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0);
    p.distance_to(Point::new(a.x + t * dx, a.y + t * dy))
}

/// Laid-out tree, nodes in pre-order (index 0 is the root)
#[derive(Debug, Clone, PartialEq)]
pub struct TreeScene {
    pub nodes: Vec<SceneNode>,
    pub edges: Vec<SceneEdge>,
    pub options: DisplayOptions,
    pub size_factor: f64,
}

impl TreeScene {
    pub fn node(&self, name: &str) -> Option<&SceneNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn edge_to(&self, child_name: &str) -> Option<&SceneEdge> {
        self.edges.iter().find(|e| e.child_name == child_name)
    }

    pub fn count_role(&self, role: NodeRole) -> usize {
        self.nodes.iter().filter(|n| n.role == role).count()
    }

    /// Map a point in frame (viewBox) coordinates into the drawing group
    pub fn to_group(&self, point: Point) -> Point {
        Point::new(
            (point.x - MARGIN_LEFT) / GROUP_SCALE,
            (point.y - MARGIN_TOP) / GROUP_SCALE,
        )
    }

    /// Inverse of [`TreeScene::to_group`]
    pub fn to_frame(&self, point: Point) -> Point {
        Point::new(
            point.x * GROUP_SCALE + MARGIN_LEFT,
            point.y * GROUP_SCALE + MARGIN_TOP,
        )
    }
}

/// Arena view of the hierarchy with siblings sorted by name
struct Flattened<'a> {
    nodes: Vec<&'a TreeNode>,
    shape: Shape,
}

fn flatten(root: &TreeNode) -> Flattened<'_> {
    let mut nodes = Vec::new();
    let mut parent = Vec::new();
    let mut depth = Vec::new();
    let mut children: Vec<Vec<usize>> = Vec::new();

    let mut stack: Vec<(&TreeNode, Option<usize>, usize)> = vec![(root, None, 0)];
    while let Some((node, p, d)) = stack.pop() {
        let index = nodes.len();
        nodes.push(node);
        parent.push(p);
        depth.push(d);
        children.push(Vec::new());
        if let Some(p) = p {
            children[p].push(index);
        }
        let mut sorted: Vec<&TreeNode> = node.children.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        for child in sorted.into_iter().rev() {
            stack.push((child, Some(index), d + 1));
        }
    }

    Flattened {
        nodes,
        shape: Shape {
            parent,
            children,
            depth,
        },
    }
}

fn check_preconditions(payload: &TreePayload, flat: &Flattened<'_>) -> Result<(), RenderError> {
    if !(payload.size_factor.is_finite() && payload.size_factor > 0.0) {
        return Err(RenderError::InvalidSizeFactor(payload.size_factor));
    }
    let mut seen = HashSet::new();
    for (i, node) in flat.nodes.iter().enumerate() {
        if !seen.insert(node.name.as_str()) {
            return Err(RenderError::DuplicateNodeName(node.name.clone()));
        }
        if !payload.node_annotations.contains_key(&node.name) {
            return Err(RenderError::MissingNodeAnnotation(node.name.clone()));
        }
        if flat.shape.parent[i].is_some() && !payload.branch_annotations.contains_key(&node.name) {
            return Err(RenderError::MissingBranchAnnotation(node.name.clone()));
        }
    }
    Ok(())
}

/// Depth-axis coordinate per node, scaled onto `[0, extent]`
fn reach(flat: &Flattened<'_>, scale: DepthScale, extent: f64) -> Vec<f64> {
    let levels = || {
        let deepest = flat.shape.depth.iter().copied().max().unwrap_or(0).max(1) as f64;
        flat.shape.depth.iter().map(|d| *d as f64 * extent / deepest).collect()
    };
    match scale {
        DepthScale::Levels => levels(),
        DepthScale::BranchLength => {
            // Pre-order guarantees the parent is filled in before its children.
            let mut cumulative = vec![0.0; flat.nodes.len()];
            for i in 1..flat.nodes.len() {
                if let Some(p) = flat.shape.parent[i] {
                    cumulative[i] = cumulative[p] + flat.nodes[i].distance.max(0.0);
                }
            }
            let longest = cumulative.iter().copied().fold(0.0, f64::max);
            if longest > 0.0 {
                cumulative.iter().map(|c| c * extent / longest).collect()
            } else {
                levels()
            }
        }
    }
}

fn point_radial(angle: f64, radius: f64) -> Point {
    let a = angle - PI / 2.0;
    Point::new(radius * a.cos(), radius * a.sin())
}

/// Radius of the radial layout
pub fn radial_radius() -> f64 {
    (INNER_WIDTH / 2.0).min(INNER_HEIGHT / 2.0)
}

/// Cubic Bézier control points of the link from `source` to `target`
fn link_curve(options: &DisplayOptions, source: &SceneNode, target: &SceneNode) -> [Point; 4] {
    if options.radial {
        // Radial bump: control points at the mean radius on each endpoint's angle
        let mid = (source.reach + target.reach) / 2.0;
        [
            point_radial(source.breadth, source.reach),
            point_radial(source.breadth, mid),
            point_radial(target.breadth, mid),
            point_radial(target.breadth, target.reach),
        ]
    } else {
        let (s, t) = (source.position, target.position);
        let mx = (s.x + t.x) / 2.0;
        [s, Point::new(mx, s.y), Point::new(mx, t.y), t]
    }
}

fn path_data(curve: &[Point; 4]) -> String {
    let [p0, c0, c1, p1] = curve;
    format!(
        "M{},{}C{},{},{},{},{},{}",
        fmt(p0.x), fmt(p0.y), fmt(c0.x), fmt(c0.y), fmt(c1.x), fmt(c1.y), fmt(p1.x), fmt(p1.y)
    )
}

/// Compact number formatting for path data
pub(crate) fn fmt(v: f64) -> String {
    let rounded = (v * 1000.0).round() / 1000.0;
    if rounded == 0.0 {
        "0".to_string()
    } else {
        format!("{}", rounded)
    }
}

fn truncated(value: f64, size_factor: f64) -> f64 {
    (value / size_factor).trunc()
}

fn format_distance(distance: f64) -> String {
    if distance.fract() == 0.0 && distance.abs() < 1e15 {
        format!("[{}]", distance as i64)
    } else {
        format!("[{}]", distance)
    }
}

fn labels(node: &TreeNode, role: NodeRole, options: &DisplayOptions, sf: f64) -> (Label, Option<Label>) {
    let is_leaf = node.is_leaf();
    let dy = truncated(if is_leaf { 3.0 } else { 6.0 }, sf);
    let dx = truncated(if is_leaf { 18.0 } else { 24.0 }, sf);
    let name = Label {
        text: node.name.clone(),
        dx,
        dy,
        font_size: truncated(if is_leaf { 12.0 } else { 16.0 }, sf),
        font_family: "Verdana",
        font_weight: if is_leaf { "normal" } else { "bold" },
        fill: role.label_fill(),
        anchor: "start",
    };
    // Mirrored to the other side of the node
    let distance = (options.show_distance && role != NodeRole::Root).then(|| Label {
        text: format_distance(node.distance),
        dx: -dx,
        dy,
        font_size: truncated(10.0, sf),
        font_family: "sans-serif",
        font_weight: "normal",
        fill: "darkcyan",
        anchor: "end",
    });
    (name, distance)
}

/// Lay out a tree result
///
/// Fails without producing a scene when a node lacks its annotation entry,
/// a branch lacks its entry, a name repeats, or an attribute named in a sort
/// list is missing from a record.
pub fn layout_tree(payload: &TreePayload, options: DisplayOptions) -> Result<TreeScene, RenderError> {
    let flat = flatten(&payload.root);
    check_preconditions(payload, &flat)?;
    let sf = payload.size_factor;

    let (separation, breadth_extent, depth_extent) = if options.radial {
        (Separation::DepthWeighted, 2.0 * PI, radial_radius())
    } else {
        (Separation::Flat, INNER_HEIGHT, INNER_WIDTH)
    };
    let breadth = tidy::place(&flat.shape, separation, breadth_extent);
    let reach = reach(&flat, options.depth_scale, depth_extent);

    let mut nodes = Vec::with_capacity(flat.nodes.len());
    for (i, node) in flat.nodes.iter().enumerate() {
        let parent = flat.shape.parent[i];
        let role = NodeRole::classify(parent.is_none(), !node.children.is_empty());
        let position = if options.radial {
            point_radial(breadth[i], reach[i])
        } else {
            Point::new(reach[i], breadth[i])
        };
        let radius = truncated(role.base_radius(), sf);
        let (label, distance_label) = labels(node, role, &options, sf);

        let record = &payload.node_annotations[&node.name];
        let table = |mode: &TableMode| {
            render_table(record, &payload.node_sort_list, mode, payload.sequence_length)
                .map_err(|e| RenderError::in_record(&node.name, e))
        };
        let summary_html = table(&TableMode::summary(NODE_SUMMARY_TITLE))?;
        let preview_html = table(&TableMode::Inline)?;

        nodes.push(SceneNode {
            name: node.name.clone(),
            role,
            depth: flat.shape.depth[i],
            parent,
            breadth: breadth[i],
            reach: reach[i],
            position,
            base: NodeStyle {
                radius,
                fill: role.base_color(),
            },
            hover: NodeStyle {
                radius: radius + 2.0,
                fill: role.hover_color(),
            },
            label,
            distance_label,
            summary_html,
            preview_html,
        });
    }

    let mut edges = Vec::with_capacity(nodes.len().saturating_sub(1));
    for (child, node) in nodes.iter().enumerate() {
        let Some(parent) = node.parent else { continue };
        let record = &payload.branch_annotations[&node.name];
        let table = |mode: &TableMode| {
            render_table(record, &payload.branch_sort_list, mode, payload.sequence_length)
                .map_err(|e| RenderError::in_record(&node.name, e))
        };
        let curve = link_curve(&options, &nodes[parent], node);
        edges.push(SceneEdge {
            parent,
            child,
            child_name: node.name.clone(),
            curve,
            path: path_data(&curve),
            summary_html: table(&TableMode::summary(BRANCH_SUMMARY_TITLE))?,
            preview_html: table(&TableMode::Inline)?,
        });
    }

    Ok(TreeScene {
        nodes,
        edges,
        options,
        size_factor: sf,
    })
}
