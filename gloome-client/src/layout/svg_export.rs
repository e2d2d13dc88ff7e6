//! SVG serialization of a [`TreeScene`]

use svg::node::element::{Circle, Group, Path, Text};
use svg::Document;

use super::{
    fmt, radial_radius, Label, SceneNode, TreeScene, ZoomTransform, EDGE_HOVER_STROKE, EDGE_STROKE, EDGE_STROKE_WIDTH,
    FRAME_HEIGHT, FRAME_WIDTH, GROUP_SCALE, MARGIN_LEFT, MARGIN_TOP, NODE_STROKE, NODE_STROKE_WIDTH,
};
use crate::view::HitTarget;

/// Render the scene under `zoom`, drawing `hovered` with its hover style
///
/// Radial trees get a viewBox of the same size centred on the origin.
pub fn export_svg(scene: &TreeScene, zoom: &ZoomTransform, hovered: Option<&HitTarget>) -> String {
    let view_box = if scene.options.radial {
        (-FRAME_WIDTH / 2.0, -FRAME_HEIGHT / 2.0, FRAME_WIDTH, FRAME_HEIGHT)
    } else {
        (0.0, 0.0, FRAME_WIDTH, FRAME_HEIGHT)
    };

    let mut group = Group::new().set(
        "transform",
        format!("translate({},{}) scale({})", MARGIN_LEFT, MARGIN_TOP, GROUP_SCALE),
    );

    for edge in &scene.edges {
        let hot = matches!(hovered, Some(HitTarget::Edge(name)) if *name == edge.child_name);
        group = group.add(
            Path::new()
                .set("class", "link")
                .set("data-branch", edge.child_name.as_str())
                .set("d", edge.path.as_str())
                .set("fill", "none")
                .set("stroke", if hot { EDGE_HOVER_STROKE } else { EDGE_STROKE })
                .set("stroke-width", if hot { EDGE_STROKE_WIDTH * 2.0 } else { EDGE_STROKE_WIDTH }),
        );
    }

    for node in &scene.nodes {
        let hot = matches!(hovered, Some(HitTarget::Node(name)) if *name == node.name);
        group = group.add(node_group(scene, node, hot));
    }

    Document::new()
        .set("width", FRAME_WIDTH)
        .set("height", FRAME_HEIGHT)
        .set("viewBox", view_box)
        .set("data-radius", fmt(radial_radius()))
        .add(
            Group::new()
                .set("class", "zoom")
                .set("transform", zoom.svg_transform())
                .add(group),
        )
        .to_string()
}

fn node_group(scene: &TreeScene, node: &SceneNode, hot: bool) -> Group {
    let transform = if scene.options.radial {
        format!(
            "rotate({}) translate({},0)",
            fmt(node.breadth.to_degrees() - 90.0),
            fmt(node.reach)
        )
    } else {
        format!("translate({},{})", fmt(node.reach), fmt(node.breadth))
    };
    let style = if hot { &node.hover } else { &node.base };

    let mut group = Group::new()
        .set("class", "node")
        .set("data-node", node.name.as_str())
        .set("transform", transform)
        .add(
            Circle::new()
                .set("r", style.radius)
                .set("fill", style.fill)
                .set("stroke", NODE_STROKE)
                .set("stroke-width", NODE_STROKE_WIDTH),
        )
        .add(label_text(&node.label));
    if let Some(distance) = &node.distance_label {
        group = group.add(label_text(distance).set("class", "distance"));
    }
    group
}

fn label_text(label: &Label) -> Text {
    Text::new(label.text.as_str())
        .set("dx", label.dx)
        .set("dy", label.dy)
        .set("font-size", label.font_size)
        .set("font-family", label.font_family)
        .set("font-weight", label.font_weight)
        .set("fill", label.fill)
        .set("text-anchor", label.anchor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::tests::{payload_for, sample_tree};
    use crate::layout::{layout_tree, DisplayOptions, Point};

    fn scene(radial: bool) -> TreeScene {
        let options = DisplayOptions {
            radial,
            show_distance: true,
            ..DisplayOptions::default()
        };
        layout_tree(&payload_for(sample_tree()), options).unwrap()
    }

    #[test]
    fn test_one_group_per_node_and_one_path_per_edge() {
        let svg = export_svg(&scene(false), &ZoomTransform::IDENTITY, None);
        assert_eq!(svg.matches("data-node=").count(), 8);
        assert_eq!(svg.matches("data-branch=").count(), 7);
        assert!(svg.contains("viewBox=\"0 0 600 400\""));
        assert!(svg.contains("translate(40,20) scale(0.9)"));
    }

    #[test]
    fn test_radial_view_box_is_centered() {
        let svg = export_svg(&scene(true), &ZoomTransform::IDENTITY, None);
        assert!(svg.contains("viewBox=\"-300 -200 600 400\""));
        assert!(svg.contains("width=\"600\""));
        assert!(svg.contains("height=\"400\""));
        assert!(svg.contains("rotate("));
    }

    #[test]
    fn test_zoom_wraps_the_drawing_group() {
        let zoom = ZoomTransform::IDENTITY
            .scaled_about(2.0, Point::new(0.0, 0.0))
            .translated(15.0, -10.5);
        let svg = export_svg(&scene(false), &zoom, None);
        let outer = svg.find("translate(15,-10.5) scale(2)").unwrap();
        let inner = svg.find("translate(40,20) scale(0.9)").unwrap();
        assert!(outer < inner);
    }

    #[test]
    fn test_hovered_node_uses_hover_style() {
        let s = scene(false);
        let plain = export_svg(&s, &ZoomTransform::IDENTITY, None);
        assert!(!plain.contains("coral"));
        let hot = export_svg(&s, &ZoomTransform::IDENTITY, Some(&HitTarget::Node("N1".into())));
        assert!(hot.contains("fill=\"coral\""));
        assert!(hot.contains("r=\"22\""));
    }

    #[test]
    fn test_distance_labels_rendered() {
        let svg = export_svg(&scene(false), &ZoomTransform::IDENTITY, None);
        assert!(svg.contains("[0.25]"));
        assert!(svg.contains("darkcyan"));
    }
}
