use std::fmt::Write;

use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tiny_skia::{Pixmap, Transform};

use crate::*;

const MALE_STROKE: &str = "#4a90d9";
const FEMALE_STROKE: &str = "#e91e63";
const COUPLE_FILL: &str = "#fff9db";
const NODE_FILL: &str = "#ffffff";
const PARENT_EDGE_STROKE: &str = "#999999";
const SPOUSE_EDGE_STROKE: &str = "#e91e63";
const TEXT_COLOR: &str = "#1a202c";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub background: String,
    pub scale: f32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            background: "white".to_string(),
            scale: 1.0,
        }
    }
}

struct Canvas {
    width: f32,
    height: f32,
    offset_x: f32,
    offset_y: f32,
}

impl Canvas {
    fn fit(tree: &FamilyTree) -> Self {
        let mut min_x = f32::MAX;
        let mut max_x = f32::MIN;
        let mut min_y = f32::MAX;
        let mut max_y = f32::MIN;

        for node in &tree.nodes {
            min_x = min_x.min(node.x - NODE_WIDTH / 2.0);
            max_x = max_x.max(node.x + NODE_WIDTH / 2.0);
            min_y = min_y.min(node.y - NODE_HEIGHT / 2.0);
            max_y = max_y.max(node.y + NODE_HEIGHT / 2.0);
        }

        Self {
            width: (max_x - min_x) + LAYOUT_MARGIN * 2.0,
            height: (max_y - min_y) + LAYOUT_MARGIN * 2.0,
            offset_x: LAYOUT_MARGIN - min_x,
            offset_y: LAYOUT_MARGIN - min_y,
        }
    }

    fn point(&self, node: &TreeNode) -> Point {
        Point {
            x: node.x + self.offset_x,
            y: node.y + self.offset_y,
        }
    }
}

/// Draws a laid-out chart as a standalone SVG document.
pub fn render_svg(tree: &FamilyTree, options: &RenderOptions) -> Result<String> {
    if tree.is_empty() {
        bail!("cannot render an empty family chart");
    }

    let canvas = Canvas::fit(tree);
    let placed = |id: &str| {
        tree.node(id)
            .map(|node| canvas.point(node))
            .ok_or_else(|| anyhow!("missing geometry for member '{id}'"))
    };

    let mut svg = String::new();
    write!(
        svg,
        r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{:.0}" height="{:.0}" viewBox="0 0 {:.0} {:.0}" font-family="Inter, system-ui, sans-serif">
  <defs>
    <marker id="arrow-end" markerWidth="8" markerHeight="8" refX="6" refY="4" orient="auto" markerUnits="strokeWidth">
      <path d="M1,1 L6,4 L1,7 z" fill="{}" />
    </marker>
  </defs>
"##,
        canvas.width, canvas.height, canvas.width, canvas.height, PARENT_EDGE_STROKE,
    )?;
    write!(
        svg,
        "  <rect width=\"100%\" height=\"100%\" fill=\"{}\" />\n",
        escape_xml(&options.background)
    )?;

    for edge in &tree.edges {
        let source = placed(&edge.source)?;
        let target = placed(&edge.target)?;

        match edge.kind {
            EdgeKind::ParentChild => {
                let start_y = source.y + NODE_HEIGHT / 2.0;
                let end_y = target.y - NODE_HEIGHT / 2.0;
                let points = if source.x == target.x {
                    vec![(source.x, start_y), (target.x, end_y)]
                } else {
                    let mid_y = (start_y + end_y) / 2.0;
                    vec![
                        (source.x, start_y),
                        (source.x, mid_y),
                        (target.x, mid_y),
                        (target.x, end_y),
                    ]
                };
                let points = points
                    .iter()
                    .map(|(x, y)| format!("{x:.1},{y:.1}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                write!(
                    svg,
                    "  <polyline data-id=\"{}\" points=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"2\" marker-end=\"url(#arrow-end)\" />\n",
                    escape_xml(&edge.id),
                    points,
                    PARENT_EDGE_STROKE
                )?;
            }
            EdgeKind::Spouse => {
                let (x1, x2) = if source.y == target.y {
                    (source.x + NODE_WIDTH / 2.0, target.x - NODE_WIDTH / 2.0)
                } else {
                    (source.x, target.x)
                };
                write!(
                    svg,
                    "  <line data-id=\"{}\" x1=\"{:.1}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\" stroke=\"{}\" stroke-width=\"2\" />\n",
                    escape_xml(&edge.id),
                    x1,
                    source.y,
                    x2,
                    target.y,
                    SPOUSE_EDGE_STROKE
                )?;
            }
        }
    }

    for node in &tree.nodes {
        let center = canvas.point(node);
        let stroke = match node.data.gender {
            Gender::Male => MALE_STROKE,
            Gender::Female => FEMALE_STROKE,
        };
        let fill = if node.data.generation == 0 {
            COUPLE_FILL
        } else {
            NODE_FILL
        };

        write!(
            svg,
            "  <g class=\"member\" data-id=\"{}\">\n    <rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" rx=\"10\" ry=\"10\" fill=\"{}\" stroke=\"{}\" stroke-width=\"2\" />\n",
            escape_xml(&node.id),
            center.x - NODE_WIDTH / 2.0,
            center.y - NODE_HEIGHT / 2.0,
            NODE_WIDTH,
            NODE_HEIGHT,
            fill,
            stroke
        )?;

        let lines = node_label_lines(&node.data);
        let start_y = center.y - NODE_TEXT_LINE_HEIGHT * (lines.len() as f32 - 1.0) / 2.0;
        write!(
            svg,
            "    <text x=\"{:.1}\" fill=\"{}\" text-anchor=\"middle\">\n",
            center.x, TEXT_COLOR
        )?;
        for (idx, line_text) in lines.iter().enumerate() {
            let (size, weight) = if idx == 0 { (14, 600) } else { (11, 400) };
            write!(
                svg,
                "      <tspan x=\"{:.1}\" y=\"{:.1}\" font-size=\"{}\" font-weight=\"{}\" dominant-baseline=\"middle\">{}</tspan>\n",
                center.x,
                start_y + NODE_TEXT_LINE_HEIGHT * idx as f32,
                size,
                weight,
                escape_xml(line_text)
            )?;
        }
        svg.push_str("    </text>\n  </g>\n");
    }

    svg.push_str("</svg>\n");
    Ok(svg)
}

/// Rasterises [`render_svg`] output at `options.scale`.
pub fn render_png(tree: &FamilyTree, options: &RenderOptions) -> Result<Vec<u8>> {
    let scale = options.scale;
    if scale <= 0.0 {
        bail!("scale must be greater than zero when rendering PNG output");
    }

    let svg = render_svg(tree, options)?;

    let mut usvg_options = resvg::usvg::Options::default();
    usvg_options.font_family = "Inter".to_string();
    usvg_options.fontdb_mut().load_system_fonts();

    let parsed = resvg::usvg::Tree::from_str(&svg, &usvg_options)
        .map_err(|err| anyhow!("failed to parse generated SVG for PNG export: {err}"))?;

    let size = parsed.size().to_int_size();
    let scaled_width = (size.width() as f32 * scale).ceil();
    let scaled_height = (size.height() as f32 * scale).ceil();

    if !scaled_width.is_finite() || !scaled_height.is_finite() {
        bail!("scaled dimensions are not finite; try a smaller scale factor");
    }
    if scaled_width < 1.0 || scaled_height < 1.0 {
        bail!("scaled dimensions collapsed below 1px; try a larger scale factor");
    }
    if scaled_width > u32::MAX as f32 || scaled_height > u32::MAX as f32 {
        bail!("scaled dimensions exceed supported limits; try a smaller scale factor");
    }

    let scaled_width = scaled_width as u32;
    let scaled_height = scaled_height as u32;
    let mut pixmap = Pixmap::new(scaled_width, scaled_height).ok_or_else(|| {
        anyhow!("failed to allocate {scaled_width}x{scaled_height} surface for PNG export")
    })?;

    resvg::render(
        &parsed,
        Transform::from_scale(scale, scale),
        &mut pixmap.as_mut(),
    );

    pixmap
        .encode_png()
        .map_err(|err| anyhow!("failed to encode PNG output: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::{female, member, with_parent, with_spouse};

    fn small_family() -> FamilyTree {
        layout_members(&[
            with_spouse(with_parent(member("h", Side::Husband, 0, "self"), "dad"), "w"),
            female(with_spouse(member("w", Side::Wife, 0, "self"), "h")),
            member("dad", Side::Husband, 1, "father"),
            with_parent(member("kid", Side::Husband, -1, "son"), "h"),
        ])
    }

    #[test]
    fn canvas_wraps_a_single_node_with_margin() {
        let tree = layout_members(&[member("solo", Side::Husband, 0, "self")]);
        let svg = render_svg(&tree, &RenderOptions::default()).unwrap();

        assert!(svg.contains("width=\"240\" height=\"250\""));
        assert!(svg.contains("<rect x=\"80.0\" y=\"80.0\" width=\"80.0\" height=\"90.0\""));
    }

    #[test]
    fn draws_every_member_and_edge() {
        let tree = small_family();
        let svg = render_svg(&tree, &RenderOptions::default()).unwrap();

        assert_eq!(svg.matches("class=\"member\"").count(), 4);
        assert_eq!(svg.matches("<polyline").count(), 2);
        assert_eq!(svg.matches("<line ").count(), 1);
        assert!(svg.contains("data-id=\"spouse:h-w\""));
        assert!(svg.contains(COUPLE_FILL));
        assert!(svg.contains(FEMALE_STROKE));
    }

    #[test]
    fn member_text_is_escaped() {
        let mut odd = member("m1", Side::Husband, 0, "self");
        odd.name = "<Kim & Lee>".to_string();
        let svg = render_svg(&layout_members(&[odd]), &RenderOptions::default()).unwrap();

        assert!(svg.contains("&lt;Kim &amp; Lee&gt;"));
        assert!(!svg.contains("<Kim"));
    }

    #[test]
    fn empty_chart_is_an_error() {
        let err = render_svg(&FamilyTree::default(), &RenderOptions::default()).unwrap_err();
        assert!(err.to_string().contains("empty family chart"));
    }

    #[test]
    fn edges_to_missing_nodes_are_reported() {
        let mut tree = small_family();
        tree.nodes.retain(|node| node.id != "dad");
        let err = render_svg(&tree, &RenderOptions::default()).unwrap_err();
        assert!(err.to_string().contains("'dad'"));
    }

    #[test]
    fn png_export_rejects_non_positive_scale() {
        let options = RenderOptions {
            scale: 0.0,
            ..RenderOptions::default()
        };
        assert!(render_png(&small_family(), &options).is_err());
    }

    #[test]
    fn png_export_produces_a_png() {
        let options = RenderOptions {
            scale: 0.5,
            ..RenderOptions::default()
        };
        let png = render_png(&small_family(), &options).unwrap();
        assert_eq!(&png[..4], b"\x89PNG");
    }
}
