//! Renders a nested-sheet DXF (the DXF Writer's own output) as an SVG
//! preview. Only handles the entity types the DXF writer emits: LINE,
//! LWPOLYLINE, CIRCLE, ARC, TEXT. Grounded in the original
//! `svg_writer.py` — same palette, same viewBox convention, same
//! Y-flip (DXF is Y-up, SVG is Y-down; this module is the only place
//! that flip happens).

use std::path::Path;

use dxf::entities::EntityType;

use crate::error::ImportError;
use crate::writer::layers;

const BACKGROUND: &str = "#0f172a";
const DEFAULT_STROKE: &str = "#94a3b8";
const SCALE: f64 = 12.0;
const PAD: f64 = 0.5;

fn layer_color(layer: &str) -> &'static str {
    match layer {
        l if l == layers::SHEET => "#64748b",
        l if l == layers::MARGIN => "#334155",
        l if l == layers::PARTS => "#22c55e",
        l if l == layers::LABELS => "#38bdf8",
        _ => DEFAULT_STROKE,
    }
}

/// Read `dxf_path` and write an SVG preview to `svg_path`.
pub fn write_svg_from_dxf(
    dxf_path: &Path,
    svg_path: &Path,
    sheet_width: f64,
    sheet_height: f64,
) -> Result<(), ImportError> {
    let drawing = dxf::Drawing::load_file(dxf_path).map_err(|e| ImportError::BadInput {
        path: dxf_path.display().to_string(),
        message: e.to_string(),
    })?;

    let vb_w = sheet_width + PAD * 2.0;
    let vb_h = sheet_height + PAD * 2.0;
    let stroke_w = (sheet_width / 400.0).max(0.08);
    let sheet_stroke_w = stroke_w * 0.5;
    let label_size = (sheet_width / 40.0).max(0.8);

    let mut svg = String::new();
    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}px\" height=\"{}px\" viewBox=\"{} {} {} {}\">\n",
        vb_w * SCALE,
        vb_h * SCALE,
        -PAD,
        -PAD,
        vb_w,
        vb_h
    ));
    svg.push_str(&format!(
        "  <rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"{}\" />\n",
        -PAD, -PAD, vb_w, vb_h, BACKGROUND
    ));

    let flip = |y: f64| sheet_height - y;

    for entity in drawing.entities() {
        let layer = entity.common.layer.as_str();
        let color = layer_color(layer);
        let sw = if layer == layers::SHEET { sheet_stroke_w } else { stroke_w };

        match &entity.specific {
            EntityType::Line(line) => {
                svg.push_str(&format!(
                    "  <line x1=\"{}\" y1=\"{}\" x2=\"{}\" y2=\"{}\" stroke=\"{}\" stroke-width=\"{}\" fill=\"none\" />\n",
                    line.p1.x, flip(line.p1.y), line.p2.x, flip(line.p2.y), color, sw
                ));
            }
            EntityType::LwPolyline(lwp) => {
                let mut points: Vec<(f64, f64)> =
                    lwp.vertices.iter().map(|v| (v.x, flip(v.y))).collect();
                if points.is_empty() {
                    continue;
                }
                if lwp.is_closed() {
                    points.push(points[0]);
                }
                let point_str = points
                    .iter()
                    .map(|(x, y)| format!("{x},{y}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                svg.push_str(&format!(
                    "  <polyline points=\"{point_str}\" stroke=\"{color}\" stroke-width=\"{sw}\" fill=\"none\" />\n"
                ));
            }
            EntityType::Circle(circle) => {
                svg.push_str(&format!(
                    "  <circle cx=\"{}\" cy=\"{}\" r=\"{}\" stroke=\"{}\" stroke-width=\"{}\" fill=\"none\" />\n",
                    circle.center.x,
                    flip(circle.center.y),
                    circle.radius,
                    color,
                    sw
                ));
            }
            EntityType::Arc(arc) => {
                svg.push_str(&arc_path(arc, sheet_height, color, sw));
            }
            EntityType::Text(text) => {
                svg.push_str(&format!(
                    "  <text x=\"{}\" y=\"{}\" fill=\"{}\" font-size=\"{}px\" font-family=\"monospace\" text-anchor=\"middle\" dominant-baseline=\"central\">{}</text>\n",
                    text.location.x,
                    flip(text.location.y),
                    color,
                    label_size,
                    escape_xml(&text.value)
                ));
            }
            _ => continue,
        }
    }

    svg.push_str("</svg>\n");
    std::fs::write(svg_path, svg).map_err(|e| ImportError::Write(e.to_string()))
}

/// DXF angles are CCW from +X in degrees. After the Y-flip the sweep
/// direction visually inverts; matching the original writer, the
/// sweep flag is pinned to 1 regardless, which is the established
/// (if slightly surprising) behavior for this preview.
fn arc_path(arc: &dxf::entities::Arc, sheet_height: f64, color: &str, stroke_w: f64) -> String {
    let flip = |y: f64| sheet_height - y;
    let start_rad = arc.start_angle.to_radians();
    let end_rad = arc.end_angle.to_radians();
    let sx = arc.center.x + arc.radius * start_rad.cos();
    let sy = flip(arc.center.y + arc.radius * start_rad.sin());
    let ex = arc.center.x + arc.radius * end_rad.cos();
    let ey = flip(arc.center.y + arc.radius * end_rad.sin());
    let sweep = (arc.end_angle - arc.start_angle).rem_euclid(360.0);
    let large_arc = if sweep > 180.0 { 1 } else { 0 };
    format!(
        "  <path d=\"M {sx},{sy} A {r},{r} 0 {large_arc},1 {ex},{ey}\" stroke=\"{color}\" stroke-width=\"{stroke_w}\" fill=\"none\" />\n",
        r = arc.radius
    )
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_color_mapping() {
        assert_eq!(layer_color(layers::SHEET), "#64748b");
        assert_eq!(layer_color(layers::PARTS), "#22c55e");
        assert_eq!(layer_color(layers::LABELS), "#38bdf8");
        assert_eq!(layer_color("UNKNOWN"), DEFAULT_STROKE);
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a<b>&c"), "a&lt;b&gt;&amp;c");
    }
}
