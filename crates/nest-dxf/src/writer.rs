//! Emits a nested-sheet DXF by re-reading each part's source file and
//! transforming its entities per the nester's placement. Grounded in
//! the teacher's `dxf_export.rs` layer/entity conventions (layers
//! keyed by name, `Entity::new(EntityType::X(..))`, `entity.common.layer`)
//! and the original `dxf_writer.py`'s centroid-pivot transform, which
//! this MUST reproduce exactly to stay consistent with the nester (see
//! the rotation pivot invariant).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use dxf::entities::{Entity, EntityType, Line, LwPolyline, Text};
use dxf::enums::AcadVersion;
use dxf::tables::Layer;
use dxf::{Drawing, LwPolylineVertex, Point};
use nest_core::Point2D;
use nest_packer::{Placement, SheetResult};

use crate::error::ImportError;
use crate::reader::flatten_spline;

pub mod layers {
    pub const SHEET: &str = "SHEET";
    pub const MARGIN: &str = "MARGIN";
    pub const PARTS: &str = "PARTS";
    pub const LABELS: &str = "LABELS";
}

/// Write one nested sheet's DXF to `output_path`. `source_dxf_paths`
/// maps part id to the local path of its original (downloaded) DXF.
pub fn write_nested_sheet(
    sheet: &SheetResult,
    source_dxf_paths: &HashMap<String, PathBuf>,
    output_path: &Path,
) -> Result<(), ImportError> {
    let mut drawing = new_drawing();
    add_layers(&mut drawing);

    add_closed_rect(&mut drawing, 0.0, 0.0, sheet.width, sheet.height, layers::SHEET);

    for placement in &sheet.placements {
        let source = source_dxf_paths.get(&placement.part_id);
        let inserted = source.and_then(|path| insert_part_from_dxf(&mut drawing, path, placement).ok());
        if inserted.is_none() {
            draw_polygon_fallback(&mut drawing, placement);
        }

        let centroid = placement
            .polygon
            .centroid()
            .unwrap_or(Point2D::new(placement.x, placement.y));
        add_label(
            &mut drawing,
            &format!("{}#{}", placement.part_id, placement.instance),
            centroid,
            (0.25_f64).min(sheet.width / 100.0),
        );
    }

    drawing
        .save_file(output_path)
        .map_err(|e| ImportError::Write(e.to_string()))
}

fn new_drawing() -> Drawing {
    let mut drawing = Drawing::new();
    drawing.header.version = AcadVersion::R2010;
    drawing
}

fn add_layers(drawing: &mut Drawing) {
    let specs = [
        (layers::SHEET, 7),
        (layers::MARGIN, 8),
        (layers::PARTS, 3),
        (layers::LABELS, 5),
    ];
    for (name, color_index) in specs {
        drawing.add_layer(Layer {
            name: name.to_string(),
            color: dxf::Color::from_index(color_index),
            ..Default::default()
        });
    }
}

fn add_closed_rect(drawing: &mut Drawing, x0: f64, y0: f64, w: f64, h: f64, layer: &str) {
    let mut lwp = LwPolyline::default();
    lwp.set_is_closed(true);
    lwp.vertices = vec![
        LwPolylineVertex { x: x0, y: y0, ..Default::default() },
        LwPolylineVertex { x: x0 + w, y: y0, ..Default::default() },
        LwPolylineVertex { x: x0 + w, y: y0 + h, ..Default::default() },
        LwPolylineVertex { x: x0, y: y0 + h, ..Default::default() },
    ];
    let mut entity = Entity::new(EntityType::LwPolyline(lwp));
    entity.common.layer = layer.to_string();
    drawing.add_entity(entity);
}

fn add_label(drawing: &mut Drawing, text: &str, at: Point2D, height: f64) {
    let label = Text {
        value: text.to_string(),
        location: Point::new(at.x, at.y, 0.0),
        text_height: height,
        ..Default::default()
    };
    let mut entity = Entity::new(EntityType::Text(label));
    entity.common.layer = layers::LABELS.to_string();
    drawing.add_entity(entity);
}

fn draw_polygon_fallback(drawing: &mut Drawing, placement: &Placement) {
    let points = placement.polygon.exterior_points();
    if points.len() < 3 {
        return;
    }
    let mut lwp = LwPolyline::default();
    lwp.set_is_closed(true);
    lwp.vertices = points
        .iter()
        .map(|p| LwPolylineVertex { x: p.x, y: p.y, ..Default::default() })
        .collect();
    let mut entity = Entity::new(EntityType::LwPolyline(lwp));
    entity.common.layer = layers::PARTS.to_string();
    drawing.add_entity(entity);
}

fn rotate_point(p: Point2D, pivot: Point2D, degrees: f64) -> Point2D {
    let rad = degrees.to_radians();
    let (sin_r, cos_r) = rad.sin_cos();
    let dx = p.x - pivot.x;
    let dy = p.y - pivot.y;
    Point2D::new(
        pivot.x + dx * cos_r - dy * sin_r,
        pivot.y + dx * sin_r + dy * cos_r,
    )
}

/// Reads `path`, rotates every entity's points about the centroid of
/// all its points by `placement.rotation`, then translates so the
/// rotated bounding-box minimum lands on `placement.polygon`'s
/// lower-left corner — identical to the transform the nester applies
/// to the same source geometry.
fn insert_part_from_dxf(
    drawing: &mut Drawing,
    path: &Path,
    placement: &Placement,
) -> Result<(), ImportError> {
    let source = dxf::Drawing::load_file(path).map_err(|e| ImportError::BadInput {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let all_points = collect_points(&source);
    if all_points.is_empty() {
        return Err(ImportError::BadInput {
            path: path.display().to_string(),
            message: "no geometry found in source DXF".to_string(),
        });
    }

    let n = all_points.len() as f64;
    let centroid = Point2D::new(
        all_points.iter().map(|p| p.x).sum::<f64>() / n,
        all_points.iter().map(|p| p.y).sum::<f64>() / n,
    );

    let target_min = placement
        .polygon
        .bounds()
        .ok_or_else(|| ImportError::Write("placement polygon has no bounds".to_string()))?;

    let rotated_min_x = all_points
        .iter()
        .map(|p| rotate_point(*p, centroid, placement.rotation).x)
        .fold(f64::INFINITY, f64::min);
    let rotated_min_y = all_points
        .iter()
        .map(|p| rotate_point(*p, centroid, placement.rotation).y)
        .fold(f64::INFINITY, f64::min);

    let transform = |p: Point2D| -> Point2D {
        let r = rotate_point(p, centroid, placement.rotation);
        Point2D::new(
            r.x - rotated_min_x + target_min.min_x,
            r.y - rotated_min_y + target_min.min_y,
        )
    };

    for entity in source.entities() {
        match &entity.specific {
            EntityType::Line(line) => {
                let p1 = transform(Point2D::new(line.p1.x, line.p1.y));
                let p2 = transform(Point2D::new(line.p2.x, line.p2.y));
                let new_line = Line {
                    p1: Point::new(p1.x, p1.y, 0.0),
                    p2: Point::new(p2.x, p2.y, 0.0),
                    ..Default::default()
                };
                let mut e = Entity::new(EntityType::Line(new_line));
                e.common.layer = layers::PARTS.to_string();
                drawing.add_entity(e);
            }
            EntityType::LwPolyline(lwp) => {
                let vertices = lwp
                    .vertices
                    .iter()
                    .map(|v| {
                        let t = transform(Point2D::new(v.x, v.y));
                        LwPolylineVertex { x: t.x, y: t.y, ..Default::default() }
                    })
                    .collect();
                let mut new_lwp = LwPolyline::default();
                new_lwp.set_is_closed(lwp.is_closed());
                new_lwp.vertices = vertices;
                let mut e = Entity::new(EntityType::LwPolyline(new_lwp));
                e.common.layer = layers::PARTS.to_string();
                drawing.add_entity(e);
            }
            EntityType::Circle(circle) => {
                let c = transform(Point2D::new(circle.center.x, circle.center.y));
                let new_circle = dxf::entities::Circle {
                    center: Point::new(c.x, c.y, 0.0),
                    radius: circle.radius,
                    ..Default::default()
                };
                let mut e = Entity::new(EntityType::Circle(new_circle));
                e.common.layer = layers::PARTS.to_string();
                drawing.add_entity(e);
            }
            EntityType::Arc(arc) => {
                let c = transform(Point2D::new(arc.center.x, arc.center.y));
                let new_arc = dxf::entities::Arc {
                    center: Point::new(c.x, c.y, 0.0),
                    radius: arc.radius,
                    start_angle: arc.start_angle + placement.rotation,
                    end_angle: arc.end_angle + placement.rotation,
                    ..Default::default()
                };
                let mut e = Entity::new(EntityType::Arc(new_arc));
                e.common.layer = layers::PARTS.to_string();
                drawing.add_entity(e);
            }
            EntityType::Spline(spline) => {
                let points = flatten_spline(spline, 0.01);
                if points.len() < 2 {
                    continue;
                }
                let vertices = points
                    .iter()
                    .map(|p| {
                        let t = transform(*p);
                        LwPolylineVertex { x: t.x, y: t.y, ..Default::default() }
                    })
                    .collect();
                let mut new_lwp = LwPolyline::default();
                new_lwp.set_is_closed(spline.is_closed());
                new_lwp.vertices = vertices;
                let mut e = Entity::new(EntityType::LwPolyline(new_lwp));
                e.common.layer = layers::PARTS.to_string();
                drawing.add_entity(e);
            }
            _ => continue,
        }
    }

    Ok(())
}

fn collect_points(drawing: &Drawing) -> Vec<Point2D> {
    let mut points = Vec::new();
    for entity in drawing.entities() {
        match &entity.specific {
            EntityType::Line(line) => {
                points.push(Point2D::new(line.p1.x, line.p1.y));
                points.push(Point2D::new(line.p2.x, line.p2.y));
            }
            EntityType::Arc(arc) => points.push(Point2D::new(arc.center.x, arc.center.y)),
            EntityType::Circle(circle) => points.push(Point2D::new(circle.center.x, circle.center.y)),
            EntityType::LwPolyline(lwp) => {
                points.extend(lwp.vertices.iter().map(|v| Point2D::new(v.x, v.y)));
            }
            EntityType::Spline(spline) => {
                points.extend(flatten_spline(spline, 0.01));
            }
            _ => continue,
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_point_90_degrees() {
        let pivot = Point2D::origin();
        let p = Point2D::new(1.0, 0.0);
        let rotated = rotate_point(p, pivot, 90.0);
        assert!(rotated.x.abs() < 1e-9);
        assert!((rotated.y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_rotate_point_identity_at_zero_degrees() {
        let pivot = Point2D::new(3.0, 4.0);
        let p = Point2D::new(5.0, 6.0);
        let rotated = rotate_point(p, pivot, 0.0);
        assert!((rotated.x - p.x).abs() < 1e-9);
        assert!((rotated.y - p.y).abs() < 1e-9);
    }
}
