//! Turns a DXF file's modelspace entities into closed polygons.
//!
//! Grounded in the teacher's `dxf_import.rs` entity dispatch (match over
//! `entity.specific`, layer read from `entity.common.layer`) generalized
//! from rectangle detection to general closed-polygon extraction, per
//! the original Python `dxf_parser.py`.

use std::collections::HashSet;
use std::path::Path;

use nest_core::{Point2D, Polygon};

use crate::error::ImportError;

/// Minimum polygon area kept after repair; degenerate slivers below
/// this are discarded.
const MIN_POLYGON_AREA: f64 = 0.001;

#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Maximum chord/flattening error, inches.
    pub chord_tolerance: f64,
    /// If set, only entities on one of these layers are read.
    pub allowed_layers: Option<HashSet<String>>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            chord_tolerance: 0.01,
            allowed_layers: None,
        }
    }
}

/// Read `path` and return its closed polygons, sorted by area
/// descending. Returns an empty vec (not an error) if the file parses
/// but contains no usable geometry.
pub fn read_polygons(path: &Path, options: &ReaderOptions) -> Result<Vec<Polygon>, ImportError> {
    let drawing = dxf::Drawing::load_file(path).map_err(|e| ImportError::BadInput {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(polygons_from_drawing(&drawing, options))
}

fn polygons_from_drawing(drawing: &dxf::Drawing, options: &ReaderOptions) -> Vec<Polygon> {
    let mut direct_polygons: Vec<Polygon> = Vec::new();
    let mut chains: Vec<Vec<Point2D>> = Vec::new();
    let tol = options.chord_tolerance.max(1e-6);

    for entity in drawing.entities() {
        let layer = &entity.common.layer;
        if let Some(allowed) = &options.allowed_layers {
            if !allowed.contains(layer) {
                continue;
            }
        }

        match &entity.specific {
            dxf::entities::EntityType::Line(line) => {
                let p0 = Point2D::new(line.p1.x, line.p1.y);
                let p1 = Point2D::new(line.p2.x, line.p2.y);
                if p0.distance_to(p1) > tol {
                    chains.push(vec![p0, p1]);
                }
            }
            dxf::entities::EntityType::Arc(arc) => {
                let points = discretize_arc(
                    Point2D::new(arc.center.x, arc.center.y),
                    arc.radius,
                    arc.start_angle,
                    arc.end_angle,
                    tol,
                );
                if points.len() >= 2 {
                    chains.push(points);
                }
            }
            dxf::entities::EntityType::Circle(circle) => {
                let points =
                    discretize_circle(Point2D::new(circle.center.x, circle.center.y), circle.radius, tol);
                if let Some(poly) = Polygon::from_points(&points) {
                    direct_polygons.push(poly);
                }
            }
            dxf::entities::EntityType::LwPolyline(lwp) => {
                let (points, closed) = flatten_lwpolyline(lwp, tol);
                if points.len() < 3 {
                    continue;
                }
                if closed {
                    if let Some(poly) = Polygon::from_points(&points) {
                        direct_polygons.push(poly);
                    }
                } else {
                    chains.push(points);
                }
            }
            dxf::entities::EntityType::Spline(spline) => {
                let points = flatten_spline(spline, tol);
                if points.len() < 2 {
                    continue;
                }
                if spline.is_closed() && points.len() >= 3 {
                    if let Some(poly) = Polygon::from_points(&points) {
                        direct_polygons.push(poly);
                    }
                } else {
                    chains.push(points);
                }
            }
            _ => continue,
        }
    }

    let stitched = stitch_chains(chains, tol);

    let mut polygons: Vec<Polygon> = direct_polygons
        .into_iter()
        .chain(stitched)
        .filter_map(|p| if p.area() > MIN_POLYGON_AREA { Some(p) } else { p.repaired() })
        .filter(|p| !p.is_empty() && p.area() > MIN_POLYGON_AREA)
        .collect();

    polygons.sort_by(|a, b| b.area().partial_cmp(&a.area()).unwrap_or(std::cmp::Ordering::Equal));
    polygons
}

fn discretize_arc(center: Point2D, radius: f64, start_deg: f64, end_deg: f64, chord_tol: f64) -> Vec<Point2D> {
    let mut end = end_deg;
    if start_deg >= end_deg {
        end += 360.0;
    }
    let start = start_deg.to_radians();
    let end = end.to_radians();
    let arc_len = radius * (end - start).abs();
    let n = ((arc_len / chord_tol).ceil() as usize).max(2).min(360);
    (0..=n)
        .map(|i| {
            let t = start + (end - start) * (i as f64 / n as f64);
            Point2D::new(center.x + radius * t.cos(), center.y + radius * t.sin())
        })
        .collect()
}

fn discretize_circle(center: Point2D, radius: f64, chord_tol: f64) -> Vec<Point2D> {
    let circumference = 2.0 * std::f64::consts::PI * radius;
    let n = ((circumference / chord_tol).ceil() as usize).max(12).min(360);
    (0..n)
        .map(|i| {
            let t = 2.0 * std::f64::consts::PI * (i as f64 / n as f64);
            Point2D::new(center.x + radius * t.cos(), center.y + radius * t.sin())
        })
        .collect()
}

/// Walk LWPOLYLINE vertices, expanding bulged segments into arcs.
/// Returns the flattened point chain and whether the source was closed.
fn flatten_lwpolyline(lwp: &dxf::entities::LwPolyline, chord_tol: f64) -> (Vec<Point2D>, bool) {
    let closed = lwp.is_closed();
    let verts = &lwp.vertices;
    if verts.is_empty() {
        return (Vec::new(), closed);
    }

    let mut points = vec![Point2D::new(verts[0].x, verts[0].y)];
    let n = verts.len();
    let segment_count = if closed { n } else { n - 1 };

    for i in 0..segment_count {
        let v0 = &verts[i];
        let v1 = &verts[(i + 1) % n];
        let p0 = Point2D::new(v0.x, v0.y);
        let p1 = Point2D::new(v1.x, v1.y);
        if v0.bulge.abs() > 1e-9 {
            let arc_points = bulge_to_arc_points(p0, p1, v0.bulge, chord_tol);
            points.extend(arc_points.into_iter().skip(1));
        } else {
            points.push(p1);
        }
    }

    (points, closed)
}

/// Bulge-to-arc construction per the standard DXF convention:
/// `bulge = tan(Δθ/4)`; sagitta and radius follow from the chord
/// length; the arc center sits on the chord normal, offset by
/// `radius − sagitta`, signed by the bulge direction.
fn bulge_to_arc_points(p0: Point2D, p1: Point2D, bulge: f64, chord_tol: f64) -> Vec<Point2D> {
    let chord = p0.distance_to(p1);
    if chord < 1e-9 {
        return vec![p0, p1];
    }
    let sagitta = bulge.abs() * chord / 2.0;
    if sagitta < 1e-9 {
        return vec![p0, p1];
    }
    let radius = chord * chord / (8.0 * sagitta) + sagitta / 2.0;

    let ux = (p1.x - p0.x) / chord;
    let uy = (p1.y - p0.y) / chord;
    let sign = bulge.signum();
    let nx = -uy * sign;
    let ny = ux * sign;

    let mx = (p0.x + p1.x) / 2.0;
    let my = (p0.y + p1.y) / 2.0;
    let offset = radius - sagitta;
    let cx = mx + nx * offset;
    let cy = my + ny * offset;

    let start_angle = (p0.y - cy).atan2(p0.x - cx);
    let delta = 4.0 * bulge.atan();
    let arc_len = radius * delta.abs();
    let n = ((arc_len / chord_tol).ceil() as usize).max(2).min(360);

    (0..=n)
        .map(|i| {
            let t = start_angle + delta * (i as f64 / n as f64);
            Point2D::new(cx + radius * t.cos(), cy + radius * t.sin())
        })
        .collect()
}

/// Flattens a SPLINE via de Boor's algorithm, sampled at a rate driven
/// by chord tolerance and total control-polygon length.
pub(crate) fn flatten_spline(spline: &dxf::entities::Spline, chord_tol: f64) -> Vec<Point2D> {
    let control_points: Vec<Point2D> = spline
        .control_points
        .iter()
        .map(|p| Point2D::new(p.x, p.y))
        .collect();
    if control_points.len() < 2 {
        return Vec::new();
    }
    let degree = spline.degree_of_curve.max(1) as usize;
    let knots = &spline.knot_values;
    if knots.len() < control_points.len() + degree + 1 {
        // Malformed knot vector; fall back to the control polygon itself.
        return control_points;
    }

    let control_len: f64 = control_points
        .windows(2)
        .map(|w| w[0].distance_to(w[1]))
        .sum();
    let n = ((control_len / chord_tol).ceil() as usize).max(8).min(360);

    let t_min = knots[degree];
    let t_max = knots[knots.len() - degree - 1];

    (0..=n)
        .map(|i| {
            let t = t_min + (t_max - t_min) * (i as f64 / n as f64);
            deboor_point(&control_points, knots, degree, t)
        })
        .collect()
}

fn deboor_point(control_points: &[Point2D], knots: &[f64], degree: usize, t: f64) -> Point2D {
    let n_ctrl = control_points.len();
    let mut k = degree;
    for i in degree..n_ctrl {
        if t >= knots[i] && t < knots[i + 1] {
            k = i;
        }
    }
    if t >= knots[n_ctrl] {
        k = n_ctrl - 1;
    }

    let mut d: Vec<Point2D> = (0..=degree).map(|j| control_points[k - degree + j]).collect();
    for r in 1..=degree {
        for j in (r..=degree).rev() {
            let i = k - degree + j;
            let denom = knots[i + degree - r + 1] - knots[i];
            let alpha = if denom.abs() < 1e-12 {
                0.0
            } else {
                (t - knots[i]) / denom
            };
            d[j] = Point2D::new(
                (1.0 - alpha) * d[j - 1].x + alpha * d[j].x,
                (1.0 - alpha) * d[j - 1].y + alpha * d[j].y,
            );
        }
    }
    d[degree]
}

/// Substitute for planar polygonize: an undirected graph over chain
/// endpoints quantized to `tol`, walked greedily until a chain's tail
/// returns to its own start. Dangling chains (no matching endpoint)
/// are simply left unclosed and produce no polygon.
fn stitch_chains(chains: Vec<Vec<Point2D>>, tol: f64) -> Vec<Polygon> {
    let mut remaining: Vec<Option<Vec<Point2D>>> = chains.into_iter().map(Some).collect();
    let mut polygons = Vec::new();

    loop {
        let Some(start_idx) = remaining.iter().position(|c| c.is_some()) else {
            break;
        };
        let mut loop_points = remaining[start_idx].take().unwrap();
        let start_key = quantize(loop_points[0], tol);

        loop {
            let tail_key = quantize(*loop_points.last().unwrap(), tol);
            if tail_key == start_key && loop_points.len() > 2 {
                break;
            }
            let next = remaining.iter().enumerate().find_map(|(i, maybe)| {
                let chain = maybe.as_ref()?;
                if quantize(chain[0], tol) == tail_key {
                    Some((i, false))
                } else if quantize(*chain.last().unwrap(), tol) == tail_key {
                    Some((i, true))
                } else {
                    None
                }
            });
            match next {
                Some((i, reversed)) => {
                    let mut chain = remaining[i].take().unwrap();
                    if reversed {
                        chain.reverse();
                    }
                    loop_points.extend(chain.into_iter().skip(1));
                }
                None => break,
            }
        }

        let tail_key = quantize(*loop_points.last().unwrap(), tol);
        if tail_key == start_key && loop_points.len() >= 3 {
            if let Some(poly) = Polygon::from_points(&loop_points) {
                polygons.push(poly);
            }
        }
    }

    polygons
}

fn quantize(p: Point2D, tol: f64) -> (i64, i64) {
    let inv = 1.0 / tol;
    ((p.x * inv).round() as i64, (p.y * inv).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> Point2D {
        Point2D::new(x, y)
    }

    #[test]
    fn test_discretize_circle_min_count() {
        let points = discretize_circle(Point2D::origin(), 1.0, 100.0);
        assert!(points.len() >= 12);
    }

    #[test]
    fn test_discretize_circle_respects_tolerance() {
        let coarse = discretize_circle(Point2D::origin(), 10.0, 1.0).len();
        let fine = discretize_circle(Point2D::origin(), 10.0, 0.01).len();
        assert!(fine > coarse);
    }

    #[test]
    fn test_discretize_arc_handles_wraparound() {
        // start_angle (350) >= end_angle (10) must wrap through 360.
        let points = discretize_arc(Point2D::origin(), 5.0, 350.0, 10.0, 0.05);
        assert!(points.len() >= 2);
        let expected_start = p(5.0 * 350f64.to_radians().cos(), 5.0 * 350f64.to_radians().sin());
        let expected_end = p(5.0 * 10f64.to_radians().cos(), 5.0 * 10f64.to_radians().sin());
        assert!(points[0].distance_to(expected_start) < 1e-6);
        assert!(points.last().unwrap().distance_to(expected_end) < 1e-6);
    }

    #[test]
    fn test_bulge_to_arc_zero_bulge_is_straight() {
        let points = bulge_to_arc_points(p(0.0, 0.0), p(1.0, 0.0), 0.0, 0.01);
        assert_eq!(points, vec![p(0.0, 0.0), p(1.0, 0.0)]);
    }

    #[test]
    fn test_bulge_to_arc_semicircle() {
        // bulge = 1.0 is a semicircle (delta_theta = pi)
        let points = bulge_to_arc_points(p(0.0, 0.0), p(2.0, 0.0), 1.0, 0.05);
        assert!(points.len() > 2);
        // midpoint of a semicircular bulge over a chord of length 2
        // should rise to about radius 1 above the chord.
        let mid = points[points.len() / 2];
        assert!((mid.y - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_stitch_chains_closes_square_from_segments() {
        let chains = vec![
            vec![p(0.0, 0.0), p(2.0, 0.0)],
            vec![p(2.0, 0.0), p(2.0, 2.0)],
            vec![p(2.0, 2.0), p(0.0, 2.0)],
            vec![p(0.0, 2.0), p(0.0, 0.0)],
        ];
        let polygons = stitch_chains(chains, 0.01);
        assert_eq!(polygons.len(), 1);
        assert!((polygons[0].area() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_stitch_chains_leaves_dangling_chain_unclosed() {
        let chains = vec![vec![p(0.0, 0.0), p(2.0, 0.0)], vec![p(5.0, 5.0), p(6.0, 6.0)]];
        let polygons = stitch_chains(chains, 0.01);
        assert!(polygons.is_empty());
    }
}
