use geo::{
    Area, BoundingRect, Centroid, Coord, LineString, Polygon as GeoPolygon, Relate, Rotate,
    Translate,
};
use serde::{Deserialize, Serialize};

/// A 2D point. Coordinates are f64 inches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn origin() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    pub fn distance_to(self, other: Point2D) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// An axis-aligned bounding box. Origin is the lower-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// A closed 2D polygon, the unit of geometry the reader, nester, and
/// writer all operate on. Wraps `geo::Polygon` so that buffering,
/// rotation, translation, and the touch-vs-interior intersection test
/// come from a maintained geometry library rather than hand-rolled
/// predicates.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon(pub GeoPolygon<f64>);

impl Polygon {
    pub fn from_points(points: &[Point2D]) -> Option<Self> {
        if points.len() < 3 {
            return None;
        }
        let mut coords: Vec<Coord<f64>> =
            points.iter().map(|p| Coord { x: p.x, y: p.y }).collect();
        if coords.first() != coords.last() {
            coords.push(coords[0]);
        }
        let poly = GeoPolygon::new(LineString::new(coords), vec![]);
        Some(Self(poly))
    }

    pub fn exterior_points(&self) -> Vec<Point2D> {
        self.0
            .exterior()
            .coords()
            .map(|c| Point2D::new(c.x, c.y))
            .collect()
    }

    /// Unsigned area of the polygon.
    pub fn area(&self) -> f64 {
        self.0.unsigned_area()
    }

    pub fn is_empty(&self) -> bool {
        self.0.exterior().0.is_empty()
    }

    pub fn centroid(&self) -> Option<Point2D> {
        self.0.centroid().map(|c| Point2D::new(c.x(), c.y()))
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.0.bounding_rect().map(|r| Bounds {
            min_x: r.min().x,
            min_y: r.min().y,
            max_x: r.max().x,
            max_y: r.max().y,
        })
    }

    /// Rotate counter-clockwise by `degrees` about `pivot`.
    pub fn rotated_about(&self, degrees: f64, pivot: Point2D) -> Self {
        if degrees == 0.0 {
            return self.clone();
        }
        let pivot = geo::Point::new(pivot.x, pivot.y);
        Self(self.0.rotate_around_point(degrees, pivot))
    }

    /// Translate by (dx, dy).
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self(self.0.translate(dx, dy))
    }

    /// Outward Minkowski offset by `distance`. Returns `None` if the
    /// buffered shape is empty or degenerate. When the buffer operation
    /// yields more than one ring (can happen for self-intersecting
    /// input), the largest-area ring is kept, mirroring the single
    /// "repair by zero-width buffer" step used by the reader.
    pub fn buffered(&self, distance: f64) -> Option<Self> {
        if distance == 0.0 {
            return self.repaired();
        }
        let multi = geo_buffer::buffer_polygon(&self.0, distance);
        largest_ring(multi)
    }

    /// Repair a possibly self-intersecting polygon with a zero-width
    /// buffer, the standard "buffer(0)" trick.
    pub fn repaired(&self) -> Option<Self> {
        let multi = geo_buffer::buffer_polygon(&self.0, 0.0);
        largest_ring(multi)
    }

    /// Two polygons "non-trivially intersect" iff they intersect and do
    /// not merely touch along an edge or point, i.e. their interiors
    /// overlap. Matches Shapely's `a.intersects(b) and not a.touches(b)`.
    pub fn non_trivially_intersects(&self, other: &Polygon) -> bool {
        let matrix = self.0.relate(&other.0);
        matrix.is_intersects() && !matrix.is_touches()
    }
}

fn largest_ring(multi: geo::MultiPolygon<f64>) -> Option<Polygon> {
    multi
        .0
        .into_iter()
        .max_by(|a, b| a.unsigned_area().partial_cmp(&b.unsigned_area()).unwrap())
        .filter(|p| p.unsigned_area() > 0.0)
        .map(Polygon)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(side: f64) -> Polygon {
        Polygon::from_points(&[
            Point2D::new(0.0, 0.0),
            Point2D::new(side, 0.0),
            Point2D::new(side, side),
            Point2D::new(0.0, side),
        ])
        .unwrap()
    }

    #[test]
    fn test_point_distance() {
        let a = Point2D::new(0.0, 0.0);
        let b = Point2D::new(3.0, 4.0);
        assert!((a.distance_to(b) - 5.0).abs() < 1e-10);
    }

    #[test]
    fn test_polygon_area() {
        let sq = square(2.0);
        assert!((sq.area() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_polygon_centroid() {
        let sq = square(2.0);
        let c = sq.centroid().unwrap();
        assert!((c.x - 1.0).abs() < 1e-9);
        assert!((c.y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_rotate_about_centroid_preserves_area() {
        let sq = square(2.0);
        let c = sq.centroid().unwrap();
        let rotated = sq.rotated_about(37.0, c);
        assert!((rotated.area() - sq.area()).abs() < 1e-6);
    }

    #[test]
    fn test_rotate_90_bbox_swaps_dimensions() {
        let rect = Polygon::from_points(&[
            Point2D::new(0.0, 0.0),
            Point2D::new(10.0, 0.0),
            Point2D::new(10.0, 2.0),
            Point2D::new(0.0, 2.0),
        ])
        .unwrap();
        let c = rect.centroid().unwrap();
        let rotated = rect.rotated_about(90.0, c);
        let b = rotated.bounds().unwrap();
        assert!((b.width() - 2.0).abs() < 1e-6);
        assert!((b.height() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_translate() {
        let sq = square(2.0);
        let moved = sq.translated(5.0, 7.0);
        let b = moved.bounds().unwrap();
        assert!((b.min_x - 5.0).abs() < 1e-9);
        assert!((b.min_y - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_touching_polygons_are_not_non_trivial() {
        let a = square(2.0);
        let b = Polygon::from_points(&[
            Point2D::new(2.0, 0.0),
            Point2D::new(4.0, 0.0),
            Point2D::new(4.0, 2.0),
            Point2D::new(2.0, 2.0),
        ])
        .unwrap();
        assert!(!a.non_trivially_intersects(&b));
    }

    #[test]
    fn test_overlapping_polygons_are_non_trivial() {
        let a = square(2.0);
        let b = Polygon::from_points(&[
            Point2D::new(1.0, 0.0),
            Point2D::new(3.0, 0.0),
            Point2D::new(3.0, 2.0),
            Point2D::new(1.0, 2.0),
        ])
        .unwrap();
        assert!(a.non_trivially_intersects(&b));
    }

    #[test]
    fn test_buffer_grows_area() {
        let sq = square(2.0);
        let buffered = sq.buffered(0.5).unwrap();
        assert!(buffered.area() > sq.area());
    }
}
