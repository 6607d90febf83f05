//! Convex hulls of cluster footprints
//!
//! Hulls are closed rings: counter-clockwise, starting at the lowest-x
//! (then lowest-y) vertex, with the first vertex repeated at the end.
//! A merge recomputes the hull over the union of both rings, which is
//! O(n log n) per merge.

use geo::algorithm::kernels::{Kernel, Orientation};
use geo::GeoNum;
use geo::{ConvexHull, Coord, MultiPoint, Point as GeoPoint, Winding};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A 2-d vertex
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn cmp_xy(&self, other: &Self) -> Ordering {
        self.x.total_cmp(&other.x).then(self.y.total_cmp(&other.y))
    }
}

fn cross(o: Point, a: Point, b: Point) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

fn orientation(a: Point, b: Point, c: Point) -> Orientation {
    <f64 as GeoNum>::Ker::orient2d(a.into(), b.into(), c.into())
}

impl From<Point> for Coord<f64> {
    fn from(p: Point) -> Self {
        Coord { x: p.x, y: p.y }
    }
}

/// Closed convex hull of a point set.
///
/// Non-finite points are ignored. The hull comes from `geo`; the ring is
/// then put in canonical form: counter-clockwise, collinear and repeated
/// vertices dropped, starting at the lowest-x (then lowest-y) vertex. A
/// degenerate set yields a ring of one or two distinct vertices.
pub fn convex_hull<I>(points: I) -> Vec<Point>
where
    I: IntoIterator<Item = Point>,
{
    let pts: Vec<GeoPoint<f64>> = points
        .into_iter()
        .filter(|p| p.x.is_finite() && p.y.is_finite())
        .map(|p| GeoPoint::new(p.x, p.y))
        .collect();
    if pts.is_empty() {
        return Vec::new();
    }

    let mut exterior = MultiPoint::new(pts).convex_hull().exterior().clone();
    exterior.make_ccw_winding();
    let mut ring: Vec<Point> = exterior.coords().map(|c| Point::new(c.x, c.y)).collect();
    ring.dedup();
    while ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }

    canonical_ring(ring)
}

/// Close an open counter-clockwise ring in canonical form
fn canonical_ring(mut ring: Vec<Point>) -> Vec<Point> {
    let (Some(&lo), Some(&hi)) = (
        ring.iter().min_by(|a, b| a.cmp_xy(b)),
        ring.iter().max_by(|a, b| a.cmp_xy(b)),
    ) else {
        return Vec::new();
    };

    if lo == hi {
        return vec![lo, lo];
    }
    if ring.iter().all(|&p| orientation(lo, hi, p) == Orientation::Collinear) {
        return vec![lo, hi, lo];
    }

    // Drop vertices lying on the segment between their neighbours
    let mut i = 0;
    while i < ring.len() && ring.len() > 3 {
        let n = ring.len();
        let (prev, next) = (ring[(i + n - 1) % n], ring[(i + 1) % n]);
        if orientation(prev, ring[i], next) == Orientation::Collinear {
            ring.remove(i);
            i = i.saturating_sub(1);
        } else {
            i += 1;
        }
    }

    if let Some(first) = ring.iter().position(|p| *p == lo) {
        ring.rotate_left(first);
    }
    ring.push(lo);
    ring
}

/// Closed ring of a `width × height` box centered on `(cx, cy)`
pub fn box_ring(cx: f64, cy: f64, width: f64, height: f64) -> Vec<Point> {
    let (hw, hh) = (width / 2.0, height / 2.0);
    convex_hull([
        Point::new(cx - hw, cy - hh),
        Point::new(cx - hw, cy + hh),
        Point::new(cx + hw, cy + hh),
        Point::new(cx + hw, cy - hh),
    ])
}

/// Divide every vertex by `factor`
pub fn downscale_ring(ring: &mut [Point], factor: f64) {
    for p in ring.iter_mut() {
        p.x /= factor;
        p.y /= factor;
    }
}

/// Whether `ring` is closed and turns left at every vertex
pub fn is_convex_ring(ring: &[Point]) -> bool {
    if ring.len() < 4 || ring.first() != ring.last() {
        return false;
    }
    let n = ring.len() - 1;
    (0..n).all(|i| cross(ring[i], ring[(i + 1) % n], ring[(i + 2) % n]) > 0.0)
}

/// Whether `p` lies inside or on a convex counter-clockwise ring
pub fn ring_contains(ring: &[Point], p: Point) -> bool {
    if ring.len() < 2 {
        return false;
    }
    ring.windows(2).all(|edge| cross(edge[0], edge[1], p) >= -1e-9)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_hull_is_closed_and_ccw() {
        let hull = convex_hull([
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
            Point::new(1.0, 0.0),
            Point::new(0.5, 0.5),
        ]);
        assert_eq!(
            hull,
            vec![
                Point::new(0.0, 0.0),
                Point::new(1.0, 0.0),
                Point::new(1.0, 1.0),
                Point::new(0.0, 1.0),
                Point::new(0.0, 0.0),
            ]
        );
        assert!(is_convex_ring(&hull));
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(convex_hull(Vec::new()).is_empty());
        let single = convex_hull([Point::new(2.0, 3.0)]);
        assert_eq!(single, vec![Point::new(2.0, 3.0), Point::new(2.0, 3.0)]);

        let line = convex_hull([Point::new(0.0, 0.0), Point::new(1.0, 1.0), Point::new(2.0, 2.0)]);
        assert_eq!(line, vec![Point::new(0.0, 0.0), Point::new(2.0, 2.0), Point::new(0.0, 0.0)]);
    }

    #[test]
    fn test_edge_points_and_clockwise_input_are_canonical() {
        let points = [
            Point::new(0.0, 2.0),
            Point::new(1.0, 2.0),
            Point::new(2.0, 2.0),
            Point::new(2.0, 1.0),
            Point::new(2.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(0.0, 0.0),
            Point::new(0.0, 1.0),
        ];
        let hull = convex_hull(points);
        assert_eq!(
            hull,
            vec![
                Point::new(0.0, 0.0),
                Point::new(2.0, 0.0),
                Point::new(2.0, 2.0),
                Point::new(0.0, 2.0),
                Point::new(0.0, 0.0),
            ]
        );

        let mut reversed = points;
        reversed.reverse();
        assert_eq!(convex_hull(reversed), hull);
    }

    #[test]
    fn test_union_of_rings_is_order_independent() {
        let a = box_ring(0.0, 0.0, 2.0, 2.0);
        let b = box_ring(3.0, 1.0, 2.0, 2.0);
        let ab = convex_hull(a.iter().chain(b.iter()).copied());
        let ba = convex_hull(b.iter().chain(a.iter()).copied());
        assert_eq!(ab, ba);
        assert!(is_convex_ring(&ab));
        for p in a.iter().chain(b.iter()) {
            assert!(ring_contains(&ab, *p));
        }
    }

    #[test]
    fn test_hull_of_hull_is_stable() {
        let ring = box_ring(5.0, 5.0, 4.0, 2.0);
        assert_eq!(convex_hull(ring.clone()), ring);
        assert_eq!(ring.len(), 5);
    }
}
