//! Polygon helpers shared by dissolve and merge-back.
//!
//! Thin wrappers over `geo` boolean operations plus an R-tree entry type for
//! bounding-box candidate searches.

use geo::{
    Area, BooleanOps, BoundingRect, Centroid, Coord, EuclideanDistance, Intersects, LineString,
    MultiPolygon, Polygon, Rect,
};
use rstar::{RTree, RTreeObject, AABB};

/// Axis-aligned square footprint of a cell.
pub fn square(cx: f64, cy: f64, size: f64) -> MultiPolygon<f64> {
    let s = 0.5 * size;
    let ring = LineString::from(vec![
        (cx - s, cy - s),
        (cx - s, cy + s),
        (cx + s, cy + s),
        (cx + s, cy - s),
        (cx - s, cy - s),
    ]);
    MultiPolygon(vec![Polygon::new(ring, vec![])])
}

pub fn area(geom: &MultiPolygon<f64>) -> f64 {
    geom.unsigned_area()
}

pub fn centroid(geom: &MultiPolygon<f64>) -> Option<(f64, f64)> {
    geom.centroid().map(|p| (p.x(), p.y()))
}

/// Union of all inputs, merged pairwise so operands stay similar in size.
pub fn union_all<'a, I>(geoms: I) -> MultiPolygon<f64>
where
    I: IntoIterator<Item = &'a MultiPolygon<f64>>,
{
    let mut level: Vec<MultiPolygon<f64>> = geoms.into_iter().cloned().collect();
    if level.is_empty() {
        return MultiPolygon(vec![]);
    }
    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        let mut iter = level.into_iter();
        while let Some(a) = iter.next() {
            match iter.next() {
                Some(b) => next.push(a.union(&b)),
                None => next.push(a),
            }
        }
        level = next;
    }
    level.pop().unwrap_or_else(|| MultiPolygon(vec![]))
}

/// Area of `a ∩ b`, zero when the bounding boxes do not overlap.
pub fn intersection_area(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> f64 {
    match (a.bounding_rect(), b.bounding_rect()) {
        (Some(ra), Some(rb)) if ra.intersects(&rb) => a.intersection(b).unsigned_area(),
        _ => 0.0,
    }
}

/// True when the two shapes are within `tolerance` of each other.
///
/// This is the adjacency test used by the dissolve: grid-derived polygons share
/// edges exactly in theory but drift apart by rounding in practice.
pub fn within_distance(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>, tolerance: f64) -> bool {
    for pa in &a.0 {
        for pb in &b.0 {
            if pa.euclidean_distance(pb) <= tolerance {
                return true;
            }
        }
    }
    false
}

/// Bounding box expanded by `pad` on every side.
pub fn envelope(geom: &MultiPolygon<f64>, pad: f64) -> Option<AABB<[f64; 2]>> {
    geom.bounding_rect().map(|r| {
        AABB::from_corners(
            [r.min().x - pad, r.min().y - pad],
            [r.max().x + pad, r.max().y + pad],
        )
    })
}

/// Bounding rectangle covering every geometry in the slice.
pub fn total_bounds<'a, I>(geoms: I) -> Option<Rect<f64>>
where
    I: IntoIterator<Item = &'a MultiPolygon<f64>>,
{
    let mut bounds: Option<(Coord<f64>, Coord<f64>)> = None;
    for rect in geoms.into_iter().filter_map(|g| g.bounding_rect()) {
        bounds = Some(match bounds {
            None => (rect.min(), rect.max()),
            Some((lo, hi)) => (
                Coord {
                    x: lo.x.min(rect.min().x),
                    y: lo.y.min(rect.min().y),
                },
                Coord {
                    x: hi.x.max(rect.max().x),
                    y: hi.y.max(rect.max().y),
                },
            ),
        });
    }
    bounds.map(|(lo, hi)| Rect::new(lo, hi))
}

/// R-tree entry: a bounding box tagged with the index of its geometry.
#[derive(Clone, Copy, Debug)]
pub struct IndexedEnvelope {
    pub env: AABB<[f64; 2]>,
    pub index: usize,
}

impl RTreeObject for IndexedEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.env
    }
}

/// Build an R-tree over padded bounding boxes; empty geometries are left out.
pub fn envelope_index<'a, I>(geoms: I, pad: f64) -> RTree<IndexedEnvelope>
where
    I: IntoIterator<Item = &'a MultiPolygon<f64>>,
{
    let entries: Vec<IndexedEnvelope> = geoms
        .into_iter()
        .enumerate()
        .filter_map(|(index, g)| envelope(g, pad).map(|env| IndexedEnvelope { env, index }))
        .collect();
    RTree::bulk_load(entries)
}
