//! Named regions of the image plane and the containment test used to
//! attribute dwell time.
//!
//! Bounds are inclusive: a centroid sitting exactly on an edge or vertex is
//! inside. Only membership matters, so overlapping zones need no ordering.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Largest absolute coordinate a zone vertex may use.
pub const MAX_COORDINATE: i64 = 1 << 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ZoneShape {
    Rect { x1: i64, y1: i64, x2: i64, y2: i64 },
    Polygon { points: Vec<(i64, i64)> },
}

impl ZoneShape {
    pub fn contains(&self, point: (i64, i64)) -> bool {
        match self {
            ZoneShape::Rect { x1, y1, x2, y2 } => {
                *x1 <= point.0 && point.0 <= *x2 && *y1 <= point.1 && point.1 <= *y2
            }
            ZoneShape::Polygon { points } => polygon_contains(points, point),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneDefinition {
    pub name: String,
    #[serde(flatten)]
    pub shape: ZoneShape,
}

impl ZoneDefinition {
    pub fn rect(name: impl Into<String>, x1: i64, y1: i64, x2: i64, y2: i64) -> Self {
        Self {
            name: name.into(),
            shape: ZoneShape::Rect { x1, y1, x2, y2 },
        }
    }

    pub fn polygon(name: impl Into<String>, points: Vec<(i64, i64)>) -> Self {
        Self {
            name: name.into(),
            shape: ZoneShape::Polygon { points },
        }
    }

    pub fn contains(&self, point: (i64, i64)) -> bool {
        self.shape.contains(point)
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("zone names must not be empty");
        }
        let out_of_range = match &self.shape {
            ZoneShape::Rect { x1, y1, x2, y2 } => [x1, y1, x2, y2]
                .into_iter()
                .find(|v| v.unsigned_abs() > MAX_COORDINATE.unsigned_abs())
                .copied(),
            ZoneShape::Polygon { points } => points
                .iter()
                .flat_map(|(x, y)| [*x, *y])
                .find(|v| v.unsigned_abs() > MAX_COORDINATE.unsigned_abs()),
        };
        if let Some(value) = out_of_range {
            bail!(
                "zone '{}' coordinate {value} is outside +/-{MAX_COORDINATE}",
                self.name
            );
        }
        match &self.shape {
            ZoneShape::Rect { x1, y1, x2, y2 } => {
                if x1 > x2 || y1 > y2 {
                    bail!(
                        "zone '{}' has inverted corners ({x1},{y1})-({x2},{y2})",
                        self.name
                    );
                }
            }
            ZoneShape::Polygon { points } => {
                if points.len() < 3 {
                    bail!(
                        "zone '{}' needs at least 3 polygon vertices, got {}",
                        self.name,
                        points.len()
                    );
                }
            }
        }
        Ok(())
    }
}

/// The static set of zones for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZoneSet {
    zones: Vec<ZoneDefinition>,
}

impl ZoneSet {
    pub fn new(zones: Vec<ZoneDefinition>) -> Result<Self> {
        for (idx, zone) in zones.iter().enumerate() {
            zone.validate()?;
            if zones[..idx].iter().any(|other| other.name == zone.name) {
                bail!("zone '{}' is defined more than once", zone.name);
            }
        }
        Ok(Self { zones })
    }

    pub fn contains(&self, point: (i64, i64)) -> bool {
        self.zones.iter().any(|zone| zone.contains(point))
    }

    /// First zone (in definition order) containing `point`.
    pub fn zone_at(&self, point: (i64, i64)) -> Option<&ZoneDefinition> {
        self.zones.iter().find(|zone| zone.contains(point))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ZoneDefinition> {
        self.zones.iter()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

fn on_segment(a: (i128, i128), b: (i128, i128), p: (i128, i128)) -> bool {
    let cross = (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0);
    cross == 0
        && a.0.min(b.0) <= p.0
        && p.0 <= a.0.max(b.0)
        && a.1.min(b.1) <= p.1
        && p.1 <= a.1.max(b.1)
}

fn widen((x, y): (i64, i64)) -> (i128, i128) {
    (i128::from(x), i128::from(y))
}

// Even-odd crossing test with edges counted as inside. Widened to i128 so a
// vertex within MAX_COORDINATE against any i64 point stays exact.
fn polygon_contains(points: &[(i64, i64)], p: (i64, i64)) -> bool {
    let n = points.len();
    if n < 3 {
        return false;
    }

    let p = widen(p);
    let mut inside = false;
    for i in 0..n {
        let a = widen(points[i]);
        let b = widen(points[(i + 1) % n]);
        if on_segment(a, b, p) {
            return true;
        }
        if (a.1 > p.1) != (b.1 > p.1) {
            let dy = b.1 - a.1;
            let lhs = (p.0 - a.0) * dy;
            let rhs = (p.1 - a.1) * (b.0 - a.0);
            if (dy > 0 && lhs < rhs) || (dy < 0 && lhs > rhs) {
                inside = !inside;
            }
        }
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desk() -> ZoneSet {
        ZoneSet::new(vec![ZoneDefinition::rect("Desk Zone", 100, 100, 500, 400)]).unwrap()
    }

    #[test]
    fn rect_bounds_are_inclusive() {
        let zones = desk();
        assert!(zones.contains((100, 100)));
        assert!(zones.contains((500, 400)));
        assert!(zones.contains((100, 250)));
        assert!(zones.contains((300, 400)));
        assert!(!zones.contains((99, 250)));
        assert!(!zones.contains((300, 401)));
    }

    #[test]
    fn any_zone_counts() {
        let zones = ZoneSet::new(vec![
            ZoneDefinition::rect("left", 0, 0, 10, 10),
            ZoneDefinition::rect("right", 50, 0, 60, 10),
        ])
        .unwrap();
        assert!(zones.contains((55, 5)));
        assert_eq!(zones.zone_at((55, 5)).map(|z| z.name.as_str()), Some("right"));
        assert!(!zones.contains((30, 5)));
        assert!(zones.zone_at((30, 5)).is_none());
    }

    #[test]
    fn empty_set_contains_nothing() {
        let zones = ZoneSet::default();
        assert!(zones.is_empty());
        assert!(!zones.contains((0, 0)));
    }

    #[test]
    fn triangle_interior_edges_and_vertices() {
        let tri = ZoneDefinition::polygon("tri", vec![(0, 0), (10, 0), (0, 10)]);
        assert!(tri.contains((2, 2)));
        assert!(tri.contains((5, 5)));
        assert!(tri.contains((0, 10)));
        assert!(tri.contains((5, 0)));
        assert!(!tri.contains((6, 6)));
        assert!(!tri.contains((-1, 0)));
    }

    #[test]
    fn concave_polygon_notch_is_outside() {
        let u_shape = ZoneDefinition::polygon(
            "u",
            vec![(0, 0), (30, 0), (30, 30), (20, 30), (20, 10), (10, 10), (10, 30), (0, 30)],
        );
        assert!(u_shape.contains((5, 20)));
        assert!(u_shape.contains((25, 20)));
        assert!(!u_shape.contains((15, 20)));
        assert!(u_shape.contains((15, 10)));
    }

    #[test]
    fn rejects_bad_definitions() {
        assert!(ZoneSet::new(vec![ZoneDefinition::rect("", 0, 0, 1, 1)]).is_err());
        assert!(ZoneSet::new(vec![ZoneDefinition::rect("inv", 5, 0, 1, 1)]).is_err());
        assert!(ZoneSet::new(vec![ZoneDefinition::polygon("line", vec![(0, 0), (1, 1)])]).is_err());
        assert!(ZoneSet::new(vec![
            ZoneDefinition::rect("dup", 0, 0, 1, 1),
            ZoneDefinition::rect("dup", 2, 2, 3, 3),
        ])
        .is_err());
    }

    #[test]
    fn zone_json_is_tagged_by_shape() {
        let zone: ZoneDefinition = serde_json::from_str(
            r#"{"name": "Desk Zone", "shape": "rect", "x1": 100, "y1": 100, "x2": 500, "y2": 400}"#,
        )
        .unwrap();
        assert_eq!(zone, ZoneDefinition::rect("Desk Zone", 100, 100, 500, 400));

        let poly: ZoneDefinition = serde_json::from_str(
            r#"{"name": "tri", "shape": "polygon", "points": [[0, 0], [10, 0], [0, 10]]}"#,
        )
        .unwrap();
        assert!(matches!(poly.shape, ZoneShape::Polygon { ref points } if points.len() == 3));
    }

    #[test]
    fn oversized_coordinates_are_rejected() {
        let big = 1 << 40;
        let square = ZoneDefinition::polygon(
            "huge",
            vec![(-big, -big), (big, -big), (big, big), (-big, big)],
        );
        assert!(ZoneSet::new(vec![square]).is_err());
        assert!(ZoneSet::new(vec![ZoneDefinition::rect("wide", i64::MIN, 0, i64::MAX, 1)]).is_err());
        assert!(ZoneSet::new(vec![ZoneDefinition::rect(
            "edge",
            -MAX_COORDINATE,
            -MAX_COORDINATE,
            MAX_COORDINATE,
            MAX_COORDINATE
        )])
        .is_ok());
    }

    #[test]
    fn extreme_points_never_overflow_the_polygon_test() {
        let m = MAX_COORDINATE;
        let square = ZoneDefinition::polygon("max", vec![(-m, -m), (m, -m), (m, m), (-m, m)]);
        assert!(square.contains((1, 1)));
        assert!(square.contains((m, 0)));
        assert!(!square.contains((i64::MAX, i64::MAX)));
        assert!(!square.contains((i64::MIN, 0)));
        assert!(!square.contains((0, i64::MIN)));
    }
}
