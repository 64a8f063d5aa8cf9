//! Spatial index used for proximity relay.
//!
//! Rooms talk to the index only through [`SpatialIndex`], so a quadtree or
//! grid can replace [`PointIndex`] without touching relay code.

use std::collections::HashMap;

use roomrelay_protocol::{Point, ProximityConfig, Rect};
use roomrelay_transport::ConnectionKey;

/// Insert, remove and range-query over member positions.
pub trait SpatialIndex: Send + Sync {
    /// Places `item` at `point`, moving it if already present.
    fn insert(&mut self, item: ConnectionKey, point: Point);

    /// Removes `item`, returning whether it was present.
    fn remove(&mut self, item: &ConnectionKey) -> bool;

    /// Every item whose point lies inside `rect`.
    fn query_rect(&self, rect: &Rect) -> Vec<ConnectionKey>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Flat point index.
///
/// Rooms hold at most a few dozen members, so a linear scan beats tree
/// maintenance. The configured bounds only size the allocation; points
/// outside them are still stored and found.
#[derive(Debug, Clone)]
pub struct PointIndex {
    bounds: Rect,
    points: HashMap<ConnectionKey, Point>,
}

/// Upper bound for the preallocation hint.
const MAX_PREALLOCATED: usize = 1024;

impl PointIndex {
    pub fn new(config: &ProximityConfig) -> Self {
        let hint = usize::try_from(config.capacity)
            .unwrap_or(MAX_PREALLOCATED)
            .min(MAX_PREALLOCATED);
        Self {
            bounds: config.bounds,
            points: HashMap::with_capacity(hint),
        }
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }
}

impl SpatialIndex for PointIndex {
    fn insert(&mut self, item: ConnectionKey, point: Point) {
        self.points.insert(item, point);
    }

    fn remove(&mut self, item: &ConnectionKey) -> bool {
        self.points.remove(item).is_some()
    }

    fn query_rect(&self, rect: &Rect) -> Vec<ConnectionKey> {
        self.points
            .iter()
            .filter(|(_, p)| rect.contains(**p))
            .map(|(k, _)| *k)
            .collect()
    }

    fn len(&self) -> usize {
        self.points.len()
    }
}

#[cfg(test)]
mod tests {
    use roomrelay_transport::ConnectionId;

    use super::*;

    fn index() -> PointIndex {
        PointIndex::new(&ProximityConfig {
            bounds: Rect::new(-100.0, -100.0, 200.0, 200.0),
            capacity: 16,
        })
    }

    fn key(id: u64) -> ConnectionKey {
        ConnectionKey::peer(ConnectionId::new(id))
    }

    #[test]
    fn test_query_returns_only_points_inside() {
        let mut idx = index();
        idx.insert(key(1), Point::new(0.0, 0.0));
        idx.insert(key(2), Point::new(50.0, 50.0));

        let hits = idx.query_rect(&Rect::new(-5.0, -5.0, 10.0, 10.0));
        assert_eq!(hits, vec![key(1)]);
    }

    #[test]
    fn test_insert_existing_item_moves_it() {
        let mut idx = index();
        idx.insert(key(1), Point::new(0.0, 0.0));
        idx.insert(key(1), Point::new(80.0, 80.0));

        assert_eq!(idx.len(), 1);
        assert!(idx.query_rect(&Rect::new(-5.0, -5.0, 10.0, 10.0)).is_empty());
        assert_eq!(idx.query_rect(&Rect::new(75.0, 75.0, 10.0, 10.0)), vec![key(1)]);
    }

    #[test]
    fn test_remove_drops_item() {
        let mut idx = index();
        idx.insert(key(1), Point::new(0.0, 0.0));
        assert!(idx.remove(&key(1)));
        assert!(!idx.remove(&key(1)));
        assert!(idx.is_empty());
    }

    #[test]
    fn test_point_outside_bounds_is_still_found() {
        let mut idx = index();
        idx.insert(key(1), Point::new(500.0, -500.0));

        let hits = idx.query_rect(&Rect::new(495.0, -505.0, 10.0, 10.0));
        assert_eq!(hits, vec![key(1)]);
    }
}
