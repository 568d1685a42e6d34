//! Spatial Indices
//!
//! Cell-bucketed entity indices for range queries: one grid for units, one
//! for buildings. Buckets hold sorted entity ids, never component data, so
//! a query yields candidates in ascending id order and the caller does the
//! precise distance/footprint filtering.
//!
//! Buckets are 4×4 map cells - small enough that an average bucket holds a
//! handful of entities, large enough that a unit crosses bucket boundaries
//! rarely.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::fixed::{to_int_floor, Fixed};
use crate::core::vec2::FixedVec2;
use crate::world::entity::EntityId;

/// log2 of bucket side length in map cells.
const BUCKET_SHIFT: i32 = 2;

/// Bucket coordinate of a map cell.
#[inline]
fn bucket_of_cell(cx: i32, cy: i32) -> (i32, i32) {
    (cx >> BUCKET_SHIFT, cy >> BUCKET_SHIFT)
}

/// Cell-bucketed spatial index over entity ids.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SpatialGrid {
    buckets: BTreeMap<(i32, i32), Vec<EntityId>>,
    positions: BTreeMap<EntityId, (i32, i32)>,
}

impl SpatialGrid {
    /// Empty grid.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed entities.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// True when nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Insert an entity at a position. Re-inserting moves it.
    pub fn insert(&mut self, id: EntityId, pos: FixedVec2) {
        let bucket = bucket_of_cell(to_int_floor(pos.x), to_int_floor(pos.y));
        if let Some(&old) = self.positions.get(&id) {
            if old == bucket {
                return;
            }
            self.remove_from_bucket(id, old);
        }
        self.positions.insert(id, bucket);
        let ids = self.buckets.entry(bucket).or_default();
        // Keep the bucket sorted; queries rely on it.
        match ids.binary_search(&id) {
            Ok(_) => {}
            Err(at) => ids.insert(at, id),
        }
    }

    /// Remove an entity from the index.
    pub fn remove(&mut self, id: EntityId) {
        if let Some(bucket) = self.positions.remove(&id) {
            self.remove_from_bucket(id, bucket);
        }
    }

    /// Update an entity's position. O(1) when it stays in its bucket.
    #[inline]
    pub fn update(&mut self, id: EntityId, pos: FixedVec2) {
        self.insert(id, pos);
    }

    fn remove_from_bucket(&mut self, id: EntityId, bucket: (i32, i32)) {
        if let Some(ids) = self.buckets.get_mut(&bucket) {
            if let Ok(at) = ids.binary_search(&id) {
                ids.remove(at);
            }
            if ids.is_empty() {
                self.buckets.remove(&bucket);
            }
        }
    }

    /// Candidate ids whose bucket intersects the cell rectangle
    /// `[min_x, max_x] × [min_y, max_y]`, ascending id order.
    pub fn query_rect_cells(
        &self,
        min_x: i32,
        min_y: i32,
        max_x: i32,
        max_y: i32,
    ) -> Vec<EntityId> {
        let (bx0, by0) = bucket_of_cell(min_x, min_y);
        let (bx1, by1) = bucket_of_cell(max_x, max_y);

        let mut out = Vec::new();
        for by in by0..=by1 {
            for bx in bx0..=bx1 {
                if let Some(ids) = self.buckets.get(&(bx, by)) {
                    out.extend_from_slice(ids);
                }
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Candidate ids within `radius` of `center` (conservative: includes the
    /// whole bucket ring; caller filters by exact distance). Ascending ids.
    pub fn query_radius(&self, center: FixedVec2, radius: Fixed) -> Vec<EntityId> {
        let min_x = to_int_floor(center.x - radius);
        let min_y = to_int_floor(center.y - radius);
        let max_x = to_int_floor(center.x + radius);
        let max_y = to_int_floor(center.y + radius);
        self.query_rect_cells(min_x, min_y, max_x, max_y)
    }

    /// All indexed ids, ascending.
    pub fn all_ids(&self) -> Vec<EntityId> {
        self.positions.keys().copied().collect()
    }
}
