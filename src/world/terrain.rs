//! Terrain Grid
//!
//! Per-cell terrain class, elevation and feature tag for the whole map.
//! The grid is produced once by blueprint expansion and mutated only by
//! building placement (occupancy) - it is part of hashed state via the
//! entities standing on it, not hashed directly.

use serde::{Deserialize, Serialize};

/// Canonical elevation milestones used by blueprints.
pub const ELEVATION_LOW: u8 = 60;
/// Mid plateau elevation.
pub const ELEVATION_MID: u8 = 140;
/// High plateau elevation.
pub const ELEVATION_HIGH: u8 = 220;

/// Terrain class of a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TerrainClass {
    /// Ordinary walkable, buildable ground.
    #[default]
    Ground = 0,
    /// Walkable, cheaper to traverse, not buildable.
    Road = 1,
    /// Walkable but slow, not buildable.
    Mud = 2,
    /// Impassable water.
    Water = 3,
    /// Tree cover: blocks ground movement and building.
    Forest = 4,
    /// Out-of-map void.
    Void = 5,
    /// Bare rock: unwalkable, keeps its elevation.
    Rock = 6,
}

impl TerrainClass {
    /// Ground units can enter.
    #[inline]
    pub fn walkable(self) -> bool {
        matches!(self, TerrainClass::Ground | TerrainClass::Road | TerrainClass::Mud)
    }

    /// Buildings can be placed.
    #[inline]
    pub fn buildable(self) -> bool {
        self == TerrainClass::Ground
    }

    /// Pathfinding cost weight (base 10).
    #[inline]
    pub fn move_cost(self) -> u32 {
        match self {
            TerrainClass::Road => 7,
            TerrainClass::Mud => 20,
            _ => 10,
        }
    }
}

/// Feature tag layered over the terrain class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Feature {
    /// Walkable slope connecting two elevations.
    Ramp = 0,
    /// Map border trim.
    Border = 1,
}

/// One terrain cell.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Cell {
    /// Terrain class.
    pub class: TerrainClass,
    /// Elevation, 0-255.
    pub elevation: u8,
    /// Optional feature tag.
    pub feature: Option<Feature>,
    /// Entity footprint occupying this cell (building placement).
    pub occupied: bool,
}

/// The map terrain grid.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TerrainGrid {
    width: u32,
    height: u32,
    cells: Vec<Cell>,
    /// Footprint rectangles changed since the nav cache last rebuilt.
    #[serde(skip)]
    dirty: Vec<(i32, i32, u8, u8)>,
}

impl TerrainGrid {
    /// Flat ground grid of the given dimensions.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cells: vec![Cell::default(); (width * height) as usize],
            dirty: Vec::new(),
        }
    }

    /// Grid width in cells.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in cells.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether a coordinate is on the map.
    #[inline]
    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> usize {
        (y as u32 * self.width + x as u32) as usize
    }

    /// Cell at a coordinate; out-of-bounds reads as void.
    #[inline]
    pub fn cell(&self, x: i32, y: i32) -> Cell {
        if !self.in_bounds(x, y) {
            return Cell {
                class: TerrainClass::Void,
                elevation: 0,
                feature: None,
                occupied: false,
            };
        }
        self.cells[self.index(x, y)]
    }

    /// Mutable cell access. Panics out of bounds - blueprint expansion
    /// clamps before writing.
    #[inline]
    pub fn cell_mut(&mut self, x: i32, y: i32) -> &mut Cell {
        let idx = self.index(x, y);
        &mut self.cells[idx]
    }

    /// Ground-unit walkability, counting building occupancy.
    #[inline]
    pub fn walkable(&self, x: i32, y: i32) -> bool {
        let c = self.cell(x, y);
        c.class.walkable() && !c.occupied
    }

    /// Whether a building footprint cell can be claimed.
    #[inline]
    pub fn buildable(&self, x: i32, y: i32) -> bool {
        let c = self.cell(x, y);
        c.class.buildable() && !c.occupied && c.feature.is_none()
    }

    /// Movement cost weight at a cell (walkability unchecked).
    #[inline]
    pub fn move_cost(&self, x: i32, y: i32) -> u32 {
        self.cell(x, y).class.move_cost()
    }

    /// Mark or clear a rectangular footprint as occupied. The rectangle is
    /// recorded for incremental nav-cache rebuild.
    pub fn set_occupied(&mut self, x: i32, y: i32, w: u8, h: u8, occupied: bool) {
        for cy in y..y + h as i32 {
            for cx in x..x + w as i32 {
                if self.in_bounds(cx, cy) {
                    let idx = self.index(cx, cy);
                    self.cells[idx].occupied = occupied;
                }
            }
        }
        self.dirty.push((x, y, w, h));
    }

    /// Drain the footprint rectangles changed since the last call.
    pub fn take_dirty(&mut self) -> Vec<(i32, i32, u8, u8)> {
        std::mem::take(&mut self.dirty)
    }

    /// Count of walkable cells over the whole grid.
    pub fn walkable_count(&self) -> u32 {
        let mut n = 0;
        for y in 0..self.height as i32 {
            for x in 0..self.width as i32 {
                if self.walkable(x, y) {
                    n += 1;
                }
            }
        }
        n
    }

    /// Flood-fill from a start cell across 4-connected walkable cells.
    ///
    /// Returns the number of cells visited. The editor uses this for region
    /// paints; tests use it to cross-check walkability accounting.
    pub fn flood_fill_walkable(&self, sx: i32, sy: i32) -> u32 {
        if !self.walkable(sx, sy) {
            return 0;
        }

        let mut visited = vec![false; (self.width * self.height) as usize];
        let mut stack = vec![(sx, sy)];
        visited[self.index(sx, sy)] = true;
        let mut count = 0u32;

        while let Some((x, y)) = stack.pop() {
            count += 1;
            for (dx, dy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
                let (nx, ny) = (x + dx, y + dy);
                if self.in_bounds(nx, ny) && self.walkable(nx, ny) {
                    let idx = self.index(nx, ny);
                    if !visited[idx] {
                        visited[idx] = true;
                        stack.push((nx, ny));
                    }
                }
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_properties() {
        assert!(TerrainClass::Ground.walkable());
        assert!(TerrainClass::Road.walkable());
        assert!(!TerrainClass::Water.walkable());
        assert!(!TerrainClass::Forest.walkable());
        assert!(TerrainClass::Ground.buildable());
        assert!(!TerrainClass::Road.buildable());
        assert!(TerrainClass::Road.move_cost() < TerrainClass::Ground.move_cost());
        assert!(TerrainClass::Mud.move_cost() > TerrainClass::Ground.move_cost());
    }

    #[test]
    fn test_out_of_bounds_is_void() {
        let grid = TerrainGrid::new(8, 8);
        assert_eq!(grid.cell(-1, 0).class, TerrainClass::Void);
        assert_eq!(grid.cell(8, 8).class, TerrainClass::Void);
        assert!(!grid.walkable(-1, -1));
    }

    #[test]
    fn test_occupancy_blocks() {
        let mut grid = TerrainGrid::new(16, 16);
        assert!(grid.walkable(5, 5));
        grid.set_occupied(4, 4, 3, 3, true);
        assert!(!grid.walkable(5, 5));
        assert!(!grid.buildable(4, 4));
        assert!(grid.walkable(7, 4));
        grid.set_occupied(4, 4, 3, 3, false);
        assert!(grid.walkable(5, 5));
    }

    #[test]
    fn test_flood_fill_matches_walkable_count() {
        // 20x20 plateau surrounded by unwalkable border: flood fill from the
        // interior visits exactly the 400 plateau cells.
        let mut grid = TerrainGrid::new(22, 22);
        for y in 0..22 {
            for x in 0..22 {
                let border = x == 0 || y == 0 || x == 21 || y == 21;
                let cell = grid.cell_mut(x, y);
                if border {
                    cell.class = TerrainClass::Void;
                } else {
                    cell.class = TerrainClass::Ground;
                    cell.elevation = ELEVATION_LOW;
                }
            }
        }

        assert_eq!(grid.flood_fill_walkable(10, 10), 400);
        assert_eq!(grid.walkable_count(), 400);
    }

    #[test]
    fn test_flood_fill_from_blocked_cell() {
        let grid = {
            let mut g = TerrainGrid::new(4, 4);
            g.cell_mut(0, 0).class = TerrainClass::Water;
            g
        };
        assert_eq!(grid.flood_fill_walkable(0, 0), 0);
    }
}
