//! Grid Pathfinding
//!
//! The authoritative pathfinder: Jump-Point Search on uniform-cost fields,
//! weighted A* when roads or mud vary the cost, Bresenham line-of-sight
//! smoothing with diagonal corner-cut prevention. Everything runs on
//! integer cells, so paths are bit-identical across peers by construction.
//!
//! Nav data is a tile-cached copy of terrain walkability and cost. Building
//! placement and removal dirty their footprint rectangles; the cache
//! rebuilds only those cells. Flyers bypass the field entirely and fly
//! straight.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use crate::core::fixed::FIXED_HALF;
use crate::core::vec2::FixedVec2;
use crate::world::components::UnitState;
use crate::world::tag;
use crate::world::terrain::TerrainGrid;

use crate::game::events::EventBus;
use crate::game::{SimCtx, System};

/// Straight step cost multiplier.
const STRAIGHT: u32 = 10;
/// Diagonal step cost multiplier.
const DIAGONAL: u32 = 14;
/// Base terrain cost (TerrainClass::Ground.move_cost()).
const BASE_COST: u32 = 10;
/// Give up after expanding this many nodes; a blocked map is not worth a
/// full-grid flood every tick.
const MAX_EXPANSIONS: usize = 20_000;

// =============================================================================
// NAV FIELD (tile-cached walkability/cost)
// =============================================================================

/// Cached per-cell walkability and movement cost.
pub struct NavField {
    width: i32,
    height: i32,
    walkable: Vec<bool>,
    cost: Vec<u32>,
    uniform: bool,
    built: bool,
}

impl NavField {
    /// Empty, unbuilt field.
    pub fn new() -> Self {
        Self {
            width: 0,
            height: 0,
            walkable: Vec::new(),
            cost: Vec::new(),
            uniform: true,
            built: false,
        }
    }

    /// Whether the initial build has happened.
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// True when every walkable cell carries the base cost (JPS-eligible).
    pub fn is_uniform(&self) -> bool {
        self.uniform
    }

    /// Full rebuild from terrain.
    pub fn rebuild(&mut self, terrain: &TerrainGrid) {
        self.width = terrain.width() as i32;
        self.height = terrain.height() as i32;
        let size = (self.width * self.height) as usize;
        self.walkable = vec![false; size];
        self.cost = vec![BASE_COST; size];
        self.uniform = true;
        for y in 0..self.height {
            for x in 0..self.width {
                self.refresh_cell(terrain, x, y);
            }
        }
        self.built = true;
    }

    /// Incremental rebuild of dirtied footprints (expanded by one cell so
    /// corner rules around the footprint stay correct).
    pub fn apply_dirty(&mut self, terrain: &TerrainGrid, rects: &[(i32, i32, u8, u8)]) {
        for &(x, y, w, h) in rects {
            for cy in y - 1..=y + h as i32 {
                for cx in x - 1..=x + w as i32 {
                    if cx >= 0 && cy >= 0 && cx < self.width && cy < self.height {
                        self.refresh_cell(terrain, cx, cy);
                    }
                }
            }
        }
    }

    fn refresh_cell(&mut self, terrain: &TerrainGrid, x: i32, y: i32) {
        let idx = (y * self.width + x) as usize;
        self.walkable[idx] = terrain.walkable(x, y);
        let cost = terrain.move_cost(x, y);
        self.cost[idx] = cost;
        if self.walkable[idx] && cost != BASE_COST {
            self.uniform = false;
        }
    }

    /// Walkability lookup; out of bounds is blocked.
    #[inline]
    pub fn walkable(&self, x: i32, y: i32) -> bool {
        x >= 0
            && y >= 0
            && x < self.width
            && y < self.height
            && self.walkable[(y * self.width + x) as usize]
    }

    /// Cost lookup (walkability unchecked).
    #[inline]
    pub fn cost(&self, x: i32, y: i32) -> u32 {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return BASE_COST;
        }
        self.cost[(y * self.width + x) as usize]
    }

    /// A step from `(x, y)` by `(dx, dy)` is legal: destination walkable,
    /// and a diagonal may not cut a blocked corner.
    #[inline]
    pub fn can_step(&self, x: i32, y: i32, dx: i32, dy: i32) -> bool {
        if !self.walkable(x + dx, y + dy) {
            return false;
        }
        if dx != 0 && dy != 0 {
            // Both orthogonal cells must be open.
            if !self.walkable(x + dx, y) || !self.walkable(x, y + dy) {
                return false;
            }
        }
        true
    }
}

impl Default for NavField {
    fn default() -> Self {
        Self::new()
    }
}

const DIRS: [(i32, i32); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

#[inline]
fn octile(ax: i32, ay: i32, bx: i32, by: i32) -> u32 {
    let dx = (ax - bx).abs() as u32;
    let dy = (ay - by).abs() as u32;
    let (lo, hi) = if dx < dy { (dx, dy) } else { (dy, dx) };
    DIAGONAL * lo + STRAIGHT * (hi - lo)
}

fn reconstruct(
    parents: &BTreeMap<(i32, i32), (i32, i32)>,
    start: (i32, i32),
    goal: (i32, i32),
) -> Vec<(i32, i32)> {
    let mut path = vec![goal];
    let mut cur = goal;
    while cur != start {
        match parents.get(&cur) {
            Some(&p) => {
                path.push(p);
                cur = p;
            }
            None => break,
        }
    }
    path.reverse();
    path
}

// =============================================================================
// WEIGHTED A*
// =============================================================================

/// Weighted A* over the cost field. Deterministic: the open set orders by
/// (f, g, cell), so ties never depend on insertion order.
pub fn a_star(nav: &NavField, start: (i32, i32), goal: (i32, i32)) -> Option<Vec<(i32, i32)>> {
    if !nav.walkable(start.0, start.1) || !nav.walkable(goal.0, goal.1) {
        return None;
    }
    if start == goal {
        return Some(vec![start]);
    }

    let mut open: BinaryHeap<Reverse<(u32, u32, (i32, i32))>> = BinaryHeap::new();
    let mut g_score: BTreeMap<(i32, i32), u32> = BTreeMap::new();
    let mut parents: BTreeMap<(i32, i32), (i32, i32)> = BTreeMap::new();

    g_score.insert(start, 0);
    open.push(Reverse((octile(start.0, start.1, goal.0, goal.1), 0, start)));

    let mut expansions = 0usize;
    while let Some(Reverse((_, g, cell))) = open.pop() {
        if g_score.get(&cell).copied().unwrap_or(u32::MAX) < g {
            continue; // superseded entry
        }
        if cell == goal {
            return Some(reconstruct(&parents, start, goal));
        }
        expansions += 1;
        if expansions > MAX_EXPANSIONS {
            return None;
        }

        for (dx, dy) in DIRS {
            if !nav.can_step(cell.0, cell.1, dx, dy) {
                continue;
            }
            let next = (cell.0 + dx, cell.1 + dy);
            let step = if dx != 0 && dy != 0 { DIAGONAL } else { STRAIGHT };
            let tentative = g + (step * nav.cost(next.0, next.1) / BASE_COST).max(1);
            if tentative < g_score.get(&next).copied().unwrap_or(u32::MAX) {
                g_score.insert(next, tentative);
                parents.insert(next, cell);
                let f = tentative + octile(next.0, next.1, goal.0, goal.1);
                open.push(Reverse((f, tentative, next)));
            }
        }
    }
    None
}

// =============================================================================
// JUMP-POINT SEARCH (uniform cost)
// =============================================================================

fn has_forced_neighbor(nav: &NavField, x: i32, y: i32, dx: i32, dy: i32) -> bool {
    if dx != 0 && dy != 0 {
        // Diagonal move: blocked cells behind either axis force expansion.
        (!nav.walkable(x - dx, y) && nav.walkable(x - dx, y + dy))
            || (!nav.walkable(x, y - dy) && nav.walkable(x + dx, y - dy))
    } else if dx != 0 {
        (!nav.walkable(x, y + 1) && nav.walkable(x + dx, y + 1))
            || (!nav.walkable(x, y - 1) && nav.walkable(x + dx, y - 1))
    } else {
        (!nav.walkable(x + 1, y) && nav.walkable(x + 1, y + dy))
            || (!nav.walkable(x - 1, y) && nav.walkable(x - 1, y + dy))
    }
}

fn jump(
    nav: &NavField,
    mut x: i32,
    mut y: i32,
    dx: i32,
    dy: i32,
    goal: (i32, i32),
) -> Option<(i32, i32)> {
    loop {
        if !nav.can_step(x, y, dx, dy) {
            return None;
        }
        x += dx;
        y += dy;
        if (x, y) == goal {
            return Some((x, y));
        }
        if has_forced_neighbor(nav, x, y, dx, dy) {
            return Some((x, y));
        }
        if dx != 0 && dy != 0 {
            // A diagonal jump stops where either straight component finds
            // something worth expanding.
            if jump(nav, x, y, dx, 0, goal).is_some() || jump(nav, x, y, 0, dy, goal).is_some() {
                return Some((x, y));
            }
        }
    }
}

/// Jump-Point Search. Requires a uniform-cost field; returns jump points,
/// not every intermediate cell.
pub fn jump_point_search(
    nav: &NavField,
    start: (i32, i32),
    goal: (i32, i32),
) -> Option<Vec<(i32, i32)>> {
    if !nav.walkable(start.0, start.1) || !nav.walkable(goal.0, goal.1) {
        return None;
    }
    if start == goal {
        return Some(vec![start]);
    }

    let mut open: BinaryHeap<Reverse<(u32, u32, (i32, i32))>> = BinaryHeap::new();
    let mut g_score: BTreeMap<(i32, i32), u32> = BTreeMap::new();
    let mut parents: BTreeMap<(i32, i32), (i32, i32)> = BTreeMap::new();

    g_score.insert(start, 0);
    open.push(Reverse((octile(start.0, start.1, goal.0, goal.1), 0, start)));

    let mut expansions = 0usize;
    while let Some(Reverse((_, g, cell))) = open.pop() {
        if g_score.get(&cell).copied().unwrap_or(u32::MAX) < g {
            continue;
        }
        if cell == goal {
            return Some(reconstruct(&parents, start, goal));
        }
        expansions += 1;
        if expansions > MAX_EXPANSIONS {
            return None;
        }

        for (dx, dy) in DIRS {
            let Some(point) = jump(nav, cell.0, cell.1, dx, dy, goal) else {
                continue;
            };
            let tentative = g + octile(cell.0, cell.1, point.0, point.1);
            if tentative < g_score.get(&point).copied().unwrap_or(u32::MAX) {
                g_score.insert(point, tentative);
                parents.insert(point, cell);
                let f = tentative + octile(point.0, point.1, goal.0, goal.1);
                open.push(Reverse((f, tentative, point)));
            }
        }
    }
    None
}

// =============================================================================
// SMOOTHING
// =============================================================================

/// Bresenham line walk: every visited cell must be walkable, and diagonal
/// steps may not cut corners.
pub fn line_of_sight(nav: &NavField, a: (i32, i32), b: (i32, i32)) -> bool {
    let (mut x, mut y) = a;
    let dx = (b.0 - a.0).abs();
    let dy = (b.1 - a.1).abs();
    let sx = if a.0 < b.0 { 1 } else { -1 };
    let sy = if a.1 < b.1 { 1 } else { -1 };
    let mut err = dx - dy;

    if !nav.walkable(x, y) {
        return false;
    }
    while (x, y) != b {
        let e2 = 2 * err;
        let step_x = e2 > -dy;
        let step_y = e2 < dx;
        let (ndx, ndy) = (
            if step_x { sx } else { 0 },
            if step_y { sy } else { 0 },
        );
        if !nav.can_step(x, y, ndx, ndy) {
            return false;
        }
        if step_x {
            err -= dy;
            x += sx;
        }
        if step_y {
            err += dx;
            y += sy;
        }
    }
    true
}

/// Greedy smoothing: from each anchor keep the furthest waypoint with clear
/// line of sight, drop everything in between.
pub fn smooth(nav: &NavField, path: &[(i32, i32)]) -> Vec<(i32, i32)> {
    if path.len() <= 2 {
        return path.to_vec();
    }
    let mut out = vec![path[0]];
    let mut anchor = 0usize;
    while anchor < path.len() - 1 {
        let mut best = anchor + 1;
        for candidate in (anchor + 1..path.len()).rev() {
            if line_of_sight(nav, path[anchor], path[candidate]) {
                best = candidate;
                break;
            }
        }
        out.push(path[best]);
        anchor = best;
    }
    out
}

/// Full query: pick the algorithm, then smooth. Returns waypoints or None.
pub fn find_path(nav: &NavField, start: (i32, i32), goal: (i32, i32)) -> Option<Vec<(i32, i32)>> {
    let raw = if nav.is_uniform() {
        // JPS on uniform fields; A* picks up the rare corner-rule miss.
        jump_point_search(nav, start, goal).or_else(|| a_star(nav, start, goal))
    } else {
        a_star(nav, start, goal)
    }?;
    Some(smooth(nav, &raw))
}

/// Nearest walkable cell to `goal`, searched in deterministic ring order,
/// preferring cells closer to `from`. Used when the ordered destination is
/// itself blocked (resource nodes, building sites).
pub fn nearest_walkable(nav: &NavField, goal: (i32, i32), from: (i32, i32)) -> Option<(i32, i32)> {
    if nav.walkable(goal.0, goal.1) {
        return Some(goal);
    }
    for radius in 1..=4i32 {
        let mut best: Option<((i32, i32), u32)> = None;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx.abs() != radius && dy.abs() != radius {
                    continue;
                }
                let cell = (goal.0 + dx, goal.1 + dy);
                if !nav.walkable(cell.0, cell.1) {
                    continue;
                }
                let d = octile(cell.0, cell.1, from.0, from.1);
                let better = match best {
                    None => true,
                    Some((bc, bd)) => d < bd || (d == bd && cell < bc),
                };
                if better {
                    best = Some((cell, d));
                }
            }
        }
        if let Some((cell, _)) = best {
            return Some(cell);
        }
    }
    None
}

/// Cell center as a world position.
pub fn cell_center(cell: (i32, i32)) -> FixedVec2 {
    let mut v = FixedVec2::from_cell(cell.0, cell.1);
    v.x += FIXED_HALF;
    v.y += FIXED_HALF;
    v
}

// =============================================================================
// SYSTEM
// =============================================================================

/// Computes paths for units that have a destination but no waypoints, and
/// keeps the nav cache current as footprints change.
pub struct PathfindingSystem {
    nav: NavField,
}

impl PathfindingSystem {
    /// New system with an unbuilt nav cache.
    pub fn new() -> Self {
        Self {
            nav: NavField::new(),
        }
    }
}

impl Default for PathfindingSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for PathfindingSystem {
    fn name(&self) -> &'static str {
        "pathfinding"
    }

    fn update(&mut self, ctx: &mut SimCtx<'_>, _bus: &mut EventBus) {
        let dirty = ctx.world.terrain.take_dirty();
        if !self.nav.is_built() {
            self.nav.rebuild(&ctx.world.terrain);
        } else if !dirty.is_empty() {
            self.nav.apply_dirty(&ctx.world.terrain, &dirty);
        }

        let ids = ctx
            .world
            .entities_with_cached(tag::UNIT | tag::TRANSFORM);
        for id in ids {
            let Some(unit) = ctx.world.units.get(&id) else {
                continue;
            };
            let needs_path = unit.path.is_empty()
                && unit.target_pos.is_some()
                && matches!(
                    unit.state,
                    UnitState::Moving
                        | UnitState::AttackMoving
                        | UnitState::Attacking
                        | UnitState::Gathering
                        | UnitState::Building
                );
            if !needs_path {
                continue;
            }

            let Some(target) = unit.target_pos else {
                continue;
            };
            let flying = unit.is_flying;
            let pos = ctx.world.position_of(id).unwrap_or(FixedVec2::ZERO);

            let start = pos.cell();
            let goal_cell = target.cell();

            // Already in the destination cell: nothing to compute.
            if start == goal_cell {
                continue;
            }

            let waypoints: Vec<FixedVec2> = if flying {
                vec![target]
            } else {
                let goal = match nearest_walkable(&self.nav, goal_cell, start) {
                    Some(g) => g,
                    None => {
                        // Destination is sealed off; drop the order.
                        if let Some(unit) = ctx.world.units.get_mut(&id) {
                            unit.clear_orders();
                        }
                        continue;
                    }
                };
                match find_path(&self.nav, start, goal) {
                    Some(cells) => {
                        let mut wps: Vec<FixedVec2> =
                            cells.iter().skip(1).map(|&c| cell_center(c)).collect();
                        // Land exactly on the ordered point when it is the
                        // goal cell.
                        if goal == goal_cell {
                            if let Some(last) = wps.last_mut() {
                                *last = target;
                            }
                        }
                        wps
                    }
                    None => {
                        if let Some(unit) = ctx.world.units.get_mut(&id) {
                            unit.clear_orders();
                        }
                        continue;
                    }
                }
            };

            if let Some(unit) = ctx.world.units.get_mut(&id) {
                unit.path = waypoints;
            }
        }
    }
}
