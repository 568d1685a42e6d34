//! Map Blueprints
//!
//! The canonical declarative map record produced by the editor (or the map
//! generation service upstream of it). Expansion is deterministic: the same
//! blueprint yields the same terrain grid and the same initial entities, in
//! the same id order, on every peer.
//!
//! Paint commands apply in list order; later commands overwrite earlier
//! ones. Positions are cells, elevations 0-255 with the canonical
//! milestones 60 / 140 / 220.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::world::components::ResourceKind;
use crate::world::entity::PlayerId;
use crate::world::kinds::{BuildingKind, UnitKind};
use crate::world::terrain::{Cell, Feature, TerrainClass, TerrainGrid, ELEVATION_LOW};
use crate::world::World;

use super::config::MatchOptions;

/// Starting minerals per patch.
const MINERAL_PATCH_AMOUNT: u32 = 1500;
/// Starting vespene per geyser.
const GEYSER_AMOUNT: u32 = 2500;
/// Workers spawned per main base.
const STARTING_WORKERS: u32 = 6;

/// A cell-space rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    /// Left cell.
    pub x: i32,
    /// Top cell.
    pub y: i32,
    /// Width in cells.
    pub w: u32,
    /// Height in cells.
    pub h: u32,
}

/// One paint command. Applied in order; later commands win.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PaintCommand {
    /// Reset the whole canvas to ground at an elevation.
    Fill {
        /// Base elevation.
        elevation: u8,
    },
    /// Ground rectangle at an elevation.
    Plateau {
        /// Area.
        rect: Rect,
        /// Plateau elevation.
        elevation: u8,
    },
    /// Generic class rectangle keeping current elevation.
    Rect {
        /// Area.
        rect: Rect,
        /// Terrain class to paint.
        class: TerrainClass,
    },
    /// Walkable slope connecting elevations.
    Ramp {
        /// Area.
        rect: Rect,
    },
    /// Water rectangle.
    Water {
        /// Area.
        rect: Rect,
    },
    /// Forest rectangle.
    Forest {
        /// Area.
        rect: Rect,
    },
    /// Void rectangle.
    Void {
        /// Area.
        rect: Rect,
    },
    /// Road rectangle.
    Road {
        /// Area.
        rect: Rect,
    },
    /// Bare-rock unwalkable rectangle.
    Unwalkable {
        /// Area.
        rect: Rect,
    },
    /// Void trim around the map edge.
    Border {
        /// Trim thickness in cells.
        thickness: u32,
    },
    /// Mud rectangle.
    Mud {
        /// Area.
        rect: Rect,
    },
}

/// Base spot type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseKind {
    /// Player start: headquarters, workers, full resource line.
    Main,
    /// Unowned expansion: resources only.
    Expansion,
}

/// Which side of the base the mineral line sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// Above.
    North,
    /// Right.
    East,
    /// Below.
    South,
    /// Left.
    West,
}

impl Orientation {
    fn offset(self) -> (i32, i32) {
        match self {
            Orientation::North => (0, -1),
            Orientation::East => (1, 0),
            Orientation::South => (0, 1),
            Orientation::West => (-1, 0),
        }
    }
}

/// A spawn or expansion point.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BaseSpot {
    /// Main or expansion.
    pub kind: BaseKind,
    /// Player slot for main bases.
    pub slot: Option<u8>,
    /// Base center cell.
    pub cell: (i32, i32),
    /// Mineral line placement.
    pub minerals: Orientation,
}

/// Blueprint metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlueprintMeta {
    /// Stable blueprint id (seeds derive from it).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Supported player count.
    pub players: u8,
}

/// Canvas dimensions and flavor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Canvas {
    /// Width in cells.
    pub width: u32,
    /// Height in cells.
    pub height: u32,
    /// Biome tag (rendering flavor; ignored by simulation).
    pub biome: String,
}

/// The canonical blueprint record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Blueprint {
    /// Identity and player count.
    pub meta: BlueprintMeta,
    /// Canvas dimensions.
    pub canvas: Canvas,
    /// Ordered paint commands.
    pub paint: Vec<PaintCommand>,
    /// Spawn and expansion points.
    pub bases: Vec<BaseSpot>,
    /// Neutral watch towers.
    #[serde(default)]
    pub watch_towers: Vec<(i32, i32)>,
    /// Neutral destructible rocks.
    #[serde(default)]
    pub destructibles: Vec<(i32, i32)>,
}

/// Blueprint validation and expansion failures.
#[derive(Debug, Error)]
pub enum BlueprintError {
    /// Canvas does not match the match options.
    #[error("canvas {canvas_w}x{canvas_h} does not match options {opt_w}x{opt_h}")]
    DimensionMismatch {
        /// Canvas width.
        canvas_w: u32,
        /// Canvas height.
        canvas_h: u32,
        /// Options width.
        opt_w: u32,
        /// Options height.
        opt_h: u32,
    },
    /// Player count not in {2, 4, 6, 8}.
    #[error("unsupported player count {0}")]
    BadPlayerCount(u8),
    /// A main base is missing a slot or a slot repeats.
    #[error("invalid base slots")]
    BadBaseSlots,
}

impl Blueprint {
    /// A flat two-player test map: open ground, two mirrored bases.
    pub fn flat_test_map(id: &str, width: u32, height: u32) -> Self {
        let margin = 8;
        Self {
            meta: BlueprintMeta {
                id: id.to_string(),
                name: format!("Test {}", id),
                players: 2,
            },
            canvas: Canvas {
                width,
                height,
                biome: "ashlands".to_string(),
            },
            paint: vec![
                PaintCommand::Fill {
                    elevation: ELEVATION_LOW,
                },
                PaintCommand::Border { thickness: 2 },
            ],
            bases: vec![
                BaseSpot {
                    kind: BaseKind::Main,
                    slot: Some(0),
                    cell: (margin + 4, margin + 4),
                    minerals: Orientation::North,
                },
                BaseSpot {
                    kind: BaseKind::Main,
                    slot: Some(1),
                    cell: (width as i32 - margin - 8, height as i32 - margin - 8),
                    minerals: Orientation::South,
                },
            ],
            watch_towers: Vec::new(),
            destructibles: Vec::new(),
        }
    }

    /// Validate against match options.
    pub fn validate(&self, options: &MatchOptions) -> Result<(), BlueprintError> {
        if self.canvas.width != options.map_width || self.canvas.height != options.map_height {
            return Err(BlueprintError::DimensionMismatch {
                canvas_w: self.canvas.width,
                canvas_h: self.canvas.height,
                opt_w: options.map_width,
                opt_h: options.map_height,
            });
        }
        if !matches!(self.meta.players, 2 | 4 | 6 | 8) {
            return Err(BlueprintError::BadPlayerCount(self.meta.players));
        }
        let mut slots: Vec<u8> = self
            .bases
            .iter()
            .filter(|b| b.kind == BaseKind::Main)
            .filter_map(|b| b.slot)
            .collect();
        let main_count = self
            .bases
            .iter()
            .filter(|b| b.kind == BaseKind::Main)
            .count();
        slots.sort_unstable();
        slots.dedup();
        if slots.len() != main_count {
            return Err(BlueprintError::BadBaseSlots);
        }
        Ok(())
    }

    /// Expand the paint list into a terrain grid.
    pub fn expand_terrain(&self) -> TerrainGrid {
        let mut grid = TerrainGrid::new(self.canvas.width, self.canvas.height);
        for command in &self.paint {
            apply_paint(&mut grid, command);
        }
        grid
    }

    /// Expand into a fully populated world: terrain, then per-base entities
    /// in base-list order, then towers and destructibles.
    ///
    /// Entity id assignment order is part of the cross-peer contract; do not
    /// reorder the spawn loops.
    pub fn expand_world(
        &self,
        options: &MatchOptions,
        base_seed: u64,
    ) -> Result<World, BlueprintError> {
        self.validate(options)?;

        let terrain = self.expand_terrain();
        let mut world = World::new(terrain, base_seed);

        for slot in 0..self.meta.players {
            world.add_player(PlayerId(slot));
        }

        for base in &self.bases {
            spawn_base(&mut world, base);
        }
        for &(x, y) in &self.watch_towers {
            world.spawn_building(BuildingKind::WatchTower, PlayerId::NEUTRAL, x, y, true);
        }
        for &(x, y) in &self.destructibles {
            world.spawn_building(BuildingKind::Rocks, PlayerId::NEUTRAL, x, y, true);
        }

        info!(
            blueprint = %self.meta.id,
            entities = world.allocated_entities(),
            "blueprint expanded"
        );
        Ok(world)
    }
}

fn paint_rect(grid: &mut TerrainGrid, rect: Rect, f: impl Fn(&mut Cell)) {
    for y in rect.y..rect.y + rect.h as i32 {
        for x in rect.x..rect.x + rect.w as i32 {
            if grid.in_bounds(x, y) {
                f(grid.cell_mut(x, y));
            }
        }
    }
}

fn apply_paint(grid: &mut TerrainGrid, command: &PaintCommand) {
    match command {
        PaintCommand::Fill { elevation } => {
            let all = Rect {
                x: 0,
                y: 0,
                w: grid.width(),
                h: grid.height(),
            };
            let e = *elevation;
            paint_rect(grid, all, |c| {
                c.class = TerrainClass::Ground;
                c.elevation = e;
                c.feature = None;
            });
        }
        PaintCommand::Plateau { rect, elevation } => {
            let e = *elevation;
            paint_rect(grid, *rect, |c| {
                c.class = TerrainClass::Ground;
                c.elevation = e;
                c.feature = None;
            });
        }
        PaintCommand::Rect { rect, class } => {
            let cl = *class;
            paint_rect(grid, *rect, |c| c.class = cl);
        }
        PaintCommand::Ramp { rect } => {
            paint_rect(grid, *rect, |c| {
                c.class = TerrainClass::Ground;
                c.feature = Some(Feature::Ramp);
            });
        }
        PaintCommand::Water { rect } => {
            paint_rect(grid, *rect, |c| c.class = TerrainClass::Water);
        }
        PaintCommand::Forest { rect } => {
            paint_rect(grid, *rect, |c| c.class = TerrainClass::Forest);
        }
        PaintCommand::Void { rect } => {
            paint_rect(grid, *rect, |c| c.class = TerrainClass::Void);
        }
        PaintCommand::Road { rect } => {
            paint_rect(grid, *rect, |c| c.class = TerrainClass::Road);
        }
        PaintCommand::Unwalkable { rect } => {
            paint_rect(grid, *rect, |c| c.class = TerrainClass::Rock);
        }
        PaintCommand::Mud { rect } => {
            paint_rect(grid, *rect, |c| c.class = TerrainClass::Mud);
        }
        PaintCommand::Border { thickness } => {
            let t = *thickness as i32;
            let (w, h) = (grid.width() as i32, grid.height() as i32);
            for y in 0..h {
                for x in 0..w {
                    if x < t || y < t || x >= w - t || y >= h - t {
                        let cell = grid.cell_mut(x, y);
                        cell.class = TerrainClass::Void;
                        cell.feature = Some(Feature::Border);
                    }
                }
            }
        }
    }
}

/// Spawn one base's entities. Order within a base: headquarters, workers,
/// mineral patches, geyser.
fn spawn_base(world: &mut World, base: &BaseSpot) {
    let (cx, cy) = base.cell;
    let (dx, dy) = base.minerals.offset();

    if base.kind == BaseKind::Main {
        if let Some(slot) = base.slot {
            let player = PlayerId(slot);
            world.spawn_building(BuildingKind::Headquarters, player, cx, cy, true);
            for i in 0..STARTING_WORKERS as i32 {
                let pos = crate::core::vec2::FixedVec2::from_cell(cx + i % 3, cy + 5 + i / 3);
                world.spawn_unit(UnitKind::Scavenger, player, pos);
            }
        }
    }

    // Mineral line: patches fan out along the oriented side.
    let line_x = cx + dx * 6;
    let line_y = cy + dy * 6;
    for i in -3..3 {
        let (mx, my) = if dx != 0 {
            (line_x, line_y + i * 2)
        } else {
            (line_x + i * 2, line_y)
        };
        world.spawn_resource(ResourceKind::Minerals, mx, my, MINERAL_PATCH_AMOUNT);
    }

    // One geyser tucked past the end of the line.
    let (gx, gy) = (cx + dx * 6 + dy * 7, cy + dy * 6 + dx * 7);
    world.spawn_resource(ResourceKind::Vespene, gx, gy, GEYSER_AMOUNT);
}
