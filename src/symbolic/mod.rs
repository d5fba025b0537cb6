//! Text-grid rendering of a world for agents and terminals.
//!
//! One character per map cell. Tiles are drawn first, then actors in
//! ascending z; the legend lists each symbol once, labelled by whatever drew
//! it first.

use crate::interpreter::{Actor, World};
use crate::scene::{CameraSpec, MapSpec, RoleKind, RoleSpec, SceneSpec, TileDef};
use serde::{Deserialize, Serialize};


/// Cell size used when the scene has no tile map
pub const DEFAULT_CELL_SIZE: f64 = 32.0;

/// Largest grid extent, in cells, along either axis
pub const MAX_GRID_CELLS: usize = 512;

const COLOR_TILE_SYMBOL: char = '#';

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LegendEntry {
    pub symbol: char,
    pub label: String,
}

/// Visible window, in cells
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub col: i64,
    pub row: i64,
    pub cols: usize,
    pub rows: usize,
    pub cell_size: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolicFrame {
    pub rows: Vec<String>,
    pub legend: Vec<LegendEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
}

impl SymbolicFrame {
    /// Zero-sized frame with an empty legend
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Cell rectangle; `cols`/`rows` may be zero
#[derive(Clone, Copy, Debug, PartialEq)]
struct CellRect {
    col: i64,
    row: i64,
    cols: usize,
    rows: usize,
}

pub struct SymbolicRenderer<'a> {
    scene: &'a SceneSpec,
    world: &'a World,
    cell: f64,
}

impl<'a> SymbolicRenderer<'a> {
    pub fn new(scene: &'a SceneSpec, world: &'a World) -> Self {
        let cell = scene
            .map
            .as_ref()
            .map_or(DEFAULT_CELL_SIZE, |m| m.tile_size);
        Self { scene, world, cell }
    }

    /// Frame as seen by a role: its bound camera, or the whole world. AI
    /// roles without a camera get an empty frame.
    pub fn render_for_role(&self, role: &RoleSpec) -> SymbolicFrame {
        let camera = role.camera.as_deref().and_then(|id| self.scene.camera(id));
        match camera {
            Some(camera) => self.render(Some(camera)),
            None if role.kind == RoleKind::Ai => SymbolicFrame::empty(),
            None => self.render(None),
        }
    }

    pub fn render(&self, camera: Option<&CameraSpec>) -> SymbolicFrame {
        let bounds = self.bounds();
        let view = self.viewport(camera, bounds);
        let empty = self.scene.symbolic.empty;

        let mut grid = vec![vec![empty; view.cols]; view.rows];
        let mut legend: Vec<LegendEntry> = Vec::new();
        let mut put = |col: i64, row: i64, symbol: char, label: &str| {
            let (c, r) = (col.saturating_sub(view.col), row.saturating_sub(view.row));
            if c < 0 || r < 0 || c as usize >= view.cols || r as usize >= view.rows {
                return;
            }
            grid[r as usize][c as usize] = symbol;
            if !legend.iter().any(|e| e.symbol == symbol) {
                legend.push(LegendEntry {
                    symbol,
                    label: label.to_string(),
                });
            }
        };

        if let Some(map) = &self.scene.map {
            for row in view.row..view.row + view.rows as i64 {
                for col in view.col..view.col + view.cols as i64 {
                    let id = map.tile_at(col, row);
                    if id == 0 {
                        continue;
                    }
                    if let Some((symbol, label)) = map.def(id).and_then(|d| tile_symbol(id, d)) {
                        put(col, row, symbol, &label);
                    }
                }
            }
        }

        let mut actors: Vec<&Actor> = self.world.actors().iter().filter(|a| a.active).collect();
        actors.sort_by_key(|a| a.z);
        for actor in actors {
            if let Some(symbol) = self.actor_symbol(actor) {
                let col = (actor.x / self.cell).floor() as i64;
                let row = (actor.y / self.cell).floor() as i64;
                put(col, row, symbol, &actor.actor_type);
            }
        }

        SymbolicFrame {
            rows: grid.into_iter().map(|r| r.into_iter().collect()).collect(),
            legend,
            viewport: Some(Viewport {
                col: view.col,
                row: view.row,
                cols: view.cols,
                rows: view.rows,
                cell_size: self.cell,
            }),
        }
    }

    /// Map grid, else the cells covered by live actors, cut to the declared
    /// world size and to `MAX_GRID_CELLS` per axis
    fn bounds(&self) -> CellRect {
        const NONE: CellRect = CellRect {
            col: 0,
            row: 0,
            cols: 0,
            rows: 0,
        };
        if let Some(map) = &self.scene.map {
            return map_bounds(map);
        }
        let mut live = self.world.actors().iter().filter(|a| a.active);
        let Some(first) = live.next() else {
            return NONE;
        };
        let cell_of = |v: f64| (v / self.cell).floor() as i64;
        let (mut c0, mut r0) = (cell_of(first.x), cell_of(first.y));
        let (mut c1, mut r1) = (c0, r0);
        for actor in live {
            let (c, r) = (cell_of(actor.x), cell_of(actor.y));
            c0 = c0.min(c);
            r0 = r0.min(r);
            c1 = c1.max(c);
            r1 = r1.max(r);
        }
        if let Some((w, h)) = self.scene.world_size() {
            let last = |v: f64| ((v / self.cell).ceil() as i64).saturating_sub(1);
            c0 = c0.max(0);
            r0 = r0.max(0);
            c1 = c1.min(last(w));
            r1 = r1.min(last(h));
            if c1 < c0 || r1 < r0 {
                return NONE;
            }
        }
        let extent = |lo: i64, hi: i64| {
            usize::try_from(hi.saturating_sub(lo))
                .map_or(MAX_GRID_CELLS, |span| span.saturating_add(1).min(MAX_GRID_CELLS))
        };
        CellRect {
            col: c0,
            row: r0,
            cols: extent(c0, c1),
            rows: extent(r0, r1),
        }
    }

    fn viewport(&self, camera: Option<&CameraSpec>, bounds: CellRect) -> CellRect {
        let to_cells = |v: f64| (v / self.cell).ceil().max(0.0) as usize;
        let (cols, rows) = match camera.and_then(|c| c.width.zip(c.height)) {
            Some((w, h)) => (to_cells(w), to_cells(h)),
            None => match (self.scene.symbolic.crop, self.scene.world.surface) {
                (Some(crop), _) => (crop.cols, crop.rows),
                (None, Some(surface)) => (
                    (surface.width / self.cell).floor() as usize,
                    (surface.height / self.cell).floor() as usize,
                ),
                (None, None) => (bounds.cols, bounds.rows),
            },
        };
        let cols = cols.min(bounds.cols);
        let rows = rows.min(bounds.rows);

        let center = camera.and_then(|c| {
            c.follow
                .as_deref()
                .and_then(|uid| self.world.actor(uid))
                .map(|a| (a.x, a.y))
                .or_else(|| c.x.zip(c.y))
        });

        let (col, row) = match center {
            Some((x, y)) => {
                let cc = (x / self.cell).floor() as i64;
                let cr = (y / self.cell).floor() as i64;
                (cc.saturating_sub((cols / 2) as i64), cr.saturating_sub((rows / 2) as i64))
            }
            None => (bounds.col, bounds.row),
        };

        CellRect {
            col: clamp_origin(col, cols, bounds.col, bounds.cols),
            row: clamp_origin(row, rows, bounds.row, bounds.rows),
            cols,
            rows,
        }
    }

    fn actor_symbol(&self, actor: &Actor) -> Option<char> {
        self.scene
            .template(&actor.actor_type)
            .and_then(|t| t.symbol)
            .or_else(|| actor.sprite.as_deref().and_then(first_alnum))
            .or_else(|| first_alnum(&actor.actor_type))
    }
}

fn map_bounds(map: &MapSpec) -> CellRect {
    CellRect {
        col: 0,
        row: 0,
        cols: map.width,
        rows: map.height,
    }
}

/// Keep a window of `len` cells starting at `start` inside `[lo, lo + span)`
fn clamp_origin(start: i64, len: usize, lo: i64, span: usize) -> i64 {
    let hi = lo.saturating_add(span as i64).saturating_sub(len as i64);
    start.clamp(lo, hi.max(lo))
}

fn first_alnum(s: &str) -> Option<char> {
    s.chars().find(|c| c.is_alphanumeric())
}

fn tile_symbol(id: u32, def: &TileDef) -> Option<(char, String)> {
    let label = def
        .sprite
        .clone()
        .or_else(|| def.color.clone())
        .unwrap_or_else(|| format!("tile {}", id));
    let symbol = def
        .symbol
        .or_else(|| def.sprite.as_deref().and_then(first_alnum))
        .or_else(|| def.color.as_ref().map(|_| COLOR_TILE_SYMBOL))?;
    Some((symbol, label))
}
