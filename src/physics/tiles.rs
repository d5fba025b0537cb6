//! Tile-grid sweeps and footprint tests.
//!
//! Cell ranges are computed with a tiny inset so a body resting exactly on a
//! cell boundary does not count as occupying the neighbouring cell.

use super::body::{tile_blocks, Axis};
use crate::interpreter::TileHit;
use crate::scene::MapSpec;
use glam::DVec2;
use std::ops::RangeInclusive;

/// Gap left between a swept body and the tile edge that stopped it
pub const TILE_EPSILON: f64 = 1e-6;

const CELL_EPSILON: f64 = 1e-9;

fn cell(v: f64, tile_size: f64) -> i64 {
    (v / tile_size).floor() as i64
}

fn extent(map: &MapSpec, axis: Axis) -> i64 {
    match axis {
        Axis::X => map.width as i64,
        Axis::Y => map.height as i64,
    }
}

/// In-grid cells covered by `[lo, hi]` along one axis
fn span(map: &MapSpec, axis: Axis, lo: f64, hi: f64) -> RangeInclusive<i64> {
    let first = cell(lo + CELL_EPSILON, map.tile_size).max(0);
    let last = cell(hi - CELL_EPSILON, map.tile_size).min(extent(map, axis) - 1);
    first..=last
}

fn cell_at(axis: Axis, line: i64, cross: i64) -> (i64, i64) {
    match axis {
        Axis::X => (line, cross),
        Axis::Y => (cross, line),
    }
}

/// Sweep a box spanning `min..max` by `delta` along `axis`.
///
/// Returns the position of the leading edge when the first blocking tile
/// line along the travel stops the box.
pub fn sweep(map: &MapSpec, mask: Option<i64>, axis: Axis, min: DVec2, max: DVec2, delta: f64) -> Option<f64> {
    if mask.is_none() || delta == 0.0 {
        return None;
    }
    let ts = map.tile_size;
    let cross = axis.other();
    let cross_cells = span(map, cross, cross.of(min), cross.of(max));
    let blocked = |line: i64| {
        cross_cells.clone().any(|c| {
            let (col, row) = cell_at(axis, line, c);
            tile_blocks(mask, map.mask_at(col, row))
        })
    };

    if delta > 0.0 {
        let lead = axis.of(max);
        let first = (cell(lead - CELL_EPSILON, ts) + 1).max(0);
        let last = cell(lead + delta - CELL_EPSILON, ts).min(extent(map, axis) - 1);
        (first..=last)
            .find(|&line| blocked(line))
            .map(|line| line as f64 * ts - TILE_EPSILON)
    } else {
        let lead = axis.of(min);
        let first = (cell(lead + CELL_EPSILON, ts) - 1).min(extent(map, axis) - 1);
        let last = cell(lead + delta + CELL_EPSILON, ts).max(0);
        (last..=first)
            .rev()
            .find(|&line| blocked(line))
            .map(|line| (line + 1) as f64 * ts + TILE_EPSILON)
    }
}

/// Whether any tile under the footprint blocks an actor with `mask`
pub fn footprint_blocked(map: &MapSpec, mask: Option<i64>, min: DVec2, max: DVec2) -> bool {
    if mask.is_none() {
        return false;
    }
    span(map, Axis::Y, min.y, max.y).any(|row| {
        span(map, Axis::X, min.x, max.x).any(|col| tile_blocks(mask, map.mask_at(col, row)))
    })
}

/// Masked tiles under the footprint, row-major
pub fn masked_tiles(map: &MapSpec, min: DVec2, max: DVec2) -> Vec<TileHit> {
    let mut hits = Vec::new();
    for row in span(map, Axis::Y, min.y, max.y) {
        for col in span(map, Axis::X, min.x, max.x) {
            if map.mask_at(col, row).is_some() {
                hits.push(TileHit {
                    col,
                    row,
                    id: map.tile_at(col, row),
                });
            }
        }
    }
    hits
}
